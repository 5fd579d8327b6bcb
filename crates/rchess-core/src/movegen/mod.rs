//! 指し手生成
//!
//! 擬似合法手を駒種ごとに生成し、`Position::legal` と王手回避条件で合法手に絞り込む。
//!
//! - `GenType::All`: すべての擬似合法手
//! - `GenType::Captures`: 駒取りと成り（静止探索用）

use crate::bitboard::{Bitboard, attacks, between, pawn_attacks};
use crate::position::{BLACK_OO, BLACK_OOO, Position, WHITE_OO, WHITE_OOO};
use crate::types::{Color, Move, MoveKind, MoveList, PieceType, Rank, Square};

/// 生成する指し手の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenType {
    All,
    Captures,
}

const PROMOTION_TYPES: [PieceType; 4] =
    [PieceType::Queen, PieceType::Knight, PieceType::Rook, PieceType::Bishop];

// ========== 擬似合法手 ==========

/// 擬似合法手を `list` に追加
pub fn generate_pseudo_legal(pos: &Position, gen_type: GenType, list: &mut MoveList) {
    let us = pos.side_to_move();
    let them = !us;
    let occ = pos.occupied();
    let enemies = pos.pieces_c(them);
    let targets = match gen_type {
        GenType::All => !pos.pieces_c(us),
        GenType::Captures => enemies,
    };

    generate_pawn_moves(pos, gen_type, list);

    for pt in [PieceType::Knight, PieceType::Bishop, PieceType::Rook, PieceType::Queen, PieceType::King] {
        for from in pos.pieces(us, pt) {
            for to in attacks(pt, from, occ) & targets {
                list.push(Move::normal(from, to));
            }
        }
    }

    if gen_type == GenType::All && !pos.in_check() {
        let rights = match us {
            Color::White => [WHITE_OO, WHITE_OOO],
            Color::Black => [BLACK_OO, BLACK_OOO],
        };
        let ksq = pos.king_square(us);
        for cr in rights {
            if pos.can_castle(cr)
                && !pos.castling_impeded(cr)
                && let Some(rsq) = pos.castling_rook_square(cr)
            {
                list.push(Move::castling(ksq, rsq));
            }
        }
    }
}

fn push_promotions(from: Square, to: Square, gen_type: GenType, capture: bool, list: &mut MoveList) {
    for pt in PROMOTION_TYPES {
        // 静止探索では駒を取らない弱い成りを省く
        if gen_type == GenType::Captures && !capture && pt != PieceType::Queen {
            continue;
        }
        list.push(Move::promotion(from, to, pt));
    }
}

fn generate_pawn_moves(pos: &Position, gen_type: GenType, list: &mut MoveList) {
    let us = pos.side_to_move();
    let them = !us;
    let push = us.pawn_push();
    let empty = !pos.occupied();
    let enemies = pos.pieces_c(them);
    let rank7 = Bitboard::rank(Rank::R7.relative(us));
    let rank3 = Bitboard::rank(Rank::R3.relative(us));

    let pawns = pos.pieces(us, PieceType::Pawn);
    let promoting = pawns & rank7;
    let others = pawns & !rank7;

    // 前進
    let single = others.shift_forward(us) & empty;
    if gen_type == GenType::All {
        let double = (single & rank3).shift_forward(us) & empty;
        for to in single {
            list.push(Move::normal(from_push(to, push, 1), to));
        }
        for to in double {
            list.push(Move::normal(from_push(to, push, 2), to));
        }
    }

    // 成り
    for from in promoting {
        if let Some(to) = from.offset(push)
            && empty.contains(to)
        {
            push_promotions(from, to, gen_type, false, list);
        }
        for to in pawn_attacks(us, from) & enemies {
            push_promotions(from, to, gen_type, true, list);
        }
    }

    // 駒取り
    for from in others {
        for to in pawn_attacks(us, from) & enemies {
            list.push(Move::normal(from, to));
        }
    }

    // アンパッサン
    if let Some(ep) = pos.ep_square() {
        for from in pawn_attacks(them, ep) & others {
            list.push(Move::en_passant(from, ep));
        }
    }
}

#[inline]
fn from_push(to: Square, push: i8, n: i8) -> Square {
    Square::from_u8((to.raw() as i8 - push * n) as u8)
}

// ========== 合法手 ==========

/// 王手されている局面で、玉以外の手が王手を解消するか
fn resolves_check(pos: &Position, m: Move) -> bool {
    let checkers = pos.checkers();
    if checkers.is_empty() {
        return true;
    }
    let us = pos.side_to_move();
    let ksq = pos.king_square(us);
    if m.from_sq() == ksq {
        return true;
    }
    if checkers.more_than_one() {
        return false;
    }
    let Some(checker) = checkers.lsb() else {
        return true;
    };
    if m.kind() == MoveKind::EnPassant {
        let capsq = m.to_sq().offset(-us.pawn_push());
        return capsq == Some(checker) || between(ksq, checker).contains(m.to_sq());
    }
    // between は checker 自身を含む
    between(ksq, checker).contains(m.to_sq())
}

/// 合法手をすべて生成
pub fn generate_legal(pos: &Position) -> MoveList {
    let mut list = MoveList::new();
    generate_pseudo_legal(pos, GenType::All, &mut list);
    list.retain(|m| resolves_check(pos, *m) && pos.legal(*m));
    list
}

/// 合法な駒取り・成りを生成（王手中はすべての合法手）
pub fn generate_captures(pos: &Position) -> MoveList {
    if pos.in_check() {
        return generate_legal(pos);
    }
    let mut list = MoveList::new();
    generate_pseudo_legal(pos, GenType::Captures, &mut list);
    list.retain(|m| pos.legal(*m));
    list
}

/// 合法手が1つでもあるか
pub fn has_legal_moves(pos: &Position) -> bool {
    let mut list = MoveList::new();
    generate_pseudo_legal(pos, GenType::All, &mut list);
    list.iter().any(|m| resolves_check(pos, *m) && pos.legal(*m))
}

/// 指し手が現局面で合法か（外部入力の検証用）
pub fn is_legal_move(pos: &Position, m: Move) -> bool {
    m.is_ok() && generate_legal(pos).contains(&m)
}

/// 指定深さの末端局面数
pub fn perft(pos: &mut Position, depth: u32) -> u64 {
    let moves = generate_legal(pos);
    if depth <= 1 {
        return if depth == 1 { moves.len() as u64 } else { 1 };
    }
    let mut nodes = 0;
    for m in moves {
        pos.do_move(m);
        nodes += perft(pos, depth - 1);
        pos.undo_move(m);
    }
    nodes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::START_FEN;

    fn perft_fen(fen: &str, depth: u32) -> u64 {
        let mut pos = Position::new();
        pos.set_fen(fen).unwrap();
        perft(&mut pos, depth)
    }

    #[test]
    fn test_perft_startpos() {
        assert_eq!(perft_fen(START_FEN, 1), 20);
        assert_eq!(perft_fen(START_FEN, 2), 400);
        assert_eq!(perft_fen(START_FEN, 3), 8902);
    }

    #[test]
    fn test_perft_kiwipete() {
        let fen = "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1";
        assert_eq!(perft_fen(fen, 1), 48);
        assert_eq!(perft_fen(fen, 2), 2039);
        assert_eq!(perft_fen(fen, 3), 97862);
    }

    #[test]
    fn test_perft_endgame_ep_pins() {
        let fen = "8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1";
        assert_eq!(perft_fen(fen, 1), 14);
        assert_eq!(perft_fen(fen, 2), 191);
        assert_eq!(perft_fen(fen, 3), 2812);
        assert_eq!(perft_fen(fen, 4), 43238);
    }

    #[test]
    fn test_perft_promotions() {
        let fen = "rnbq1k1r/pp1Pbppp/2p5/8/2B5/8/PPP1NnPP/RNBQK2R w KQ - 1 8";
        assert_eq!(perft_fen(fen, 1), 44);
        assert_eq!(perft_fen(fen, 2), 1486);
        assert_eq!(perft_fen(fen, 3), 62379);
    }

    #[test]
    fn test_perft_chess960() {
        // Chess960 局面（Shredder 表記）
        let fen = "bqnb1rkr/pp3ppp/3ppn2/2p5/5P2/P2P4/NPP1P1PP/BQ1BNRKR w HFhf - 2 9";
        assert_eq!(perft_fen(fen, 1), 21);
        assert_eq!(perft_fen(fen, 2), 528);
        assert_eq!(perft_fen(fen, 3), 12189);
    }

    #[test]
    fn test_generate_captures() {
        let mut pos = Position::new();
        pos.set_fen("4k3/1P6/8/3p4/4P3/8/8/4K3 w - - 0 1").unwrap();
        let caps = generate_captures(&pos);
        let ucis: Vec<String> = caps.iter().map(|m| m.to_uci(false)).collect();
        assert!(ucis.contains(&"e4d5".to_string()));
        assert!(ucis.contains(&"b7b8q".to_string()));
        assert!(!ucis.contains(&"b7b8n".to_string()));
        assert!(!ucis.contains(&"e4e5".to_string()));
    }

    #[test]
    fn test_checkmate_has_no_moves() {
        let mut pos = Position::new();
        // 愚者のメイト
        pos.set_fen("rnb1kbnr/pppp1ppp/8/4p3/6Pq/5P2/PPPPP2P/RNBQKBNR w KQkq - 1 3").unwrap();
        assert!(pos.in_check());
        assert!(!has_legal_moves(&pos));
        assert!(generate_legal(&pos).is_empty());
    }

    #[test]
    fn test_is_legal_move() {
        let pos = Position::startpos();
        assert!(is_legal_move(&pos, Move::normal(Square::E2, Square::E4)));
        assert!(!is_legal_move(&pos, Move::normal(Square::E2, Square::E5)));
        assert!(!is_legal_move(&pos, Move::NONE));
    }
}
