//! FEN 文字列の読み書き
//!
//! - 6フィールド（盤面・手番・キャスリング・アンパッサン・50手カウンタ・手数）
//! - キャスリングは `KQkq` のほか Shredder/X-FEN の筋文字（`A`-`H`, `a`-`h`）を受け付け、
//!   筋文字が現れた場合は Chess960 表記として扱う
//! - アンパッサン升は実際に取れる場合だけ保持する

use super::pos::{BLACK_OO, BLACK_OOO, Position, WHITE_OO, WHITE_OOO};
use crate::bitboard::pawn_attacks;
use crate::nnue::PieceNumber;
use crate::types::{Color, File, Piece, PieceType, Rank, Square};

/// 平手初期局面
pub const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// FEN 解析エラー
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FenError {
    #[error("missing field: {0}")]
    MissingField(&'static str),
    #[error("invalid piece placement: {0}")]
    InvalidBoard(String),
    #[error("invalid side to move: {0}")]
    InvalidSideToMove(String),
    #[error("invalid castling field: {0}")]
    InvalidCastling(String),
    #[error("invalid en passant square: {0}")]
    InvalidEnPassant(String),
    #[error("invalid move counter: {0}")]
    InvalidCounter(String),
    #[error("each side needs exactly one king")]
    KingCount,
}

impl Position {
    /// FEN 文字列から局面を設定
    ///
    /// 50手カウンタと手数は省略可能（省略時は 0 と 1）。
    pub fn set_fen(&mut self, fen: &str) -> Result<(), FenError> {
        let mut fields = fen.split_whitespace();
        let board = fields.next().ok_or(FenError::MissingField("board"))?;
        let side = fields.next().ok_or(FenError::MissingField("side to move"))?;
        let castling = fields.next().unwrap_or("-");
        let ep = fields.next().unwrap_or("-");
        let rule50 = fields.next().unwrap_or("0");
        let fullmove = fields.next().unwrap_or("1");

        self.clear();

        // 1. 盤面（8段目から1段目へ）
        let mut next_no = 0u8;
        let mut rank = 7i32;
        let mut file = 0i32;
        for c in board.chars() {
            match c {
                '/' => {
                    if file != 8 {
                        return Err(FenError::InvalidBoard(board.to_string()));
                    }
                    rank -= 1;
                    file = 0;
                }
                '1'..='8' => file += c as i32 - '0' as i32,
                _ => {
                    let pc = Piece::from_char(c)
                        .ok_or_else(|| FenError::InvalidBoard(board.to_string()))?;
                    if !(0..8).contains(&file) || !(0..8).contains(&rank) {
                        return Err(FenError::InvalidBoard(board.to_string()));
                    }
                    let sq = Square::new(File::new(file as u8), Rank::new(rank as u8));
                    let no = if pc.kind() == PieceType::King {
                        if self.pieces(pc.color(), PieceType::King).is_not_empty() {
                            return Err(FenError::KingCount);
                        }
                        PieceNumber::king(pc.color())
                    } else {
                        if next_no >= PieceNumber::KING {
                            return Err(FenError::InvalidBoard(board.to_string()));
                        }
                        next_no += 1;
                        PieceNumber(next_no - 1)
                    };
                    self.put_piece(pc, sq);
                    self.piece_list.put_piece(no, sq, pc);
                    file += 1;
                }
            }
            if file > 8 {
                return Err(FenError::InvalidBoard(board.to_string()));
            }
        }
        if rank != 0 || file != 8 {
            return Err(FenError::InvalidBoard(board.to_string()));
        }
        for c in Color::ALL {
            if self.pieces(c, PieceType::King).count() != 1 {
                return Err(FenError::KingCount);
            }
        }

        // 2. 手番
        self.side_to_move = match side {
            "w" => Color::White,
            "b" => Color::Black,
            _ => return Err(FenError::InvalidSideToMove(side.to_string())),
        };

        // 3. キャスリング権
        if castling != "-" {
            for c in castling.chars() {
                let color = if c.is_ascii_uppercase() { Color::White } else { Color::Black };
                let rook = Piece::new(color, PieceType::Rook);
                let back_rank = Rank::R1.relative(color);
                let ksq = self.king_square(color);
                if ksq.rank() != back_rank {
                    return Err(FenError::InvalidCastling(castling.to_string()));
                }

                let rsq = match c.to_ascii_uppercase() {
                    // 最も外側のルーク
                    'K' => (ksq.file().index() + 1..8)
                        .rev()
                        .map(|f| Square::new(File::new(f as u8), back_rank))
                        .find(|&s| self.piece_on(s) == rook),
                    'Q' => (0..ksq.file().index())
                        .map(|f| Square::new(File::new(f as u8), back_rank))
                        .find(|&s| self.piece_on(s) == rook),
                    'A'..='H' => {
                        self.chess960 = true;
                        let f = File::from_char(c.to_ascii_lowercase())
                            .ok_or_else(|| FenError::InvalidCastling(castling.to_string()))?;
                        let s = Square::new(f, back_rank);
                        (self.piece_on(s) == rook).then_some(s)
                    }
                    _ => None,
                };
                let rsq = rsq.ok_or_else(|| FenError::InvalidCastling(castling.to_string()))?;
                self.set_castling_right(color, rsq);
            }
        }

        // 4. アンパッサン升（取れる場合のみ保持）
        if ep != "-" {
            let sq = Square::parse(ep).ok_or_else(|| FenError::InvalidEnPassant(ep.to_string()))?;
            let us = self.side_to_move;
            let them = !us;
            if sq.rank() != Rank::R6.relative(us) {
                return Err(FenError::InvalidEnPassant(ep.to_string()));
            }
            let capturable = (pawn_attacks(them, sq) & self.pieces(us, PieceType::Pawn))
                .is_not_empty()
                && sq.offset(them.pawn_push()).is_some_and(|s| {
                    self.piece_on(s) == Piece::new(them, PieceType::Pawn)
                })
                && self.is_empty(sq)
                && sq.offset(us.pawn_push()).is_some_and(|s| self.is_empty(s));
            if capturable {
                self.states[self.st].ep_square = Some(sq);
            }
        }

        // 5. 50手カウンタと手数
        let rule50: i32 =
            rule50.parse().map_err(|_| FenError::InvalidCounter(rule50.to_string()))?;
        let fullmove: i32 =
            fullmove.parse().map_err(|_| FenError::InvalidCounter(fullmove.to_string()))?;
        self.states[self.st].rule50 = rule50.max(0);
        self.game_ply = (2 * (fullmove - 1)).max(0) + i32::from(self.side_to_move == Color::Black);

        self.set_state();
        Ok(())
    }

    /// 局面を FEN 文字列にする
    pub fn fen(&self) -> String {
        let mut s = String::with_capacity(90);

        for r in (0..8u8).rev() {
            let mut empty = 0;
            for f in 0..8u8 {
                let pc = self.piece_on(Square::new(File::new(f), Rank::new(r)));
                if pc.is_none() {
                    empty += 1;
                    continue;
                }
                if empty > 0 {
                    s.push(char::from(b'0' + empty));
                    empty = 0;
                }
                s.push(pc.to_char());
            }
            if empty > 0 {
                s.push(char::from(b'0' + empty));
            }
            if r > 0 {
                s.push('/');
            }
        }

        s.push_str(if self.side_to_move == Color::White { " w " } else { " b " });

        let rights = [(WHITE_OO, 'K'), (WHITE_OOO, 'Q'), (BLACK_OO, 'k'), (BLACK_OOO, 'q')];
        let mut any = false;
        for (cr, ch) in rights {
            if !self.can_castle(cr) {
                continue;
            }
            any = true;
            if self.chess960 {
                let f = self.castling_rook_square(cr).map_or('-', |sq| sq.file().to_char());
                s.push(if ch.is_ascii_uppercase() { f.to_ascii_uppercase() } else { f });
            } else {
                s.push(ch);
            }
        }
        if !any {
            s.push('-');
        }

        match self.ep_square() {
            Some(ep) => s.push_str(&format!(" {ep} ")),
            None => s.push_str(" - "),
        }
        let fullmove = 1 + (self.game_ply - i32::from(self.side_to_move == Color::Black)) / 2;
        s.push_str(&format!("{} {}", self.rule50_count(), fullmove));
        s
    }

    /// 局面の左右反転（a筋 ↔ h筋）
    ///
    /// キャスリング権は落とす。
    pub fn mirrored_fen(&self) -> String {
        let fen = self.fen();
        let mut fields = fen.split(' ');
        let board: Vec<String> = fields
            .next()
            .unwrap_or_default()
            .split('/')
            .map(|rank| {
                let mut expanded = String::new();
                for c in rank.chars() {
                    match c.to_digit(10) {
                        Some(n) => expanded.extend(std::iter::repeat_n('1', n as usize)),
                        None => expanded.push(c),
                    }
                }
                compress_empty(&expanded.chars().rev().collect::<String>())
            })
            .collect();
        let side = fields.next().unwrap_or("w");
        let _castling = fields.next();
        let ep = fields
            .next()
            .and_then(Square::parse)
            .map_or("-".to_string(), |sq| sq.mirror().to_string());
        let rule50 = fields.next().unwrap_or("0");
        let fullmove = fields.next().unwrap_or("1");
        format!("{} {side} - {ep} {rule50} {fullmove}", board.join("/"))
    }
}

fn compress_empty(rank: &str) -> String {
    let mut out = String::new();
    let mut empty = 0u8;
    for c in rank.chars() {
        if c == '1' {
            empty += 1;
            continue;
        }
        if empty > 0 {
            out.push(char::from(b'0' + empty));
            empty = 0;
        }
        out.push(c);
    }
    if empty > 0 {
        out.push(char::from(b'0' + empty));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fen_roundtrip() {
        let fens = [
            START_FEN,
            "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
            "8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1",
            "rnbq1k1r/pp1Pbppp/2p5/8/2B5/8/PPP1NnPP/RNBQK2R w KQ - 1 8",
        ];
        for fen in fens {
            let mut pos = Position::new();
            pos.set_fen(fen).unwrap();
            assert_eq!(pos.fen(), fen);
        }
    }

    #[test]
    fn test_fen_ep_only_when_capturable() {
        let mut pos = Position::new();
        pos.set_fen("rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1").unwrap();
        assert_eq!(pos.ep_square(), None);

        pos.set_fen("rnbqkbnr/ppp1pppp/8/8/3pP3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 3").unwrap();
        assert_eq!(pos.ep_square(), Some(Square::E3));
    }

    #[test]
    fn test_fen_shredder_castling() {
        let mut pos = Position::new();
        pos.set_fen("1r2k1r1/8/8/8/8/8/8/1R2K1R1 w GBgb - 0 1").unwrap();
        assert!(pos.is_chess960());
        assert_eq!(pos.castling_rook_square(WHITE_OO), Some(Square::G1));
        assert_eq!(pos.castling_rook_square(BLACK_OOO), Some(Square::B8));
        assert_eq!(pos.fen(), "1r2k1r1/8/8/8/8/8/8/1R2K1R1 w GBgb - 0 1");
    }

    #[test]
    fn test_fen_piece_numbers() {
        let pos = Position::startpos();
        // 8段目の a8 ルークが最初の番号
        assert_eq!(pos.piece_list().piece_no_of_board(Square::A8), PieceNumber(0));
        assert_eq!(pos.piece_list().piece_no_of_board(Square::E8), PieceNumber::king(Color::Black));
        assert_eq!(pos.piece_list().piece_no_of_board(Square::E1), PieceNumber::king(Color::White));
        assert_eq!(pos.piece_list().piece_no_of_board(Square::H1), PieceNumber(29));
    }

    #[test]
    fn test_fen_errors() {
        let mut pos = Position::new();
        assert_eq!(pos.set_fen(""), Err(FenError::MissingField("board")));
        assert!(matches!(pos.set_fen("8/8/8/8/8/8/8/8 w - - 0 1"), Err(FenError::KingCount)));
        assert!(matches!(
            pos.set_fen("4k3/8/8/8/8/8/8/4K3 x - - 0 1"),
            Err(FenError::InvalidSideToMove(_))
        ));
        assert!(matches!(pos.set_fen("4k3/8/8/9/8/8/8/4K3 w - - 0 1"), Err(FenError::InvalidBoard(_))));
        assert!(matches!(
            pos.set_fen("4k3/8/8/8/8/8/8/4K3 w K - 0 1"),
            Err(FenError::InvalidCastling(_))
        ));
    }

    #[test]
    fn test_mirrored_fen() {
        let mut pos = Position::new();
        pos.set_fen("4k3/8/8/8/8/8/1P6/R3K3 w Q - 0 1").unwrap();
        assert_eq!(pos.mirrored_fen(), "3k4/8/8/8/8/8/6P1/3K3R w - - 0 1");
    }
}
