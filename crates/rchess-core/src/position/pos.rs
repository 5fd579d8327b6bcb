//! 局面（Position）

use super::state::StateInfo;
use super::zobrist::{
    zobrist_castling, zobrist_enpassant, zobrist_material, zobrist_no_pawns, zobrist_psq,
    zobrist_side,
};
use crate::bitboard::{
    self, Bitboard, between, bishop_attacks, king_attacks, knight_attacks, pawn_attacks,
    rook_attacks,
};
use crate::eval::piece_value_mg;
use crate::movegen;
use crate::nnue::{DirtyPiece, ExtBonaPiece, PieceList, PieceNumber};
use crate::types::{Color, File, Move, MoveKind, Piece, PieceType, Rank, Square};

/// 白のキングサイドキャスリング権
pub const WHITE_OO: u8 = 1;
/// 白のクイーンサイドキャスリング権
pub const WHITE_OOO: u8 = 2;
/// 黒のキングサイドキャスリング権
pub const BLACK_OO: u8 = 4;
/// 黒のクイーンサイドキャスリング権
pub const BLACK_OOO: u8 = 8;
/// 全キャスリング権
pub const ANY_CASTLING: u8 = 15;

/// StateInfo プールの初期容量
const STATE_POOL_CAPACITY: usize = 512;

#[inline]
const fn castling_index(cr: u8) -> usize {
    cr.trailing_zeros() as usize
}

/// 局面
#[derive(Clone)]
pub struct Position {
    /// 盤面 [Square]
    pub(super) board: [Piece; Square::NUM],
    /// 駒種別 Bitboard
    pub(super) by_type: [Bitboard; PieceType::NUM],
    /// 手番別 Bitboard
    pub(super) by_color: [Bitboard; Color::NUM],
    /// 駒の枚数 [Piece]
    pub(super) piece_count: [u8; Piece::NUM],
    /// 手番
    pub(super) side_to_move: Color,
    /// 開始局面からの手数（半手）
    pub(super) game_ply: i32,
    /// Chess960 の表記を使うか
    pub(super) chess960: bool,
    /// 升ごとの、駒が動くと失われるキャスリング権
    pub(super) castling_rights_mask: [u8; Square::NUM],
    /// キャスリング権ごとのルーク初期位置
    pub(super) castling_rook_square: [Option<Square>; 4],
    /// キャスリング権ごとの、空いている必要のある升
    pub(super) castling_path: [Bitboard; 4],
    /// NNUE 用の駒番号 ↔ BonaPiece 表
    pub(super) piece_list: PieceList,
    /// StateInfo プール（手数の深さでインデックス）
    pub(super) states: Vec<StateInfo>,
    /// 現在の StateInfo のインデックス
    pub(super) st: usize,
}

impl Position {
    /// 空の局面を生成
    pub fn new() -> Self {
        let mut states = Vec::with_capacity(STATE_POOL_CAPACITY);
        states.push(StateInfo::new());
        Self {
            board: [Piece::NONE; Square::NUM],
            by_type: [Bitboard::EMPTY; PieceType::NUM],
            by_color: [Bitboard::EMPTY; Color::NUM],
            piece_count: [0; Piece::NUM],
            side_to_move: Color::White,
            game_ply: 0,
            chess960: false,
            castling_rights_mask: [0; Square::NUM],
            castling_rook_square: [None; 4],
            castling_path: [Bitboard::EMPTY; 4],
            piece_list: PieceList::new(),
            states,
            st: 0,
        }
    }

    /// 平手初期局面
    pub fn startpos() -> Self {
        let mut pos = Self::new();
        pos.set_startpos();
        pos
    }

    /// 平手初期局面に設定
    pub fn set_startpos(&mut self) {
        self.set_fen(super::START_FEN).expect("START_FEN is a valid FEN");
    }

    // ========== 盤面参照 ==========

    #[inline]
    pub fn piece_on(&self, sq: Square) -> Piece {
        self.board[sq.index()]
    }

    #[inline]
    pub fn is_empty(&self, sq: Square) -> bool {
        self.board[sq.index()].is_none()
    }

    #[inline]
    pub fn occupied(&self) -> Bitboard {
        self.by_color[0] | self.by_color[1]
    }

    #[inline]
    pub fn pieces_pt(&self, pt: PieceType) -> Bitboard {
        self.by_type[pt.index()]
    }

    #[inline]
    pub fn pieces_c(&self, c: Color) -> Bitboard {
        self.by_color[c.index()]
    }

    #[inline]
    pub fn pieces(&self, c: Color, pt: PieceType) -> Bitboard {
        self.by_color[c.index()] & self.by_type[pt.index()]
    }

    /// 駒の枚数
    #[inline]
    pub fn count(&self, pc: Piece) -> usize {
        self.piece_count[pc.index()] as usize
    }

    #[inline]
    pub fn king_square(&self, c: Color) -> Square {
        debug_assert!(self.pieces(c, PieceType::King).is_not_empty());
        self.pieces(c, PieceType::King).lsb().unwrap_or(Square::A1)
    }

    #[inline]
    pub fn side_to_move(&self) -> Color {
        self.side_to_move
    }

    #[inline]
    pub fn game_ply(&self) -> i32 {
        self.game_ply
    }

    #[inline]
    pub fn is_chess960(&self) -> bool {
        self.chess960
    }

    #[inline]
    pub fn piece_list(&self) -> &PieceList {
        &self.piece_list
    }

    // ========== StateInfo 参照 ==========

    #[inline]
    pub fn state(&self) -> &StateInfo {
        &self.states[self.st]
    }

    #[inline]
    pub fn state_mut(&mut self) -> &mut StateInfo {
        &mut self.states[self.st]
    }

    /// 現在の StateInfo のプール内インデックス
    #[inline]
    pub fn state_index(&self) -> usize {
        self.st
    }

    /// プール内インデックスで StateInfo を参照
    #[inline]
    pub fn state_at(&self, idx: usize) -> &StateInfo {
        &self.states[idx]
    }

    #[inline]
    pub fn key(&self) -> u64 {
        self.state().key
    }

    #[inline]
    pub fn material_key(&self) -> u64 {
        self.state().material_key
    }

    #[inline]
    pub fn pawn_key(&self) -> u64 {
        self.state().pawn_key
    }

    #[inline]
    pub fn rule50_count(&self) -> i32 {
        self.state().rule50
    }

    #[inline]
    pub fn ep_square(&self) -> Option<Square> {
        self.state().ep_square
    }

    #[inline]
    pub fn castling_rights(&self) -> u8 {
        self.state().castling_rights
    }

    #[inline]
    pub fn non_pawn_material(&self, c: Color) -> i32 {
        self.state().non_pawn_material[c.index()]
    }

    #[inline]
    pub fn captured_piece(&self) -> Piece {
        self.state().captured_piece
    }

    #[inline]
    pub fn checkers(&self) -> Bitboard {
        self.state().checkers
    }

    #[inline]
    pub fn in_check(&self) -> bool {
        self.state().checkers.is_not_empty()
    }

    #[inline]
    pub fn blockers_for_king(&self, c: Color) -> Bitboard {
        self.state().blockers_for_king[c.index()]
    }

    #[inline]
    pub fn check_squares(&self, pt: PieceType) -> Bitboard {
        self.state().check_squares[pt.index()]
    }

    // ========== キャスリング ==========

    #[inline]
    pub fn can_castle(&self, cr: u8) -> bool {
        self.state().castling_rights & cr != 0
    }

    /// キャスリング経路が塞がれているか
    #[inline]
    pub fn castling_impeded(&self, cr: u8) -> bool {
        (self.occupied() & self.castling_path[castling_index(cr)]).is_not_empty()
    }

    #[inline]
    pub fn castling_rook_square(&self, cr: u8) -> Option<Square> {
        self.castling_rook_square[castling_index(cr)]
    }

    /// キャスリング権を設定（局面設定時）
    pub(super) fn set_castling_right(&mut self, c: Color, rfrom: Square) {
        let kfrom = self.king_square(c);
        let king_side = rfrom > kfrom;
        let cr = match (c, king_side) {
            (Color::White, true) => WHITE_OO,
            (Color::White, false) => WHITE_OOO,
            (Color::Black, true) => BLACK_OO,
            (Color::Black, false) => BLACK_OOO,
        };

        self.states[self.st].castling_rights |= cr;
        self.castling_rights_mask[kfrom.index()] |= cr;
        self.castling_rights_mask[rfrom.index()] |= cr;
        self.castling_rook_square[castling_index(cr)] = Some(rfrom);

        let (kto, rto) = castling_destinations(c, king_side);
        self.castling_path[castling_index(cr)] = (between(rfrom, rto) | between(kfrom, kto))
            & !(Bitboard::from_square(kfrom) | Bitboard::from_square(rfrom));
    }

    // ========== 利き ==========

    /// 指定升に利いている駒（両手番）
    pub fn attackers_to_occ(&self, sq: Square, occupied: Bitboard) -> Bitboard {
        (pawn_attacks(Color::Black, sq) & self.pieces(Color::White, PieceType::Pawn))
            | (pawn_attacks(Color::White, sq) & self.pieces(Color::Black, PieceType::Pawn))
            | (knight_attacks(sq) & self.pieces_pt(PieceType::Knight))
            | (rook_attacks(sq, occupied)
                & (self.pieces_pt(PieceType::Rook) | self.pieces_pt(PieceType::Queen)))
            | (bishop_attacks(sq, occupied)
                & (self.pieces_pt(PieceType::Bishop) | self.pieces_pt(PieceType::Queen)))
            | (king_attacks(sq) & self.pieces_pt(PieceType::King))
    }

    #[inline]
    pub fn attackers_to(&self, sq: Square) -> Bitboard {
        self.attackers_to_occ(sq, self.occupied())
    }

    /// `s` への飛び駒の利きを遮っている駒と、その遮りの原因となる飛び駒
    pub fn slider_blockers(&self, sliders: Bitboard, s: Square) -> (Bitboard, Bitboard) {
        let mut blockers = Bitboard::EMPTY;
        let mut pinners = Bitboard::EMPTY;

        let rq = self.pieces_pt(PieceType::Rook) | self.pieces_pt(PieceType::Queen);
        let bq = self.pieces_pt(PieceType::Bishop) | self.pieces_pt(PieceType::Queen);
        let snipers = ((rook_attacks(s, Bitboard::EMPTY) & rq)
            | (bishop_attacks(s, Bitboard::EMPTY) & bq))
            & sliders;
        let occupancy = self.occupied() ^ snipers;
        let owner = self.piece_on(s);

        for sniper in snipers {
            let b = between(s, sniper) & occupancy;
            if b.is_not_empty() && !b.more_than_one() {
                blockers |= b;
                if owner.is_some() && (b & self.pieces_c(owner.color())).is_not_empty() {
                    pinners |= Bitboard::from_square(sniper);
                }
            }
        }
        (blockers, pinners)
    }

    /// pin 情報と王手升を現在の StateInfo に設定
    pub(super) fn set_check_info(&mut self) {
        let (wb, bp) = self.slider_blockers(
            self.pieces_c(Color::Black),
            self.king_square(Color::White),
        );
        let (bb, wp) = self.slider_blockers(
            self.pieces_c(Color::White),
            self.king_square(Color::Black),
        );

        let them = !self.side_to_move;
        let ksq = self.king_square(them);
        let occ = self.occupied();
        let bishop = bishop_attacks(ksq, occ);
        let rook = rook_attacks(ksq, occ);

        let st = &mut self.states[self.st];
        st.blockers_for_king = [wb, bb];
        st.pinners = [wp, bp];
        st.check_squares = [
            pawn_attacks(them, ksq),
            knight_attacks(ksq),
            bishop,
            rook,
            bishop | rook,
            Bitboard::EMPTY,
        ];
    }

    // ========== 盤面操作（Bitboard のみ） ==========

    pub(super) fn put_piece(&mut self, pc: Piece, sq: Square) {
        debug_assert!(self.board[sq.index()].is_none());
        let b = Bitboard::from_square(sq);
        self.board[sq.index()] = pc;
        self.by_type[pc.kind().index()] |= b;
        self.by_color[pc.color().index()] |= b;
        self.piece_count[pc.index()] += 1;
    }

    pub(super) fn remove_piece(&mut self, sq: Square) {
        let pc = self.board[sq.index()];
        debug_assert!(pc.is_some());
        let b = Bitboard::from_square(sq);
        self.by_type[pc.kind().index()] ^= b;
        self.by_color[pc.color().index()] ^= b;
        self.board[sq.index()] = Piece::NONE;
        self.piece_count[pc.index()] -= 1;
    }

    fn move_piece(&mut self, from: Square, to: Square) {
        let pc = self.board[from.index()];
        let b = Bitboard::from_square(from) | Bitboard::from_square(to);
        self.by_type[pc.kind().index()] ^= b;
        self.by_color[pc.color().index()] ^= b;
        self.board[from.index()] = Piece::NONE;
        self.board[to.index()] = pc;
    }

    // ========== 指し手の性質 ==========

    /// 駒を取る手か（アンパッサン含む、キャスリングは除く）
    #[inline]
    pub fn is_capture(&self, m: Move) -> bool {
        (self.piece_on(m.to_sq()).is_some() && m.kind() != MoveKind::Castling)
            || m.kind() == MoveKind::EnPassant
    }

    /// 動かす駒
    #[inline]
    pub fn moved_piece(&self, m: Move) -> Piece {
        self.piece_on(m.from_sq())
    }

    /// 擬似合法手が合法か（自玉を王手にさらさないか）
    pub fn legal(&self, m: Move) -> bool {
        let us = self.side_to_move;
        let them = !us;
        let from = m.from_sq();
        let mut to = m.to_sq();
        let ksq = self.king_square(us);

        match m.kind() {
            MoveKind::EnPassant => {
                let Some(capsq) = to.offset(-us.pawn_push()) else {
                    return false;
                };
                let occ = (self.occupied()
                    ^ Bitboard::from_square(from)
                    ^ Bitboard::from_square(capsq))
                    | Bitboard::from_square(to);
                let rq = self.pieces(them, PieceType::Rook) | self.pieces(them, PieceType::Queen);
                let bq =
                    self.pieces(them, PieceType::Bishop) | self.pieces(them, PieceType::Queen);
                (rook_attacks(ksq, occ) & rq).is_empty() && (bishop_attacks(ksq, occ) & bq).is_empty()
            }
            MoveKind::Castling => {
                let king_side = to > from;
                let (kto, _) = castling_destinations(us, king_side);
                to = kto;
                let step: i8 = if to > from { -1 } else { 1 };
                let mut s = to;
                while s != from {
                    if (self.attackers_to(s) & self.pieces_c(them)).is_not_empty() {
                        return false;
                    }
                    match s.offset(step) {
                        Some(next) => s = next,
                        None => return false,
                    }
                }
                !self.chess960 || !self.blockers_for_king(us).contains(m.to_sq())
            }
            _ if from == ksq => {
                let occ = self.occupied() ^ Bitboard::from_square(from);
                (self.attackers_to_occ(to, occ) & self.pieces_c(them)).is_empty()
            }
            _ => !self.blockers_for_king(us).contains(from) || bitboard::aligned(from, to, ksq),
        }
    }

    // ========== 指し手実行 ==========

    /// 次の StateInfo スロットを準備してインデックスを返す
    fn push_state(&mut self) -> usize {
        let prev_idx = self.st;
        let next = prev_idx + 1;
        if next == self.states.len() {
            self.states.push(StateInfo::new());
        }
        let (head, tail) = self.states.split_at_mut(next);
        tail[0].inherit(&head[prev_idx], prev_idx);
        self.st = next;
        next
    }

    /// 指し手を実行
    ///
    /// 盤面・ハッシュ・キャスリング権・アンパッサン・PieceList を差分更新し、
    /// 新しい StateInfo の DirtyPiece に変化した駒番号（最大2）を記録する。
    pub fn do_move(&mut self, m: Move) {
        debug_assert!(m.is_ok());
        let us = self.side_to_move;
        let them = !us;
        let from = m.from_sq();
        let mut to = m.to_sq();
        let pc = self.piece_on(from);
        let mut captured = if m.kind() == MoveKind::EnPassant {
            Piece::new(them, PieceType::Pawn)
        } else {
            self.piece_on(to)
        };
        debug_assert!(pc.is_some() && pc.color() == us);

        // 1. 新しいStateInfoを作成
        let idx = self.push_state();
        self.game_ply += 1;

        let (mut key, mut pawn_key, mut material_key, mut npm, mut castling_rights, mut ep) = {
            let st = &self.states[idx];
            (
                st.key ^ zobrist_side(),
                st.pawn_key,
                st.material_key,
                st.non_pawn_material,
                st.castling_rights,
                st.ep_square,
            )
        };
        let mut rule50 = self.states[idx].rule50;
        let mut dp = DirtyPiece::new();

        // 2. キャスリング（キングとルークを両方取り除いてから置き直す）
        if m.kind() == MoveKind::Castling {
            debug_assert!(pc.kind() == PieceType::King);
            debug_assert!(captured == Piece::new(us, PieceType::Rook));
            let rook = captured;
            let (kto, rto) = self.do_castling(us, from, to, Some(&mut dp));
            key ^= zobrist_psq(rook, to) ^ zobrist_psq(rook, rto);
            key ^= zobrist_psq(pc, from) ^ zobrist_psq(pc, kto);
            captured = Piece::NONE;
            to = kto;
        }

        // 3. 駒を取る場合
        let mut captured_change = None;
        if captured.is_some() {
            let mut capsq = to;
            if captured.kind() == PieceType::Pawn {
                if m.kind() == MoveKind::EnPassant {
                    capsq = to.offset(-us.pawn_push()).unwrap_or(to);
                    debug_assert!(self.piece_on(capsq) == captured);
                }
                pawn_key ^= zobrist_psq(captured, capsq);
            } else {
                npm[them.index()] -= piece_value_mg(captured.kind());
            }

            let no1 = self.piece_list.piece_no_of_board(capsq);
            let old1 = self.piece_list.bona_piece(no1);
            self.remove_piece(capsq);
            self.piece_list.remove_piece(no1, capsq);
            captured_change = Some((no1, old1));

            key ^= zobrist_psq(captured, capsq);
            material_key ^= zobrist_material(captured, self.count(captured));
            rule50 = 0;
        }

        if m.kind() != MoveKind::Castling {
            key ^= zobrist_psq(pc, from) ^ zobrist_psq(pc, to);
        }

        // 4. アンパッサン升のリセット
        if let Some(ep_sq) = ep.take() {
            key ^= zobrist_enpassant(ep_sq.file());
        }

        // 5. キャスリング権の更新
        let lost = self.castling_rights_mask[from.index()] | self.castling_rights_mask[to.index()];
        if castling_rights != 0 && lost != 0 {
            key ^= zobrist_castling(castling_rights);
            castling_rights &= !lost;
            key ^= zobrist_castling(castling_rights);
        }

        // 6. 駒の移動
        let mut no0 = PieceNumber::NONE;
        if m.kind() != MoveKind::Castling {
            no0 = self.piece_list.piece_no_of_board(from);
            let old0 = self.piece_list.bona_piece(no0);
            self.move_piece(from, to);
            self.piece_list.clear_square(from);
            self.piece_list.put_piece(no0, to, pc);
            dp.push(no0, old0, self.piece_list.bona_piece(no0));
            if let Some((no1, old1)) = captured_change {
                dp.push(no1, old1, ExtBonaPiece::ZERO);
            }
        }

        // 7. ポーン特有の処理
        if pc.kind() == PieceType::Pawn {
            let push_back = to.offset(-us.pawn_push());
            if (to.raw() ^ from.raw()) == 16
                && let Some(ep_sq) = push_back
                && (pawn_attacks(us, ep_sq) & self.pieces(them, PieceType::Pawn)).is_not_empty()
            {
                ep = Some(ep_sq);
                key ^= zobrist_enpassant(ep_sq.file());
            } else if m.kind() == MoveKind::Promotion {
                let promotion = Piece::new(us, m.promotion_type());
                self.remove_piece(to);
                self.put_piece(promotion, to);
                self.piece_list.put_piece(no0, to, promotion);
                dp.set_new_piece(0, self.piece_list.bona_piece(no0));

                key ^= zobrist_psq(pc, to) ^ zobrist_psq(promotion, to);
                pawn_key ^= zobrist_psq(pc, to);
                material_key ^= zobrist_material(promotion, self.count(promotion) - 1)
                    ^ zobrist_material(pc, self.count(pc));
                npm[us.index()] += piece_value_mg(promotion.kind());
            }

            pawn_key ^= zobrist_psq(pc, from) ^ zobrist_psq(pc, to);
            rule50 = 0;
        }

        // 8. 手番交代と StateInfo の確定
        self.side_to_move = them;
        let checkers = self.attackers_to(self.king_square(them)) & self.pieces_c(us);
        {
            let st = &mut self.states[idx];
            st.key = key;
            st.pawn_key = pawn_key;
            st.material_key = material_key;
            st.non_pawn_material = npm;
            st.castling_rights = castling_rights;
            st.ep_square = ep;
            st.rule50 = rule50;
            st.captured_piece = captured;
            st.checkers = checkers;
            st.dirty_piece = dp;
        }
        self.set_check_info();

        // 9. 千日手（同一局面）情報
        let repetition = self.find_repetition(idx);
        self.states[idx].repetition = repetition;
    }

    /// 同一局面が何手前に現れたか（3回目なら負、なければ0）
    fn find_repetition(&self, idx: usize) -> i32 {
        let st = &self.states[idx];
        let end = st.rule50.min(st.plies_from_null);
        if end < 4 {
            return 0;
        }
        let step_back = |i: usize| self.states[i].previous.and_then(|p| self.states[p].previous);
        let Some(mut p) = step_back(idx) else {
            return 0;
        };
        let mut i = 4;
        while i <= end {
            let Some(next) = step_back(p) else {
                return 0;
            };
            p = next;
            if self.states[p].key == st.key {
                return if self.states[p].repetition != 0 { -i } else { i };
            }
            i += 2;
        }
        0
    }

    /// キャスリングの駒移動（`dirty` が Some なら実行、None なら取り消し）
    ///
    /// キングとルークの升が重なる配置（Chess960）に備え、両方を取り除いてから置き直す。
    fn do_castling(
        &mut self,
        us: Color,
        kfrom: Square,
        rfrom: Square,
        dirty: Option<&mut DirtyPiece>,
    ) -> (Square, Square) {
        let king_side = rfrom > kfrom;
        let (kto, rto) = castling_destinations(us, king_side);
        let king = Piece::new(us, PieceType::King);
        let rook = Piece::new(us, PieceType::Rook);

        match dirty {
            Some(dp) => {
                let no0 = self.piece_list.piece_no_of_board(kfrom);
                let no1 = self.piece_list.piece_no_of_board(rfrom);
                let old0 = self.piece_list.bona_piece(no0);
                let old1 = self.piece_list.bona_piece(no1);

                self.remove_piece(kfrom);
                self.remove_piece(rfrom);
                self.piece_list.clear_square(kfrom);
                self.piece_list.clear_square(rfrom);
                self.put_piece(king, kto);
                self.put_piece(rook, rto);
                self.piece_list.put_piece(no0, kto, king);
                self.piece_list.put_piece(no1, rto, rook);

                dp.push(no0, old0, self.piece_list.bona_piece(no0));
                dp.push(no1, old1, self.piece_list.bona_piece(no1));
            }
            None => {
                let no0 = self.piece_list.piece_no_of_board(kto);
                let no1 = self.piece_list.piece_no_of_board(rto);

                self.remove_piece(kto);
                self.remove_piece(rto);
                self.piece_list.clear_square(kto);
                self.piece_list.clear_square(rto);
                self.put_piece(king, kfrom);
                self.put_piece(rook, rfrom);
                self.piece_list.put_piece(no0, kfrom, king);
                self.piece_list.put_piece(no1, rfrom, rook);
            }
        }
        (kto, rto)
    }

    /// 指し手を戻す
    ///
    /// do_move の完全な逆操作。PieceList の駒番号も元に戻る。
    pub fn undo_move(&mut self, m: Move) {
        self.side_to_move = !self.side_to_move;
        let us = self.side_to_move;
        let from = m.from_sq();
        let to = m.to_sq();

        let (captured, dp) = {
            let st = &self.states[self.st];
            (st.captured_piece, st.dirty_piece)
        };

        if m.kind() == MoveKind::Castling {
            self.do_castling(us, from, to, None);
        } else {
            let mut pc = self.piece_on(to);
            if m.kind() == MoveKind::Promotion {
                debug_assert!(pc.kind() == m.promotion_type());
                self.remove_piece(to);
                pc = Piece::new(us, PieceType::Pawn);
                self.put_piece(pc, to);
            }

            self.move_piece(to, from);
            let no0 = dp.piece_no[0];
            self.piece_list.clear_square(to);
            self.piece_list.put_piece(no0, from, pc);

            if captured.is_some() {
                let capsq = if m.kind() == MoveKind::EnPassant {
                    to.offset(-us.pawn_push()).unwrap_or(to)
                } else {
                    to
                };
                self.put_piece(captured, capsq);
                self.piece_list.put_piece(dp.piece_no[1], capsq, captured);
            }
        }

        self.pop_state();
        self.game_ply -= 1;
    }

    fn pop_state(&mut self) {
        match self.states[self.st].previous {
            Some(prev) => self.st = prev,
            None => debug_assert!(false, "undo past the root state"),
        }
    }

    /// null move（手番のみ変更）
    ///
    /// 盤面は変わらないので Accumulator はコピーして引き継ぎ、評価値キャッシュだけ捨てる。
    pub fn do_null_move(&mut self) {
        debug_assert!(!self.in_check());
        let prev_idx = self.st;
        let next = prev_idx + 1;
        if next == self.states.len() {
            self.states.push(StateInfo::new());
        }
        let (head, tail) = self.states.split_at_mut(next);
        let st = &mut tail[0];
        st.clone_from(&head[prev_idx]);
        st.previous = Some(prev_idx);
        st.dirty_piece.clear();
        st.accumulator.computed_score = false;
        if let Some(ep) = st.ep_square.take() {
            st.key ^= zobrist_enpassant(ep.file());
        }
        st.key ^= zobrist_side();
        st.rule50 += 1;
        st.plies_from_null = 0;
        st.captured_piece = Piece::NONE;
        st.checkers = Bitboard::EMPTY;
        st.repetition = 0;
        self.st = next;

        self.side_to_move = !self.side_to_move;
        self.set_check_info();
    }

    pub fn undo_null_move(&mut self) {
        self.pop_state();
        self.side_to_move = !self.side_to_move;
    }

    // ========== 終局判定 ==========

    /// 引き分けか（50手ルール、または探索開始 `ply` 手以内の同一局面）
    pub fn is_draw(&self, ply: i32) -> bool {
        let st = self.state();
        if st.rule50 > 99 && (!self.in_check() || movegen::has_legal_moves(self)) {
            return true;
        }
        st.repetition != 0 && st.repetition < ply
    }

    /// UCI 文字列から合法手を探す
    pub fn move_from_uci(&self, s: &str) -> Option<Move> {
        movegen::generate_legal(self)
            .into_iter()
            .find(|m| m.to_uci(self.chess960) == s || m.to_uci(!self.chess960) == s)
    }

    /// 指し手の UCI 表記
    pub fn move_to_uci(&self, m: Move) -> String {
        m.to_uci(self.chess960)
    }

    // ========== 局面設定の後処理 ==========

    /// 盤面からハッシュや駒割りを計算して現在の StateInfo に設定
    pub(super) fn set_state(&mut self) {
        let mut key = 0u64;
        let mut pawn_key = zobrist_no_pawns();
        let mut material_key = 0u64;
        let mut npm = [0i32; Color::NUM];

        for sq in self.occupied() {
            let pc = self.piece_on(sq);
            key ^= zobrist_psq(pc, sq);
            if pc.kind() == PieceType::Pawn {
                pawn_key ^= zobrist_psq(pc, sq);
            } else if pc.kind() != PieceType::King {
                npm[pc.color().index()] += piece_value_mg(pc.kind());
            }
        }

        for c in Color::ALL {
            for pt in PieceType::ALL {
                let pc = Piece::new(c, pt);
                for cnt in 0..self.count(pc) {
                    material_key ^= zobrist_material(pc, cnt);
                }
            }
        }

        let st = &self.states[self.st];
        if let Some(ep) = st.ep_square {
            key ^= zobrist_enpassant(ep.file());
        }
        key ^= zobrist_castling(st.castling_rights);
        if self.side_to_move == Color::Black {
            key ^= zobrist_side();
        }

        let us = self.side_to_move;
        let checkers = self.attackers_to(self.king_square(us)) & self.pieces_c(!us);
        let st = &mut self.states[self.st];
        st.key = key;
        st.pawn_key = pawn_key;
        st.material_key = material_key;
        st.non_pawn_material = npm;
        st.checkers = checkers;
        self.set_check_info();
    }

    /// 盤面・状態をすべて初期化
    pub(super) fn clear(&mut self) {
        self.board = [Piece::NONE; Square::NUM];
        self.by_type = [Bitboard::EMPTY; PieceType::NUM];
        self.by_color = [Bitboard::EMPTY; Color::NUM];
        self.piece_count = [0; Piece::NUM];
        self.side_to_move = Color::White;
        self.game_ply = 0;
        self.chess960 = false;
        self.castling_rights_mask = [0; Square::NUM];
        self.castling_rook_square = [None; 4];
        self.castling_path = [Bitboard::EMPTY; 4];
        self.piece_list = PieceList::new();
        self.states.clear();
        self.states.push(StateInfo::new());
        self.st = 0;
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::new()
    }
}

/// キャスリング後のキングとルークの升
#[inline]
pub fn castling_destinations(us: Color, king_side: bool) -> (Square, Square) {
    let rank = Rank::R1.relative(us);
    if king_side {
        (Square::new(File::G, rank), Square::new(File::F, rank))
    } else {
        (Square::new(File::C, rank), Square::new(File::D, rank))
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for r in (0..8u8).rev() {
            for file in 0..8u8 {
                let sq = Square::new(File::new(file), Rank::new(r));
                write!(f, "{}", self.piece_on(sq).to_char())?;
            }
            writeln!(f)?;
        }
        writeln!(f, "fen: {}", self.fen())?;
        write!(f, "key: {:016X}", self.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::movegen::generate_legal;
    use crate::position::START_FEN;
    use proptest::prelude::*;

    fn uci(pos: &Position, s: &str) -> Move {
        pos.move_from_uci(s).unwrap_or_else(|| panic!("illegal move {s} in {}", pos.fen()))
    }

    /// 局面の同一性（盤面・状態・駒番号）を比較するためのスナップショット
    fn snapshot(pos: &Position) -> (String, u64, u64, u64, [i32; 2], PieceList) {
        (
            pos.fen(),
            pos.key(),
            pos.pawn_key(),
            pos.material_key(),
            [pos.non_pawn_material(Color::White), pos.non_pawn_material(Color::Black)],
            pos.piece_list().clone(),
        )
    }

    #[test]
    fn test_position_startpos() {
        let pos = Position::startpos();
        assert_eq!(pos.fen(), START_FEN);
        assert_eq!(pos.side_to_move(), Color::White);
        assert_eq!(pos.occupied().count(), 32);
        assert_eq!(pos.castling_rights(), ANY_CASTLING);
        assert!(!pos.in_check());
        assert_eq!(pos.king_square(Color::Black), Square::E8);
    }

    #[test]
    fn test_do_move_normal() {
        let mut pos = Position::startpos();
        let before = snapshot(&pos);
        let m = uci(&pos, "e2e4");
        pos.do_move(m);

        assert_eq!(pos.piece_on(Square::E2), Piece::NONE);
        assert_eq!(pos.piece_on(Square::E4), Piece::new(Color::White, PieceType::Pawn));
        assert_eq!(pos.side_to_move(), Color::Black);
        // 黒ポーンがいないのでアンパッサン升は立たない
        assert_eq!(pos.ep_square(), None);
        assert_eq!(pos.state().dirty_piece.dirty_num, 1);
        assert_eq!(pos.state().previous, Some(0));

        pos.undo_move(m);
        assert_eq!(snapshot(&pos), before);
    }

    #[test]
    fn test_do_move_capture() {
        let mut pos = Position::new();
        pos.set_fen("4k3/8/8/3p4/4P3/8/8/4K3 w - - 0 1").unwrap();
        let before = snapshot(&pos);
        let captured_no = pos.piece_list().piece_no_of_board(Square::D5);

        let m = uci(&pos, "e4d5");
        pos.do_move(m);
        assert_eq!(pos.captured_piece(), Piece::new(Color::Black, PieceType::Pawn));
        assert_eq!(pos.state().dirty_piece.dirty_num, 2);
        assert_eq!(pos.state().dirty_piece.piece_no[1], captured_no);
        assert_eq!(pos.piece_list().bona_piece(captured_no), ExtBonaPiece::ZERO);
        assert_eq!(pos.rule50_count(), 0);

        pos.undo_move(m);
        assert_eq!(snapshot(&pos), before);
    }

    #[test]
    fn test_do_move_en_passant() {
        let mut pos = Position::new();
        pos.set_fen("4k3/8/8/8/5p2/8/4P3/4K3 w - - 0 1").unwrap();
        let m = uci(&pos, "e2e4");
        pos.do_move(m);
        assert_eq!(pos.ep_square(), Some(Square::E3));

        let before = snapshot(&pos);
        let ep = uci(&pos, "f4e3");
        assert_eq!(ep.kind(), MoveKind::EnPassant);
        pos.do_move(ep);
        assert_eq!(pos.piece_on(Square::E4), Piece::NONE);
        assert_eq!(pos.piece_on(Square::E3), Piece::new(Color::Black, PieceType::Pawn));
        assert_eq!(pos.state().dirty_piece.dirty_num, 2);

        pos.undo_move(ep);
        assert_eq!(snapshot(&pos), before);
    }

    #[test]
    fn test_do_move_promote() {
        let mut pos = Position::new();
        pos.set_fen("1n2k3/P7/8/8/8/8/8/4K3 w - - 0 1").unwrap();
        let before = snapshot(&pos);
        let m = uci(&pos, "a7b8q");
        pos.do_move(m);

        assert_eq!(pos.piece_on(Square::B8), Piece::new(Color::White, PieceType::Queen));
        assert_eq!(pos.count(Piece::new(Color::White, PieceType::Pawn)), 0);
        let dp = pos.state().dirty_piece;
        assert_eq!(dp.dirty_num, 2);
        let promoted = pos.piece_list().bona_piece(dp.piece_no[0]);
        assert_eq!(dp.changed_piece[0].new_piece, promoted);
        assert_eq!(
            promoted,
            ExtBonaPiece::from_piece(Piece::new(Color::White, PieceType::Queen), Square::B8)
        );

        pos.undo_move(m);
        assert_eq!(snapshot(&pos), before);
    }

    #[test]
    fn test_do_move_castling() {
        let mut pos = Position::new();
        pos.set_fen("r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1").unwrap();
        let before = snapshot(&pos);
        let m = uci(&pos, "e1g1");
        assert_eq!(m.kind(), MoveKind::Castling);
        pos.do_move(m);

        assert_eq!(pos.piece_on(Square::G1), Piece::new(Color::White, PieceType::King));
        assert_eq!(pos.piece_on(Square::F1), Piece::new(Color::White, PieceType::Rook));
        assert_eq!(pos.castling_rights(), BLACK_OO | BLACK_OOO);
        assert!(pos.state().dirty_piece.king_moved[Color::White.index()]);
        assert_eq!(pos.state().dirty_piece.dirty_num, 2);

        pos.undo_move(m);
        assert_eq!(snapshot(&pos), before);
    }

    #[test]
    fn test_do_move_castling_overlapping_squares() {
        // キングが f1、ルークが g1: キャスリング後はキング g1・ルーク f1 で升が入れ替わる
        let mut pos = Position::new();
        pos.set_fen("4k3/8/8/8/8/8/8/5KR1 w G - 0 1").unwrap();
        assert!(pos.is_chess960());
        let before = snapshot(&pos);
        let m = Move::castling(Square::F1, Square::G1);
        assert!(generate_legal(&pos).contains(&m));
        pos.do_move(m);

        assert_eq!(pos.piece_on(Square::G1), Piece::new(Color::White, PieceType::King));
        assert_eq!(pos.piece_on(Square::F1), Piece::new(Color::White, PieceType::Rook));
        let king_no = PieceNumber::king(Color::White);
        assert_eq!(pos.piece_list().piece_no_of_board(Square::G1), king_no);
        assert_ne!(pos.piece_list().piece_no_of_board(Square::F1), PieceNumber::NONE);

        pos.undo_move(m);
        assert_eq!(snapshot(&pos), before);
    }

    #[test]
    fn test_null_move() {
        let mut pos = Position::startpos();
        let m = uci(&pos, "e2e4");
        pos.do_move(m);
        let key = pos.key();

        pos.do_null_move();
        assert_eq!(pos.side_to_move(), Color::White);
        assert_eq!(pos.state().plies_from_null, 0);
        assert_ne!(pos.key(), key);
        pos.undo_null_move();
        assert_eq!(pos.key(), key);
        assert_eq!(pos.side_to_move(), Color::Black);
    }

    #[test]
    fn test_repetition_draw() {
        let mut pos = Position::startpos();
        for s in ["g1f3", "g8f6", "f3g1", "f6g8"] {
            let m = uci(&pos, s);
            pos.do_move(m);
        }
        assert_eq!(pos.state().repetition, 4);
        assert!(pos.is_draw(10));
        assert!(!pos.is_draw(4));
    }

    #[test]
    fn test_fifty_move_rule() {
        let mut pos = Position::new();
        pos.set_fen("4k3/8/8/8/8/8/8/4K2R w - - 100 80").unwrap();
        assert!(pos.is_draw(0));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// 任意の合法手列で do_move → undo_move が元の局面を完全に復元する
        #[test]
        fn prop_do_undo_involution(choices in proptest::collection::vec(any::<u16>(), 1..60)) {
            let mut pos = Position::startpos();
            let mut played = Vec::new();
            let mut snapshots = Vec::new();

            for c in choices {
                let moves = generate_legal(&pos);
                if moves.is_empty() {
                    break;
                }
                let m = moves[c as usize % moves.len()];
                snapshots.push(snapshot(&pos));
                pos.do_move(m);
                played.push(m);

                // 差分更新したキーは盤面から再計算したものと一致する
                let mut fresh = Position::new();
                fresh.set_fen(&pos.fen()).unwrap();
                prop_assert_eq!(fresh.key(), pos.key());
                prop_assert_eq!(fresh.pawn_key(), pos.pawn_key());
                prop_assert_eq!(fresh.material_key(), pos.material_key());
            }

            while let Some(m) = played.pop() {
                pos.undo_move(m);
                prop_assert_eq!(snapshot(&pos), snapshots.pop().unwrap());
            }
        }
    }
}
