//! 局面状態（StateInfo）
//!
//! Zobrist ハッシュや王手情報に加えて、NNUE 差分更新用の Accumulator/DirtyPiece を保持する。
//! StateInfo は `Position` 内のプール（手数の深さでインデックスされる配列）に置かれ、
//! `previous` は直前の状態のプール内インデックスを指す。

use crate::bitboard::Bitboard;
use crate::nnue::{Accumulator, DirtyPiece};
use crate::types::{Color, Piece, PieceType, Square};

/// 局面状態
///
/// do_move 時に新しいスロットへ作られ、undo_move で直前のスロットへ戻る。
#[derive(Clone)]
pub struct StateInfo {
    // === do_move時にコピーされる部分 ===
    /// 駒割ハッシュ
    pub material_key: u64,
    /// ポーン配置のハッシュ
    pub pawn_key: u64,
    /// ポーン以外の駒の価値合計 [Color]
    pub non_pawn_material: [i32; Color::NUM],
    /// キャスリング権（4bit）
    pub castling_rights: u8,
    /// 50手ルール用カウンタ（半手）
    pub rule50: i32,
    /// null moveからの手数
    pub plies_from_null: i32,
    /// アンパッサンで取れる升
    pub ep_square: Option<Square>,

    // === 再計算される部分 ===
    /// 局面ハッシュ（手番込み）
    pub key: u64,
    /// 王手している駒
    pub checkers: Bitboard,
    /// 前の局面のインデックス（StateInfoプール内）
    pub previous: Option<usize>,
    /// 自玉へのピン駒 [Color]
    pub blockers_for_king: [Bitboard; Color::NUM],
    /// ピンしている駒 [Color]
    pub pinners: [Bitboard; Color::NUM],
    /// 王手となる升 [PieceType]
    pub check_squares: [Bitboard; PieceType::NUM],
    /// 捕獲した駒
    pub captured_piece: Piece,
    /// 同一局面が前回現れた手数差（3回目なら負、なければ0）
    pub repetition: i32,
    /// NNUE Accumulator（差分更新用の中間表現）
    pub accumulator: Accumulator,
    /// 1手で変化した駒
    pub dirty_piece: DirtyPiece,
}

impl StateInfo {
    pub fn new() -> Self {
        Self {
            material_key: 0,
            pawn_key: 0,
            non_pawn_material: [0; Color::NUM],
            castling_rights: 0,
            rule50: 0,
            plies_from_null: 0,
            ep_square: None,
            key: 0,
            checkers: Bitboard::EMPTY,
            previous: None,
            blockers_for_king: [Bitboard::EMPTY; Color::NUM],
            pinners: [Bitboard::EMPTY; Color::NUM],
            check_squares: [Bitboard::EMPTY; PieceType::NUM],
            captured_piece: Piece::NONE,
            repetition: 0,
            accumulator: Accumulator::new(),
            dirty_piece: DirtyPiece::new(),
        }
    }

    /// 直前の状態からコピーされる部分を引き継ぎ、残りを初期化する
    ///
    /// 再利用されるスロットに古い値が残らないよう、全フィールドを上書きする。
    pub(super) fn inherit(&mut self, prev: &StateInfo, prev_idx: usize) {
        self.material_key = prev.material_key;
        self.pawn_key = prev.pawn_key;
        self.non_pawn_material = prev.non_pawn_material;
        self.castling_rights = prev.castling_rights;
        self.rule50 = prev.rule50 + 1;
        self.plies_from_null = prev.plies_from_null + 1;
        self.ep_square = prev.ep_square;

        self.key = prev.key;
        self.checkers = Bitboard::EMPTY;
        self.previous = Some(prev_idx);
        self.captured_piece = Piece::NONE;
        self.repetition = 0;
        self.accumulator.reset();
        self.dirty_piece.clear();
    }
}

impl Default for StateInfo {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_info_new() {
        let st = StateInfo::new();
        assert_eq!(st.previous, None);
        assert_eq!(st.captured_piece, Piece::NONE);
        assert!(!st.accumulator.computed_accumulation);
    }

    #[test]
    fn test_state_info_inherit() {
        let mut prev = StateInfo::new();
        prev.key = 0xDEAD;
        prev.rule50 = 7;
        prev.castling_rights = 0b1011;
        prev.repetition = 4;
        prev.accumulator.computed_accumulation = true;

        let mut st = StateInfo::new();
        st.accumulator.computed_accumulation = true;
        st.inherit(&prev, 3);

        assert_eq!(st.key, 0xDEAD);
        assert_eq!(st.rule50, 8);
        assert_eq!(st.castling_rights, 0b1011);
        assert_eq!(st.previous, Some(3));
        assert_eq!(st.repetition, 0);
        assert!(!st.accumulator.computed_accumulation);
    }
}
