//! PieceList - 盤上の全32駒の BonaPiece 管理と逆引きテーブル
//!
//! 局面設定時に玉以外の駒へ 0 から順に番号を振り、玉は予約番号
//! （白玉 30, 黒玉 31）に置く。駒番号は取られるまで変わらない。
//! 取られた駒のエントリは `BonaPiece::ZERO` になる。

use super::bona_piece::{BonaPiece, ExtBonaPiece};
use crate::types::{Color, Piece, Square};

/// 駒番号
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[repr(transparent)]
pub struct PieceNumber(pub u8);

impl PieceNumber {
    /// 無効値（盤上のどの駒にも対応しない）
    pub const NONE: PieceNumber = PieceNumber(Self::NB as u8);

    /// 玉の番号の開始位置（白玉 = KING, 黒玉 = KING + 1）
    pub const KING: u8 = 30;

    /// 駒の総数
    pub const NB: usize = 32;

    /// 手番の玉の番号
    #[inline]
    pub const fn king(color: Color) -> PieceNumber {
        PieceNumber(Self::KING + color as u8)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub const fn is_king(self) -> bool {
        self.0 >= Self::KING && self.0 < Self::NB as u8
    }

    #[inline]
    pub const fn is_ok(self) -> bool {
        (self.0 as usize) < Self::NB
    }
}

/// PieceList
#[derive(Clone, PartialEq, Eq)]
pub struct PieceList {
    /// 各 PieceNumber の BonaPiece [perspective][piece_no]
    piece_list: [[BonaPiece; PieceNumber::NB]; Color::NUM],
    /// 盤上逆引き: Square → PieceNumber
    piece_no_on_board: [PieceNumber; Square::NUM],
}

impl PieceList {
    /// 全要素を無効値で初期化
    pub fn new() -> Self {
        Self {
            piece_list: [[BonaPiece::ZERO; PieceNumber::NB]; Color::NUM],
            piece_no_on_board: [PieceNumber::NONE; Square::NUM],
        }
    }

    /// 駒 `pc` を升 `sq` に置き、逆引きを更新
    #[inline]
    pub fn put_piece(&mut self, piece_no: PieceNumber, sq: Square, pc: Piece) {
        let bp = ExtBonaPiece::from_piece(pc, sq);
        self.set_piece_on_board(piece_no, bp, sq);
    }

    #[inline]
    pub fn set_piece_on_board(&mut self, piece_no: PieceNumber, bp: ExtBonaPiece, sq: Square) {
        debug_assert!(piece_no.is_ok());
        self.piece_list[0][piece_no.index()] = bp.from[0];
        self.piece_list[1][piece_no.index()] = bp.from[1];
        self.piece_no_on_board[sq.index()] = piece_no;
    }

    /// 駒を盤から取り除く（BonaPiece を ZERO にし、升の逆引きを消す）
    #[inline]
    pub fn remove_piece(&mut self, piece_no: PieceNumber, sq: Square) {
        self.set_piece_on_board(piece_no, ExtBonaPiece::ZERO, sq);
        self.piece_no_on_board[sq.index()] = PieceNumber::NONE;
    }

    /// 升の逆引きだけを消す
    #[inline]
    pub fn clear_square(&mut self, sq: Square) {
        self.piece_no_on_board[sq.index()] = PieceNumber::NONE;
    }

    /// 盤上逆引き: Square → PieceNumber
    #[inline]
    pub fn piece_no_of_board(&self, sq: Square) -> PieceNumber {
        self.piece_no_on_board[sq.index()]
    }

    /// PieceNumber → ExtBonaPiece
    #[inline]
    pub fn bona_piece(&self, piece_no: PieceNumber) -> ExtBonaPiece {
        ExtBonaPiece::new(
            self.piece_list[0][piece_no.index()],
            self.piece_list[1][piece_no.index()],
        )
    }

    /// 視点ごとの BonaPiece 配列
    #[inline]
    pub fn piece_list(&self, perspective: Color) -> &[BonaPiece; PieceNumber::NB] {
        &self.piece_list[perspective.index()]
    }
}

impl Default for PieceList {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PieceList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PieceList").field("white", &self.piece_list[0]).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PieceType;

    #[test]
    fn test_piece_list_put_and_get() {
        let mut pl = PieceList::new();
        let pn = PieceNumber(3);
        let pc = Piece::new(Color::White, PieceType::Rook);
        pl.put_piece(pn, Square::A1, pc);

        assert_eq!(pl.piece_no_of_board(Square::A1), pn);
        assert_eq!(pl.bona_piece(pn), ExtBonaPiece::from_piece(pc, Square::A1));
    }

    #[test]
    fn test_piece_list_remove() {
        let mut pl = PieceList::new();
        let pn = PieceNumber(0);
        pl.put_piece(pn, Square::E4, Piece::new(Color::Black, PieceType::Pawn));
        pl.remove_piece(pn, Square::E4);

        assert_eq!(pl.bona_piece(pn), ExtBonaPiece::ZERO);
        assert_eq!(pl.piece_no_of_board(Square::E4), PieceNumber::NONE);
    }

    #[test]
    fn test_king_numbers() {
        assert_eq!(PieceNumber::king(Color::White), PieceNumber(30));
        assert_eq!(PieceNumber::king(Color::Black), PieceNumber(31));
        assert!(PieceNumber(31).is_king());
        assert!(!PieceNumber(29).is_king());
        assert!(!PieceNumber::NONE.is_ok());
    }
}
