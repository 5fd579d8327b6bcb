//! BonaPiece - 駒の種類と位置を一意に表現するインデックス
//!
//! 視点（手番）ごとに「味方/敵 × 駒種 × 升」を 1 つの整数へ写像する。
//!
//! ## 定義
//! - PS_NONE = 0
//! - PS_W_PAWN = 1, PS_B_PAWN = 65
//! - PS_W_KNIGHT = 129, PS_B_KNIGHT = 193
//! - PS_W_BISHOP = 257, PS_B_BISHOP = 321
//! - PS_W_ROOK = 385, PS_B_ROOK = 449
//! - PS_W_QUEEN = 513, PS_B_QUEEN = 577
//! - PS_W_KING = 641 (= FE_END), PS_B_KING = 705
//!
//! `W` は視点側（味方）、`B` は相手側を表す。玉は FE_END 以上に置かれ、
//! HalfKP の特徴量には現れない（玉の升を復元するためだけに使う）。

use crate::types::{Color, Piece, PieceType, Square};

/// BonaPiece
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct BonaPiece(u16);

impl BonaPiece {
    /// 無効値（盤上に存在しない駒）
    pub const ZERO: BonaPiece = BonaPiece(0);

    #[inline]
    pub const fn new(v: u16) -> Self {
        BonaPiece(v)
    }

    #[inline]
    pub const fn value(self) -> u16 {
        self.0
    }
}

pub const PS_W_PAWN: u16 = 1;
pub const PS_B_PAWN: u16 = 64 + 1;
pub const PS_W_KNIGHT: u16 = 2 * 64 + 1;
pub const PS_B_KNIGHT: u16 = 3 * 64 + 1;
pub const PS_W_BISHOP: u16 = 4 * 64 + 1;
pub const PS_B_BISHOP: u16 = 5 * 64 + 1;
pub const PS_W_ROOK: u16 = 6 * 64 + 1;
pub const PS_B_ROOK: u16 = 7 * 64 + 1;
pub const PS_W_QUEEN: u16 = 8 * 64 + 1;
pub const PS_B_QUEEN: u16 = 9 * 64 + 1;
pub const PS_W_KING: u16 = 10 * 64 + 1;
pub const PS_B_KING: u16 = 11 * 64 + 1;

/// HalfKP で使う BonaPiece の終端
pub const FE_END: usize = PS_W_KING as usize;

/// 玉を含めた BonaPiece の終端
pub const FE_END2: usize = 12 * 64 + 1;

/// 駒種ごとの base offset `[piece_type][is_friend]`（is_friend: 0=enemy, 1=friend）
const PIECE_BASE: [[u16; 2]; PieceType::NUM] = [
    [PS_B_PAWN, PS_W_PAWN],
    [PS_B_KNIGHT, PS_W_KNIGHT],
    [PS_B_BISHOP, PS_W_BISHOP],
    [PS_B_ROOK, PS_W_ROOK],
    [PS_B_QUEEN, PS_W_QUEEN],
    [PS_B_KING, PS_W_KING],
];

/// 白視点/黒視点の BonaPiece をペアで保持する
///
/// `from[Color::White]` は盤面そのまま、`from[Color::Black]` は盤面を180度回転し
/// 色を入れ替えた升で表す。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExtBonaPiece {
    pub from: [BonaPiece; Color::NUM],
}

impl ExtBonaPiece {
    pub const ZERO: ExtBonaPiece = ExtBonaPiece { from: [BonaPiece::ZERO; Color::NUM] };

    #[inline]
    pub const fn new(white: BonaPiece, black: BonaPiece) -> Self {
        Self { from: [white, black] }
    }

    /// 盤上駒から生成（`Piece::NONE` は ZERO）
    #[inline]
    pub fn from_piece(pc: Piece, sq: Square) -> Self {
        let Some(pt) = pc.piece_type() else {
            return Self::ZERO;
        };
        let color = pc.color();
        let base_w = PIECE_BASE[pt.index()][(color == Color::White) as usize];
        let base_b = PIECE_BASE[pt.index()][(color == Color::Black) as usize];
        Self::new(
            BonaPiece(base_w + sq.raw() as u16),
            BonaPiece(base_b + sq.inverse().raw() as u16),
        )
    }

    /// 視点側の BonaPiece
    #[inline]
    pub fn get(&self, perspective: Color) -> BonaPiece {
        self.from[perspective.index()]
    }
}

/// 玉の BonaPiece から升を復元（視点側から見た升）
#[inline]
pub fn king_square_from_bona_piece(bp: BonaPiece) -> Square {
    debug_assert!(bp.0 >= PS_W_KING);
    Square::from_u8(((bp.0 - PS_W_KING) % 64) as u8)
}

/// HalfKP 特徴量インデックス
#[inline]
pub fn halfkp_index(king_sq: Square, bp: BonaPiece) -> usize {
    king_sq.index() * FE_END + bp.0 as usize
}
