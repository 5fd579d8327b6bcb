//! 指し手（Move）
//!
//! 16bit 表現:
//! - bit 0-5: 移動先
//! - bit 6-11: 移動元
//! - bit 12-13: 成り駒種（Knight=0 .. Queen=3）
//! - bit 14-15: 種別（通常/成り/アンパッサン/キャスリング）
//!
//! キャスリングは「キングが自分のルークを取る」形式で表す（Chess960 と共通）。

use super::{PieceType, Square};
use smallvec::SmallVec;
use std::fmt;

/// 指し手の種別
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MoveKind {
    Normal = 0,
    Promotion = 1,
    EnPassant = 2,
    Castling = 3,
}

/// 指し手
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct Move(u16);

/// 1局面の最大合法手数
pub const MAX_MOVES: usize = 256;

/// 指し手リスト（スタック確保）
pub type MoveList = SmallVec<[Move; MAX_MOVES]>;

impl Move {
    /// 無効な指し手
    pub const NONE: Move = Move(0);
    /// パス（null move）
    pub const NULL: Move = Move(65);

    #[inline]
    pub const fn normal(from: Square, to: Square) -> Move {
        Move(((from.raw() as u16) << 6) | to.raw() as u16)
    }

    #[inline]
    pub const fn promotion(from: Square, to: Square, pt: PieceType) -> Move {
        let promo = (pt as u16).saturating_sub(PieceType::Knight as u16) & 3;
        Move(
            ((MoveKind::Promotion as u16) << 14)
                | (promo << 12)
                | ((from.raw() as u16) << 6)
                | to.raw() as u16,
        )
    }

    #[inline]
    pub const fn en_passant(from: Square, to: Square) -> Move {
        Move(((MoveKind::EnPassant as u16) << 14) | ((from.raw() as u16) << 6) | to.raw() as u16)
    }

    /// キャスリング（キング位置 → ルーク位置）
    #[inline]
    pub const fn castling(king_from: Square, rook_from: Square) -> Move {
        Move(
            ((MoveKind::Castling as u16) << 14)
                | ((king_from.raw() as u16) << 6)
                | rook_from.raw() as u16,
        )
    }

    #[inline]
    pub const fn from_raw(raw: u16) -> Move {
        Move(raw)
    }

    #[inline]
    pub const fn raw(self) -> u16 {
        self.0
    }

    #[inline]
    pub const fn from_sq(self) -> Square {
        Square::from_u8(((self.0 >> 6) & 0x3f) as u8)
    }

    #[inline]
    pub const fn to_sq(self) -> Square {
        Square::from_u8((self.0 & 0x3f) as u8)
    }

    #[inline]
    pub const fn kind(self) -> MoveKind {
        match self.0 >> 14 {
            0 => MoveKind::Normal,
            1 => MoveKind::Promotion,
            2 => MoveKind::EnPassant,
            _ => MoveKind::Castling,
        }
    }

    /// 成り先の駒種
    #[inline]
    pub const fn promotion_type(self) -> PieceType {
        match (self.0 >> 12) & 3 {
            0 => PieceType::Knight,
            1 => PieceType::Bishop,
            2 => PieceType::Rook,
            _ => PieceType::Queen,
        }
    }

    /// NONE/NULL 以外か
    #[inline]
    pub const fn is_ok(self) -> bool {
        self.0 != Self::NONE.0 && self.0 != Self::NULL.0 && self.from_sq().raw() != self.to_sq().raw()
    }

    /// UCI 形式の文字列
    ///
    /// 通常チェスではキャスリングをキングの移動先（g/c 筋）で出力する。
    pub fn to_uci(self, chess960: bool) -> String {
        if self == Self::NONE {
            return "(none)".to_string();
        }
        if self == Self::NULL {
            return "0000".to_string();
        }
        let from = self.from_sq();
        let mut to = self.to_sq();
        if self.kind() == MoveKind::Castling && !chess960 {
            let file = if to > from { super::File::G } else { super::File::C };
            to = Square::new(file, from.rank());
        }
        let mut s = format!("{from}{to}");
        if self.kind() == MoveKind::Promotion {
            s.push(self.promotion_type().to_char());
        }
        s
    }
}

impl fmt::Debug for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Move({})", self.to_uci(true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_move_fields() {
        let m = Move::normal(Square::E2, Square::E4);
        assert_eq!(m.from_sq(), Square::E2);
        assert_eq!(m.to_sq(), Square::E4);
        assert_eq!(m.kind(), MoveKind::Normal);
        assert_eq!(m.to_uci(false), "e2e4");
    }

    #[test]
    fn test_move_promotion() {
        let m = Move::promotion(Square::A7, Square::A8, PieceType::Knight);
        assert_eq!(m.kind(), MoveKind::Promotion);
        assert_eq!(m.promotion_type(), PieceType::Knight);
        assert_eq!(m.to_uci(false), "a7a8n");
        let q = Move::promotion(Square::B2, Square::A1, PieceType::Queen);
        assert_eq!(q.promotion_type(), PieceType::Queen);
    }

    #[test]
    fn test_move_castling_uci() {
        let m = Move::castling(Square::E1, Square::H1);
        assert_eq!(m.to_uci(false), "e1g1");
        assert_eq!(m.to_uci(true), "e1h1");
        let m = Move::castling(Square::E8, Square::A8);
        assert_eq!(m.to_uci(false), "e8c8");
    }

    #[test]
    fn test_move_none_null() {
        assert!(!Move::NONE.is_ok());
        assert!(!Move::NULL.is_ok());
        assert_eq!(Move::from_raw(Move::NULL.raw()), Move::NULL);
    }
}
