//! 評価値（Value）
//!
//! 詰みスコアは `Value::MATE` 付近に予約している。
//! 通常の評価値は [-MATE_IN_MAX_PLY, MATE_IN_MAX_PLY] の範囲。

use super::MAX_PLY;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

/// 評価値
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct Value(i32);

impl Value {
    pub const ZERO: Value = Value(0);
    pub const DRAW: Value = Value(0);
    /// 詰み（勝ち側の最大スコア）
    pub const MATE: Value = Value(32000);
    pub const INFINITE: Value = Value(32001);
    /// 無効値
    pub const NONE: Value = Value(32002);

    pub const MATE_IN_MAX_PLY: Value = Value(Self::MATE.0 - MAX_PLY);
    pub const MATED_IN_MAX_PLY: Value = Value(-Self::MATE_IN_MAX_PLY.0);

    /// 終盤のポーン1枚の価値。勝率変換の基準にもなる。
    pub const PAWN_VALUE: i32 = 208;

    #[inline]
    pub const fn new(v: i32) -> Value {
        Value(v)
    }

    #[inline]
    pub const fn raw(self) -> i32 {
        self.0
    }

    /// ply手で詰ますスコア
    #[inline]
    pub const fn mate_in(ply: i32) -> Value {
        Value(Self::MATE.0 - ply)
    }

    /// ply手で詰まされるスコア
    #[inline]
    pub const fn mated_in(ply: i32) -> Value {
        Value(-Self::MATE.0 + ply)
    }

    #[inline]
    pub const fn is_win(self) -> bool {
        self.0 >= Self::MATE_IN_MAX_PLY.0
    }

    #[inline]
    pub const fn is_loss(self) -> bool {
        self.0 <= Self::MATED_IN_MAX_PLY.0
    }

    #[inline]
    pub const fn abs(self) -> Value {
        Value(self.0.abs())
    }
}

impl Neg for Value {
    type Output = Value;
    #[inline]
    fn neg(self) -> Value {
        Value(-self.0)
    }
}

impl Add<i32> for Value {
    type Output = Value;
    #[inline]
    fn add(self, rhs: i32) -> Value {
        Value(self.0 + rhs)
    }
}

impl Sub<i32> for Value {
    type Output = Value;
    #[inline]
    fn sub(self, rhs: i32) -> Value {
        Value(self.0 - rhs)
    }
}

impl AddAssign<i32> for Value {
    #[inline]
    fn add_assign(&mut self, rhs: i32) {
        self.0 += rhs;
    }
}

impl SubAssign<i32> for Value {
    #[inline]
    fn sub_assign(&mut self, rhs: i32) {
        self.0 -= rhs;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mate_scores() {
        assert!(Value::mate_in(3).is_win());
        assert!(Value::mated_in(4).is_loss());
        assert!(!Value::new(500).is_win());
        assert_eq!(-Value::mate_in(2), Value::mated_in(2));
    }
}
