//! 升（Square）・筋（File）・段（Rank）
//!
//! 升インデックスは a1=0, b1=1, ..., h8=63（リトルエンディアン・ランク・ファイル）。

use super::Color;
use std::fmt;

/// 筋（a〜h）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct File(u8);

impl File {
    pub const NUM: usize = 8;
    pub const A: File = File(0);
    pub const B: File = File(1);
    pub const C: File = File(2);
    pub const D: File = File(3);
    pub const E: File = File(4);
    pub const F: File = File(5);
    pub const G: File = File(6);
    pub const H: File = File(7);

    #[inline]
    pub const fn new(idx: u8) -> File {
        debug_assert!(idx < 8);
        File(idx)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// 'a'〜'h' の文字
    #[inline]
    pub const fn to_char(self) -> char {
        (b'a' + self.0) as char
    }

    pub fn from_char(c: char) -> Option<File> {
        match c {
            'a'..='h' => Some(File(c as u8 - b'a')),
            _ => None,
        }
    }
}

/// 段（1〜8）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Rank(u8);

impl Rank {
    pub const NUM: usize = 8;
    pub const R1: Rank = Rank(0);
    pub const R2: Rank = Rank(1);
    pub const R3: Rank = Rank(2);
    pub const R4: Rank = Rank(3);
    pub const R5: Rank = Rank(4);
    pub const R6: Rank = Rank(5);
    pub const R7: Rank = Rank(6);
    pub const R8: Rank = Rank(7);

    #[inline]
    pub const fn new(idx: u8) -> Rank {
        debug_assert!(idx < 8);
        Rank(idx)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// 指定手番から見た段（黒番なら上下反転）
    #[inline]
    pub const fn relative(self, color: Color) -> Rank {
        match color {
            Color::White => self,
            Color::Black => Rank(7 - self.0),
        }
    }

    #[inline]
    pub const fn to_char(self) -> char {
        (b'1' + self.0) as char
    }

    pub fn from_char(c: char) -> Option<Rank> {
        match c {
            '1'..='8' => Some(Rank(c as u8 - b'1')),
            _ => None,
        }
    }
}

/// 升
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Square(u8);

impl Square {
    /// 升の数
    pub const NUM: usize = 64;

    /// 筋と段から生成
    #[inline]
    pub const fn new(file: File, rank: Rank) -> Square {
        Square(rank.0 * 8 + file.0)
    }

    /// インデックスから生成（範囲外は None）
    #[inline]
    pub const fn from_index(idx: usize) -> Option<Square> {
        if idx < Self::NUM { Some(Square(idx as u8)) } else { None }
    }

    /// インデックスから生成（範囲チェックは debug のみ）
    #[inline]
    pub const fn from_u8(idx: u8) -> Square {
        debug_assert!(idx < 64);
        Square(idx)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub const fn raw(self) -> u8 {
        self.0
    }

    #[inline]
    pub const fn file(self) -> File {
        File(self.0 & 7)
    }

    #[inline]
    pub const fn rank(self) -> Rank {
        Rank(self.0 >> 3)
    }

    /// 盤面を180度回転した升（63 - sq）
    #[inline]
    pub const fn inverse(self) -> Square {
        Square(63 - self.0)
    }

    /// 左右反転した升
    #[inline]
    pub const fn mirror(self) -> Square {
        Square(self.0 ^ 7)
    }

    /// 上下反転した升
    #[inline]
    pub const fn flip_rank(self) -> Square {
        Square(self.0 ^ 56)
    }

    /// 指定手番から見た升（黒番なら上下反転）
    #[inline]
    pub const fn relative(self, color: Color) -> Square {
        match color {
            Color::White => self,
            Color::Black => self.flip_rank(),
        }
    }

    /// 差分だけずらした升（盤外なら None、筋の折り返しは呼び出し側で防ぐ）
    #[inline]
    pub const fn offset(self, delta: i8) -> Option<Square> {
        let s = self.0 as i16 + delta as i16;
        if s >= 0 && s < 64 { Some(Square(s as u8)) } else { None }
    }

    /// 全升を列挙
    pub fn all() -> impl Iterator<Item = Square> {
        (0..64u8).map(Square)
    }

    /// "e4" 形式から生成
    pub fn parse(s: &str) -> Option<Square> {
        let mut chars = s.chars();
        let file = File::from_char(chars.next()?)?;
        let rank = Rank::from_char(chars.next()?)?;
        if chars.next().is_some() {
            return None;
        }
        Some(Square::new(file, rank))
    }
}

impl fmt::Display for Square {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.file().to_char(), self.rank().to_char())
    }
}

impl fmt::Debug for Square {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Square({self})")
    }
}

macro_rules! define_squares {
    ($($name:ident = $idx:expr,)*) => {
        impl Square {
            $(pub const $name: Square = Square($idx);)*
        }
    };
}

define_squares! {
    A1 = 0,
    B1 = 1,
    C1 = 2,
    D1 = 3,
    E1 = 4,
    F1 = 5,
    G1 = 6,
    H1 = 7,
    A2 = 8,
    B2 = 9,
    C2 = 10,
    D2 = 11,
    E2 = 12,
    F2 = 13,
    G2 = 14,
    H2 = 15,
    A3 = 16,
    B3 = 17,
    C3 = 18,
    D3 = 19,
    E3 = 20,
    F3 = 21,
    G3 = 22,
    H3 = 23,
    A4 = 24,
    B4 = 25,
    C4 = 26,
    D4 = 27,
    E4 = 28,
    F4 = 29,
    G4 = 30,
    H4 = 31,
    A5 = 32,
    B5 = 33,
    C5 = 34,
    D5 = 35,
    E5 = 36,
    F5 = 37,
    G5 = 38,
    H5 = 39,
    A6 = 40,
    B6 = 41,
    C6 = 42,
    D6 = 43,
    E6 = 44,
    F6 = 45,
    G6 = 46,
    H6 = 47,
    A7 = 48,
    B7 = 49,
    C7 = 50,
    D7 = 51,
    E7 = 52,
    F7 = 53,
    G7 = 54,
    H7 = 55,
    A8 = 56,
    B8 = 57,
    C8 = 58,
    D8 = 59,
    E8 = 60,
    F8 = 61,
    G8 = 62,
    H8 = 63,
}
