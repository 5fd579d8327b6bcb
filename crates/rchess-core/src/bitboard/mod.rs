//! ビットボード
//!
//! - `Bitboard`: 64bit の升集合
//! - 跳び駒（ナイト・キング・ポーン）の利きは `const fn` で構築
//! - 飛び駒の利きはレイ走査（盤上の駒で止まる）
//! - `between` / `line` は初回参照時に構築

use crate::types::{Color, File, PieceType, Rank, Square};
use std::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign, BitXor, BitXorAssign, Not};
use std::sync::LazyLock;

/// 64bit ビットボード
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct Bitboard(pub u64);

impl Bitboard {
    pub const EMPTY: Bitboard = Bitboard(0);
    pub const ALL: Bitboard = Bitboard(!0);

    #[inline]
    pub const fn from_square(sq: Square) -> Bitboard {
        Bitboard(1u64 << sq.index())
    }

    /// 筋全体
    #[inline]
    pub const fn file(file: File) -> Bitboard {
        Bitboard(0x0101_0101_0101_0101u64 << file.index())
    }

    /// 段全体
    #[inline]
    pub const fn rank(rank: Rank) -> Bitboard {
        Bitboard(0xffu64 << (rank.index() * 8))
    }

    #[inline]
    pub const fn contains(self, sq: Square) -> bool {
        self.0 & (1u64 << sq.index()) != 0
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_not_empty(self) -> bool {
        self.0 != 0
    }

    #[inline]
    pub const fn count(self) -> u32 {
        self.0.count_ones()
    }

    #[inline]
    pub const fn more_than_one(self) -> bool {
        self.0 & self.0.wrapping_sub(1) != 0
    }

    /// 最下位ビットの升
    #[inline]
    pub const fn lsb(self) -> Option<Square> {
        if self.0 == 0 { None } else { Some(Square::from_u8(self.0.trailing_zeros() as u8)) }
    }

    /// 最下位ビットを取り出して消す
    #[inline]
    pub fn pop_lsb(&mut self) -> Option<Square> {
        let sq = self.lsb()?;
        self.0 &= self.0 - 1;
        Some(sq)
    }

    #[inline]
    pub const fn with(self, sq: Square) -> Bitboard {
        Bitboard(self.0 | (1u64 << sq.index()))
    }

    #[inline]
    pub const fn without(self, sq: Square) -> Bitboard {
        Bitboard(self.0 & !(1u64 << sq.index()))
    }

    /// 指定手番の前方向へ1段シフト
    #[inline]
    pub const fn shift_forward(self, color: Color) -> Bitboard {
        match color {
            Color::White => Bitboard(self.0 << 8),
            Color::Black => Bitboard(self.0 >> 8),
        }
    }

    pub fn iter(self) -> BitboardIter {
        BitboardIter(self)
    }
}

impl std::fmt::Debug for Bitboard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Bitboard({:#018x})", self.0)
    }
}

/// 升を下位ビットから順に列挙するイテレータ
pub struct BitboardIter(Bitboard);

impl Iterator for BitboardIter {
    type Item = Square;

    #[inline]
    fn next(&mut self) -> Option<Square> {
        self.0.pop_lsb()
    }
}

impl IntoIterator for Bitboard {
    type Item = Square;
    type IntoIter = BitboardIter;

    fn into_iter(self) -> BitboardIter {
        BitboardIter(self)
    }
}

macro_rules! impl_bitop {
    ($tr:ident, $f:ident, $tra:ident, $fa:ident, $op:tt) => {
        impl $tr for Bitboard {
            type Output = Bitboard;
            #[inline]
            fn $f(self, rhs: Bitboard) -> Bitboard {
                Bitboard(self.0 $op rhs.0)
            }
        }
        impl $tra for Bitboard {
            #[inline]
            fn $fa(&mut self, rhs: Bitboard) {
                self.0 = self.0 $op rhs.0;
            }
        }
    };
}

impl_bitop!(BitAnd, bitand, BitAndAssign, bitand_assign, &);
impl_bitop!(BitOr, bitor, BitOrAssign, bitor_assign, |);
impl_bitop!(BitXor, bitxor, BitXorAssign, bitxor_assign, ^);

impl Not for Bitboard {
    type Output = Bitboard;
    #[inline]
    fn not(self) -> Bitboard {
        Bitboard(!self.0)
    }
}

// ========== 跳び駒の利き ==========

const KNIGHT_DELTAS: [(i8, i8); 8] =
    [(1, 2), (2, 1), (2, -1), (1, -2), (-1, -2), (-2, -1), (-2, 1), (-1, 2)];
const KING_DELTAS: [(i8, i8); 8] =
    [(1, 0), (1, 1), (0, 1), (-1, 1), (-1, 0), (-1, -1), (0, -1), (1, -1)];

const fn leaper_table(deltas: &[(i8, i8)]) -> [Bitboard; 64] {
    let mut table = [Bitboard::EMPTY; 64];
    let mut sq = 0;
    while sq < 64 {
        let f = (sq % 8) as i8;
        let r = (sq / 8) as i8;
        let mut bits = 0u64;
        let mut i = 0;
        while i < deltas.len() {
            let nf = f + deltas[i].0;
            let nr = r + deltas[i].1;
            if nf >= 0 && nf < 8 && nr >= 0 && nr < 8 {
                bits |= 1u64 << (nr * 8 + nf);
            }
            i += 1;
        }
        table[sq] = Bitboard(bits);
        sq += 1;
    }
    table
}

const fn pawn_table(color: Color) -> [Bitboard; 64] {
    let dr: i8 = match color {
        Color::White => 1,
        Color::Black => -1,
    };
    leaper_table(&[(-1, dr), (1, dr)])
}

static KNIGHT_ATTACKS: [Bitboard; 64] = leaper_table(&KNIGHT_DELTAS);
static KING_ATTACKS: [Bitboard; 64] = leaper_table(&KING_DELTAS);
static PAWN_ATTACKS: [[Bitboard; 64]; 2] = [pawn_table(Color::White), pawn_table(Color::Black)];

#[inline]
pub fn knight_attacks(sq: Square) -> Bitboard {
    KNIGHT_ATTACKS[sq.index()]
}

#[inline]
pub fn king_attacks(sq: Square) -> Bitboard {
    KING_ATTACKS[sq.index()]
}

/// `color` のポーンが `sq` から利かせる升
#[inline]
pub fn pawn_attacks(color: Color, sq: Square) -> Bitboard {
    PAWN_ATTACKS[color.index()][sq.index()]
}

// ========== 飛び駒の利き ==========

const ROOK_DIRS: [(i8, i8); 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];
const BISHOP_DIRS: [(i8, i8); 4] = [(1, 1), (1, -1), (-1, 1), (-1, -1)];

fn sliding_attacks(dirs: &[(i8, i8)], sq: Square, occupied: Bitboard) -> Bitboard {
    let mut bits = 0u64;
    for &(df, dr) in dirs {
        let mut f = sq.file().index() as i8 + df;
        let mut r = sq.rank().index() as i8 + dr;
        while (0..8).contains(&f) && (0..8).contains(&r) {
            let b = 1u64 << (r * 8 + f);
            bits |= b;
            if occupied.0 & b != 0 {
                break;
            }
            f += df;
            r += dr;
        }
    }
    Bitboard(bits)
}

#[inline]
pub fn bishop_attacks(sq: Square, occupied: Bitboard) -> Bitboard {
    sliding_attacks(&BISHOP_DIRS, sq, occupied)
}

#[inline]
pub fn rook_attacks(sq: Square, occupied: Bitboard) -> Bitboard {
    sliding_attacks(&ROOK_DIRS, sq, occupied)
}

#[inline]
pub fn queen_attacks(sq: Square, occupied: Bitboard) -> Bitboard {
    bishop_attacks(sq, occupied) | rook_attacks(sq, occupied)
}

/// 駒種ごとの利き（ポーン以外）
pub fn attacks(pt: PieceType, sq: Square, occupied: Bitboard) -> Bitboard {
    match pt {
        PieceType::Pawn => Bitboard::EMPTY,
        PieceType::Knight => knight_attacks(sq),
        PieceType::Bishop => bishop_attacks(sq, occupied),
        PieceType::Rook => rook_attacks(sq, occupied),
        PieceType::Queen => queen_attacks(sq, occupied),
        PieceType::King => king_attacks(sq),
    }
}

// ========== 2升間のテーブル ==========

struct LineTables {
    /// 2升を結ぶ直線全体（端から端まで、両端の升を含む）
    line: Vec<[Bitboard; 64]>,
    /// 2升の間の升（s1 を含まず s2 を含む）
    between: Vec<[Bitboard; 64]>,
}

static LINE_TABLES: LazyLock<LineTables> = LazyLock::new(|| {
    let mut line = vec![[Bitboard::EMPTY; 64]; 64];
    let mut between = vec![[Bitboard::EMPTY; 64]; 64];
    for s1 in Square::all() {
        for s2 in Square::all() {
            let b2 = Bitboard::from_square(s2);
            let mut b = Bitboard::from_square(s2);
            for (slider, dirs) in [(PieceType::Bishop, &BISHOP_DIRS), (PieceType::Rook, &ROOK_DIRS)] {
                if (sliding_attacks(dirs, s1, Bitboard::EMPTY) & b2).is_not_empty() {
                    line[s1.index()][s2.index()] = (attacks(slider, s1, Bitboard::EMPTY)
                        & attacks(slider, s2, Bitboard::EMPTY))
                        | Bitboard::from_square(s1)
                        | b2;
                    b |= attacks(slider, s1, b2) & attacks(slider, s2, Bitboard::from_square(s1));
                }
            }
            between[s1.index()][s2.index()] = b;
        }
    }
    LineTables { line, between }
});

/// s1 と s2 を通る直線（同一直線上にない場合は空）
#[inline]
pub fn line(s1: Square, s2: Square) -> Bitboard {
    LINE_TABLES.line[s1.index()][s2.index()]
}

/// s1 と s2 の間の升 + s2（同一直線上にない場合は s2 のみ）
#[inline]
pub fn between(s1: Square, s2: Square) -> Bitboard {
    LINE_TABLES.between[s1.index()][s2.index()]
}

/// 3升が同一直線上にあるか
#[inline]
pub fn aligned(s1: Square, s2: Square, s3: Square) -> bool {
    line(s1, s2).contains(s3)
}
