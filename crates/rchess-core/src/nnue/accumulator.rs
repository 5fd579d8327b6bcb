//! Accumulator - 入力特徴量の累積値を保持
//!
//! HalfKP 特徴量を FeatureTransformer で変換した結果を視点ごとに保持する。
//! StateInfo ごとに 1 つ持ち、do_move で無効化される。
//!
//! - `DirtyPiece`: 1手で変化した駒番号と変化前後の BonaPiece
//! - `IndexList`: 固定長の特徴量インデックスリスト

use super::bona_piece::ExtBonaPiece;
use super::constants::TRANSFORMED_FEATURE_DIMENSIONS;
use super::piece_list::PieceNumber;
use crate::types::{Color, Value};

/// アライメントを保証するラッパー（64バイト = キャッシュライン）
#[repr(C, align(64))]
#[derive(Clone, PartialEq, Eq)]
pub struct Aligned<T>(pub T);

impl<T: Default> Default for Aligned<T> {
    fn default() -> Self {
        Self(T::default())
    }
}

/// Accumulatorの構造
#[repr(C, align(64))]
#[derive(Clone)]
pub struct Accumulator {
    /// 累積値 [perspective][dimension]（WHITE=0, BLACK=1）
    pub accumulation: [Aligned<[i16; TRANSFORMED_FEATURE_DIMENSIONS]>; Color::NUM],

    /// 計算済みの評価値（キャッシュ、手番側視点）
    pub score: Value,

    /// accumulationが計算済みかどうか
    pub computed_accumulation: bool,

    /// scoreが計算済みかどうか
    pub computed_score: bool,
}

impl Default for Accumulator {
    fn default() -> Self {
        Self {
            accumulation: [
                Aligned([0i16; TRANSFORMED_FEATURE_DIMENSIONS]),
                Aligned([0i16; TRANSFORMED_FEATURE_DIMENSIONS]),
            ],
            score: Value::ZERO,
            computed_accumulation: false,
            computed_score: false,
        }
    }
}

impl Accumulator {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// リセット（計算済みフラグをクリア）
    #[inline]
    pub fn reset(&mut self) {
        self.computed_accumulation = false;
        self.computed_score = false;
    }

    #[inline]
    pub fn get(&self, perspective: Color) -> &[i16; TRANSFORMED_FEATURE_DIMENSIONS] {
        &self.accumulation[perspective.index()].0
    }

    #[inline]
    pub fn get_mut(&mut self, perspective: Color) -> &mut [i16; TRANSFORMED_FEATURE_DIMENSIONS] {
        &mut self.accumulation[perspective.index()].0
    }
}

// =============================================================================
// DirtyPiece
// =============================================================================

/// 駒の変化（変化前後の BonaPiece）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChangedBonaPiece {
    pub old_piece: ExtBonaPiece,
    pub new_piece: ExtBonaPiece,
}

/// 1手で変化した駒（最大2駒: 通常手1、駒取り/キャスリング2）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirtyPiece {
    pub changed_piece: [ChangedBonaPiece; 2],
    pub piece_no: [PieceNumber; 2],
    pub dirty_num: u8,
    /// 玉が動いたか [Color]
    pub king_moved: [bool; Color::NUM],
}

impl DirtyPiece {
    pub const fn new() -> Self {
        Self {
            changed_piece: [ChangedBonaPiece {
                old_piece: ExtBonaPiece::ZERO,
                new_piece: ExtBonaPiece::ZERO,
            }; 2],
            piece_no: [PieceNumber::NONE; 2],
            dirty_num: 0,
            king_moved: [false; Color::NUM],
        }
    }

    #[inline]
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    /// 変化を追加
    #[inline]
    pub fn push(&mut self, piece_no: PieceNumber, old_piece: ExtBonaPiece, new_piece: ExtBonaPiece) {
        let i = self.dirty_num as usize;
        debug_assert!(i < 2, "DirtyPiece overflow");
        self.piece_no[i] = piece_no;
        self.changed_piece[i] = ChangedBonaPiece { old_piece, new_piece };
        self.dirty_num += 1;
        if piece_no.is_king() {
            self.king_moved[(piece_no.0 - PieceNumber::KING) as usize] = true;
        }
    }

    /// 既存エントリの変化後 BonaPiece を差し替える（成りで使用）
    #[inline]
    pub fn set_new_piece(&mut self, i: usize, new_piece: ExtBonaPiece) {
        debug_assert!(i < self.dirty_num as usize);
        self.changed_piece[i].new_piece = new_piece;
    }

    /// どちらかの玉が動いたか
    #[inline]
    pub fn any_king_moved(&self) -> bool {
        self.king_moved[0] || self.king_moved[1]
    }
}

impl Default for DirtyPiece {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// IndexList
// =============================================================================

/// 固定長インデックスリスト（ヒープ確保なし）
#[derive(Clone, Copy)]
pub struct IndexList<const N: usize> {
    values: [usize; N],
    len: usize,
}

impl<const N: usize> IndexList<N> {
    #[inline]
    pub const fn new() -> Self {
        Self { values: [0; N], len: 0 }
    }

    /// 追加（容量超過時は false）
    #[inline]
    pub fn push(&mut self, v: usize) -> bool {
        if self.len >= N {
            return false;
        }
        self.values[self.len] = v;
        self.len += 1;
        true
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn as_slice(&self) -> &[usize] {
        &self.values[..self.len]
    }

    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, usize> {
        self.as_slice().iter()
    }

    #[inline]
    pub fn reverse(&mut self) {
        self.values[..self.len].reverse();
    }
}

impl<const N: usize> Default for IndexList<N> {
    fn default() -> Self {
        Self::new()
    }
}
