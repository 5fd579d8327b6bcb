//! 全ワーカー共有の重複局面テーブルと書き出し件数の予算

use std::sync::atomic::{AtomicU64, Ordering};

/// 直近に書き出した局面のハッシュ表
///
/// `key & mask` の位置に最後のキーだけを覚える近似フィルタ。衝突で新しい局面を
/// 弾くことも、上書き後に同じ局面を通すこともある。
pub struct DedupTable {
    keys: Box<[AtomicU64]>,
    mask: u64,
}

impl DedupTable {
    /// `size` は 2 の冪に切り上げる
    pub fn new(size: usize) -> Self {
        let size = size.max(1).next_power_of_two();
        let keys = (0..size).map(|_| AtomicU64::new(0)).collect::<Vec<_>>().into_boxed_slice();
        Self { keys, mask: size as u64 - 1 }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// 未登録なら登録して `true`、同じキーが残っていれば `false`
    pub fn check_and_insert(&self, key: u64) -> bool {
        let slot = &self.keys[(key & self.mask) as usize];
        if slot.load(Ordering::Relaxed) == key {
            return false;
        }
        slot.store(key, Ordering::Relaxed);
        true
    }
}

/// 書き出し件数の上限
pub struct LoopBudget {
    limit: u64,
    taken: AtomicU64,
}

impl LoopBudget {
    pub fn new(limit: u64) -> Self {
        Self { limit, taken: AtomicU64::new(0) }
    }

    /// 1件分を確保する。上限に達していれば `false`
    #[inline]
    pub fn try_take(&self) -> bool {
        self.taken.fetch_add(1, Ordering::Relaxed) < self.limit
    }

    pub fn taken(&self) -> u64 {
        self.taken.load(Ordering::Relaxed).min(self.limit)
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }
}
