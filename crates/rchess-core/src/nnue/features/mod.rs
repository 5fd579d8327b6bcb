//! NNUE 入力特徴量
//!
//! - `Feature`: 特徴量型が実装する基本 trait（全特徴量の列挙と差分の列挙）
//! - `TriggerEvent`: 差分更新できず全計算が必要になる条件
//! - `HalfKP`: 自玉位置 × BonaPiece（ネットワークが使う特徴量）
//! - `HalfRelativeKP`: 基準玉からの相対位置 × 駒種
//! - `P`: 駒配置のみ
//! - `EnPassant`: アンパッサン可能な筋

mod en_passant;
mod half_kp;
mod half_relative_kp;
mod p;

pub use en_passant::EnPassant;
pub use half_kp::HalfKP;
pub use half_relative_kp::{HalfRelativeKP, HalfRelativeKPEnemy, HalfRelativeKPFriend};
pub use p::P;

use super::accumulator::{DirtyPiece, IndexList};
use super::bona_piece::{BonaPiece, FE_END};
use super::constants::{MAX_ACTIVE_FEATURES, MAX_CHANGED_FEATURES};
use crate::position::Position;
use crate::types::{Color, Square};

/// 差分で変化した特徴量（removed, added）
pub type ChangedFeatures = (IndexList<MAX_CHANGED_FEATURES>, IndexList<MAX_CHANGED_FEATURES>);

/// 特徴量になる BonaPiece か（空と玉を除く）
#[inline]
fn is_feature(bp: BonaPiece) -> bool {
    bp != BonaPiece::ZERO && (bp.value() as usize) < FE_END
}

// =============================================================================
// TriggerEvent - リフレッシュトリガー
// =============================================================================

/// アキュムレータの全計算が必要になる条件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerEvent {
    /// 常に差分計算可能
    None,
    /// 自玉が動いた場合に全計算
    FriendKingMoved,
    /// 敵玉が動いた場合に全計算
    EnemyKingMoved,
    /// どちらかの玉が動いた場合に全計算
    AnyKingMoved,
    /// 常に全計算
    AnyPieceMoved,
}

impl TriggerEvent {
    /// この手で `perspective` 側の全計算が必要か
    #[inline]
    pub fn needs_refresh(self, dirty_piece: &DirtyPiece, perspective: Color) -> bool {
        match self {
            TriggerEvent::None => false,
            TriggerEvent::FriendKingMoved => dirty_piece.king_moved[perspective.index()],
            TriggerEvent::EnemyKingMoved => dirty_piece.king_moved[(!perspective).index()],
            TriggerEvent::AnyKingMoved => dirty_piece.any_king_moved(),
            TriggerEvent::AnyPieceMoved => true,
        }
    }
}

// =============================================================================
// Feature trait
// =============================================================================

/// 特徴量型が実装する基本 trait
pub trait Feature {
    /// 特徴量名（アーキテクチャ文字列に使う）
    const NAME: &'static str;
    /// 構造ハッシュ
    const HASH: u32;
    /// 特徴量の次元数
    const DIMENSIONS: usize;
    /// 同時にアクティブになる最大数
    const MAX_ACTIVE: usize;
    /// リフレッシュトリガー
    const REFRESH_TRIGGER: TriggerEvent;

    /// 視点側の玉の升（視点に合わせて回転済み）
    fn king_square(pos: &Position, perspective: Color) -> Square;

    /// アクティブな特徴量インデックスを追記
    fn append_active_indices(
        pos: &Position,
        perspective: Color,
        active: &mut IndexList<MAX_ACTIVE_FEATURES>,
    );

    /// 変化した特徴量インデックスを追記
    fn append_changed_indices(
        dirty_piece: &DirtyPiece,
        perspective: Color,
        king_sq: Square,
        removed: &mut IndexList<MAX_CHANGED_FEATURES>,
        added: &mut IndexList<MAX_CHANGED_FEATURES>,
    );

    /// アクティブな特徴量インデックスを取得
    #[inline]
    fn collect_active_indices(pos: &Position, perspective: Color) -> IndexList<MAX_ACTIVE_FEATURES> {
        let mut active = IndexList::new();
        Self::append_active_indices(pos, perspective, &mut active);
        active
    }

    /// 変化した特徴量インデックスを取得
    #[inline]
    fn collect_changed_indices(
        dirty_piece: &DirtyPiece,
        perspective: Color,
        king_sq: Square,
    ) -> ChangedFeatures {
        let mut removed = IndexList::new();
        let mut added = IndexList::new();
        Self::append_changed_indices(dirty_piece, perspective, king_sq, &mut removed, &mut added);
        (removed, added)
    }

    /// リフレッシュが必要かどうか
    #[inline]
    fn needs_refresh(dirty_piece: &DirtyPiece, perspective: Color) -> bool {
        Self::REFRESH_TRIGGER.needs_refresh(dirty_piece, perspective)
    }
}

/// ランダム対局の各手で「前局面の特徴量 - removed + added = 後局面の特徴量」を確かめる
#[cfg(test)]
pub(crate) fn assert_delta_completeness<F: Feature>(seed: u64) {
    use crate::movegen::generate_legal;
    use rand::{Rng, SeedableRng};
    use rand_xoshiro::Xoshiro256PlusPlus;
    use std::collections::BTreeSet;

    let active_set = |pos: &Position, perspective: Color| -> BTreeSet<usize> {
        F::collect_active_indices(pos, perspective).iter().copied().collect()
    };

    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    for _ in 0..20 {
        let mut pos = Position::startpos();
        for _ in 0..80 {
            let moves = generate_legal(&pos);
            if moves.is_empty() || pos.is_draw(0) {
                break;
            }
            let m = moves[rng.random_range(0..moves.len())];
            let before = [active_set(&pos, Color::White), active_set(&pos, Color::Black)];
            pos.do_move(m);
            let dp = pos.state().dirty_piece;

            for perspective in Color::ALL {
                let after = active_set(&pos, perspective);
                assert!(after.iter().all(|&i| i < F::DIMENSIONS), "{} index out of range", F::NAME);
                if F::needs_refresh(&dp, perspective) {
                    continue;
                }
                let king_sq = F::king_square(&pos, perspective);
                let (removed, added) = F::collect_changed_indices(&dp, perspective, king_sq);
                let mut expected = before[perspective.index()].clone();
                for r in removed.iter() {
                    assert!(expected.remove(r), "{}: removed index {r} was not active", F::NAME);
                }
                for a in added.iter() {
                    assert!(expected.insert(*a), "{}: added index {a} was already active", F::NAME);
                }
                assert_eq!(expected, after, "{} delta mismatch", F::NAME);
            }
        }
    }
}
