//! P 特徴量
//!
//! 玉位置を使わず、駒配置（BonaPiece）だけを特徴量とする。
//! 差分更新が常に可能なので全計算は発生しない。

use super::{Feature, TriggerEvent, is_feature};
use crate::nnue::accumulator::{DirtyPiece, IndexList};
use crate::nnue::bona_piece::{FE_END, king_square_from_bona_piece};
use crate::nnue::constants::{MAX_ACTIVE_FEATURES, MAX_CHANGED_FEATURES};
use crate::nnue::piece_list::PieceNumber;
use crate::position::Position;
use crate::types::{Color, Square};

/// P 特徴量
pub struct P;

impl Feature for P {
    const NAME: &'static str = "P";

    const HASH: u32 = 0x764C_FB4B;

    const DIMENSIONS: usize = FE_END;

    const MAX_ACTIVE: usize = MAX_ACTIVE_FEATURES;

    const REFRESH_TRIGGER: TriggerEvent = TriggerEvent::None;

    /// インデックス計算には使わない
    #[inline]
    fn king_square(pos: &Position, perspective: Color) -> Square {
        let bp = pos.piece_list().piece_list(perspective)[PieceNumber::king(perspective).index()];
        king_square_from_bona_piece(bp)
    }

    #[inline]
    fn append_active_indices(
        pos: &Position,
        perspective: Color,
        active: &mut IndexList<MAX_ACTIVE_FEATURES>,
    ) {
        let pieces = pos.piece_list().piece_list(perspective);
        for &bp in &pieces[..PieceNumber::KING as usize] {
            if is_feature(bp) {
                let pushed = active.push(bp.value() as usize);
                debug_assert!(pushed, "too many active features");
            }
        }
    }

    #[inline]
    fn append_changed_indices(
        dirty_piece: &DirtyPiece,
        perspective: Color,
        _king_sq: Square,
        removed: &mut IndexList<MAX_CHANGED_FEATURES>,
        added: &mut IndexList<MAX_CHANGED_FEATURES>,
    ) {
        for cp in &dirty_piece.changed_piece[..dirty_piece.dirty_num as usize] {
            let old_bp = cp.old_piece.get(perspective);
            let new_bp = cp.new_piece.get(perspective);
            if is_feature(old_bp) {
                let pushed = removed.push(old_bp.value() as usize);
                debug_assert!(pushed, "too many removed features");
            }
            if is_feature(new_bp) {
                let pushed = added.push(new_bp.value() as usize);
                debug_assert!(pushed, "too many added features");
            }
        }
    }
}
