//! HalfRelativeKP 特徴量
//!
//! 基準となる玉から見た駒の相対位置（筋差・段差）× 駒種で特徴量を表現する。
//!
//! - `HalfRelativeKP<true>`: 自玉基準（自玉が動いたら全計算）
//! - `HalfRelativeKP<false>`: 敵玉基準（敵玉が動いたら全計算）

use super::{Feature, TriggerEvent, is_feature};
use crate::nnue::accumulator::{DirtyPiece, IndexList};
use crate::nnue::bona_piece::{BonaPiece, FE_END, king_square_from_bona_piece};
use crate::nnue::constants::{MAX_ACTIVE_FEATURES, MAX_CHANGED_FEATURES};
use crate::nnue::piece_list::PieceNumber;
use crate::position::Position;
use crate::types::{Color, File, Rank, Square};

/// 相対筋の幅（-7..=7）
const BOARD_WIDTH: usize = File::NUM * 2 - 1;
/// 相対段の幅（-7..=7）
const BOARD_HEIGHT: usize = Rank::NUM * 2 - 1;
/// 駒種 × 味方/敵（玉を除く）
const PIECE_KINDS: usize = (FE_END - 1) / Square::NUM;

/// HalfRelativeKP 特徴量
///
/// `FRIEND` が true なら自玉、false なら敵玉を基準にする。
pub struct HalfRelativeKP<const FRIEND: bool>;

/// 自玉基準の HalfRelativeKP
pub type HalfRelativeKPFriend = HalfRelativeKP<true>;
/// 敵玉基準の HalfRelativeKP
pub type HalfRelativeKPEnemy = HalfRelativeKP<false>;

impl<const FRIEND: bool> HalfRelativeKP<FRIEND> {
    /// 基準玉の升と BonaPiece から特徴量インデックスを求める
    #[inline]
    pub fn make_index(king_sq: Square, bp: BonaPiece) -> usize {
        let offset = bp.value() as usize - 1;
        let piece_index = offset / Square::NUM;
        let sq = Square::from_u8((offset % Square::NUM) as u8);
        let relative_file = sq.file().index() + BOARD_WIDTH / 2 - king_sq.file().index();
        let relative_rank = sq.rank().index() + BOARD_HEIGHT / 2 - king_sq.rank().index();
        BOARD_HEIGHT * BOARD_WIDTH * piece_index + BOARD_HEIGHT * relative_file + relative_rank
    }
}

impl<const FRIEND: bool> Feature for HalfRelativeKP<FRIEND> {
    const NAME: &'static str =
        if FRIEND { "HalfRelativeKP(Friend)" } else { "HalfRelativeKP(Enemy)" };

    const HASH: u32 = 0xF918_0919 ^ FRIEND as u32;

    /// 10駒種 × 15 × 15
    const DIMENSIONS: usize = PIECE_KINDS * BOARD_WIDTH * BOARD_HEIGHT;

    const MAX_ACTIVE: usize = MAX_ACTIVE_FEATURES;

    const REFRESH_TRIGGER: TriggerEvent =
        if FRIEND { TriggerEvent::FriendKingMoved } else { TriggerEvent::EnemyKingMoved };

    /// 基準玉の升（視点に合わせて回転済み）
    #[inline]
    fn king_square(pos: &Position, perspective: Color) -> Square {
        let owner = if FRIEND { perspective } else { !perspective };
        let bp = pos.piece_list().piece_list(perspective)[PieceNumber::king(owner).index()];
        king_square_from_bona_piece(bp)
    }

    #[inline]
    fn append_active_indices(
        pos: &Position,
        perspective: Color,
        active: &mut IndexList<MAX_ACTIVE_FEATURES>,
    ) {
        let king_sq = Self::king_square(pos, perspective);
        let pieces = pos.piece_list().piece_list(perspective);
        for &bp in &pieces[..PieceNumber::KING as usize] {
            if is_feature(bp) {
                let pushed = active.push(Self::make_index(king_sq, bp));
                debug_assert!(pushed, "too many active features");
            }
        }
    }

    #[inline]
    fn append_changed_indices(
        dirty_piece: &DirtyPiece,
        perspective: Color,
        king_sq: Square,
        removed: &mut IndexList<MAX_CHANGED_FEATURES>,
        added: &mut IndexList<MAX_CHANGED_FEATURES>,
    ) {
        for cp in &dirty_piece.changed_piece[..dirty_piece.dirty_num as usize] {
            let old_bp = cp.old_piece.get(perspective);
            let new_bp = cp.new_piece.get(perspective);
            if is_feature(old_bp) {
                let pushed = removed.push(Self::make_index(king_sq, old_bp));
                debug_assert!(pushed, "too many removed features");
            }
            if is_feature(new_bp) {
                let pushed = added.push(Self::make_index(king_sq, new_bp));
                debug_assert!(pushed, "too many added features");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nnue::bona_piece::{PS_B_QUEEN, PS_W_PAWN};
    use crate::nnue::features::assert_delta_completeness;

    #[test]
    fn test_half_relative_kp_dimensions() {
        assert_eq!(HalfRelativeKPFriend::DIMENSIONS, 10 * 15 * 15);
        assert_ne!(HalfRelativeKPFriend::HASH, HalfRelativeKPEnemy::HASH);
        assert_eq!(HalfRelativeKPEnemy::REFRESH_TRIGGER, TriggerEvent::EnemyKingMoved);
    }

    #[test]
    fn test_make_index_range() {
        // 盤の隅同士で相対位置が最大/最小になる
        let low = HalfRelativeKPFriend::make_index(Square::H8, BonaPiece::new(PS_W_PAWN));
        assert_eq!(low, 0);
        let last = BonaPiece::new(PS_B_QUEEN + Square::H8.raw() as u16);
        let high = HalfRelativeKPFriend::make_index(Square::A1, last);
        assert_eq!(high, HalfRelativeKPFriend::DIMENSIONS - 1);
    }

    #[test]
    fn test_relative_index_is_translation_invariant() {
        // 玉と駒を同じだけずらしても同じ特徴量になる
        let a = HalfRelativeKPFriend::make_index(Square::E1, BonaPiece::new(PS_W_PAWN + Square::E2.raw() as u16));
        let b = HalfRelativeKPFriend::make_index(Square::C4, BonaPiece::new(PS_W_PAWN + Square::C5.raw() as u16));
        assert_eq!(a, b);
    }

    #[test]
    fn test_enemy_king_square() {
        let pos = Position::startpos();
        // 白視点の敵玉は e8、黒視点の敵玉は白玉 e1 を180度回転した d8
        assert_eq!(HalfRelativeKPEnemy::king_square(&pos, Color::White), Square::E8);
        assert_eq!(HalfRelativeKPEnemy::king_square(&pos, Color::Black), Square::D8);
    }

    #[test]
    fn test_half_relative_kp_friend_delta_completeness() {
        assert_delta_completeness::<HalfRelativeKPFriend>(11);
    }

    #[test]
    fn test_half_relative_kp_enemy_delta_completeness() {
        assert_delta_completeness::<HalfRelativeKPEnemy>(13);
    }
}
