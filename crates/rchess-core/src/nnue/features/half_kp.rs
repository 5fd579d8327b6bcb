//! HalfKP 特徴量
//!
//! 自玉位置 × 駒配置（BonaPiece）の組み合わせで特徴量を表現する。
//! 玉自身は特徴量に含めない（玉の BonaPiece は FE_END 以上）。

use super::{Feature, TriggerEvent, is_feature};
use crate::nnue::accumulator::{DirtyPiece, IndexList};
use crate::nnue::bona_piece::{FE_END, halfkp_index, king_square_from_bona_piece};
use crate::nnue::constants::{MAX_ACTIVE_FEATURES, MAX_CHANGED_FEATURES};
use crate::nnue::piece_list::PieceNumber;
use crate::position::Position;
use crate::types::{Color, Square};

/// HalfKP(Friend) 特徴量
///
/// 自玉が動いた場合にアキュムレータの全計算が必要になる。
pub struct HalfKP;

impl Feature for HalfKP {
    const NAME: &'static str = "HalfKP(Friend)";

    const HASH: u32 = 0x5D69_D5B9 ^ 1;

    /// 64（玉の位置）× FE_END
    const DIMENSIONS: usize = Square::NUM * FE_END;

    /// 玉を除く盤上30駒
    const MAX_ACTIVE: usize = MAX_ACTIVE_FEATURES;

    const REFRESH_TRIGGER: TriggerEvent = TriggerEvent::FriendKingMoved;

    #[inline]
    fn king_square(pos: &Position, perspective: Color) -> Square {
        let bp = pos.piece_list().piece_list(perspective)[PieceNumber::king(perspective).index()];
        king_square_from_bona_piece(bp)
    }

    /// PieceList の 0..KING 番目を走査（玉除外）
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
                let pushed = active.push(halfkp_index(king_sq, bp));
                debug_assert!(pushed, "too many active features");
            }
        }
    }

    /// DirtyPiece の ExtBonaPiece から差分を求める
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
                let pushed = removed.push(halfkp_index(king_sq, old_bp));
                debug_assert!(pushed, "too many removed features");
            }
            if is_feature(new_bp) {
                let pushed = added.push(halfkp_index(king_sq, new_bp));
                debug_assert!(pushed, "too many added features");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::movegen::generate_legal;
    use rand::{Rng, SeedableRng};
    use rand_xoshiro::Xoshiro256PlusPlus;
    use std::collections::BTreeSet;

    fn active_set(pos: &Position, perspective: Color) -> BTreeSet<usize> {
        HalfKP::collect_active_indices(pos, perspective).iter().copied().collect()
    }

    #[test]
    fn test_halfkp_dimensions() {
        assert_eq!(HalfKP::DIMENSIONS, 41024);
        assert_eq!(HalfKP::MAX_ACTIVE, 30);
    }

    #[test]
    fn test_append_active_indices_startpos() {
        let pos = Position::startpos();
        for perspective in Color::ALL {
            let active = HalfKP::collect_active_indices(&pos, perspective);
            assert_eq!(active.len(), 30);
            assert!(active.iter().all(|&i| i < HalfKP::DIMENSIONS));
        }
    }

    #[test]
    fn test_king_square_perspective() {
        let pos = Position::startpos();
        assert_eq!(HalfKP::king_square(&pos, Color::White), Square::E1);
        // 黒視点は180度回転: e8 → d1
        assert_eq!(HalfKP::king_square(&pos, Color::Black), Square::D1);
    }

    #[test]
    fn test_bare_kings_have_no_features() {
        let mut pos = Position::new();
        pos.set_fen("4k3/8/8/8/8/8/8/4K3 w - - 0 1").unwrap();
        assert!(HalfKP::collect_active_indices(&pos, Color::White).is_empty());
    }

    #[test]
    fn test_feature_delta_completeness() {
        // 任意の手で: 前局面の特徴量 - removed + added = 後局面の特徴量（重複なし）
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(20240601);
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
                    if HalfKP::needs_refresh(&dp, perspective) {
                        continue;
                    }
                    let king_sq = HalfKP::king_square(&pos, perspective);
                    let (removed, added) = HalfKP::collect_changed_indices(&dp, perspective, king_sq);
                    let mut expected = before[perspective.index()].clone();
                    for r in removed.iter() {
                        assert!(expected.remove(r), "removed index {r} was not active");
                    }
                    for a in added.iter() {
                        assert!(expected.insert(*a), "added index {a} was already active");
                    }
                    assert_eq!(expected, active_set(&pos, perspective));
                }
            }
        }
    }
}
