//! EnPassant 特徴量
//!
//! アンパッサン可能な升の筋（視点に合わせて回転）を 1 つだけ立てる。
//! 差分は定義しないので毎手全計算になる。

use super::{Feature, TriggerEvent};
use crate::nnue::accumulator::{DirtyPiece, IndexList};
use crate::nnue::bona_piece::king_square_from_bona_piece;
use crate::nnue::constants::{MAX_ACTIVE_FEATURES, MAX_CHANGED_FEATURES};
use crate::nnue::piece_list::PieceNumber;
use crate::position::Position;
use crate::types::{Color, File, Square};

/// EnPassant 特徴量
pub struct EnPassant;

impl Feature for EnPassant {
    const NAME: &'static str = "EnPassant";

    const HASH: u32 = 0x0292_4F91;

    const DIMENSIONS: usize = File::NUM;

    const MAX_ACTIVE: usize = 1;

    const REFRESH_TRIGGER: TriggerEvent = TriggerEvent::AnyPieceMoved;

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
        let Some(ep) = pos.ep_square() else {
            return;
        };
        let ep = if perspective == Color::Black { ep.inverse() } else { ep };
        let pushed = active.push(ep.file().index());
        debug_assert!(pushed, "too many active features");
    }

    /// 常に全計算なので差分は無い
    #[inline]
    fn append_changed_indices(
        _dirty_piece: &DirtyPiece,
        _perspective: Color,
        _king_sq: Square,
        _removed: &mut IndexList<MAX_CHANGED_FEATURES>,
        _added: &mut IndexList<MAX_CHANGED_FEATURES>,
    ) {
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_en_passant_file_per_perspective() {
        let mut pos = Position::new();
        pos.set_fen("4k3/8/8/8/5p2/8/4P3/4K3 w - - 0 1").unwrap();
        assert!(EnPassant::collect_active_indices(&pos, Color::White).is_empty());

        let m = pos.move_from_uci("e2e4").unwrap();
        pos.do_move(m);
        // e3 は黒視点で d6
        assert_eq!(EnPassant::collect_active_indices(&pos, Color::White).as_slice(), &[4]);
        assert_eq!(EnPassant::collect_active_indices(&pos, Color::Black).as_slice(), &[3]);
        assert!(EnPassant::needs_refresh(&pos.state().dirty_piece, Color::White));
    }
}
