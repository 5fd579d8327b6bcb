//! 評価関数
//!
//! - `Evaluator`: 探索から呼ばれる評価のインターフェース
//! - `ClassicalEvaluator`: 駒割り + 駒位置評価（中盤/終盤の補間）。NNUE が無いときに使う

use crate::position::Position;
use crate::types::{Color, PieceType, Square, Value};

/// 評価関数
///
/// 手番側から見た評価値を返す。NNUE は StateInfo 内の Accumulator を更新するため `&mut Position` を取る。
pub trait Evaluator: Send + Sync {
    fn evaluate(&self, pos: &mut Position) -> Value;
}

// ========== 駒の価値 ==========

/// 中盤の駒の価値 [PieceType]
pub const PIECE_VALUE_MG: [i32; PieceType::NUM] = [126, 781, 825, 1276, 2538, 0];

/// 終盤の駒の価値 [PieceType]
pub const PIECE_VALUE_EG: [i32; PieceType::NUM] = [Value::PAWN_VALUE, 854, 915, 1380, 2682, 0];

#[inline]
pub const fn piece_value_mg(pt: PieceType) -> i32 {
    PIECE_VALUE_MG[pt.index()]
}

#[inline]
pub const fn piece_value_eg(pt: PieceType) -> i32 {
    PIECE_VALUE_EG[pt.index()]
}

/// 中盤とみなすポーン以外の駒の総価値
const MIDGAME_LIMIT: i32 = 15258;
/// 終盤とみなすポーン以外の駒の総価値
const ENDGAME_LIMIT: i32 = 3915;
/// 手番ボーナス
const TEMPO: i32 = 28;

// ========== 駒位置評価 ==========

/// 中央からの距離（0..=3）
const fn center_distance(sq: usize) -> i32 {
    let f = (sq % 8) as i32;
    let r = (sq / 8) as i32;
    let df = if f < 4 { 3 - f } else { f - 4 };
    let dr = if r < 4 { 3 - r } else { r - 4 };
    if df > dr { df } else { dr }
}

/// 白から見た駒位置評価 (mg, eg)
const fn psq_bonus(pt: PieceType, sq: usize) -> (i32, i32) {
    let r = (sq / 8) as i32;
    let f = (sq % 8) as i32;
    let cd = center_distance(sq);
    match pt {
        PieceType::Pawn => {
            let center_file = if f == 3 || f == 4 { 12 } else { 0 };
            (r * 6 + center_file, r * 14)
        }
        PieceType::Knight => ((2 - cd) * 22, (2 - cd) * 18),
        PieceType::Bishop => ((2 - cd) * 10, (2 - cd) * 8),
        PieceType::Rook => (if r == 6 { 24 } else { 0 }, 0),
        PieceType::Queen => ((1 - cd) * 4, (2 - cd) * 10),
        PieceType::King => {
            let mg = if r == 0 { if f <= 2 || f >= 6 { 40 } else { 10 } } else { -30 * r };
            (mg, (2 - cd) * 24)
        }
    }
}

const fn build_psq() -> [[(i32, i32); Square::NUM]; PieceType::NUM] {
    let mut table = [[(0, 0); Square::NUM]; PieceType::NUM];
    let mut pt = 0;
    while pt < PieceType::NUM {
        let kind = match PieceType::from_index(pt) {
            Some(k) => k,
            None => PieceType::Pawn,
        };
        let mut sq = 0;
        while sq < Square::NUM {
            table[pt][sq] = psq_bonus(kind, sq);
            sq += 1;
        }
        pt += 1;
    }
    table
}

static PSQ: [[(i32, i32); Square::NUM]; PieceType::NUM] = build_psq();

// ========== 手作り評価 ==========

/// 駒割り + 駒位置評価
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassicalEvaluator;

impl ClassicalEvaluator {
    /// 白から見た評価値（中盤/終盤の補間済み）
    pub fn evaluate_white(pos: &Position) -> i32 {
        let mut mg = 0;
        let mut eg = 0;
        for sq in pos.occupied() {
            let pc = pos.piece_on(sq);
            let pt = pc.kind();
            let (sign, rel) = match pc.color() {
                Color::White => (1, sq),
                Color::Black => (-1, sq.flip_rank()),
            };
            let (pmg, peg) = PSQ[pt.index()][rel.index()];
            mg += sign * (piece_value_mg(pt) + pmg);
            eg += sign * (piece_value_eg(pt) + peg);
        }

        let npm = (pos.non_pawn_material(Color::White) + pos.non_pawn_material(Color::Black))
            .clamp(ENDGAME_LIMIT, MIDGAME_LIMIT);
        let phase = ((npm - ENDGAME_LIMIT) * 128) / (MIDGAME_LIMIT - ENDGAME_LIMIT);
        (mg * phase + eg * (128 - phase)) / 128
    }

    /// 手番側から見た評価値
    pub fn evaluate_stm(pos: &Position) -> Value {
        let v = Self::evaluate_white(pos);
        let v = if pos.side_to_move() == Color::White { v } else { -v };
        Value::new(v + TEMPO)
    }
}

impl Evaluator for ClassicalEvaluator {
    fn evaluate(&self, pos: &mut Position) -> Value {
        Self::evaluate_stm(pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_startpos_is_balanced() {
        let pos = Position::startpos();
        assert_eq!(ClassicalEvaluator::evaluate_white(&pos), 0);
        assert_eq!(ClassicalEvaluator::evaluate_stm(&pos), Value::new(TEMPO));
    }

    #[test]
    fn test_material_advantage() {
        let mut pos = Position::new();
        pos.set_fen("4k3/8/8/8/8/8/8/3QK3 w - - 0 1").unwrap();
        assert!(ClassicalEvaluator::evaluate_white(&pos) > 2000);

        // 黒番から見ると負
        pos.set_fen("4k3/8/8/8/8/8/8/3QK3 b - - 0 1").unwrap();
        assert!(ClassicalEvaluator.evaluate(&mut pos).raw() < -2000);
    }

    #[test]
    fn test_symmetric_positions() {
        let mut w = Position::new();
        w.set_fen("r1bqkbnr/pppp1ppp/2n5/4p3/4P3/5N2/PPPP1PPP/RNBQKB1R w KQkq - 2 3").unwrap();
        let mut b = Position::new();
        b.set_fen("rnbqkb1r/pppp1ppp/5n2/4p3/4P3/2N5/PPPP1PPP/R1BQKBNR b KQkq - 2 3").unwrap();
        assert_eq!(
            ClassicalEvaluator::evaluate_stm(&w),
            ClassicalEvaluator::evaluate_stm(&b)
        );
    }

    #[test]
    fn test_piece_values() {
        assert_eq!(piece_value_mg(PieceType::Queen), 2538);
        assert_eq!(piece_value_eg(PieceType::Pawn), Value::PAWN_VALUE);
        assert_eq!(piece_value_mg(PieceType::King), 0);
    }
}
