//! 探索
//!
//! 反復深化の negamax αβ探索と静止探索。学習データ生成・学習時の PV 取得に使う。
//!
//! - 指し手順序は MVV-LVA（取る駒の価値が高く、取る駒の価値が低い順）
//! - 静止探索は駒取りと成り（王手中は全合法手）、stand pat あり
//! - MultiPV 対応（ルートの残りの手から1本ずつ最善手を確定させる）
//! - 千日手・50手ルール・詰みを評価値に反映する
//!
//! 枝刈り・置換表・時間管理は持たない。

use crate::eval::{Evaluator, piece_value_mg};
use crate::movegen::{generate_captures, generate_legal};
use crate::position::Position;
use crate::types::{Depth, MAX_PLY, Move, MoveKind, MoveList, PieceType, Value};

/// ルートの指し手と探索結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootMove {
    /// 今回の反復の評価値（未確定なら -INFINITE）
    pub score: Value,
    /// 前回の反復の評価値
    pub previous_score: Value,
    /// 読み筋（先頭がこの指し手）
    pub pv: Vec<Move>,
}

impl RootMove {
    pub fn new(m: Move) -> Self {
        Self {
            score: -Value::INFINITE,
            previous_score: -Value::INFINITE,
            pv: vec![m],
        }
    }

    #[inline]
    pub fn best_move(&self) -> Move {
        self.pv[0]
    }
}

/// 探索器
///
/// 評価関数への参照と探索ノード数を保持する。局面は呼び出し側が所有する。
pub struct Searcher<'a> {
    evaluator: &'a dyn Evaluator,
    nodes: u64,
}

impl<'a> Searcher<'a> {
    pub fn new(evaluator: &'a dyn Evaluator) -> Self {
        Self { evaluator, nodes: 0 }
    }

    /// 探索したノード数
    pub fn nodes(&self) -> u64 {
        self.nodes
    }

    // ========== ルート ==========

    /// 深さ `depth` まで反復深化し、上位 `multi_pv` 手の結果を返す
    ///
    /// 合法手がなければ空。返り値は評価値の降順。
    pub fn search(&mut self, pos: &mut Position, depth: Depth, multi_pv: usize) -> Vec<RootMove> {
        let mut moves = generate_legal(pos);
        if moves.is_empty() {
            return Vec::new();
        }
        order_moves(pos, &mut moves);
        let mut root_moves: Vec<RootMove> = moves.into_iter().map(RootMove::new).collect();
        let multi_pv = multi_pv.clamp(1, root_moves.len());
        let mut child_pv = Vec::new();

        for d in 1..=depth.max(1) {
            for rm in root_moves.iter_mut() {
                rm.previous_score = rm.score;
                rm.score = -Value::INFINITE;
            }

            for pv_idx in 0..multi_pv {
                let mut alpha = -Value::INFINITE;
                let beta = Value::INFINITE;
                for rm in root_moves[pv_idx..].iter_mut() {
                    let m = rm.best_move();
                    pos.do_move(m);
                    self.nodes += 1;
                    let v = -self.negamax(pos, d - 1, 1, -beta, -alpha, &mut child_pv);
                    pos.undo_move(m);

                    if v > alpha {
                        alpha = v;
                        rm.score = v;
                        rm.pv.truncate(1);
                        rm.pv.extend_from_slice(&child_pv);
                    } else {
                        rm.score = -Value::INFINITE;
                    }
                }
                // 安定ソートで同点の手は前回の順序を保つ
                root_moves[pv_idx..].sort_by(|a, b| b.score.cmp(&a.score));
            }
            log::trace!(
                "depth {d} best {} score {} nodes {}",
                root_moves[0].best_move().to_uci(pos.is_chess960()),
                root_moves[0].score.raw(),
                self.nodes
            );
        }

        root_moves.truncate(multi_pv);
        root_moves
    }

    /// 静止探索で評価値と読み筋を求める
    pub fn qsearch_pv(&mut self, pos: &mut Position) -> (Value, Vec<Move>) {
        let mut pv = Vec::new();
        let v = self.qsearch(pos, 0, -Value::INFINITE, Value::INFINITE, &mut pv);
        (v, pv)
    }

    // ========== 内部ノード ==========

    fn negamax(
        &mut self,
        pos: &mut Position,
        depth: Depth,
        ply: i32,
        mut alpha: Value,
        beta: Value,
        pv: &mut Vec<Move>,
    ) -> Value {
        pv.clear();
        if pos.is_draw(ply) {
            return Value::DRAW;
        }
        if depth <= 0 {
            return self.qsearch(pos, ply, alpha, beta, pv);
        }
        if ply >= MAX_PLY {
            return self.evaluator.evaluate(pos);
        }

        let mut moves = generate_legal(pos);
        if moves.is_empty() {
            return if pos.in_check() { Value::mated_in(ply) } else { Value::DRAW };
        }
        order_moves(pos, &mut moves);

        let mut best = -Value::INFINITE;
        let mut child_pv = Vec::new();
        for m in moves {
            pos.do_move(m);
            self.nodes += 1;
            let v = -self.negamax(pos, depth - 1, ply + 1, -beta, -alpha, &mut child_pv);
            pos.undo_move(m);

            if v > best {
                best = v;
                if v > alpha {
                    alpha = v;
                    pv.clear();
                    pv.push(m);
                    pv.extend_from_slice(&child_pv);
                    if alpha >= beta {
                        break;
                    }
                }
            }
        }
        best
    }

    fn qsearch(
        &mut self,
        pos: &mut Position,
        ply: i32,
        mut alpha: Value,
        beta: Value,
        pv: &mut Vec<Move>,
    ) -> Value {
        pv.clear();
        if ply > 0 && pos.is_draw(ply) {
            return Value::DRAW;
        }
        if ply >= MAX_PLY {
            return self.evaluator.evaluate(pos);
        }

        let in_check = pos.in_check();
        let mut best = -Value::INFINITE;
        if !in_check {
            best = self.evaluator.evaluate(pos);
            if best >= beta {
                return best;
            }
            if best > alpha {
                alpha = best;
            }
        }

        let mut moves = generate_captures(pos);
        if in_check && moves.is_empty() {
            return Value::mated_in(ply);
        }
        order_moves(pos, &mut moves);

        let mut child_pv = Vec::new();
        for m in moves {
            pos.do_move(m);
            self.nodes += 1;
            let v = -self.qsearch(pos, ply + 1, -beta, -alpha, &mut child_pv);
            pos.undo_move(m);

            if v > best {
                best = v;
                if v > alpha {
                    alpha = v;
                    pv.clear();
                    pv.push(m);
                    pv.extend_from_slice(&child_pv);
                    if alpha >= beta {
                        break;
                    }
                }
            }
        }
        best
    }
}

/// 1回限りの探索
pub fn search(
    pos: &mut Position,
    evaluator: &dyn Evaluator,
    depth: Depth,
    multi_pv: usize,
) -> Vec<RootMove> {
    Searcher::new(evaluator).search(pos, depth, multi_pv)
}

/// 1回限りの静止探索
pub fn qsearch_pv(pos: &mut Position, evaluator: &dyn Evaluator) -> (Value, Vec<Move>) {
    Searcher::new(evaluator).qsearch_pv(pos)
}

// ========== 指し手順序 ==========

fn move_order_key(pos: &Position, m: Move) -> i32 {
    let attacker = pos.moved_piece(m).kind();
    let mut key = 0;
    if pos.is_capture(m) {
        let victim = if m.kind() == MoveKind::EnPassant {
            PieceType::Pawn
        } else {
            pos.piece_on(m.to_sq()).kind()
        };
        key += 16 * piece_value_mg(victim) + 1_000_000 - attacker.index() as i32;
    }
    if m.kind() == MoveKind::Promotion {
        key += piece_value_mg(m.promotion_type()) + 500_000;
    }
    key
}

/// MVV-LVA で並べ替え（同点は生成順）
fn order_moves(pos: &Position, moves: &mut MoveList) {
    moves.sort_by_cached_key(|m| -move_order_key(pos, *m));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::ClassicalEvaluator;

    fn position(fen: &str) -> Position {
        let mut pos = Position::new();
        pos.set_fen(fen).unwrap();
        pos
    }

    #[test]
    fn test_search_finds_mate_in_one() {
        let mut pos = position("6k1/5ppp/8/8/8/8/8/R5K1 w - - 0 1");
        let result = search(&mut pos, &ClassicalEvaluator, 2, 1);
        assert_eq!(result[0].best_move().to_uci(false), "a1a8");
        assert_eq!(result[0].score, Value::mate_in(1));
    }

    #[test]
    fn test_search_restores_position() {
        let mut pos = Position::startpos();
        let fen = pos.fen();
        let key = pos.key();
        let result = search(&mut pos, &ClassicalEvaluator, 3, 1);
        assert!(!result.is_empty());
        assert_eq!(pos.fen(), fen);
        assert_eq!(pos.key(), key);
    }

    #[test]
    fn test_search_no_legal_moves() {
        let mut pos = position("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1");
        assert!(search(&mut pos, &ClassicalEvaluator, 2, 1).is_empty());
    }

    #[test]
    fn test_multi_pv_sorted() {
        let mut pos = Position::startpos();
        let result = search(&mut pos, &ClassicalEvaluator, 2, 4);
        assert_eq!(result.len(), 4);
        for w in result.windows(2) {
            assert!(w[0].score >= w[1].score);
        }
        for rm in &result {
            assert!(rm.score > -Value::INFINITE);
        }
        let mut firsts: Vec<Move> = result.iter().map(|rm| rm.best_move()).collect();
        firsts.dedup();
        assert_eq!(firsts.len(), 4);
    }

    #[test]
    fn test_qsearch_pv_wins_hanging_queen() {
        let mut pos = position("4k3/8/8/3q4/8/8/8/3RK3 w - - 0 1");
        let (v, pv) = qsearch_pv(&mut pos, &ClassicalEvaluator);
        assert_eq!(pv.first().map(|m| m.to_uci(false)), Some("d1d5".to_string()));
        assert!(v.raw() > 0);
    }

    #[test]
    fn test_qsearch_quiet_position_has_empty_pv() {
        let mut pos = Position::startpos();
        let (v, pv) = qsearch_pv(&mut pos, &ClassicalEvaluator);
        assert!(pv.is_empty());
        assert_eq!(v, ClassicalEvaluator::evaluate_stm(&pos));
    }
}
