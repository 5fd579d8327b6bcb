//! 1ワーカー分の自己対局ループ
//!
//! 1局ごとに平手から探索の PV で進め、書き出し対象の局面を対局内バッファに溜める。
//! 終局（詰み・評価値打ち切り）が決まった時点で勝敗を後ろから埋めて出力へ渡す。
//!
//! - 引き分け（50手・千日手・ステイルメイト）と最大手数到達の対局は書き出さない
//! - ランダム手を指したらそれ以前のバッファは捨てる（勝敗の因果が崩れるため）
//! - 重複テーブルに当たった局面でもバッファを捨てる

use std::sync::atomic::{AtomicBool, Ordering};

use rand::Rng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use rchess_core::eval::Evaluator;
use rchess_core::movegen::generate_legal;
use rchess_core::position::Position;
use rchess_core::search::search;
use rchess_core::types::{Move, MoveList, PieceType};

use super::config::GensfenConfig;
use super::dedup::{DedupTable, LoopBudget};
use crate::packed_sfen::PackedSfenValue;

/// 全ワーカーで共有する資源
#[derive(Clone, Copy)]
pub struct SharedContext<'a> {
    pub config: &'a GensfenConfig,
    pub evaluator: &'a dyn Evaluator,
    pub dedup: &'a DedupTable,
    pub budget: &'a LoopBudget,
    pub stop: &'a AtomicBool,
}

/// 勝敗を末尾から交互に埋める
///
/// `last_turn_is_win` はバッファ末尾の次の局面の手番側から見た勝敗（1/0/-1）。
pub fn backfill_results(records: &mut [PackedSfenValue], last_turn_is_win: i8) {
    let mut is_win = last_turn_is_win;
    for record in records.iter_mut().rev() {
        is_win = -is_win;
        record.game_result = is_win;
    }
}

/// ランダム手を指す手数（0 始まり）のフラグ
///
/// `[max(minply-1, 0), maxply)` から `count` 個を重複なしで選ぶ。Apery 方式で
/// 後から挿入される分の余裕を持たせて確保する。
pub fn random_move_plies<R: Rng>(config: &GensfenConfig, rng: &mut R) -> Vec<bool> {
    let lo = (config.random_move_minply - 1).max(0);
    let hi = config.random_move_maxply.max(lo);
    let count = config.random_move_count.max(0) as usize;

    let mut flags = vec![false; hi as usize + count];
    let mut candidates: Vec<i32> = (lo..hi).collect();
    let (chosen, _) = candidates.partial_shuffle(rng, count);
    for &ply in chosen.iter() {
        flags[ply as usize] = true;
    }
    flags
}

/// 自己対局を繰り返すワーカー
pub struct GameWorker<'a> {
    ctx: SharedContext<'a>,
    rng: ChaCha8Rng,
    pos: Position,
    eval_limit: i32,
}

impl<'a> GameWorker<'a> {
    pub fn new(ctx: SharedContext<'a>, rng: ChaCha8Rng) -> Self {
        let eval_limit = ctx.config.effective_eval_limit();
        Self { ctx, rng, pos: Position::startpos(), eval_limit }
    }

    /// 1局指して、書き出す局面を `out` に追加する
    ///
    /// 書き出し予算が尽きたら停止フラグを立てて `true` を返す。
    pub fn play_game(&mut self, out: &mut Vec<PackedSfenValue>) -> bool {
        let cfg = self.ctx.config;
        let (depth_lo, depth_hi) = cfg.depth_range();

        self.pos.set_startpos();
        let mut pending: Vec<PackedSfenValue> = Vec::with_capacity(cfg.write_maxply.max(0) as usize);
        let mut random_flags = random_move_plies(cfg, &mut self.rng);
        let mut random_moves_done = 0;

        let mut ply: i32 = 0;
        loop {
            if self.ctx.stop.load(Ordering::Relaxed) {
                return true;
            }

            let depth = self.rng.random_range(depth_lo..=depth_hi);

            if ply >= cfg.write_maxply {
                break;
            }
            if self.pos.is_draw(ply) {
                break;
            }

            let legal_moves = generate_legal(&self.pos);
            if legal_moves.is_empty() {
                if self.pos.in_check() {
                    return self.flush(&mut pending, -1, out);
                }
                // ステイルメイト
                break;
            }

            let root_moves = search(&mut self.pos, self.ctx.evaluator, depth, 1);
            let Some(best) = root_moves.first() else {
                break;
            };
            let value = best.score.raw();
            if value.abs() >= self.eval_limit {
                return self.flush(&mut pending, if value >= self.eval_limit { 1 } else { -1 }, out);
            }

            if self.pos.is_draw(0) {
                break;
            }

            let mut pv = best.pv.clone();
            if depth <= 0 {
                pv = search(&mut self.pos, self.ctx.evaluator, 2, 1)
                    .into_iter()
                    .next()
                    .map(|rm| rm.pv)
                    .unwrap_or_default();
            }

            self.record_position(ply, &pv, &mut pending);

            let Some(&pv_move) = pv.first() else {
                break;
            };
            let mut m = pv_move;

            let random_ply = if cfg.random_move_minply != -1 {
                random_flags.get(ply as usize).copied().unwrap_or(false)
            } else {
                random_moves_done < cfg.random_move_count
            };
            if random_ply {
                random_moves_done += 1;
                match self.pick_random_move(ply, &legal_moves, &mut random_flags) {
                    Some(rm) => m = rm,
                    None => break,
                }
                pending.clear();
            }

            self.pos.do_move(m);
            ply += 1;
        }
        false
    }

    /// 書き出し候補として局面をバッファに積む
    fn record_position(&mut self, ply: i32, pv: &[Move], pending: &mut Vec<PackedSfenValue>) {
        let cfg = self.ctx.config;
        if ply < cfg.write_minply - 1 {
            pending.clear();
            return;
        }
        if !self.ctx.dedup.check_and_insert(self.pos.key()) {
            pending.clear();
            return;
        }
        let Some(&best_move) = pv.first() else {
            return;
        };

        let score = self.evaluate_leaf(pv);
        if score.abs() >= self.eval_limit {
            // 打ち切り値を超える評価値は学習に使わない。連続性が切れるので捨てる
            pending.clear();
            return;
        }

        pending.push(PackedSfenValue::from_position(
            &self.pos,
            score as i16,
            best_move,
            (ply + 1) as u16,
        ));
    }

    /// PV の末端まで進めて静的評価し、現局面の手番側から見た値を返す
    fn evaluate_leaf(&mut self, pv: &[Move]) -> i32 {
        let root = self.pos.side_to_move();
        for &m in pv {
            self.pos.do_move(m);
        }
        let v = self.ctx.evaluator.evaluate(&mut self.pos).raw();
        let v = if self.pos.side_to_move() == root { v } else { -v };
        for &m in pv.iter().rev() {
            self.pos.undo_move(m);
        }
        v
    }

    fn pick_random_move(
        &mut self,
        ply: i32,
        legal_moves: &MoveList,
        random_flags: &mut Vec<bool>,
    ) -> Option<Move> {
        let cfg = self.ctx.config;

        if cfg.random_multi_pv == 0 {
            let apery = cfg.random_move_like_apery != 0
                && self.rng.random_range(0..cfg.random_move_like_apery) == 0;
            if apery {
                let king_moves: Vec<Move> = legal_moves
                    .iter()
                    .copied()
                    .filter(|&m| self.pos.moved_piece(m).kind() == PieceType::King)
                    .collect();
                if !king_moves.is_empty() {
                    let m = king_moves[self.rng.random_range(0..king_moves.len())];
                    // 1/2 の確率で相手もランダムに応じる
                    if self.rng.random_bool(0.5) {
                        let at = (ply as usize + 1).min(random_flags.len());
                        random_flags.insert(at, true);
                    }
                    return Some(m);
                }
            }
            return Some(legal_moves[self.rng.random_range(0..legal_moves.len())]);
        }

        let root_moves = search(&mut self.pos, self.ctx.evaluator, cfg.multi_pv_depth(), cfg.random_multi_pv);
        if root_moves.is_empty() {
            return None;
        }
        let best_score = root_moves[0].score.raw();
        let mut candidates = root_moves.len().min(cfg.random_multi_pv);
        for (i, rm) in root_moves.iter().enumerate().take(candidates).skip(1) {
            if best_score > rm.score.raw() + cfg.random_multi_pv_diff {
                candidates = i;
                break;
            }
        }
        let m = root_moves[self.rng.random_range(0..candidates)].best_move();
        m.is_ok().then_some(m)
    }

    /// 勝敗を埋めて `out` に移す。予算が尽きたら停止して `true`
    fn flush(
        &mut self,
        pending: &mut Vec<PackedSfenValue>,
        last_turn_is_win: i8,
        out: &mut Vec<PackedSfenValue>,
    ) -> bool {
        backfill_results(pending, last_turn_is_win);
        for record in pending.drain(..).rev() {
            if !self.ctx.budget.try_take() {
                self.ctx.stop.store(true, Ordering::Relaxed);
                return true;
            }
            out.push(record);
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rchess_core::eval::ClassicalEvaluator;

    fn records(n: usize) -> Vec<PackedSfenValue> {
        vec![PackedSfenValue::default(); n]
    }

    #[test]
    fn test_backfill_alternates_from_terminal_win() {
        let mut r = records(5);
        // 末尾の次の局面の手番側が負け → 末尾の局面（詰ませた側）は勝ち
        backfill_results(&mut r, -1);
        let results: Vec<i8> = r.iter().map(|p| p.game_result).collect();
        assert_eq!(results, vec![1, -1, 1, -1, 1]);
    }

    #[test]
    fn test_backfill_terminal_record_win_then_loss_then_win() {
        let mut r = records(3);
        backfill_results(&mut r, -1);
        assert_eq!(r[2].game_result, 1);
        assert_eq!(r[1].game_result, -1);
        assert_eq!(r[0].game_result, 1);
    }

    #[test]
    fn test_backfill_draw_is_all_zero() {
        let mut r = records(4);
        backfill_results(&mut r, 0);
        assert!(r.iter().all(|p| p.game_result == 0));
    }

    #[test]
    fn test_random_move_plies() {
        let cfg = GensfenConfig::default();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let flags = random_move_plies(&cfg, &mut rng);
        assert_eq!(flags.len(), 24 + 5);
        assert_eq!(flags.iter().filter(|&&f| f).count(), 5);
        assert!(flags[24..].iter().all(|&f| !f));
    }

    #[test]
    fn test_random_move_plies_limited_by_range() {
        let cfg = GensfenConfig {
            random_move_minply: 3,
            random_move_maxply: 5,
            random_move_count: 10,
            ..Default::default()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let flags = random_move_plies(&cfg, &mut rng);
        let chosen: Vec<usize> =
            flags.iter().enumerate().filter(|(_, f)| **f).map(|(i, _)| i).collect();
        assert_eq!(chosen, vec![2, 3, 4]);
    }

    #[test]
    fn test_play_game_records_are_consistent() {
        let cfg = GensfenConfig {
            depth: 1,
            write_minply: 1,
            hash_size: 1 << 12,
            ..Default::default()
        };
        let evaluator = ClassicalEvaluator;
        let dedup = DedupTable::new(cfg.hash_size);
        let budget = LoopBudget::new(u64::MAX);
        let stop = AtomicBool::new(false);
        let ctx = SharedContext {
            config: &cfg,
            evaluator: &evaluator,
            dedup: &dedup,
            budget: &budget,
            stop: &stop,
        };
        let mut worker = GameWorker::new(ctx, ChaCha8Rng::seed_from_u64(11));

        let mut out = Vec::new();
        for _ in 0..20 {
            assert!(!worker.play_game(&mut out));
        }
        for record in &out {
            assert!(record.game_ply >= 1);
            assert!(i32::from(record.score).abs() < cfg.eval_limit);
            assert!(record.game_result == 1 || record.game_result == -1);
            let mut pos = Position::new();
            crate::packed_sfen::unpack_position(&mut pos, &record.sfen, false).unwrap();
            assert!(rchess_core::movegen::is_legal_move(&pos, record.best_move()));
        }
    }

    #[test]
    fn test_budget_exhaustion_sets_stop() {
        let cfg = GensfenConfig { depth: 1, write_minply: 1, hash_size: 1 << 12, ..Default::default() };
        let evaluator = ClassicalEvaluator;
        let dedup = DedupTable::new(cfg.hash_size);
        let budget = LoopBudget::new(3);
        let stop = AtomicBool::new(false);
        let ctx = SharedContext {
            config: &cfg,
            evaluator: &evaluator,
            dedup: &dedup,
            budget: &budget,
            stop: &stop,
        };
        let mut worker = GameWorker::new(ctx, ChaCha8Rng::seed_from_u64(5));

        let mut out = Vec::new();
        let mut quit = false;
        for _ in 0..200 {
            if worker.play_game(&mut out) {
                quit = true;
                break;
            }
        }
        assert!(quit);
        assert!(stop.load(Ordering::Relaxed));
        assert_eq!(out.len(), 3);
    }
}
