//! 自己対局による教師局面生成
//!
//! - `config`: 生成設定（`GensfenConfig`）
//! - `game`: ワーカー1つ分の対局ループと勝敗の後埋め
//! - `dedup`: 共有の重複局面テーブルと書き出し予算
//! - `writer`: 書き出し専用スレッド（ファイル切り替え付き）
//!
//! ワーカーは `std::thread::scope` で起動し、停止フラグ（予算切れ・Ctrl-C）で抜ける。

mod config;
mod dedup;
mod game;
mod writer;

pub use config::{GensfenConfig, append_to_stem};
pub use dedup::{DedupTable, LoopBudget};
pub use game::{GameWorker, SharedContext, backfill_results, random_move_plies};
pub use writer::{SFEN_BUFFER_SIZE, SfenWriter, rotated_path};

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use anyhow::Result;
use crossbeam_channel::Sender;
use rchess_core::eval::Evaluator;

use crate::common::make_rng;
use crate::packed_sfen::PackedSfenValue;

/// チャネルに溜められるバッファ数（ワーカー1つあたり）
const CHANNEL_BUFFERS_PER_THREAD: usize = 4;

/// 生成結果
#[derive(Debug, Clone)]
pub struct GensfenSummary {
    pub written: u64,
    pub output_path: PathBuf,
    pub elapsed_secs: f64,
}

/// 教師局面を生成する
///
/// `stop` が立つか書き出し予算が尽きるまで全ワーカーが対局を続ける。
pub fn run_gensfen(
    config: &GensfenConfig,
    evaluator: &dyn Evaluator,
    stop: &AtomicBool,
) -> Result<GensfenSummary> {
    let threads = config.thread_count();
    let start = Instant::now();

    let mut rng = make_rng(config.seed, u64::MAX);
    let output_path = config.resolve_output_path(&mut rng);

    let dedup = DedupTable::new(config.hash_size);
    let budget = LoopBudget::new(config.loop_count);
    let writer = SfenWriter::spawn(
        output_path.clone(),
        config.save_every,
        threads * CHANNEL_BUFFERS_PER_THREAD,
    )?;

    let (depth_lo, depth_hi) = config.depth_range();
    log::info!(
        "gensfen: {threads} threads, depth {depth_lo}..={depth_hi}, loop {}, eval_limit {}",
        config.loop_count,
        config.effective_eval_limit()
    );

    let ctx = SharedContext { config, evaluator, dedup: &dedup, budget: &budget, stop };

    std::thread::scope(|s| {
        for thread_id in 0..threads {
            let tx = writer.sender();
            let rng = make_rng(config.seed, thread_id as u64);
            s.spawn(move || {
                let mut worker = GameWorker::new(ctx, rng);
                let mut buffer = Vec::with_capacity(SFEN_BUFFER_SIZE * 2);
                loop {
                    let quit = worker.play_game(&mut buffer);
                    if (buffer.len() >= SFEN_BUFFER_SIZE || quit)
                        && !hand_off(&tx, std::mem::take(&mut buffer), thread_id)
                    {
                        stop.store(true, Ordering::Relaxed);
                        break;
                    }
                    if quit || stop.load(Ordering::Relaxed) {
                        break;
                    }
                }
                if !buffer.is_empty() {
                    hand_off(&tx, buffer, thread_id);
                }
                log::debug!("thread {thread_id} finished");
            });
        }
    });

    let written = writer.finish()?;
    log::info!(
        "gensfen: {written} positions written ({} of {} reserved)",
        budget.taken(),
        budget.limit()
    );
    Ok(GensfenSummary { written, output_path, elapsed_secs: start.elapsed().as_secs_f64() })
}

/// バッファを書き出しスレッドへ渡す
///
/// 書き出しスレッドが終了していれば失った件数を警告して `false` を返す。
fn hand_off(tx: &Sender<Vec<PackedSfenValue>>, buffer: Vec<PackedSfenValue>, thread_id: usize) -> bool {
    let len = buffer.len();
    if tx.send(buffer).is_err() {
        log::warn!("thread {thread_id}: writer closed, {len} positions dropped");
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::read_all_records;
    use crate::packed_sfen::unpack_position;
    use rchess_core::eval::ClassicalEvaluator;
    use rchess_core::position::Position;

    #[test]
    fn test_gensfen_depth1_loop100() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kifu.bin");
        let config = GensfenConfig {
            depth: 1,
            loop_count: 100,
            write_minply: 1,
            threads: 2,
            seed: Some(20),
            hash_size: 1 << 16,
            output_file_name: path.clone(),
            ..Default::default()
        };
        let stop = AtomicBool::new(false);
        let summary = run_gensfen(&config, &ClassicalEvaluator, &stop).unwrap();
        assert!(summary.written <= 100);
        assert!(stop.load(Ordering::Relaxed));

        let records = read_all_records(&path).unwrap();
        assert_eq!(records.len() as u64, summary.written);
        assert!(!records.is_empty());
        let mut pos = Position::new();
        for r in &records {
            assert!(r.game_ply >= 1);
            assert!(i32::from(r.score).abs() <= config.eval_limit);
            unpack_position(&mut pos, &r.sfen, false).unwrap();
        }
    }

    #[test]
    fn test_gensfen_stops_immediately_when_flag_set() {
        let dir = tempfile::tempdir().unwrap();
        let config = GensfenConfig {
            depth: 1,
            threads: 1,
            hash_size: 1 << 10,
            output_file_name: dir.path().join("kifu.bin"),
            ..Default::default()
        };
        let stop = AtomicBool::new(true);
        let summary = run_gensfen(&config, &ClassicalEvaluator, &stop).unwrap();
        assert_eq!(summary.written, 0);
    }

    #[test]
    fn test_hand_off_reports_closed_writer() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        assert!(hand_off(&tx, vec![PackedSfenValue::default(); 3], 0));
        assert_eq!(rx.recv().unwrap().len(), 3);

        drop(rx);
        assert!(!hand_off(&tx, vec![PackedSfenValue::default(); 2], 0));
    }
}
