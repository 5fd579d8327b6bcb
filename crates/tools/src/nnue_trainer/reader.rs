//! 教師局面の読み込み
//!
//! - 入力ファイルを順に `loop` 回読み、`sfen_read_size` 件ごとにシャッフルする
//! - シャッフルした塊を `thread_buffer_size` 件ずつ有界チャネルで学習スレッドへ渡す
//! - 検証用の局面は入力の先頭（または専用ファイル）から取り、学習には流さない

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Result;
use crossbeam_channel::{SendTimeoutError, Sender};
use rand::Rng;
use rand::seq::SliceRandom;
use rchess_core::position::Position;

use crate::common::{RecordReader, read_all_records};
use crate::packed_sfen::{PackedSfenValue, unpack_position};

/// 検証用に入力の先頭から取る局面数
pub const VALIDATION_SET_SIZE: usize = 2000;

/// 停止フラグを確認する間隔
const SEND_POLL: Duration = Duration::from_millis(100);

/// 読み込みスレッドの設定
#[derive(Debug, Clone)]
pub struct ReaderOptions {
    pub files: Vec<PathBuf>,
    pub loop_count: u64,
    pub read_size: usize,
    pub batch_size: usize,
    pub shuffle: bool,
    /// 最初の周回で先頭から読み飛ばす件数（検証用に取った分）
    pub skip: u64,
}

/// 検証用の局面
pub struct ValidationSet {
    pub records: Vec<PackedSfenValue>,
    /// 入力の先頭から取った件数（学習側で読み飛ばす）
    pub taken_from_input: u64,
}

/// 検証用の局面を用意する
///
/// 専用ファイルがあれば評価値の上限と引き分けの扱いで絞り込む。なければ入力の先頭から取る。
pub fn read_validation_set(
    validation_file: Option<&Path>,
    inputs: &[PathBuf],
    eval_limit: i32,
    use_draw: bool,
) -> Result<ValidationSet> {
    if let Some(path) = validation_file {
        let records: Vec<_> = read_all_records(path)?
            .into_iter()
            .filter(|r| i32::from(r.score).abs() <= eval_limit)
            .filter(|r| use_draw || r.game_result != 0)
            .collect();
        log::info!("validation set: {} sfens from {}", records.len(), path.display());
        return Ok(ValidationSet { records, taken_from_input: 0 });
    }

    let mut records = Vec::with_capacity(VALIDATION_SET_SIZE);
    'files: for path in inputs {
        for record in RecordReader::open(path)? {
            if records.len() >= VALIDATION_SET_SIZE {
                break 'files;
            }
            records.push(record?);
        }
    }
    log::info!("validation set: first {} sfens of the input", records.len());
    let taken_from_input = records.len() as u64;
    Ok(ValidationSet { records, taken_from_input })
}

/// 検証局面の局面キー
pub fn position_keys(records: &[PackedSfenValue]) -> HashSet<u64> {
    let mut pos = Position::new();
    records
        .iter()
        .filter_map(|r| unpack_position(&mut pos, &r.sfen, false).ok().map(|()| pos.key()))
        .collect()
}

/// 入力を読み、シャッフルしてチャネルに流す。送った件数を返す
///
/// 受信側がすべて閉じるか `stop` が立つと途中で終わる。
pub fn read_sfens<R: Rng>(
    options: &ReaderOptions,
    rng: &mut R,
    tx: Sender<Vec<PackedSfenValue>>,
    stop: &AtomicBool,
) -> Result<u64> {
    let mut skip = options.skip;
    let mut chunk = Vec::with_capacity(options.read_size.min(1 << 20));
    let mut sent = 0u64;

    for round in 0..options.loop_count {
        for path in &options.files {
            log::info!("open file (round {}): {}", round + 1, path.display());
            let reader = match RecordReader::open(path) {
                Ok(r) => r,
                Err(e) => {
                    log::warn!("{e:#}, skipped");
                    continue;
                }
            };
            for record in reader {
                let record = match record {
                    Ok(r) => r,
                    Err(e) => {
                        log::warn!("read error in {}: {e}", path.display());
                        break;
                    }
                };
                if skip > 0 {
                    skip -= 1;
                    continue;
                }
                chunk.push(record);
                if chunk.len() >= options.read_size
                    && !flush(&mut chunk, options, rng, &tx, stop, &mut sent)
                {
                    return Ok(sent);
                }
            }
        }
    }

    if !flush(&mut chunk, options, rng, &tx, stop, &mut sent) {
        return Ok(sent);
    }
    log::info!("all input read: {sent} sfens");
    Ok(sent)
}

/// 塊をシャッフルして送る。受信側がいない・停止要求なら `false`
fn flush<R: Rng>(
    chunk: &mut Vec<PackedSfenValue>,
    options: &ReaderOptions,
    rng: &mut R,
    tx: &Sender<Vec<PackedSfenValue>>,
    stop: &AtomicBool,
    sent: &mut u64,
) -> bool {
    if options.shuffle {
        chunk.shuffle(rng);
    }
    for batch in chunk.chunks(options.batch_size.max(1)) {
        if !send_batch(tx, batch.to_vec(), stop) {
            return false;
        }
        *sent += batch.len() as u64;
    }
    chunk.clear();
    true
}

fn send_batch(
    tx: &Sender<Vec<PackedSfenValue>>,
    mut batch: Vec<PackedSfenValue>,
    stop: &AtomicBool,
) -> bool {
    loop {
        match tx.send_timeout(batch, SEND_POLL) {
            Ok(()) => return true,
            Err(SendTimeoutError::Timeout(b)) => {
                if stop.load(Ordering::Relaxed) {
                    return false;
                }
                batch = b;
            }
            Err(SendTimeoutError::Disconnected(_)) => return false,
        }
    }
}
