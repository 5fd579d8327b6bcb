//! 教師局面ファイルのシャッフル
//!
//! - `shuffle_files`: `buffer_size` 件ずつシャッフルして一時ファイルに書き、残り件数で重み付けして併合
//! - `shuffle_files_quick`: 入力の件数を数えてから入力を直接重み付き併合（一時ファイルなし）
//! - `shuffle_files_in_memory`: 全件をメモリに読んでシャッフル
//!
//! どれも `stop` が立つとそこまでの出力で打ち切る。

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use rand::Rng;
use rand::seq::SliceRandom;

use crate::common::{RecordReader, Writer, count_records, open_writer, write_all_records};
use crate::packed_sfen::PackedSfenValue;

/// シャッフル方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ShuffleMode {
    /// 一時ファイル経由
    Shuffle,
    /// 入力を直接併合
    Shuffleq,
    /// メモリ上
    Shufflem,
}

pub fn progress_bar(len: u64, label: &str) -> ProgressBar {
    let progress = ProgressBar::new(len);
    let template = format!("[{{elapsed_precise}}] {{bar:40.cyan/blue}} {{pos}}/{{len}} ({{per_sec}}) {label}");
    progress.set_style(
        ProgressStyle::default_bar()
            .template(&template)
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    progress
}

fn create_output(path: &Path) -> Result<Writer> {
    open_writer(path).with_context(|| format!("failed to create {}", path.display()))
}

/// 指定方式でシャッフルする。書き出した件数を返す
pub fn shuffle<R: Rng>(
    mode: ShuffleMode,
    inputs: &[PathBuf],
    output: &Path,
    buffer_size: usize,
    rng: &mut R,
    stop: &AtomicBool,
) -> Result<u64> {
    match mode {
        ShuffleMode::Shuffle => shuffle_files(inputs, output, buffer_size, rng, stop),
        ShuffleMode::Shuffleq => shuffle_files_quick(inputs, output, rng, stop),
        ShuffleMode::Shufflem => shuffle_files_in_memory(inputs, output, rng, stop),
    }
}

// =============================================================================
// 一時ファイル方式
// =============================================================================

/// `buffer_size` 件ずつシャッフルして一時ファイルに分け、最後に併合する
pub fn shuffle_files<R: Rng>(
    inputs: &[PathBuf],
    output: &Path,
    buffer_size: usize,
    rng: &mut R,
    stop: &AtomicBool,
) -> Result<u64> {
    let buffer_size = buffer_size.max(1);
    let temp_dir = tempfile::tempdir().context("failed to create temp directory")?;
    let mut chunk_paths = Vec::new();
    let mut chunk_counts = Vec::new();
    let mut buffer = Vec::with_capacity(buffer_size.min(1 << 20));

    log::info!("pass 1: splitting into shuffled chunks of {buffer_size} records");
    let progress = ProgressBar::new_spinner();
    let mut flush_chunk = |buffer: &mut Vec<PackedSfenValue>, rng: &mut R| -> Result<()> {
        buffer.shuffle(rng);
        let path = temp_dir.path().join(format!("chunk_{}.bin", chunk_paths.len()));
        write_all_records(&path, buffer)?;
        chunk_counts.push(buffer.len() as u64);
        chunk_paths.push(path);
        buffer.clear();
        Ok(())
    };

    'inputs: for input in inputs {
        for record in RecordReader::open(input)? {
            if stop.load(Ordering::Relaxed) {
                log::warn!("interrupted while splitting");
                break 'inputs;
            }
            buffer.push(record.with_context(|| format!("failed to read {}", input.display()))?);
            progress.inc(1);
            if buffer.len() >= buffer_size {
                flush_chunk(&mut buffer, rng)?;
            }
        }
    }
    if !buffer.is_empty() {
        flush_chunk(&mut buffer, rng)?;
    }
    progress.finish_and_clear();
    log::info!("{} chunks", chunk_counts.len());

    log::info!("pass 2: merging chunks");
    let readers = chunk_paths.iter().map(RecordReader::open).collect::<Result<Vec<_>>>()?;
    let mut writer = create_output(output)?;
    let written = merge_weighted(readers, chunk_counts, &mut writer, rng, stop)?;
    writer.close()?;
    log::info!("wrote {written} records to {}", output.display());
    Ok(written)
}

// =============================================================================
// 直接併合
// =============================================================================

/// 入力ファイルを件数で重み付けしながら直接併合する
///
/// ファイル内の順序は保たれる。すでに各ファイルが十分に混ざっているときに使う。
pub fn shuffle_files_quick<R: Rng>(
    inputs: &[PathBuf],
    output: &Path,
    rng: &mut R,
    stop: &AtomicBool,
) -> Result<u64> {
    let counts = inputs.iter().map(count_records).collect::<Result<Vec<_>>>()?;
    log::info!("{} records in {} files", counts.iter().sum::<u64>(), inputs.len());

    let readers = inputs.iter().map(RecordReader::open).collect::<Result<Vec<_>>>()?;
    let mut writer = create_output(output)?;
    let written = merge_weighted(readers, counts, &mut writer, rng, stop)?;
    writer.close()?;
    log::info!("wrote {written} records to {}", output.display());
    Ok(written)
}

/// 残り件数に比例した確率でファイルを選び、1件ずつ書き出す
fn merge_weighted<R: Rng, W: Write>(
    mut readers: Vec<RecordReader>,
    mut remaining: Vec<u64>,
    writer: &mut W,
    rng: &mut R,
    stop: &AtomicBool,
) -> Result<u64> {
    let mut total: u64 = remaining.iter().sum();
    let progress = progress_bar(total, "merge");
    let mut written = 0u64;

    while total > 0 {
        if stop.load(Ordering::Relaxed) {
            progress.abandon_with_message("interrupted");
            log::warn!("interrupted after {written} records");
            return Ok(written);
        }

        let mut r = rng.random_range(0..total);
        let mut index = 0;
        while r >= remaining[index] {
            r -= remaining[index];
            index += 1;
        }

        match readers[index].next_record() {
            Ok(Some(record)) => {
                record.write_to(writer)?;
                remaining[index] -= 1;
                total -= 1;
                written += 1;
                progress.inc(1);
            }
            Ok(None) => {
                log::warn!("{} ended early", readers[index].path().display());
                total -= remaining[index];
                remaining[index] = 0;
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("failed to read {}", readers[index].path().display())
                });
            }
        }
    }
    progress.finish_and_clear();
    Ok(written)
}

// =============================================================================
// メモリ上
// =============================================================================

pub fn shuffle_files_in_memory<R: Rng>(
    inputs: &[PathBuf],
    output: &Path,
    rng: &mut R,
    stop: &AtomicBool,
) -> Result<u64> {
    let mut records = Vec::new();
    for input in inputs {
        if stop.load(Ordering::Relaxed) {
            log::warn!("interrupted while reading");
            return Ok(0);
        }
        for record in RecordReader::open(input)? {
            records.push(record.with_context(|| format!("failed to read {}", input.display()))?);
        }
    }
    log::info!(
        "read {} records ({} MB)",
        records.len(),
        records.len() * PackedSfenValue::SIZE / 1_000_000
    );

    records.shuffle(rng);

    let progress = progress_bar(records.len() as u64, "write");
    let mut writer = create_output(output)?;
    let mut written = 0u64;
    for record in &records {
        if stop.load(Ordering::Relaxed) {
            progress.abandon_with_message("interrupted");
            break;
        }
        record.write_to(&mut writer)?;
        written += 1;
        progress.inc(1);
    }
    writer.close()?;
    progress.finish_and_clear();
    log::info!("wrote {written} records to {}", output.display());
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::read_all_records;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn write_inputs(dir: &Path) -> Vec<PathBuf> {
        let a = dir.join("a.bin");
        let b = dir.join("b.bin.gz");
        let records = |r: std::ops::Range<i16>| -> Vec<PackedSfenValue> {
            r.map(|i| PackedSfenValue { score: i, ..Default::default() }).collect()
        };
        write_all_records(&a, &records(0..300)).unwrap();
        write_all_records(&b, &records(300..500)).unwrap();
        vec![a, b]
    }

    fn scores(path: &Path) -> Vec<i16> {
        read_all_records(path).unwrap().iter().map(|r| r.score).collect()
    }

    fn assert_permutation(mut got: Vec<i16>) {
        assert_ne!(got, (0..500).collect::<Vec<_>>());
        got.sort();
        assert_eq!(got, (0..500).collect::<Vec<_>>());
    }

    #[test]
    fn test_shuffle_all_modes_keep_records() {
        let dir = tempfile::tempdir().unwrap();
        let inputs = write_inputs(dir.path());
        let stop = AtomicBool::new(false);

        for (i, mode) in [ShuffleMode::Shuffle, ShuffleMode::Shuffleq, ShuffleMode::Shufflem]
            .into_iter()
            .enumerate()
        {
            let output = dir.path().join(format!("out{i}.bin"));
            let mut rng = ChaCha8Rng::seed_from_u64(i as u64);
            let written = shuffle(mode, &inputs, &output, 64, &mut rng, &stop).unwrap();
            assert_eq!(written, 500);
            assert_permutation(scores(&output));
        }
    }

    #[test]
    fn test_quick_keeps_order_within_file() {
        let dir = tempfile::tempdir().unwrap();
        let inputs = write_inputs(dir.path());
        let output = dir.path().join("out.bin");
        let stop = AtomicBool::new(false);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        shuffle_files_quick(&inputs, &output, &mut rng, &stop).unwrap();

        let got = scores(&output);
        let from_a: Vec<i16> = got.iter().copied().filter(|&s| s < 300).collect();
        assert_eq!(from_a, (0..300).collect::<Vec<_>>());
        // 2ファイルが混ざっている
        assert!(got[..100].iter().any(|&s| s >= 300));
    }

    #[test]
    fn test_same_seed_same_output() {
        let dir = tempfile::tempdir().unwrap();
        let inputs = write_inputs(dir.path());
        let stop = AtomicBool::new(false);
        let out1 = dir.path().join("1.bin");
        let out2 = dir.path().join("2.bin");
        shuffle_files(&inputs, &out1, 100, &mut ChaCha8Rng::seed_from_u64(7), &stop).unwrap();
        shuffle_files(&inputs, &out2, 100, &mut ChaCha8Rng::seed_from_u64(7), &stop).unwrap();
        assert_eq!(scores(&out1), scores(&out2));
    }

    #[test]
    fn test_stop_before_merge() {
        let dir = tempfile::tempdir().unwrap();
        let inputs = write_inputs(dir.path());
        let output = dir.path().join("out.bin");
        let stop = AtomicBool::new(true);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let written = shuffle_files_quick(&inputs, &output, &mut rng, &stop).unwrap();
        assert_eq!(written, 0);
    }
}
