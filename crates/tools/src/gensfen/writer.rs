//! 教師局面の書き出しスレッド
//!
//! ワーカーは `SFEN_BUFFER_SIZE` 件ずつまとめて有界チャネルに送り、専用スレッドが
//! ファイルへ書く。チャネルが一杯ならワーカー側の送信がブロックする。

use std::path::{Path, PathBuf};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};

use super::config::append_to_stem;
use crate::common::{Writer, open_writer};
use crate::packed_sfen::PackedSfenValue;

/// ワーカーがまとめて送る件数
pub const SFEN_BUFFER_SIZE: usize = 5000;

/// 進捗を出す間隔
const PROGRESS_INTERVAL: Duration = Duration::from_secs(5);

/// 書き出しスレッドのハンドル
pub struct SfenWriter {
    tx: Sender<Vec<PackedSfenValue>>,
    handle: JoinHandle<Result<u64>>,
}

impl SfenWriter {
    /// 書き出しスレッドを起動する
    ///
    /// `save_every` 件ごとに `name_1.ext`, `name_2.ext`, … へ切り替える。
    pub fn spawn(path: PathBuf, save_every: u64, capacity: usize) -> Result<Self> {
        let (tx, rx) = bounded(capacity.max(1));
        let first = open_writer(&path).with_context(|| format!("failed to create {}", path.display()))?;
        log::info!("output file: {}", path.display());
        let handle = std::thread::Builder::new()
            .name("sfen-writer".into())
            .spawn(move || write_loop(rx, path, first, save_every))
            .context("failed to spawn writer thread")?;
        Ok(Self { tx, handle })
    }

    pub fn sender(&self) -> Sender<Vec<PackedSfenValue>> {
        self.tx.clone()
    }

    /// 送信側を閉じて書き出しの完了を待つ。書き出した件数を返す
    pub fn finish(self) -> Result<u64> {
        drop(self.tx);
        self.handle.join().map_err(|_| anyhow!("writer thread panicked"))?
    }
}

/// n 番目（0 始まり）の出力ファイル名
pub fn rotated_path(base: &Path, index: u64) -> PathBuf {
    if index == 0 { base.to_path_buf() } else { append_to_stem(base, &index.to_string()) }
}

fn write_loop(
    rx: Receiver<Vec<PackedSfenValue>>,
    base: PathBuf,
    first: Writer,
    save_every: u64,
) -> Result<u64> {
    let mut writer = first;
    let mut file_index = 0u64;
    let mut in_file = 0u64;
    let mut total = 0u64;

    let start = Instant::now();
    let mut last_report = start;
    let mut last_total = 0u64;

    loop {
        let batch = match rx.recv_timeout(PROGRESS_INTERVAL) {
            Ok(batch) => batch,
            Err(RecvTimeoutError::Timeout) => Vec::new(),
            Err(RecvTimeoutError::Disconnected) => break,
        };

        for record in &batch {
            if in_file >= save_every {
                writer.close()?;
                file_index += 1;
                in_file = 0;
                let path = rotated_path(&base, file_index);
                writer = open_writer(&path)
                    .with_context(|| format!("failed to create {}", path.display()))?;
                log::info!("output file: {}", path.display());
            }
            record.write_to(&mut writer)?;
            in_file += 1;
            total += 1;
        }

        let now = Instant::now();
        if now.duration_since(last_report) >= PROGRESS_INTERVAL {
            let rate = (total - last_total) as f64 / now.duration_since(last_report).as_secs_f64();
            log::info!(
                "{total} sfens, {rate:.1} sfens/s, elapsed {}s, at {}",
                now.duration_since(start).as_secs(),
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
            );
            last_report = now;
            last_total = total;
        }
    }

    writer.close()?;
    log::info!("{total} sfens written in {:.1}s", start.elapsed().as_secs_f64());
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::count_records;

    fn batch(n: usize) -> Vec<PackedSfenValue> {
        (0..n).map(|i| PackedSfenValue { score: i as i16, ..Default::default() }).collect()
    }

    #[test]
    fn test_writer_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");
        let writer = SfenWriter::spawn(path.clone(), u64::MAX, 4).unwrap();
        let tx = writer.sender();
        tx.send(batch(10)).unwrap();
        tx.send(batch(5)).unwrap();
        drop(tx);
        assert_eq!(writer.finish().unwrap(), 15);
        assert_eq!(count_records(&path).unwrap(), 15);
    }

    #[test]
    fn test_writer_rotation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");
        let writer = SfenWriter::spawn(path.clone(), 4, 4).unwrap();
        let tx = writer.sender();
        tx.send(batch(10)).unwrap();
        drop(tx);
        assert_eq!(writer.finish().unwrap(), 10);

        assert_eq!(count_records(&path).unwrap(), 4);
        assert_eq!(count_records(dir.path().join("out_1.bin")).unwrap(), 4);
        assert_eq!(count_records(dir.path().join("out_2.bin")).unwrap(), 2);
        assert!(!dir.path().join("out_3.bin").exists());
    }

    #[test]
    fn test_rotated_path() {
        let base = Path::new("a/kifu.bin");
        assert_eq!(rotated_path(base, 0), PathBuf::from("a/kifu.bin"));
        assert_eq!(rotated_path(base, 2), PathBuf::from("a/kifu_2.bin"));
    }
}
