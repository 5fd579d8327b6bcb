//! ファイルI/Oユーティリティ（gzip対応）
//!
//! - `open_reader` / `open_writer`: 拡張子 `.gz` なら透過的に圧縮・展開、`-` は標準入出力
//! - `RecordReader`: 40バイトレコードの逐次読み込み
//! - `count_records` / `read_all_records`: ファイル単位の件数取得と一括読み込み

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::packed_sfen::PackedSfenValue;

const READER_BUF_CAP: usize = 128 * 1024; // 128 KiB

fn is_gzip(p: &Path) -> bool {
    p.extension().and_then(|e| e.to_str()).is_some_and(|e| e.eq_ignore_ascii_case("gz"))
}

pub fn open_reader<P: AsRef<Path>>(path: P) -> io::Result<Box<dyn BufRead + Send>> {
    let p = path.as_ref();
    if p.to_string_lossy() == "-" {
        return Ok(Box::new(BufReader::with_capacity(READER_BUF_CAP, io::stdin())));
    }
    let f = File::open(p)?;
    if is_gzip(p) {
        let dec = flate2::read::GzDecoder::new(f);
        return Ok(Box::new(BufReader::with_capacity(READER_BUF_CAP, dec)));
    }
    Ok(Box::new(BufReader::with_capacity(READER_BUF_CAP, f)))
}

/// Writer wrapper to propagate finish/close errors for compressed outputs.
#[must_use = "call .close() to propagate compression/IO errors"]
pub enum Writer {
    Plain(BufWriter<File>),
    Stdout(std::io::Stdout),
    Gz(flate2::write::GzEncoder<File>),
}

impl Write for Writer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Writer::Plain(f) => f.write(buf),
            Writer::Stdout(s) => s.write(buf),
            Writer::Gz(e) => e.write(buf),
        }
    }
    fn flush(&mut self) -> io::Result<()> {
        match self {
            Writer::Plain(f) => f.flush(),
            Writer::Stdout(s) => s.flush(),
            Writer::Gz(e) => e.flush(),
        }
    }
}

impl Writer {
    /// Finalize the stream and flush underlying file/stdout.
    pub fn close(self) -> io::Result<()> {
        match self {
            Writer::Plain(f) => {
                let mut file = f.into_inner().map_err(|e| e.into_error())?;
                file.flush()
            }
            Writer::Stdout(mut s) => s.flush(),
            Writer::Gz(e) => {
                let mut f = e.finish()?;
                f.flush()
            }
        }
    }
}

/// 書き込み先を開く。`append` が真なら既存ファイルの末尾に追記する（gzip は新しいメンバとして連結）
pub fn open_writer_with<P: AsRef<Path>>(path: P, append: bool) -> io::Result<Writer> {
    let p = path.as_ref();
    if p.to_string_lossy() == "-" {
        return Ok(Writer::Stdout(std::io::stdout()));
    }
    let f = if append {
        File::options().create(true).append(true).open(p)?
    } else {
        File::create(p)?
    };
    if is_gzip(p) {
        let enc = flate2::write::GzEncoder::new(f, flate2::Compression::default());
        return Ok(Writer::Gz(enc));
    }
    Ok(Writer::Plain(BufWriter::new(f)))
}

pub fn open_writer<P: AsRef<Path>>(path: P) -> io::Result<Writer> {
    open_writer_with(path, false)
}

// ========== レコード読み込み ==========

/// PackedSfenValue を1件ずつ返すイテレータ
///
/// 末尾の 40バイトに満たない端数は無視する（生成途中で止めたファイル）。
pub struct RecordReader {
    inner: Box<dyn BufRead + Send>,
    path: PathBuf,
}

impl RecordReader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let inner =
            open_reader(&path).with_context(|| format!("failed to open {}", path.display()))?;
        Ok(Self { inner, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 次のレコード。終端なら `Ok(None)`
    pub fn next_record(&mut self) -> io::Result<Option<PackedSfenValue>> {
        PackedSfenValue::read_from(&mut self.inner)
    }
}

impl Iterator for RecordReader {
    type Item = io::Result<PackedSfenValue>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

/// ファイル内のレコード数（非圧縮ファイルはサイズから求める）
pub fn count_records<P: AsRef<Path>>(path: P) -> Result<u64> {
    let p = path.as_ref();
    if !is_gzip(p) {
        let len = std::fs::metadata(p)
            .with_context(|| format!("failed to stat {}", p.display()))?
            .len();
        return Ok(len / PackedSfenValue::SIZE as u64);
    }
    let mut reader = open_reader(p)?;
    let mut total = 0u64;
    let mut buf = vec![0u8; READER_BUF_CAP];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        total += n as u64;
    }
    Ok(total / PackedSfenValue::SIZE as u64)
}

/// ファイルのレコードをすべて読み込む
pub fn read_all_records<P: AsRef<Path>>(path: P) -> Result<Vec<PackedSfenValue>> {
    let p = path.as_ref();
    let mut records = Vec::new();
    for record in RecordReader::open(p)? {
        records.push(record.with_context(|| format!("failed to read {}", p.display()))?);
    }
    Ok(records)
}

/// レコード列をファイルに書き出す
pub fn write_all_records<P: AsRef<Path>>(path: P, records: &[PackedSfenValue]) -> Result<()> {
    let p = path.as_ref();
    let mut writer =
        open_writer(p).with_context(|| format!("failed to create {}", p.display()))?;
    for record in records {
        record.write_to(&mut writer)?;
    }
    writer.close()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(n: usize) -> Vec<PackedSfenValue> {
        (0..n)
            .map(|i| PackedSfenValue {
                score: i as i16,
                game_ply: i as u16 + 1,
                ..Default::default()
            })
            .collect()
    }

    #[test]
    fn test_write_and_read_plain() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.bin");
        let records = sample(10);
        write_all_records(&path, &records).unwrap();

        assert_eq!(count_records(&path).unwrap(), 10);
        assert_eq!(read_all_records(&path).unwrap(), records);
    }

    #[test]
    fn test_write_and_read_gzip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.bin.gz");
        let records = sample(7);
        write_all_records(&path, &records).unwrap();

        assert_eq!(count_records(&path).unwrap(), 7);
        assert_eq!(read_all_records(&path).unwrap(), records);
    }

    #[test]
    fn test_trailing_fraction_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.bin");
        let mut bytes = Vec::new();
        for r in sample(3) {
            bytes.extend_from_slice(&r.to_bytes());
        }
        bytes.extend_from_slice(&[0u8; 17]);
        std::fs::write(&path, bytes).unwrap();

        assert_eq!(count_records(&path).unwrap(), 3);
        assert_eq!(read_all_records(&path).unwrap().len(), 3);
    }

    #[test]
    fn test_append_writer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.bin");
        write_all_records(&path, &sample(2)).unwrap();
        let mut w = open_writer_with(&path, true).unwrap();
        sample(1)[0].write_to(&mut w).unwrap();
        w.close().unwrap();
        assert_eq!(count_records(&path).unwrap(), 3);
    }
}
