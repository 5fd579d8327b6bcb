//! 教師局面のバイナリ ↔ テキスト変換
//!
//! テキスト形式は1局面あたり次の行からなる。`e` で1レコード確定。
//!
//! ```text
//! fen rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1
//! move e7e5
//! score 34
//! ply 2
//! result -1
//! e
//! ```
//!
//! `ply` を省略したレコードは 1 として扱う。どちらの向きも `.gz` を透過的に扱う。

use std::io::{BufRead, Write};
use std::path::Path;
use std::sync::LazyLock;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result, bail};
use regex::Regex;
use rchess_core::position::Position;
use rchess_core::types::Move;

use crate::common::{RecordReader, open_reader, open_writer};
use crate::packed_sfen::{PackedSfenValue, unpack_position};

static RE_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(fen|move|score|ply|result)\s+(.+?)\s*$").expect("valid regex")
});

/// バイナリ → テキスト。変換した件数を返す
pub fn bin2plain(input: &Path, output: &Path, stop: &AtomicBool) -> Result<u64> {
    let mut writer =
        open_writer(output).with_context(|| format!("failed to create {}", output.display()))?;
    let mut pos = Position::new();
    let mut count = 0u64;

    for (index, record) in RecordReader::open(input)?.enumerate() {
        if stop.load(Ordering::Relaxed) {
            log::warn!("interrupted after {count} records");
            break;
        }
        let psv = record.with_context(|| format!("failed to read {}", input.display()))?;
        if let Err(e) = unpack_position(&mut pos, &psv.sfen, false) {
            log::warn!("record {index}: {e}, skipped");
            continue;
        }
        writeln!(writer, "fen {}", pos.fen())?;
        writeln!(writer, "move {}", pos.move_to_uci(psv.best_move()))?;
        writeln!(writer, "score {}", psv.score)?;
        writeln!(writer, "ply {}", psv.game_ply)?;
        writeln!(writer, "result {}", psv.game_result)?;
        writeln!(writer, "e")?;
        count += 1;
    }

    writer.close()?;
    log::info!("converted {count} records to {}", output.display());
    Ok(count)
}

/// 組み立て途中のレコード
struct PendingRecord {
    fen: Option<String>,
    mv: Option<String>,
    score: i16,
    ply: u16,
    result: i8,
}

impl Default for PendingRecord {
    fn default() -> Self {
        Self { fen: None, mv: None, score: 0, ply: 1, result: 0 }
    }
}

impl PendingRecord {
    fn build(&self, pos: &mut Position) -> Result<PackedSfenValue> {
        let Some(fen) = &self.fen else {
            bail!("record without fen");
        };
        pos.set_fen(fen).with_context(|| format!("invalid fen: {fen}"))?;
        let mv = match self.mv.as_deref() {
            None | Some("(none)") | Some("0000") => Move::NONE,
            Some(s) => pos
                .move_from_uci(s)
                .with_context(|| format!("illegal move {s} in {fen}"))?,
        };
        let mut psv = PackedSfenValue::from_position(pos, self.score, mv, self.ply);
        psv.game_result = self.result;
        Ok(psv)
    }
}

/// テキスト → バイナリ。変換した件数を返す
///
/// 解釈できないレコードは警告を出して読み飛ばす。
pub fn plain2bin(input: &Path, output: &Path, stop: &AtomicBool) -> Result<u64> {
    let reader =
        open_reader(input).with_context(|| format!("failed to open {}", input.display()))?;
    let mut writer =
        open_writer(output).with_context(|| format!("failed to create {}", output.display()))?;
    let mut pos = Position::new();
    let mut pending = PendingRecord::default();
    let mut count = 0u64;

    for (index, line) in reader.lines().enumerate() {
        if stop.load(Ordering::Relaxed) {
            log::warn!("interrupted after {count} records");
            break;
        }
        let line = line.with_context(|| format!("failed to read {}", input.display()))?;
        let line_no = index + 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if line == "e" {
            match pending.build(&mut pos) {
                Ok(psv) => {
                    psv.write_to(&mut writer)?;
                    count += 1;
                }
                Err(e) => log::warn!("line {line_no}: {e:#}, skipped"),
            }
            pending = PendingRecord::default();
            continue;
        }

        let Some(caps) = RE_FIELD.captures(line) else {
            log::warn!("line {line_no}: unknown line: {line}");
            continue;
        };
        let value = &caps[2];
        let parsed = match &caps[1] {
            "fen" => {
                pending.fen = Some(value.to_string());
                Ok(())
            }
            "move" => {
                pending.mv = Some(value.to_string());
                Ok(())
            }
            "score" => value.parse().map(|v| pending.score = v),
            "ply" => value.parse().map(|v| pending.ply = v),
            _ => value.parse().map(|v| pending.result = v),
        };
        if let Err(e) = parsed {
            log::warn!("line {line_no}: {e}: {line}");
        }
    }

    writer.close()?;
    log::info!("converted {count} records to {}", output.display());
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{read_all_records, write_all_records};

    fn sample_records() -> Vec<PackedSfenValue> {
        let mut pos = Position::startpos();
        let mut records = Vec::new();
        for (i, uci) in ["e2e4", "e7e5", "g1f3", "b8c6"].iter().enumerate() {
            let mv = pos.move_from_uci(uci).unwrap();
            let mut psv = PackedSfenValue::from_position(&pos, (i as i16) * 10 - 15, mv, i as u16 + 1);
            psv.game_result = if i % 2 == 0 { 1 } else { -1 };
            records.push(psv);
            pos.do_move(mv);
        }
        records
    }

    #[test]
    fn test_bin_to_plain_and_back() {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("a.bin");
        let txt = dir.path().join("a.txt.gz");
        let back = dir.path().join("b.bin");
        let stop = AtomicBool::new(false);

        let records = sample_records();
        write_all_records(&bin, &records).unwrap();
        assert_eq!(bin2plain(&bin, &txt, &stop).unwrap(), 4);
        assert_eq!(plain2bin(&txt, &back, &stop).unwrap(), 4);
        assert_eq!(read_all_records(&back).unwrap(), records);
    }

    #[test]
    fn test_plain_text_layout() {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("a.bin");
        let txt = dir.path().join("a.txt");
        write_all_records(&bin, &sample_records()[..1]).unwrap();
        bin2plain(&bin, &txt, &AtomicBool::new(false)).unwrap();

        let text = std::fs::read_to_string(&txt).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            [
                "fen rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1",
                "move e2e4",
                "score -15",
                "ply 1",
                "result 1",
                "e",
            ]
        );
    }

    #[test]
    fn test_plain_defaults_and_bad_records() {
        let dir = tempfile::tempdir().unwrap();
        let txt = dir.path().join("in.txt");
        let bin = dir.path().join("out.bin");
        std::fs::write(
            &txt,
            "fen 8/8/8/8/8/4k3/8/4K2R w K - 0 1\nmove e1g1\nscore 250\nresult 1\ne\n\
             move e2e4\ne\n\
             fen 8/8/8/8/8/4k3/8/4K3 w - - 0 1\nmove a1a8\ne\n\
             hello\n",
        )
        .unwrap();

        assert_eq!(plain2bin(&txt, &bin, &AtomicBool::new(false)).unwrap(), 1);
        let records = read_all_records(&bin).unwrap();
        assert_eq!(records[0].game_ply, 1);
        assert_eq!(records[0].score, 250);
        assert_eq!(records[0].game_result, 1);

        let mut pos = Position::new();
        unpack_position(&mut pos, &records[0].sfen, false).unwrap();
        assert_eq!(pos.move_to_uci(records[0].best_move()), "e1g1");
    }
}
