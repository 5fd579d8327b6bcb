//! shuffle_pack - 教師局面ファイルのシャッフル
//!
//! # 使用例
//!
//! ```shell
//! # 一時ファイル経由（大規模データ向け）
//! cargo run -p tools --release --bin shuffle_pack -- shuffle \
//!   --buffer-size 20000000 --output shuffled.bin data/*.bin
//!
//! # 件数で重み付けして直接併合（メモリも一時領域も使わない）
//! cargo run -p tools --release --bin shuffle_pack -- shuffleq --output shuffled.bin data/*.bin
//!
//! # メモリ上でシャッフル
//! cargo run -p tools --release --bin shuffle_pack -- shufflem --seed 42 --output shuffled.bin a.bin
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use clap::Parser as _;

use tools::common::{init_logger, make_rng};
use tools::shuffle::{ShuffleMode, shuffle};

#[derive(clap::Parser, Debug)]
#[command(about = "shuffle packed training positions")]
struct Cli {
    /// shuffle (temp files), shuffleq (direct merge) or shufflem (in memory)
    #[arg(value_enum)]
    mode: ShuffleMode,

    /// Input files
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Output file (".gz" compresses)
    #[arg(short, long, default_value = "shuffled_sfen.bin")]
    output: PathBuf,

    /// Records per temporary file (shuffle mode)
    #[arg(long, default_value_t = 20_000_000)]
    buffer_size: usize,

    #[arg(long)]
    seed: Option<u64>,
}

static STOP: AtomicBool = AtomicBool::new(false);

fn main() -> Result<()> {
    init_logger();
    let cli = Cli::parse();

    for input in &cli.inputs {
        if !input.exists() {
            anyhow::bail!("input file not found: {}", input.display());
        }
    }

    ctrlc::set_handler(|| {
        log::warn!("interrupted");
        STOP.store(true, Ordering::SeqCst);
    })
    .context("failed to set Ctrl-C handler")?;

    if let Some(seed) = cli.seed {
        log::info!("using seed: {seed}");
    }
    let mut rng = make_rng(cli.seed, 0);
    log::info!("{:?}: {} inputs -> {}", cli.mode, cli.inputs.len(), cli.output.display());

    let written = shuffle(cli.mode, &cli.inputs, &cli.output, cli.buffer_size, &mut rng, &STOP)?;
    if STOP.load(Ordering::SeqCst) {
        log::warn!("processing was interrupted, output may be incomplete ({written} records)");
    }
    Ok(())
}
