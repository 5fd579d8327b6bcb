//! convert_pack - 教師局面のバイナリ ↔ テキスト変換
//!
//! # 使用例
//!
//! ```shell
//! cargo run -p tools --release --bin convert_pack -- bin2plain data.bin data.txt
//! cargo run -p tools --release --bin convert_pack -- plain2bin data.txt.gz data.bin
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use clap::Parser as _;

use tools::common::init_logger;
use tools::convert::{bin2plain, plain2bin};

#[derive(clap::Parser, Debug)]
#[command(about = "convert packed training positions to and from text")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Binary records to text ("fen", "move", "score", "ply", "result", "e")
    Bin2plain { input: PathBuf, output: PathBuf },
    /// Text to binary records
    Plain2bin { input: PathBuf, output: PathBuf },
}

static STOP: AtomicBool = AtomicBool::new(false);

fn main() -> Result<()> {
    init_logger();
    let cli = Cli::parse();

    ctrlc::set_handler(|| {
        log::warn!("interrupted");
        STOP.store(true, Ordering::SeqCst);
    })
    .context("failed to set Ctrl-C handler")?;

    match &cli.command {
        Command::Bin2plain { input, output } => bin2plain(input, output, &STOP)?,
        Command::Plain2bin { input, output } => plain2bin(input, output, &STOP)?,
    };
    Ok(())
}
