//! gensfen - 自己対局で教師局面を生成
//!
//! # 使用例
//!
//! ```shell
//! cargo run -p tools --release --bin gensfen -- \
//!   --depth 6 --loop 100000000 --threads 16 \
//!   --eval-file eval/nn.bin --output-file-name data/gensfen.bin --save-every 10000000
//!
//! # 設定ファイルを使う（CLI の指定が優先）
//! cargo run -p tools --release --bin gensfen -- --config gensfen.toml --seed 1
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use clap::Parser as _;
use rchess_core::eval::{ClassicalEvaluator, Evaluator};
use rchess_core::nnue::Network;

use tools::apply_overrides;
use tools::common::{init_logger, load_config, log_config};
use tools::gensfen::{GensfenConfig, run_gensfen};

#[derive(clap::Parser, Debug)]
#[command(about = "generate training positions by self-play")]
struct Cli {
    /// TOML config file (CLI options override it)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Minimum search depth
    #[arg(long)]
    depth: Option<i32>,

    /// Maximum search depth (defaults to --depth)
    #[arg(long)]
    depth2: Option<i32>,

    /// Number of positions to write
    #[arg(long = "loop")]
    loop_count: Option<u64>,

    /// Stop a game when |eval| reaches this value
    #[arg(long)]
    eval_limit: Option<i32>,

    /// First ply eligible for random moves (-1: random moves from the start)
    #[arg(long, allow_hyphen_values = true)]
    random_move_minply: Option<i32>,

    #[arg(long)]
    random_move_maxply: Option<i32>,

    /// Number of random moves per game
    #[arg(long)]
    random_move_count: Option<i32>,

    /// Prefer king moves with probability 1/N (0: disabled)
    #[arg(long)]
    random_move_like_apery: Option<u32>,

    /// Pick random moves from the top N MultiPV lines (0: uniform over legal moves)
    #[arg(long)]
    random_multi_pv: Option<usize>,

    /// Maximum score gap from the best MultiPV line
    #[arg(long)]
    random_multi_pv_diff: Option<i32>,

    #[arg(long)]
    random_multi_pv_depth: Option<i32>,

    /// Do not write positions before this ply
    #[arg(long)]
    write_minply: Option<i32>,

    /// Abandon games that reach this ply
    #[arg(long)]
    write_maxply: Option<i32>,

    /// Output file (".gz" compresses)
    #[arg(long)]
    output_file_name: Option<PathBuf>,

    /// Switch to a new output file every N positions
    #[arg(long)]
    save_every: Option<u64>,

    /// Append a random hex suffix to the output name
    #[arg(long)]
    random_file_name: bool,

    /// Worker threads (0: all cores)
    #[arg(long)]
    threads: Option<usize>,

    #[arg(long)]
    seed: Option<u64>,

    /// Entries of the duplicate-position table
    #[arg(long)]
    hash_size: Option<usize>,

    /// NNUE network file (classical evaluation if omitted)
    #[arg(long)]
    eval_file: Option<PathBuf>,
}

static STOP: AtomicBool = AtomicBool::new(false);

fn main() -> Result<()> {
    init_logger();
    let cli = Cli::parse();

    let mut config: GensfenConfig = load_config(cli.config.as_deref())?;
    apply_overrides!(config, cli;
        depth, loop_count, eval_limit, random_move_minply, random_move_maxply,
        random_move_count, random_move_like_apery, random_multi_pv, random_multi_pv_diff,
        write_minply, write_maxply, output_file_name, save_every, threads, hash_size,
    );
    if cli.depth2.is_some() {
        config.depth2 = cli.depth2;
    }
    if cli.random_multi_pv_depth.is_some() {
        config.random_multi_pv_depth = cli.random_multi_pv_depth;
    }
    if cli.seed.is_some() {
        config.seed = cli.seed;
    }
    if cli.eval_file.is_some() {
        config.eval_file = cli.eval_file.clone();
    }
    if cli.random_file_name {
        config.random_file_name = true;
    }
    log_config("gensfen", &config);

    ctrlc::set_handler(|| {
        log::warn!("interrupted, finishing current games");
        STOP.store(true, Ordering::SeqCst);
    })
    .context("failed to set Ctrl-C handler")?;

    let evaluator: Box<dyn Evaluator> = match &config.eval_file {
        Some(path) => {
            let network = Network::load(path)
                .with_context(|| format!("failed to load {}", path.display()))?;
            log::info!("loaded NNUE network from {}", path.display());
            Box::new(network)
        }
        None => {
            log::info!("using classical evaluation");
            Box::new(ClassicalEvaluator)
        }
    };

    let summary = run_gensfen(&config, evaluator.as_ref(), &STOP)?;
    log::info!(
        "wrote {} positions to {} in {:.1}s ({:.0} pos/s)",
        summary.written,
        summary.output_path.display(),
        summary.elapsed_secs,
        summary.written as f64 / summary.elapsed_secs.max(1e-9)
    );
    Ok(())
}
