//! learn - 教師局面から NNUE 評価関数を学習
//!
//! # 使用例
//!
//! ```shell
//! cargo run -p tools --release --bin learn -- \
//!   --targetdir data --batchsize 1000000 --loop 10 --eta 1.0 \
//!   --lambda 0.5 --eval-save-interval 100000000 --loss-output-interval 1000000 \
//!   --validation-set-file-name data/val.bin --newbob-decay 0.5 \
//!   'gensfen_*.bin'
//!
//! # 途中から再開
//! cargo run -p tools --release --bin learn -- --config learn.toml --resume evalsave/3/nn.bin
//! ```
//!
//! 途中保存は `output_dir/<番号>/nn.bin`、最後に `output_dir/final/nn.bin` を書く。

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use clap::Parser as _;

use tools::apply_overrides;
use tools::common::{init_logger, load_config, log_config};
use tools::nnue_trainer::{LearnConfig, LossFunction, run_learn};

#[derive(clap::Parser, Debug)]
#[command(about = "train an NNUE evaluation function from packed training positions")]
struct Cli {
    /// Training files or glob patterns (relative to --targetdir if given)
    files: Vec<PathBuf>,

    /// TOML config file (CLI options override it)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Base directory of the training files
    #[arg(long, alias = "basedir")]
    targetdir: Option<PathBuf>,

    /// Number of passes over the input
    #[arg(long = "loop")]
    loop_count: Option<u64>,

    /// Positions per weight update
    #[arg(long = "batchsize")]
    mini_batch_size: Option<u64>,

    /// Learning rate (0: default)
    #[arg(long, alias = "eta1")]
    eta: Option<f64>,

    #[arg(long)]
    eta2: Option<f64>,

    #[arg(long)]
    eta3: Option<f64>,

    /// Epoch at which eta reaches eta2
    #[arg(long)]
    eta1_epoch: Option<u64>,

    /// Epoch at which eta reaches eta3
    #[arg(long)]
    eta2_epoch: Option<u64>,

    /// Weight of the search score against the game result
    #[arg(long)]
    lambda: Option<f64>,

    /// Lambda used when |score| >= lambda-limit
    #[arg(long)]
    lambda2: Option<f64>,

    #[arg(long)]
    lambda_limit: Option<i32>,

    /// Skip positions with |score| above this value
    #[arg(long)]
    eval_limit: Option<i32>,

    #[arg(long)]
    use_draw_in_training: Option<bool>,

    #[arg(long)]
    use_draw_in_validation: Option<bool>,

    /// Skip training positions that also appear in the validation set
    #[arg(long)]
    use_hash_in_training: Option<bool>,

    #[arg(long)]
    skip_duplicated_positions_in_training: Option<bool>,

    /// Entries of the duplicate-position table
    #[arg(long)]
    hash_size: Option<usize>,

    /// Skip positions with gamePly < rand(N)
    #[arg(long)]
    reduction_gameply: Option<u32>,

    /// Gradient weight for positions along the PV (0: leaf only)
    #[arg(long)]
    discount_rate: Option<f64>,

    #[arg(long)]
    freeze_transformer: Option<bool>,

    #[arg(long)]
    freeze_hidden1: Option<bool>,

    #[arg(long)]
    freeze_hidden2: Option<bool>,

    #[arg(long)]
    freeze_output: Option<bool>,

    #[arg(long)]
    momentum: Option<f64>,

    /// elmo, winning_percentage, cross_entropy or cross_entropy_for_value
    #[arg(long)]
    loss: Option<LossFunction>,

    /// Learning-rate decay on a rejected save (1.0: newbob disabled)
    #[arg(long)]
    newbob_decay: Option<f64>,

    #[arg(long)]
    newbob_num_trials: Option<u32>,

    /// Save the network every N positions
    #[arg(long)]
    eval_save_interval: Option<u64>,

    /// Compute the validation loss every N positions
    #[arg(long)]
    loss_output_interval: Option<u64>,

    /// Percentage of positions flipped horizontally
    #[arg(long)]
    mirror_percentage: Option<u32>,

    /// Validation file (default: first records of the input)
    #[arg(long)]
    validation_set_file_name: Option<PathBuf>,

    /// Positions shuffled together by the reader
    #[arg(long)]
    sfen_read_size: Option<usize>,

    /// Positions handed to a worker at once
    #[arg(long)]
    thread_buffer_size: Option<usize>,

    #[arg(long)]
    no_shuffle: Option<bool>,

    /// Overwrite a single network in --output-dir instead of numbered directories
    #[arg(long)]
    save_only_once: Option<bool>,

    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Examples per backward pass
    #[arg(long)]
    nn_batch_size: Option<usize>,

    /// Network file to resume from
    #[arg(long)]
    resume: Option<PathBuf>,

    #[arg(long)]
    seed: Option<u64>,

    /// Worker threads (0: all cores)
    #[arg(long)]
    threads: Option<usize>,
}

static STOP: AtomicBool = AtomicBool::new(false);

fn main() -> Result<()> {
    init_logger();
    let cli = Cli::parse();

    let mut config: LearnConfig = load_config(cli.config.as_deref())?;
    apply_overrides!(config, cli;
        loop_count, mini_batch_size, eta, eta1_epoch, eta2_epoch, lambda, lambda2, lambda_limit,
        eval_limit, use_draw_in_training, use_draw_in_validation, use_hash_in_training,
        skip_duplicated_positions_in_training, hash_size, reduction_gameply, discount_rate,
        freeze_transformer, freeze_hidden1, freeze_hidden2, freeze_output, momentum, loss,
        newbob_decay, newbob_num_trials, eval_save_interval, loss_output_interval,
        mirror_percentage, sfen_read_size, thread_buffer_size, no_shuffle, save_only_once,
        output_dir, nn_batch_size, threads,
    );
    if !cli.files.is_empty() {
        config.files = cli.files.clone();
    }
    if cli.targetdir.is_some() {
        config.targetdir = cli.targetdir.clone();
    }
    if cli.eta2.is_some() {
        config.eta2 = cli.eta2;
    }
    if cli.eta3.is_some() {
        config.eta3 = cli.eta3;
    }
    if cli.validation_set_file_name.is_some() {
        config.validation_set_file_name = cli.validation_set_file_name.clone();
    }
    if cli.resume.is_some() {
        config.resume = cli.resume.clone();
    }
    if cli.seed.is_some() {
        config.seed = cli.seed;
    }
    log_config("learn", &config);

    ctrlc::set_handler(|| {
        log::warn!("interrupted, saving the current network");
        STOP.store(true, Ordering::SeqCst);
    })
    .context("failed to set Ctrl-C handler")?;

    let summary = run_learn(&config, &STOP)?;
    log::info!(
        "finished: {} sfens read, {} examples, {} iterations{}",
        summary.sfens_read,
        summary.examples,
        summary.epochs,
        if summary.converged { ", converged" } else { "" }
    );
    log::info!("final network: {}", summary.final_path.display());
    Ok(())
}
