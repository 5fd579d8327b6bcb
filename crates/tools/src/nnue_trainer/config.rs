//! learn の設定

use std::path::PathBuf;

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

use super::loss::{Loss, LossFunction};
use super::network::Freeze;
use super::trainer::LearningRateScheduler;

/// eta に 0 を指定したときの学習率
const DEFAULT_ETA: f64 = 1.0;

/// 学習の設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LearnConfig {
    /// 教師局面ファイル（glob パターン可）
    pub files: Vec<PathBuf>,
    /// `files` の基準ディレクトリ。`files` が空ならこのディレクトリの全ファイル
    #[serde(alias = "basedir")]
    pub targetdir: Option<PathBuf>,
    /// 入力全体を読む回数
    #[serde(rename = "loop")]
    pub loop_count: u64,
    /// 重みを更新する間隔（局面数）
    #[serde(rename = "batchsize")]
    pub mini_batch_size: u64,
    /// 学習率（0 なら既定値）
    #[serde(alias = "eta1")]
    pub eta: f64,
    /// eta1_epoch での学習率（未指定なら eta）
    pub eta2: Option<f64>,
    /// eta2_epoch 以降の学習率（未指定なら eta2）
    pub eta3: Option<f64>,
    pub eta1_epoch: u64,
    pub eta2_epoch: u64,
    pub lambda: f64,
    pub lambda2: f64,
    pub lambda_limit: i32,
    /// この絶対値を超える評価値の局面は使わない
    pub eval_limit: i32,
    pub use_draw_in_training: bool,
    pub use_draw_in_validation: bool,
    /// 検証局面と同じ局面を学習から除く
    pub use_hash_in_training: bool,
    pub skip_duplicated_positions_in_training: bool,
    /// 重複除去テーブルのエントリ数
    pub hash_size: usize,
    /// `gamePly < rand(reduction_gameply)` の局面を捨てる
    pub reduction_gameply: u32,
    /// PV 途中の局面にも勾配を加えるときの重み（0 なら末端のみ）
    pub discount_rate: f64,
    pub freeze_transformer: bool,
    pub freeze_hidden1: bool,
    pub freeze_hidden2: bool,
    pub freeze_output: bool,
    pub momentum: f64,
    pub loss: LossFunction,
    /// 1.0 なら newbob を使わない
    pub newbob_decay: f64,
    pub newbob_num_trials: u32,
    /// 評価関数を保存する間隔（局面数）
    pub eval_save_interval: u64,
    /// 検証損失を出す間隔（局面数）
    pub loss_output_interval: u64,
    /// 左右反転して学習する確率（%）
    pub mirror_percentage: u32,
    /// 検証用の教師局面ファイル（未指定なら入力の先頭を使う）
    pub validation_set_file_name: Option<PathBuf>,
    /// シャッフル単位の局面数
    pub sfen_read_size: usize,
    /// ワーカーへ渡す1回分の局面数
    pub thread_buffer_size: usize,
    pub no_shuffle: bool,
    /// 途中保存を番号付きディレクトリに分けず、出力先に直接上書きする
    pub save_only_once: bool,
    pub output_dir: PathBuf,
    /// 1回の逆伝播に使う学習例の数
    pub nn_batch_size: usize,
    /// 学習を再開するネットワークファイル
    pub resume: Option<PathBuf>,
    pub seed: Option<u64>,
    /// ワーカースレッド数（0 なら論理コア数）
    pub threads: usize,
}

impl Default for LearnConfig {
    fn default() -> Self {
        Self {
            files: Vec::new(),
            targetdir: None,
            loop_count: 1,
            mini_batch_size: 1_000_000,
            eta: DEFAULT_ETA,
            eta2: None,
            eta3: None,
            eta1_epoch: 0,
            eta2_epoch: 0,
            lambda: 0.33,
            lambda2: 0.33,
            lambda_limit: 32000,
            eval_limit: 32000,
            use_draw_in_training: false,
            use_draw_in_validation: false,
            use_hash_in_training: true,
            skip_duplicated_positions_in_training: true,
            hash_size: 64 * 1024 * 1024,
            reduction_gameply: 1,
            discount_rate: 0.0,
            freeze_transformer: false,
            freeze_hidden1: false,
            freeze_hidden2: false,
            freeze_output: false,
            momentum: 0.0,
            loss: LossFunction::Elmo,
            newbob_decay: 1.0,
            newbob_num_trials: 2,
            eval_save_interval: 1_000_000_000,
            loss_output_interval: 1_000_000,
            mirror_percentage: 0,
            validation_set_file_name: None,
            sfen_read_size: 10_000_000,
            thread_buffer_size: 10_000,
            no_shuffle: false,
            save_only_once: false,
            output_dir: PathBuf::from("evalsave"),
            nn_batch_size: 1000,
            resume: None,
            seed: None,
            threads: 0,
        }
    }
}

impl LearnConfig {
    /// 学習を始められない値を弾く
    pub fn validate(&self) -> Result<()> {
        ensure!(
            (0.0..1.0).contains(&self.momentum),
            "momentum must be in [0, 1), got {}",
            self.momentum
        );
        ensure!(self.nn_batch_size > 0, "nn_batch_size must be positive");
        Ok(())
    }

    pub fn scheduler(&self) -> LearningRateScheduler {
        let eta1 = if self.eta == 0.0 { DEFAULT_ETA } else { self.eta };
        let eta2 = self.eta2.unwrap_or(eta1);
        let eta3 = self.eta3.unwrap_or(eta2);
        LearningRateScheduler::new(eta1, eta2, eta3, self.eta1_epoch, self.eta2_epoch)
    }

    pub fn loss(&self) -> Loss {
        Loss {
            function: self.loss,
            lambda: self.lambda,
            lambda2: self.lambda2,
            lambda_limit: self.lambda_limit,
        }
    }

    pub fn freeze(&self) -> Freeze {
        Freeze {
            transformer: self.freeze_transformer,
            hidden1: self.freeze_hidden1,
            hidden2: self.freeze_hidden2,
            output: self.freeze_output,
        }
    }

    pub fn thread_count(&self) -> usize {
        if self.threads > 0 {
            return self.threads;
        }
        std::thread::available_parallelism().map_or(1, |n| n.get())
    }

    /// 入力ファイルの一覧
    ///
    /// `targetdir` があれば各パターンをその下で解決する。パターンが何にも一致しなければエラー。
    pub fn resolve_files(&self) -> Result<Vec<PathBuf>> {
        let patterns: Vec<PathBuf> = match (&self.targetdir, self.files.is_empty()) {
            (Some(dir), true) => vec![dir.join("*")],
            (Some(dir), false) => self.files.iter().map(|f| dir.join(f)).collect(),
            (None, _) => self.files.clone(),
        };

        let mut files = Vec::new();
        for pattern in &patterns {
            let pattern = pattern.to_string_lossy();
            let mut matched: Vec<PathBuf> = glob::glob(&pattern)
                .with_context(|| format!("invalid file pattern: {pattern}"))?
                .filter_map(|entry| entry.ok())
                .filter(|path| path.is_file())
                .collect();
            if matched.is_empty() {
                anyhow::bail!("no input file matches {pattern}");
            }
            matched.sort();
            files.extend(matched);
        }
        Ok(files)
    }
}
