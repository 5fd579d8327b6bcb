//! NNUE学習モジュール
//!
//! HalfKP 256x2-32-32 アーキテクチャのNNUE学習を実装する。
//!
//! # 構成
//! - `config`: 学習設定（TOML / コマンドライン）
//! - `network`: 学習可能なネットワーク構造（f32重み）と量子化
//! - `loss`: elmo 式などの損失関数と交差エントロピー集計
//! - `reader`: 教師局面の読み込みスレッドと検証局面
//! - `trainer`: 学習率スケジューラと newbob
//! - `learner`: 学習ループ本体

pub mod config;
pub mod learner;
pub mod loss;
pub mod network;
pub mod reader;
pub mod trainer;

pub use config::LearnConfig;
pub use learner::{LearnSummary, Learner, NETWORK_FILE_NAME, run_learn};
pub use loss::{CrossEntropy, Loss, LossFunction};
pub use network::{Example, Freeze, TrainableNetwork};
pub use trainer::{LearningRateScheduler, NewbobDecision, NewbobState};
