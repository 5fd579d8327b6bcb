//! # tools
//!
//! NNUE 学習パイプライン用のライブラリとコマンド群。
//!
//! - `packed_sfen`: 40バイト学習レコード（PackedSfenValue）と 32バイト局面圧縮
//! - `gensfen`: 自己対局による教師局面生成
//! - `nnue_trainer`: 浮動小数点ネットワークの学習（読み込みパイプライン、損失、newbob）
//! - `shuffle`: レコード列のシャッフル（3方式）
//! - `convert`: バイナリ ↔ テキスト変換
//! - `nnue_check`: 差分特徴量・差分更新の自己診断と評価関数ファイルのヘッダ表示
//! - `common`: gzip 対応 I/O、設定ファイル読み込み

pub mod common;
pub mod convert;
pub mod gensfen;
pub mod nnue_check;
pub mod nnue_trainer;
pub mod packed_sfen;
pub mod shuffle;
