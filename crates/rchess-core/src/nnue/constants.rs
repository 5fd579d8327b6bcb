//! NNUE 定数
//!
//! HalfKP(Friend)[41024->256x2]-32-32-1 構成。

/// 評価関数ファイルのバージョン
pub const NNUE_VERSION: u32 = 0x7AF3_2F16;

/// Feature Transformer 出力次元（片側視点）
pub const TRANSFORMED_FEATURE_DIMENSIONS: usize = 256;

/// 隠れ層1の出力次元
pub const HIDDEN1_DIMENSIONS: usize = 32;

/// 隠れ層2の出力次元
pub const HIDDEN2_DIMENSIONS: usize = 32;

/// 出力次元
pub const OUTPUT_DIMENSIONS: usize = 1;

/// 評価値のスケーリング係数（出力層の整数値 / FV_SCALE = 評価値）
pub const FV_SCALE: i32 = 16;

/// 重みのスケーリング（右シフト量）
pub const WEIGHT_SCALE_BITS: u32 = 6;

/// アーキテクチャ文字列の最大長
pub const MAX_ARCH_LEN: usize = 4096;

/// 差分更新で遡る最大手数
pub const MAX_ACCUMULATOR_LOOKBACK: usize = 8;

/// 1局面でアクティブになる特徴量の最大数（玉を除く30駒）
pub const MAX_ACTIVE_FEATURES: usize = 30;

/// 1手で変化する特徴量の最大数（2駒 × old/new）
pub const MAX_CHANGED_FEATURES: usize = 2;
