//! # rchess-core
//!
//! チェスエンジンのコアライブラリ。
//!
//! - `types`: 手番・升・駒・指し手・評価値などの基本型
//! - `bitboard`: 64bit ビットボードと利きテーブル
//! - `position`: 局面表現、StateInfo スタック、Zobrist ハッシュ、FEN
//! - `movegen`: 合法手生成
//! - `eval`: 手作り評価関数（駒割り + PST）と `Evaluator` トレイト
//! - `search`: αβ探索・静止探索（PV/MultiPV 対応）
//! - `nnue`: HalfKP 256x2-32-32 の NNUE 推論（差分更新付き）

// Phase 1: 基本型
pub mod bitboard;
pub mod types;

// Phase 2: 局面と指し手生成
pub mod movegen;
pub mod position;

// Phase 3: 評価と探索
pub mod eval;
pub mod nnue;
pub mod search;

pub use position::Position;
pub use types::{Color, Move, Piece, PieceType, Square, Value};
