//! NNUE（Efficiently Updatable Neural Network）評価関数
//!
//! HalfKP(Friend)[41024->256x2]-32-32-1 構成。
//!
//! - `bona_piece` / `piece_list`: 駒番号 ↔ 視点別 BonaPiece の対応
//! - `accumulator`: StateInfo ごとの中間表現と DirtyPiece
//! - `features`: 入力特徴量と差分の列挙
//! - `feature_transformer`: 差分更新/全計算
//! - `layers` / `network`: 量子化済みネットワークとファイル形式

mod accumulator;
mod bona_piece;
pub mod constants;
mod feature_transformer;
pub mod features;
pub mod layers;
mod network;
mod piece_list;

pub use accumulator::{Accumulator, Aligned, ChangedBonaPiece, DirtyPiece, IndexList};
pub use bona_piece::{
    BonaPiece, ExtBonaPiece, FE_END, FE_END2, halfkp_index, king_square_from_bona_piece,
};
pub use feature_transformer::{Accumulation, FeatureTransformer};
pub use network::{
    Hidden1, Hidden2, Network, NetworkError, NetworkHeader, OutputLayer, architecture_string,
    file_hash, network_hash,
};
pub use piece_list::{PieceList, PieceNumber};
