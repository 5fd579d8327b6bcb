//! 局面表現
//!
//! - `Position`: 盤面・手番・StateInfo プール・PieceList
//! - `StateInfo`: 1手ごとのハッシュ・王手情報・NNUE Accumulator
//! - FEN の読み書き
//! - Zobrist ハッシュ

mod fen;
mod pos;
mod state;
mod zobrist;

pub use fen::{FenError, START_FEN};
pub use pos::{
    ANY_CASTLING, BLACK_OO, BLACK_OOO, Position, WHITE_OO, WHITE_OOO, castling_destinations,
};
pub use state::StateInfo;
pub use zobrist::{
    zobrist_castling, zobrist_enpassant, zobrist_material, zobrist_no_pawns, zobrist_psq,
    zobrist_side,
};
