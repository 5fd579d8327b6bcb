//! 基本型

mod color;
mod moves;
mod piece;
mod square;
mod value;

pub use color::Color;
pub use moves::{MAX_MOVES, Move, MoveKind, MoveList};
pub use piece::{Piece, PieceType};
pub use square::{File, Rank, Square};
pub use value::Value;

/// 探索の最大手数
pub const MAX_PLY: i32 = 246;

/// 局面の深さ（探索 ply）
pub type Depth = i32;
