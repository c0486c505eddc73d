//! Core notation types for chess.
//!
//! This crate validates the text that crosses the engine boundary:
//! - [`Position`] for board positions in FEN notation
//! - [`UciMove`] for moves in UCI long algebraic notation
//! - [`Square`] for board coordinates

mod position;
mod square;
mod uci_move;

pub use position::{Position, PositionError, Side};
pub use square::Square;
pub use uci_move::{MoveError, Promotion, UciMove};
