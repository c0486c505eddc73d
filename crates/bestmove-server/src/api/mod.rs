//! API handlers for the best-move server.

pub mod bestmove;
pub mod status;
