//! Error types for analysis requests and engine sessions.

use chess_core::PositionError;
use std::time::Duration;
use thiserror::Error;

/// Why an analysis request did not produce a move.
///
/// Each variant reaches only the caller whose request it concerns.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    /// The position or parameters were rejected before queueing.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Every eligible session's queue is full.
    #[error("engine queue is full ({capacity} requests waiting)")]
    Backpressure { capacity: usize },
    /// The engine process died or stopped responding during the request.
    #[error("engine crashed: {0}")]
    EngineCrash(String),
    #[error("analysis timed out")]
    Timeout,
    #[error("analysis cancelled")]
    Cancelled,
    /// No session is able to serve requests.
    #[error("no engine available")]
    EngineUnavailable,
    /// The engine answered with something that is not a move.
    #[error("engine protocol violation: {0}")]
    ProtocolViolation(String),
    /// The engine reported that the side to move has no legal move.
    #[error("engine reports no legal move")]
    NoLegalMove,
}

impl AnalysisError {
    /// Stable machine-readable name of the error class.
    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisError::InvalidInput(_) => "invalid_input",
            AnalysisError::Backpressure { .. } => "backpressure",
            AnalysisError::EngineCrash(_) => "engine_crash",
            AnalysisError::Timeout => "timeout",
            AnalysisError::Cancelled => "cancelled",
            AnalysisError::EngineUnavailable => "engine_unavailable",
            AnalysisError::ProtocolViolation(_) => "protocol_violation",
            AnalysisError::NoLegalMove => "no_legal_move",
        }
    }
}

impl From<PositionError> for AnalysisError {
    fn from(err: PositionError) -> Self {
        AnalysisError::InvalidInput(err.to_string())
    }
}

/// Failures of an engine session as a whole.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("failed to spawn engine: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("engine did not complete the handshake within {0:?}")]
    HandshakeTimeout(Duration),
    #[error("engine closed its output")]
    Closed,
    #[error("engine I/O error: {0}")]
    Io(#[from] std::io::Error),
}
