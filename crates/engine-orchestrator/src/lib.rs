//! Supervised UCI engine pool answering best-move requests.
//!
//! Requests enter through [`AnalysisService`], which validates the position,
//! resolves the search depth, and places the request on the least loaded
//! session's bounded queue. Each session runs one dispatcher task that sends
//! exactly one search at a time to its engine and matches the engine's
//! `bestmove` to that request. The [`EngineSupervisor`] restarts engines
//! that crash or stop responding and marks them degraded when restarts keep
//! failing.
//!
//! # Example
//!
//! ```no_run
//! use engine_orchestrator::{AnalysisService, EngineConfig, ProcessSpawner};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = EngineConfig::default();
//! let spawner = Arc::new(ProcessSpawner::from_config(&config));
//! let service = AnalysisService::start(config, spawner)?;
//!
//! let analysis = service
//!     .analyze("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1", Some(10), None)
//!     .await?;
//! println!("best move: {}", analysis.best_move);
//! # Ok(())
//! # }
//! ```

pub mod config;
mod correlator;
mod dispatcher;
pub mod error;
mod queue;
pub mod request;
pub mod service;
pub mod session;
pub mod spawner;
pub mod supervisor;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::{EngineConfig, InvalidConfig, RestartPolicy};
pub use error::{AnalysisError, SessionError};
pub use request::{Analysis, Depth, RequestId, RequestState};
pub use service::{AnalysisService, AnalysisTicket};
pub use session::SessionState;
pub use spawner::{EngineHandle, EngineIo, EngineSpawner, ProcessSpawner};
pub use supervisor::{EngineSupervisor, SlotState, SlotStatus};
pub use uci::Score;
