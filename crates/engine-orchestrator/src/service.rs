//! The public entry point: validate, queue, and wait for a best move.

use crate::config::{EngineConfig, InvalidConfig};
use crate::error::AnalysisError;
use crate::request::{Analysis, AnalysisRequest, Depth, Reply, RequestId};
use crate::spawner::EngineSpawner;
use crate::supervisor::{EngineSupervisor, Slot};
use chess_core::Position;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

/// Best-move analysis over a supervised engine pool.
///
/// Cheap to clone; clones share the pool.
#[derive(Clone)]
pub struct AnalysisService {
    supervisor: Arc<EngineSupervisor>,
}

impl AnalysisService {
    /// Starts an engine pool and wraps it in a service.
    pub fn start(
        config: EngineConfig,
        spawner: Arc<dyn EngineSpawner>,
    ) -> Result<Self, InvalidConfig> {
        Ok(Self::new(Arc::new(EngineSupervisor::start(config, spawner)?)))
    }

    pub fn new(supervisor: Arc<EngineSupervisor>) -> Self {
        Self { supervisor }
    }

    pub fn supervisor(&self) -> &Arc<EngineSupervisor> {
        &self.supervisor
    }

    /// Best move for `position`.
    ///
    /// `depth` defaults to the configured default and is clamped to the
    /// configured maximum. `timeout` is capped at `max_analysis_time`.
    pub async fn analyze(
        &self,
        position: &str,
        depth: Option<i64>,
        timeout: Option<Duration>,
    ) -> Result<Analysis, AnalysisError> {
        self.submit(position, depth, timeout)?.wait().await
    }

    /// Validates and queues a request without waiting for it.
    ///
    /// Invalid input is rejected here and never reaches a queue.
    pub fn submit(
        &self,
        position: &str,
        depth: Option<i64>,
        timeout: Option<Duration>,
    ) -> Result<AnalysisTicket, AnalysisError> {
        let config = self.supervisor.config();
        let position = Position::parse(position)?;
        let depth = Depth::resolve(depth, config)?;
        if let Some(t) = timeout {
            if t.is_zero() {
                return Err(AnalysisError::InvalidInput(
                    "timeout must be greater than zero".to_string(),
                ));
            }
        }

        let (request, reply) = AnalysisRequest::new(position, depth, config.effective_timeout(timeout));
        let id = request.id();
        let deadline = request.deadline();
        let slot = self.supervisor.assign(request)?;

        Ok(AnalysisTicket {
            id,
            deadline,
            reply,
            slot,
        })
    }

    /// Requests waiting across all sessions, not counting active ones.
    pub fn queued(&self) -> usize {
        self.supervisor.queued()
    }
}

/// Handle to a submitted request.
///
/// Dropping the ticket cancels the request: a queued request is removed
/// without ever reaching the engine, an active search is stopped.
pub struct AnalysisTicket {
    id: RequestId,
    deadline: Instant,
    reply: oneshot::Receiver<Reply>,
    slot: Arc<Slot>,
}

impl AnalysisTicket {
    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Gives up on the request.
    pub fn cancel(self) {
        tracing::debug!(request = %self.id, "Cancelling request");
    }

    /// Waits for the engine's answer or the deadline, whichever comes first.
    pub async fn wait(mut self) -> Result<Analysis, AnalysisError> {
        let outcome = tokio::select! {
            biased;
            reply = &mut self.reply => Some(reply),
            _ = tokio::time::sleep_until(self.deadline) => None,
        };

        match outcome {
            Some(Ok(result)) => result,
            // Sender dropped unanswered: the request was lost with its session.
            Some(Err(_)) => Err(AnalysisError::EngineUnavailable),
            None => {
                if let Some(mut request) = self.slot.queue().remove(self.id) {
                    tracing::info!(request = %self.id, "Deadline passed while queued");
                    request.finish(Err(AnalysisError::Timeout));
                }
                Err(AnalysisError::Timeout)
            }
        }
    }
}

impl Drop for AnalysisTicket {
    fn drop(&mut self) {
        if let Some(mut request) = self.slot.queue().remove(self.id) {
            request.finish(Err(AnalysisError::Cancelled));
        }
    }
}
