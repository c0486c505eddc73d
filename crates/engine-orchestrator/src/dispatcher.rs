//! The per-session loop feeding queued requests to the engine one at a time.

use crate::config::EngineConfig;
use crate::correlator::{Correlation, ResponseCorrelator, SearchSummary};
use crate::error::AnalysisError;
use crate::request::{Analysis, AnalysisRequest, RequestId};
use crate::session::EngineSession;
use crate::supervisor::Slot;
use chess_core::UciMove;
use tokio::sync::watch;
use tokio::time::Instant;

/// Why a dispatcher returned control to the supervisor.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum DispatcherExit {
    Shutdown,
    /// The engine process exited or its pipes broke.
    Crashed(String),
    /// The engine ignored `stop` for longer than the grace period.
    Wedged,
}

enum Idle {
    Shutdown,
    Request(AnalysisRequest),
    Line(Option<String>),
}

enum Active {
    Line(Option<String>),
    Deadline,
    CallerGone,
    Shutdown,
}

/// Completes once shutdown has been signalled or the signal sender is gone.
pub(crate) async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

pub(crate) struct Dispatcher<'a> {
    session: &'a mut EngineSession,
    slot: &'a Slot,
    config: &'a EngineConfig,
    correlator: ResponseCorrelator,
}

impl<'a> Dispatcher<'a> {
    pub(crate) fn new(session: &'a mut EngineSession, slot: &'a Slot, config: &'a EngineConfig) -> Self {
        Self {
            session,
            slot,
            config,
            correlator: ResponseCorrelator::new(),
        }
    }

    /// Serves the slot's queue until shutdown or until the engine fails.
    ///
    /// Exactly one request is in flight at a time; the next is not popped
    /// until the previous one has been resolved or abandoned.
    pub(crate) async fn run(&mut self, shutdown: &mut watch::Receiver<bool>) -> DispatcherExit {
        loop {
            let event = tokio::select! {
                biased;
                _ = shutdown_requested(shutdown) => Idle::Shutdown,
                request = self.slot.queue().pop() => Idle::Request(request),
                line = self.session.next_line() => Idle::Line(line),
            };

            match event {
                Idle::Shutdown => return DispatcherExit::Shutdown,
                Idle::Request(request) => {
                    if let Some(exit) = self.serve(request, shutdown).await {
                        return exit;
                    }
                }
                Idle::Line(Some(line)) => {
                    if let Correlation::Unsolicited = self.correlator.observe(&line) {
                        tracing::warn!(session = self.session.id(), line = %line, "Unsolicited bestmove");
                    }
                }
                Idle::Line(None) => {
                    return DispatcherExit::Crashed("engine exited while idle".to_string());
                }
            }
        }
    }

    async fn serve(
        &mut self,
        mut request: AnalysisRequest,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Option<DispatcherExit> {
        let id = request.id();
        if request.caller_gone() {
            tracing::debug!(session = self.session.id(), request = %id, "Caller left before dispatch");
            request.finish(Err(AnalysisError::Cancelled));
            return None;
        }
        if request.is_expired(Instant::now()) {
            tracing::debug!(session = self.session.id(), request = %id, "Deadline passed while queued");
            request.finish(Err(AnalysisError::Timeout));
            return None;
        }

        request.mark_dispatched();
        self.slot.set_active(Some(id));
        let exit = self.analyse(&mut request, shutdown).await;
        self.session.clear_request();
        self.slot.set_active(None);
        exit
    }

    async fn analyse(
        &mut self,
        request: &mut AnalysisRequest,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Option<DispatcherExit> {
        let id = request.id();
        tracing::debug!(
            session = self.session.id(),
            request = %id,
            depth = request.depth().get(),
            "Dispatching request"
        );

        if let Err(e) = self
            .session
            .submit(request, self.config.new_game_per_request)
            .await
        {
            let reason = e.to_string();
            request.finish(Err(AnalysisError::EngineCrash(reason.clone())));
            return Some(DispatcherExit::Crashed(reason));
        }
        self.correlator.dispatch(id);

        let deadline = request.deadline();
        loop {
            let event = tokio::select! {
                biased;
                line = self.session.next_line() => Active::Line(line),
                _ = tokio::time::sleep_until(deadline) => Active::Deadline,
                _ = request.caller_closed() => Active::CallerGone,
                _ = shutdown_requested(shutdown) => Active::Shutdown,
            };

            match event {
                Active::Line(Some(line)) => match self.correlator.observe(&line) {
                    Correlation::Resolved { outcome, .. } => {
                        self.complete(request, outcome);
                        return None;
                    }
                    Correlation::Unsolicited | Correlation::Discarded { .. } => {
                        tracing::warn!(session = self.session.id(), line = %line, "Unexpected bestmove");
                    }
                    Correlation::Progress | Correlation::Ignored => {}
                },
                Active::Line(None) => {
                    let reason = "engine exited during analysis".to_string();
                    tracing::error!(session = self.session.id(), request = %id, "Engine exited during analysis");
                    request.finish(Err(AnalysisError::EngineCrash(reason.clone())));
                    return Some(DispatcherExit::Crashed(reason));
                }
                Active::Deadline => {
                    tracing::info!(session = self.session.id(), request = %id, "Analysis timed out, stopping search");
                    request.finish(Err(AnalysisError::Timeout));
                    return self.abandon(id).await;
                }
                Active::CallerGone => {
                    tracing::info!(session = self.session.id(), request = %id, "Analysis cancelled, stopping search");
                    request.finish(Err(AnalysisError::Cancelled));
                    return self.abandon(id).await;
                }
                Active::Shutdown => {
                    request.finish(Err(AnalysisError::EngineUnavailable));
                    return Some(DispatcherExit::Shutdown);
                }
            }
        }
    }

    fn complete(
        &mut self,
        request: &mut AnalysisRequest,
        outcome: Result<(UciMove, SearchSummary), AnalysisError>,
    ) {
        let id = request.id();
        let elapsed = request.submitted_at().elapsed();
        match outcome {
            Ok((best_move, summary)) => {
                self.slot.record_success();
                tracing::info!(
                    session = self.session.id(),
                    request = %id,
                    best_move = %best_move,
                    depth = ?summary.depth,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Analysis complete"
                );
                request.finish(Ok(Analysis {
                    request_id: id,
                    best_move,
                    depth: summary.depth,
                    score: summary.score,
                    session: self.session.id(),
                    elapsed,
                }));
            }
            Err(e) => {
                tracing::warn!(session = self.session.id(), request = %id, error = %e, "Analysis failed");
                request.finish(Err(e));
            }
        }
    }

    /// Stops the search of an already answered request and waits for the
    /// engine to acknowledge with its (discarded) move.
    async fn abandon(&mut self, id: RequestId) -> Option<DispatcherExit> {
        self.correlator.abandon(id);
        if let Err(e) = self.session.stop().await {
            return Some(DispatcherExit::Crashed(e.to_string()));
        }

        let session = self.session.id();
        let grace = tokio::time::sleep(self.config.stop_grace());
        tokio::pin!(grace);
        loop {
            let line = tokio::select! {
                biased;
                line = self.session.next_line() => line,
                _ = &mut grace => {
                    tracing::warn!(
                        session,
                        request = %id,
                        grace_ms = self.config.stop_grace_ms,
                        "Engine ignored stop"
                    );
                    return Some(DispatcherExit::Wedged);
                }
            };

            match line {
                Some(line) => {
                    if let Correlation::Discarded { .. } = self.correlator.observe(&line) {
                        tracing::debug!(session, request = %id, "Discarded late bestmove");
                        return None;
                    }
                }
                None => {
                    return Some(DispatcherExit::Crashed(
                        "engine exited after stop".to_string(),
                    ));
                }
            }
        }
    }
}
