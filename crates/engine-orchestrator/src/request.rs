//! Analysis requests and their results.

use crate::config::EngineConfig;
use crate::error::AnalysisError;
use chess_core::{Position, UciMove};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use uci::Score;

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Process-wide unique, monotonically increasing request identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl RequestId {
    pub(crate) fn next() -> Self {
        RequestId(NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Search depth within the configured bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Depth(u32);

impl Depth {
    /// Resolves a caller supplied depth.
    ///
    /// Missing means the configured default; anything above `max_depth` is
    /// clamped down. Values below `min_depth` ask for no search at all and are
    /// rejected.
    pub fn resolve(requested: Option<i64>, config: &EngineConfig) -> Result<Self, AnalysisError> {
        let depth = match requested {
            None => config.default_depth,
            Some(d) if d < i64::from(config.min_depth) => {
                return Err(AnalysisError::InvalidInput(format!(
                    "depth must be at least {}, got {}",
                    config.min_depth, d
                )));
            }
            Some(d) => d.min(i64::from(config.max_depth)) as u32,
        };
        Ok(Depth(depth))
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Depth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestState {
    Queued,
    Dispatched,
    Completed,
    Failed(AnalysisError),
    TimedOut,
    Cancelled,
}

impl RequestState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RequestState::Queued | RequestState::Dispatched)
    }
}

/// The engine's answer to one request.
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub request_id: RequestId,
    pub best_move: UciMove,
    /// Deepest completed iteration reported before the move.
    pub depth: Option<u32>,
    pub score: Option<Score>,
    /// Session that served the request.
    pub session: usize,
    /// Time from submission to answer.
    pub elapsed: Duration,
}

pub type Reply = Result<Analysis, AnalysisError>;

/// A request travelling through a session queue.
///
/// The reply sender is taken on first use, so a request is answered exactly
/// once no matter how many paths try to resolve it.
#[derive(Debug)]
pub struct AnalysisRequest {
    id: RequestId,
    position: Position,
    depth: Depth,
    submitted_at: Instant,
    deadline: Instant,
    state: RequestState,
    reply: Option<oneshot::Sender<Reply>>,
}

impl AnalysisRequest {
    pub(crate) fn new(
        position: Position,
        depth: Depth,
        timeout: Duration,
    ) -> (Self, oneshot::Receiver<Reply>) {
        let (tx, rx) = oneshot::channel();
        let submitted_at = Instant::now();
        let request = Self {
            id: RequestId::next(),
            position,
            depth,
            submitted_at,
            deadline: submitted_at + timeout,
            state: RequestState::Queued,
            reply: Some(tx),
        };
        (request, rx)
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn depth(&self) -> Depth {
        self.depth
    }

    pub fn submitted_at(&self) -> Instant {
        self.submitted_at
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn state(&self) -> &RequestState {
        &self.state
    }

    pub(crate) fn mark_dispatched(&mut self) {
        self.state = RequestState::Dispatched;
    }

    pub(crate) fn is_expired(&self, now: Instant) -> bool {
        now >= self.deadline
    }

    /// True once nobody is waiting for the reply any more.
    pub(crate) fn caller_gone(&self) -> bool {
        self.reply.as_ref().map_or(true, |tx| tx.is_closed())
    }

    /// Completes when the caller drops its end. Pending forever once answered.
    pub(crate) async fn caller_closed(&mut self) {
        match self.reply.as_mut() {
            Some(tx) => tx.closed().await,
            None => std::future::pending::<()>().await,
        }
    }

    /// Moves the request to its terminal state and answers the caller.
    ///
    /// Returns false if the request had already been answered or the caller
    /// has gone away.
    pub(crate) fn finish(&mut self, result: Reply) -> bool {
        let Some(tx) = self.reply.take() else {
            return false;
        };
        self.state = match &result {
            Ok(_) => RequestState::Completed,
            Err(AnalysisError::Timeout) => RequestState::TimedOut,
            Err(AnalysisError::Cancelled) => RequestState::Cancelled,
            Err(e) => RequestState::Failed(e.clone()),
        };
        tx.send(result).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn request(timeout: Duration) -> (AnalysisRequest, oneshot::Receiver<Reply>) {
        let config = EngineConfig::default();
        AnalysisRequest::new(
            Position::startpos(),
            Depth::resolve(None, &config).unwrap(),
            timeout,
        )
    }

    #[test]
    fn depth_defaults_and_clamps() {
        let config = EngineConfig::default();
        assert_eq!(Depth::resolve(None, &config).unwrap().get(), 15);
        assert_eq!(Depth::resolve(Some(1), &config).unwrap().get(), 1);
        assert_eq!(Depth::resolve(Some(22), &config).unwrap().get(), 22);
        assert_eq!(Depth::resolve(Some(31), &config).unwrap().get(), 30);
        assert_eq!(Depth::resolve(Some(i64::MAX), &config).unwrap().get(), 30);
    }

    #[test]
    fn depth_below_minimum_is_rejected() {
        let config = EngineConfig::default();
        for d in [0, -1, i64::MIN] {
            assert!(matches!(
                Depth::resolve(Some(d), &config),
                Err(AnalysisError::InvalidInput(_))
            ));
        }
    }

    #[test]
    fn ids_increase() {
        let a = RequestId::next();
        let b = RequestId::next();
        assert!(b > a);
    }

    #[tokio::test]
    async fn finish_answers_exactly_once() {
        let (mut req, rx) = request(Duration::from_secs(1));
        assert_eq!(req.state(), &RequestState::Queued);

        assert!(req.finish(Err(AnalysisError::Timeout)));
        assert_eq!(req.state(), &RequestState::TimedOut);
        assert!(!req.finish(Err(AnalysisError::Cancelled)));
        assert_eq!(req.state(), &RequestState::TimedOut);

        assert_eq!(rx.await.unwrap(), Err(AnalysisError::Timeout));
    }

    #[tokio::test]
    async fn failure_state_keeps_reason() {
        let (mut req, _rx) = request(Duration::from_secs(1));
        req.finish(Err(AnalysisError::NoLegalMove));
        assert_eq!(
            req.state(),
            &RequestState::Failed(AnalysisError::NoLegalMove)
        );
        assert!(req.state().is_terminal());
    }

    #[tokio::test]
    async fn dropped_receiver_means_caller_gone() {
        let (mut req, rx) = request(Duration::from_secs(1));
        assert!(!req.caller_gone());
        drop(rx);
        assert!(req.caller_gone());
        req.caller_closed().await;
        assert!(!req.finish(Err(AnalysisError::Cancelled)));
    }

    proptest! {
        #[test]
        fn resolved_depth_stays_in_range(requested in any::<i64>()) {
            let config = EngineConfig::default();
            match Depth::resolve(Some(requested), &config) {
                Ok(depth) => {
                    prop_assert!(requested >= i64::from(config.min_depth));
                    prop_assert!((config.min_depth..=config.max_depth).contains(&depth.get()));
                }
                Err(e) => {
                    prop_assert!(requested < i64::from(config.min_depth));
                    prop_assert_eq!(e.kind(), "invalid_input");
                }
            }
        }
    }

    #[tokio::test]
    async fn expiry_uses_deadline() {
        let (req, _rx) = request(Duration::from_millis(50));
        assert!(!req.is_expired(req.submitted_at()));
        assert!(req.is_expired(req.submitted_at() + Duration::from_millis(50)));
    }
}
