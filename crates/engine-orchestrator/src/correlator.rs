//! Matching engine output to dispatched requests.
//!
//! The protocol carries no request ids, so correlation is positional: each
//! `bestmove` answers the oldest request still pending on the session.

use crate::error::AnalysisError;
use crate::request::RequestId;
use chess_core::UciMove;
use std::collections::VecDeque;
use uci::{EngineMessage, Score, UciError};

/// Latest search progress seen for the active request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct SearchSummary {
    pub depth: Option<u32>,
    pub score: Option<Score>,
}

#[derive(Debug)]
struct Pending {
    id: RequestId,
    /// The caller was already answered (timeout or cancel); the engine's
    /// eventual move is thrown away.
    abandoned: bool,
}

/// What one line of engine output meant.
#[derive(Debug, PartialEq)]
pub(crate) enum Correlation {
    /// Terminal output for a live request.
    Resolved {
        id: RequestId,
        outcome: Result<(UciMove, SearchSummary), AnalysisError>,
    },
    /// Terminal output for an abandoned request.
    Discarded { id: RequestId },
    /// Search info for the pending request.
    Progress,
    /// Nothing to act on.
    Ignored,
    /// A `bestmove` with nothing pending.
    Unsolicited,
}

#[derive(Debug, Default)]
pub(crate) struct ResponseCorrelator {
    pending: VecDeque<Pending>,
    summary: SearchSummary,
}

impl ResponseCorrelator {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Records that `id` was just sent to the engine.
    pub(crate) fn dispatch(&mut self, id: RequestId) {
        if self.pending.is_empty() {
            self.summary = SearchSummary::default();
        }
        self.pending.push_back(Pending {
            id,
            abandoned: false,
        });
    }

    /// Marks `id` as answered elsewhere. Returns false if it is not pending.
    pub(crate) fn abandon(&mut self, id: RequestId) -> bool {
        match self.pending.iter_mut().find(|p| p.id == id) {
            Some(p) => {
                p.abandoned = true;
                true
            }
            None => false,
        }
    }

    #[cfg(test)]
    pub(crate) fn pending(&self) -> usize {
        self.pending.len()
    }

    pub(crate) fn observe(&mut self, line: &str) -> Correlation {
        match EngineMessage::parse(line) {
            Ok(EngineMessage::BestMove { mv, .. }) => self.resolve(|| {
                if UciMove::is_null(&mv) {
                    return Err(AnalysisError::NoLegalMove);
                }
                mv.parse::<UciMove>()
                    .map_err(|e| AnalysisError::ProtocolViolation(e.to_string()))
            }),
            Ok(EngineMessage::Info(info)) => {
                if self.pending.is_empty() {
                    return Correlation::Ignored;
                }
                // Only exact scores of the main line count towards the summary.
                if info.multipv.unwrap_or(1) == 1 && !info.bound && info.score.is_some() {
                    self.summary = SearchSummary {
                        depth: info.depth.or(self.summary.depth),
                        score: info.score,
                    };
                }
                Correlation::Progress
            }
            Ok(_) => Correlation::Ignored,
            Err(UciError::ParseError(e)) if line.trim_start().starts_with("bestmove") => {
                let reason = format!("{}: '{}'", e, line.trim());
                self.resolve(|| Err(AnalysisError::ProtocolViolation(reason)))
            }
            Err(UciError::Unrecognized(_)) => {
                tracing::debug!(line = %line, "Ignoring engine output");
                Correlation::Ignored
            }
            Err(e) => {
                tracing::warn!(error = %e, "Malformed engine output");
                Correlation::Ignored
            }
        }
    }

    fn resolve(
        &mut self,
        outcome: impl FnOnce() -> Result<UciMove, AnalysisError>,
    ) -> Correlation {
        let Some(entry) = self.pending.pop_front() else {
            return Correlation::Unsolicited;
        };
        let summary = std::mem::take(&mut self.summary);
        if entry.abandoned {
            return Correlation::Discarded { id: entry.id };
        }
        Correlation::Resolved {
            id: entry.id,
            outcome: outcome().map(|mv| (mv, summary)),
        }
    }
}
