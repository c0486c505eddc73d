//! Best-move endpoint.

use axum::{extract::rejection::JsonRejection, extract::State, Json};
use engine_orchestrator::{Analysis, Score};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ApiError;
use crate::AppState;

/// Body of a best-move request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BestMoveRequest {
    /// Position in FEN notation.
    #[serde(alias = "fen")]
    pub position: String,
    /// Search depth (default and limits come from the engine config).
    #[serde(default)]
    pub depth: Option<i64>,
    /// Overall time budget in milliseconds.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// Best-move response.
#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BestMoveResponse {
    /// Best move in UCI notation.
    pub best_move: String,
    /// Deepest completed search depth the engine reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depth: Option<u32>,
    /// Score in centipawns from the side to move's point of view.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score_cp: Option<i32>,
    /// Mate in N (negative when being mated).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score_mate: Option<i32>,
}

impl From<Analysis> for BestMoveResponse {
    fn from(analysis: Analysis) -> Self {
        let (score_cp, score_mate) = match analysis.score {
            Some(Score::Cp(cp)) => (Some(cp), None),
            Some(Score::Mate(n)) => (None, Some(n)),
            None => (None, None),
        };
        Self {
            best_move: analysis.best_move.to_string(),
            depth: analysis.depth,
            score_cp,
            score_mate,
        }
    }
}

/// POST /bestmove
///
/// Asks the engine pool for the best move in a position.
///
/// # Errors
/// * 400 Bad Request - invalid position, depth, timeout or body
/// * 422 Unprocessable Entity - the side to move has no legal move
/// * 502 Bad Gateway - the engine crashed or answered nonsense
/// * 503 Service Unavailable - queues full (with `Retry-After`) or engine degraded
/// * 504 Gateway Timeout - no answer within the time budget
pub async fn best_move(
    State(state): State<AppState>,
    payload: Result<Json<BestMoveRequest>, JsonRejection>,
) -> Result<Json<BestMoveResponse>, ApiError> {
    let Json(request) = payload?;
    let timeout = request.timeout_ms.map(Duration::from_millis);

    // If the client disconnects this future is dropped, which cancels the
    // request along with it.
    let analysis = state
        .service
        .analyze(&request.position, request.depth, timeout)
        .await?;

    Ok(Json(analysis.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_accepts_fen_alias() {
        let json = r#"{"fen": "8/8/8/4k3/8/8/8/4K3 w - - 0 1", "depth": 12, "timeoutMs": 500}"#;
        let request: BestMoveRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.position, "8/8/8/4k3/8/8/8/4K3 w - - 0 1");
        assert_eq!(request.depth, Some(12));
        assert_eq!(request.timeout_ms, Some(500));
    }

    #[test]
    fn test_request_optional_fields() {
        let request: BestMoveRequest = serde_json::from_str(r#"{"position": "x"}"#).unwrap();
        assert_eq!(request.depth, None);
        assert_eq!(request.timeout_ms, None);
    }

    #[test]
    fn test_response_serialize() {
        let response = BestMoveResponse {
            best_move: "e2e4".to_string(),
            depth: Some(15),
            score_cp: Some(31),
            score_mate: None,
        };
        let json = serde_json::to_string(&response).unwrap();
        assert_eq!(json, r#"{"bestMove":"e2e4","depth":15,"scoreCp":31}"#);
    }
}
