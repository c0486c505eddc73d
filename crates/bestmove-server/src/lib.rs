//! Best-move server library.
//!
//! Builds the axum router in front of an [`AnalysisService`]. The binary in
//! `main.rs` adds configuration, logging and the listener.

pub mod api;
pub mod config;
pub mod error;
pub mod middleware;

use axum::routing::{get, post};
use axum::Router;
use engine_orchestrator::AnalysisService;
use tower_http::cors::{Any, CorsLayer};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Engine pool answering best-move requests.
    pub service: AnalysisService,
}

/// The complete HTTP application.
pub fn app(state: AppState) -> Router {
    // CORS layer for cross-origin requests
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(api::status::health))
        .route("/bestmove", post(api::bestmove::best_move))
        .route("/api/bestmove", post(api::bestmove::best_move))
        .route("/api/status", get(api::status::status))
        .route("/api/engine/recover", post(api::status::recover))
        .with_state(state)
        .layer(axum::middleware::from_fn(middleware::timing_layer))
        .layer(cors)
}
