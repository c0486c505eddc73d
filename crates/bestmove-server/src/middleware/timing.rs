//! Request timing middleware.
//!
//! Engine searches make most best-move requests take hundreds of
//! milliseconds, so only requests past [`SLOW_REQUEST`] or ending in a
//! server error are logged above debug level.

use axum::{body::Body, http::Request, middleware::Next, response::Response};
use std::time::{Duration, Instant};

/// Requests taking longer than this are logged as warnings.
pub const SLOW_REQUEST: Duration = Duration::from_secs(5);

/// Middleware that logs method, path, status and duration of each request.
///
/// # Example
///
/// ```ignore
/// use axum::{Router, middleware};
/// use bestmove_server::middleware::timing_layer;
///
/// let app = Router::new()
///     .route("/bestmove", post(handler))
///     .layer(middleware::from_fn(timing_layer));
/// ```
pub async fn timing_layer(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(request).await;

    let duration = start.elapsed();
    let status = response.status();
    if duration > SLOW_REQUEST || status.is_server_error() {
        tracing::warn!(
            method = %method,
            path = %path,
            status = status.as_u16(),
            duration_ms = duration.as_millis() as u64,
            "Request finished"
        );
    } else {
        tracing::debug!(
            method = %method,
            path = %path,
            status = status.as_u16(),
            duration_ms = duration.as_millis() as u64,
            "Request completed"
        );
    }

    response
}
