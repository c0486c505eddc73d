//! HTTP behaviour of the server against the in-process fake engine.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use bestmove_server::{app, AppState};
use engine_orchestrator::testing::FakeEngine;
use engine_orchestrator::{AnalysisService, EngineConfig, RestartPolicy};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

const STARTPOS: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

fn engine_config() -> EngineConfig {
    EngineConfig {
        queue_capacity: 4,
        handshake_timeout_ms: 500,
        stop_grace_ms: 200,
        restart: RestartPolicy {
            max_retries: 1,
            initial_backoff_ms: 10,
            max_backoff_ms: 20,
            recovery_interval_ms: 60_000,
        },
        ..Default::default()
    }
}

fn setup(engine: &FakeEngine, config: EngineConfig) -> (Router, AnalysisService) {
    let service = AnalysisService::start(config, Arc::new(engine.clone())).unwrap();
    let router = app(AppState {
        service: service.clone(),
    });
    (router, service)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_bestmove_returns_move() {
    let engine = FakeEngine::new().best_move("d2d4");
    let (router, service) = setup(&engine, engine_config());

    let response = router
        .oneshot(post_json("/bestmove", json!({ "position": STARTPOS, "depth": 8 })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["bestMove"], "d2d4");
    assert_eq!(body["depth"], 8);
    assert_eq!(body["scoreCp"], 17);
    assert!(body.get("scoreMate").is_none());

    service.supervisor().shutdown().await;
}

#[tokio::test]
async fn test_api_alias_accepts_fen_field() {
    let engine = FakeEngine::new();
    let (router, service) = setup(&engine, engine_config());

    let response = router
        .oneshot(post_json("/api/bestmove", json!({ "fen": STARTPOS })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["bestMove"], "e2e4");
    // Default depth from the config.
    assert!(engine.commands().contains(&"go depth 15".to_string()));

    service.supervisor().shutdown().await;
}

#[tokio::test]
async fn test_invalid_position_is_bad_request() {
    let engine = FakeEngine::new();
    let (router, service) = setup(&engine, engine_config());

    let response = router
        .oneshot(post_json("/bestmove", json!({ "position": "not-a-fen" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "invalid_input");
    assert!(!body["message"].as_str().unwrap().is_empty());
    assert_eq!(service.queued(), 0);

    service.supervisor().shutdown().await;
}

#[tokio::test]
async fn test_malformed_body_is_bad_request() {
    let engine = FakeEngine::new();
    let (router, service) = setup(&engine, engine_config());

    let request = Request::builder()
        .method("POST")
        .uri("/bestmove")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"depth\": 3"))
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "invalid_input");

    let response = router
        .oneshot(post_json("/bestmove", json!({ "depth": 3 })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    service.supervisor().shutdown().await;
}

#[tokio::test]
async fn test_timeout_is_gateway_timeout() {
    let engine = FakeEngine::new().think_time(Duration::from_secs(3));
    let (router, service) = setup(&engine, engine_config());

    let response = router
        .oneshot(post_json(
            "/bestmove",
            json!({ "position": STARTPOS, "timeoutMs": 100 }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(body_json(response).await["error"], "timeout");

    service.supervisor().shutdown().await;
}

#[tokio::test]
async fn test_no_legal_move_is_unprocessable() {
    let engine = FakeEngine::new().best_move("(none)");
    let (router, service) = setup(&engine, engine_config());

    let response = router
        .oneshot(post_json(
            "/bestmove",
            json!({ "position": "7k/5Q2/6K1/8/8/8/8/8 b - - 0 1" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body_json(response).await["error"], "no_legal_move");

    service.supervisor().shutdown().await;
}

#[tokio::test]
async fn test_full_queue_sets_retry_after() {
    let engine = FakeEngine::new().think_time(Duration::from_millis(300));
    let mut config = engine_config();
    config.queue_capacity = 1;
    let (router, service) = setup(&engine, config);

    let active = service.submit(STARTPOS, None, None).unwrap();
    assert!(
        engine
            .wait_for_command(Duration::from_secs(2), |c| c.starts_with("go"))
            .await
    );
    let queued = service.submit(STARTPOS, None, None).unwrap();

    let response = router
        .oneshot(post_json("/bestmove", json!({ "position": STARTPOS })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.headers()[header::RETRY_AFTER], "1");
    assert_eq!(body_json(response).await["error"], "backpressure");

    active.wait().await.unwrap();
    queued.wait().await.unwrap();
    service.supervisor().shutdown().await;
}

#[tokio::test]
async fn test_health_reports_degraded_and_recovers() {
    let engine = FakeEngine::new().failing_spawn();
    let (router, service) = setup(&engine, engine_config());

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !service.supervisor().is_degraded() {
        assert!(tokio::time::Instant::now() < deadline, "pool never degraded");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let response = router
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let response = router
        .clone()
        .oneshot(post_json("/bestmove", json!({ "position": STARTPOS })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(response).await["error"], "engine_unavailable");

    engine.set_failing_spawn(false);
    let response = router
        .clone()
        .oneshot(post_json("/api/engine/recover", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["recovering"], 1);

    let response = router
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    service.supervisor().shutdown().await;
}

#[tokio::test]
async fn test_status_lists_slots() {
    let engine = FakeEngine::new().named("Fakefish");
    let mut config = engine_config();
    config.pool_size = 2;
    let (router, service) = setup(&engine, config);
    service.analyze(STARTPOS, Some(3), None).await.unwrap();

    let response = router
        .oneshot(Request::builder().uri("/api/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["degraded"], false);
    assert_eq!(body["queued"], 0);
    let slots = body["slots"].as_array().unwrap();
    assert_eq!(slots.len(), 2);
    assert_eq!(slots[0]["id"], 0);
    assert!(slots
        .iter()
        .any(|s| s["state"] == "ready" && s["engine"] == "Fakefish"));

    service.supervisor().shutdown().await;
}
