//! End-to-end behaviour of the engine pool against the scripted fake engine.

use chess_core::{Position, UciMove};
use engine_orchestrator::testing::FakeEngine;
use engine_orchestrator::{
    AnalysisError, AnalysisService, EngineConfig, RestartPolicy, SlotState,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

const WAIT: Duration = Duration::from_secs(2);

fn config() -> EngineConfig {
    EngineConfig {
        pool_size: 1,
        queue_capacity: 8,
        handshake_timeout_ms: 500,
        stop_grace_ms: 200,
        restart: RestartPolicy {
            max_retries: 3,
            initial_backoff_ms: 10,
            max_backoff_ms: 40,
            recovery_interval_ms: 60_000,
        },
        ..Default::default()
    }
}

fn start(engine: &FakeEngine, config: EngineConfig) -> AnalysisService {
    AnalysisService::start(config, Arc::new(engine.clone())).unwrap()
}

/// Position with the white king on `file` of the first rank.
fn king_on(file: u8) -> String {
    let left = if file > 0 { file.to_string() } else { String::new() };
    let right = if file < 7 { (7 - file).to_string() } else { String::new() };
    format!("4k3/8/8/8/8/8/8/{}K{} w - - 0 1", left, right)
}

/// Moves the white king one square forward, so each position has its own
/// answer.
fn king_step(fen: &str) -> String {
    let first_rank = fen
        .split_whitespace()
        .next()
        .and_then(|placement| placement.rsplit('/').next())
        .unwrap_or("");
    let mut file = 0u8;
    for c in first_rank.chars() {
        match c {
            'K' => break,
            d if d.is_ascii_digit() => file += d as u8 - b'0',
            _ => file += 1,
        }
    }
    let f = (b'a' + file) as char;
    format!("{}1{}2", f, f)
}

async fn engine_searching(engine: &FakeEngine, searches: usize) {
    assert!(
        engine
            .wait_for_command(WAIT, |_| engine.commands().iter().filter(|c| c.starts_with("go")).count() >= searches)
            .await,
        "engine never started search {}",
        searches
    );
}

#[tokio::test]
async fn every_request_reaches_one_terminal_outcome() {
    let engine = FakeEngine::new().think_time(Duration::from_millis(30));
    let mut config = config();
    config.pool_size = 2;
    config.queue_capacity = 20;
    let service = start(&engine, config);

    let mut handles = Vec::new();
    for i in 0..12u64 {
        let service = service.clone();
        let timeout = Duration::from_millis(20 + 25 * i);
        handles.push(tokio::spawn(async move {
            let started = Instant::now();
            let result = service.analyze(Position::STARTPOS, Some(8), Some(timeout)).await;
            (result, started.elapsed(), timeout)
        }));
    }

    for handle in handles {
        let (result, elapsed, timeout) = handle.await.unwrap();
        match result {
            Ok(analysis) => assert_eq!(analysis.best_move.to_string(), "e2e4"),
            Err(AnalysisError::Timeout) => {}
            Err(other) => panic!("unexpected failure: {other}"),
        }
        assert!(elapsed <= timeout + Duration::from_millis(250), "{elapsed:?} > {timeout:?}");
    }

    service.supervisor().shutdown().await;
}

#[tokio::test]
async fn one_session_answers_in_submission_order() {
    let engine = FakeEngine::new()
        .think_time(Duration::from_millis(15))
        .respond_with(king_step);
    let service = start(&engine, config());

    let files = [0u8, 5, 2, 7, 1, 6];
    let tickets: Vec<_> = files
        .iter()
        .map(|&f| service.submit(&king_on(f), Some(5), None).unwrap())
        .collect();
    let ids: Vec<_> = tickets.iter().map(|t| t.id()).collect();

    let completed = Arc::new(Mutex::new(Vec::new()));
    let mut handles = Vec::new();
    for (ticket, &file) in tickets.into_iter().zip(files.iter()) {
        let completed = completed.clone();
        handles.push(tokio::spawn(async move {
            let analysis = ticket.wait().await.unwrap();
            completed.lock().unwrap().push(analysis.request_id);
            (analysis, file)
        }));
    }
    for handle in handles {
        let (analysis, file) = handle.await.unwrap();
        assert_eq!(analysis.best_move.to_string(), king_step(&king_on(file)));
    }

    assert_eq!(*completed.lock().unwrap(), ids);
    let sent: Vec<String> = engine
        .commands()
        .into_iter()
        .filter_map(|c| c.strip_prefix("position fen ").map(str::to_string))
        .collect();
    let expected: Vec<String> = files.iter().map(|&f| king_on(f)).collect();
    assert_eq!(sent, expected);

    service.supervisor().shutdown().await;
}

#[tokio::test]
async fn cancelled_queued_request_never_reaches_engine() {
    let engine = FakeEngine::new().think_time(Duration::from_millis(150));
    let service = start(&engine, config());

    let first = service.submit(&king_on(0), None, None).unwrap();
    engine_searching(&engine, 1).await;

    let second = service.submit(&king_on(3), None, None).unwrap();
    assert_eq!(service.queued(), 1);
    second.cancel();
    assert_eq!(service.queued(), 0);

    first.wait().await.unwrap();
    let after = service.analyze(&king_on(6), None, None).await.unwrap();
    assert_eq!(after.best_move.to_string(), "e2e4");

    let commands = engine.commands();
    assert!(!commands.iter().any(|c| c.contains(&king_on(3))));
    assert!(commands.iter().any(|c| c.contains(&king_on(6))));

    service.supervisor().shutdown().await;
}

#[tokio::test]
async fn dropping_active_ticket_stops_search() {
    let engine = FakeEngine::new().think_time(Duration::from_secs(5));
    let service = start(&engine, config());

    let ticket = service.submit(Position::STARTPOS, None, None).unwrap();
    engine_searching(&engine, 1).await;
    drop(ticket);

    assert!(engine.wait_for_command(WAIT, |c| c == "stop").await);
    assert_eq!(engine.spawns(), 1);
    service.supervisor().shutdown().await;
}

#[tokio::test]
async fn crash_fails_active_and_queued_then_recovers() {
    let engine = FakeEngine::new().crash_on_go(1);
    let service = start(&engine, config());

    let active = service.submit(Position::STARTPOS, None, None).unwrap();
    let queued = service.submit(&king_on(2), None, None).unwrap();

    let started = Instant::now();
    assert!(matches!(active.wait().await, Err(AnalysisError::EngineCrash(_))));
    assert!(matches!(queued.wait().await, Err(AnalysisError::EngineCrash(_))));
    assert!(started.elapsed() < WAIT);

    let analysis = service.analyze(Position::STARTPOS, None, None).await.unwrap();
    assert_eq!(analysis.best_move.to_string(), "e2e4");
    assert_eq!(engine.spawns(), 2);

    let status = &service.supervisor().status()[0];
    assert_eq!(status.restarts, 1);
    assert_eq!(status.failures, 0);

    service.supervisor().shutdown().await;
}

#[tokio::test]
async fn deadline_times_out_and_stops_engine() {
    let engine = FakeEngine::new().think_time(Duration::from_secs(3));
    let service = start(&engine, config());

    let started = Instant::now();
    let result = service
        .analyze(Position::STARTPOS, None, Some(Duration::from_millis(100)))
        .await;
    assert_eq!(result, Err(AnalysisError::Timeout));
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(engine.wait_for_command(WAIT, |c| c == "stop").await);

    // The stopped search's late bestmove is discarded, not given to the next caller.
    let next = service
        .analyze(&king_on(4), None, Some(Duration::from_millis(100)))
        .await;
    assert_eq!(next, Err(AnalysisError::Timeout));
    assert_eq!(engine.spawns(), 1);

    service.supervisor().shutdown().await;
}

#[tokio::test]
async fn engine_ignoring_stop_is_restarted() {
    let engine = FakeEngine::new()
        .think_time(Duration::from_millis(500))
        .ignoring_stop();
    let mut config = config();
    config.stop_grace_ms = 50;
    let service = start(&engine, config);

    let result = service
        .analyze(Position::STARTPOS, None, Some(Duration::from_millis(50)))
        .await;
    assert_eq!(result, Err(AnalysisError::Timeout));

    let analysis = service
        .analyze(Position::STARTPOS, None, Some(Duration::from_secs(5)))
        .await
        .unwrap();
    assert_eq!(analysis.best_move.to_string(), "e2e4");
    assert_eq!(engine.spawns(), 2);

    service.supervisor().shutdown().await;
}

#[tokio::test]
async fn queued_request_expires_without_engine() {
    let engine = FakeEngine::new().think_time(Duration::from_millis(300));
    let service = start(&engine, config());

    let first = service.submit(Position::STARTPOS, None, None).unwrap();
    engine_searching(&engine, 1).await;

    let result = service
        .analyze(&king_on(1), None, Some(Duration::from_millis(50)))
        .await;
    assert_eq!(result, Err(AnalysisError::Timeout));
    assert_eq!(service.queued(), 0);

    first.wait().await.unwrap();
    assert!(!engine.commands().iter().any(|c| c.contains(&king_on(1))));

    service.supervisor().shutdown().await;
}

#[tokio::test]
async fn startpos_yields_move_in_uci_notation() {
    let engine = FakeEngine::new().best_move("e7e8q").chatty();
    let service = start(&engine, config());

    let analysis = service
        .analyze(Position::STARTPOS, Some(10), None)
        .await
        .unwrap();
    let text = analysis.best_move.to_string();
    assert_eq!(text.parse::<UciMove>().unwrap(), analysis.best_move);
    assert_eq!(analysis.depth, Some(10));
    assert!(engine.commands().contains(&"go depth 10".to_string()));

    service.supervisor().shutdown().await;
}

#[tokio::test]
async fn invalid_position_leaves_queue_untouched() {
    let engine = FakeEngine::new().think_time(Duration::from_millis(200));
    let service = start(&engine, config());

    let first = service.submit(Position::STARTPOS, None, None).unwrap();
    engine_searching(&engine, 1).await;
    let queued = service.submit(&king_on(5), None, None).unwrap();
    assert_eq!(service.queued(), 1);

    let err = service.analyze("not-a-fen", None, None).await;
    assert!(matches!(err, Err(AnalysisError::InvalidInput(_))));
    assert_eq!(service.queued(), 1);

    first.wait().await.unwrap();
    queued.wait().await.unwrap();
    service.supervisor().shutdown().await;
}

#[tokio::test]
async fn excess_requests_are_rejected_with_backpressure() {
    let engine = FakeEngine::new().think_time(Duration::from_millis(100));
    let mut config = config();
    config.queue_capacity = 2;
    let service = start(&engine, config);

    let active = service.submit(Position::STARTPOS, None, None).unwrap();
    engine_searching(&engine, 1).await;
    let second = service.submit(&king_on(1), None, None).unwrap();
    let third = service.submit(&king_on(2), None, None).unwrap();

    let rejected = service.submit(&king_on(3), None, None).err();
    assert_eq!(rejected, Some(AnalysisError::Backpressure { capacity: 2 }));
    assert_eq!(service.queued(), 2);

    for ticket in [active, second, third] {
        ticket.wait().await.unwrap();
    }
    service.supervisor().shutdown().await;
}

#[tokio::test]
async fn requests_spread_over_the_pool() {
    let engine = FakeEngine::new().think_time(Duration::from_millis(100));
    let mut config = config();
    config.pool_size = 3;
    let service = start(&engine, config);
    for slot in 0..3 {
        wait_for_ready(&service, slot).await;
    }

    let tickets: Vec<_> = (0..3)
        .map(|f| service.submit(&king_on(f), None, None).unwrap())
        .collect();
    let mut sessions = Vec::new();
    for ticket in tickets {
        sessions.push(ticket.wait().await.unwrap().session);
    }
    sessions.sort_unstable();
    assert_eq!(sessions, vec![0, 1, 2]);

    service.supervisor().shutdown().await;
}

#[tokio::test]
async fn restarting_slot_is_passed_over_for_a_ready_one() {
    let engine = FakeEngine::new().crash_on_go(1);
    let mut config = config();
    config.pool_size = 2;
    config.restart.initial_backoff_ms = 3_000;
    config.restart.max_backoff_ms = 3_000;
    let service = start(&engine, config);
    wait_for_ready(&service, 0).await;
    wait_for_ready(&service, 1).await;

    let crashed = service.analyze(Position::STARTPOS, None, None).await;
    assert!(matches!(crashed, Err(AnalysisError::EngineCrash(_))));
    wait_for_state(&service, 0, SlotState::Restarting).await;

    // Slot 0 has nothing queued but no engine for another three seconds.
    let analysis = service
        .analyze(Position::STARTPOS, None, Some(Duration::from_millis(500)))
        .await
        .unwrap();
    assert_eq!(analysis.session, 1);

    service.supervisor().shutdown().await;
}

#[tokio::test]
async fn engine_without_legal_move() {
    let engine = FakeEngine::new().best_move("(none)");
    let service = start(&engine, config());

    let result = service
        .analyze("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1", None, None)
        .await;
    assert_eq!(result, Err(AnalysisError::NoLegalMove));

    service.supervisor().shutdown().await;
}

#[tokio::test]
async fn garbage_move_fails_only_its_request() {
    let engine = FakeEngine::new().respond_with(|fen| {
        if fen.starts_with("4k3") {
            "k9k9".to_string()
        } else {
            "d2d4".to_string()
        }
    });
    let service = start(&engine, config());

    let bad = service.analyze(&king_on(0), None, None).await;
    assert!(matches!(bad, Err(AnalysisError::ProtocolViolation(_))));

    let good = service.analyze(Position::STARTPOS, None, None).await.unwrap();
    assert_eq!(good.best_move.to_string(), "d2d4");
    assert_eq!(engine.spawns(), 1);

    service.supervisor().shutdown().await;
}

#[tokio::test]
async fn degraded_pool_fails_fast_until_recovered() {
    let engine = FakeEngine::new().failing_spawn();
    let mut config = config();
    config.restart.max_retries = 1;
    let service = start(&engine, config);

    wait_for_state(&service, 0, SlotState::Degraded).await;
    let started = Instant::now();
    let result = service.analyze(Position::STARTPOS, None, None).await;
    assert_eq!(result, Err(AnalysisError::EngineUnavailable));
    assert!(started.elapsed() < Duration::from_millis(100));

    engine.set_failing_spawn(false);
    assert_eq!(service.supervisor().recover(), 1);
    let analysis = service.analyze(Position::STARTPOS, None, None).await.unwrap();
    assert_eq!(analysis.best_move.to_string(), "e2e4");

    service.supervisor().shutdown().await;
}

#[tokio::test]
async fn shutdown_fails_waiting_requests() {
    let engine = FakeEngine::new().think_time(Duration::from_secs(5));
    let service = start(&engine, config());

    let active = service.submit(Position::STARTPOS, None, None).unwrap();
    engine_searching(&engine, 1).await;
    let queued = service.submit(&king_on(1), None, None).unwrap();

    service.supervisor().shutdown().await;
    assert_eq!(active.wait().await, Err(AnalysisError::EngineUnavailable));
    assert_eq!(queued.wait().await, Err(AnalysisError::EngineUnavailable));
    assert!(engine.commands().contains(&"quit".to_string()));
}

async fn wait_for_state(service: &AnalysisService, slot: usize, state: SlotState) {
    let deadline = Instant::now() + WAIT;
    while service.supervisor().status()[slot].state != state {
        assert!(Instant::now() < deadline, "slot {slot} never reached {state:?}");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

async fn wait_for_ready(service: &AnalysisService, slot: usize) {
    wait_for_state(service, slot, SlotState::Ready).await;
}

#[tokio::test]
#[ignore = "requires Stockfish"]
async fn stockfish_startpos_depth_10() {
    use engine_orchestrator::ProcessSpawner;

    let mut config = EngineConfig::default();
    if let Ok(path) = std::env::var("STOCKFISH_PATH") {
        config.path = path.into();
    }
    let spawner = Arc::new(ProcessSpawner::from_config(&config));
    let service = AnalysisService::start(config, spawner).unwrap();

    let analysis = service
        .analyze(Position::STARTPOS, Some(10), None)
        .await
        .unwrap();
    let text = analysis.best_move.to_string();
    assert!(text.len() == 4 || text.len() == 5, "{text}");
    assert!(text.parse::<UciMove>().is_ok());
    assert!(analysis.score.is_some());

    service.supervisor().shutdown().await;
}
