//! Ownership of the engine pool: starting, restarting, and degrading sessions.

use crate::config::{EngineConfig, InvalidConfig};
use crate::dispatcher::{shutdown_requested, Dispatcher, DispatcherExit};
use crate::error::AnalysisError;
use crate::queue::{Refused, RequestQueue};
use crate::request::{AnalysisRequest, RequestId};
use crate::session::EngineSession;
use crate::spawner::EngineSpawner;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;

/// Lifecycle of one pool slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotState {
    /// Spawning the engine and running the handshake.
    Starting,
    Ready,
    /// A request is being analysed.
    Busy,
    /// Waiting out the backoff after a failure.
    Restarting,
    /// Too many consecutive failures; not accepting requests.
    Degraded,
    Stopped,
}

/// Point-in-time view of a slot, for health and status reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotStatus {
    pub id: usize,
    pub state: SlotState,
    pub queued: usize,
    /// Request currently being analysed.
    pub active: Option<u64>,
    /// Consecutive failures since the last successful request.
    pub failures: u32,
    /// Total restarts since startup.
    pub restarts: u32,
    pub engine: Option<String>,
}

struct SlotInner {
    state: SlotState,
    active: Option<RequestId>,
    engine: Option<String>,
    failures: u32,
    restarts: u32,
}

/// One session's queue and bookkeeping, shared between the supervisor, its
/// dispatcher task, and request tickets.
pub(crate) struct Slot {
    id: usize,
    queue: RequestQueue,
    inner: Mutex<SlotInner>,
    recover: Notify,
}

impl Slot {
    fn new(id: usize, capacity: usize) -> Self {
        Self {
            id,
            queue: RequestQueue::new(capacity),
            inner: Mutex::new(SlotInner {
                state: SlotState::Starting,
                active: None,
                engine: None,
                failures: 0,
                restarts: 0,
            }),
            recover: Notify::new(),
        }
    }

    fn inner(&self) -> MutexGuard<'_, SlotInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn id(&self) -> usize {
        self.id
    }

    pub(crate) fn queue(&self) -> &RequestQueue {
        &self.queue
    }

    pub(crate) fn state(&self) -> SlotState {
        self.inner().state
    }

    fn set_state(&self, state: SlotState) {
        self.inner().state = state;
    }

    fn set_engine(&self, name: Option<&str>) {
        self.inner().engine = name.map(str::to_string);
    }

    pub(crate) fn set_active(&self, active: Option<RequestId>) {
        let mut inner = self.inner();
        inner.active = active;
        inner.state = match (inner.state, active) {
            (SlotState::Ready, Some(_)) => SlotState::Busy,
            (SlotState::Busy, None) => SlotState::Ready,
            (state, _) => state,
        };
    }

    pub(crate) fn record_success(&self) {
        self.inner().failures = 0;
    }

    /// Counts a failure and the restart it triggers; returns the number of
    /// consecutive failures.
    fn record_failure(&self) -> u32 {
        let mut inner = self.inner();
        inner.failures += 1;
        inner.restarts += 1;
        inner.failures
    }

    fn reset_failures(&self) {
        self.inner().failures = 0;
    }

    /// Queued requests plus the one in flight.
    fn load(&self) -> usize {
        let active = usize::from(self.inner().active.is_some());
        self.queue.len() + active
    }

    fn accepts_work(&self) -> bool {
        !matches!(self.state(), SlotState::Degraded | SlotState::Stopped)
    }

    /// Ready and busy slots come before ones still waiting on an engine.
    fn rank(&self) -> u8 {
        match self.state() {
            SlotState::Ready | SlotState::Busy => 0,
            _ => 1,
        }
    }

    /// Fails every queued request with `err`; returns how many there were.
    fn fail_queued(&self, err: AnalysisError) -> usize {
        let drained = self.queue.drain();
        let count = drained.len();
        for mut request in drained {
            request.finish(Err(err.clone()));
        }
        count
    }

    /// Moves to `state`, closes the queue, and fails whatever was waiting.
    fn close(&self, state: SlotState, err: AnalysisError) -> usize {
        self.set_state(state);
        let drained = self.queue.close();
        let count = drained.len();
        for mut request in drained {
            request.finish(Err(err.clone()));
        }
        count
    }

    fn status(&self) -> SlotStatus {
        let queued = self.queue.len();
        let inner = self.inner();
        SlotStatus {
            id: self.id,
            state: inner.state,
            queued,
            active: inner.active.map(RequestId::get),
            failures: inner.failures,
            restarts: inner.restarts,
            engine: inner.engine.clone(),
        }
    }
}

/// Owns every engine session.
///
/// Each slot runs its own task: start the engine, serve the queue, and on
/// failure restart with exponential backoff until the retry budget is spent.
pub struct EngineSupervisor {
    slots: Vec<Arc<Slot>>,
    config: Arc<EngineConfig>,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl EngineSupervisor {
    /// Validates `config` and starts `pool_size` slots.
    ///
    /// Must be called from within a tokio runtime. Engines start in the
    /// background; requests submitted meanwhile wait in the queues.
    pub fn start(
        config: EngineConfig,
        spawner: Arc<dyn EngineSpawner>,
    ) -> Result<Self, InvalidConfig> {
        config.validate()?;
        let config = Arc::new(config);
        let (shutdown, rx) = watch::channel(false);

        tracing::info!(
            engine = %spawner.describe(),
            pool_size = config.pool_size,
            queue_capacity = config.queue_capacity,
            "Starting engine pool"
        );

        let slots: Vec<Arc<Slot>> = (0..config.pool_size)
            .map(|id| Arc::new(Slot::new(id, config.queue_capacity)))
            .collect();
        let tasks = slots
            .iter()
            .map(|slot| {
                tokio::spawn(run_slot(
                    slot.clone(),
                    config.clone(),
                    spawner.clone(),
                    rx.clone(),
                ))
            })
            .collect();

        Ok(Self {
            slots,
            config,
            shutdown,
            tasks: Mutex::new(tasks),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Queues `request` on the least loaded live slot, falling back to
    /// slots that are still starting or restarting only when every live
    /// queue is full.
    pub(crate) fn assign(&self, request: AnalysisRequest) -> Result<Arc<Slot>, AnalysisError> {
        let mut candidates: Vec<&Arc<Slot>> =
            self.slots.iter().filter(|s| s.accepts_work()).collect();
        if candidates.is_empty() {
            return Err(AnalysisError::EngineUnavailable);
        }
        candidates.sort_by_key(|s| (s.rank(), s.load()));

        let id = request.id();
        let mut request = request;
        let mut full = false;
        for slot in candidates {
            match slot.queue().try_enqueue(request) {
                Ok(queued) => {
                    tracing::debug!(session = slot.id(), request = %id, queued, "Request queued");
                    return Ok(Arc::clone(slot));
                }
                Err(Refused::Full(rejected)) => {
                    full = true;
                    request = rejected;
                }
                // Degraded or stopped since the state check.
                Err(Refused::Closed(rejected)) => request = rejected,
            }
        }

        if !full {
            return Err(AnalysisError::EngineUnavailable);
        }
        tracing::warn!(request = %id, "All engine queues full");
        Err(AnalysisError::Backpressure {
            capacity: self.config.queue_capacity,
        })
    }

    /// Total requests waiting across all slots.
    pub fn queued(&self) -> usize {
        self.slots.iter().map(|s| s.queue().len()).sum()
    }

    pub fn status(&self) -> Vec<SlotStatus> {
        self.slots.iter().map(|s| s.status()).collect()
    }

    /// True when no slot accepts requests.
    pub fn is_degraded(&self) -> bool {
        self.slots.iter().all(|s| !s.accepts_work())
    }

    /// Wakes degraded slots for an immediate restart attempt; returns how
    /// many were woken.
    pub fn recover(&self) -> usize {
        let mut woken = 0;
        for slot in &self.slots {
            let mut inner = slot.inner();
            if inner.state == SlotState::Degraded {
                // Accept requests again right away; they wait for the restart.
                inner.state = SlotState::Restarting;
                slot.queue().reopen();
                drop(inner);
                tracing::info!(session = slot.id(), "Manual recovery requested");
                slot.recover.notify_one();
                woken += 1;
            }
        }
        woken
    }

    /// Stops all dispatchers, terminates the engines, and fails whatever is
    /// still queued with `EngineUnavailable`.
    pub async fn shutdown(&self) {
        self.shutdown.send_replace(true);
        let tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
        for task in tasks {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Engine slot task failed");
            }
        }
        tracing::info!("Engine pool stopped");
    }
}

async fn run_slot(
    slot: Arc<Slot>,
    config: Arc<EngineConfig>,
    spawner: Arc<dyn EngineSpawner>,
    mut shutdown: watch::Receiver<bool>,
) {
    let policy = &config.restart;
    loop {
        if *shutdown.borrow() {
            break;
        }

        slot.set_state(SlotState::Starting);
        let reason = match EngineSession::start(slot.id(), spawner.as_ref(), &config).await {
            Ok(mut session) => {
                slot.set_engine(session.engine_name());
                slot.set_state(SlotState::Ready);
                let exit = Dispatcher::new(&mut session, &slot, &config)
                    .run(&mut shutdown)
                    .await;
                session.terminate().await;

                let reason = match exit {
                    DispatcherExit::Shutdown => break,
                    DispatcherExit::Crashed(reason) => reason,
                    DispatcherExit::Wedged => "engine stopped responding".to_string(),
                };
                let failed = slot.fail_queued(AnalysisError::EngineCrash(reason.clone()));
                tracing::error!(session = slot.id(), reason = %reason, failed, "Engine session lost");
                reason
            }
            Err(e) => {
                tracing::error!(
                    session = slot.id(),
                    engine = %spawner.describe(),
                    error = %e,
                    "Engine failed to start"
                );
                e.to_string()
            }
        };

        let failures = slot.record_failure();
        if failures > policy.max_retries {
            tracing::error!(
                session = slot.id(),
                failures,
                last_error = %reason,
                "Engine degraded after repeated failures"
            );
            if !degrade(&slot, &config, &mut shutdown).await {
                break;
            }
            continue;
        }

        slot.set_state(SlotState::Restarting);
        let delay = policy.delay(failures);
        tracing::info!(
            session = slot.id(),
            attempt = failures,
            delay_ms = delay.as_millis() as u64,
            "Restarting engine"
        );
        if !pause(delay, &mut shutdown).await {
            break;
        }
    }

    let failed = slot.close(SlotState::Stopped, AnalysisError::EngineUnavailable);
    tracing::debug!(session = slot.id(), failed, "Engine slot stopped");
}

/// Parks a slot until recovery. Returns false if shutdown came first.
async fn degrade(slot: &Slot, config: &EngineConfig, shutdown: &mut watch::Receiver<bool>) -> bool {
    slot.close(SlotState::Degraded, AnalysisError::EngineUnavailable);

    let scheduled = tokio::time::sleep(config.restart.recovery_interval());
    tokio::pin!(scheduled);
    loop {
        tokio::select! {
            _ = slot.recover.notified() => {
                // `recover` moves the slot out of Degraded before notifying;
                // a wake-up without that is a permit left from an earlier round.
                if slot.state() != SlotState::Degraded {
                    break;
                }
            }
            _ = &mut scheduled => {
                tracing::info!(session = slot.id(), "Attempting scheduled recovery");
                slot.set_state(SlotState::Restarting);
                break;
            }
            _ = shutdown_requested(shutdown) => return false,
        }
    }
    slot.queue().reopen();
    slot.reset_failures();
    true
}

/// Sleeps for `delay`. Returns false if shutdown came first.
async fn pause(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => true,
        _ = shutdown_requested(shutdown) => false,
    }
}
