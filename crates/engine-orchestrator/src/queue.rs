//! Bounded FIFO of requests waiting for one session.

use crate::request::{AnalysisRequest, RequestId};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

/// Why [`RequestQueue::try_enqueue`] handed a request back.
#[derive(Debug)]
pub(crate) enum Refused {
    Full(AnalysisRequest),
    /// The session is degraded or stopped and takes no new work.
    Closed(AnalysisRequest),
}

struct Items {
    requests: VecDeque<AnalysisRequest>,
    closed: bool,
}

/// Requests queued behind a session's active search.
///
/// All mutation happens under the lock inside single operations; the only
/// await point is [`RequestQueue::pop`] waiting for the next push.
pub(crate) struct RequestQueue {
    items: Mutex<Items>,
    notify: Notify,
    capacity: usize,
}

impl RequestQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            items: Mutex::new(Items {
                requests: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            notify: Notify::new(),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Items> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends `request` unless the queue is full or closed, in which case
    /// it is handed back untouched. Returns the new queue length.
    pub(crate) fn try_enqueue(&self, request: AnalysisRequest) -> Result<usize, Refused> {
        let len = {
            let mut items = self.lock();
            if items.closed {
                return Err(Refused::Closed(request));
            }
            if items.requests.len() >= self.capacity {
                return Err(Refused::Full(request));
            }
            items.requests.push_back(request);
            items.requests.len()
        };
        self.notify.notify_one();
        Ok(len)
    }

    /// Takes a still-queued request out of line.
    pub(crate) fn remove(&self, id: RequestId) -> Option<AnalysisRequest> {
        let mut items = self.lock();
        let index = items.requests.iter().position(|r| r.id() == id)?;
        items.requests.remove(index)
    }

    /// Empties the queue, oldest first.
    pub(crate) fn drain(&self) -> Vec<AnalysisRequest> {
        self.lock().requests.drain(..).collect()
    }

    /// Refuses further requests and empties the queue in one step, so
    /// nothing can slip in between the two.
    pub(crate) fn close(&self) -> Vec<AnalysisRequest> {
        let mut items = self.lock();
        items.closed = true;
        items.requests.drain(..).collect()
    }

    pub(crate) fn reopen(&self) {
        self.lock().closed = false;
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().requests.len()
    }

    /// Waits for and removes the oldest request.
    ///
    /// Cancel safe: a request is only removed in the poll that returns it.
    pub(crate) async fn pop(&self) -> AnalysisRequest {
        loop {
            let notified = self.notify.notified();
            let next = self.lock().requests.pop_front();
            if let Some(request) = next {
                return request;
            }
            notified.await;
        }
    }
}
