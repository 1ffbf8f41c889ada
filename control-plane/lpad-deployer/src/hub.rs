use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use lpad_models::{Event, OperationId};
use tokio::sync::mpsc::{self, Receiver, Sender, error::TrySendError};
use tokio::time::Instant;
use tracing::{debug, trace};

pub const DEFAULT_CAPACITY: usize = 16;
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(600);

type Registry = HashMap<OperationId, Vec<(SubscriptionId, Sender<Event>)>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Receiving half of one subscriber's channel.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    rx: Receiver<Event>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Event> {
        self.rx.try_recv().ok()
    }
}

/// Per-operation publish/subscribe multiplexer.
///
/// Publishing never waits on a subscriber: a full buffer drops the event for
/// that subscriber only. An operation's `done` is kept for `retention` and
/// handed to anyone subscribing after it was published.
#[derive(Debug)]
pub struct EventHub {
    capacity: usize,
    retention: Duration,
    next_id: AtomicU64,
    subscribers: RwLock<Registry>,
    finished: Mutex<HashMap<OperationId, (Instant, Event)>>,
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            retention: DEFAULT_RETENTION,
            next_id: AtomicU64::new(1),
            subscribers: RwLock::new(HashMap::new()),
            finished: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Terminal event of `op` if it finished within the retention window.
    /// Expired entries are pruned on the way.
    fn finished_event(&self, op: &OperationId) -> Option<Event> {
        let mut finished = self.finished.lock().unwrap_or_else(|e| e.into_inner());
        let retention = self.retention;
        finished.retain(|_, (at, _)| at.elapsed() < retention);
        finished.get(op).map(|(_, event)| event.clone())
    }

    fn remember_finished(&self, op: &OperationId, event: &Event) {
        if self.retention.is_zero() {
            return;
        }
        let mut finished = self.finished.lock().unwrap_or_else(|e| e.into_inner());
        finished.insert(op.clone(), (Instant::now(), event.clone()));
    }

    fn read(&self) -> RwLockReadGuard<'_, Registry> {
        self.subscribers.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Registry> {
        self.subscribers.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn subscribe(&self, op: &OperationId) -> Subscription {
        let (tx, rx) = mpsc::channel(self.capacity);
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        // Registered under the write lock so a concurrent publish of `done`
        // either reaches this channel or is already in `finished`.
        let mut subs = self.write();
        if let Some(done) = self.finished_event(op) {
            debug!(op = %op, sub = id.0, "operation already finished; replaying done");
            let _ = tx.try_send(done);
        }
        subs.entry(op.clone()).or_default().push((id, tx));
        debug!(op = %op, sub = id.0, "subscriber added");
        Subscription { id, rx }
    }

    /// Remove one subscriber. Its channel closes; the operation entry goes
    /// away with its last subscriber.
    pub fn unsubscribe(&self, op: &OperationId, id: SubscriptionId) {
        let mut subs = self.write();
        if let Some(list) = subs.get_mut(op) {
            list.retain(|(sid, _)| *sid != id);
            if list.is_empty() {
                subs.remove(op);
            }
        }
        debug!(op = %op, sub = id.0, "subscriber removed");
    }

    pub fn publish(&self, op: &OperationId, event: Event) {
        let subs = self.read();
        if event.is_terminal() {
            self.remember_finished(op, &event);
        }
        let Some(list) = subs.get(op) else {
            trace!(op = %op, kind = event.kind.as_str(), "no subscribers");
            return;
        };
        for (id, tx) in list {
            match tx.try_send(event.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    debug!(op = %op, sub = id.0, "subscriber buffer full; dropping event");
                }
                Err(TrySendError::Closed(_)) => {
                    trace!(op = %op, sub = id.0, "subscriber closed; dropping event");
                }
            }
        }
    }

    pub fn subscriber_count(&self, op: &OperationId) -> usize {
        self.read().get(op).map_or(0, Vec::len)
    }
}
