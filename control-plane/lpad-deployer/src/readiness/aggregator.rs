use std::sync::Arc;
use std::time::Duration;

use lpad_models::{Event, OperationId};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::snapshot::{SnapshotStore, WorkloadKind};
use super::watch::{WatchSink, WorkloadWatcher, release_selector};
use crate::errors::ReadinessError;
use crate::hub::EventHub;

/// Aborts the watch tasks however the aggregator returns.
struct WatchTasks(Vec<JoinHandle<()>>);

impl Drop for WatchTasks {
    fn drop(&mut self) {
        for task in &self.0 {
            task.abort();
        }
    }
}

fn kinds(list: &[WorkloadKind]) -> String {
    list.iter()
        .map(WorkloadKind::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

pub struct ReadinessAggregator {
    watcher: Arc<dyn WorkloadWatcher>,
    hub: Arc<EventHub>,
    timeout: Duration,
    interval: Duration,
}

impl ReadinessAggregator {
    pub fn new(
        watcher: Arc<dyn WorkloadWatcher>,
        hub: Arc<EventHub>,
        timeout: Duration,
        interval: Duration,
    ) -> Self {
        Self {
            watcher,
            hub,
            timeout,
            interval,
        }
    }

    /// Watch the release's workloads until all of them are ready.
    ///
    /// Bounded by the configured timeout and by `cancel`. Every tick
    /// publishes `status {readiness}`; the terminal `done` is left to the
    /// caller.
    #[instrument(skip(self, op, cancel), fields(op = %op))]
    pub async fn watch_until_ready(
        &self,
        op: &OperationId,
        cancel: CancellationToken,
        namespace: &str,
        release: &str,
    ) -> Result<(), ReadinessError> {
        let deadline = tokio::time::sleep_until(Instant::now() + self.timeout);
        tokio::pin!(deadline);

        let store = Arc::new(SnapshotStore::new());
        let (ended_tx, mut ended_rx) = mpsc::unbounded_channel();
        let sink = WatchSink::new(store.clone(), self.hub.clone(), op.clone(), ended_tx);
        let _tasks = WatchTasks(self.watcher.spawn_watches(
            namespace,
            &release_selector(release),
            sink,
        ));

        while !store.is_synced() {
            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(ReadinessError::WatchCacheSync(kinds(&store.unsynced())));
                }
                _ = &mut deadline => {
                    return Err(ReadinessError::WatchCacheSync(kinds(&store.unsynced())));
                }
                Some((kind, reason)) = ended_rx.recv() => {
                    warn!(%kind, %reason, "watch ended before sync");
                    return Err(ReadinessError::WatchCacheSync(format!("{kind}: {reason}")));
                }
                _ = store.sync_changed() => {}
            }
        }
        debug!(objects = store.len(), "all watch caches synced");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(ReadinessError::ReadinessTimeout("canceled".into()));
                }
                _ = &mut deadline => {
                    return Err(ReadinessError::ReadinessTimeout(format!(
                        "not ready after {}s: {}",
                        self.timeout.as_secs(),
                        store.evaluate().reason
                    )));
                }
                Some((kind, reason)) = ended_rx.recv() => {
                    return Err(ReadinessError::Watch(format!("{kind}: {reason}")));
                }
                _ = ticker.tick() => {
                    let readiness = store.evaluate();
                    self.hub.publish(
                        op,
                        Event::status(json!({ "readiness": readiness.reason })),
                    );
                    if readiness.ready {
                        info!(namespace, release, "release ready");
                        return Ok(());
                    }
                    debug!(reason = %readiness.reason, "release not ready yet");
                }
            }
        }
    }
}
