use std::sync::Arc;
use std::time::Duration;

use futures_util::Stream;
use futures_util::stream;
use lpad_models::{Event, OperationId};
use serde_json::json;
use tracing::debug;

use crate::hub::{EventHub, Subscription};

/// Releases the hub subscription when the relay is dropped, which is how a
/// client disconnect reaches the hub.
struct SubscriptionGuard {
    hub: Arc<EventHub>,
    op: OperationId,
    sub: Subscription,
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.hub.unsubscribe(&self.op, self.sub.id());
    }
}

enum Phase {
    Connecting,
    Relaying,
    Finished,
}

struct RelayState {
    guard: SubscriptionGuard,
    heartbeat: Duration,
    phase: Phase,
}

/// Subscribe to `op` and relay its events.
///
/// The first item is `status {status: "connected"}`. While idle a
/// `status {status: "heartbeat"}` is emitted every `heartbeat`. The stream
/// ends right after the first `done` event, or when the hub closes the
/// subscription. An operation that finished before the relay opened yields
/// its retained `done` straight after `connected`.
pub fn relay(
    hub: Arc<EventHub>,
    op: OperationId,
    heartbeat: Duration,
) -> impl Stream<Item = Event> + Send + 'static {
    let sub = hub.subscribe(&op);
    let state = RelayState {
        guard: SubscriptionGuard { hub, op, sub },
        heartbeat,
        phase: Phase::Connecting,
    };

    stream::unfold(state, |mut state| async move {
        match state.phase {
            Phase::Connecting => {
                state.phase = Phase::Relaying;
                Some((Event::status(json!({ "status": "connected" })), state))
            }
            Phase::Relaying => {
                let next = tokio::time::timeout(
                    state.heartbeat,
                    state.guard.sub.recv(),
                )
                .await;
                match next {
                    Err(_) => Some((
                        Event::status(json!({ "status": "heartbeat" })),
                        state,
                    )),
                    Ok(Some(event)) => {
                        if event.is_terminal() {
                            state.phase = Phase::Finished;
                        }
                        Some((event, state))
                    }
                    Ok(None) => {
                        debug!(op = %state.guard.op, "subscription closed");
                        None
                    }
                }
            }
            Phase::Finished => None,
        }
    })
}
