//! Event publication.

use std::panic::{AssertUnwindSafe, catch_unwind};

use tokio::sync::broadcast;
use tracing::{error, trace};

use crate::event::SessionEvent;

/// Failure to hand an event to subscribers.
///
/// Having no subscribers is not a failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PublishError {
    /// The bus implementation rejected the event.
    #[error("publish rejected: {0}")]
    Rejected(String),
}

/// Sink for session lifecycle events.
pub trait EventBus: Send + Sync {
    fn publish(&self, event: SessionEvent) -> Result<(), PublishError>;
}

/// Fan-out bus backed by a tokio broadcast channel.
///
/// Publishing never blocks; slow subscribers observe a lag error on receive
/// instead of holding up the publisher. Events published while nobody is
/// subscribed are dropped.
#[derive(Debug, Clone)]
pub struct BroadcastEventBus {
    sender: broadcast::Sender<SessionEvent>,
}

impl BroadcastEventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl EventBus for BroadcastEventBus {
    fn publish(&self, event: SessionEvent) -> Result<(), PublishError> {
        let kind = event.kind;
        match self.sender.send(event) {
            Ok(receivers) => trace!(%kind, receivers, "Published session event"),
            Err(_) => trace!(%kind, "No subscribers, dropped session event"),
        }
        Ok(())
    }
}

/// Bus that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventBus;

impl EventBus for NoopEventBus {
    fn publish(&self, _event: SessionEvent) -> Result<(), PublishError> {
        Ok(())
    }
}

/// Publish `event`, logging failures and panics instead of propagating them.
///
/// Store notification threads call this; a misbehaving subscriber must not
/// unwind into the store.
pub(crate) fn publish_logged(bus: &dyn EventBus, event: SessionEvent) {
    let kind = event.kind;
    let session_id = event.session_id().to_string();
    match catch_unwind(AssertUnwindSafe(|| bus.publish(event))) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            error!(%kind, session_id = %session_id, error = %e, "Failed to publish session event");
        }
        Err(_) => {
            error!(%kind, session_id = %session_id, "Event bus panicked while publishing session event");
        }
    }
}
