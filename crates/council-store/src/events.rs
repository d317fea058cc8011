//! Store event bus
//!
//! A typed broadcast channel replacing ambient signals: the chat layer
//! subscribes once at startup and receives conclusion notifications from
//! every trigger source (user commands and the periodic sweep alike).

use tokio::sync::broadcast;

use crate::types::{ConclusionReason, PollId};

/// Notification emitted by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// A poll was concluded and moved to the archive.
    PollConcluded {
        poll_id: PollId,
        reason: ConclusionReason,
    },
}

/// Broadcast bus for [`StoreEvent`]s.
#[derive(Debug)]
pub struct EventBus {
    sender: broadcast::Sender<StoreEvent>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` undelivered events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events emitted from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.sender.subscribe()
    }

    /// Publish an event; having no subscribers is not an error.
    pub(crate) fn emit(&self, event: StoreEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}
