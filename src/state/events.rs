use tokio::sync::broadcast;
use tracing::debug;

use crate::dao::models::DialogueId;

const EVENT_BUS_CAPACITY: usize = 64;

/// Domain events emitted by dialogue transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogueEvent {
    /// Both conclusions are in; the dialogue reached its terminal phase.
    Concluded {
        /// Dialogue that concluded.
        dialogue_id: DialogueId,
    },
}

/// Broadcast bus carrying [`DialogueEvent`]s to background handlers.
#[derive(Debug)]
pub struct EventBus {
    tx: broadcast::Sender<DialogueEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        let (tx, _rx) = broadcast::channel(EVENT_BUS_CAPACITY);
        Self { tx }
    }
}

impl EventBus {
    /// Publish an event. Having no subscriber is not an error; the sweep catches up.
    pub fn publish(&self, event: DialogueEvent) {
        if self.tx.send(event).is_err() {
            debug!(?event, "no subscriber for dialogue event");
        }
    }

    /// Subscribe to future events.
    pub fn subscribe(&self) -> broadcast::Receiver<DialogueEvent> {
        self.tx.subscribe()
    }
}
