//! Events broadcast to UI consumers.

use alloy_primitives::Address;
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::detect::HostState;

/// Progress of a single swap attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapPhase {
    Proving,
    Proven,
    Approving,
    Settling,
    Settled,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum QuestEvent {
    HostStateChanged {
        state: HostState,
    },
    SessionChanged {
        connected: bool,
        address: Option<Address>,
    },
    SwapPhase {
        swap_id: Uuid,
        phase: SwapPhase,
    },
}

/// Fan-out of [`QuestEvent`]s. Emitting with no subscribers is a no-op.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<QuestEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(128);
        Self { tx }
    }

    pub fn emit(&self, event: QuestEvent) {
        tracing::trace!("[events] {:?}", event);
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QuestEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
