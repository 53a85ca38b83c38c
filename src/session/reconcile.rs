//! Cross-context session reconciliation.
//!
//! Two triggers feed the same merge: change notifications from the shared
//! store and a periodic tick. Notifications are fast but may be missed (own
//! writes never notify, rapid navigation drops them); the tick repairs
//! whatever they missed. Storage always wins over memory, except that a tick
//! finding memory connected and storage empty writes memory back.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time::MissedTickBehavior;

use super::SessionManager;
use crate::storage::{keys, ContextId, StorageEvent};

/// What a merge did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Memory now holds the session found in storage
    Adopted,
    /// Memory was cleared because storage has no session
    Cleared,
    /// Storage was rewritten from memory
    Repaired,
    InSync,
    /// Notification from this context or about an unrelated key
    Ignored,
}

#[derive(Debug, Clone, Copy)]
enum Trigger {
    ExternalConnected,
    ExternalDisconnected,
    Tick,
}

#[derive(Clone)]
pub struct Reconciler {
    manager: Arc<SessionManager>,
    context_id: ContextId,
}

impl Reconciler {
    pub fn new(manager: Arc<SessionManager>) -> Self {
        let context_id = manager.storage().context_id();
        Self {
            manager,
            context_id,
        }
    }

    /// Handle a change notification from the shared store.
    pub fn on_external_change(&self, event: &StorageEvent) -> MergeOutcome {
        if event.origin == self.context_id || event.key != keys::CONNECTED {
            return MergeOutcome::Ignored;
        }

        let connected = event
            .new_value
            .as_deref()
            .and_then(|raw| serde_json::from_str::<bool>(raw).ok())
            .unwrap_or(false);

        tracing::debug!(
            "[reconcile] External change from {}: connected={}",
            event.origin,
            connected
        );

        self.merge(if connected {
            Trigger::ExternalConnected
        } else {
            Trigger::ExternalDisconnected
        })
    }

    /// Periodic divergence repair.
    pub fn tick(&self) -> MergeOutcome {
        self.merge(Trigger::Tick)
    }

    fn merge(&self, trigger: Trigger) -> MergeOutcome {
        let outcome = match trigger {
            Trigger::ExternalDisconnected => {
                if self.manager.persisted_session().is_some() {
                    // Reconnected again before we got here
                    self.merge_observed()
                } else if self.manager.clear_memory() {
                    MergeOutcome::Cleared
                } else {
                    MergeOutcome::InSync
                }
            }
            Trigger::ExternalConnected => self.merge_observed(),
            Trigger::Tick => match self.merge_observed() {
                MergeOutcome::InSync if self.manager.repair_storage() => MergeOutcome::Repaired,
                outcome => outcome,
            },
        };

        if outcome != MergeOutcome::InSync {
            tracing::debug!("[reconcile] {:?} -> {:?}", trigger, outcome);
        }
        outcome
    }

    /// Adopt whatever complete session storage holds.
    fn merge_observed(&self) -> MergeOutcome {
        let Some(session) = self.manager.persisted_session() else {
            return MergeOutcome::InSync;
        };
        if self.manager.adopt(session) {
            MergeOutcome::Adopted
        } else {
            MergeOutcome::InSync
        }
    }

    /// Run the notification listener and the tick on a background task.
    pub fn spawn(self, interval: Duration) -> ReconcilerHandle {
        let (task_tx, task_rx) = mpsc::channel(16);
        let events = self.manager.storage().subscribe();

        let join = tokio::spawn(async move {
            self.run(interval, events, task_rx).await;
        });

        ReconcilerHandle { task_tx, join }
    }

    async fn run(
        self,
        interval: Duration,
        mut events: Option<broadcast::Receiver<StorageEvent>>,
        mut task_rx: mpsc::Receiver<ReconcilerTask>,
    ) {
        tracing::info!(
            "[reconcile] Started (interval={:?}, notifications={})",
            interval,
            events.is_some()
        );

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            // Pending notifications are drained before a tick so the tick never
            // repairs storage that another context just cleared.
            let step = tokio::select! {
                biased;
                task = task_rx.recv() => match task {
                    Some(ReconcilerTask::Tick) => Step::Tick,
                    Some(ReconcilerTask::Shutdown) | None => Step::Shutdown,
                },
                event = next_event(&mut events) => Step::Event(event),
                _ = ticker.tick() => Step::Tick,
            };

            match step {
                Step::Shutdown => break,
                Step::Tick => {
                    self.tick();
                }
                Step::Event(Ok(event)) => {
                    self.on_external_change(&event);
                }
                Step::Event(Err(broadcast::error::RecvError::Lagged(missed))) => {
                    tracing::warn!("[reconcile] Missed {} storage notifications, ticking", missed);
                    self.tick();
                }
                Step::Event(Err(broadcast::error::RecvError::Closed)) => {
                    tracing::debug!("[reconcile] Storage notifications closed, tick only");
                    events = None;
                }
            }
        }

        tracing::info!("[reconcile] Stopped");
    }
}

enum Step {
    Tick,
    Shutdown,
    Event(Result<StorageEvent, broadcast::error::RecvError>),
}

async fn next_event(
    events: &mut Option<broadcast::Receiver<StorageEvent>>,
) -> Result<StorageEvent, broadcast::error::RecvError> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

#[derive(Debug)]
pub enum ReconcilerTask {
    /// Run a tick now
    Tick,
    Shutdown,
}

/// Control handle for a spawned reconciler.
pub struct ReconcilerHandle {
    task_tx: mpsc::Sender<ReconcilerTask>,
    join: tokio::task::JoinHandle<()>,
}

impl ReconcilerHandle {
    /// Request an immediate tick.
    pub fn tick_now(&self) {
        if let Err(e) = self.task_tx.try_send(ReconcilerTask::Tick) {
            tracing::warn!("[reconcile] Failed to queue tick: {}", e);
        }
    }

    /// Stop the background task and wait for it to exit.
    pub async fn shutdown(self) {
        let _ = self.task_tx.send(ReconcilerTask::Shutdown).await;
        if let Err(e) = self.join.await {
            tracing::warn!("[reconcile] Task ended abnormally: {}", e);
        }
    }
}
