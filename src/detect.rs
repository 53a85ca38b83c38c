//! Wallet host detection.
//!
//! Detection waits briefly for the host to register its SDK on the
//! [`HostSlot`], then asks the SDK's capability probe. The whole run is bounded
//! by an overall timeout after which the host counts as unavailable.
//!
//! "Available" is sticky: once observed it is never retracted for the lifetime
//! of the detector. "Unavailable" can only turn into "Available" through
//! [`EnvironmentDetector::redetect`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;

use crate::events::{EventBus, QuestEvent};
use crate::host::{EnvironmentSignals, HostSlot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HostState {
    Unknown,
    Available,
    Unavailable,
}

impl std::fmt::Display for HostState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HostState::Unknown => "unknown",
            HostState::Available => "available",
            HostState::Unavailable => "unavailable",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DetectorConfig {
    /// How long to wait for the host to finish injecting itself
    pub settle: Duration,
    /// Hard bound on a whole detection run
    pub overall_timeout: Duration,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            settle: Duration::from_millis(500),
            overall_timeout: Duration::from_secs(10),
        }
    }
}

pub struct EnvironmentDetector {
    slot: HostSlot,
    signals: EnvironmentSignals,
    config: DetectorConfig,
    state: RwLock<HostState>,
    installed: AtomicBool,
    events: EventBus,
}

impl EnvironmentDetector {
    pub fn new(
        slot: HostSlot,
        signals: EnvironmentSignals,
        config: DetectorConfig,
        events: EventBus,
    ) -> Self {
        Self {
            slot,
            signals,
            config,
            state: RwLock::new(HostState::Unknown),
            installed: AtomicBool::new(false),
            events,
        }
    }

    pub fn state(&self) -> HostState {
        *self.state.read()
    }

    pub fn slot(&self) -> &HostSlot {
        &self.slot
    }

    /// Determine whether the host is present.
    ///
    /// With a persisted session the answer is `Available` immediately and the
    /// real probe runs in the background. A negative background probe is only
    /// logged; it never downgrades the determination.
    pub async fn detect(self: &Arc<Self>, has_persisted_session: bool) -> HostState {
        if self.installed.load(Ordering::SeqCst) {
            return HostState::Available;
        }

        if has_persisted_session {
            tracing::info!("[detect] Persisted session found, assuming host is available");
            self.record(HostState::Available);

            let detector = Arc::clone(self);
            tokio::spawn(async move {
                let probed = detector.probe_bounded().await;
                if probed != HostState::Available {
                    tracing::warn!(
                        "[detect] Live probe reports host {} while a persisted session exists; keeping session",
                        probed
                    );
                } else {
                    tracing::debug!("[detect] Background probe confirmed host");
                }
            });
            return HostState::Available;
        }

        let state = self.probe_bounded().await;
        self.record(state);
        self.state()
    }

    /// Run detection again, ignoring any earlier negative result.
    pub async fn redetect(self: &Arc<Self>) -> HostState {
        if self.installed.load(Ordering::SeqCst) {
            return HostState::Available;
        }
        tracing::debug!("[detect] Re-running detection");
        let state = self.probe_bounded().await;
        self.record(state);
        self.state()
    }

    async fn probe_bounded(&self) -> HostState {
        match tokio::time::timeout(self.config.overall_timeout, self.probe()).await {
            Ok(state) => state,
            Err(_) => {
                tracing::warn!(
                    "[detect] Detection timed out after {:?}, proceeding as unavailable",
                    self.config.overall_timeout
                );
                HostState::Unavailable
            }
        }
    }

    async fn probe(&self) -> HostState {
        let hinted = self.signals.mentions_host();

        let Some(host) = self.slot.wait_registered(self.config.settle).await else {
            if hinted {
                tracing::warn!(
                    "[detect] Environment hints name the host but no SDK registered; treating as unavailable"
                );
            } else {
                tracing::debug!("[detect] No host SDK registered");
            }
            return HostState::Unavailable;
        };

        match host.is_host_present().await {
            Ok(true) => HostState::Available,
            Ok(false) => {
                tracing::debug!("[detect] Host SDK registered but reports not installed");
                HostState::Unavailable
            }
            Err(e) if hinted => {
                tracing::warn!(
                    "[detect] Capability probe failed ({}), falling back to environment hints",
                    e
                );
                HostState::Available
            }
            Err(e) => {
                tracing::warn!("[detect] Capability probe failed: {}", e);
                HostState::Unavailable
            }
        }
    }

    fn record(&self, state: HostState) {
        if state == HostState::Available {
            self.installed.store(true, Ordering::SeqCst);
        }

        let changed = {
            let mut current = self.state.write();
            // Never retract an observed installation
            if *current == HostState::Available || *current == state {
                false
            } else {
                *current = state;
                true
            }
        };

        if changed {
            tracing::info!("[detect] Host state: {}", state);
            self.events.emit(QuestEvent::HostStateChanged { state });
        }
    }
}

impl std::fmt::Debug for EnvironmentDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvironmentDetector")
            .field("state", &self.state())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
