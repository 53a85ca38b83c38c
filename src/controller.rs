//! Process-wide facade over detection, sessions and the protocols.
//!
//! One [`QuestController`] is built per process and shared by reference. It
//! owns the single [`SessionManager`] and the background reconciler; every
//! protocol receives the same manager and host slot.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{broadcast, watch};

use alloy_primitives::Address;

use crate::auth::{AuthConfig, AuthenticationProtocol};
use crate::backend::BackendClient;
use crate::chain::ChainReader;
use crate::detect::{DetectorConfig, EnvironmentDetector, HostState};
use crate::error::Result;
use crate::events::{EventBus, QuestEvent};
use crate::host::{EnvironmentSignals, HostSlot, ProofPayload};
use crate::identity::{IdentityProofs, SignedMessage};
use crate::payment::{DepositReceipt, PaymentConfig, PaymentProtocol};
use crate::session::{Reconciler, ReconcilerHandle, Session, SessionManager, SessionState, UserProfile};
use crate::storage::{KeyValueStore, StorageAdapter};
use crate::swap::{
    PreparedSwap, PriceOracle, SettlementReceipt, SwapConfig, SwapProtocol, SwapQuote, SwapRequest,
    TokenResolver, TokenTable,
};

/// External collaborators the controller is wired to.
pub struct Collaborators {
    pub slot: HostSlot,
    pub signals: EnvironmentSignals,
    pub store: Arc<dyn KeyValueStore>,
    pub backend: Arc<dyn BackendClient>,
    pub chain: Arc<dyn ChainReader>,
    pub oracle: Arc<dyn PriceOracle>,
}

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub detector: DetectorConfig,
    pub auth: AuthConfig,
    pub swap: SwapConfig,
    pub payment: PaymentConfig,
    pub tokens: TokenTable,
    pub reconcile_interval: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            detector: DetectorConfig::default(),
            auth: AuthConfig::default(),
            swap: SwapConfig::default(),
            payment: PaymentConfig::default(),
            tokens: TokenTable::world_chain(),
            reconcile_interval: Duration::from_secs(5),
        }
    }
}

/// Snapshot for UI consumers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerStatus {
    pub host_state: HostState,
    pub session_state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserProfile>,
}

pub struct QuestController {
    events: EventBus,
    detector: Arc<EnvironmentDetector>,
    sessions: Arc<SessionManager>,
    auth: AuthenticationProtocol,
    swaps: SwapProtocol,
    payments: PaymentProtocol,
    identity: IdentityProofs,
    reconcile_interval: Duration,
    reconciler: Mutex<Option<ReconcilerHandle>>,
}

impl QuestController {
    pub fn new(collaborators: Collaborators, config: ControllerConfig) -> Self {
        let Collaborators {
            slot,
            signals,
            store,
            backend,
            chain,
            oracle,
        } = collaborators;
        let events = EventBus::new();

        let detector = Arc::new(EnvironmentDetector::new(
            slot.clone(),
            signals,
            config.detector,
            events.clone(),
        ));
        let sessions = Arc::new(SessionManager::new(StorageAdapter::new(store), events.clone()));

        let auth = AuthenticationProtocol::new(
            detector.clone(),
            backend.clone(),
            sessions.clone(),
            config.auth.clone(),
        );
        let swaps = SwapProtocol::new(
            slot.clone(),
            sessions.clone(),
            TokenResolver::new(chain.clone(), config.tokens),
            oracle,
            chain,
            config.swap,
            events.clone(),
        );
        let payments = PaymentProtocol::new(slot.clone(), sessions.clone(), backend, config.payment);
        let identity = IdentityProofs::new(slot, sessions.clone(), config.auth.call_timeout);

        Self {
            events,
            detector,
            sessions,
            auth,
            swaps,
            payments,
            identity,
            reconcile_interval: config.reconcile_interval,
            reconciler: Mutex::new(None),
        }
    }

    /// Detect the host, restore any persisted session and start reconciling.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn start(&self) -> ControllerStatus {
        self.sessions.begin_detection();
        let has_session = self.sessions.persisted_session().is_some();
        let host_state = self.detector.detect(has_session).await;
        tracing::debug!("[session] Startup detection finished: {}", host_state);
        self.sessions.restore();

        let mut reconciler = self.reconciler.lock();
        if reconciler.is_none() {
            let handle = Reconciler::new(self.sessions.clone()).spawn(self.reconcile_interval);
            *reconciler = Some(handle);
        }
        drop(reconciler);

        self.status()
    }

    /// Stop the background reconciler. Safe to call more than once.
    pub async fn shutdown(&self) {
        let handle = self.reconciler.lock().take();
        if let Some(handle) = handle {
            handle.shutdown().await;
        }
    }

    /// Re-run host detection after an earlier negative result.
    pub async fn redetect(&self) -> HostState {
        self.detector.redetect().await
    }

    pub fn host_state(&self) -> HostState {
        self.detector.state()
    }

    pub async fn authenticate(&self) -> Result<Session> {
        self.auth.authenticate().await
    }

    /// Restore a persisted session when one exists, otherwise sign in.
    pub async fn connect_wallet(&self) -> Result<Session> {
        if self.sessions.restore() {
            if let Some(session) = self.sessions.session() {
                return Ok(session);
            }
        }
        self.auth.authenticate().await
    }

    pub fn check_connection(&self) -> bool {
        self.sessions.check_connection()
    }

    pub fn disconnect(&self) {
        self.sessions.disconnect();
    }

    pub fn session(&self) -> Option<Session> {
        self.sessions.session()
    }

    pub async fn quote(&self, request: &SwapRequest) -> Result<SwapQuote> {
        self.swaps.quote(request).await
    }

    pub async fn prepare_swap(
        &self,
        from: &str,
        to: &str,
        amount: &str,
        slippage_bps: Option<u32>,
    ) -> Result<PreparedSwap> {
        self.swaps.prepare(from, to, amount, slippage_bps).await
    }

    pub async fn execute_swap(&self, request: &SwapRequest) -> Result<SettlementReceipt> {
        self.swaps.execute(request).await
    }

    pub async fn deposit(&self, amount: &str, token: &str) -> Result<DepositReceipt> {
        self.payments.deposit(amount, token).await
    }

    pub async fn verify_human(&self) -> Result<ProofPayload> {
        self.identity.verify_human().await
    }

    pub async fn sign_message(&self, message: &str) -> Result<SignedMessage> {
        self.identity.sign_message(message).await
    }

    pub fn status(&self) -> ControllerStatus {
        let state = self.sessions.state();
        let session = state.session();
        ControllerStatus {
            host_state: self.detector.state(),
            session_state: state.name(),
            address: session.map(|s| s.address),
            user: session.map(|s| s.user.clone()),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QuestEvent> {
        self.events.subscribe()
    }

    pub fn watch_session(&self) -> watch::Receiver<SessionState> {
        self.sessions.subscribe()
    }

    pub fn tick_reconciler(&self) {
        if let Some(handle) = self.reconciler.lock().as_ref() {
            handle.tick_now();
        }
    }
}

impl std::fmt::Debug for QuestController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuestController")
            .field("host_state", &self.detector.state())
            .field("session", &self.sessions.state().name())
            .finish_non_exhaustive()
    }
}
