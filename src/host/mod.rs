//! Wallet host capabilities.
//!
//! The wallet host injects an SDK into the app once it finishes loading. Rather
//! than looking that SDK up through a global, the host registers a handle on a
//! [`HostSlot`] and every consumer receives the slot explicitly.
//!
//! Every capability returns a tri-state [`HostReply`]: success with a payload,
//! an error the host reported, or a status the client does not understand.

pub mod simulated;

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

pub use simulated::{HostCall, Outcome, SimulatedHost};

/// Tri-state reply from a host capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostReply<T> {
    Success(T),
    /// The host reported a failure (user rejection, simulation failure, ...)
    Error {
        code: String,
        message: Option<String>,
    },
    /// A status the client does not recognise
    Unexpected(String),
}

impl<T> HostReply<T> {
    pub fn error(code: impl Into<String>) -> Self {
        HostReply::Error {
            code: code.into(),
            message: None,
        }
    }

    /// Human-readable description of a non-success reply.
    pub fn describe(&self) -> String {
        match self {
            HostReply::Success(_) => "success".to_string(),
            HostReply::Error { code, message } => match message {
                Some(message) => format!("{}: {}", code, message),
                None => code.clone(),
            },
            HostReply::Unexpected(status) => format!("unexpected status '{}'", status),
        }
    }
}

/// Sign-in statement dispatched to the host for user approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletAuthRequest {
    pub nonce: String,
    pub request_id: String,
    pub expiration_time: DateTime<Utc>,
    pub not_before: DateTime<Utc>,
    pub statement: String,
}

/// Signed sign-in payload returned by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletAuthPayload {
    pub address: Address,
    pub message: String,
    pub signature: String,
    pub version: u32,
}

/// Identity-proof request: an action scope plus the signal it binds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofRequest {
    pub action: String,
    pub signal: String,
}

/// Attested proof returned by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofPayload {
    pub merkle_root: String,
    pub nullifier_hash: String,
    pub proof: String,
    pub verification_level: String,
}

/// Contract call submitted through the host's transaction capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionCall {
    pub address: Address,
    pub function_name: String,
    pub args: serde_json::Value,
    pub value: U256,
    /// Proof the call was authorised under, when one exists
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof_reference: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionPayload {
    pub transaction_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenAmount {
    pub symbol: String,
    pub token_amount: String,
}

/// Payment request shown to the user by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentCommand {
    pub reference: String,
    pub to: Address,
    pub tokens: Vec<TokenAmount>,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentPayload {
    pub transaction_id: String,
    pub reference: String,
}

/// Capabilities the wallet host exposes to the app.
///
/// # Object Safety
/// Intended to be used as `Arc<dyn HostSdk>`.
#[async_trait]
pub trait HostSdk: Send + Sync + 'static {
    /// Capability probe. An `Err` means the probe itself is broken.
    async fn is_host_present(&self) -> Result<bool, String>;

    /// Display name of the signed-in host user, if the host exposes one.
    fn username(&self) -> Option<String>;

    async fn request_auth(&self, request: WalletAuthRequest) -> HostReply<WalletAuthPayload>;

    async fn request_proof(&self, request: ProofRequest) -> HostReply<ProofPayload>;

    async fn submit_transaction(&self, call: TransactionCall) -> HostReply<TransactionPayload>;

    async fn request_payment(&self, command: PaymentCommand) -> HostReply<PaymentPayload>;
}

/// Registration point for the host SDK handle.
#[derive(Clone)]
pub struct HostSlot {
    tx: Arc<watch::Sender<Option<Arc<dyn HostSdk>>>>,
}

impl HostSlot {
    /// An empty slot, waiting for the host to register.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// A slot already holding `host`.
    pub fn with_host(host: Arc<dyn HostSdk>) -> Self {
        let slot = Self::new();
        slot.register(host);
        slot
    }

    /// Called by the host once its SDK is injected.
    pub fn register(&self, host: Arc<dyn HostSdk>) {
        self.tx.send_replace(Some(host));
        tracing::debug!("[host] SDK registered");
    }

    pub fn current(&self) -> Option<Arc<dyn HostSdk>> {
        self.tx.borrow().clone()
    }

    /// Wait up to `timeout` for the host to register.
    pub async fn wait_registered(&self, timeout: Duration) -> Option<Arc<dyn HostSdk>> {
        let mut rx = self.tx.subscribe();
        let host = match tokio::time::timeout(timeout, rx.wait_for(|host| host.is_some())).await {
            Ok(Ok(host)) => host.clone(),
            _ => None,
        };
        host
    }
}

impl Default for HostSlot {
    fn default() -> Self {
        Self::new()
    }
}

/// Secondary textual hints that the app runs inside the wallet host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentSignals {
    pub user_agent: Option<String>,
    pub hostname: Option<String>,
}

impl EnvironmentSignals {
    const USER_AGENT_HINTS: [&'static str; 3] = ["WorldApp", "World App", "worldcoin"];
    const HOSTNAME_HINTS: [&'static str; 2] = ["worldcoin", "worldapp"];

    /// Read hints from `SWAPQUEST_USER_AGENT` and `SWAPQUEST_HOSTNAME`.
    pub fn from_env() -> Self {
        Self {
            user_agent: std::env::var("SWAPQUEST_USER_AGENT").ok(),
            hostname: std::env::var("SWAPQUEST_HOSTNAME").ok(),
        }
    }

    /// Whether any hint names the wallet host.
    pub fn mentions_host(&self) -> bool {
        let ua_match = self
            .user_agent
            .as_deref()
            .is_some_and(|ua| Self::USER_AGENT_HINTS.iter().any(|h| ua.contains(h)));
        let host_match = self
            .hostname
            .as_deref()
            .is_some_and(|host| Self::HOSTNAME_HINTS.iter().any(|h| host.contains(h)));
        ua_match || host_match
    }
}
