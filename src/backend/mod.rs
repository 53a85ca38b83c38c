//! Backend collaborator: nonce issuance, sign-in verification and payments.
//!
//! [`HttpBackend`] talks to the app's HTTP API. [`LocalBackend`] implements the
//! same contract in process for headless runs and tests.

mod http;
mod local;

pub use http::HttpBackend;
pub use local::LocalBackend;

#[cfg(test)]
pub(crate) use http::test_server;

use alloy_primitives::Address;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::host::{PaymentPayload, WalletAuthPayload};

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Backend error ({status}): {message}")]
    Status { status: u16, message: String },

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Invalid backend URL: {0}")]
    Url(#[from] url::ParseError),
}

impl From<serde_json::Error> for BackendError {
    fn from(err: serde_json::Error) -> Self {
        BackendError::Parse(err.to_string())
    }
}

impl BackendError {
    /// The request never produced an HTTP response.
    pub fn is_transport(&self) -> bool {
        matches!(self, BackendError::Http(_))
    }
}

/// Verdict on a signed sign-in payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthVerdict {
    pub is_valid: bool,
    #[serde(default)]
    pub address: Option<Address>,
    /// Why the payload was rejected
    #[serde(default, alias = "error")]
    pub reason: Option<String>,
}

impl AuthVerdict {
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            address: None,
            reason: Some(reason.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentConfirmation {
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
}

#[async_trait]
pub trait BackendClient: Send + Sync {
    /// Issue a fresh single-use nonce.
    async fn issue_nonce(&self) -> Result<String, BackendError>;

    /// Check a signed payload against the nonce it was issued for. A rejection
    /// is `Ok` with `is_valid == false`.
    async fn verify_auth(
        &self,
        payload: &WalletAuthPayload,
        nonce: &str,
    ) -> Result<AuthVerdict, BackendError>;

    /// Register a pending payment and return its reference.
    async fn initiate_payment(&self, amount: &str, token: &str) -> Result<String, BackendError>;

    async fn confirm_payment(
        &self,
        payload: &PaymentPayload,
        reference: &str,
    ) -> Result<PaymentConfirmation, BackendError>;
}

/// Tokens the payment endpoints accept.
pub const PAYMENT_TOKENS: [&str; 2] = ["WLD", "USDC"];
