//! In-process backend.
//!
//! Issues random nonces, accepts each one exactly once, and tracks pending
//! payments by reference. Failure modes can be switched on for tests and
//! simulated runs.

use std::collections::{HashMap, HashSet, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;
use uuid::Uuid;

use super::{AuthVerdict, BackendClient, BackendError, PaymentConfirmation, PAYMENT_TOKENS};
use crate::host::{PaymentPayload, WalletAuthPayload};

#[derive(Debug, Clone)]
struct PendingPayment {
    amount: String,
    token: String,
}

#[derive(Default)]
pub struct LocalBackend {
    issued: Mutex<HashSet<String>>,
    consumed: Mutex<HashSet<String>>,
    /// Served before random nonces
    scripted_nonces: Mutex<VecDeque<String>>,
    payments: Mutex<HashMap<String, PendingPayment>>,
    nonce_outage: Mutex<bool>,
    rejection: Mutex<Option<String>>,
}

impl LocalBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve these nonces, in order, before falling back to random ones.
    pub fn with_nonces(self, nonces: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.scripted_nonces
            .lock()
            .extend(nonces.into_iter().map(Into::into));
        self
    }

    /// Make nonce issuance fail with a server error.
    pub fn set_nonce_outage(&self, outage: bool) {
        *self.nonce_outage.lock() = outage;
    }

    /// Reject every sign-in with `reason`; `None` restores normal checks.
    pub fn set_rejection(&self, reason: Option<&str>) {
        *self.rejection.lock() = reason.map(str::to_string);
    }

    pub fn issued_nonces(&self) -> usize {
        self.issued.lock().len()
    }

    fn random_nonce() -> String {
        // 32 random bytes, hex encoded
        format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
    }
}

#[async_trait]
impl BackendClient for LocalBackend {
    async fn issue_nonce(&self) -> Result<String, BackendError> {
        if *self.nonce_outage.lock() {
            return Err(BackendError::Status {
                status: 500,
                message: "Failed to generate nonce".to_string(),
            });
        }

        let nonce = self
            .scripted_nonces
            .lock()
            .pop_front()
            .unwrap_or_else(Self::random_nonce);
        self.issued.lock().insert(nonce.clone());
        tracing::debug!("[backend] Issued nonce {}", nonce);
        Ok(nonce)
    }

    async fn verify_auth(
        &self,
        payload: &WalletAuthPayload,
        nonce: &str,
    ) -> Result<AuthVerdict, BackendError> {
        if let Some(reason) = self.rejection.lock().clone() {
            return Ok(AuthVerdict::invalid(reason));
        }
        if nonce.is_empty() {
            return Ok(AuthVerdict::invalid("Missing payload or nonce"));
        }
        if !self.issued.lock().contains(nonce) {
            return Ok(AuthVerdict::invalid("Unknown nonce"));
        }
        if !self.consumed.lock().insert(nonce.to_string()) {
            return Ok(AuthVerdict::invalid("Nonce already used"));
        }

        Ok(AuthVerdict {
            is_valid: true,
            address: Some(payload.address),
            reason: None,
        })
    }

    async fn initiate_payment(&self, amount: &str, token: &str) -> Result<String, BackendError> {
        let positive = amount.parse::<f64>().is_ok_and(|a| a > 0.0);
        if !positive {
            return Err(BackendError::Status {
                status: 400,
                message: "Invalid amount".to_string(),
            });
        }
        if !PAYMENT_TOKENS.contains(&token) {
            return Err(BackendError::Status {
                status: 400,
                message: "Unsupported token".to_string(),
            });
        }

        let reference = Uuid::new_v4().simple().to_string();
        self.payments.lock().insert(
            reference.clone(),
            PendingPayment {
                amount: amount.to_string(),
                token: token.to_string(),
            },
        );
        tracing::debug!("[backend] Payment {} initiated: {} {}", reference, amount, token);
        Ok(reference)
    }

    async fn confirm_payment(
        &self,
        payload: &PaymentPayload,
        reference: &str,
    ) -> Result<PaymentConfirmation, BackendError> {
        if payload.transaction_id.is_empty() || payload.reference != reference {
            return Ok(PaymentConfirmation {
                success: false,
                error: Some("Invalid payment payload".to_string()),
            });
        }

        match self.payments.lock().remove(reference) {
            Some(pending) => {
                tracing::debug!(
                    "[backend] Payment {} confirmed: {} {}",
                    reference,
                    pending.amount,
                    pending.token
                );
                Ok(PaymentConfirmation {
                    success: true,
                    error: None,
                })
            }
            None => Ok(PaymentConfirmation {
                success: false,
                error: Some("Payment not found".to_string()),
            }),
        }
    }
}
