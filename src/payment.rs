//! Deposits into the platform through the host's payment capability.
//!
//! A deposit is registered with the backend first, which hands back the
//! reference the host payment must carry. The backend then confirms the
//! signed payment against that reference.

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{address, Address};
use serde::Serialize;

use crate::backend::{BackendClient, BackendError};
use crate::classify::host_error;
use crate::error::{with_deadline, ErrorKind, QuestError, Result};
use crate::host::{HostReply, HostSlot, PaymentCommand, TokenAmount};
use crate::session::SessionManager;
use crate::swap::units::parse_units;

pub const DEPOSIT_ADDRESS: Address = address!("742d35Cc6634C0532925a3b8D20Eb0d8f4C2f35f");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DepositToken {
    #[serde(rename = "WLD")]
    Wld,
    #[serde(rename = "USDC")]
    Usdc,
}

impl DepositToken {
    pub fn parse(token: &str) -> Result<Self> {
        match token.trim().to_uppercase().as_str() {
            "WLD" => Ok(DepositToken::Wld),
            "USDC" | "USDC.E" | "USDCE" => Ok(DepositToken::Usdc),
            other => Err(QuestError::InvalidInput(format!(
                "deposits accept WLD or USDC, not '{}'",
                other
            ))),
        }
    }

    /// Symbol the backend registers the payment under.
    pub fn symbol(&self) -> &'static str {
        match self {
            DepositToken::Wld => "WLD",
            DepositToken::Usdc => "USDC",
        }
    }

    /// Symbol the host pays in. USDC on World Chain is the bridged USDC.e.
    pub fn host_symbol(&self) -> &'static str {
        match self {
            DepositToken::Wld => "WLD",
            DepositToken::Usdc => "USDCE",
        }
    }

    pub fn decimals(&self) -> u8 {
        match self {
            DepositToken::Wld => 18,
            DepositToken::Usdc => 6,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PaymentConfig {
    pub deposit_address: Address,
    pub call_timeout: Duration,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            deposit_address: DEPOSIT_ADDRESS,
            call_timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositReceipt {
    pub reference: String,
    pub transaction_id: String,
    pub token: DepositToken,
    pub amount: String,
    /// Amount in the token's base units
    pub token_amount: String,
}

pub struct PaymentProtocol {
    slot: HostSlot,
    sessions: Arc<SessionManager>,
    backend: Arc<dyn BackendClient>,
    config: PaymentConfig,
}

impl PaymentProtocol {
    pub fn new(
        slot: HostSlot,
        sessions: Arc<SessionManager>,
        backend: Arc<dyn BackendClient>,
        config: PaymentConfig,
    ) -> Self {
        Self {
            slot,
            sessions,
            backend,
            config,
        }
    }

    pub async fn deposit(&self, amount: &str, token: &str) -> Result<DepositReceipt> {
        if !self.sessions.is_connected() {
            return Err(QuestError::NotConnected("sign in before depositing".to_string()));
        }
        let token = DepositToken::parse(token)?;
        let amount = amount.trim();
        let base_units = parse_units(amount, token.decimals())?;
        if base_units.is_zero() {
            return Err(QuestError::InvalidInput("deposit amount must be positive".to_string()));
        }
        let host = self
            .slot
            .current()
            .ok_or_else(|| QuestError::HostUnavailable("no wallet host registered".to_string()))?;

        let reference = with_deadline("payment initiation", self.config.call_timeout, async {
            self.backend
                .initiate_payment(amount, token.symbol())
                .await
                .map_err(backend_error)
        })
        .await?;
        tracing::info!(
            "[payment] Deposit {} initiated: {} {}",
            reference,
            amount,
            token.symbol()
        );

        let command = PaymentCommand {
            reference: reference.clone(),
            to: self.config.deposit_address,
            tokens: vec![TokenAmount {
                symbol: token.host_symbol().to_string(),
                token_amount: base_units.to_string(),
            }],
            description: format!(
                "Deposit {} {} to SwapQuest Gaming Platform",
                amount,
                token.symbol()
            ),
        };
        let reply = with_deadline("payment", self.config.call_timeout, async {
            Ok(host.request_payment(command).await)
        })
        .await?;

        let payload = match reply {
            HostReply::Success(payload) => payload,
            HostReply::Error { code, message } => {
                tracing::warn!("[payment] Deposit {} refused by host: {}", reference, code);
                return Err(host_error(&code, message.as_deref(), ErrorKind::Unknown));
            }
            HostReply::Unexpected(status) => {
                return Err(QuestError::Unknown(format!(
                    "unexpected payment status '{}'",
                    status
                )));
            }
        };

        let confirmation = with_deadline("payment confirmation", self.config.call_timeout, async {
            self.backend
                .confirm_payment(&payload, &reference)
                .await
                .map_err(backend_error)
        })
        .await?;
        if !confirmation.success {
            let reason = confirmation
                .error
                .unwrap_or_else(|| "Payment verification failed".to_string());
            tracing::warn!("[payment] Deposit {} not confirmed: {}", reference, reason);
            return Err(QuestError::Unknown(reason));
        }

        tracing::info!("[payment] Deposit {} confirmed", reference);
        Ok(DepositReceipt {
            reference,
            transaction_id: payload.transaction_id,
            token,
            amount: amount.to_string(),
            token_amount: base_units.to_string(),
        })
    }
}

fn backend_error(err: BackendError) -> QuestError {
    match err {
        BackendError::Status { status, message } if status < 500 => {
            QuestError::InvalidInput(message)
        }
        e if e.is_transport() => QuestError::NetworkError(e.to_string()),
        e => QuestError::Unknown(e.to_string()),
    }
}

impl std::fmt::Debug for PaymentProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentProtocol")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
