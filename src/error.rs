use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Closed set of failure classes a caller of the controller can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    HostUnavailable,
    NonceFetchFailed,
    AuthRejected,
    AuthProtocolError,
    AuthVerificationFailed,
    StorageUnavailable,
    QuoteUnavailable,
    ProofFailed,
    UserRejected,
    InsufficientFunds,
    AllowanceRequired,
    SlippageExceeded,
    LiquidityInsufficient,
    NetworkError,
    Timeout,
    NotConnected,
    InvalidInput,
    Unknown,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::HostUnavailable => "host_unavailable",
            ErrorKind::NonceFetchFailed => "nonce_fetch_failed",
            ErrorKind::AuthRejected => "auth_rejected",
            ErrorKind::AuthProtocolError => "auth_protocol_error",
            ErrorKind::AuthVerificationFailed => "auth_verification_failed",
            ErrorKind::StorageUnavailable => "storage_unavailable",
            ErrorKind::QuoteUnavailable => "quote_unavailable",
            ErrorKind::ProofFailed => "proof_failed",
            ErrorKind::UserRejected => "user_rejected",
            ErrorKind::InsufficientFunds => "insufficient_funds",
            ErrorKind::AllowanceRequired => "allowance_required",
            ErrorKind::SlippageExceeded => "slippage_exceeded",
            ErrorKind::LiquidityInsufficient => "liquidity_insufficient",
            ErrorKind::NetworkError => "network_error",
            ErrorKind::Timeout => "timeout",
            ErrorKind::NotConnected => "not_connected",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum QuestError {
    #[error("Wallet host unavailable: {0}")]
    HostUnavailable(String),

    #[error("Failed to fetch nonce: {0}")]
    NonceFetchFailed(String),

    #[error("Authentication rejected: {0}")]
    AuthRejected(String),

    #[error("Authentication protocol error: {0}")]
    AuthProtocolError(String),

    #[error("Authentication verification failed: {0}")]
    AuthVerificationFailed(String),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Quote unavailable: {0}")]
    QuoteUnavailable(String),

    #[error("Proof failed: {0}")]
    ProofFailed(String),

    #[error("Rejected by user: {0}")]
    UserRejected(String),

    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("Token approval required: {0}")]
    AllowanceRequired(String),

    #[error("Slippage exceeded: {0}")]
    SlippageExceeded(String),

    #[error("Insufficient liquidity: {0}")]
    LiquidityInsufficient(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Timed out after {secs}s: {operation}")]
    Timeout { operation: String, secs: u64 },

    #[error("Wallet not connected: {0}")]
    NotConnected(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl QuestError {
    /// Build the variant matching `kind`, carrying `message`.
    pub fn from_kind(kind: ErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        match kind {
            ErrorKind::HostUnavailable => QuestError::HostUnavailable(message),
            ErrorKind::NonceFetchFailed => QuestError::NonceFetchFailed(message),
            ErrorKind::AuthRejected => QuestError::AuthRejected(message),
            ErrorKind::AuthProtocolError => QuestError::AuthProtocolError(message),
            ErrorKind::AuthVerificationFailed => QuestError::AuthVerificationFailed(message),
            ErrorKind::StorageUnavailable => QuestError::StorageUnavailable(message),
            ErrorKind::QuoteUnavailable => QuestError::QuoteUnavailable(message),
            ErrorKind::ProofFailed => QuestError::ProofFailed(message),
            ErrorKind::UserRejected => QuestError::UserRejected(message),
            ErrorKind::InsufficientFunds => QuestError::InsufficientFunds(message),
            ErrorKind::AllowanceRequired => QuestError::AllowanceRequired(message),
            ErrorKind::SlippageExceeded => QuestError::SlippageExceeded(message),
            ErrorKind::LiquidityInsufficient => QuestError::LiquidityInsufficient(message),
            ErrorKind::NetworkError => QuestError::NetworkError(message),
            ErrorKind::Timeout => QuestError::Timeout {
                operation: message,
                secs: 0,
            },
            ErrorKind::NotConnected => QuestError::NotConnected(message),
            ErrorKind::InvalidInput => QuestError::InvalidInput(message),
            ErrorKind::Unknown => QuestError::Unknown(message),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            QuestError::HostUnavailable(_) => ErrorKind::HostUnavailable,
            QuestError::NonceFetchFailed(_) => ErrorKind::NonceFetchFailed,
            QuestError::AuthRejected(_) => ErrorKind::AuthRejected,
            QuestError::AuthProtocolError(_) => ErrorKind::AuthProtocolError,
            QuestError::AuthVerificationFailed(_) => ErrorKind::AuthVerificationFailed,
            QuestError::StorageUnavailable(_) => ErrorKind::StorageUnavailable,
            QuestError::QuoteUnavailable(_) => ErrorKind::QuoteUnavailable,
            QuestError::ProofFailed(_) => ErrorKind::ProofFailed,
            QuestError::UserRejected(_) => ErrorKind::UserRejected,
            QuestError::InsufficientFunds(_) => ErrorKind::InsufficientFunds,
            QuestError::AllowanceRequired(_) => ErrorKind::AllowanceRequired,
            QuestError::SlippageExceeded(_) => ErrorKind::SlippageExceeded,
            QuestError::LiquidityInsufficient(_) => ErrorKind::LiquidityInsufficient,
            QuestError::NetworkError(_) => ErrorKind::NetworkError,
            QuestError::Timeout { .. } => ErrorKind::Timeout,
            QuestError::NotConnected(_) => ErrorKind::NotConnected,
            QuestError::InvalidInput(_) => ErrorKind::InvalidInput,
            QuestError::Unknown(_) => ErrorKind::Unknown,
        }
    }
}

// Implement Serialize for UI consumers
impl Serialize for QuestError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

pub type Result<T> = std::result::Result<T, QuestError>;

/// Await `fut`, failing with [`QuestError::Timeout`] once `limit` elapses.
pub(crate) async fn with_deadline<T, F>(
    operation: &str,
    limit: std::time::Duration,
    fut: F,
) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!("{} timed out after {:?}", operation, limit);
            Err(QuestError::Timeout {
                operation: operation.to_string(),
                secs: limit.as_secs(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_from_kind_round_trips_kind() {
        let kinds = [
            ErrorKind::HostUnavailable,
            ErrorKind::AuthRejected,
            ErrorKind::InsufficientFunds,
            ErrorKind::Timeout,
            ErrorKind::Unknown,
        ];
        for kind in kinds {
            assert_eq!(QuestError::from_kind(kind, "x").kind(), kind);
        }
    }

    #[test]
    fn test_error_serializes_as_message() {
        let err = QuestError::InsufficientFunds("balance too low".to_string());
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json, serde_json::json!("Insufficient funds: balance too low"));
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_value(ErrorKind::SlippageExceeded).unwrap();
        assert_eq!(json, serde_json::json!("slippage_exceeded"));
        assert_eq!(ErrorKind::SlippageExceeded.to_string(), "slippage_exceeded");
    }

    #[tokio::test]
    async fn test_with_deadline_times_out() {
        let result: Result<()> = with_deadline("slow call", Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert_eq!(result.unwrap_err().kind(), ErrorKind::Timeout);
    }

    #[tokio::test]
    async fn test_with_deadline_passes_result_through() {
        let result = with_deadline("fast call", Duration::from_secs(1), async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }
}
