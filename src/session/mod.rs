//! Authenticated session state.
//!
//! [`SessionManager`] owns the single in-memory [`Session`] and mirrors it into
//! the storage adapter as three keys (session record, user profile, connected
//! flag). [`Reconciler`] keeps the two in agreement when other contexts write
//! the same store.

mod manager;
mod reconcile;

pub use manager::SessionManager;
pub use reconcile::{MergeOutcome, Reconciler, ReconcilerHandle, ReconcilerTask};

use alloy_primitives::Address;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub is_verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub address: Address,
    pub issued_at: DateTime<Utc>,
    pub nonce: String,
    pub user: UserProfile,
}

impl Session {
    /// Same identity, ignoring when and with which nonce it was issued.
    pub fn same_identity(&self, other: &Session) -> bool {
        self.address == other.address && self.user == other.user
    }
}

/// Persisted form of a [`Session`] minus its user profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StoredSession {
    pub address: Address,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub issued_at: DateTime<Utc>,
    pub nonce: String,
}

impl From<&Session> for StoredSession {
    fn from(session: &Session) -> Self {
        Self {
            address: session.address,
            issued_at: session.issued_at,
            nonce: session.nonce.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "session", rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Detecting,
    Disconnected,
    Restoring,
    Connected(Session),
}

impl SessionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, SessionState::Connected(_))
    }

    pub fn session(&self) -> Option<&Session> {
        match self {
            SessionState::Connected(session) => Some(session),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Detecting => "detecting",
            SessionState::Disconnected => "disconnected",
            SessionState::Restoring => "restoring",
            SessionState::Connected(_) => "connected",
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use chrono::TimeZone;

    pub fn session_for(byte: u8) -> Session {
        let address = Address::repeat_byte(byte);
        Session {
            address,
            issued_at: Utc.timestamp_millis_opt(1_700_000_000_000).unwrap(),
            nonce: format!("nonce-{:02x}", byte),
            user: UserProfile {
                id: address.to_string().to_lowercase(),
                is_verified: true,
                username: Some(format!("user-{:02x}", byte)),
            },
        }
    }
}
