//! Nonce-challenge sign-in.
//!
//! `authenticate` always starts from a fresh nonce: a failed handshake is
//! never retried with the nonce it was issued, and a nonce the backend hands
//! out twice is refused on the client side as well.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;

use crate::backend::{BackendClient, BackendError};
use crate::detect::{EnvironmentDetector, HostState};
use crate::error::{with_deadline, QuestError, Result};
use crate::host::{HostReply, WalletAuthRequest};
use crate::session::{Session, SessionManager, UserProfile};

pub const DEFAULT_STATEMENT: &str =
    "Sign in to SwapQuest - Gaming DeFi Platform powered by WorldCoin";
const FALLBACK_USERNAME: &str = "Wallet User";

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub statement: String,
    pub expiration: chrono::Duration,
    /// How far back the not-before bound sits, to absorb clock skew
    pub not_before: chrono::Duration,
    pub call_timeout: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            statement: DEFAULT_STATEMENT.to_string(),
            expiration: chrono::Duration::days(7),
            not_before: chrono::Duration::hours(24),
            call_timeout: Duration::from_secs(120),
        }
    }
}

pub struct AuthenticationProtocol {
    detector: Arc<EnvironmentDetector>,
    backend: Arc<dyn BackendClient>,
    sessions: Arc<SessionManager>,
    config: AuthConfig,
    seen_nonces: Mutex<HashSet<String>>,
}

impl AuthenticationProtocol {
    pub fn new(
        detector: Arc<EnvironmentDetector>,
        backend: Arc<dyn BackendClient>,
        sessions: Arc<SessionManager>,
        config: AuthConfig,
    ) -> Self {
        Self {
            detector,
            backend,
            sessions,
            config,
            seen_nonces: Mutex::new(HashSet::new()),
        }
    }

    /// Run the full handshake and install the resulting session.
    pub async fn authenticate(&self) -> Result<Session> {
        let state = self.detector.state();
        if state != HostState::Available {
            return Err(QuestError::HostUnavailable(format!("host state is {}", state)));
        }
        let host = self
            .detector
            .slot()
            .current()
            .ok_or_else(|| QuestError::HostUnavailable("no wallet host registered".to_string()))?;

        let nonce = self.fetch_nonce().await?;
        tracing::info!("[auth] Starting sign-in with nonce {}", nonce);

        let now = Utc::now();
        let request = WalletAuthRequest {
            nonce: nonce.clone(),
            request_id: "0".to_string(),
            expiration_time: now + self.config.expiration,
            not_before: now - self.config.not_before,
            statement: self.config.statement.clone(),
        };

        let reply = with_deadline("wallet auth", self.config.call_timeout, async {
            Ok(host.request_auth(request).await)
        })
        .await?;

        let payload = match reply {
            HostReply::Success(payload) => payload,
            reply @ HostReply::Error { .. } => {
                tracing::info!("[auth] Host rejected sign-in: {}", reply.describe());
                return Err(QuestError::AuthRejected(reply.describe()));
            }
            HostReply::Unexpected(status) => {
                tracing::warn!("[auth] Unexpected host status '{}'", status);
                return Err(QuestError::AuthProtocolError(format!(
                    "unexpected wallet auth status '{}'",
                    status
                )));
            }
        };

        let verdict = with_deadline("sign-in verification", self.config.call_timeout, async {
            self.backend
                .verify_auth(&payload, &nonce)
                .await
                .map_err(verification_error)
        })
        .await?;

        if !verdict.is_valid {
            let reason = verdict
                .reason
                .unwrap_or_else(|| "verification rejected".to_string());
            tracing::warn!("[auth] Verification failed: {}", reason);
            return Err(QuestError::AuthVerificationFailed(reason));
        }
        if let Some(verified) = verdict.address {
            if verified != payload.address {
                return Err(QuestError::AuthVerificationFailed(format!(
                    "backend verified {} but host signed as {}",
                    verified, payload.address
                )));
            }
        }

        let session = Session {
            address: payload.address,
            issued_at: Utc::now(),
            nonce,
            user: UserProfile {
                id: payload.address.to_string().to_lowercase(),
                is_verified: true,
                username: Some(
                    host.username()
                        .unwrap_or_else(|| FALLBACK_USERNAME.to_string()),
                ),
            },
        };
        self.sessions.connect(session.clone());
        tracing::info!("[auth] Signed in as {}", session.address);
        Ok(session)
    }

    async fn fetch_nonce(&self) -> Result<String> {
        let nonce = with_deadline("nonce", self.config.call_timeout, async {
            self.backend
                .issue_nonce()
                .await
                .map_err(|e| QuestError::NonceFetchFailed(e.to_string()))
        })
        .await?;

        if nonce.is_empty() {
            return Err(QuestError::NonceFetchFailed("backend returned an empty nonce".to_string()));
        }
        if !self.seen_nonces.lock().insert(nonce.clone()) {
            return Err(QuestError::AuthProtocolError(format!(
                "backend reissued nonce {}",
                nonce
            )));
        }
        Ok(nonce)
    }
}

fn verification_error(err: BackendError) -> QuestError {
    match err {
        BackendError::Status { status, message } => {
            QuestError::AuthVerificationFailed(format!("{} ({})", message, status))
        }
        e if e.is_transport() => QuestError::NetworkError(e.to_string()),
        e => QuestError::AuthVerificationFailed(e.to_string()),
    }
}

impl std::fmt::Debug for AuthenticationProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticationProtocol")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::LocalBackend;
    use crate::detect::DetectorConfig;
    use crate::error::ErrorKind;
    use crate::events::EventBus;
    use crate::host::{EnvironmentSignals, HostSlot, Outcome, SimulatedHost};
    use crate::storage::{keys, MemoryStore, StorageAdapter};
    use alloy_primitives::Address;

    struct Fixture {
        host: Arc<SimulatedHost>,
        backend: Arc<LocalBackend>,
        sessions: Arc<SessionManager>,
        auth: AuthenticationProtocol,
    }

    async fn fixture(host: SimulatedHost, backend: LocalBackend) -> Fixture {
        let host = Arc::new(host);
        let backend = Arc::new(backend);
        let events = EventBus::new();
        let detector = Arc::new(EnvironmentDetector::new(
            HostSlot::with_host(host.clone()),
            EnvironmentSignals::default(),
            DetectorConfig {
                settle: Duration::from_millis(20),
                overall_timeout: Duration::from_secs(1),
            },
            events.clone(),
        ));
        detector.detect(false).await;

        let sessions = Arc::new(SessionManager::new(
            StorageAdapter::new(Arc::new(MemoryStore::new())),
            events,
        ));
        sessions.begin_detection();
        sessions.restore();

        let auth = AuthenticationProtocol::new(
            detector,
            backend.clone(),
            sessions.clone(),
            AuthConfig::default(),
        );
        Fixture {
            host,
            backend,
            sessions,
            auth,
        }
    }

    #[tokio::test]
    async fn test_successful_sign_in() {
        let fx = fixture(SimulatedHost::new(), LocalBackend::new().with_nonces(["abc123"])).await;
        let session = fx.auth.authenticate().await.unwrap();

        assert_eq!(session.address, Address::repeat_byte(0xaa));
        assert_eq!(session.nonce, "abc123");
        assert!(session.user.is_verified);
        assert_eq!(session.user.username.as_deref(), Some("quest-player"));
        assert_eq!(
            fx.sessions.storage().load::<bool>(keys::CONNECTED),
            Some(true)
        );

        let request = &fx.host.auth_requests()[0];
        assert_eq!(request.nonce, "abc123");
        assert_eq!(request.request_id, "0");
        assert_eq!(request.statement, DEFAULT_STATEMENT);
        let window = request.expiration_time - request.not_before;
        assert_eq!(window, chrono::Duration::days(8));
    }

    #[tokio::test]
    async fn test_missing_username_falls_back() {
        let fx = fixture(SimulatedHost::new().with_username(None), LocalBackend::new()).await;
        let session = fx.auth.authenticate().await.unwrap();
        assert_eq!(session.user.username.as_deref(), Some("Wallet User"));
    }

    #[tokio::test]
    async fn test_host_unavailable() {
        let fx = fixture(SimulatedHost::new().absent(), LocalBackend::new()).await;
        let err = fx.auth.authenticate().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::HostUnavailable);
        assert_eq!(fx.backend.issued_nonces(), 0);
    }

    #[tokio::test]
    async fn test_nonce_outage() {
        let fx = fixture(SimulatedHost::new(), LocalBackend::new()).await;
        fx.backend.set_nonce_outage(true);
        let err = fx.auth.authenticate().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NonceFetchFailed);
        assert!(fx.host.auth_requests().is_empty());
    }

    #[tokio::test]
    async fn test_host_rejection() {
        let fx = fixture(
            SimulatedHost::new().with_auth_outcome(Outcome::Error("user_rejected".into())),
            LocalBackend::new(),
        )
        .await;
        let err = fx.auth.authenticate().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthRejected);
        assert!(!fx.sessions.is_connected());
    }

    #[tokio::test]
    async fn test_unexpected_host_status() {
        let fx = fixture(
            SimulatedHost::new().with_auth_outcome(Outcome::Unexpected("pending".into())),
            LocalBackend::new(),
        )
        .await;
        let err = fx.auth.authenticate().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthProtocolError);
    }

    #[tokio::test]
    async fn test_verification_failure_carries_reason() {
        let fx = fixture(SimulatedHost::new(), LocalBackend::new()).await;
        fx.backend.set_rejection(Some("Signature mismatch"));
        let err = fx.auth.authenticate().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthVerificationFailed);
        assert!(err.to_string().contains("Signature mismatch"));
        assert!(fx.sessions.persisted_session().is_none());
    }

    #[tokio::test]
    async fn test_retry_after_failure_uses_new_nonce() {
        let fx = fixture(SimulatedHost::new(), LocalBackend::new()).await;
        fx.host.set_auth_outcome(Outcome::Error("user_rejected".into()));
        assert!(fx.auth.authenticate().await.is_err());
        fx.host.set_auth_outcome(Outcome::Success);
        fx.auth.authenticate().await.unwrap();

        let nonces: Vec<_> = fx
            .host
            .auth_requests()
            .into_iter()
            .map(|r| r.nonce)
            .collect();
        assert_eq!(nonces.len(), 2);
        assert_ne!(nonces[0], nonces[1]);
    }

    #[tokio::test]
    async fn test_reissued_nonce_refused() {
        let fx = fixture(
            SimulatedHost::new(),
            LocalBackend::new().with_nonces(["same", "same"]),
        )
        .await;
        fx.auth.authenticate().await.unwrap();
        let err = fx.auth.authenticate().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthProtocolError);
        assert_eq!(fx.host.auth_requests().len(), 1);
    }

    #[tokio::test]
    async fn test_hung_host_times_out() {
        let fx = fixture(
            SimulatedHost::new().with_auth_outcome(Outcome::Hang),
            LocalBackend::new(),
        )
        .await;
        let auth = AuthenticationProtocol {
            config: AuthConfig {
                call_timeout: Duration::from_millis(20),
                ..AuthConfig::default()
            },
            ..fx.auth
        };
        let err = auth.authenticate().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(!fx.sessions.is_connected());
    }
}
