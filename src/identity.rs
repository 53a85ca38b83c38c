//! Standalone identity proofs: proof of personhood and message attestation.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;

use crate::classify::host_error;
use crate::error::{with_deadline, ErrorKind, QuestError, Result};
use crate::host::{HostReply, HostSlot, ProofPayload, ProofRequest};
use crate::session::SessionManager;

pub const VERIFY_HUMAN_ACTION: &str = "verify-human";
pub const VERIFY_HUMAN_SIGNAL: &str = "swapquest-verification";

/// A message attested by the host under a one-off action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedMessage {
    pub message: String,
    pub action: String,
    pub signature: String,
    pub verification_level: String,
}

pub struct IdentityProofs {
    slot: HostSlot,
    sessions: Arc<SessionManager>,
    call_timeout: Duration,
}

impl IdentityProofs {
    pub fn new(slot: HostSlot, sessions: Arc<SessionManager>, call_timeout: Duration) -> Self {
        Self {
            slot,
            sessions,
            call_timeout,
        }
    }

    /// Prove the connected user is a unique human. Marks the stored profile
    /// verified on success.
    pub async fn verify_human(&self) -> Result<ProofPayload> {
        let proof = self
            .prove(VERIFY_HUMAN_ACTION.to_string(), VERIFY_HUMAN_SIGNAL.to_string())
            .await?;
        if self.sessions.mark_verified().is_none() {
            tracing::debug!("[identity] Verified without a session; nothing to persist");
        }
        tracing::info!("[identity] Human verification succeeded ({})", proof.verification_level);
        Ok(proof)
    }

    /// Attest `message`. The signature is the proof's merkle root.
    pub async fn sign_message(&self, message: &str) -> Result<SignedMessage> {
        if message.is_empty() {
            return Err(QuestError::InvalidInput("message is empty".to_string()));
        }
        let action = format!("message-{}", Utc::now().timestamp_millis());
        let proof = self.prove(action.clone(), message.to_string()).await?;
        Ok(SignedMessage {
            message: message.to_string(),
            action,
            signature: proof.merkle_root,
            verification_level: proof.verification_level,
        })
    }

    async fn prove(&self, action: String, signal: String) -> Result<ProofPayload> {
        if !self.sessions.is_connected() {
            return Err(QuestError::NotConnected("sign in first".to_string()));
        }
        let host = self
            .slot
            .current()
            .ok_or_else(|| QuestError::HostUnavailable("no wallet host registered".to_string()))?;

        tracing::debug!("[identity] Requesting proof for {}", action);
        let reply = with_deadline("identity proof", self.call_timeout, async {
            Ok(host.request_proof(ProofRequest { action, signal }).await)
        })
        .await?;

        match reply {
            HostReply::Success(proof) => Ok(proof),
            HostReply::Error { code, message } => {
                Err(host_error(&code, message.as_deref(), ErrorKind::ProofFailed))
            }
            HostReply::Unexpected(status) => Err(QuestError::ProofFailed(format!(
                "unexpected proof status '{}'",
                status
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use crate::host::{Outcome, SimulatedHost};
    use crate::session::testing::session_for;
    use crate::storage::{keys, MemoryStore, StorageAdapter};
    use crate::session::UserProfile;

    fn proofs(host: Arc<SimulatedHost>) -> (IdentityProofs, Arc<SessionManager>) {
        let sessions = Arc::new(SessionManager::new(
            StorageAdapter::new(Arc::new(MemoryStore::new())),
            EventBus::new(),
        ));
        let proofs = IdentityProofs::new(
            HostSlot::with_host(host),
            sessions.clone(),
            Duration::from_secs(5),
        );
        (proofs, sessions)
    }

    #[tokio::test]
    async fn test_verify_human_marks_profile() {
        let host = Arc::new(SimulatedHost::new());
        let (proofs, sessions) = proofs(host.clone());
        let mut session = session_for(0xaa);
        session.user.is_verified = false;
        sessions.connect(session);

        proofs.verify_human().await.unwrap();

        let request = &host.proof_requests()[0];
        assert_eq!(request.action, "verify-human");
        assert_eq!(request.signal, "swapquest-verification");
        assert!(sessions.session().unwrap().user.is_verified);
        let stored: UserProfile = sessions.storage().load(keys::USER).unwrap();
        assert!(stored.is_verified);
    }

    #[tokio::test]
    async fn test_sign_message_uses_merkle_root() {
        let host = Arc::new(SimulatedHost::new());
        let (proofs, sessions) = proofs(host.clone());
        sessions.connect(session_for(0xaa));

        let signed = proofs.sign_message("gg wp").await.unwrap();
        let request = &host.proof_requests()[0];
        assert!(request.action.starts_with("message-"));
        assert_eq!(request.action, signed.action);
        assert_eq!(request.signal, "gg wp");
        assert!(signed.signature.starts_with("0x"));
    }

    #[tokio::test]
    async fn test_proof_rejection_is_classified() {
        let host = Arc::new(SimulatedHost::new().with_proof_outcome(Outcome::Error(
            "verification_rejected".to_string(),
        )));
        let (proofs, sessions) = proofs(host);
        sessions.connect(session_for(0xaa));
        let err = proofs.verify_human().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UserRejected);
    }

    #[tokio::test]
    async fn test_requires_session() {
        let host = Arc::new(SimulatedHost::new());
        let (proofs, _) = proofs(host.clone());
        let err = proofs.sign_message("hello").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotConnected);
        assert!(host.proof_requests().is_empty());
    }
}
