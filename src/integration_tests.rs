//! End-to-end tests for the controller.
//!
//! Each test wires a full [`QuestController`] to the simulated host, the
//! in-process backend and a scripted chain, and drives it through the public
//! API only.

#![cfg(test)]

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, U256};
use proptest::prelude::*;
use tempfile::TempDir;
use tokio::sync::watch;

use crate::backend::LocalBackend;
use crate::chain::MemoryChain;
use crate::controller::{Collaborators, ControllerConfig, QuestController};
use crate::detect::{DetectorConfig, HostState};
use crate::error::ErrorKind;
use crate::host::{EnvironmentSignals, HostSlot, Outcome, SimulatedHost};
use crate::session::{SessionState, UserProfile};
use crate::storage::{keys, FileStore, KeyValueStore, MemoryStore, StorageAdapter};
use crate::swap::tokens::{NATIVE, USDC, WLD};
use crate::swap::units::parse_units;
use crate::swap::{StaticRateTable, SwapConfig};

struct Harness {
    host: Arc<SimulatedHost>,
    backend: Arc<LocalBackend>,
    chain: Arc<MemoryChain>,
    controller: QuestController,
}

fn test_config(reconcile_interval: Duration) -> ControllerConfig {
    ControllerConfig {
        detector: DetectorConfig {
            settle: Duration::from_millis(20),
            overall_timeout: Duration::from_secs(1),
        },
        reconcile_interval,
        ..ControllerConfig::default()
    }
}

fn harness_with(
    host: SimulatedHost,
    backend: LocalBackend,
    store: Arc<dyn KeyValueStore>,
    config: ControllerConfig,
) -> Harness {
    let host = Arc::new(host);
    let backend = Arc::new(backend);
    let chain = Arc::new(
        MemoryChain::new()
            .with_token(WLD, "WLD", 18)
            .with_token(USDC, "USDC", 6),
    );
    let controller = QuestController::new(
        Collaborators {
            slot: HostSlot::with_host(host.clone()),
            signals: EnvironmentSignals::default(),
            store,
            backend: backend.clone(),
            chain: chain.clone(),
            oracle: Arc::new(StaticRateTable::default()),
        },
        config,
    );
    Harness {
        host,
        backend,
        chain,
        controller,
    }
}

fn harness(host: SimulatedHost) -> Harness {
    harness_with(
        host,
        LocalBackend::new(),
        Arc::new(MemoryStore::new()),
        test_config(Duration::from_secs(5)),
    )
}

async fn wait_for_state(
    mut rx: watch::Receiver<SessionState>,
    predicate: impl FnMut(&SessionState) -> bool,
) -> bool {
    let reached = tokio::time::timeout(Duration::from_secs(3), rx.wait_for(predicate))
        .await
        .is_ok_and(|r| r.is_ok());
    reached
}

// ============================================================================
// Authentication
// ============================================================================

#[tokio::test]
async fn test_fresh_start_authenticates_with_issued_nonce() {
    let h = harness_with(
        SimulatedHost::new(),
        LocalBackend::new().with_nonces(["abc123"]),
        Arc::new(MemoryStore::new()),
        test_config(Duration::from_secs(5)),
    );

    let status = h.controller.start().await;
    assert_eq!(status.host_state, HostState::Available);
    assert_eq!(status.session_state, "disconnected");

    let session = h.controller.authenticate().await.unwrap();
    assert_eq!(session.address, Address::repeat_byte(0xaa));
    assert_eq!(session.nonce, "abc123");
    assert!(session.user.is_verified);
    assert_eq!(h.host.auth_requests()[0].nonce, "abc123");
    assert_eq!(h.controller.status().session_state, "connected");

    h.controller.shutdown().await;
}

#[tokio::test]
async fn test_authenticate_persists_connected_flag() {
    let store = MemoryStore::new();
    let h = harness_with(
        SimulatedHost::new(),
        LocalBackend::new().with_nonces(["abc123"]),
        Arc::new(store.clone()),
        test_config(Duration::from_secs(5)),
    );
    h.controller.start().await;
    h.controller.authenticate().await.unwrap();

    let reader = StorageAdapter::new(Arc::new(store.context()));
    assert_eq!(reader.load::<bool>(keys::CONNECTED), Some(true));
    let user: UserProfile = reader.load(keys::USER).unwrap();
    assert!(user.is_verified);
    assert_eq!(user.id, format!("{}", Address::repeat_byte(0xaa)).to_lowercase());

    h.controller.shutdown().await;
}

#[tokio::test]
async fn test_authenticate_without_host_fails_fast() {
    let h = harness(SimulatedHost::new().absent());
    let status = h.controller.start().await;
    assert_eq!(status.host_state, HostState::Unavailable);

    let err = h.controller.authenticate().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::HostUnavailable);
    assert_eq!(h.backend.issued_nonces(), 0);
    assert_eq!(h.controller.status().session_state, "disconnected");

    h.controller.shutdown().await;
}

#[tokio::test]
async fn test_failed_sign_in_stays_disconnected() {
    let h = harness(SimulatedHost::new());
    h.controller.start().await;
    h.backend.set_rejection(Some("Invalid signature"));

    let err = h.controller.connect_wallet().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AuthVerificationFailed);
    assert!(err.to_string().contains("Invalid signature"));
    assert_eq!(h.controller.status().session_state, "disconnected");

    h.controller.shutdown().await;
}

// ============================================================================
// Restore and disconnect
// ============================================================================

#[tokio::test]
async fn test_restart_restores_without_network() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("storage.json");

    let first = harness_with(
        SimulatedHost::new(),
        LocalBackend::new(),
        Arc::new(FileStore::new(&path)),
        test_config(Duration::from_secs(5)),
    );
    first.controller.start().await;
    let session = first.controller.authenticate().await.unwrap();
    first.controller.shutdown().await;

    // A host whose probe says "absent" must not undo a persisted session
    let second = harness_with(
        SimulatedHost::new().absent(),
        LocalBackend::new(),
        Arc::new(FileStore::new(&path)),
        test_config(Duration::from_secs(5)),
    );
    let status = second.controller.start().await;
    assert_eq!(status.host_state, HostState::Available);
    assert_eq!(status.session_state, "connected");
    assert_eq!(status.address, Some(session.address));
    assert_eq!(second.backend.issued_nonces(), 0);
    assert!(second.host.auth_requests().is_empty());

    second.controller.shutdown().await;
}

#[tokio::test]
async fn test_restore_is_idempotent() {
    let store = MemoryStore::new();
    let writer = harness_with(
        SimulatedHost::new(),
        LocalBackend::new(),
        Arc::new(store.clone()),
        test_config(Duration::from_secs(5)),
    );
    writer.controller.start().await;
    let session = writer.controller.authenticate().await.unwrap();
    writer.controller.shutdown().await;

    let reader = harness_with(
        SimulatedHost::new(),
        LocalBackend::new(),
        Arc::new(store.context()),
        test_config(Duration::from_secs(5)),
    );
    reader.controller.start().await;
    for _ in 0..5 {
        assert!(reader.controller.check_connection());
        let restored = reader.controller.session().unwrap();
        assert_eq!(restored.address, session.address);
        assert_eq!(restored.user, session.user);
    }

    reader.controller.shutdown().await;
}

#[tokio::test]
async fn test_disconnect_clears_memory_and_storage_together() {
    let store = MemoryStore::new();
    let h = harness_with(
        SimulatedHost::new(),
        LocalBackend::new(),
        Arc::new(store.clone()),
        test_config(Duration::from_secs(5)),
    );
    h.controller.start().await;
    h.controller.authenticate().await.unwrap();

    h.controller.disconnect();

    assert!(h.controller.session().is_none());
    let reader = StorageAdapter::new(Arc::new(store.context()));
    for key in keys::ALL {
        assert!(reader.load::<serde_json::Value>(key).is_none(), "{} left behind", key);
    }
    assert!(!h.controller.check_connection());

    h.controller.shutdown().await;
}

// ============================================================================
// Cross-context reconciliation
// ============================================================================

#[tokio::test]
async fn test_second_context_adopts_via_notification() {
    let shared = MemoryStore::new();
    let a = harness_with(
        SimulatedHost::new(),
        LocalBackend::new(),
        Arc::new(shared.context()),
        test_config(Duration::from_secs(5)),
    );
    let b = harness_with(
        SimulatedHost::new(),
        LocalBackend::new(),
        Arc::new(shared.context()),
        test_config(Duration::from_secs(5)),
    );
    a.controller.start().await;
    b.controller.start().await;

    let session = a.controller.authenticate().await.unwrap();
    assert!(
        wait_for_state(b.controller.watch_session(), |s| s.is_connected()).await,
        "context B never adopted the session"
    );
    assert_eq!(b.controller.session().unwrap().address, session.address);
    assert!(b.host.auth_requests().is_empty());

    a.controller.disconnect();
    assert!(
        wait_for_state(b.controller.watch_session(), |s| !s.is_connected()).await,
        "context B never observed the disconnect"
    );

    a.controller.shutdown().await;
    b.controller.shutdown().await;
}

#[tokio::test]
async fn test_second_process_adopts_within_tick() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("storage.json");
    let tick = Duration::from_millis(50);

    let a = harness_with(
        SimulatedHost::new(),
        LocalBackend::new(),
        Arc::new(FileStore::new(&path)),
        test_config(tick),
    );
    let b = harness_with(
        SimulatedHost::new(),
        LocalBackend::new(),
        Arc::new(FileStore::new(&path)),
        test_config(tick),
    );
    a.controller.start().await;
    b.controller.start().await;
    assert_eq!(b.controller.status().session_state, "disconnected");

    let session = a.controller.authenticate().await.unwrap();
    assert!(
        wait_for_state(b.controller.watch_session(), |s| s.is_connected()).await,
        "tick never adopted the session"
    );
    assert_eq!(b.controller.session().unwrap().address, session.address);
    assert_eq!(b.backend.issued_nonces(), 0);

    a.controller.shutdown().await;
    b.controller.shutdown().await;
}

// ============================================================================
// Swaps
// ============================================================================

async fn connected(h: &Harness) {
    h.controller.start().await;
    h.controller.authenticate().await.unwrap();
}

#[tokio::test]
async fn test_quote_one_eth_at_2000_with_300_bps() {
    let h = harness(SimulatedHost::new());
    let prepared = h
        .controller
        .prepare_swap("ETH", "WLD", "1.0", Some(300))
        .await
        .unwrap();

    assert_eq!(prepared.quote.amount_out, parse_units("2000", 18).unwrap());
    assert_eq!(prepared.quote.minimum_amount_out, parse_units("1940", 18).unwrap());
    assert_eq!(prepared.request.amount_out_minimum, prepared.quote.minimum_amount_out);
}

#[tokio::test]
async fn test_native_swap_end_to_end() {
    let h = harness(SimulatedHost::new());
    connected(&h).await;
    let mut events = h.controller.subscribe();

    let prepared = h
        .controller
        .prepare_swap("ETH", "WLD", "0.5", None)
        .await
        .unwrap();
    let receipt = h.controller.execute_swap(&prepared.request).await.unwrap();

    assert!(receipt.approval_transaction_id.is_none());
    let transactions = h.host.transactions();
    assert_eq!(transactions.len(), 1);
    assert_eq!(transactions[0].function_name, "exactInputSingle");
    assert_eq!(transactions[0].value, parse_units("0.5", 18).unwrap());
    assert_eq!(h.host.proof_requests().len(), 1);

    let mut saw_settled = false;
    while let Ok(event) = events.try_recv() {
        if let crate::events::QuestEvent::SwapPhase { swap_id, phase } = event {
            assert_eq!(swap_id, receipt.swap_id);
            saw_settled |= phase == crate::events::SwapPhase::Settled;
        }
    }
    assert!(saw_settled);

    h.controller.shutdown().await;
}

#[tokio::test]
async fn test_erc20_swap_approves_when_allowance_short() {
    let h = harness(SimulatedHost::new());
    connected(&h).await;

    let prepared = h
        .controller
        .prepare_swap("WLD", "USDC", "10", Some(100))
        .await
        .unwrap();
    let receipt = h.controller.execute_swap(&prepared.request).await.unwrap();
    assert!(receipt.approval_transaction_id.is_some());

    let names: Vec<_> = h
        .host
        .transactions()
        .into_iter()
        .map(|t| t.function_name)
        .collect();
    assert_eq!(names, ["approve", "exactInputSingle"]);

    // With the allowance in place the next swap goes straight to settlement
    let owner = h.controller.session().unwrap().address;
    h.chain
        .set_allowance(WLD, owner, SwapConfig::default().router, U256::MAX);
    let receipt = h.controller.execute_swap(&prepared.request).await.unwrap();
    assert!(receipt.approval_transaction_id.is_none());
    assert_eq!(h.host.transactions().len(), 3);

    h.controller.shutdown().await;
}

#[tokio::test]
async fn test_settlement_insufficient_is_classified() {
    let h = harness(
        SimulatedHost::new()
            .with_transaction_outcomes([Outcome::Error("insufficient_balance".to_string())]),
    );
    connected(&h).await;

    let prepared = h
        .controller
        .prepare_swap("ETH", "WLD", "1", None)
        .await
        .unwrap();
    let err = h.controller.execute_swap(&prepared.request).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientFunds);

    h.controller.shutdown().await;
}

#[tokio::test]
async fn test_swap_requires_session() {
    let h = harness(SimulatedHost::new());
    h.controller.start().await;

    let prepared = h
        .controller
        .prepare_swap("ETH", "WLD", "1", None)
        .await
        .unwrap();
    let err = h.controller.execute_swap(&prepared.request).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotConnected);
    assert!(h.host.proof_requests().is_empty());

    h.controller.shutdown().await;
}

#[tokio::test]
async fn test_retry_after_proof_failure_gets_fresh_swap_id() {
    let h = harness(SimulatedHost::new());
    connected(&h).await;
    let prepared = h
        .controller
        .prepare_swap("ETH", "WLD", "1", None)
        .await
        .unwrap();

    h.host.set_proof_outcome(Outcome::Error("user_rejected".to_string()));
    let err = h.controller.execute_swap(&prepared.request).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UserRejected);
    assert!(h.host.transactions().is_empty());

    h.host.set_proof_outcome(Outcome::Success);
    h.controller.execute_swap(&prepared.request).await.unwrap();

    let actions: Vec<_> = h
        .host
        .proof_requests()
        .into_iter()
        .map(|r| r.action)
        .collect();
    assert_eq!(actions.len(), 2);
    assert_ne!(actions[0], actions[1]);

    h.controller.shutdown().await;
}

// ============================================================================
// Deposits and identity proofs
// ============================================================================

#[tokio::test]
async fn test_deposit_end_to_end() {
    let h = harness(SimulatedHost::new());
    connected(&h).await;

    let receipt = h.controller.deposit("1.5", "USDC").await.unwrap();
    assert_eq!(receipt.token_amount, "1500000");

    let err = h.controller.deposit("1", "DOGE").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    h.controller.shutdown().await;
}

#[tokio::test]
async fn test_verify_human_and_sign_message() {
    let h = harness(SimulatedHost::new());
    connected(&h).await;

    let proof = h.controller.verify_human().await.unwrap();
    assert!(!proof.merkle_root.is_empty());
    let signed = h.controller.sign_message("quest complete").await.unwrap();
    assert!(signed.action.starts_with("message-"));

    let json = serde_json::to_value(h.controller.status()).unwrap();
    assert_eq!(json["user"]["isVerified"], true);

    h.controller.shutdown().await;
}

// ============================================================================
// Properties
// ============================================================================

fn failing_outcome() -> impl Strategy<Value = Outcome> {
    prop_oneof![
        "[a-z_]{1,24}".prop_map(Outcome::Error),
        "[a-z]{1,12}".prop_map(Outcome::Unexpected),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Property: a swap whose proof does not succeed never reaches settlement
    #[test]
    fn prop_failed_proof_never_settles(outcome in failing_outcome(), native in any::<bool>()) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let (settlements, kind) = rt.block_on(async {
            let h = harness(SimulatedHost::new());
            connected(&h).await;
            h.host.set_proof_outcome(outcome);

            let from = if native { "ETH" } else { "WLD" };
            let prepared = h.controller.prepare_swap(from, "USDC", "1", None).await.unwrap();
            let err = h.controller.execute_swap(&prepared.request).await.unwrap_err();
            h.controller.shutdown().await;
            (h.host.transactions().len(), err.kind())
        });

        prop_assert_eq!(settlements, 0);
        prop_assert_ne!(kind, ErrorKind::NotConnected);
    }

    /// Property: sign-in attempts never reuse a nonce, whether they succeed or fail
    #[test]
    fn prop_nonces_are_never_reused(outcomes in prop::collection::vec(any::<bool>(), 1..6)) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let nonces = rt.block_on(async {
            let h = harness(SimulatedHost::new());
            h.controller.start().await;
            for approve in &outcomes {
                let outcome = if *approve {
                    Outcome::Success
                } else {
                    Outcome::Error("user_rejected".to_string())
                };
                h.host.set_auth_outcome(outcome);
                let _ = h.controller.authenticate().await;
            }
            h.controller.shutdown().await;
            h.host
                .auth_requests()
                .into_iter()
                .map(|r| r.nonce)
                .collect::<Vec<_>>()
        });

        let unique: std::collections::HashSet<_> = nonces.iter().collect();
        prop_assert_eq!(unique.len(), nonces.len());
        prop_assert_eq!(nonces.len(), outcomes.len());
    }
}

#[tokio::test]
async fn test_hung_settlement_times_out() {
    let config = ControllerConfig {
        swap: SwapConfig {
            call_timeout: Duration::from_millis(50),
            ..SwapConfig::default()
        },
        ..test_config(Duration::from_secs(5))
    };
    let h = harness_with(
        SimulatedHost::new().with_transaction_outcomes([Outcome::Hang]),
        LocalBackend::new(),
        Arc::new(MemoryStore::new()),
        config,
    );
    connected(&h).await;

    let prepared = h
        .controller
        .prepare_swap("ETH", "WLD", "1", None)
        .await
        .unwrap();
    let err = h.controller.execute_swap(&prepared.request).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert_eq!(h.controller.session().map(|s| s.address), Some(h.host.address()));

    h.controller.shutdown().await;
}

#[test]
fn test_native_sentinel_is_zero_address() {
    assert_eq!(NATIVE, Address::ZERO);
}
