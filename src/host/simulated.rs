//! In-process wallet host with scripted outcomes.
//!
//! Stands in for the real host when running headless (`--simulate`) and in
//! tests. Each capability answers with a configurable [`Outcome`], and every
//! call is recorded so tests can assert on what reached the host.

use std::collections::VecDeque;

use alloy_primitives::Address;
use async_trait::async_trait;
use parking_lot::Mutex;
use uuid::Uuid;

use super::{
    HostReply, HostSdk, PaymentCommand, PaymentPayload, ProofPayload, ProofRequest,
    TransactionCall, TransactionPayload, WalletAuthPayload, WalletAuthRequest,
};

/// How a simulated capability answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// Host error with the given code
    Error(String),
    /// Unrecognised status string
    Unexpected(String),
    /// Never resolves
    Hang,
}

/// A call that reached the simulated host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCall {
    Auth(WalletAuthRequest),
    Proof(ProofRequest),
    Transaction(TransactionCall),
    Payment(PaymentCommand),
}

pub struct SimulatedHost {
    address: Address,
    username: Option<String>,
    present: bool,
    probe_broken: bool,
    auth: Mutex<Outcome>,
    proof: Mutex<Outcome>,
    payment: Mutex<Outcome>,
    /// Consumed front to back; `Success` once empty
    transactions: Mutex<VecDeque<Outcome>>,
    calls: Mutex<Vec<HostCall>>,
}

impl SimulatedHost {
    /// A present host that approves everything.
    pub fn new() -> Self {
        Self {
            address: Address::repeat_byte(0xaa),
            username: Some("quest-player".to_string()),
            present: true,
            probe_broken: false,
            auth: Mutex::new(Outcome::Success),
            proof: Mutex::new(Outcome::Success),
            payment: Mutex::new(Outcome::Success),
            transactions: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_address(mut self, address: Address) -> Self {
        self.address = address;
        self
    }

    pub fn with_username(mut self, username: Option<String>) -> Self {
        self.username = username;
        self
    }

    /// The capability probe reports the host as absent.
    pub fn absent(mut self) -> Self {
        self.present = false;
        self
    }

    /// The capability probe itself fails.
    pub fn with_broken_probe(mut self) -> Self {
        self.probe_broken = true;
        self
    }

    pub fn with_auth_outcome(self, outcome: Outcome) -> Self {
        *self.auth.lock() = outcome;
        self
    }

    pub fn with_proof_outcome(self, outcome: Outcome) -> Self {
        *self.proof.lock() = outcome;
        self
    }

    pub fn with_payment_outcome(self, outcome: Outcome) -> Self {
        *self.payment.lock() = outcome;
        self
    }

    /// Queue outcomes for successive transactions.
    pub fn with_transaction_outcomes(self, outcomes: impl IntoIterator<Item = Outcome>) -> Self {
        self.transactions.lock().extend(outcomes);
        self
    }

    pub fn set_proof_outcome(&self, outcome: Outcome) {
        *self.proof.lock() = outcome;
    }

    pub fn set_auth_outcome(&self, outcome: Outcome) {
        *self.auth.lock() = outcome;
    }

    pub fn set_payment_outcome(&self, outcome: Outcome) {
        *self.payment.lock() = outcome;
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn calls(&self) -> Vec<HostCall> {
        self.calls.lock().clone()
    }

    pub fn auth_requests(&self) -> Vec<WalletAuthRequest> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                HostCall::Auth(req) => Some(req.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn proof_requests(&self) -> Vec<ProofRequest> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                HostCall::Proof(req) => Some(req.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn transactions(&self) -> Vec<TransactionCall> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                HostCall::Transaction(call) => Some(call.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn payment_requests(&self) -> Vec<PaymentCommand> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                HostCall::Payment(command) => Some(command.clone()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: HostCall) {
        self.calls.lock().push(call);
    }

    async fn answer<T>(outcome: Outcome, payload: impl FnOnce() -> T) -> HostReply<T> {
        match outcome {
            Outcome::Success => HostReply::Success(payload()),
            Outcome::Error(code) => HostReply::error(code),
            Outcome::Unexpected(status) => HostReply::Unexpected(status),
            Outcome::Hang => std::future::pending().await,
        }
    }
}

impl Default for SimulatedHost {
    fn default() -> Self {
        Self::new()
    }
}

fn simulated_id() -> String {
    format!("0x{}", Uuid::new_v4().simple())
}

#[async_trait]
impl HostSdk for SimulatedHost {
    async fn is_host_present(&self) -> Result<bool, String> {
        if self.probe_broken {
            return Err("isInstalled is not a function".to_string());
        }
        Ok(self.present)
    }

    fn username(&self) -> Option<String> {
        self.username.clone()
    }

    async fn request_auth(&self, request: WalletAuthRequest) -> HostReply<WalletAuthPayload> {
        let nonce = request.nonce.clone();
        self.record(HostCall::Auth(request));
        let outcome = self.auth.lock().clone();
        let address = self.address;
        Self::answer(outcome, || WalletAuthPayload {
            address,
            message: format!("Sign in with nonce {}", nonce),
            signature: simulated_id(),
            version: 2,
        })
        .await
    }

    async fn request_proof(&self, request: ProofRequest) -> HostReply<ProofPayload> {
        self.record(HostCall::Proof(request));
        let outcome = self.proof.lock().clone();
        Self::answer(outcome, || ProofPayload {
            merkle_root: simulated_id(),
            nullifier_hash: simulated_id(),
            proof: simulated_id(),
            verification_level: "orb".to_string(),
        })
        .await
    }

    async fn submit_transaction(&self, call: TransactionCall) -> HostReply<TransactionPayload> {
        self.record(HostCall::Transaction(call));
        let outcome = self
            .transactions
            .lock()
            .pop_front()
            .unwrap_or(Outcome::Success);
        Self::answer(outcome, || TransactionPayload {
            transaction_id: simulated_id(),
        })
        .await
    }

    async fn request_payment(&self, command: PaymentCommand) -> HostReply<PaymentPayload> {
        let reference = command.reference.clone();
        self.record(HostCall::Payment(command));
        let outcome = self.payment.lock().clone();
        Self::answer(outcome, || PaymentPayload {
            transaction_id: simulated_id(),
            reference,
        })
        .await
    }
}
