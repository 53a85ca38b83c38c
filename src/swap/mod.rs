//! Token swaps through the AMM router.
//!
//! Execution runs in two phases and the order is enforced by types:
//!
//! 1. **Proof**: the host attests a statement binding the swap id, both
//!    tokens, the input amount, the expected output, a timestamp and the
//!    requester. Only a successful attestation produces a [`ProvenSwap`].
//! 2. **Settlement**: consumes the [`ProvenSwap`]. For ERC-20 input the
//!    router allowance is read and an approval is submitted first when it is
//!    short; then `exactInputSingle` is submitted referencing the proof.
//!
//! Every attempt gets a fresh swap id. A retry after any failure is a new
//! attempt with a new proof.

pub mod oracle;
pub mod quote;
pub mod tokens;
pub mod units;

pub use oracle::{PriceOracle, Rate, StaticRateTable};
pub use quote::{QuoteKey, SwapQuote, SwapRequest};
pub use tokens::{TokenDescriptor, TokenResolver, TokenTable};

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, U256};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::chain::ChainReader;
use crate::classify::host_error;
use crate::error::{with_deadline, ErrorKind, QuestError, Result};
use crate::events::{EventBus, QuestEvent, SwapPhase};
use crate::host::{HostReply, HostSdk, HostSlot, ProofPayload, ProofRequest, TransactionCall};
use crate::session::SessionManager;

#[derive(Debug, Clone)]
pub struct SwapConfig {
    pub router: Address,
    pub default_slippage_bps: u32,
    pub fee_tier: u32,
    pub deadline_secs: u64,
    pub gas_estimate: u64,
    pub price_impact_bps: u32,
    /// Cached quotes older than this are recomputed
    pub quote_ttl: Duration,
    pub call_timeout: Duration,
}

impl Default for SwapConfig {
    fn default() -> Self {
        Self {
            router: tokens::ROUTER,
            default_slippage_bps: 100,
            fee_tier: 3000,
            deadline_secs: 1200,
            gas_estimate: 300_000,
            price_impact_bps: 30,
            quote_ttl: Duration::from_secs(30),
            call_timeout: Duration::from_secs(120),
        }
    }
}

/// A request ready for execution together with the quote that sized it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreparedSwap {
    pub request: SwapRequest,
    pub quote: SwapQuote,
    pub token_in: TokenDescriptor,
    pub token_out: TokenDescriptor,
}

/// Statement the host attests during the proof phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapAttestation {
    pub swap_id: Uuid,
    pub token_in: Address,
    pub token_out: Address,
    pub amount_in: U256,
    pub expected_amount_out: U256,
    /// Milliseconds since the epoch
    pub timestamp: i64,
    pub requester: Address,
}

/// Proof-phase output. Only [`SwapProtocol`] can construct one, and only
/// after the host attested the swap.
#[derive(Debug)]
pub struct ProvenSwap {
    swap_id: Uuid,
    request: SwapRequest,
    requester: Address,
    quote: SwapQuote,
    proof: ProofPayload,
}

impl ProvenSwap {
    pub fn swap_id(&self) -> Uuid {
        self.swap_id
    }

    /// Reference the settlement call carries back to the proof.
    pub fn proof_reference(&self) -> &str {
        &self.proof.nullifier_hash
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementReceipt {
    pub swap_id: Uuid,
    pub transaction_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_transaction_id: Option<String>,
    pub token_in: Address,
    pub token_out: Address,
    pub amount_in: U256,
    pub expected_amount_out: U256,
    pub minimum_amount_out: U256,
    pub settled_at: DateTime<Utc>,
}

pub struct SwapProtocol {
    slot: HostSlot,
    sessions: Arc<SessionManager>,
    tokens: TokenResolver,
    oracle: Arc<dyn PriceOracle>,
    chain: Arc<dyn ChainReader>,
    config: SwapConfig,
    last_quote: Mutex<Option<SwapQuote>>,
    events: EventBus,
}

impl SwapProtocol {
    pub fn new(
        slot: HostSlot,
        sessions: Arc<SessionManager>,
        tokens: TokenResolver,
        oracle: Arc<dyn PriceOracle>,
        chain: Arc<dyn ChainReader>,
        config: SwapConfig,
        events: EventBus,
    ) -> Self {
        Self {
            slot,
            sessions,
            tokens,
            oracle,
            chain,
            config,
            last_quote: Mutex::new(None),
            events,
        }
    }

    pub fn config(&self) -> &SwapConfig {
        &self.config
    }

    pub fn tokens(&self) -> &TokenResolver {
        &self.tokens
    }

    /// Quote at the configured default slippage.
    pub async fn quote(&self, request: &SwapRequest) -> Result<SwapQuote> {
        self.quote_with_slippage(request, self.config.default_slippage_bps)
            .await
    }

    pub async fn quote_with_slippage(
        &self,
        request: &SwapRequest,
        slippage_bps: u32,
    ) -> Result<SwapQuote> {
        request.validate()?;
        let key = request.key();

        {
            let mut cached = self.last_quote.lock();
            if let Some(quote) = cached.as_ref().filter(|q| q.is_valid_for(&key)) {
                let fresh = (Utc::now() - quote.quoted_at)
                    .to_std()
                    .is_ok_and(|age| age < self.config.quote_ttl);
                if fresh && quote.slippage_bps == slippage_bps {
                    return Ok(quote.clone());
                }
            }
            // Inputs changed: the old quote must never be served again
            if cached.as_ref().is_some_and(|q| !q.is_valid_for(&key)) {
                *cached = None;
            }
        }

        let token_in = self.tokens.resolve_address(request.token_in).await?;
        let token_out = self.tokens.resolve_address(request.token_out).await?;
        let quote = self
            .compute_quote(request, &token_in, &token_out, slippage_bps)
            .await?;

        *self.last_quote.lock() = Some(quote.clone());
        Ok(quote)
    }

    async fn compute_quote(
        &self,
        request: &SwapRequest,
        token_in: &TokenDescriptor,
        token_out: &TokenDescriptor,
        slippage_bps: u32,
    ) -> Result<SwapQuote> {
        let rate = self.oracle.rate(token_in, token_out).await?;
        let amount_out =
            quote::compute_amount_out(request.amount_in, rate, token_in.decimals, token_out.decimals)?;
        if amount_out.is_zero() {
            return Err(QuestError::LiquidityInsufficient(format!(
                "{} {} quotes to zero {}",
                units::format_units(request.amount_in, token_in.decimals),
                token_in.symbol,
                token_out.symbol
            )));
        }
        let minimum_amount_out = quote::minimum_amount_out(amount_out, slippage_bps)?;

        let table = self.tokens.table();
        let quote = SwapQuote {
            token_in: request.token_in,
            token_out: request.token_out,
            amount_in: request.amount_in,
            amount_out,
            minimum_amount_out,
            slippage_bps,
            price_impact_bps: self.config.price_impact_bps,
            gas_estimate: self.config.gas_estimate,
            path: vec![
                table.routing_address(request.token_in),
                table.routing_address(request.token_out),
            ],
            quoted_at: Utc::now(),
        };

        tracing::debug!(
            "[swap] Quote {} {} -> {} {} (min {}, rate {})",
            units::format_units(quote.amount_in, token_in.decimals),
            token_in.symbol,
            units::format_units(quote.amount_out, token_out.decimals),
            token_out.symbol,
            units::format_units(quote.minimum_amount_out, token_out.decimals),
            rate
        );
        Ok(quote)
    }

    /// Resolve symbols, parse the amount and quote. The returned request's
    /// minimum output is the quote's minimum.
    pub async fn prepare(
        &self,
        from: &str,
        to: &str,
        amount: &str,
        slippage_bps: Option<u32>,
    ) -> Result<PreparedSwap> {
        let token_in = self.tokens.resolve(from).await?;
        let token_out = self.tokens.resolve(to).await?;
        let amount_in = units::parse_units(amount, token_in.decimals)?;

        let mut request = SwapRequest {
            token_in: token_in.address,
            token_out: token_out.address,
            amount_in,
            amount_out_minimum: U256::ZERO,
            fee: self.config.fee_tier,
            recipient: None,
        };
        let quote = self
            .quote_with_slippage(
                &request,
                slippage_bps.unwrap_or(self.config.default_slippage_bps),
            )
            .await?;
        request.amount_out_minimum = quote.minimum_amount_out;

        Ok(PreparedSwap {
            request,
            quote,
            token_in,
            token_out,
        })
    }

    /// Prove, then settle.
    pub async fn execute(&self, request: &SwapRequest) -> Result<SettlementReceipt> {
        let session = self
            .sessions
            .session()
            .ok_or_else(|| QuestError::NotConnected("sign in before swapping".to_string()))?;
        request.validate()?;

        let quote = self.quote(request).await?;
        if request.amount_out_minimum > quote.amount_out {
            return Err(QuestError::SlippageExceeded(format!(
                "requested minimum {} exceeds quoted output {}",
                request.amount_out_minimum, quote.amount_out
            )));
        }

        let swap_id = Uuid::new_v4();
        tracing::info!(
            "[swap] {} starting: {} of {} -> {}",
            swap_id,
            request.amount_in,
            request.token_in,
            request.token_out
        );

        let result = match self.prove(swap_id, request, quote, session.address).await {
            Ok(proven) => self.settle(proven).await,
            Err(e) => Err(e),
        };

        if let Err(e) = &result {
            tracing::warn!("[swap] {} failed ({}): {}", swap_id, e.kind(), e);
            self.phase(swap_id, SwapPhase::Failed);
        }
        result
    }

    fn host(&self) -> Result<Arc<dyn HostSdk>> {
        self.slot
            .current()
            .ok_or_else(|| QuestError::HostUnavailable("no wallet host registered".to_string()))
    }

    fn phase(&self, swap_id: Uuid, phase: SwapPhase) {
        self.events.emit(QuestEvent::SwapPhase { swap_id, phase });
    }

    async fn prove(
        &self,
        swap_id: Uuid,
        request: &SwapRequest,
        quote: SwapQuote,
        requester: Address,
    ) -> Result<ProvenSwap> {
        let host = self.host()?;
        self.phase(swap_id, SwapPhase::Proving);

        let attestation = SwapAttestation {
            swap_id,
            token_in: request.token_in,
            token_out: request.token_out,
            amount_in: request.amount_in,
            expected_amount_out: quote.amount_out,
            timestamp: Utc::now().timestamp_millis(),
            requester,
        };
        let signal = serde_json::to_string(&attestation)
            .map_err(|e| QuestError::ProofFailed(format!("failed to encode attestation: {}", e)))?;
        let proof_request = ProofRequest {
            action: format!("swap-{}", swap_id),
            signal,
        };

        let reply = with_deadline("swap proof", self.config.call_timeout, async {
            Ok(host.request_proof(proof_request).await)
        })
        .await?;

        let proof = match reply {
            HostReply::Success(proof) => proof,
            HostReply::Error { code, message } => {
                return Err(host_error(&code, message.as_deref(), ErrorKind::ProofFailed));
            }
            HostReply::Unexpected(status) => {
                return Err(QuestError::ProofFailed(format!(
                    "unexpected proof status '{}'",
                    status
                )));
            }
        };

        tracing::info!(
            "[swap] {} proven ({})",
            swap_id,
            proof.verification_level
        );
        self.phase(swap_id, SwapPhase::Proven);
        self.sessions.mark_verified();

        Ok(ProvenSwap {
            swap_id,
            request: request.clone(),
            requester,
            quote,
            proof,
        })
    }

    async fn settle(&self, proven: ProvenSwap) -> Result<SettlementReceipt> {
        let host = self.host()?;
        let request = &proven.request;
        let table = self.tokens.table();
        let native_in = request.token_in == tokens::NATIVE;

        let mut approval_transaction_id = None;
        if !native_in && self.needs_approval(request, proven.requester).await {
            self.phase(proven.swap_id, SwapPhase::Approving);
            let approve = TransactionCall {
                address: request.token_in,
                function_name: "approve".to_string(),
                args: json!([self.config.router, request.amount_in.to_string()]),
                value: U256::ZERO,
                proof_reference: Some(proven.proof_reference().to_string()),
            };
            let txid = self
                .submit(&host, approve, "swap approval", ErrorKind::AllowanceRequired)
                .await?;
            tracing::info!("[swap] {} approval submitted: {}", proven.swap_id, txid);
            approval_transaction_id = Some(txid);
        }

        self.phase(proven.swap_id, SwapPhase::Settling);
        let deadline = i64::try_from(self.config.deadline_secs)
            .ok()
            .and_then(|secs| Utc::now().timestamp().checked_add(secs))
            .ok_or_else(|| {
                QuestError::InvalidInput(format!(
                    "settlement deadline of {}s is out of range",
                    self.config.deadline_secs
                ))
            })?;
        let recipient = request.recipient.unwrap_or(proven.requester);
        let settle = TransactionCall {
            address: self.config.router,
            function_name: "exactInputSingle".to_string(),
            args: json!([{
                "tokenIn": table.routing_address(request.token_in),
                "tokenOut": table.routing_address(request.token_out),
                "fee": request.fee,
                "recipient": recipient,
                "deadline": deadline.to_string(),
                "amountIn": request.amount_in.to_string(),
                "amountOutMinimum": request.amount_out_minimum.to_string(),
                "sqrtPriceLimitX96": "0",
            }]),
            value: if native_in { request.amount_in } else { U256::ZERO },
            proof_reference: Some(proven.proof_reference().to_string()),
        };
        let transaction_id = self
            .submit(&host, settle, "swap settlement", ErrorKind::Unknown)
            .await?;

        tracing::info!("[swap] {} settled: {}", proven.swap_id, transaction_id);
        self.phase(proven.swap_id, SwapPhase::Settled);

        Ok(SettlementReceipt {
            swap_id: proven.swap_id,
            transaction_id,
            approval_transaction_id,
            token_in: request.token_in,
            token_out: request.token_out,
            amount_in: request.amount_in,
            expected_amount_out: proven.quote.amount_out,
            minimum_amount_out: request.amount_out_minimum,
            settled_at: Utc::now(),
        })
    }

    /// Read the router allowance. An unreadable allowance counts as short.
    async fn needs_approval(&self, request: &SwapRequest, owner: Address) -> bool {
        match self
            .chain
            .allowance(request.token_in, owner, self.config.router)
            .await
        {
            Ok(allowance) => allowance < request.amount_in,
            Err(e) => {
                tracing::warn!("[swap] Allowance check failed ({}), approving", e);
                true
            }
        }
    }

    async fn submit(
        &self,
        host: &Arc<dyn HostSdk>,
        call: TransactionCall,
        operation: &str,
        fallback: ErrorKind,
    ) -> Result<String> {
        let reply = with_deadline(operation, self.config.call_timeout, async {
            Ok(host.submit_transaction(call).await)
        })
        .await?;

        match reply {
            HostReply::Success(payload) => Ok(payload.transaction_id),
            HostReply::Error { code, message } => {
                Err(host_error(&code, message.as_deref(), fallback))
            }
            HostReply::Unexpected(status) => Err(QuestError::from_kind(
                fallback,
                format!("unexpected transaction status '{}'", status),
            )),
        }
    }
}

impl std::fmt::Debug for SwapProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwapProtocol")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
