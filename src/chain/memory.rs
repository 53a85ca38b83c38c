//! In-process chain state for headless runs and tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use parking_lot::Mutex;

use super::{ChainError, ChainReader, TokenMetadata};

#[derive(Default)]
pub struct MemoryChain {
    tokens: Mutex<HashMap<Address, TokenMetadata>>,
    allowances: Mutex<HashMap<(Address, Address, Address), U256>>,
    offline: AtomicBool,
    metadata_calls: AtomicUsize,
}

impl MemoryChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(self, address: Address, symbol: &str, decimals: u8) -> Self {
        self.tokens.lock().insert(
            address,
            TokenMetadata {
                symbol: symbol.to_string(),
                decimals,
            },
        );
        self
    }

    pub fn set_allowance(&self, token: Address, owner: Address, spender: Address, amount: U256) {
        self.allowances
            .lock()
            .insert((token, owner, spender), amount);
    }

    /// Every read fails as if the RPC endpoint were unreachable.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn metadata_calls(&self) -> usize {
        self.metadata_calls.load(Ordering::SeqCst)
    }

    fn check_online(&self) -> Result<(), ChainError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(ChainError::Rpc {
                code: -32603,
                message: "network unreachable".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ChainReader for MemoryChain {
    async fn token_metadata(&self, token: Address) -> Result<TokenMetadata, ChainError> {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;
        self.tokens
            .lock()
            .get(&token)
            .cloned()
            .ok_or_else(|| ChainError::Decode(format!("empty result from {}", token)))
    }

    async fn allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> Result<U256, ChainError> {
        self.check_online()?;
        Ok(self
            .allowances
            .lock()
            .get(&(token, owner, spender))
            .copied()
            .unwrap_or(U256::ZERO))
    }
}
