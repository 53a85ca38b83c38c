//! Token metadata resolution.
//!
//! Metadata comes from the chain when it answers and from a static table of
//! known World Chain assets when it does not. The native asset is the zero
//! address; it never reaches the router and is swapped for its wrapped form at
//! that boundary.

use std::collections::HashMap;
use std::sync::Arc;

use alloy_primitives::{address, Address};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::chain::ChainReader;
use crate::error::{QuestError, Result};

use super::units::MAX_DECIMALS;

pub const NATIVE: Address = Address::ZERO;
pub const WETH: Address = address!("4200000000000000000000000000000000000006");
pub const WLD: Address = address!("163f8C2467924be0ae7B5347228CABF260318753");
pub const USDC: Address = address!("79A02482A880bCE3F13e09Da970dC34db4CD24d1");
pub const ROUTER: Address = address!("68b3465833fb72A70ecDF485E0e4C7bD8665Fc45");

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenDescriptor {
    pub symbol: String,
    pub decimals: u8,
    pub address: Address,
}

impl TokenDescriptor {
    pub fn new(symbol: &str, decimals: u8, address: Address) -> Self {
        Self {
            symbol: symbol.to_string(),
            decimals,
            address,
        }
    }

    pub fn is_native(&self) -> bool {
        self.address == NATIVE
    }
}

/// Known assets, looked up by symbol or address.
#[derive(Debug, Clone)]
pub struct TokenTable {
    tokens: Vec<TokenDescriptor>,
    wrapped_native: Address,
}

impl TokenTable {
    pub fn world_chain() -> Self {
        Self::with_wrapped_native(WETH)
    }

    pub fn with_wrapped_native(wrapped_native: Address) -> Self {
        Self {
            tokens: vec![
                TokenDescriptor::new("ETH", 18, NATIVE),
                TokenDescriptor::new("WETH", 18, wrapped_native),
                TokenDescriptor::new("WLD", 18, WLD),
                TokenDescriptor::new("USDC", 6, USDC),
            ],
            wrapped_native,
        }
    }

    pub fn by_symbol(&self, symbol: &str) -> Option<&TokenDescriptor> {
        self.tokens
            .iter()
            .find(|t| t.symbol.eq_ignore_ascii_case(symbol))
    }

    pub fn by_address(&self, address: Address) -> Option<&TokenDescriptor> {
        self.tokens.iter().find(|t| t.address == address)
    }

    pub fn native(&self) -> TokenDescriptor {
        TokenDescriptor::new("ETH", 18, NATIVE)
    }

    /// Address the router sees for `token`.
    pub fn routing_address(&self, token: Address) -> Address {
        if token == NATIVE {
            self.wrapped_native
        } else {
            token
        }
    }
}

impl Default for TokenTable {
    fn default() -> Self {
        Self::world_chain()
    }
}

pub struct TokenResolver {
    chain: Arc<dyn ChainReader>,
    table: TokenTable,
    /// Only chain-confirmed descriptors are cached
    resolved: RwLock<HashMap<Address, TokenDescriptor>>,
}

impl TokenResolver {
    pub fn new(chain: Arc<dyn ChainReader>, table: TokenTable) -> Self {
        Self {
            chain,
            table,
            resolved: RwLock::new(HashMap::new()),
        }
    }

    pub fn table(&self) -> &TokenTable {
        &self.table
    }

    /// Resolve a symbol (`"WLD"`) or a hex address.
    pub async fn resolve(&self, token: &str) -> Result<TokenDescriptor> {
        let token = token.trim();
        if token.starts_with("0x") {
            let address: Address = token
                .parse()
                .map_err(|e| QuestError::InvalidInput(format!("bad token address '{}': {}", token, e)))?;
            return self.resolve_address(address).await;
        }

        let known = self
            .table
            .by_symbol(token)
            .ok_or_else(|| QuestError::InvalidInput(format!("unsupported token '{}'", token)))?;
        self.resolve_address(known.address).await
    }

    /// Resolve an address. Unknown tokens whose metadata call fails come back
    /// as `UNKNOWN` with 18 decimals. A token reporting more decimals than a
    /// `U256` amount can scale is refused.
    pub async fn resolve_address(&self, address: Address) -> Result<TokenDescriptor> {
        if address == NATIVE {
            return Ok(self.table.native());
        }
        if let Some(hit) = self.resolved.read().get(&address) {
            return Ok(hit.clone());
        }

        let descriptor = match self.chain.token_metadata(address).await {
            Ok(meta) if meta.decimals > MAX_DECIMALS => {
                tracing::warn!(
                    "[swap] Token {} reports {} decimals, refusing to quote it",
                    address,
                    meta.decimals
                );
                return Err(QuestError::QuoteUnavailable(format!(
                    "token {} reports unsupported decimals {}",
                    address, meta.decimals
                )));
            }
            Ok(meta) => {
                let descriptor = TokenDescriptor {
                    symbol: meta.symbol,
                    decimals: meta.decimals,
                    address,
                };
                self.resolved.write().insert(address, descriptor.clone());
                descriptor
            }
            Err(e) => match self.table.by_address(address) {
                Some(known) => {
                    tracing::debug!(
                        "[swap] Metadata call for {} failed ({}), using known {}",
                        address,
                        e,
                        known.symbol
                    );
                    known.clone()
                }
                None => {
                    tracing::warn!("[swap] Metadata call for {} failed: {}", address, e);
                    TokenDescriptor::new("UNKNOWN", 18, address)
                }
            },
        };
        Ok(descriptor)
    }
}
