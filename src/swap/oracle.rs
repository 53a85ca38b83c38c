//! Exchange-rate estimates.
//!
//! Rates are advisory: they size the quote and the slippage floor, nothing
//! more. The router enforces the floor on chain.

use std::collections::HashMap;

use alloy_primitives::U256;
use async_trait::async_trait;

use super::tokens::TokenDescriptor;
use super::units::{format_units, parse_units};
use crate::error::{QuestError, Result};

/// Units of output per unit of input, fixed point with 18 decimals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Rate(U256);

impl Rate {
    pub const DECIMALS: u8 = 18;

    pub fn from_fixed(raw: U256) -> Self {
        Self(raw)
    }

    pub fn parse(rate: &str) -> Result<Self> {
        Ok(Self(parse_units(rate, Self::DECIMALS)?))
    }

    pub fn fixed(&self) -> U256 {
        self.0
    }
}

impl std::fmt::Display for Rate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&format_units(self.0, Self::DECIMALS))
    }
}

#[async_trait]
pub trait PriceOracle: Send + Sync {
    async fn rate(&self, token_in: &TokenDescriptor, token_out: &TokenDescriptor) -> Result<Rate>;
}

/// Fixed table keyed by symbol pair.
#[derive(Debug, Clone)]
pub struct StaticRateTable {
    rates: HashMap<(String, String), Rate>,
}

impl StaticRateTable {
    pub fn empty() -> Self {
        Self {
            rates: HashMap::new(),
        }
    }

    pub fn with_rate(mut self, from: &str, to: &str, rate: &str) -> Result<Self> {
        self.rates
            .insert((from.to_uppercase(), to.to_uppercase()), Rate::parse(rate)?);
        Ok(self)
    }

    fn lookup(&self, from: &str, to: &str) -> Option<Rate> {
        self.rates
            .get(&(from.to_uppercase(), to.to_uppercase()))
            .copied()
    }
}

impl Default for StaticRateTable {
    fn default() -> Self {
        const DEFAULT_RATES: [(&str, &str, &str); 8] = [
            ("ETH", "WLD", "2000"),
            ("ETH", "USDC", "3000"),
            ("WLD", "ETH", "0.0005"),
            ("WLD", "USDC", "1.5"),
            ("USDC", "ETH", "0.00033"),
            ("USDC", "WLD", "0.67"),
            ("ETH", "WETH", "1"),
            ("WETH", "ETH", "1"),
        ];

        let mut rates = HashMap::new();
        for (from, to, rate) in DEFAULT_RATES {
            if let Ok(rate) = Rate::parse(rate) {
                rates.insert((from.to_string(), to.to_string()), rate);
            }
        }
        Self { rates }
    }
}

#[async_trait]
impl PriceOracle for StaticRateTable {
    async fn rate(&self, token_in: &TokenDescriptor, token_out: &TokenDescriptor) -> Result<Rate> {
        self.lookup(&token_in.symbol, &token_out.symbol)
            .ok_or_else(|| {
                QuestError::QuoteUnavailable(format!(
                    "no rate for {} -> {}",
                    token_in.symbol, token_out.symbol
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swap::tokens::{NATIVE, USDC, WLD};

    #[tokio::test]
    async fn test_default_rates() {
        let table = StaticRateTable::default();
        let eth = TokenDescriptor::new("ETH", 18, NATIVE);
        let wld = TokenDescriptor::new("WLD", 18, WLD);

        let rate = table.rate(&eth, &wld).await.unwrap();
        assert_eq!(rate.to_string(), "2000");
        assert_eq!(table.rate(&wld, &eth).await.unwrap().to_string(), "0.0005");
    }

    #[tokio::test]
    async fn test_unknown_pair_is_quote_unavailable() {
        let table = StaticRateTable::default();
        let usdc = TokenDescriptor::new("USDC", 6, USDC);
        let unknown = TokenDescriptor::new("UNKNOWN", 18, NATIVE);
        let err = table.rate(&usdc, &unknown).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::QuoteUnavailable);
    }

    #[test]
    fn test_with_rate_rejects_bad_rate() {
        assert!(StaticRateTable::empty().with_rate("A", "B", "abc").is_err());
        let table = StaticRateTable::empty().with_rate("a", "b", "2.5").unwrap();
        assert_eq!(table.lookup("A", "B").unwrap().to_string(), "2.5");
    }
}
