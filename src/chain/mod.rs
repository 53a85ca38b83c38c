//! Read-only chain access: ERC-20 metadata and allowances.

mod memory;
mod rpc;

pub use memory::MemoryChain;
pub use rpc::JsonRpcChain;

use alloy_primitives::{hex, Address, U256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("RPC request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Failed to decode call result: {0}")]
    Decode(String),

    #[error("Invalid RPC URL: {0}")]
    Url(#[from] url::ParseError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMetadata {
    pub symbol: String,
    pub decimals: u8,
}

#[async_trait]
pub trait ChainReader: Send + Sync {
    /// ERC-20 `symbol()` and `decimals()`.
    async fn token_metadata(&self, token: Address) -> Result<TokenMetadata, ChainError>;

    /// ERC-20 `allowance(owner, spender)`.
    async fn allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> Result<U256, ChainError>;
}

/// Function selectors for the calls this crate makes.
pub(crate) mod selectors {
    pub const SYMBOL: [u8; 4] = [0x95, 0xd8, 0x9b, 0x41];
    pub const DECIMALS: [u8; 4] = [0x31, 0x3c, 0xe5, 0x67];
    pub const ALLOWANCE: [u8; 4] = [0xdd, 0x62, 0xed, 0x3e];
}

/// Minimal ABI encoding and decoding for static calls.
pub(crate) mod abi {
    use super::*;

    const WORD: usize = 32;

    pub fn encode_call(selector: [u8; 4], args: &[Address]) -> String {
        let mut data = Vec::with_capacity(4 + args.len() * WORD);
        data.extend_from_slice(&selector);
        for arg in args {
            data.extend_from_slice(&[0u8; 12]);
            data.extend_from_slice(arg.as_slice());
        }
        hex::encode_prefixed(data)
    }

    pub fn decode_hex(raw: &str) -> Result<Vec<u8>, ChainError> {
        hex::decode(raw).map_err(|e| ChainError::Decode(format!("bad hex: {}", e)))
    }

    pub fn decode_uint(data: &[u8]) -> Result<U256, ChainError> {
        if data.len() < WORD {
            return Err(ChainError::Decode(format!(
                "expected a 32-byte word, got {} bytes",
                data.len()
            )));
        }
        Ok(U256::from_be_slice(&data[..WORD]))
    }

    pub fn decode_u8(data: &[u8]) -> Result<u8, ChainError> {
        let value = decode_uint(data)?;
        u8::try_from(value).map_err(|_| ChainError::Decode(format!("{} does not fit uint8", value)))
    }

    /// Dynamic `string`, or a right-padded `bytes32` for tokens that predate
    /// the standard.
    pub fn decode_string(data: &[u8]) -> Result<String, ChainError> {
        if data.len() == WORD {
            let end = data.iter().position(|b| *b == 0).unwrap_or(WORD);
            return String::from_utf8(data[..end].to_vec())
                .map_err(|e| ChainError::Decode(e.to_string()));
        }

        let offset = word_to_usize(data, 0)?;
        let len = word_to_usize(data, offset)?;
        let start = offset + WORD;
        let bytes = data
            .get(start..start + len)
            .ok_or_else(|| ChainError::Decode("string runs past end of data".to_string()))?;
        String::from_utf8(bytes.to_vec()).map_err(|e| ChainError::Decode(e.to_string()))
    }

    fn word_to_usize(data: &[u8], at: usize) -> Result<usize, ChainError> {
        let word = data
            .get(at..at + WORD)
            .ok_or_else(|| ChainError::Decode(format!("no word at offset {}", at)))?;
        usize::try_from(U256::from_be_slice(word))
            .map_err(|_| ChainError::Decode("offset out of range".to_string()))
    }
}
