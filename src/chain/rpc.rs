use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use url::Url;

use super::{abi, selectors, ChainError, ChainReader, TokenMetadata};

/// `eth_call` reader over JSON-RPC.
pub struct JsonRpcChain {
    http_client: reqwest::Client,
    rpc_url: Url,
    next_id: AtomicU64,
}

#[derive(Deserialize)]
struct RpcResponse {
    result: Option<String>,
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

impl JsonRpcChain {
    pub fn new(rpc_url: &str, timeout: Duration) -> Result<Self, ChainError> {
        let rpc_url = Url::parse(rpc_url)?;
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ChainError::Http)?;

        Ok(Self {
            http_client,
            rpc_url,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn rpc_url(&self) -> &Url {
        &self.rpc_url
    }

    async fn eth_call(&self, to: Address, data: String) -> Result<Vec<u8>, ChainError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "eth_call",
            "params": [{ "to": to, "data": data }, "latest"],
        });

        let response: RpcResponse = self
            .http_client
            .post(self.rpc_url.clone())
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(error) = response.error {
            return Err(ChainError::Rpc {
                code: error.code,
                message: error.message,
            });
        }

        let result = response
            .result
            .ok_or_else(|| ChainError::Decode("response has neither result nor error".to_string()))?;
        let bytes = abi::decode_hex(&result)?;
        if bytes.is_empty() {
            // Calls to accounts without code return empty data
            return Err(ChainError::Decode(format!("empty result from {}", to)));
        }
        Ok(bytes)
    }
}

#[async_trait]
impl ChainReader for JsonRpcChain {
    async fn token_metadata(&self, token: Address) -> Result<TokenMetadata, ChainError> {
        let (symbol, decimals) = futures::try_join!(
            self.eth_call(token, abi::encode_call(selectors::SYMBOL, &[])),
            self.eth_call(token, abi::encode_call(selectors::DECIMALS, &[])),
        )?;

        Ok(TokenMetadata {
            symbol: abi::decode_string(&symbol)?,
            decimals: abi::decode_u8(&decimals)?,
        })
    }

    async fn allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> Result<U256, ChainError> {
        let data = abi::encode_call(selectors::ALLOWANCE, &[owner, spender]);
        let result = self.eth_call(token, data).await?;
        abi::decode_uint(&result)
    }
}

impl std::fmt::Debug for JsonRpcChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonRpcChain")
            .field("rpc_url", &self.rpc_url.as_str())
            .finish()
    }
}
