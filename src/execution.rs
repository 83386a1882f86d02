use crate::error::Error;
use alloy_primitives::{B256, U256};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::json;
use std::time::Duration;
use url::Url;

const EXECUTION_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionHeader {
    #[serde(with = "crate::serde::quantity")]
    pub number: u64,
    #[serde(with = "crate::serde::quantity")]
    pub gas_used: u64,
    #[serde(with = "crate::serde::as_str")]
    pub base_fee_per_gas: U256,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub transaction_hash: B256,
    /// Gas used by this transaction alone.
    #[serde(with = "crate::serde::quantity")]
    pub gas_used: u64,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

/// Minimal JSON-RPC client for the execution node: header and receipt
/// lookups only.
#[derive(Clone)]
pub struct ExecutionClient {
    http: reqwest::Client,
    endpoint: Url,
}

impl ExecutionClient {
    pub fn new(endpoint: Url) -> Result<Self, Error> {
        let http = reqwest::Client::builder().timeout(EXECUTION_TIMEOUT).build()?;
        Ok(Self { http, endpoint })
    }

    pub async fn header_by_number(&self, number: u64) -> Result<ExecutionHeader, Error> {
        self.call("eth_getBlockByNumber", json!([format!("0x{number:x}"), false])).await
    }

    pub async fn transaction_receipt(&self, hash: B256) -> Result<TransactionReceipt, Error> {
        self.call("eth_getTransactionReceipt", json!([hash])).await
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T, Error> {
        let body = json!({ "jsonrpc": "2.0", "id": 1, "method": method, "params": params });
        let response = self.http.post(self.endpoint.clone()).json(&body).send().await?;
        if !response.status().is_success() {
            return Err(Error::Api { endpoint: method.to_string(), status: response.status() });
        }
        let response: RpcResponse<T> = response.json().await?;
        if let Some(error) = response.error {
            return Err(Error::Rpc { code: error.code, message: error.message });
        }
        response.result.ok_or(Error::MissingRpcResult)
    }
}
