//! HTTP JSON-RPC node client backed by `reqwest`.
//!
//! Implements the core's [`ChainClient`] seam with the two queries the
//! scanner needs: `eth_getLogs` over an address/topic filter and
//! `eth_blockNumber`. Failures are reported as transient
//! [`ScanError::Rpc`] values; retry and failover live one level up in
//! the connection manager.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use poolscan_core::{ChainClient, LogFilter, RawLogEvent, ScanError, ScanRange};

use crate::request::{JsonRpcRequest, JsonRpcResponse};

/// A JSON-RPC client bound to a single endpoint URL.
pub struct EthRpcClient {
    url: String,
    http: reqwest::Client,
    next_id: AtomicU64,
}

impl EthRpcClient {
    /// Build a client for `url`. Fails only if the TLS backend cannot
    /// be initialised.
    pub fn new(url: impl Into<String>, request_timeout: Duration) -> Result<Self, ScanError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ScanError::Rpc(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            url: url.into(),
            http,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, ScanError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let req = JsonRpcRequest::new(id, method, params);

        let resp = self
            .http
            .post(&self.url)
            .json(&req)
            .send()
            .await
            .map_err(|e| ScanError::Rpc(format!("{method}: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            return Err(ScanError::Rpc(format!("{method}: HTTP {status}")));
        }

        let resp: JsonRpcResponse = resp
            .json()
            .await
            .map_err(|e| ScanError::Rpc(format!("{method}: malformed response: {e}")))?;
        resp.into_result()
            .map_err(|e| ScanError::Rpc(format!("{method}: {e}")))
    }
}

#[async_trait]
impl ChainClient for EthRpcClient {
    async fn logs(
        &self,
        range: &ScanRange,
        filter: &LogFilter,
    ) -> Result<Vec<RawLogEvent>, ScanError> {
        let result = self.call("eth_getLogs", vec![logs_params(range, filter)]).await?;
        let wire: Vec<WireLog> = serde_json::from_value(result)
            .map_err(|e| ScanError::Rpc(format!("eth_getLogs: malformed log entry: {e}")))?;
        wire.into_iter()
            .filter(|log| !log.removed.unwrap_or(false))
            .map(WireLog::into_event)
            .collect()
    }

    async fn head_number(&self) -> Result<u64, ScanError> {
        let result = self.call("eth_blockNumber", vec![]).await?;
        let hex = result
            .as_str()
            .ok_or_else(|| ScanError::Rpc("eth_blockNumber: non-string result".into()))?;
        parse_hex_u64(hex)
    }
}

/// Build the `eth_getLogs` filter object. The wire protocol takes an
/// inclusive `toBlock`, so the half-open range ends at `last_block`.
fn logs_params(range: &ScanRange, filter: &LogFilter) -> Value {
    json!({
        "fromBlock": format!("0x{:x}", range.start),
        "toBlock": format!("0x{:x}", range.last_block()),
        "address": filter.addresses,
        "topics": [filter.topic0_values],
    })
}

/// An `eth_getLogs` entry as it appears on the wire.
#[derive(Debug, Deserialize)]
struct WireLog {
    address: String,
    topics: Vec<String>,
    data: String,
    #[serde(rename = "blockNumber")]
    block_number: String,
    #[serde(rename = "transactionHash")]
    tx_hash: String,
    #[serde(rename = "logIndex")]
    log_index: String,
    removed: Option<bool>,
}

impl WireLog {
    fn into_event(self) -> Result<RawLogEvent, ScanError> {
        Ok(RawLogEvent {
            block_number: parse_hex_u64(&self.block_number)?,
            log_index: parse_hex_u64(&self.log_index)? as u32,
            address: self.address,
            topics: self.topics,
            data: self.data,
            tx_hash: self.tx_hash,
        })
    }
}

/// Parse a hex-encoded quantity (with or without `0x`) to u64.
fn parse_hex_u64(s: &str) -> Result<u64, ScanError> {
    let stripped = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(stripped, 16)
        .map_err(|e| ScanError::Rpc(format!("invalid hex quantity {s:?}: {e}")))
}
