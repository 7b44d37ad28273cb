//! # JSON-RPC Ledger
//!
//! [`RemoteLedger`] over an Ethereum-style JSON-RPC endpoint.
//!
//! ```text
//! call             ──▶ eth_call
//! send_transaction ──▶ eth_sendTransaction ──▶ eth_getTransactionReceipt (poll)
//!                                          ──▶ eth_getBlockByNumber (timestamp)
//! subscribe_logs   ──▶ eth_blockNumber + eth_getLogs (poll task) ──▶ LogStream
//! ```
//!
//! Signing is the node's job (`eth_sendTransaction`); a wallet-backed node
//! reports a declined prompt as error code 4001.

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{hex, Address, B256};
use alloy_sol_types::SolEvent;
use async_trait::async_trait;
use crossbeam_channel::{bounded, Sender, TrySendError};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, trace, warn};

use pixelwar_core::Timestamp;

use crate::contracts::IPixelBoard;
use crate::ledger::{LedgerError, LedgerResult, LogStream, RawLog, RemoteLedger, TxReceipt, TxStatus};

/// EIP-1193 "user rejected request".
const USER_REJECTED_CODE: i64 = 4001;

/// Geth "execution reverted".
const EXECUTION_REVERTED_CODE: i64 = 3;

/// Capacity of the log channel handed to subscribers.
const LOG_CHANNEL_CAPACITY: usize = 256;

/// Poll intervals for the RPC ledger.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollIntervals {
    /// Between receipt lookups while a transaction is pending.
    pub receipt: Duration,
    /// Between `eth_getLogs` sweeps for a live subscription.
    pub logs: Duration,
}

impl Default for PollIntervals {
    fn default() -> Self {
        Self {
            receipt: Duration::from_millis(1_000),
            logs: Duration::from_millis(2_000),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

struct RpcInner {
    client: reqwest::Client,
    url: String,
    next_id: AtomicU64,
    intervals: PollIntervals,
}

/// JSON-RPC transport. Clones share one HTTP client.
#[derive(Clone)]
pub struct RpcLedger {
    inner: Arc<RpcInner>,
}

impl RpcLedger {
    /// Creates a ledger talking to `url` with default poll intervals.
    ///
    /// # Errors
    ///
    /// `Unavailable` if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>) -> LedgerResult<Self> {
        Self::with_intervals(url, PollIntervals::default())
    }

    /// Creates a ledger with explicit poll intervals.
    ///
    /// # Errors
    ///
    /// `Unavailable` if the HTTP client cannot be built.
    pub fn with_intervals(url: impl Into<String>, intervals: PollIntervals) -> LedgerResult<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| LedgerError::Unavailable(e.to_string()))?;
        Ok(Self {
            inner: Arc::new(RpcInner {
                client,
                url: url.into(),
                next_id: AtomicU64::new(1),
                intervals,
            }),
        })
    }

    /// Endpoint URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.inner.url
    }

    async fn request(&self, method: &str, params: Value) -> LedgerResult<Value> {
        self.inner.request(method, params).await
    }

    async fn receipt(&self, tx_hash: B256) -> LedgerResult<TxReceipt> {
        let hash = hex::encode_prefixed(tx_hash);
        loop {
            let value = self
                .request("eth_getTransactionReceipt", json!([hash]))
                .await?;
            if !value.is_null() {
                let block_number = parse_quantity(&value["blockNumber"])?;
                let status = match value["status"].as_str() {
                    Some("0x1") => TxStatus::Success,
                    _ => TxStatus::Reverted("transaction reverted".to_string()),
                };
                let timestamp = self.block_timestamp(block_number).await;
                return Ok(TxReceipt {
                    tx_hash,
                    block_number,
                    status,
                    timestamp,
                });
            }
            trace!(%tx_hash, "receipt not yet available");
            tokio::time::sleep(self.inner.intervals.receipt).await;
        }
    }

    /// Best effort: a missing timestamp only loses `last_changed_at`.
    async fn block_timestamp(&self, block_number: u64) -> Option<Timestamp> {
        let block = self
            .request(
                "eth_getBlockByNumber",
                json!([quantity(block_number), false]),
            )
            .await
            .ok()?;
        parse_quantity(&block["timestamp"])
            .ok()
            .map(Timestamp::from_secs)
    }
}

impl RpcInner {
    async fn request(&self, method: &str, params: Value) -> LedgerResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        debug!(method, id, "rpc request");

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(LedgerError::Unavailable(format!("{method}: http {status}")));
        }

        let reply: RpcResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                LedgerError::Timeout
            } else {
                LedgerError::Decode(e.to_string())
            }
        })?;

        if let Some(error) = reply.error {
            return Err(map_rpc_error(error.code, &error.message, error.data.as_ref()));
        }
        Ok(reply.result.unwrap_or(Value::Null))
    }
}

#[async_trait]
impl RemoteLedger for RpcLedger {
    async fn call(&self, to: Address, data: Vec<u8>) -> LedgerResult<Vec<u8>> {
        let value = self
            .request(
                "eth_call",
                json!([{ "to": to.to_string(), "data": hex::encode_prefixed(&data) }, "latest"]),
            )
            .await?;
        parse_hex_bytes(&value)
    }

    async fn send_transaction(
        &self,
        from: Address,
        to: Address,
        data: Vec<u8>,
    ) -> LedgerResult<TxReceipt> {
        let value = self
            .request(
                "eth_sendTransaction",
                json!([{
                    "from": from.to_string(),
                    "to": to.to_string(),
                    "data": hex::encode_prefixed(&data),
                }]),
            )
            .await?;
        let tx_hash = value
            .as_str()
            .and_then(|s| B256::from_str(s).ok())
            .ok_or_else(|| LedgerError::Decode(format!("bad transaction hash: {value}")))?;
        debug!(%tx_hash, "transaction sent");
        self.receipt(tx_hash).await
    }

    fn subscribe_logs(&self, contract: Address) -> Option<LogStream> {
        // Polling needs a runtime to live on.
        let handle = tokio::runtime::Handle::try_current().ok()?;
        let (sender, receiver) = bounded(LOG_CHANNEL_CAPACITY);
        let active = Arc::new(AtomicBool::new(true));

        let inner = Arc::clone(&self.inner);
        let task_active = Arc::clone(&active);
        handle.spawn(async move {
            poll_logs(inner, contract, sender, task_active).await;
        });

        Some(LogStream::new(receiver, active))
    }
}

async fn poll_logs(
    inner: Arc<RpcInner>,
    contract: Address,
    sender: Sender<RawLog>,
    active: Arc<AtomicBool>,
) {
    let topic = hex::encode_prefixed(IPixelBoard::PixelUpdated::SIGNATURE_HASH);
    let mut from_block: Option<u64> = None;

    while active.load(Ordering::Relaxed) {
        let head = match inner
            .request("eth_blockNumber", json!([]))
            .await
            .and_then(|v| parse_quantity(&v))
        {
            Ok(head) => head,
            Err(error) => {
                warn!(%error, "log poll: block number unavailable");
                tokio::time::sleep(inner.intervals.logs).await;
                continue;
            }
        };

        // Only changes after the subscription started are forwarded.
        let start = *from_block.get_or_insert(head.saturating_add(1));
        if head >= start {
            let filter = json!([{
                "address": contract.to_string(),
                "fromBlock": quantity(start),
                "toBlock": quantity(head),
                "topics": [topic],
            }]);
            match inner.request("eth_getLogs", filter).await {
                Ok(Value::Array(entries)) => {
                    for entry in &entries {
                        match parse_log(entry) {
                            Ok(log) => match sender.try_send(log) {
                                Ok(()) => {}
                                Err(TrySendError::Full(_)) => {
                                    warn!("log channel full, dropping change");
                                }
                                Err(TrySendError::Disconnected(_)) => return,
                            },
                            Err(error) => warn!(%error, "skipping malformed log"),
                        }
                    }
                    from_block = Some(head + 1);
                }
                Ok(other) => warn!(%other, "eth_getLogs returned a non-array"),
                Err(error) => warn!(%error, "log poll failed"),
            }
        }

        tokio::time::sleep(inner.intervals.logs).await;
    }
    debug!("log poll stopped");
}

fn transport_error(error: reqwest::Error) -> LedgerError {
    if error.is_timeout() {
        LedgerError::Timeout
    } else {
        LedgerError::Unavailable(error.to_string())
    }
}

/// Maps a JSON-RPC error object onto a transport error.
fn map_rpc_error(code: i64, message: &str, data: Option<&Value>) -> LedgerError {
    if code == USER_REJECTED_CODE {
        return LedgerError::UserRejected;
    }
    if code == EXECUTION_REVERTED_CODE || message.to_ascii_lowercase().contains("revert") {
        let reason = match data.and_then(Value::as_str) {
            Some(data) if !data.is_empty() => format!("{message} ({data})"),
            _ => message.to_string(),
        };
        return LedgerError::Reverted(reason);
    }
    LedgerError::Rpc {
        code,
        message: message.to_string(),
    }
}

fn quantity(n: u64) -> String {
    format!("{n:#x}")
}

fn parse_quantity(value: &Value) -> LedgerResult<u64> {
    let text = value
        .as_str()
        .ok_or_else(|| LedgerError::Decode(format!("expected quantity, got {value}")))?;
    let digits = text.strip_prefix("0x").unwrap_or(text);
    u64::from_str_radix(digits, 16).map_err(|e| LedgerError::Decode(format!("{text}: {e}")))
}

fn parse_hex_bytes(value: &Value) -> LedgerResult<Vec<u8>> {
    let text = value
        .as_str()
        .ok_or_else(|| LedgerError::Decode(format!("expected hex data, got {value}")))?;
    hex::decode(text).map_err(|e| LedgerError::Decode(format!("{text}: {e}")))
}

fn parse_word(value: &Value) -> LedgerResult<[u8; 32]> {
    let bytes = parse_hex_bytes(value)?;
    <[u8; 32]>::try_from(bytes.as_slice())
        .map_err(|_| LedgerError::Decode(format!("topic is {} bytes", bytes.len())))
}

fn parse_log(value: &Value) -> LedgerResult<RawLog> {
    let address = value["address"]
        .as_str()
        .and_then(|s| Address::from_str(s).ok())
        .ok_or_else(|| LedgerError::Decode("log without address".to_string()))?;
    let topics = value["topics"]
        .as_array()
        .ok_or_else(|| LedgerError::Decode("log without topics".to_string()))?
        .iter()
        .map(parse_word)
        .collect::<LedgerResult<Vec<_>>>()?;
    Ok(RawLog {
        address,
        topics,
        data: parse_hex_bytes(&value["data"])?,
        block_number: parse_quantity(&value["blockNumber"])?,
    })
}
