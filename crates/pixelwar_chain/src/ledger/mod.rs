//! # Remote Ledger Transport
//!
//! The seam between the gateway and whatever actually executes contract
//! calls: a JSON-RPC node ([`crate::rpc::RpcLedger`]) in production, the
//! in-memory [`crate::simulation::SimulatedLedger`] in tests.
//!
//! The transport moves raw ABI bytes only. Encoding, decoding, timeouts and
//! failure categorization live in the gateway.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use crossbeam_channel::Receiver;
use thiserror::Error;

use pixelwar_core::Timestamp;

/// Transport-level failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// The endpoint could not be reached.
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
    /// The transport gave up waiting.
    #[error("ledger request timed out")]
    Timeout,
    /// The account holder refused to sign.
    #[error("user rejected the request")]
    UserRejected,
    /// Execution reverted.
    #[error("execution reverted: {0}")]
    Reverted(String),
    /// Any other JSON-RPC error.
    #[error("rpc error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code.
        code: i64,
        /// Error message.
        message: String,
    },
    /// The response could not be decoded.
    #[error("malformed response: {0}")]
    Decode(String),
}

/// Result type for transport operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// A contract log as delivered by the transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawLog {
    /// Emitting contract.
    pub address: Address,
    /// Indexed topics, signature first.
    pub topics: Vec<[u8; 32]>,
    /// Non-indexed data.
    pub data: Vec<u8>,
    /// Block number.
    pub block_number: u64,
}

/// Final status of a mined transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TxStatus {
    /// Executed successfully.
    Success,
    /// Mined but reverted.
    Reverted(String),
}

/// Receipt of a mined transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxReceipt {
    /// Transaction hash.
    pub tx_hash: B256,
    /// Block it was mined in.
    pub block_number: u64,
    /// Outcome.
    pub status: TxStatus,
    /// Block timestamp, when the transport knows it.
    pub timestamp: Option<Timestamp>,
}

/// A live stream of contract logs.
///
/// Producers stop sending once the stream is closed or dropped.
pub struct LogStream {
    receiver: Receiver<RawLog>,
    active: Arc<AtomicBool>,
}

impl LogStream {
    /// Wraps a receiver and the flag its producer watches.
    #[must_use]
    pub fn new(receiver: Receiver<RawLog>, active: Arc<AtomicBool>) -> Self {
        Self { receiver, active }
    }

    /// The log receiver.
    #[must_use]
    pub fn receiver(&self) -> &Receiver<RawLog> {
        &self.receiver
    }

    /// Whether the producer is still expected to send.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }

    /// Tells the producer to stop.
    pub fn close(&self) {
        self.active.store(false, Ordering::SeqCst);
    }
}

impl Drop for LogStream {
    fn drop(&mut self) {
        self.close();
    }
}

/// Executes contract calls against a remote ledger.
#[async_trait]
pub trait RemoteLedger: Send + Sync {
    /// Read-only call (`eth_call`).
    async fn call(&self, to: Address, data: Vec<u8>) -> LedgerResult<Vec<u8>>;

    /// State-changing call attributed to `from`; resolves once mined.
    async fn send_transaction(
        &self,
        from: Address,
        to: Address,
        data: Vec<u8>,
    ) -> LedgerResult<TxReceipt>;

    /// Live logs emitted by `contract`, if the transport can push them.
    fn subscribe_logs(&self, contract: Address) -> Option<LogStream> {
        let _ = contract;
        None
    }
}

#[async_trait]
impl<T: RemoteLedger + ?Sized> RemoteLedger for Arc<T> {
    async fn call(&self, to: Address, data: Vec<u8>) -> LedgerResult<Vec<u8>> {
        (**self).call(to, data).await
    }

    async fn send_transaction(
        &self,
        from: Address,
        to: Address,
        data: Vec<u8>,
    ) -> LedgerResult<TxReceipt> {
        (**self).send_transaction(from, to, data).await
    }

    fn subscribe_logs(&self, contract: Address) -> Option<LogStream> {
        (**self).subscribe_logs(contract)
    }
}
