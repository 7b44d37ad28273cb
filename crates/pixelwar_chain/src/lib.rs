//! # PIXELWAR Chain Bridge
//!
//! Everything that talks to the ledger hosting the PixelBoard contract.
//!
//! ## Architecture
//!
//! ```text
//!                      ┌─────────────────┐
//!   SyncEngine ──────▶ │  ChainGateway   │  timeouts, per-row fallback,
//!                      │ (ContractGateway)│  failure categories
//!                      └────────┬────────┘
//!                               │ raw ABI bytes
//!                      ┌────────▼────────┐
//!                      │  RemoteLedger   │
//!                      └───┬─────────┬───┘
//!                          │         │
//!                ┌─────────▼──┐  ┌───▼─────────────┐
//!                │ RpcLedger  │  │ SimulatedLedger │
//!                │ (JSON-RPC) │  │  (in memory)    │
//!                └────────────┘  └─────────────────┘
//!
//!   PixelUpdated logs ──▶ LogStream ──▶ ChangeSubscription ──▶ callback
//! ```
//!
//! ## Guarantees
//!
//! - A failed row read never fails the whole canvas
//! - Every call is bounded by a timeout
//! - Write failures arrive as a [`pixelwar_core::SubmitFailure`]

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod contracts;
pub mod events;
pub mod gateway;
pub mod ledger;
pub mod listener;
pub mod networks;
pub mod rpc;
pub mod simulation;

pub use contracts::{IPixelBoard, PixelRead};
pub use events::{EventParser, PixelChange};
pub use gateway::{
    ChainGateway, Confirmation, ContractGateway, GatewayConfig, GatewayStats, GridFetch, RowFetch,
};
pub use ledger::{LedgerError, LedgerResult, LogStream, RawLog, RemoteLedger, TxReceipt, TxStatus};
pub use listener::{ChangeCallback, ChangeSubscription, ListenerStats};
pub use networks::{Endpoint, Network, NETWORKS};
pub use rpc::{PollIntervals, RpcLedger};
pub use simulation::{SimulatedLedger, SimulationStats};
