//! # PIXELWAR Sync
//!
//! The engine that keeps a local canvas usable on top of a slow,
//! rate-limited, partially failing ledger.
//!
//! ## Architecture
//!
//! ```text
//!          UI
//!   refresh │ place │ subscribe
//!           ▼       ▼      ▲
//! ┌───────────────────────────────┐
//! │          SyncEngine           │
//! │ ┌─────────────┐ ┌───────────┐ │   events: StateChanged,
//! │ │ CanvasCache │ │ Cooldown  │ │   GridChanged, Warning,
//! │ │ (optimistic)│ │  Guard    │ │   Notice, TransactionSettled
//! │ └─────────────┘ └───────────┘ │
//! └───────────────┬───────────────┘
//!                 ▼
//!           ChainGateway ──▶ ledger
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use pixelwar_chain::{ContractGateway, GatewayConfig, SimulatedLedger};
//! use pixelwar_core::{Address, SessionAccount, SyncConfig, SystemClock};
//! use pixelwar_sync::{EngineOptions, SyncEngine};
//!
//! # async fn demo() -> pixelwar_core::CanvasResult<()> {
//! let config = SyncConfig::default();
//! let contract = Address::repeat_byte(0xC0);
//! let ledger = SimulatedLedger::new(config.grid_size()?, contract);
//! let gateway = ContractGateway::new(ledger, GatewayConfig::from_sync_config(&config, contract)?);
//! let engine = SyncEngine::new(
//!     gateway,
//!     Arc::new(SessionAccount::connected(Address::repeat_byte(1))),
//!     Arc::new(SystemClock),
//!     EngineOptions::from_config(&config),
//! );
//!
//! engine.refresh().await?;
//! engine.place(1, 1, "#ff0000").await?;
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]

pub mod engine;
pub mod logging;
pub mod notify;
pub mod render;
pub mod state;

pub use engine::{EngineOptions, RefreshReport, SyncEngine};
pub use notify::{CanvasEvent, Listener, ListenerRegistry, Subscription};
pub use state::{EngineState, PendingTransaction, TxPhase};
