//! # PIXELWAR Core
//!
//! The local half of an on-chain pixel canvas: everything that can be
//! decided without talking to the ledger.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌───────────────┐   ┌──────────────┐
//! │  ColorCodec  │   │ CooldownGuard │   │ CanvasCache  │
//! │  #rrggbb ⇄   │   │  one pixel    │   │  confirmed + │
//! │  uint32 wire │   │  per window   │   │  optimistic  │
//! └──────────────┘   └───────────────┘   └──────────────┘
//!          ▲                 ▲                  ▲
//!          └─────────────────┼──────────────────┘
//!                            │
//!                  pixelwar_sync::SyncEngine
//! ```
//!
//! ## Guarantees
//!
//! - Colors are always normalized to 24 bits
//! - Coordinates are validated before any remote call
//! - A pixel never carries more than one pending color

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]

pub mod account;
pub mod cache;
pub mod clock;
pub mod color;
pub mod config;
pub mod cooldown;
pub mod error;
pub mod grid;
pub mod notice;

pub use account::{AccountProvider, SessionAccount};
pub use cache::{CanvasCache, PixelState};
pub use clock::{Clock, ManualClock, SystemClock, Timestamp};
pub use color::{decode, encode, Rgb, PALETTE};
pub use config::SyncConfig;
pub use cooldown::{Account, CooldownGuard, CooldownStatus, FailurePolicy};
pub use error::{CanvasError, CanvasResult, PartialLoadFailure, SubmitFailure};
pub use grid::{Coord, Grid, GridSize};
pub use notice::{Notice, NoticeLevel};

/// Re-exported so downstream crates share one address type.
pub use alloy_primitives::Address;
