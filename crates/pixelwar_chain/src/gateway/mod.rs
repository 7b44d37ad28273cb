//! # Chain Gateway
//!
//! The only component that talks to the ledger. Reads degrade per row,
//! writes resolve to a categorized [`SubmitFailure`], and every call is
//! bounded by a timeout.
//!
//! ## Read path
//!
//! ```text
//! fetch_all ──▶ fetch_row(0) ┐
//!          ├──▶ fetch_row(1) ├─ at most `fetch_concurrency` in flight
//!          └──▶ fetch_row(n) ┘
//!                  │
//!                  ├─ ok       ──▶ RowFetch::Loaded
//!                  └─ error / ──▶ RowFetch::Failed (fallback-filled)
//!                     timeout
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use pixelwar_core::{
    CanvasError, CanvasResult, Coord, Grid, GridSize, PartialLoadFailure, Rgb, SubmitFailure,
    SyncConfig, Timestamp,
};

use crate::contracts::{self, PixelRead};
use crate::ledger::{LedgerError, RemoteLedger, TxStatus};
use crate::listener::{ChangeCallback, ChangeSubscription};

/// Result of reading one row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RowFetch {
    /// The row was read and decoded.
    Loaded {
        /// Row index.
        y: u32,
        /// Decoded colors, one per column.
        colors: Vec<Rgb>,
    },
    /// The read failed; `colors` is filled with the fallback color.
    Failed {
        /// Row index.
        y: u32,
        /// Fallback-filled row.
        colors: Vec<Rgb>,
        /// Why the read failed.
        reason: String,
    },
}

impl RowFetch {
    /// Row index.
    #[must_use]
    pub const fn y(&self) -> u32 {
        match self {
            Self::Loaded { y, .. } | Self::Failed { y, .. } => *y,
        }
    }

    /// Colors to display for this row.
    #[must_use]
    pub fn colors(&self) -> &[Rgb] {
        match self {
            Self::Loaded { colors, .. } | Self::Failed { colors, .. } => colors,
        }
    }

    /// Whether this row fell back.
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Result of reading every row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GridFetch {
    /// Canvas size.
    pub size: GridSize,
    /// One entry per row, in row order.
    pub rows: Vec<RowFetch>,
}

impl GridFetch {
    /// The rows that fell back, `None` if every row loaded.
    #[must_use]
    pub fn warning(&self) -> Option<PartialLoadFailure> {
        let failed = PartialLoadFailure::new(
            self.rows.iter().filter(|r| r.is_failed()).map(RowFetch::y),
        );
        (!failed.is_empty()).then_some(failed)
    }

    /// Assembles the best-effort grid, fallback rows included.
    #[must_use]
    pub fn to_grid(&self) -> Grid {
        let cells = self.rows.iter().flat_map(|r| r.colors().iter().copied()).collect();
        Grid::from_cells(self.size, cells).unwrap_or_else(|_| Grid::filled(self.size, Rgb::BLACK))
    }
}

/// A mined, successful placement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Confirmation {
    /// Where.
    pub coord: Coord,
    /// Color now stored on chain.
    pub color: Rgb,
    /// Transaction hash.
    pub tx_hash: B256,
    /// Block it was mined in.
    pub block_number: u64,
    /// Block timestamp, when known.
    pub confirmed_at: Option<Timestamp>,
}

/// Operations the sync engine needs from the ledger.
#[async_trait]
pub trait ChainGateway: Send + Sync {
    /// Canvas dimensions this gateway reads.
    fn size(&self) -> GridSize;

    /// Reads one row. Never fails: a failed read yields a fallback row.
    async fn fetch_row(&self, y: u32) -> RowFetch;

    /// Reads every row with bounded concurrency.
    ///
    /// Only fails when no row at all could be read.
    async fn fetch_all(&self) -> CanvasResult<GridFetch>;

    /// Reads one pixel with its last-changed time.
    async fn fetch_pixel(&self, coord: Coord) -> CanvasResult<PixelRead>;

    /// Sends `setPixel` on behalf of `account` and waits for it to settle.
    async fn submit_pixel(
        &self,
        account: Address,
        coord: Coord,
        color: Rgb,
    ) -> Result<Confirmation, SubmitFailure>;

    /// Starts pushing remote changes into `on_change`. `None` when the
    /// transport has no push channel; polling still works.
    fn subscribe_to_changes(&self, on_change: ChangeCallback) -> Option<ChangeSubscription>;
}

/// Gateway settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GatewayConfig {
    /// PixelBoard contract address.
    pub contract: Address,
    /// Canvas dimensions.
    pub size: GridSize,
    /// Color for rows that could not be read.
    pub fallback: Rgb,
    /// Maximum rows read at once.
    pub fetch_concurrency: usize,
    /// Timeout per read.
    pub read_timeout: Duration,
    /// Timeout for a submission to settle.
    pub write_timeout: Duration,
}

impl GatewayConfig {
    /// Derives gateway settings from the engine configuration.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if the configuration does not validate.
    pub fn from_sync_config(config: &SyncConfig, contract: Address) -> CanvasResult<Self> {
        config.validate()?;
        Ok(Self {
            contract,
            size: config.grid_size()?,
            fallback: config.fallback(),
            fetch_concurrency: config.fetch_concurrency,
            read_timeout: config.read_timeout(),
            write_timeout: config.write_timeout(),
        })
    }
}

/// Statistics for the gateway.
#[derive(Debug, Default)]
pub struct GatewayStats {
    /// Row reads attempted.
    pub row_reads: AtomicU64,
    /// Row reads that fell back.
    pub row_failures: AtomicU64,
    /// Pixel reads attempted.
    pub pixel_reads: AtomicU64,
    /// Submissions handed to the ledger.
    pub submissions: AtomicU64,
    /// Submissions that did not confirm.
    pub submission_failures: AtomicU64,
}

/// [`ChainGateway`] over any [`RemoteLedger`].
pub struct ContractGateway<L> {
    /// Transport.
    ledger: L,
    /// Settings.
    config: GatewayConfig,
    /// Call statistics.
    stats: Arc<GatewayStats>,
}

impl<L: RemoteLedger> ContractGateway<L> {
    /// Creates a gateway.
    #[must_use]
    pub fn new(ledger: L, config: GatewayConfig) -> Self {
        Self {
            ledger,
            config,
            stats: Arc::new(GatewayStats::default()),
        }
    }

    /// Returns a reference to the statistics.
    #[must_use]
    pub fn stats(&self) -> Arc<GatewayStats> {
        Arc::clone(&self.stats)
    }

    /// The settings in use.
    #[must_use]
    pub const fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// The underlying transport.
    #[must_use]
    pub const fn ledger(&self) -> &L {
        &self.ledger
    }

    async fn read(&self, data: Vec<u8>) -> Result<Vec<u8>, LedgerError> {
        match timeout(self.config.read_timeout, self.ledger.call(self.config.contract, data)).await
        {
            Ok(result) => result,
            Err(_) => Err(LedgerError::Timeout),
        }
    }

    async fn read_row(&self, y: u32) -> Result<Vec<Rgb>, LedgerError> {
        let bytes = self.read(contracts::get_row_calldata(y)).await?;
        let wire = contracts::decode_row(&bytes).map_err(|e| LedgerError::Decode(e.to_string()))?;
        let width = self.config.size.width() as usize;
        if wire.len() != width {
            return Err(LedgerError::Decode(format!(
                "row {y} has {} entries, expected {width}",
                wire.len()
            )));
        }
        Ok(wire.into_iter().map(Rgb::from_wire).collect())
    }
}

/// Maps a transport error on the write path to its user-facing category.
#[must_use]
pub fn categorize_submit_error(error: LedgerError) -> SubmitFailure {
    match error {
        LedgerError::Unavailable(reason) | LedgerError::Decode(reason) => {
            SubmitFailure::RemoteUnavailable(reason)
        }
        LedgerError::Timeout => SubmitFailure::NetworkTimeout,
        LedgerError::UserRejected => SubmitFailure::RejectedByUser,
        LedgerError::Reverted(reason) => SubmitFailure::Reverted(reason),
        LedgerError::Rpc { code, message } => {
            SubmitFailure::Reverted(format!("rpc error {code}: {message}"))
        }
    }
}

fn read_error(error: LedgerError) -> CanvasError {
    match error {
        LedgerError::Timeout => CanvasError::NetworkTimeout,
        other => CanvasError::RemoteUnavailable(other.to_string()),
    }
}

#[async_trait]
impl<L: RemoteLedger> ChainGateway for ContractGateway<L> {
    fn size(&self) -> GridSize {
        self.config.size
    }

    async fn fetch_row(&self, y: u32) -> RowFetch {
        self.stats.row_reads.fetch_add(1, Ordering::Relaxed);
        match self.read_row(y).await {
            Ok(colors) => RowFetch::Loaded { y, colors },
            Err(error) => {
                self.stats.row_failures.fetch_add(1, Ordering::Relaxed);
                warn!(row = y, %error, "row read failed, using fallback color");
                RowFetch::Failed {
                    y,
                    colors: vec![self.config.fallback; self.config.size.width() as usize],
                    reason: error.to_string(),
                }
            }
        }
    }

    async fn fetch_all(&self) -> CanvasResult<GridFetch> {
        let height = self.config.size.height();
        let rows: Vec<RowFetch> = stream::iter(0..height)
            .map(|y| self.fetch_row(y))
            .buffered(self.config.fetch_concurrency.max(1))
            .collect()
            .await;

        let failed = rows.iter().filter(|r| r.is_failed()).count();
        if failed == rows.len() {
            let reason = rows.iter().find_map(|r| match r {
                RowFetch::Failed { reason, .. } => Some(reason.clone()),
                RowFetch::Loaded { .. } => None,
            });
            return Err(CanvasError::RemoteUnavailable(format!(
                "all {height} rows failed: {}",
                reason.unwrap_or_default()
            )));
        }

        debug!(rows = rows.len(), failed, "canvas fetched");
        Ok(GridFetch {
            size: self.config.size,
            rows,
        })
    }

    async fn fetch_pixel(&self, coord: Coord) -> CanvasResult<PixelRead> {
        if !self.config.size.contains(coord) {
            return Err(CanvasError::CoordinateOutOfBounds {
                x: i64::from(coord.x),
                y: i64::from(coord.y),
                width: self.config.size.width(),
                height: self.config.size.height(),
            });
        }
        self.stats.pixel_reads.fetch_add(1, Ordering::Relaxed);
        let bytes = self
            .read(contracts::get_pixel_calldata(coord))
            .await
            .map_err(read_error)?;
        contracts::decode_pixel(coord, &bytes)
            .map_err(|e| CanvasError::RemoteUnavailable(format!("malformed getPixel reply: {e}")))
    }

    async fn submit_pixel(
        &self,
        account: Address,
        coord: Coord,
        color: Rgb,
    ) -> Result<Confirmation, SubmitFailure> {
        self.stats.submissions.fetch_add(1, Ordering::Relaxed);
        info!(x = coord.x, y = coord.y, %color, %account, "submitting pixel");

        let data = contracts::set_pixel_calldata(coord, color);
        let sent = timeout(
            self.config.write_timeout,
            self.ledger.send_transaction(account, self.config.contract, data),
        )
        .await;

        let result = match sent {
            Err(_) => Err(SubmitFailure::NetworkTimeout),
            Ok(Err(error)) => Err(categorize_submit_error(error)),
            Ok(Ok(receipt)) => match receipt.status {
                TxStatus::Success => Ok(Confirmation {
                    coord,
                    color,
                    tx_hash: receipt.tx_hash,
                    block_number: receipt.block_number,
                    confirmed_at: receipt.timestamp,
                }),
                TxStatus::Reverted(reason) => Err(SubmitFailure::Reverted(reason)),
            },
        };

        match &result {
            Ok(confirmation) => {
                info!(tx = %confirmation.tx_hash, block = confirmation.block_number, "pixel confirmed");
            }
            Err(failure) => {
                self.stats.submission_failures.fetch_add(1, Ordering::Relaxed);
                warn!(%failure, "pixel submission failed");
            }
        }
        result
    }

    fn subscribe_to_changes(&self, on_change: ChangeCallback) -> Option<ChangeSubscription> {
        let stream = self.ledger.subscribe_logs(self.config.contract)?;
        match ChangeSubscription::spawn(stream, on_change) {
            Ok(subscription) => Some(subscription),
            Err(error) => {
                warn!(%error, "could not start change feed");
                None
            }
        }
    }
}
