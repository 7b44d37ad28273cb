//! # Canvas Error Types
//!
//! All errors that can surface from the sync engine to a UI layer.

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while mirroring or mutating the canvas.
///
/// Validation variants (`InvalidColorFormat`, `CoordinateOutOfBounds`,
/// `CooldownActive`, `SubmissionInProgress`, `AccountUnavailable`, `NotReady`)
/// are always produced before any remote call is made.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CanvasError {
    /// The color text is not six hex digits with an optional `#`.
    #[error("invalid color format: {0:?}")]
    InvalidColorFormat(String),

    /// The coordinate lies outside the canvas.
    #[error("coordinate ({x}, {y}) is outside the {width}x{height} canvas")]
    CoordinateOutOfBounds {
        /// Requested column.
        x: i64,
        /// Requested row.
        y: i64,
        /// Canvas width.
        width: u32,
        /// Canvas height.
        height: u32,
    },

    /// The account must wait before placing another pixel.
    #[error("cooldown active, wait {}s", remaining.as_secs())]
    CooldownActive {
        /// Wait time, rounded up to whole seconds.
        remaining: Duration,
    },

    /// A placement is already waiting on the remote ledger.
    #[error("a submission is already in progress")]
    SubmissionInProgress,

    /// No account is connected to attribute the mutation to.
    #[error("no account available to sign the submission")]
    AccountUnavailable,

    /// The canvas has not been loaded yet, is reloading, or the engine is in
    /// its error state.
    #[error("canvas not ready")]
    NotReady,

    /// The remote ledger could not be reached at all.
    #[error("remote ledger unavailable: {0}")]
    RemoteUnavailable(String),

    /// A remote call did not settle within its timeout.
    #[error("remote call timed out")]
    NetworkTimeout,

    /// The wallet owner declined to sign.
    #[error("submission rejected by user")]
    SubmissionRejectedByUser,

    /// The ledger executed and reverted the mutation.
    #[error("submission reverted: {0}")]
    SubmissionReverted(String),

    /// Some rows could not be read and were filled with the fallback color.
    #[error("{0}")]
    PartialLoadFailure(PartialLoadFailure),

    /// Invalid configuration file or value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Network preset name not recognised.
    #[error("unknown network: {0}")]
    UnknownNetwork(String),
}

impl CanvasError {
    /// Returns true for errors raised locally before any remote call.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidColorFormat(_)
                | Self::CoordinateOutOfBounds { .. }
                | Self::CooldownActive { .. }
                | Self::SubmissionInProgress
                | Self::AccountUnavailable
                | Self::NotReady
        )
    }
}

/// Result type for canvas operations.
pub type CanvasResult<T> = Result<T, CanvasError>;

/// Categorized outcome of a failed `setPixel` submission.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmitFailure {
    /// The ledger endpoint could not be reached.
    #[error("remote ledger unavailable: {0}")]
    RemoteUnavailable(String),
    /// The submission did not settle in time.
    #[error("submission timed out")]
    NetworkTimeout,
    /// The wallet owner declined to sign.
    #[error("rejected by user")]
    RejectedByUser,
    /// The ledger reverted the call.
    #[error("reverted: {0}")]
    Reverted(String),
}

impl SubmitFailure {
    /// Whether the failure leaves the engine unable to continue without a refresh.
    #[must_use]
    pub const fn is_unrecoverable(&self) -> bool {
        matches!(self, Self::RemoteUnavailable(_))
    }
}

impl From<SubmitFailure> for CanvasError {
    fn from(failure: SubmitFailure) -> Self {
        match failure {
            SubmitFailure::RemoteUnavailable(reason) => Self::RemoteUnavailable(reason),
            SubmitFailure::NetworkTimeout => Self::NetworkTimeout,
            SubmitFailure::RejectedByUser => Self::SubmissionRejectedByUser,
            SubmitFailure::Reverted(reason) => Self::SubmissionReverted(reason),
        }
    }
}

/// Rows that fell back to the fallback color during one load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialLoadFailure {
    /// Indices of rows that failed.
    pub rows: BTreeSet<u32>,
}

impl PartialLoadFailure {
    /// Creates a warning covering the given rows.
    #[must_use]
    pub fn new(rows: impl IntoIterator<Item = u32>) -> Self {
        Self {
            rows: rows.into_iter().collect(),
        }
    }

    /// True when no row failed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl fmt::Display for PartialLoadFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "partial load failure, rows: ")?;
        for (i, row) in self.rows.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{row}")?;
        }
        Ok(())
    }
}

impl From<PartialLoadFailure> for CanvasError {
    fn from(warning: PartialLoadFailure) -> Self {
        Self::PartialLoadFailure(warning)
    }
}
