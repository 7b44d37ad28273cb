//! Engine state and the in-flight transaction record.

use std::fmt;

use pixelwar_core::{Coord, Rgb, Timestamp};

/// Lifecycle of the sync engine.
///
/// ```text
///  Idle ──▶ Loading ──▶ Ready ⇄ Submitting
///              │          ▲         │
///              ▼          │         ▼
///            Error ───────┴──── Error
///               (acknowledge_error / refresh)
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EngineState {
    /// Constructed, nothing loaded yet.
    Idle,
    /// A refresh is in flight.
    Loading,
    /// The canvas is loaded and no placement is in flight.
    Ready,
    /// A placement is waiting for the ledger.
    Submitting,
    /// The ledger could not be reached. Cleared by acknowledgement or a
    /// successful refresh.
    Error,
}

impl EngineState {
    /// Whether the UI should treat the canvas as interactive.
    #[must_use]
    pub const fn is_interactive(self) -> bool {
        matches!(self, Self::Ready)
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Ready => "ready",
            Self::Submitting => "submitting",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// Where a placement is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxPhase {
    /// Handed to the ledger, outcome unknown.
    Submitted,
    /// Mined successfully.
    Confirmed,
    /// Rejected, reverted, timed out or unreachable.
    Failed,
}

/// The single placement an account may have in flight.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PendingTransaction {
    /// Target pixel.
    pub coord: Coord,
    /// Requested color.
    pub color: Rgb,
    /// When it was handed to the ledger.
    pub submitted_at: Timestamp,
    /// Current phase.
    pub phase: TxPhase,
}

impl PendingTransaction {
    pub(crate) const fn submitted(coord: Coord, color: Rgb, now: Timestamp) -> Self {
        Self {
            coord,
            color,
            submitted_at: now,
            phase: TxPhase::Submitted,
        }
    }

    pub(crate) const fn settle(self, phase: TxPhase) -> Self {
        Self { phase, ..self }
    }
}
