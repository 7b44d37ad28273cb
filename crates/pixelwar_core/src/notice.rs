//! # Expiring Notices
//!
//! Short status messages ("Pixel placed", "Please wait 12 seconds") with an
//! explicit expiry. Presentation and the timer that hides them belong to
//! the UI; the engine only stamps when a notice stops being relevant.

use std::fmt;
use std::time::Duration;

use crate::clock::Timestamp;

/// Severity of a notice.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoticeLevel {
    /// Something succeeded.
    Success,
    /// Informational.
    Info,
    /// Degraded but usable.
    Warning,
    /// An action failed.
    Error,
}

/// A message that expires at a fixed time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notice {
    /// Severity.
    pub level: NoticeLevel,
    /// Human readable text.
    pub message: String,
    /// When it was issued.
    pub issued_at: Timestamp,
    /// When the UI should stop showing it.
    pub expires_at: Timestamp,
}

impl Notice {
    /// Creates a notice living for `ttl` from `now`.
    #[must_use]
    pub fn new(level: NoticeLevel, message: impl Into<String>, now: Timestamp, ttl: Duration) -> Self {
        Self {
            level,
            message: message.into(),
            issued_at: now,
            expires_at: now.saturating_add(ttl),
        }
    }

    /// Whether the notice is past its expiry.
    #[must_use]
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now >= self.expires_at
    }

    /// Time left before expiry.
    #[must_use]
    pub fn remaining(&self, now: Timestamp) -> Duration {
        self.expires_at.saturating_since(now)
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}
