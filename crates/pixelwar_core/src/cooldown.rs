//! # Cooldown Guard
//!
//! Client-side mirror of the contract's one-pixel-per-window rule.
//!
//! The submission time is recorded when a transaction is handed to the
//! ledger, not when it confirms, so a second click cannot slip in while the
//! first is still in flight. A failed transaction keeps the cooldown unless
//! [`FailurePolicy::ResetCooldown`] is configured.

use std::time::Duration;

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

use crate::clock::Timestamp;

/// What a failed submission does to the cooldown.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Keep waiting out the full window after a failure.
    #[default]
    KeepCooldown,
    /// Restore the previous submission time so the user can retry at once.
    ResetCooldown,
}

/// Result of a cooldown check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CooldownStatus {
    /// Whether a submission is allowed right now.
    pub allowed: bool,
    /// Wait time, rounded up to whole seconds. Zero when allowed.
    pub remaining: Duration,
}

impl CooldownStatus {
    /// Whole seconds left to wait.
    #[must_use]
    pub const fn remaining_secs(&self) -> u64 {
        self.remaining.as_secs()
    }
}

/// An account and its last accepted submission.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Account {
    /// Opaque identity.
    pub address: Address,
    /// When the last submission was handed to the ledger.
    pub last_submission_at: Option<Timestamp>,
}

/// Tracks the session account's last submission.
#[derive(Clone, Debug)]
pub struct CooldownGuard {
    window: Duration,
    account: Option<Account>,
}

impl CooldownGuard {
    /// Creates a guard with the given window.
    #[must_use]
    pub const fn new(window: Duration) -> Self {
        Self {
            window,
            account: None,
        }
    }

    /// The configured window.
    #[must_use]
    pub const fn window(&self) -> Duration {
        self.window
    }

    /// The currently bound account.
    #[must_use]
    pub const fn account(&self) -> Option<&Account> {
        self.account.as_ref()
    }

    /// Binds the guard to `address`. A different address starts with no
    /// submission history, since the ledger keeps one window per account.
    pub fn bind(&mut self, address: Address) {
        if self.account.map(|a| a.address) != Some(address) {
            self.account = Some(Account {
                address,
                last_submission_at: None,
            });
        }
    }

    /// Checks whether a submission is allowed at `now`.
    #[must_use]
    pub fn can_submit(&self, now: Timestamp) -> CooldownStatus {
        let Some(last) = self.account.and_then(|a| a.last_submission_at) else {
            return CooldownStatus {
                allowed: true,
                remaining: Duration::ZERO,
            };
        };

        let elapsed = now.saturating_since(last);
        if elapsed >= self.window {
            CooldownStatus {
                allowed: true,
                remaining: Duration::ZERO,
            }
        } else {
            CooldownStatus {
                allowed: false,
                remaining: round_up_to_secs(self.window - elapsed),
            }
        }
    }

    /// Records a submission handed to the ledger at `now`.
    ///
    /// Returns the previous submission time so a
    /// [`FailurePolicy::ResetCooldown`] caller can undo it.
    pub fn record_submission(&mut self, now: Timestamp) -> Option<Timestamp> {
        let account = self.account.get_or_insert(Account {
            address: Address::ZERO,
            last_submission_at: None,
        });
        account.last_submission_at.replace(now)
    }

    /// Restores a submission time returned by [`Self::record_submission`].
    pub fn restore(&mut self, previous: Option<Timestamp>) {
        if let Some(account) = self.account.as_mut() {
            account.last_submission_at = previous;
        }
    }
}

fn round_up_to_secs(d: Duration) -> Duration {
    let secs = d.as_secs() + u64::from(d.subsec_nanos() > 0);
    Duration::from_secs(secs)
}
