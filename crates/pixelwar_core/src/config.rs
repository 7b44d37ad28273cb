//! # Sync Configuration
//!
//! Everything the engine needs from outside: canvas dimensions, the cooldown
//! window, timeouts and which network to talk to. Loaded once at startup
//! from TOML; every field has a default.
//!
//! ```toml
//! width = 30
//! height = 30
//! cooldown_secs = 60
//! fallback_color = "#000000"
//! network = "baseSepolia"
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::color::Rgb;
use crate::cooldown::FailurePolicy;
use crate::error::{CanvasError, CanvasResult};
use crate::grid::GridSize;

/// Largest accepted canvas side. The contract reads one row per call, so
/// this also bounds the number of calls per refresh.
pub const MAX_DIMENSION: u32 = 1024;

/// Engine configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    /// Canvas columns.
    pub width: u32,
    /// Canvas rows.
    pub height: u32,
    /// Seconds between two accepted placements of one account.
    pub cooldown_secs: u64,
    /// Whether a failed placement gives the cooldown back.
    pub reset_cooldown_on_failure: bool,
    /// Color shown for pixels whose row could not be read.
    pub fallback_color: String,
    /// Maximum concurrent row reads during a refresh.
    pub fetch_concurrency: usize,
    /// Timeout for each read call, in milliseconds.
    pub read_timeout_ms: u64,
    /// Timeout for a placement to settle, in milliseconds.
    pub write_timeout_ms: u64,
    /// Lifetime of status notices, in milliseconds.
    pub notice_ms: u64,
    /// Network preset name.
    pub network: String,
    /// Overrides the preset's RPC endpoint.
    pub rpc_url: Option<String>,
    /// Overrides the preset's contract address.
    pub contract_address: Option<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            width: 30,
            height: 30,
            cooldown_secs: 60,
            reset_cooldown_on_failure: false,
            fallback_color: "#000000".to_string(),
            fetch_concurrency: 8,
            read_timeout_ms: 5_000,
            write_timeout_ms: 120_000,
            notice_ms: 3_000,
            network: "baseSepolia".to_string(),
            rpc_url: None,
            contract_address: None,
        }
    }
}

impl SyncConfig {
    /// Parses and validates TOML text.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` on parse or validation failure.
    pub fn from_toml_str(text: &str) -> CanvasResult<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| CanvasError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if the file cannot be read or is invalid.
    pub fn load(path: impl AsRef<Path>) -> CanvasResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| CanvasError::InvalidConfig(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Serializes back to TOML.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if serialization fails.
    pub fn to_toml_string(&self) -> CanvasResult<String> {
        toml::to_string_pretty(self).map_err(|e| CanvasError::InvalidConfig(e.to_string()))
    }

    /// Checks every value.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` naming the first bad field.
    pub fn validate(&self) -> CanvasResult<()> {
        self.grid_size()?;
        if self.width > MAX_DIMENSION || self.height > MAX_DIMENSION {
            return Err(CanvasError::InvalidConfig(format!(
                "canvas {}x{} exceeds the {MAX_DIMENSION} limit",
                self.width, self.height
            )));
        }
        if self.fetch_concurrency == 0 {
            return Err(CanvasError::InvalidConfig(
                "fetch_concurrency must be at least 1".to_string(),
            ));
        }
        if self.read_timeout_ms == 0 || self.write_timeout_ms == 0 {
            return Err(CanvasError::InvalidConfig(
                "timeouts must be non-zero".to_string(),
            ));
        }
        Rgb::parse(&self.fallback_color).map_err(|_| {
            CanvasError::InvalidConfig(format!("fallback_color {:?}", self.fallback_color))
        })?;
        Ok(())
    }

    /// Canvas dimensions.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if a dimension is zero.
    pub fn grid_size(&self) -> CanvasResult<GridSize> {
        GridSize::new(self.width, self.height)
    }

    /// Parsed fallback color, black if invalid.
    #[must_use]
    pub fn fallback(&self) -> Rgb {
        Rgb::parse(&self.fallback_color).unwrap_or(Rgb::BLACK)
    }

    /// Cooldown window.
    #[must_use]
    pub const fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    /// Failure policy for the cooldown.
    #[must_use]
    pub const fn failure_policy(&self) -> FailurePolicy {
        if self.reset_cooldown_on_failure {
            FailurePolicy::ResetCooldown
        } else {
            FailurePolicy::KeepCooldown
        }
    }

    /// Per-read timeout.
    #[must_use]
    pub const fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Placement timeout.
    #[must_use]
    pub const fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    /// Notice lifetime.
    #[must_use]
    pub const fn notice_ttl(&self) -> Duration {
        Duration::from_millis(self.notice_ms)
    }
}
