//! Runtime configuration with configurable thresholds
//!
//! All knobs are configurable via file, not hardcoded, so production tuning
//! never needs a recompile. Defaults match the deployed values.

use crate::amount::Amount;
use crate::fees::FeeSchedule;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Errors loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("At most two operators are supported, got {0}")]
    TooManyOperators(usize),

    #[error("At least one operator is required for manual operations")]
    NoOperators,
}

/// Configuration for the ledger, confirmation workflow, trust machine and
/// ingestion poller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TallyConfig {
    // === Release math ===
    /// Percentage fee taken on release (0.02 = 2%)
    #[serde(default = "default_fee_rate")]
    pub fee_rate: Decimal,

    /// Flat network fee in minor units, deducted after the percentage fee
    #[serde(default = "default_flat_fee_minor")]
    pub flat_fee_minor: i64,

    // === Confirmation workflow ===
    /// Hours before a pending confirmation auto-confirms
    #[serde(default = "default_confirmation_expiry_hours")]
    pub confirmation_expiry_hours: i64,

    // === Trust machine ===
    /// Days a quarantined sender waits before auto-promotion
    #[serde(default = "default_auto_promote_days")]
    pub auto_promote_days: i64,

    // === Ingestion poller ===
    /// Seconds between ingestion poll cycles
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Maximum source pages fetched per cycle (bounds loop time)
    #[serde(default = "default_max_pages_per_cycle")]
    pub max_pages_per_cycle: u32,

    // === Operators ===
    /// Trusted operator chat ids, most senior first. Hard cap of two.
    /// The first entry is the confirming identity and the ledger actor
    /// used for auto-applied ingestion adds.
    #[serde(default)]
    pub operators: Vec<i64>,
}

fn default_fee_rate() -> Decimal {
    Decimal::new(2, 2) // 2%
}

fn default_flat_fee_minor() -> i64 {
    30 // $0.30
}

fn default_confirmation_expiry_hours() -> i64 {
    24
}

fn default_auto_promote_days() -> i64 {
    7
}

fn default_poll_interval_secs() -> u64 {
    60
}

fn default_max_pages_per_cycle() -> u32 {
    5
}

impl Default for TallyConfig {
    fn default() -> Self {
        Self {
            fee_rate: default_fee_rate(),
            flat_fee_minor: default_flat_fee_minor(),
            confirmation_expiry_hours: default_confirmation_expiry_hours(),
            auto_promote_days: default_auto_promote_days(),
            poll_interval_secs: default_poll_interval_secs(),
            max_pages_per_cycle: default_max_pages_per_cycle(),
            operators: Vec::new(),
        }
    }
}

impl TallyConfig {
    /// Load configuration from a JSON file
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Enforce the two-operator cap.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.operators.len() > 2 {
            return Err(ConfigError::TooManyOperators(self.operators.len()));
        }
        Ok(())
    }

    /// The fee schedule applied on release
    pub fn fee_schedule(&self) -> FeeSchedule {
        FeeSchedule::new(
            self.fee_rate,
            Amount::from_minor_units_unchecked(self.flat_fee_minor.max(0)),
        )
    }

    /// The most senior operator: confirming identity and ingestion ledger
    /// actor. None means ingestion runs in shadow mode.
    pub fn primary_operator(&self) -> Option<i64> {
        self.operators.first().copied()
    }

    /// Whether an id belongs to the operator allow-list
    pub fn is_operator(&self, id: i64) -> bool {
        self.operators.contains(&id)
    }

    pub fn confirmation_expiry(&self) -> chrono::Duration {
        chrono::Duration::hours(self.confirmation_expiry_hours)
    }

    pub fn auto_promote_window(&self) -> chrono::Duration {
        chrono::Duration::days(self.auto_promote_days)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}
