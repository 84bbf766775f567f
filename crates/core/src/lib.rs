//! Tally core - domain primitives shared by every crate
//!
//! # Key Types
//! - `Amount`: non-negative integer minor units (cents), parsed from decimal text
//! - `FeeSchedule`: release math (percentage fee + flat network fee)
//! - `Actor`: who performed an operation (operator or the system itself)
//! - `TallyConfig`: runtime configuration with serde defaults

pub mod actor;
pub mod amount;
pub mod config;
pub mod fees;

pub use actor::Actor;
pub use amount::{Amount, AmountError};
pub use config::{ConfigError, TallyConfig};
pub use fees::{FeeSchedule, ReleaseBreakdown};
