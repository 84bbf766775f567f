//! Ledger errors
//!
//! "Nothing to release" and "nothing to undo" are expected steady states and
//! are modeled as outcome values, not errors.

use tally_store::StoreError;
use tally_trust::TrustError;
use thiserror::Error;

/// Errors from ledger operations
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Amount must be a positive number of minor units")]
    InvalidAmount,

    #[error("Running total would overflow")]
    Overflow,

    #[error("No processed event: {0}")]
    UnknownEvent(String),

    #[error("Event {0} did not produce a ledger movement; nothing to reverse")]
    NotReversible(String),

    #[error("Event {0} was already reversed")]
    AlreadyReversed(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Trust(#[from] TrustError),
}
