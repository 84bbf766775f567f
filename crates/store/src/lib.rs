//! Tally durable store
//!
//! One SQLite database holds the whole system state: the singleton running
//! total, the append-only movement log, pending confirmations, release
//! history, per-sender trust records, the processed-message idempotency
//! ledger, admin reversals and key/value settings.
//!
//! SQLite gives per-statement atomicity only, so every multi-statement
//! sequence goes through [`Store::with_tx`], which takes the process-wide
//! lock and wraps the closure in a single transaction. A second process
//! against the same database is unsupported.

mod error;
mod records;
mod schema;
mod store;

pub use error::StoreError;
pub use records::{
    Confirmation, GlobalState, Movement, MovementKind, ProcessedMessage, ProcessedStatus,
    ReleaseRecord, Reversal, SenderTrust, TrackingMode, TrustState,
};
pub use store::{Store, StoreTx};
