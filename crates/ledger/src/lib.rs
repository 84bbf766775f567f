//! Tally ledger - the transaction engine
//!
//! This is the HEART of Tally. Every change to the shared running total goes
//! through this crate, as one atomic store transaction per operation:
//!
//! - `add`: increment the total and append an `add` movement (manual adds
//!   also open a time-boxed confirmation)
//! - `release`: pay out the total (fee + flat network fee), reset to zero,
//!   advance the session
//! - `undo`: compensate the single most recent movement, whatever its kind
//! - `reverse`: admin compensating entry for an auto-ingested add, at most
//!   once per source event
//!
//! The confirmation workflow (approve / expiry sweep) lives here too, since
//! confirmations are created and destroyed inside ledger transactions.

mod confirm;
mod engine;
mod error;

pub use confirm::{confirm_tx, ConfirmOutcome, ConfirmationWorkflow};
pub use engine::{
    add_tx, release_tx, reverse_tx, undo_tx, AddReceipt, LedgerEngine, ManualAddReceipt, Overview,
    ReleaseOutcome, ReleaseSummary, ReversalReceipt, UndoOutcome, UndoReceipt,
};
pub use error::LedgerError;
