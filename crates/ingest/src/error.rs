//! Ingestion errors
//!
//! Duplicates, blocked senders, and shadow skips are classifications, not
//! errors; they come back as `IngestOutcome` values. Errors here mean the
//! event could not be processed at all and should be retried.

use tally_ledger::LedgerError;
use tally_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Event source failure: {0}")]
    Source(String),
}
