//! Tally ingestion - dedup & apply pipeline
//!
//! Bridges external payment-notification sources and the ledger. Upstream
//! sources normalize messages into `ParsedEvent`s; the pipeline classifies
//! each one exactly once (duplicate, rejected, blocked, shadow, applied) in
//! a single store transaction, gated by the sender's trust state and the
//! tracking-mode setting. A fixed-interval poller drives a pageable source,
//! and a best-effort `Notifier` surfaces outcomes that carry new
//! information.

mod error;
mod event;
mod notify;
mod pipeline;
mod poller;

pub use error::IngestError;
pub use event::{ParseRejection, ParsedEvent, RejectionKind, SourceKind};
pub use notify::{LogNotifier, Notifier, NotifyError};
pub use pipeline::{
    notification_text, process_tx, record_rejection_tx, IngestOutcome, IngestPipeline,
};
pub use poller::{EventSource, IngestPoller};
