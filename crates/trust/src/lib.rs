//! Tally sender trust - per-identity trust state machine
//!
//! Every payer identity seen by the ingestion pipeline carries a trust
//! state: `quarantine` (initial, provisional), `approved`, or `blocked`
//! (terminal absent a manual re-approve). Quarantine is a soft level - a
//! quarantined sender's events still reach the ledger; only blocked ones
//! never do.
//!
//! A quarantined identity auto-promotes to approved the first time it is
//! matched at or after its `auto_promote_at` deadline, attributed to the
//! system actor. Match bookkeeping (seen count, last seen, last amount,
//! display hint) is updated on every match regardless of state.

mod registry;

pub use registry::{
    approve_sender_tx, block_sender_tx, record_match_tx, MatchOutcome, TrustError, TrustRegistry,
};
