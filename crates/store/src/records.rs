//! Typed records for every table
//!
//! Rows are mapped to strong types at the store boundary; nothing above the
//! store ever sees a raw SQLite row. Enum columns round-trip through
//! `as_str`/`parse_str` pairs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tally_core::{Actor, Amount};

/// The singleton running total and session counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalState {
    /// Current shared total, never negative at rest
    pub total: Amount,
    /// Monotonic session counter; advances on every release
    pub session_id: i64,
}

/// Kind of a logged movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MovementKind {
    /// Manual or ingested addition to the total
    Add,
    /// Total released (paid out) and reset to zero
    Release,
    /// Admin compensating entry for an auto-applied add
    Reversal,
}

impl MovementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementKind::Add => "add",
            MovementKind::Release => "release",
            MovementKind::Reversal => "reversal",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "add" => Some(MovementKind::Add),
            "release" => Some(MovementKind::Release),
            "reversal" => Some(MovementKind::Reversal),
            _ => None,
        }
    }
}

/// One immutable change to the shared total.
///
/// Movements are append-only and ordered by id. The only deletion path is
/// undo, which removes the single row it compensates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Movement {
    pub id: i64,
    pub session_id: i64,
    pub kind: MovementKind,
    /// Magnitude in minor units (pre-reset total for releases)
    pub amount: Amount,
    /// Running total immediately after this movement
    pub total_after: Amount,
    pub actor: Actor,
    pub created_at: DateTime<Utc>,
}

/// Time-boxed approval attached to a manually-entered add movement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    /// Primary key, equal to the movement id it guards
    pub movement_id: i64,
    pub actor: Actor,
    pub amount: Amount,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_confirmed: bool,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub confirmed_by: Option<Actor>,
    /// Transport references for retracting the approval-request message
    pub chat_ref: Option<i64>,
    pub message_ref: Option<i64>,
}

/// One finalized release of the running total.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseRecord {
    pub id: i64,
    pub movement_id: i64,
    /// Session that was closed by this release
    pub session_id: i64,
    pub released_total: Amount,
    pub fee: Amount,
    pub net: Amount,
    pub released_by: Actor,
    pub released_at: DateTime<Utc>,
}

/// Trust level of a payer identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrustState {
    /// Newly seen, provisional; eligible for the ledger but flagged
    Quarantine,
    /// Promoted manually or by elapsed quarantine age
    Approved,
    /// Terminal absent a manual re-approve; events never reach the ledger
    Blocked,
}

impl TrustState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrustState::Quarantine => "quarantine",
            TrustState::Approved => "approved",
            TrustState::Blocked => "blocked",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "quarantine" => Some(TrustState::Quarantine),
            "approved" => Some(TrustState::Approved),
            "blocked" => Some(TrustState::Blocked),
            _ => None,
        }
    }
}

/// Per-sender trust record, keyed by normalized identity.
///
/// Invariant: `auto_promote_at` is set iff `state` is quarantine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderTrust {
    pub id: i64,
    pub identity_key: String,
    pub state: TrustState,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub seen_count: i64,
    pub auto_promote_at: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
    pub approved_by: Option<Actor>,
    pub blocked_at: Option<DateTime<Utc>>,
    pub blocked_by: Option<Actor>,
    pub last_matched: Option<Amount>,
    pub display_name_hint: Option<String>,
}

/// Terminal classification of a processed ingestion message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessedStatus {
    /// Ledger add applied; `movement_id` is set
    Added,
    /// Known sender matched but tracking was manual / no actor (dry run)
    ShadowApprovedMatch,
    /// First-seen sender in shadow conditions
    QuarantinedUnknownSender,
    /// Sender is blocked; never reaches the ledger
    BlockedSender,
    /// Message did not match any payment pattern
    IgnoredUnmatched,
    /// Same underlying transaction already processed under another event id
    IgnoredDuplicate,
    /// Upstream parser rejected the message
    ParseError,
}

impl ProcessedStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessedStatus::Added => "added",
            ProcessedStatus::ShadowApprovedMatch => "shadow_approved_match",
            ProcessedStatus::QuarantinedUnknownSender => "quarantined_unknown_sender",
            ProcessedStatus::BlockedSender => "blocked_sender",
            ProcessedStatus::IgnoredUnmatched => "ignored_unmatched",
            ProcessedStatus::IgnoredDuplicate => "ignored_duplicate",
            ProcessedStatus::ParseError => "parse_error",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "added" => Some(ProcessedStatus::Added),
            "shadow_approved_match" => Some(ProcessedStatus::ShadowApprovedMatch),
            "quarantined_unknown_sender" => Some(ProcessedStatus::QuarantinedUnknownSender),
            "blocked_sender" => Some(ProcessedStatus::BlockedSender),
            "ignored_unmatched" => Some(ProcessedStatus::IgnoredUnmatched),
            "ignored_duplicate" => Some(ProcessedStatus::IgnoredDuplicate),
            "parse_error" => Some(ProcessedStatus::ParseError),
            _ => None,
        }
    }
}

/// Idempotency record for one external event id.
///
/// Exactly one row exists per event id, whatever branch the pipeline took;
/// a second arrival of the same id is a no-op duplicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedMessage {
    pub id: i64,
    pub event_id: String,
    /// Upstream thread/correlation id
    pub source_ref: Option<String>,
    pub sender_identity: Option<String>,
    pub summary: Option<String>,
    pub event_time: Option<DateTime<Utc>>,
    pub parsed_amount: Option<Amount>,
    pub parsed_name: Option<String>,
    pub status: ProcessedStatus,
    /// Set only when status is `added`
    pub movement_id: Option<i64>,
    pub processed_at: DateTime<Utc>,
    /// Structured metadata (secondary dedup key, shadow reason, ...)
    pub notes: Option<serde_json::Value>,
}

/// Admin compensating entry for a previously auto-applied add.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reversal {
    pub id: i64,
    pub event_id: String,
    pub original_movement_id: i64,
    pub reversal_movement_id: i64,
    pub payer_key: String,
    pub payer_display: Option<String>,
    pub amount: Amount,
    pub reason: Option<String>,
    pub reversed_by: Actor,
    pub reversed_at: DateTime<Utc>,
}

/// Whether ingested events are applied to the ledger or only recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TrackingMode {
    /// Apply eligible events to the ledger
    #[default]
    Auto,
    /// Record outcomes only (shadow / dry-run deployment)
    Manual,
}

impl TrackingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackingMode::Auto => "auto",
            TrackingMode::Manual => "manual",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "auto" => Some(TrackingMode::Auto),
            "manual" => Some(TrackingMode::Manual),
            _ => None,
        }
    }
}
