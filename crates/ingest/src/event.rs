//! Canonical parsed-event contract
//!
//! Upstream sources (the mail watcher, a webhook, a batch file) normalize
//! whatever they receive into `ParsedEvent` before it reaches the pipeline.
//! The contract: `event_id` is globally unique per upstream source, `amount`
//! is positive minor units, and `identity_key` is already case- and
//! whitespace-folded. Messages the upstream parser could not make sense of
//! arrive as `ParseRejection` instead, so they still get an idempotency row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tally_core::Amount;

/// Where an event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Email,
    Webhook,
    Batch,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Email => "email",
            SourceKind::Webhook => "webhook",
            SourceKind::Batch => "batch",
        }
    }
}

/// A successfully parsed payment notification, ready for dedup and apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedEvent {
    /// Globally unique per upstream source; the primary idempotency anchor
    pub event_id: String,
    /// Upstream thread/correlation id, if the source has one
    #[serde(default)]
    pub source_ref: Option<String>,
    /// Normalized payer identity (lowercased, whitespace-folded)
    pub identity_key: String,
    /// Human-readable payer name as it appeared in the message
    #[serde(default)]
    pub identity_display: Option<String>,
    /// Positive amount in minor units
    pub amount: Amount,
    #[serde(default)]
    pub event_time: Option<DateTime<Utc>>,
    pub source_kind: SourceKind,
    /// Transaction-level key (e.g. the upstream payment confirmation number)
    /// used to catch the same payment arriving under two event ids
    #[serde(default)]
    pub secondary_key: Option<String>,
}

impl ParsedEvent {
    /// Contract violations the pipeline records as `parse_error` rows
    /// instead of applying.
    pub fn contract_violation(&self) -> Option<&'static str> {
        if self.identity_key.trim().is_empty() {
            Some("empty identity key")
        } else if !self.amount.is_positive() {
            Some("non-positive amount")
        } else {
            None
        }
    }
}

/// Why the upstream parser gave up on a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionKind {
    /// No recognizable payment pattern; most non-payment mail lands here
    #[default]
    Unmatched,
    /// Looked like a payment but a field failed to parse
    Malformed,
}

/// A message the upstream parser rejected. Still carries an `event_id` so
/// the rejection is recorded exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseRejection {
    pub event_id: String,
    #[serde(default)]
    pub source_ref: Option<String>,
    pub reason: String,
    #[serde(default)]
    pub kind: RejectionKind,
}
