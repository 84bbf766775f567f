//! Dedup & apply pipeline
//!
//! Turns parsed external events into ledger movements exactly once. Every
//! event ends as exactly one `processed_ingestion_messages` row, whatever
//! its classification; the row is the idempotency anchor. The whole
//! classification-and-apply sequence runs in a single store transaction;
//! notifications happen after commit, outside the lock.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use tally_core::{Actor, Amount, TallyConfig};
use tally_ledger::add_tx;
use tally_store::{
    ProcessedMessage, ProcessedStatus, Store, StoreTx, TrackingMode, TrustState,
};
use tally_trust::record_match_tx;
use tracing::{debug, warn};

use crate::error::IngestError;
use crate::event::{ParseRejection, ParsedEvent, RejectionKind};
use crate::notify::Notifier;

/// Terminal classification of one pipeline pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// The event id was already processed; nothing changed
    Duplicate,
    /// Same underlying payment already processed under another event id
    SecondaryDuplicate { original_event_id: String },
    /// Contract violation or upstream parse failure, recorded as parse_error
    Rejected { reason: String },
    /// Sender is blocked; the ledger was not touched
    Blocked,
    /// Matched but not applied (manual mode or no ledger actor configured)
    Shadow {
        status: ProcessedStatus,
        first_seen: bool,
    },
    /// Ledger add applied
    Added {
        movement_id: i64,
        new_total: Amount,
        first_seen: bool,
        auto_promoted: bool,
    },
}

fn event_row(
    event: &ParsedEvent,
    status: ProcessedStatus,
    movement_id: Option<i64>,
    notes: serde_json::Value,
    now: DateTime<Utc>,
) -> ProcessedMessage {
    ProcessedMessage {
        id: 0,
        event_id: event.event_id.clone(),
        source_ref: event.source_ref.clone(),
        sender_identity: Some(event.identity_key.clone()),
        summary: None,
        event_time: event.event_time,
        parsed_amount: Some(event.amount),
        parsed_name: event.identity_display.clone(),
        status,
        movement_id,
        processed_at: now,
        notes: Some(notes),
    }
}

/// Classify and apply one event inside an open transaction.
///
/// `ledger_actor` is the operator auto-applied adds are attributed to;
/// `None` forces shadow mode regardless of the tracking-mode setting.
pub fn process_tx(
    tx: &StoreTx<'_>,
    event: &ParsedEvent,
    ledger_actor: Option<Actor>,
    auto_promote_window: Duration,
    now: DateTime<Utc>,
) -> Result<IngestOutcome, IngestError> {
    if tx.processed_message(&event.event_id)?.is_some() {
        return Ok(IngestOutcome::Duplicate);
    }

    if let Some(reason) = event.contract_violation() {
        tx.insert_processed_message(&event_row(
            event,
            ProcessedStatus::ParseError,
            None,
            json!({ "secondary_key": event.secondary_key, "reason": reason }),
            now,
        ))?;
        return Ok(IngestOutcome::Rejected {
            reason: reason.to_string(),
        });
    }

    if let Some(key) = event.secondary_key.as_deref() {
        if let Some(original) = tx.find_processed_by_secondary(key, event.amount)? {
            tx.insert_processed_message(&event_row(
                event,
                ProcessedStatus::IgnoredDuplicate,
                None,
                json!({
                    "secondary_key": event.secondary_key,
                    "duplicate_of": original.event_id,
                }),
                now,
            ))?;
            return Ok(IngestOutcome::SecondaryDuplicate {
                original_event_id: original.event_id,
            });
        }
    }

    let matched = record_match_tx(
        tx,
        &event.identity_key,
        event.identity_display.as_deref(),
        event.amount,
        auto_promote_window,
        now,
    )?;

    if matched.record.state == TrustState::Blocked {
        tx.insert_processed_message(&event_row(
            event,
            ProcessedStatus::BlockedSender,
            None,
            json!({ "secondary_key": event.secondary_key }),
            now,
        ))?;
        return Ok(IngestOutcome::Blocked);
    }

    let mode = tx.tracking_mode()?;
    let actor = match (mode, ledger_actor) {
        (TrackingMode::Auto, Some(actor)) => actor,
        _ => {
            let status = if matched.first_seen {
                ProcessedStatus::QuarantinedUnknownSender
            } else {
                ProcessedStatus::ShadowApprovedMatch
            };
            let shadow_reason = if mode == TrackingMode::Manual {
                "manual_mode"
            } else {
                "no_ledger_actor"
            };
            tx.insert_processed_message(&event_row(
                event,
                status,
                None,
                json!({
                    "secondary_key": event.secondary_key,
                    "shadow_reason": shadow_reason,
                }),
                now,
            ))?;
            return Ok(IngestOutcome::Shadow {
                status,
                first_seen: matched.first_seen,
            });
        }
    };

    let receipt = add_tx(tx, actor, event.amount, now)?;
    tx.insert_processed_message(&event_row(
        event,
        ProcessedStatus::Added,
        Some(receipt.movement_id),
        json!({
            "secondary_key": event.secondary_key,
            "auto_promoted": matched.auto_promoted,
        }),
        now,
    ))?;
    Ok(IngestOutcome::Added {
        movement_id: receipt.movement_id,
        new_total: receipt.new_total,
        first_seen: matched.first_seen,
        auto_promoted: matched.auto_promoted,
    })
}

/// Record an upstream parse rejection, once per event id. Messages with no
/// payment pattern at all are classified `ignored_unmatched`; malformed
/// payment-like messages land as `parse_error`.
pub fn record_rejection_tx(
    tx: &StoreTx<'_>,
    rejection: &ParseRejection,
    now: DateTime<Utc>,
) -> Result<IngestOutcome, IngestError> {
    if tx.processed_message(&rejection.event_id)?.is_some() {
        return Ok(IngestOutcome::Duplicate);
    }
    let status = match rejection.kind {
        RejectionKind::Unmatched => ProcessedStatus::IgnoredUnmatched,
        RejectionKind::Malformed => ProcessedStatus::ParseError,
    };
    tx.insert_processed_message(&ProcessedMessage {
        id: 0,
        event_id: rejection.event_id.clone(),
        source_ref: rejection.source_ref.clone(),
        sender_identity: None,
        summary: Some(rejection.reason.clone()),
        event_time: None,
        parsed_amount: None,
        parsed_name: None,
        status,
        movement_id: None,
        processed_at: now,
        notes: Some(json!({ "reason": rejection.reason })),
    })?;
    Ok(IngestOutcome::Rejected {
        reason: rejection.reason.clone(),
    })
}

/// Notification text for outcomes that surface new information. Routine
/// classifications (duplicates, shadow matches of known senders) are silent.
pub fn notification_text(event: &ParsedEvent, outcome: &IngestOutcome) -> Option<String> {
    let who = event
        .identity_display
        .as_deref()
        .unwrap_or(&event.identity_key);
    match outcome {
        IngestOutcome::Added {
            new_total,
            first_seen,
            ..
        } => {
            let prefix = if *first_seen { "New sender. " } else { "" };
            Some(format!(
                "{prefix}Added ${} from {who}. Total ${new_total}.",
                event.amount
            ))
        }
        IngestOutcome::Shadow {
            first_seen: true, ..
        } => Some(format!(
            "New sender {who} quarantined (${}, not applied).",
            event.amount
        )),
        IngestOutcome::Blocked => Some(format!(
            "Ignored ${} from blocked sender {who}.",
            event.amount
        )),
        _ => None,
    }
}

/// The pipeline: a store, the actor applied adds are attributed to, and a
/// notification channel.
pub struct IngestPipeline {
    store: Store,
    ledger_actor: Option<Actor>,
    auto_promote_window: Duration,
    notifier: Arc<dyn Notifier>,
}

impl IngestPipeline {
    pub fn new(store: Store, config: &TallyConfig, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            store,
            ledger_actor: config.primary_operator().map(Actor::Operator),
            auto_promote_window: config.auto_promote_window(),
            notifier,
        }
    }

    /// Classify and apply one event (one transaction, no notification).
    pub fn process(&self, event: &ParsedEvent) -> Result<IngestOutcome, IngestError> {
        let outcome = self.store.with_tx(|tx| {
            process_tx(
                tx,
                event,
                self.ledger_actor,
                self.auto_promote_window,
                Utc::now(),
            )
        })?;
        debug!(event_id = %event.event_id, ?outcome, "event processed");
        Ok(outcome)
    }

    /// Process, then deliver any notification. Delivery failure is logged
    /// and never affects the committed outcome.
    pub async fn ingest(&self, event: &ParsedEvent) -> Result<IngestOutcome, IngestError> {
        let outcome = self.process(event)?;
        if let Some(text) = notification_text(event, &outcome) {
            if let Err(error) = self.notifier.notify(&text).await {
                warn!(%error, event_id = %event.event_id, "notification dropped");
            }
        }
        Ok(outcome)
    }

    pub fn record_rejection(&self, rejection: &ParseRejection) -> Result<IngestOutcome, IngestError> {
        self.store
            .with_tx(|tx| record_rejection_tx(tx, rejection, Utc::now()))
    }
}
