//! Trust registry - transitions and match bookkeeping

use chrono::{DateTime, Duration, Utc};
use tally_core::{Actor, Amount};
use tally_store::{SenderTrust, Store, StoreError, StoreTx, TrustState};
use thiserror::Error;
use tracing::info;

/// Errors from trust operations
#[derive(Debug, Error)]
pub enum TrustError {
    #[error("Unknown sender: {0}")]
    UnknownSender(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result of recording a matched event for an identity.
#[derive(Debug, Clone)]
pub struct MatchOutcome {
    /// The record after bookkeeping and any transition
    pub record: SenderTrust,
    /// True when this match created the record (first-seen identity)
    pub first_seen: bool,
    /// True when this match triggered quarantine -> approved auto-promotion
    pub auto_promoted: bool,
}

/// Record a matched event for `identity_key` inside an open transaction.
///
/// Creates the record in quarantine on first sight; auto-promotes a
/// quarantined identity whose deadline has elapsed; always refreshes the
/// match bookkeeping. Never transitions approved or blocked identities.
pub fn record_match_tx(
    tx: &StoreTx<'_>,
    identity_key: &str,
    display_name: Option<&str>,
    amount: Amount,
    auto_promote_window: Duration,
    now: DateTime<Utc>,
) -> Result<MatchOutcome, StoreError> {
    match tx.sender_trust(identity_key)? {
        None => {
            let record = SenderTrust {
                id: 0,
                identity_key: identity_key.to_string(),
                state: TrustState::Quarantine,
                first_seen_at: now,
                last_seen_at: now,
                seen_count: 1,
                auto_promote_at: Some(now + auto_promote_window),
                approved_at: None,
                approved_by: None,
                blocked_at: None,
                blocked_by: None,
                last_matched: Some(amount),
                display_name_hint: display_name.map(str::to_string),
            };
            let id = tx.insert_sender_trust(&record)?;
            info!(identity_key, "new sender quarantined");
            Ok(MatchOutcome {
                record: SenderTrust { id, ..record },
                first_seen: true,
                auto_promoted: false,
            })
        }
        Some(mut record) => {
            let auto_promoted = record.state == TrustState::Quarantine
                && record.auto_promote_at.is_some_and(|at| now >= at);
            if auto_promoted {
                record.state = TrustState::Approved;
                record.auto_promote_at = None;
                record.approved_at = Some(now);
                record.approved_by = Some(Actor::System);
                info!(identity_key, "sender auto-promoted to approved");
            }

            record.last_seen_at = now;
            record.seen_count += 1;
            record.last_matched = Some(amount);
            if let Some(name) = display_name {
                record.display_name_hint = Some(name.to_string());
            }
            tx.update_sender_trust(&record)?;

            Ok(MatchOutcome {
                record,
                first_seen: false,
                auto_promoted,
            })
        }
    }
}

/// Manually approve a sender, from any state (including blocked).
pub fn approve_sender_tx(
    tx: &StoreTx<'_>,
    identity_key: &str,
    by: Actor,
    now: DateTime<Utc>,
) -> Result<SenderTrust, TrustError> {
    let mut record = tx
        .sender_trust(identity_key)?
        .ok_or_else(|| TrustError::UnknownSender(identity_key.to_string()))?;
    record.state = TrustState::Approved;
    record.auto_promote_at = None;
    record.approved_at = Some(now);
    record.approved_by = Some(by);
    tx.update_sender_trust(&record)?;
    info!(identity_key, by = %by, "sender approved");
    Ok(record)
}

/// Manually block a sender. Blocked is sticky: its events are recorded but
/// never reach the ledger until a manual re-approve.
pub fn block_sender_tx(
    tx: &StoreTx<'_>,
    identity_key: &str,
    by: Actor,
    now: DateTime<Utc>,
) -> Result<SenderTrust, TrustError> {
    let mut record = tx
        .sender_trust(identity_key)?
        .ok_or_else(|| TrustError::UnknownSender(identity_key.to_string()))?;
    record.state = TrustState::Blocked;
    record.auto_promote_at = None;
    record.blocked_at = Some(now);
    record.blocked_by = Some(by);
    tx.update_sender_trust(&record)?;
    info!(identity_key, by = %by, "sender blocked");
    Ok(record)
}

/// High-level trust surface over the store.
pub struct TrustRegistry {
    store: Store,
    auto_promote_window: Duration,
}

impl TrustRegistry {
    pub fn new(store: Store, auto_promote_window: Duration) -> Self {
        Self {
            store,
            auto_promote_window,
        }
    }

    /// Record a matched event for an identity (own transaction).
    pub fn record_match(
        &self,
        identity_key: &str,
        display_name: Option<&str>,
        amount: Amount,
    ) -> Result<MatchOutcome, TrustError> {
        let window = self.auto_promote_window;
        self.store.with_tx(|tx| {
            record_match_tx(tx, identity_key, display_name, amount, window, Utc::now())
                .map_err(TrustError::from)
        })
    }

    pub fn approve(&self, identity_key: &str, by: Actor) -> Result<SenderTrust, TrustError> {
        self.store
            .with_tx(|tx| approve_sender_tx(tx, identity_key, by, Utc::now()))
    }

    pub fn block(&self, identity_key: &str, by: Actor) -> Result<SenderTrust, TrustError> {
        self.store
            .with_tx(|tx| block_sender_tx(tx, identity_key, by, Utc::now()))
    }

    pub fn get(&self, identity_key: &str) -> Result<Option<SenderTrust>, TrustError> {
        Ok(self.store.with_tx(|tx| tx.sender_trust(identity_key))?)
    }

    pub fn list(&self) -> Result<Vec<SenderTrust>, TrustError> {
        Ok(self.store.with_tx(|tx| tx.list_sender_trust())?)
    }
}
