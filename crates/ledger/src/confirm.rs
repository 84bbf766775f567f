//! Confirmation workflow
//!
//! Every manual add opens a pending confirmation. It becomes confirmed by
//! exactly one of two causes: explicit approval by the confirming operator,
//! or the expiry sweep once its window has elapsed. There is no rejected
//! state - an unwanted add is removed with undo, which deletes the
//! confirmation along with the movement.

use chrono::{DateTime, Utc};
use tally_core::Actor;
use tally_store::{Confirmation, Store, StoreError, StoreTx};
use tracing::info;

use crate::error::LedgerError;

/// Result of an approval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmOutcome {
    /// Transitioned pending -> confirmed
    Confirmed(Confirmation),
    /// Was already confirmed (by an operator or the sweep). Still carries
    /// the transport refs so the caller can clean up the request artifact.
    AlreadyConfirmed(Confirmation),
}

impl ConfirmOutcome {
    pub fn confirmation(&self) -> &Confirmation {
        match self {
            ConfirmOutcome::Confirmed(c) | ConfirmOutcome::AlreadyConfirmed(c) => c,
        }
    }
}

/// Confirm a pending confirmation inside an open transaction. Idempotent.
pub fn confirm_tx(
    tx: &StoreTx<'_>,
    movement_id: i64,
    by: Actor,
    now: DateTime<Utc>,
) -> Result<ConfirmOutcome, LedgerError> {
    let record = tx
        .confirmation(movement_id)?
        .ok_or_else(|| StoreError::NotFound(format!("confirmation for movement {movement_id}")))?;
    if record.is_confirmed {
        return Ok(ConfirmOutcome::AlreadyConfirmed(record));
    }
    tx.mark_confirmed(movement_id, by, now)?;
    Ok(ConfirmOutcome::Confirmed(Confirmation {
        is_confirmed: true,
        confirmed_at: Some(now),
        confirmed_by: Some(by),
        ..record
    }))
}

/// The approve / sweep surface over pending confirmations.
pub struct ConfirmationWorkflow {
    store: Store,
}

impl ConfirmationWorkflow {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Explicit approval by the confirming operator. Idempotent.
    pub fn confirm(&self, movement_id: i64, by: Actor) -> Result<ConfirmOutcome, LedgerError> {
        let outcome = self
            .store
            .with_tx(|tx| confirm_tx(tx, movement_id, by, Utc::now()))?;
        if let ConfirmOutcome::Confirmed(c) = &outcome {
            info!(movement_id, by = %by, amount = %c.amount, "confirmed");
        }
        Ok(outcome)
    }

    /// Auto-confirm everything whose window has elapsed. Returns how many
    /// confirmations the sweep closed.
    pub fn sweep(&self) -> Result<usize, LedgerError> {
        let swept = self
            .store
            .with_tx(|tx| tx.sweep_expired_confirmations(Utc::now()))?;
        if swept > 0 {
            info!(swept, "expired confirmations auto-confirmed");
        }
        Ok(swept)
    }

    /// Pending confirmations, after a sweep so the answer is never stale.
    pub fn pending(&self) -> Result<Vec<Confirmation>, LedgerError> {
        Ok(self.store.with_tx(|tx| {
            tx.sweep_expired_confirmations(Utc::now())?;
            tx.pending_confirmations()
        })?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::LedgerEngine;
    use chrono::Duration;
    use tally_core::{Amount, TallyConfig};

    fn setup() -> (LedgerEngine, ConfirmationWorkflow, Store) {
        let store = Store::in_memory().unwrap();
        let config = TallyConfig {
            operators: vec![1001, 2002],
            ..TallyConfig::default()
        };
        (
            LedgerEngine::new(store.clone(), &config),
            ConfirmationWorkflow::new(store.clone()),
            store,
        )
    }

    fn amount(minor: i64) -> Amount {
        Amount::from_minor_units(minor).unwrap()
    }

    #[test]
    fn test_explicit_confirm() {
        let (engine, workflow, _) = setup();
        let receipt = engine
            .add_manual(Actor::Operator(1001), amount(42_000), None, None)
            .unwrap();

        let outcome = workflow
            .confirm(receipt.add.movement_id, Actor::Operator(1001))
            .unwrap();
        let ConfirmOutcome::Confirmed(confirmation) = outcome else {
            panic!("expected a fresh confirmation");
        };
        assert!(confirmation.is_confirmed);
        assert_eq!(confirmation.confirmed_by, Some(Actor::Operator(1001)));
    }

    #[test]
    fn test_confirm_is_idempotent() {
        let (engine, workflow, _) = setup();
        let receipt = engine
            .add_manual(Actor::Operator(1001), amount(42_000), Some(55), Some(900))
            .unwrap();
        workflow
            .confirm(receipt.add.movement_id, Actor::Operator(1001))
            .unwrap();

        let outcome = workflow
            .confirm(receipt.add.movement_id, Actor::Operator(2002))
            .unwrap();
        let ConfirmOutcome::AlreadyConfirmed(confirmation) = outcome else {
            panic!("expected already-confirmed");
        };
        // First confirmer attribution is preserved
        assert_eq!(confirmation.confirmed_by, Some(Actor::Operator(1001)));
        // Transport refs still surfaced for artifact cleanup
        assert_eq!(confirmation.chat_ref, Some(55));
        assert_eq!(confirmation.message_ref, Some(900));
    }

    #[test]
    fn test_confirm_unknown_movement() {
        let (_, workflow, _) = setup();
        let result = workflow.confirm(404, Actor::Operator(1001));
        assert!(matches!(
            result,
            Err(LedgerError::Store(StoreError::NotFound(_)))
        ));
    }

    #[test]
    fn test_expiry_sweep_confirms_as_system() {
        let (engine, workflow, store) = setup();
        let receipt = engine
            .add_manual(Actor::Operator(1001), amount(42_000), None, None)
            .unwrap();

        // Simulate the 24h window elapsing
        store
            .with_tx(|tx| {
                let mut c = tx
                    .confirmation(receipt.add.movement_id)?
                    .ok_or_else(|| StoreError::NotFound("confirmation".to_string()))?;
                c.expires_at = Utc::now() - Duration::minutes(1);
                tx.delete_confirmation(c.movement_id)?;
                tx.insert_confirmation(&c)
            })
            .unwrap();

        assert_eq!(workflow.sweep().unwrap(), 1);
        let confirmation = store
            .with_tx(|tx| tx.confirmation(receipt.add.movement_id))
            .unwrap()
            .unwrap();
        assert!(confirmation.is_confirmed);
        assert_eq!(confirmation.confirmed_by, Some(Actor::System));

        // Sweep again: nothing left to do
        assert_eq!(workflow.sweep().unwrap(), 0);
    }

    #[test]
    fn test_pending_sweeps_first() {
        let (engine, workflow, store) = setup();
        let expired = engine
            .add_manual(Actor::Operator(1001), amount(1_000), None, None)
            .unwrap();
        let fresh = engine
            .add_manual(Actor::Operator(1001), amount(2_000), None, None)
            .unwrap();

        store
            .with_tx(|tx| {
                let mut c = tx
                    .confirmation(expired.add.movement_id)?
                    .ok_or_else(|| StoreError::NotFound("confirmation".to_string()))?;
                c.expires_at = Utc::now() - Duration::minutes(1);
                tx.delete_confirmation(c.movement_id)?;
                tx.insert_confirmation(&c)
            })
            .unwrap();

        let pending = workflow.pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].movement_id, fresh.add.movement_id);
    }
}
