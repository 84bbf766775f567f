//! The ledger transaction engine
//!
//! Operations come in two layers: `*_tx` functions that run inside an
//! already-open store transaction (so the ingestion pipeline can compose a
//! ledger add with its own writes atomically), and the `LedgerEngine`
//! methods that open one transaction per call.

use chrono::{DateTime, Duration, Utc};
use tally_core::{Actor, Amount, FeeSchedule, ReleaseBreakdown, TallyConfig};
use tally_store::{
    Confirmation, GlobalState, Movement, MovementKind, Store, StoreError, StoreTx,
};
use tally_trust::block_sender_tx;
use tracing::info;

use crate::error::LedgerError;

/// Result of a plain add.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddReceipt {
    pub movement_id: i64,
    pub new_total: Amount,
    pub session_id: i64,
}

/// Result of a manual add: the add receipt plus the confirmation window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManualAddReceipt {
    pub add: AddReceipt,
    pub expires_at: DateTime<Utc>,
}

/// What a release did, or the explicit "nothing to release" state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// Total was zero; no movement logged, session unchanged
    Nothing,
    Released(ReleaseSummary),
}

/// A finalized release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseSummary {
    pub movement_id: i64,
    /// The session this release closed
    pub session_closed: i64,
    pub breakdown: ReleaseBreakdown,
    pub released_at: DateTime<Utc>,
}

/// What an undo did, or the explicit "empty log" state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UndoOutcome {
    /// The movement log is empty
    Nothing,
    Undone(UndoReceipt),
}

/// A compensated movement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndoReceipt {
    /// The movement that was removed
    pub movement: Movement,
    pub new_total: Amount,
    pub session_id: i64,
    /// The deleted confirmation, if the undone add had one; carries the
    /// transport refs the caller needs to retract the approval request
    pub confirmation: Option<Confirmation>,
}

/// Result of an admin reversal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReversalReceipt {
    pub reversal_id: i64,
    pub reversal_movement_id: i64,
    pub amount: Amount,
    pub new_total: Amount,
    pub payer_key: String,
    /// True when the sender was blocked in the same transaction
    pub sender_blocked: bool,
}

/// Read-only snapshot for the operator panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Overview {
    pub state: GlobalState,
    /// Pending confirmations, counted after the expiry sweep
    pub pending_confirmations: i64,
    /// What a release right now would pay out
    pub preview: ReleaseBreakdown,
}

/// Add `amount` to the total inside an open transaction.
pub fn add_tx(
    tx: &StoreTx<'_>,
    actor: Actor,
    amount: Amount,
    now: DateTime<Utc>,
) -> Result<AddReceipt, LedgerError> {
    if !amount.is_positive() {
        return Err(LedgerError::InvalidAmount);
    }
    let state = tx.global_state()?;
    let new_total = state.total.checked_add(amount).ok_or(LedgerError::Overflow)?;
    let movement_id = tx.insert_movement(
        state.session_id,
        MovementKind::Add,
        amount,
        new_total,
        actor,
        now,
    )?;
    tx.set_state(new_total, state.session_id)?;
    Ok(AddReceipt {
        movement_id,
        new_total,
        session_id: state.session_id,
    })
}

/// Release the total inside an open transaction.
pub fn release_tx(
    tx: &StoreTx<'_>,
    actor: Actor,
    fees: &FeeSchedule,
    now: DateTime<Utc>,
) -> Result<ReleaseOutcome, LedgerError> {
    let state = tx.global_state()?;
    if !state.total.is_positive() {
        return Ok(ReleaseOutcome::Nothing);
    }
    let breakdown = fees.breakdown(state.total);
    let movement_id = tx.insert_movement(
        state.session_id,
        MovementKind::Release,
        state.total,
        Amount::ZERO,
        actor,
        now,
    )?;
    tx.insert_release(
        movement_id,
        state.session_id,
        breakdown.total,
        breakdown.fee,
        breakdown.net,
        actor,
        now,
    )?;
    tx.set_state(Amount::ZERO, state.session_id + 1)?;
    Ok(ReleaseOutcome::Released(ReleaseSummary {
        movement_id,
        session_closed: state.session_id,
        breakdown,
        released_at: now,
    }))
}

/// Compensate the single most recent movement inside an open transaction.
pub fn undo_tx(tx: &StoreTx<'_>) -> Result<UndoOutcome, LedgerError> {
    let Some(movement) = tx.latest_movement()? else {
        return Ok(UndoOutcome::Nothing);
    };
    let state = tx.global_state()?;

    let receipt = match movement.kind {
        MovementKind::Add => {
            let new_total = state.total.saturating_sub(movement.amount);
            let confirmation = tx.confirmation(movement.id)?;
            tx.delete_confirmation(movement.id)?;
            tx.delete_movement(movement.id)?;
            // Undoing an add right after a release walks the session back too
            let session_id = movement.session_id;
            tx.set_state(new_total, session_id)?;
            UndoReceipt {
                movement,
                new_total,
                session_id,
                confirmation,
            }
        }
        MovementKind::Release => {
            tx.delete_release(movement.id)?;
            tx.delete_movement(movement.id)?;
            tx.set_state(movement.amount, movement.session_id)?;
            UndoReceipt {
                new_total: movement.amount,
                session_id: movement.session_id,
                confirmation: None,
                movement,
            }
        }
        MovementKind::Reversal => {
            let reversal = tx.reversal_by_movement(movement.id)?.ok_or_else(|| {
                StoreError::Corrupt(format!("reversal movement {} has no record", movement.id))
            })?;
            tx.delete_reversal(reversal.id)?;
            tx.delete_movement(movement.id)?;
            let new_total = state
                .total
                .checked_add(movement.amount)
                .ok_or(LedgerError::Overflow)?;
            tx.set_state(new_total, state.session_id)?;
            UndoReceipt {
                movement,
                new_total,
                session_id: state.session_id,
                confirmation: None,
            }
        }
    };

    Ok(UndoOutcome::Undone(receipt))
}

/// Apply an admin reversal for a previously auto-applied event, inside an
/// open transaction. At most one reversal can exist per event id.
pub fn reverse_tx(
    tx: &StoreTx<'_>,
    event_id: &str,
    by: Actor,
    reason: Option<&str>,
    block_sender: bool,
    now: DateTime<Utc>,
) -> Result<ReversalReceipt, LedgerError> {
    let processed = tx
        .processed_message(event_id)?
        .ok_or_else(|| LedgerError::UnknownEvent(event_id.to_string()))?;
    let (Some(original_movement_id), Some(amount)) =
        (processed.movement_id, processed.parsed_amount)
    else {
        return Err(LedgerError::NotReversible(event_id.to_string()));
    };
    // The processed row keeps its movement_id after an undo deletes the
    // movement; a reversal then has nothing left to compensate.
    if tx.movement(original_movement_id)?.is_none() {
        return Err(LedgerError::NotReversible(event_id.to_string()));
    }
    if tx.reversal_for_event(event_id)?.is_some() {
        return Err(LedgerError::AlreadyReversed(event_id.to_string()));
    }

    let state = tx.global_state()?;
    let new_total = state.total.saturating_sub(amount);
    let reversal_movement_id = tx.insert_movement(
        state.session_id,
        MovementKind::Reversal,
        amount,
        new_total,
        by,
        now,
    )?;
    tx.set_state(new_total, state.session_id)?;

    let payer_key = processed
        .sender_identity
        .clone()
        .unwrap_or_else(|| "unknown".to_string());
    let reversal_id = tx.insert_reversal(&tally_store::Reversal {
        id: 0,
        event_id: event_id.to_string(),
        original_movement_id,
        reversal_movement_id,
        payer_key: payer_key.clone(),
        payer_display: processed.parsed_name.clone(),
        amount,
        reason: reason.map(str::to_string),
        reversed_by: by,
        reversed_at: now,
    })?;

    let sender_blocked = if block_sender && processed.sender_identity.is_some() {
        block_sender_tx(tx, &payer_key, by, now)?;
        true
    } else {
        false
    };

    info!(event_id, amount = %amount, sender_blocked, "reversal applied");
    Ok(ReversalReceipt {
        reversal_id,
        reversal_movement_id,
        amount,
        new_total,
        payer_key,
        sender_blocked,
    })
}

/// One-transaction-per-operation surface over the engine.
pub struct LedgerEngine {
    store: Store,
    fees: FeeSchedule,
    confirmation_expiry: Duration,
}

impl LedgerEngine {
    pub fn new(store: Store, config: &TallyConfig) -> Self {
        Self {
            store,
            fees: config.fee_schedule(),
            confirmation_expiry: config.confirmation_expiry(),
        }
    }

    pub fn fees(&self) -> &FeeSchedule {
        &self.fees
    }

    /// Plain add (no confirmation) - the auto-ingestion path.
    pub fn add(&self, actor: Actor, amount: Amount) -> Result<AddReceipt, LedgerError> {
        let receipt = self
            .store
            .with_tx(|tx| add_tx(tx, actor, amount, Utc::now()))?;
        info!(actor = %actor, amount = %amount, total = %receipt.new_total, "add applied");
        Ok(receipt)
    }

    /// Manual add: the movement plus its pending confirmation, atomically.
    pub fn add_manual(
        &self,
        actor: Actor,
        amount: Amount,
        chat_ref: Option<i64>,
        message_ref: Option<i64>,
    ) -> Result<ManualAddReceipt, LedgerError> {
        let expiry = self.confirmation_expiry;
        let receipt = self.store.with_tx(|tx| {
            let now = Utc::now();
            let add = add_tx(tx, actor, amount, now)?;
            let expires_at = now + expiry;
            tx.insert_confirmation(&Confirmation {
                movement_id: add.movement_id,
                actor,
                amount,
                created_at: now,
                expires_at,
                is_confirmed: false,
                confirmed_at: None,
                confirmed_by: None,
                chat_ref,
                message_ref,
            })?;
            Ok::<_, LedgerError>(ManualAddReceipt { add, expires_at })
        })?;
        info!(
            actor = %actor,
            amount = %amount,
            movement_id = receipt.add.movement_id,
            "manual add pending confirmation"
        );
        Ok(receipt)
    }

    pub fn release(&self, actor: Actor) -> Result<ReleaseOutcome, LedgerError> {
        let fees = self.fees;
        let outcome = self
            .store
            .with_tx(|tx| release_tx(tx, actor, &fees, Utc::now()))?;
        if let ReleaseOutcome::Released(summary) = &outcome {
            info!(
                actor = %actor,
                total = %summary.breakdown.total,
                net = %summary.breakdown.net,
                "released"
            );
        }
        Ok(outcome)
    }

    pub fn undo(&self) -> Result<UndoOutcome, LedgerError> {
        let outcome = self.store.with_tx(undo_tx)?;
        if let UndoOutcome::Undone(receipt) = &outcome {
            info!(
                kind = receipt.movement.kind.as_str(),
                total = %receipt.new_total,
                "undone"
            );
        }
        Ok(outcome)
    }

    pub fn reverse(
        &self,
        event_id: &str,
        by: Actor,
        reason: Option<&str>,
        block_sender: bool,
    ) -> Result<ReversalReceipt, LedgerError> {
        self.store
            .with_tx(|tx| reverse_tx(tx, event_id, by, reason, block_sender, Utc::now()))
    }

    /// Panel snapshot. Sweeps expired confirmations first so the pending
    /// count is never stale.
    pub fn overview(&self) -> Result<Overview, LedgerError> {
        let fees = self.fees;
        self.store.with_tx(|tx| {
            tx.sweep_expired_confirmations(Utc::now())?;
            let state = tx.global_state()?;
            Ok(Overview {
                pending_confirmations: tx.pending_confirmation_count()?,
                preview: fees.breakdown(state.total),
                state,
            })
        })
    }

    /// Release history, newest first.
    pub fn recent_releases(
        &self,
        limit: u32,
    ) -> Result<Vec<tally_store::ReleaseRecord>, LedgerError> {
        Ok(self.store.with_tx(|tx| tx.recent_releases(limit))?)
    }

    /// The full movement log, oldest first (audit trail).
    pub fn movements(&self) -> Result<Vec<Movement>, LedgerError> {
        Ok(self.store.with_tx(|tx| tx.all_movements())?)
    }
}
