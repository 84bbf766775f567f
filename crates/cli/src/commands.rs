//! CLI commands

use std::path::Path;

use tally_core::Amount;
use tally_ingest::{IngestOutcome, ParsedEvent};
use tally_ledger::{ConfirmOutcome, ReleaseOutcome, UndoOutcome};
use tally_store::{MovementKind, TrackingMode};

use crate::context::AppContext;

/// Status panel: total, session, mode, pending approvals, release preview
pub fn status(ctx: &AppContext) -> Result<(), anyhow::Error> {
    let overview = ctx.engine.overview()?;
    let mode = ctx.store.with_tx(|tx| tx.tracking_mode())?;

    println!("💰 Total: ${}", overview.state.total);
    println!("   Session: {}", overview.state.session_id);
    println!("   Mode: {}", mode.as_str());
    println!("   Pending confirmations: {}", overview.pending_confirmations);
    println!(
        "   Release preview: fee ${} → net ${}",
        overview.preview.fee, overview.preview.net
    );
    Ok(())
}

/// Manual add; opens a time-boxed confirmation
pub fn add(ctx: &AppContext, operator: i64, amount: &str) -> Result<(), anyhow::Error> {
    let actor = ctx.require_operator(operator)?;
    let amount: Amount = amount.parse()?;

    let receipt = ctx.engine.add_manual(actor, amount, None, None)?;
    println!(
        "✅ Added ${} (movement {}, total ${})",
        amount, receipt.add.movement_id, receipt.add.new_total
    );
    println!(
        "   Confirmation pending until {} — `tally confirm {}` to approve early",
        receipt.expires_at.format("%Y-%m-%d %H:%M UTC"),
        receipt.add.movement_id
    );
    Ok(())
}

/// Release the total: fee taken, counter reset, session advanced
pub fn release(ctx: &AppContext, operator: i64) -> Result<(), anyhow::Error> {
    let actor = ctx.require_operator(operator)?;

    match ctx.engine.release(actor)? {
        ReleaseOutcome::Nothing => {
            println!("Nothing to release (total is zero)");
        }
        ReleaseOutcome::Released(summary) => {
            println!(
                "✅ Released ${} (fee ${}, net ${})",
                summary.breakdown.total, summary.breakdown.fee, summary.breakdown.net
            );
            println!("   Session {} closed", summary.session_closed);
        }
    }
    Ok(())
}

/// Undo the single most recent movement
pub fn undo(ctx: &AppContext, operator: i64) -> Result<(), anyhow::Error> {
    ctx.require_operator(operator)?;

    match ctx.engine.undo()? {
        UndoOutcome::Nothing => {
            println!("Nothing to undo (movement log is empty)");
        }
        UndoOutcome::Undone(receipt) => {
            let what = match receipt.movement.kind {
                MovementKind::Add => "add",
                MovementKind::Release => "release",
                MovementKind::Reversal => "reversal",
            };
            println!(
                "✅ Undid {} of ${} (total ${}, session {})",
                what, receipt.movement.amount, receipt.new_total, receipt.session_id
            );
        }
    }
    Ok(())
}

/// Recent releases, newest first
pub fn history(ctx: &AppContext, limit: u32) -> Result<(), anyhow::Error> {
    let releases = ctx.engine.recent_releases(limit)?;
    if releases.is_empty() {
        println!("No releases yet");
        return Ok(());
    }
    println!("Last {} release(s):", releases.len());
    for r in &releases {
        println!(
            "  {}  session {}  ${} → net ${}  by {}",
            r.released_at.format("%Y-%m-%d %H:%M"),
            r.session_id,
            r.released_total,
            r.net,
            r.released_by
        );
    }
    Ok(())
}

/// Approve a pending confirmation. Idempotent.
pub fn confirm(ctx: &AppContext, movement_id: i64, operator: i64) -> Result<(), anyhow::Error> {
    let actor = ctx.require_operator(operator)?;

    match ctx.workflow.confirm(movement_id, actor)? {
        ConfirmOutcome::Confirmed(c) => {
            println!("✅ Confirmed movement {} (${})", movement_id, c.amount);
        }
        ConfirmOutcome::AlreadyConfirmed(c) => {
            println!(
                "Movement {} was already confirmed by {}",
                movement_id,
                c.confirmed_by
                    .map(|a| a.to_string())
                    .unwrap_or_else(|| "?".to_string())
            );
        }
    }
    Ok(())
}

pub fn mode_get(ctx: &AppContext) -> Result<(), anyhow::Error> {
    let mode = ctx.store.with_tx(|tx| tx.tracking_mode())?;
    println!("Tracking mode: {}", mode.as_str());
    Ok(())
}

pub fn mode_set(ctx: &AppContext, mode: &str, operator: i64) -> Result<(), anyhow::Error> {
    ctx.require_operator(operator)?;
    let mode = TrackingMode::parse_str(mode)
        .ok_or_else(|| anyhow::anyhow!("Unknown mode '{mode}' (expected auto or manual)"))?;
    ctx.store.with_tx(|tx| tx.set_tracking_mode(mode))?;
    println!("✅ Tracking mode set to {}", mode.as_str());
    Ok(())
}

pub fn trust_list(ctx: &AppContext) -> Result<(), anyhow::Error> {
    let senders = ctx.trust.list()?;
    if senders.is_empty() {
        println!("No senders seen yet");
        return Ok(());
    }
    for s in &senders {
        let display = s.display_name_hint.as_deref().unwrap_or("-");
        println!(
            "  {:<12} {}  ({})  seen {}×, last {}",
            s.state.as_str(),
            s.identity_key,
            display,
            s.seen_count,
            s.last_seen_at.format("%Y-%m-%d")
        );
    }
    Ok(())
}

pub fn trust_approve(ctx: &AppContext, key: &str, operator: i64) -> Result<(), anyhow::Error> {
    let actor = ctx.require_operator(operator)?;
    let record = ctx.trust.approve(key, actor)?;
    println!("✅ Approved {}", record.identity_key);
    Ok(())
}

pub fn trust_block(ctx: &AppContext, key: &str, operator: i64) -> Result<(), anyhow::Error> {
    let actor = ctx.require_operator(operator)?;
    let record = ctx.trust.block(key, actor)?;
    println!("✅ Blocked {} (future events will be ignored)", record.identity_key);
    Ok(())
}

/// Recent auto-applied entries, the candidates for `reversal apply`
pub fn reversal_list(ctx: &AppContext, limit: u32) -> Result<(), anyhow::Error> {
    let rows = ctx.store.with_tx(|tx| tx.recent_added_messages(limit))?;
    if rows.is_empty() {
        println!("No auto-applied entries");
        return Ok(());
    }
    for row in &rows {
        let amount = row
            .parsed_amount
            .map(|a| format!("${a}"))
            .unwrap_or_else(|| "?".to_string());
        println!(
            "  {}  {}  {} from {}",
            row.processed_at.format("%Y-%m-%d %H:%M"),
            row.event_id,
            amount,
            row.sender_identity.as_deref().unwrap_or("?")
        );
    }
    Ok(())
}

pub fn reversal_apply(
    ctx: &AppContext,
    event_id: &str,
    operator: i64,
    reason: Option<&str>,
    block_sender: bool,
) -> Result<(), anyhow::Error> {
    let actor = ctx.require_operator(operator)?;
    let receipt = ctx.engine.reverse(event_id, actor, reason, block_sender)?;
    println!(
        "✅ Reversed ${} from {} (total ${})",
        receipt.amount, receipt.payer_key, receipt.new_total
    );
    if receipt.sender_blocked {
        println!("   Sender blocked");
    }
    Ok(())
}

/// Feed a JSON file of parsed events through the ingestion pipeline.
pub async fn ingest_batch(ctx: &AppContext, file: &Path) -> Result<(), anyhow::Error> {
    let content = std::fs::read_to_string(file)?;
    let events: Vec<ParsedEvent> = serde_json::from_str(&content)?;

    let mut added = 0;
    let mut skipped = 0;
    for event in &events {
        let outcome = ctx.pipeline.ingest(event).await?;
        let label = match &outcome {
            IngestOutcome::Added { new_total, .. } => {
                added += 1;
                format!("added (total ${new_total})")
            }
            IngestOutcome::Duplicate => {
                skipped += 1;
                "duplicate".to_string()
            }
            IngestOutcome::SecondaryDuplicate { original_event_id } => {
                skipped += 1;
                format!("duplicate of {original_event_id}")
            }
            IngestOutcome::Rejected { reason } => {
                skipped += 1;
                format!("rejected: {reason}")
            }
            IngestOutcome::Blocked => {
                skipped += 1;
                "blocked sender".to_string()
            }
            IngestOutcome::Shadow { status, .. } => {
                skipped += 1;
                format!("shadow ({})", status.as_str())
            }
        };
        println!("  {}  {}", event.event_id, label);
    }
    println!("✅ Processed {} event(s): {} added, {} skipped", events.len(), added, skipped);
    Ok(())
}
