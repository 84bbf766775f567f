//! The store handle and its transactional surface
//!
//! `Store` owns the single connection behind the process-wide lock.
//! `StoreTx` is the only way to touch tables; every closure passed to
//! [`Store::with_tx`] runs as one SQLite transaction and commits only if it
//! returns `Ok`.

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tally_core::{Actor, Amount};

use crate::error::StoreError;
use crate::records::{
    Confirmation, GlobalState, Movement, MovementKind, ProcessedMessage, ProcessedStatus,
    ReleaseRecord, Reversal, SenderTrust, TrackingMode, TrustState,
};
use crate::schema;

const TRACKING_MODE_KEY: &str = "tracking_mode";

/// Handle to the SQLite database. Cheap to clone; all clones share the same
/// connection and lock.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open (or create) a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        schema::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        schema::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a closure under the process-wide lock, inside one transaction.
    ///
    /// The transaction commits only if the closure returns `Ok`; any error
    /// rolls back every statement the closure executed. The error type is
    /// generic so domain errors from higher crates roll back too.
    pub fn with_tx<T, E>(&self, f: impl FnOnce(&StoreTx<'_>) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let mut guard = self
            .conn
            .lock()
            .map_err(|_| E::from(StoreError::LockPoisoned))?;
        let tx = guard
            .transaction()
            .map_err(|e| E::from(StoreError::from(e)))?;
        let result = f(&StoreTx { tx: &tx })?;
        tx.commit().map_err(|e| E::from(StoreError::from(e)))?;
        Ok(result)
    }
}

/// Typed table operations, valid for the duration of one transaction.
pub struct StoreTx<'a> {
    tx: &'a Transaction<'a>,
}

impl StoreTx<'_> {
    // === global_state ===

    pub fn global_state(&self) -> Result<GlobalState, StoreError> {
        let state = self
            .tx
            .query_row(
                "SELECT total_minor, session_id FROM global_state WHERE id = 1",
                [],
                |row| {
                    Ok(GlobalState {
                        total: amount_field(row, 0)?,
                        session_id: row.get(1)?,
                    })
                },
            )
            .optional()?;
        state.ok_or_else(|| StoreError::Corrupt("global_state row missing".to_string()))
    }

    pub fn set_state(&self, total: Amount, session_id: i64) -> Result<(), StoreError> {
        self.tx.execute(
            "UPDATE global_state SET total_minor = ?1, session_id = ?2 WHERE id = 1",
            params![total.minor_units(), session_id],
        )?;
        Ok(())
    }

    // === movements ===

    pub fn insert_movement(
        &self,
        session_id: i64,
        kind: MovementKind,
        amount: Amount,
        total_after: Amount,
        actor: Actor,
        created_at: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        self.tx.execute(
            "INSERT INTO movements
                (session_id, kind, amount_minor, total_after_minor, actor, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                session_id,
                kind.as_str(),
                amount.minor_units(),
                total_after.minor_units(),
                actor.to_string(),
                created_at.to_rfc3339(),
            ],
        )?;
        Ok(self.tx.last_insert_rowid())
    }

    pub fn latest_movement(&self) -> Result<Option<Movement>, StoreError> {
        Ok(self
            .tx
            .query_row(
                "SELECT id, session_id, kind, amount_minor, total_after_minor, actor, created_at
                 FROM movements ORDER BY id DESC LIMIT 1",
                [],
                movement_from_row,
            )
            .optional()?)
    }

    pub fn movement(&self, id: i64) -> Result<Option<Movement>, StoreError> {
        Ok(self
            .tx
            .query_row(
                "SELECT id, session_id, kind, amount_minor, total_after_minor, actor, created_at
                 FROM movements WHERE id = ?1",
                params![id],
                movement_from_row,
            )
            .optional()?)
    }

    pub fn all_movements(&self) -> Result<Vec<Movement>, StoreError> {
        let mut stmt = self.tx.prepare(
            "SELECT id, session_id, kind, amount_minor, total_after_minor, actor, created_at
             FROM movements ORDER BY id ASC",
        )?;
        let rows = stmt.query_map([], movement_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn delete_movement(&self, id: i64) -> Result<(), StoreError> {
        let rows = self
            .tx
            .execute("DELETE FROM movements WHERE id = ?1", params![id])?;
        if rows == 0 {
            return Err(StoreError::NotFound(format!("movement {id}")));
        }
        Ok(())
    }

    // === confirmations ===

    pub fn insert_confirmation(&self, confirmation: &Confirmation) -> Result<(), StoreError> {
        self.tx.execute(
            "INSERT INTO confirmations
                (movement_id, actor, amount_minor, created_at, expires_at,
                 is_confirmed, confirmed_at, confirmed_by, chat_ref, message_ref)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                confirmation.movement_id,
                confirmation.actor.to_string(),
                confirmation.amount.minor_units(),
                confirmation.created_at.to_rfc3339(),
                confirmation.expires_at.to_rfc3339(),
                confirmation.is_confirmed,
                confirmation.confirmed_at.map(|t| t.to_rfc3339()),
                confirmation.confirmed_by.map(|a| a.to_string()),
                confirmation.chat_ref,
                confirmation.message_ref,
            ],
        )?;
        Ok(())
    }

    pub fn confirmation(&self, movement_id: i64) -> Result<Option<Confirmation>, StoreError> {
        Ok(self
            .tx
            .query_row(
                "SELECT movement_id, actor, amount_minor, created_at, expires_at,
                        is_confirmed, confirmed_at, confirmed_by, chat_ref, message_ref
                 FROM confirmations WHERE movement_id = ?1",
                params![movement_id],
                confirmation_from_row,
            )
            .optional()?)
    }

    pub fn mark_confirmed(
        &self,
        movement_id: i64,
        by: Actor,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let rows = self.tx.execute(
            "UPDATE confirmations
             SET is_confirmed = 1, confirmed_at = ?1, confirmed_by = ?2
             WHERE movement_id = ?3 AND is_confirmed = 0",
            params![at.to_rfc3339(), by.to_string(), movement_id],
        )?;
        if rows == 0 {
            return Err(StoreError::NotFound(format!(
                "unconfirmed confirmation for movement {movement_id}"
            )));
        }
        Ok(())
    }

    /// Returns false if no confirmation existed (auto-ingested adds have none).
    pub fn delete_confirmation(&self, movement_id: i64) -> Result<bool, StoreError> {
        let rows = self.tx.execute(
            "DELETE FROM confirmations WHERE movement_id = ?1",
            params![movement_id],
        )?;
        Ok(rows > 0)
    }

    /// Auto-confirm every pending confirmation whose window has elapsed.
    pub fn sweep_expired_confirmations(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let rows = self.tx.execute(
            "UPDATE confirmations
             SET is_confirmed = 1, confirmed_at = ?1, confirmed_by = ?2
             WHERE is_confirmed = 0 AND expires_at <= ?1",
            params![now.to_rfc3339(), Actor::System.to_string()],
        )?;
        Ok(rows)
    }

    pub fn pending_confirmation_count(&self) -> Result<i64, StoreError> {
        Ok(self.tx.query_row(
            "SELECT COUNT(*) FROM confirmations WHERE is_confirmed = 0",
            [],
            |row| row.get(0),
        )?)
    }

    pub fn pending_confirmations(&self) -> Result<Vec<Confirmation>, StoreError> {
        let mut stmt = self.tx.prepare(
            "SELECT movement_id, actor, amount_minor, created_at, expires_at,
                    is_confirmed, confirmed_at, confirmed_by, chat_ref, message_ref
             FROM confirmations WHERE is_confirmed = 0 ORDER BY movement_id ASC",
        )?;
        let rows = stmt.query_map([], confirmation_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    // === releases ===

    #[allow(clippy::too_many_arguments)]
    pub fn insert_release(
        &self,
        movement_id: i64,
        session_id: i64,
        released_total: Amount,
        fee: Amount,
        net: Amount,
        released_by: Actor,
        released_at: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        self.tx.execute(
            "INSERT INTO releases
                (movement_id, session_id, released_total_minor, fee_minor, net_minor,
                 released_by, released_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                movement_id,
                session_id,
                released_total.minor_units(),
                fee.minor_units(),
                net.minor_units(),
                released_by.to_string(),
                released_at.to_rfc3339(),
            ],
        )?;
        Ok(self.tx.last_insert_rowid())
    }

    pub fn release_for_movement(
        &self,
        movement_id: i64,
    ) -> Result<Option<ReleaseRecord>, StoreError> {
        Ok(self
            .tx
            .query_row(
                "SELECT id, movement_id, session_id, released_total_minor, fee_minor,
                        net_minor, released_by, released_at
                 FROM releases WHERE movement_id = ?1",
                params![movement_id],
                release_from_row,
            )
            .optional()?)
    }

    pub fn delete_release(&self, movement_id: i64) -> Result<bool, StoreError> {
        let rows = self.tx.execute(
            "DELETE FROM releases WHERE movement_id = ?1",
            params![movement_id],
        )?;
        Ok(rows > 0)
    }

    pub fn recent_releases(&self, limit: u32) -> Result<Vec<ReleaseRecord>, StoreError> {
        let mut stmt = self.tx.prepare(
            "SELECT id, movement_id, session_id, released_total_minor, fee_minor,
                    net_minor, released_by, released_at
             FROM releases ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], release_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    // === sender_trust ===

    pub fn sender_trust(&self, identity_key: &str) -> Result<Option<SenderTrust>, StoreError> {
        Ok(self
            .tx
            .query_row(
                &format!("{TRUST_SELECT} WHERE identity_key = ?1"),
                params![identity_key],
                trust_from_row,
            )
            .optional()?)
    }

    pub fn insert_sender_trust(&self, record: &SenderTrust) -> Result<i64, StoreError> {
        self.tx.execute(
            "INSERT INTO sender_trust
                (identity_key, state, first_seen_at, last_seen_at, seen_count,
                 auto_promote_at, approved_at, approved_by, blocked_at, blocked_by,
                 last_matched_minor, display_name_hint)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                record.identity_key,
                record.state.as_str(),
                record.first_seen_at.to_rfc3339(),
                record.last_seen_at.to_rfc3339(),
                record.seen_count,
                record.auto_promote_at.map(|t| t.to_rfc3339()),
                record.approved_at.map(|t| t.to_rfc3339()),
                record.approved_by.map(|a| a.to_string()),
                record.blocked_at.map(|t| t.to_rfc3339()),
                record.blocked_by.map(|a| a.to_string()),
                record.last_matched.map(|a| a.minor_units()),
                record.display_name_hint,
            ],
        )?;
        Ok(self.tx.last_insert_rowid())
    }

    pub fn update_sender_trust(&self, record: &SenderTrust) -> Result<(), StoreError> {
        let rows = self.tx.execute(
            "UPDATE sender_trust SET
                state = ?2, first_seen_at = ?3, last_seen_at = ?4, seen_count = ?5,
                auto_promote_at = ?6, approved_at = ?7, approved_by = ?8,
                blocked_at = ?9, blocked_by = ?10, last_matched_minor = ?11,
                display_name_hint = ?12
             WHERE identity_key = ?1",
            params![
                record.identity_key,
                record.state.as_str(),
                record.first_seen_at.to_rfc3339(),
                record.last_seen_at.to_rfc3339(),
                record.seen_count,
                record.auto_promote_at.map(|t| t.to_rfc3339()),
                record.approved_at.map(|t| t.to_rfc3339()),
                record.approved_by.map(|a| a.to_string()),
                record.blocked_at.map(|t| t.to_rfc3339()),
                record.blocked_by.map(|a| a.to_string()),
                record.last_matched.map(|a| a.minor_units()),
                record.display_name_hint,
            ],
        )?;
        if rows == 0 {
            return Err(StoreError::NotFound(format!(
                "sender_trust {:?}",
                record.identity_key
            )));
        }
        Ok(())
    }

    pub fn list_sender_trust(&self) -> Result<Vec<SenderTrust>, StoreError> {
        let mut stmt = self
            .tx
            .prepare(&format!("{TRUST_SELECT} ORDER BY last_seen_at DESC"))?;
        let rows = stmt.query_map([], trust_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    // === processed_ingestion_messages ===

    pub fn processed_message(
        &self,
        event_id: &str,
    ) -> Result<Option<ProcessedMessage>, StoreError> {
        Ok(self
            .tx
            .query_row(
                &format!("{PROCESSED_SELECT} WHERE event_id = ?1"),
                params![event_id],
                processed_from_row,
            )
            .optional()?)
    }

    pub fn insert_processed_message(&self, message: &ProcessedMessage) -> Result<i64, StoreError> {
        let notes = message
            .notes
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        self.tx.execute(
            "INSERT INTO processed_ingestion_messages
                (event_id, source_ref, sender_identity, summary, event_time,
                 parsed_minor, parsed_name, status, movement_id, processed_at, notes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                message.event_id,
                message.source_ref,
                message.sender_identity,
                message.summary,
                message.event_time.map(|t| t.to_rfc3339()),
                message.parsed_amount.map(|a| a.minor_units()),
                message.parsed_name,
                message.status.as_str(),
                message.movement_id,
                message.processed_at.to_rfc3339(),
                notes,
            ],
        )?;
        Ok(self.tx.last_insert_rowid())
    }

    /// Secondary-key dedup: an already-processed record carrying the same
    /// business key (in its notes blob) and the same amount.
    pub fn find_processed_by_secondary(
        &self,
        secondary_key: &str,
        amount: Amount,
    ) -> Result<Option<ProcessedMessage>, StoreError> {
        Ok(self
            .tx
            .query_row(
                &format!(
                    "{PROCESSED_SELECT}
                     WHERE json_extract(notes, '$.secondary_key') = ?1
                       AND parsed_minor = ?2
                     ORDER BY id ASC LIMIT 1"
                ),
                params![secondary_key, amount.minor_units()],
                processed_from_row,
            )
            .optional()?)
    }

    /// Recent auto-applied entries, newest first (the reversal candidates).
    pub fn recent_added_messages(&self, limit: u32) -> Result<Vec<ProcessedMessage>, StoreError> {
        let mut stmt = self.tx.prepare(&format!(
            "{PROCESSED_SELECT} WHERE status = 'added' ORDER BY id DESC LIMIT ?1"
        ))?;
        let rows = stmt.query_map(params![limit], processed_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    // === reversals ===

    pub fn insert_reversal(&self, reversal: &Reversal) -> Result<i64, StoreError> {
        self.tx.execute(
            "INSERT INTO reversals
                (event_id, original_movement_id, reversal_movement_id, payer_key,
                 payer_display, amount_minor, reason, reversed_by, reversed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                reversal.event_id,
                reversal.original_movement_id,
                reversal.reversal_movement_id,
                reversal.payer_key,
                reversal.payer_display,
                reversal.amount.minor_units(),
                reversal.reason,
                reversal.reversed_by.to_string(),
                reversal.reversed_at.to_rfc3339(),
            ],
        )?;
        Ok(self.tx.last_insert_rowid())
    }

    pub fn reversal_for_event(&self, event_id: &str) -> Result<Option<Reversal>, StoreError> {
        Ok(self
            .tx
            .query_row(
                &format!("{REVERSAL_SELECT} WHERE event_id = ?1"),
                params![event_id],
                reversal_from_row,
            )
            .optional()?)
    }

    pub fn reversal_by_movement(
        &self,
        reversal_movement_id: i64,
    ) -> Result<Option<Reversal>, StoreError> {
        Ok(self
            .tx
            .query_row(
                &format!("{REVERSAL_SELECT} WHERE reversal_movement_id = ?1"),
                params![reversal_movement_id],
                reversal_from_row,
            )
            .optional()?)
    }

    pub fn delete_reversal(&self, id: i64) -> Result<(), StoreError> {
        let rows = self
            .tx
            .execute("DELETE FROM reversals WHERE id = ?1", params![id])?;
        if rows == 0 {
            return Err(StoreError::NotFound(format!("reversal {id}")));
        }
        Ok(())
    }

    // === app_settings ===

    pub fn setting(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .tx
            .query_row(
                "SELECT value FROM app_settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?)
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.tx.execute(
            "INSERT OR REPLACE INTO app_settings (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    /// Current tracking mode; unset or unrecognized falls back to auto.
    pub fn tracking_mode(&self) -> Result<TrackingMode, StoreError> {
        Ok(self
            .setting(TRACKING_MODE_KEY)?
            .and_then(|v| TrackingMode::parse_str(&v))
            .unwrap_or_default())
    }

    pub fn set_tracking_mode(&self, mode: TrackingMode) -> Result<(), StoreError> {
        self.set_setting(TRACKING_MODE_KEY, mode.as_str())
    }
}

// === row mapping ===

const TRUST_SELECT: &str = "SELECT id, identity_key, state, first_seen_at, last_seen_at, \
     seen_count, auto_promote_at, approved_at, approved_by, blocked_at, blocked_by, \
     last_matched_minor, display_name_hint FROM sender_trust";

const PROCESSED_SELECT: &str = "SELECT id, event_id, source_ref, sender_identity, summary, \
     event_time, parsed_minor, parsed_name, status, movement_id, processed_at, notes \
     FROM processed_ingestion_messages";

const REVERSAL_SELECT: &str = "SELECT id, event_id, original_movement_id, \
     reversal_movement_id, payer_key, payer_display, amount_minor, reason, reversed_by, \
     reversed_at FROM reversals";

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        Type::Text,
        Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, message)),
    )
}

fn ts_field(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, format!("bad timestamp {text:?}: {e}")))
}

fn opt_ts_field(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        None => Ok(None),
        Some(text) => DateTime::parse_from_rfc3339(&text)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|e| conversion_error(idx, format!("bad timestamp {text:?}: {e}"))),
    }
}

fn actor_field(row: &Row<'_>, idx: usize) -> rusqlite::Result<Actor> {
    let text: String = row.get(idx)?;
    text.parse().map_err(|e| conversion_error(idx, e))
}

fn opt_actor_field(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Actor>> {
    match row.get::<_, Option<String>>(idx)? {
        None => Ok(None),
        Some(text) => text
            .parse()
            .map(Some)
            .map_err(|e| conversion_error(idx, e)),
    }
}

fn amount_field(row: &Row<'_>, idx: usize) -> rusqlite::Result<Amount> {
    let minor: i64 = row.get(idx)?;
    Amount::from_minor_units(minor).map_err(|e| conversion_error(idx, e.to_string()))
}

fn opt_amount_field(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Amount>> {
    match row.get::<_, Option<i64>>(idx)? {
        None => Ok(None),
        Some(minor) => Amount::from_minor_units(minor)
            .map(Some)
            .map_err(|e| conversion_error(idx, e.to_string())),
    }
}

fn movement_from_row(row: &Row<'_>) -> rusqlite::Result<Movement> {
    let kind_text: String = row.get(2)?;
    let kind = MovementKind::parse_str(&kind_text)
        .ok_or_else(|| conversion_error(2, format!("bad movement kind {kind_text:?}")))?;
    Ok(Movement {
        id: row.get(0)?,
        session_id: row.get(1)?,
        kind,
        amount: amount_field(row, 3)?,
        total_after: amount_field(row, 4)?,
        actor: actor_field(row, 5)?,
        created_at: ts_field(row, 6)?,
    })
}

fn confirmation_from_row(row: &Row<'_>) -> rusqlite::Result<Confirmation> {
    Ok(Confirmation {
        movement_id: row.get(0)?,
        actor: actor_field(row, 1)?,
        amount: amount_field(row, 2)?,
        created_at: ts_field(row, 3)?,
        expires_at: ts_field(row, 4)?,
        is_confirmed: row.get(5)?,
        confirmed_at: opt_ts_field(row, 6)?,
        confirmed_by: opt_actor_field(row, 7)?,
        chat_ref: row.get(8)?,
        message_ref: row.get(9)?,
    })
}

fn release_from_row(row: &Row<'_>) -> rusqlite::Result<ReleaseRecord> {
    Ok(ReleaseRecord {
        id: row.get(0)?,
        movement_id: row.get(1)?,
        session_id: row.get(2)?,
        released_total: amount_field(row, 3)?,
        fee: amount_field(row, 4)?,
        net: amount_field(row, 5)?,
        released_by: actor_field(row, 6)?,
        released_at: ts_field(row, 7)?,
    })
}

fn trust_from_row(row: &Row<'_>) -> rusqlite::Result<SenderTrust> {
    let state_text: String = row.get(2)?;
    let state = TrustState::parse_str(&state_text)
        .ok_or_else(|| conversion_error(2, format!("bad trust state {state_text:?}")))?;
    Ok(SenderTrust {
        id: row.get(0)?,
        identity_key: row.get(1)?,
        state,
        first_seen_at: ts_field(row, 3)?,
        last_seen_at: ts_field(row, 4)?,
        seen_count: row.get(5)?,
        auto_promote_at: opt_ts_field(row, 6)?,
        approved_at: opt_ts_field(row, 7)?,
        approved_by: opt_actor_field(row, 8)?,
        blocked_at: opt_ts_field(row, 9)?,
        blocked_by: opt_actor_field(row, 10)?,
        last_matched: opt_amount_field(row, 11)?,
        display_name_hint: row.get(12)?,
    })
}

fn processed_from_row(row: &Row<'_>) -> rusqlite::Result<ProcessedMessage> {
    let status_text: String = row.get(8)?;
    let status = ProcessedStatus::parse_str(&status_text)
        .ok_or_else(|| conversion_error(8, format!("bad processed status {status_text:?}")))?;
    let notes = match row.get::<_, Option<String>>(11)? {
        None => None,
        Some(text) => Some(
            serde_json::from_str(&text)
                .map_err(|e| conversion_error(11, format!("bad notes json: {e}")))?,
        ),
    };
    Ok(ProcessedMessage {
        id: row.get(0)?,
        event_id: row.get(1)?,
        source_ref: row.get(2)?,
        sender_identity: row.get(3)?,
        summary: row.get(4)?,
        event_time: opt_ts_field(row, 5)?,
        parsed_amount: opt_amount_field(row, 6)?,
        parsed_name: row.get(7)?,
        status,
        movement_id: row.get(9)?,
        processed_at: ts_field(row, 10)?,
        notes,
    })
}

fn reversal_from_row(row: &Row<'_>) -> rusqlite::Result<Reversal> {
    Ok(Reversal {
        id: row.get(0)?,
        event_id: row.get(1)?,
        original_movement_id: row.get(2)?,
        reversal_movement_id: row.get(3)?,
        payer_key: row.get(4)?,
        payer_display: row.get(5)?,
        amount: amount_field(row, 6)?,
        reason: row.get(7)?,
        reversed_by: actor_field(row, 8)?,
        reversed_at: ts_field(row, 9)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn store() -> Store {
        Store::in_memory().unwrap()
    }

    fn operator() -> Actor {
        Actor::Operator(1001)
    }

    fn amount(minor: i64) -> Amount {
        Amount::from_minor_units(minor).unwrap()
    }

    #[test]
    fn test_initial_state_seeded() {
        let store = store();
        let state = store.with_tx(|tx| tx.global_state()).unwrap();
        assert_eq!(state.total, Amount::ZERO);
        assert_eq!(state.session_id, 1);
    }

    #[test]
    fn test_state_update_and_reread() {
        let store = store();
        store
            .with_tx(|tx| tx.set_state(amount(42_000), 3))
            .unwrap();
        let state = store.with_tx(|tx| tx.global_state()).unwrap();
        assert_eq!(state.total, amount(42_000));
        assert_eq!(state.session_id, 3);
    }

    #[test]
    fn test_movement_insert_latest_delete() {
        let store = store();
        let now = Utc::now();
        let (first, second) = store
            .with_tx(|tx| {
                let first = tx.insert_movement(
                    1,
                    MovementKind::Add,
                    amount(1_000),
                    amount(1_000),
                    operator(),
                    now,
                )?;
                let second = tx.insert_movement(
                    1,
                    MovementKind::Add,
                    amount(500),
                    amount(1_500),
                    operator(),
                    now,
                )?;
                Ok::<_, StoreError>((first, second))
            })
            .unwrap();

        let latest = store.with_tx(|tx| tx.latest_movement()).unwrap().unwrap();
        assert_eq!(latest.id, second);
        assert_eq!(latest.kind, MovementKind::Add);
        assert_eq!(latest.amount, amount(500));

        store.with_tx(|tx| tx.delete_movement(second)).unwrap();
        let latest = store.with_tx(|tx| tx.latest_movement()).unwrap().unwrap();
        assert_eq!(latest.id, first);
    }

    #[test]
    fn test_delete_missing_movement_not_found() {
        let store = store();
        let result = store.with_tx(|tx| tx.delete_movement(99));
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_failed_tx_rolls_back() {
        let store = store();
        let now = Utc::now();
        let result: Result<(), StoreError> = store.with_tx(|tx| {
            tx.insert_movement(
                1,
                MovementKind::Add,
                amount(1_000),
                amount(1_000),
                operator(),
                now,
            )?;
            Err(StoreError::NotFound("forced".to_string()))
        });
        assert!(result.is_err());
        let movements = store.with_tx(|tx| tx.all_movements()).unwrap();
        assert!(movements.is_empty());
    }

    #[test]
    fn test_confirmation_lifecycle() {
        let store = store();
        let now = Utc::now();
        let confirmation = Confirmation {
            movement_id: 7,
            actor: operator(),
            amount: amount(42_000),
            created_at: now,
            expires_at: now + Duration::hours(24),
            is_confirmed: false,
            confirmed_at: None,
            confirmed_by: None,
            chat_ref: Some(55),
            message_ref: Some(900),
        };
        store
            .with_tx(|tx| tx.insert_confirmation(&confirmation))
            .unwrap();

        let pending = store.with_tx(|tx| tx.pending_confirmation_count()).unwrap();
        assert_eq!(pending, 1);

        store
            .with_tx(|tx| tx.mark_confirmed(7, operator(), now))
            .unwrap();
        let stored = store.with_tx(|tx| tx.confirmation(7)).unwrap().unwrap();
        assert!(stored.is_confirmed);
        assert_eq!(stored.confirmed_by, Some(operator()));
        assert_eq!(stored.chat_ref, Some(55));

        // Second mark on an already-confirmed row is a store-level NotFound
        let result = store.with_tx(|tx| tx.mark_confirmed(7, operator(), now));
        assert!(matches!(result, Err(StoreError::NotFound(_))));

        assert!(store.with_tx(|tx| tx.delete_confirmation(7)).unwrap());
        assert!(!store.with_tx(|tx| tx.delete_confirmation(7)).unwrap());
    }

    #[test]
    fn test_sweep_confirms_only_expired() {
        let store = store();
        let now = Utc::now();
        for (id, offset) in [(1, -1), (2, 1)] {
            let confirmation = Confirmation {
                movement_id: id,
                actor: operator(),
                amount: amount(100),
                created_at: now - Duration::hours(24),
                expires_at: now + Duration::hours(offset),
                is_confirmed: false,
                confirmed_at: None,
                confirmed_by: None,
                chat_ref: None,
                message_ref: None,
            };
            store
                .with_tx(|tx| tx.insert_confirmation(&confirmation))
                .unwrap();
        }

        let swept = store
            .with_tx(|tx| tx.sweep_expired_confirmations(now))
            .unwrap();
        assert_eq!(swept, 1);

        let expired = store.with_tx(|tx| tx.confirmation(1)).unwrap().unwrap();
        assert!(expired.is_confirmed);
        assert_eq!(expired.confirmed_by, Some(Actor::System));
        let fresh = store.with_tx(|tx| tx.confirmation(2)).unwrap().unwrap();
        assert!(!fresh.is_confirmed);
    }

    #[test]
    fn test_release_records() {
        let store = store();
        let now = Utc::now();
        store
            .with_tx(|tx| {
                tx.insert_release(3, 1, amount(100_000), amount(2_000), amount(97_970), operator(), now)
            })
            .unwrap();

        let record = store
            .with_tx(|tx| tx.release_for_movement(3))
            .unwrap()
            .unwrap();
        assert_eq!(record.released_total, amount(100_000));
        assert_eq!(record.net, amount(97_970));

        let recent = store.with_tx(|tx| tx.recent_releases(10)).unwrap();
        assert_eq!(recent.len(), 1);

        assert!(store.with_tx(|tx| tx.delete_release(3)).unwrap());
        assert!(store
            .with_tx(|tx| tx.release_for_movement(3))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_sender_trust_roundtrip() {
        let store = store();
        let now = Utc::now();
        let record = SenderTrust {
            id: 0,
            identity_key: "jane@bank".to_string(),
            state: TrustState::Quarantine,
            first_seen_at: now,
            last_seen_at: now,
            seen_count: 1,
            auto_promote_at: Some(now + Duration::days(7)),
            approved_at: None,
            approved_by: None,
            blocked_at: None,
            blocked_by: None,
            last_matched: Some(amount(5_000)),
            display_name_hint: Some("Jane D".to_string()),
        };
        store
            .with_tx(|tx| tx.insert_sender_trust(&record))
            .unwrap();

        let mut stored = store
            .with_tx(|tx| tx.sender_trust("jane@bank"))
            .unwrap()
            .unwrap();
        assert_eq!(stored.state, TrustState::Quarantine);
        assert_eq!(stored.seen_count, 1);
        assert!(stored.auto_promote_at.is_some());

        stored.state = TrustState::Approved;
        stored.auto_promote_at = None;
        stored.approved_by = Some(Actor::System);
        stored.seen_count = 2;
        store
            .with_tx(|tx| tx.update_sender_trust(&stored))
            .unwrap();

        let reread = store
            .with_tx(|tx| tx.sender_trust("jane@bank"))
            .unwrap()
            .unwrap();
        assert_eq!(reread.state, TrustState::Approved);
        assert_eq!(reread.approved_by, Some(Actor::System));
        assert!(reread.auto_promote_at.is_none());

        let listed = store.with_tx(|tx| tx.list_sender_trust()).unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[test]
    fn test_processed_message_unique_event_id() {
        let store = store();
        let now = Utc::now();
        let message = ProcessedMessage {
            id: 0,
            event_id: "gm-1".to_string(),
            source_ref: Some("thread-9".to_string()),
            sender_identity: Some("jane@bank".to_string()),
            summary: Some("You received $50.00".to_string()),
            event_time: Some(now),
            parsed_amount: Some(amount(5_000)),
            parsed_name: Some("Jane D".to_string()),
            status: ProcessedStatus::Added,
            movement_id: Some(12),
            processed_at: now,
            notes: Some(json!({"secondary_key": "ZB-778"})),
        };
        store
            .with_tx(|tx| tx.insert_processed_message(&message))
            .unwrap();

        let duplicate = store.with_tx(|tx| tx.insert_processed_message(&message));
        assert!(matches!(duplicate, Err(StoreError::Database(_))));

        let stored = store
            .with_tx(|tx| tx.processed_message("gm-1"))
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, ProcessedStatus::Added);
        assert_eq!(stored.movement_id, Some(12));
        assert_eq!(
            stored.notes.unwrap()["secondary_key"],
            json!("ZB-778")
        );
    }

    #[test]
    fn test_find_processed_by_secondary() {
        let store = store();
        let now = Utc::now();
        let message = ProcessedMessage {
            id: 0,
            event_id: "gm-1".to_string(),
            source_ref: None,
            sender_identity: Some("jane@bank".to_string()),
            summary: None,
            event_time: Some(now),
            parsed_amount: Some(amount(5_000)),
            parsed_name: None,
            status: ProcessedStatus::Added,
            movement_id: Some(12),
            processed_at: now,
            notes: Some(json!({"secondary_key": "ZB-778"})),
        };
        store
            .with_tx(|tx| tx.insert_processed_message(&message))
            .unwrap();

        let hit = store
            .with_tx(|tx| tx.find_processed_by_secondary("ZB-778", amount(5_000)))
            .unwrap();
        assert!(hit.is_some());
        assert_eq!(hit.unwrap().event_id, "gm-1");

        // Same key, different amount: not the same underlying transaction
        let miss = store
            .with_tx(|tx| tx.find_processed_by_secondary("ZB-778", amount(9_900)))
            .unwrap();
        assert!(miss.is_none());
    }

    #[test]
    fn test_reversal_unique_per_event() {
        let store = store();
        let now = Utc::now();
        let reversal = Reversal {
            id: 0,
            event_id: "gm-1".to_string(),
            original_movement_id: 12,
            reversal_movement_id: 13,
            payer_key: "jane@bank".to_string(),
            payer_display: Some("Jane D".to_string()),
            amount: amount(5_000),
            reason: Some("chargeback".to_string()),
            reversed_by: operator(),
            reversed_at: now,
        };
        store.with_tx(|tx| tx.insert_reversal(&reversal)).unwrap();

        let second = store.with_tx(|tx| tx.insert_reversal(&reversal));
        assert!(matches!(second, Err(StoreError::Database(_))));

        let stored = store
            .with_tx(|tx| tx.reversal_for_event("gm-1"))
            .unwrap()
            .unwrap();
        assert_eq!(stored.original_movement_id, 12);

        let by_movement = store
            .with_tx(|tx| tx.reversal_by_movement(13))
            .unwrap()
            .unwrap();
        assert_eq!(by_movement.event_id, "gm-1");
    }

    #[test]
    fn test_settings_and_tracking_mode() {
        let store = store();
        let mode = store.with_tx(|tx| tx.tracking_mode()).unwrap();
        assert_eq!(mode, TrackingMode::Auto);

        store
            .with_tx(|tx| tx.set_tracking_mode(TrackingMode::Manual))
            .unwrap();
        let mode = store.with_tx(|tx| tx.tracking_mode()).unwrap();
        assert_eq!(mode, TrackingMode::Manual);

        store
            .with_tx(|tx| tx.set_setting("tracking_mode", "garbage"))
            .unwrap();
        let mode = store.with_tx(|tx| tx.tracking_mode()).unwrap();
        assert_eq!(mode, TrackingMode::Auto);
    }

    #[test]
    fn test_open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tally.db");
        {
            let store = Store::open(&path).unwrap();
            store.with_tx(|tx| tx.set_state(amount(777), 2)).unwrap();
        }
        let store = Store::open(&path).unwrap();
        let state = store.with_tx(|tx| tx.global_state()).unwrap();
        assert_eq!(state.total, amount(777));
        assert_eq!(state.session_id, 2);
    }
}
