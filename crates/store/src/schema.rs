//! Database schema
//!
//! Money columns are integer minor units; timestamps are RFC 3339 UTC text.

use rusqlite::Connection;

use crate::error::StoreError;

/// Create all tables and indexes, and seed the singleton state row.
pub fn init_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS global_state (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            total_minor INTEGER NOT NULL DEFAULT 0,
            session_id INTEGER NOT NULL DEFAULT 1
        );

        CREATE TABLE IF NOT EXISTS movements (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id INTEGER NOT NULL,
            kind TEXT NOT NULL,
            amount_minor INTEGER NOT NULL,
            total_after_minor INTEGER NOT NULL,
            actor TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS confirmations (
            movement_id INTEGER PRIMARY KEY,
            actor TEXT NOT NULL,
            amount_minor INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            expires_at TEXT NOT NULL,
            is_confirmed INTEGER NOT NULL DEFAULT 0,
            confirmed_at TEXT,
            confirmed_by TEXT,
            chat_ref INTEGER,
            message_ref INTEGER
        );

        CREATE TABLE IF NOT EXISTS releases (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            movement_id INTEGER NOT NULL UNIQUE,
            session_id INTEGER NOT NULL,
            released_total_minor INTEGER NOT NULL,
            fee_minor INTEGER NOT NULL,
            net_minor INTEGER NOT NULL,
            released_by TEXT NOT NULL,
            released_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS sender_trust (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            identity_key TEXT NOT NULL UNIQUE,
            state TEXT NOT NULL,
            first_seen_at TEXT NOT NULL,
            last_seen_at TEXT NOT NULL,
            seen_count INTEGER NOT NULL DEFAULT 0,
            auto_promote_at TEXT,
            approved_at TEXT,
            approved_by TEXT,
            blocked_at TEXT,
            blocked_by TEXT,
            last_matched_minor INTEGER,
            display_name_hint TEXT
        );

        CREATE TABLE IF NOT EXISTS processed_ingestion_messages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT NOT NULL UNIQUE,
            source_ref TEXT,
            sender_identity TEXT,
            summary TEXT,
            event_time TEXT,
            parsed_minor INTEGER,
            parsed_name TEXT,
            status TEXT NOT NULL,
            movement_id INTEGER,
            processed_at TEXT NOT NULL,
            notes TEXT
        );

        CREATE TABLE IF NOT EXISTS reversals (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT NOT NULL UNIQUE,
            original_movement_id INTEGER NOT NULL,
            reversal_movement_id INTEGER NOT NULL,
            payer_key TEXT NOT NULL,
            payer_display TEXT,
            amount_minor INTEGER NOT NULL,
            reason TEXT,
            reversed_by TEXT NOT NULL,
            reversed_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS app_settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_confirmations_pending
            ON confirmations(is_confirmed, expires_at);
        CREATE INDEX IF NOT EXISTS idx_sender_trust_state
            ON sender_trust(state);
        CREATE INDEX IF NOT EXISTS idx_processed_status
            ON processed_ingestion_messages(status);

        INSERT OR IGNORE INTO global_state (id, total_minor, session_id)
            VALUES (1, 0, 1);",
    )?;

    Ok(())
}
