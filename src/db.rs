use crate::extractor::Receipt;
use crate::normalize::Amount;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Which attachment a receipt was extracted from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptSource {
    pub message_id: String,
    pub filename: String,
}

/// Receipt to be written, with its provenance
#[derive(Debug, Clone)]
pub struct NewReceipt<'a> {
    pub receipt: &'a Receipt,
    pub source: Option<&'a ReceiptSource>,
    pub extractor_version: &'a str,
}

/// Receipt read back from the ledger table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredReceipt {
    /// Opaque identity (UUID)
    pub id: String,
    #[serde(flatten)]
    pub receipt: Receipt,
    pub content_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<ReceiptSource>,
    pub extractor_version: String,
    pub created_at: DateTime<Utc>,
}

/// SHA-256 of the raw text; detects any later mutation of the audit copy
pub fn content_hash(raw_text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Event for audit trail
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery (in-memory databases report "memory")
    let mode: String = conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    tracing::debug!(journal_mode = %mode, "database opened");

    // ==========================================================================
    // Ledger Table - amount kept as extracted text, raw_text kept for audit
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS ledger (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            receipt_uuid TEXT UNIQUE NOT NULL,
            date TEXT NOT NULL,
            amount TEXT NOT NULL,
            vendor TEXT NOT NULL,
            raw_text TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            message_id TEXT,
            filename TEXT,
            extractor_version TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Events Table (audit trail)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_ledger_content_hash ON ledger(content_hash)",
        [],
    )?;

    // Same attachment with the same text is stored once (NULL sources never collide)
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_ledger_source
         ON ledger(message_id, filename, content_hash)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;

    Ok(())
}

/// Amounts are stored as text; numeric amounts keep their plain float spelling
fn amount_to_column(amount: &Amount) -> String {
    match amount {
        Amount::Number(n) => n.to_string(),
        Amount::Text(t) => t.clone(),
    }
}

/// Insert receipts inside one transaction; returns the new ids in input order.
///
/// A receipt whose source and content hash are already stored is skipped and
/// gets no id and no event.
pub fn insert_receipts(conn: &Connection, receipts: &[NewReceipt]) -> Result<Vec<String>> {
    let tx = conn.unchecked_transaction().context("Failed to begin ledger transaction")?;
    let mut ids = Vec::with_capacity(receipts.len());

    for new in receipts {
        let id = uuid::Uuid::new_v4().to_string();
        let hash = content_hash(new.receipt.raw_text());

        let inserted = tx.execute(
            "INSERT OR IGNORE INTO ledger (
                receipt_uuid, date, amount, vendor, raw_text, content_hash,
                message_id, filename, extractor_version, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                id,
                new.receipt.date(),
                amount_to_column(new.receipt.amount()),
                new.receipt.vendor(),
                new.receipt.raw_text(),
                hash,
                new.source.map(|s| s.message_id.as_str()),
                new.source.map(|s| s.filename.as_str()),
                new.extractor_version,
                Utc::now().to_rfc3339(),
            ],
        )
        .with_context(|| format!("Failed to insert receipt from {}", new.receipt.vendor()))?;

        if inserted == 0 {
            tracing::debug!(content_hash = %hash, "receipt already stored");
            continue;
        }

        let event = Event::new(
            "receipt_added",
            "receipt",
            &id,
            serde_json::json!({
                "vendor": new.receipt.vendor(),
                "amount": amount_to_column(new.receipt.amount()),
                "content_hash": hash,
                "message_id": new.source.map(|s| s.message_id.clone()),
            }),
            "extraction_batch",
        );
        insert_event(&tx, &event)?;

        ids.push(id);
    }

    tx.commit().context("Failed to commit ledger transaction")?;
    tracing::info!(inserted = ids.len(), "stored receipts");

    Ok(ids)
}

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Get events for a specific entity
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY timestamp DESC",
    )?;

    let events = stmt
        .query_map(params![entity_type, entity_id], |row| {
            let timestamp_str: String = row.get(1)?;
            let data_json: String = row.get(5)?;

            Ok(Event {
                event_id: row.get(0)?,
                timestamp: parse_timestamp(&timestamp_str, 1)?,
                event_type: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                data: serde_json::from_str(&data_json).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
                })?,
                actor: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}

fn parse_timestamp(value: &str, column: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e))
        })
}

const RECEIPT_COLUMNS: &str = "receipt_uuid, date, amount, vendor, raw_text, content_hash,
                               message_id, filename, extractor_version, created_at";

fn row_to_receipt(row: &Row) -> rusqlite::Result<StoredReceipt> {
    let amount: String = row.get(2)?;
    let message_id: Option<String> = row.get(6)?;
    let filename: Option<String> = row.get(7)?;
    let created_at: String = row.get(9)?;

    let source = match (message_id, filename) {
        (Some(message_id), Some(filename)) => Some(ReceiptSource { message_id, filename }),
        _ => None,
    };

    Ok(StoredReceipt {
        id: row.get(0)?,
        receipt: Receipt::new(
            row.get::<_, String>(1)?,
            Amount::Text(amount),
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
        ),
        content_hash: row.get(5)?,
        source,
        extractor_version: row.get(8)?,
        created_at: parse_timestamp(&created_at, 9)?,
    })
}

/// All stored receipts in insertion order
pub fn get_all_receipts(conn: &Connection) -> Result<Vec<StoredReceipt>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM ledger ORDER BY id ASC",
        RECEIPT_COLUMNS
    ))?;

    let receipts = stmt
        .query_map([], row_to_receipt)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(receipts)
}

pub fn get_receipt(conn: &Connection, id: &str) -> Result<Option<StoredReceipt>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM ledger WHERE receipt_uuid = ?1",
        RECEIPT_COLUMNS
    ))?;

    let receipt = stmt.query_row(params![id], row_to_receipt).optional()?;
    Ok(receipt)
}

pub fn verify_count(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM ledger", [], |row| row.get(0))?;

    Ok(count)
}

/// Ids of receipts whose raw_text no longer matches the stored hash
pub fn verify_integrity(conn: &Connection) -> Result<Vec<String>> {
    let tampered = get_all_receipts(conn)?
        .into_iter()
        .filter(|stored| content_hash(stored.receipt.raw_text()) != stored.content_hash)
        .map(|stored| stored.id)
        .collect();

    Ok(tampered)
}
