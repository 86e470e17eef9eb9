use crate::config::LedgerConfig;
use crate::error::{LedgerError, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, TransactionBehavior};
use serde::{Deserialize, Serialize};
use std::ops::Deref;
use std::path::Path;
use std::time::Duration;

/// Actor recorded for writes the ledger performs on its own behalf
pub const LEDGER_ACTOR: &str = "ledger";

// ============================================================================
// CONNECTION
// ============================================================================

/// Open the store, apply pragmas and make sure the base schema exists.
///
/// Each unit of work gets its own handle; nothing here is global.
pub fn open(path: &Path, busy_timeout: Duration) -> Result<Connection> {
    let conn = Connection::open(path).map_err(LedgerError::Connectivity)?;
    configure(&conn, busy_timeout)?;
    setup_database(&conn)?;
    Ok(conn)
}

/// Open using the paths and timeouts from configuration.
pub fn open_with_config(config: &LedgerConfig) -> Result<Connection> {
    open(&config.database_path, config.busy_timeout())
}

/// In-memory store with the full schema (tests, demos).
pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory().map_err(LedgerError::Connectivity)?;
    configure(&conn, Duration::from_millis(0))?;
    setup_database(&conn)?;
    Ok(conn)
}

fn configure(conn: &Connection, busy_timeout: Duration) -> Result<()> {
    conn.busy_timeout(busy_timeout)
        .map_err(LedgerError::Connectivity)?;
    // WAL for crash recovery and readers that don't block the writer
    conn.pragma_update(None, "journal_mode", "WAL")
        .map_err(LedgerError::Connectivity)?;
    conn.pragma_update(None, "foreign_keys", "ON")
        .map_err(LedgerError::Connectivity)?;
    Ok(())
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // ==========================================================================
    // Accounts and registration
    // ==========================================================================
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS users (
            UserID TEXT PRIMARY KEY,
            Username TEXT NOT NULL UNIQUE,
            Password TEXT NOT NULL,
            UserType TEXT NOT NULL CHECK (UserType IN ('Resident', 'Admin')),
            IsActive INTEGER NOT NULL DEFAULT 1,
            CreatedAt DATETIME DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS residents (
            ResidentID TEXT PRIMARY KEY,
            UserID TEXT REFERENCES users(UserID),
            RFirstName TEXT NOT NULL,
            RMiddleName TEXT,
            RLastName TEXT NOT NULL,
            Sex TEXT NOT NULL,
            ContactNo TEXT NOT NULL,
            Address TEXT
        );

        CREATE TABLE IF NOT EXISTS vehicles (
            VehicleID TEXT PRIMARY KEY,
            ResidentID TEXT NOT NULL REFERENCES residents(ResidentID),
            PlateNo TEXT NOT NULL UNIQUE,
            Brand TEXT NOT NULL,
            Model TEXT NOT NULL,
            Color TEXT
        );",
    )
    .map_err(LedgerError::from_write)?;

    // ==========================================================================
    // Ledger: violations and payments (amounts in centavos)
    // ==========================================================================
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS violation_types (
            ViolationTypeID TEXT PRIMARY KEY,
            ViolationName TEXT NOT NULL UNIQUE,
            FineAmount INTEGER NOT NULL CHECK (FineAmount >= 0)
        );

        CREATE TABLE IF NOT EXISTS violations (
            ViolationID TEXT PRIMARY KEY,
            VehicleID TEXT NOT NULL REFERENCES vehicles(VehicleID),
            ViolationTypeID TEXT NOT NULL REFERENCES violation_types(ViolationTypeID),
            ViolationDate TEXT NOT NULL,
            IsDeleted INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS payments (
            PaymentID TEXT PRIMARY KEY,
            ViolationID TEXT NOT NULL UNIQUE REFERENCES violations(ViolationID),
            PaymentType TEXT NOT NULL,
            ReceiptNo TEXT NOT NULL UNIQUE,
            AmountPaid INTEGER NOT NULL CHECK (AmountPaid > 0),
            PaymentDate TEXT NOT NULL,
            Status TEXT NOT NULL DEFAULT 'PAID',
            PayerName TEXT,
            ContactNo TEXT,
            ReferenceNo TEXT
        );

        CREATE TABLE IF NOT EXISTS id_sequences (
            Prefix TEXT PRIMARY KEY,
            LastValue INTEGER NOT NULL
        );",
    )
    .map_err(LedgerError::from_write)?;

    // ==========================================================================
    // Activity log (audit trail)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS activity_logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            actor TEXT NOT NULL,
            action TEXT NOT NULL,
            table_affected TEXT,
            record_id TEXT,
            details TEXT NOT NULL
        )",
        [],
    )
    .map_err(LedgerError::from_write)?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_vehicles_resident ON vehicles(ResidentID);
         CREATE INDEX IF NOT EXISTS idx_violations_vehicle ON violations(VehicleID);
         CREATE INDEX IF NOT EXISTS idx_violations_date ON violations(ViolationDate);
         CREATE INDEX IF NOT EXISTS idx_activity_record
             ON activity_logs(table_affected, record_id);",
    )
    .map_err(LedgerError::from_write)?;

    Ok(())
}

// ============================================================================
// WRITE TRANSACTION
// ============================================================================

/// A write unit of work.
///
/// Always `BEGIN IMMEDIATE`: the database write lock is held from the first
/// statement, so read-then-insert sequences inside it cannot interleave with
/// another writer. Dropping without `commit()` rolls everything back.
pub struct WriteTx<'c> {
    tx: rusqlite::Transaction<'c>,
}

pub fn begin_write(conn: &mut Connection) -> Result<WriteTx<'_>> {
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(LedgerError::Connectivity)?;
    Ok(WriteTx { tx })
}

impl WriteTx<'_> {
    pub fn commit(self) -> Result<()> {
        self.tx.commit().map_err(LedgerError::from_write)
    }
}

impl Deref for WriteTx<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.tx
    }
}

// ============================================================================
// ACTIVITY LOG
// ============================================================================

/// One audit-trail entry
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ActivityEvent {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    pub action: String,
    pub table_affected: Option<String>,
    pub record_id: Option<String>,
    pub details: serde_json::Value,
}

impl ActivityEvent {
    pub fn new(
        actor: &str,
        action: &str,
        table_affected: Option<&str>,
        record_id: Option<&str>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            actor: actor.to_string(),
            action: action.to_string(),
            table_affected: table_affected.map(str::to_string),
            record_id: record_id.map(str::to_string),
            details,
        }
    }
}

/// Append to the activity log.
///
/// Ledger writes call this with their own `WriteTx` so the entry commits or
/// rolls back together with the change it describes.
pub fn record_activity(conn: &Connection, event: &ActivityEvent) -> Result<()> {
    let details_json = serde_json::to_string(&event.details)
        .map_err(|e| LedgerError::validation(format!("activity details: {e}")))?;

    conn.execute(
        "INSERT INTO activity_logs (
            event_id, timestamp, actor, action, table_affected, record_id, details
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.actor,
            event.action,
            event.table_affected,
            event.record_id,
            details_json,
        ],
    )
    .map_err(LedgerError::from_write)?;

    Ok(())
}

/// Activity for one record, newest first
pub fn activity_for_record(
    conn: &Connection,
    table_affected: &str,
    record_id: &str,
) -> Result<Vec<ActivityEvent>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, actor, action, table_affected, record_id, details
         FROM activity_logs
         WHERE table_affected = ?1 AND record_id = ?2
         ORDER BY id DESC",
    )?;

    let events = stmt
        .query_map(params![table_affected, record_id], |row| {
            let timestamp_str: String = row.get(1)?;
            let details_json: String = row.get(6)?;

            Ok(ActivityEvent {
                event_id: row.get(0)?,
                timestamp: DateTime::parse_from_rfc3339(&timestamp_str)
                    .map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(
                            1,
                            rusqlite::types::Type::Text,
                            Box::new(e),
                        )
                    })?
                    .with_timezone(&Utc),
                actor: row.get(2)?,
                action: row.get(3)?,
                table_affected: row.get(4)?,
                record_id: row.get(5)?,
                details: serde_json::from_str(&details_json).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        6,
                        rusqlite::types::Type::Text,
                        Box::new(e),
                    )
                })?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(events)
}
