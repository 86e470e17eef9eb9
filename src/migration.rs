// 🔧 Schema Migrator - additive, idempotent, run at every startup
//
// Databases created by older builds lack columns the ledger now relies on
// (the IsDeleted tombstone above all). Each step adds one column and
// backfills it; a step whose column already exists is skipped.

use crate::db::begin_write;
use crate::error::{LedgerError, Result};
use rusqlite::Connection;
use tracing::info;

struct ColumnStep {
    name: &'static str,
    table: &'static str,
    column: &'static str,
    definition: &'static str,
    backfill: Option<&'static str>,
}

const STEPS: &[ColumnStep] = &[
    ColumnStep {
        name: "violations.IsDeleted",
        table: "violations",
        column: "IsDeleted",
        definition: "INTEGER NOT NULL DEFAULT 0",
        backfill: Some("UPDATE violations SET IsDeleted = 0 WHERE IsDeleted IS NULL"),
    },
    ColumnStep {
        name: "payments.PayerName",
        table: "payments",
        column: "PayerName",
        definition: "TEXT",
        backfill: None,
    },
    ColumnStep {
        name: "payments.ContactNo",
        table: "payments",
        column: "ContactNo",
        definition: "TEXT",
        backfill: None,
    },
    ColumnStep {
        name: "payments.ReferenceNo",
        table: "payments",
        column: "ReferenceNo",
        definition: "TEXT",
        backfill: None,
    },
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub applied: Vec<&'static str>,
}

impl MigrationReport {
    pub fn is_noop(&self) -> bool {
        self.applied.is_empty()
    }
}

/// Bring the schema up to date, all steps in one transaction.
///
/// Returns an error rather than continuing on a half-migrated store: the
/// rest of the ledger assumes these columns exist.
pub fn ensure_schema(conn: &mut Connection) -> Result<MigrationReport> {
    let tx = begin_write(conn)?;
    let mut report = MigrationReport::default();

    for step in STEPS {
        let fail = |source| LedgerError::Migration {
            step: step.name,
            source,
        };

        if column_exists(&tx, step.table, step.column).map_err(fail)? {
            continue;
        }

        info!(step = step.name, "applying schema migration");
        tx.execute_batch(&format!(
            "ALTER TABLE {} ADD COLUMN {} {}",
            step.table, step.column, step.definition
        ))
        .map_err(fail)?;

        if let Some(backfill) = step.backfill {
            let rows = tx.execute(backfill, []).map_err(fail)?;
            info!(step = step.name, rows, "backfilled");
        }

        report.applied.push(step.name);
    }

    tx.commit()?;

    if report.is_noop() {
        info!("schema is up to date");
    } else {
        info!(applied = report.applied.len(), "schema migration complete");
    }

    Ok(report)
}

fn column_exists(conn: &Connection, table: &str, column: &str) -> rusqlite::Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let names = stmt.query_map([], |row| row.get::<_, String>(1))?;

    for name in names {
        if name?.eq_ignore_ascii_case(column) {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{open_in_memory, setup_database};

    /// Store as written by builds that predate the tombstone column
    fn legacy_store() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE violations (
                ViolationID TEXT PRIMARY KEY,
                VehicleID TEXT NOT NULL,
                ViolationTypeID TEXT NOT NULL,
                ViolationDate TEXT NOT NULL
            );
            CREATE TABLE payments (
                PaymentID TEXT PRIMARY KEY,
                ViolationID TEXT NOT NULL UNIQUE,
                PaymentType TEXT NOT NULL,
                ReceiptNo TEXT NOT NULL UNIQUE,
                AmountPaid INTEGER NOT NULL,
                PaymentDate TEXT NOT NULL,
                Status TEXT NOT NULL DEFAULT 'PAID'
            );
            INSERT INTO violations VALUES ('V001', 'VH001', 'VT001', '2025-01-10');
            INSERT INTO violations VALUES ('V002', 'VH001', 'VT002', '2025-02-11');",
        )
        .unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    #[test]
    fn test_fresh_store_needs_nothing() {
        let mut conn = open_in_memory().unwrap();
        let report = ensure_schema(&mut conn).unwrap();
        assert!(report.is_noop());
    }

    #[test]
    fn test_legacy_store_gets_tombstone_column() {
        let mut conn = legacy_store();

        let report = ensure_schema(&mut conn).unwrap();
        assert!(report.applied.contains(&"violations.IsDeleted"));
        assert!(report.applied.contains(&"payments.ReferenceNo"));

        let live: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM violations WHERE IsDeleted = 0",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(live, 2, "existing rows are kept and backfilled as live");
    }

    #[test]
    fn test_second_run_is_noop() {
        let mut conn = legacy_store();

        ensure_schema(&mut conn).unwrap();
        let second = ensure_schema(&mut conn).unwrap();

        assert!(second.is_noop());
    }

    #[test]
    fn test_missing_table_fails_loudly() {
        let mut conn = Connection::open_in_memory().unwrap();
        let err = ensure_schema(&mut conn).unwrap_err();

        assert_eq!(err.kind(), crate::error::ErrorKind::Migration);
    }
}
