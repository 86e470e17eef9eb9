// 🚨 Violation Registry - create, look up, list, tombstone
//
// A violation points at one vehicle and one violation type. Payment status
// is never stored here: it is derived from the payments table on every read
// (see `payments::STATUS_SQL`).
//
// Tombstoned rows (IsDeleted = 1) stay in the table but drop out of every
// listing and every statistic.

use crate::db::{begin_write, record_activity, ActivityEvent, LEDGER_ACTOR};
use crate::error::{LedgerError, Result};
use crate::ids::{allocate, EntityKind, Identifier};
use crate::money::Amount;
use crate::payments::{PaymentStatus, PAID_DATE_SQL, PAID_RECEIPT_SQL, STATUS_SQL};
use crate::stats::Scope;
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// The joined ledger view every read goes through: violation + vehicle +
/// owner + violation type + optional payment.
pub(crate) const LEDGER_JOIN: &str = "FROM violations v
     INNER JOIN vehicles vh ON v.VehicleID = vh.VehicleID
     INNER JOIN residents r ON vh.ResidentID = r.ResidentID
     INNER JOIN violation_types vt ON v.ViolationTypeID = vt.ViolationTypeID
     LEFT JOIN payments p ON v.ViolationID = p.ViolationID";

/// Live rows in scope; bind the scope's resident (or NULL) as ?1
pub(crate) const LIVE_IN_SCOPE: &str =
    "WHERE v.IsDeleted = 0 AND (?1 IS NULL OR vh.ResidentID = ?1)";

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusFilter {
    #[default]
    All,
    Paid,
    Unpaid,
}

impl StatusFilter {
    pub fn admits(&self, status: PaymentStatus) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Paid => status == PaymentStatus::Paid,
            StatusFilter::Unpaid => status == PaymentStatus::Unpaid,
        }
    }

    pub fn parse(value: &str) -> Option<StatusFilter> {
        match value.trim().to_lowercase().as_str() {
            "" | "all" => Some(StatusFilter::All),
            "paid" => Some(StatusFilter::Paid),
            "unpaid" => Some(StatusFilter::Unpaid),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolationFilter {
    /// Case-insensitive substring over ID, resident name, plate and type name
    pub search: Option<String>,
    pub status: StatusFilter,
    pub scope: Scope,
}

impl ViolationFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn search(mut self, text: &str) -> Self {
        self.search = Some(text.to_string());
        self
    }

    pub fn status(mut self, status: StatusFilter) -> Self {
        self.status = status;
        self
    }

    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }
}

/// One row of a violations listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViolationSummary {
    pub id: Identifier,
    pub resident_name: String,
    pub plate_no: String,
    pub violation_type: String,
    pub date: NaiveDate,
    pub fine: Amount,
    pub status: PaymentStatus,
}

impl ViolationSummary {
    /// `needle` must already be lowercase
    fn matches(&self, needle: &str) -> bool {
        self.id.to_string().to_lowercase().contains(needle)
            || self.resident_name.to_lowercase().contains(needle)
            || self.plate_no.to_lowercase().contains(needle)
            || self.violation_type.to_lowercase().contains(needle)
    }
}

/// Everything known about one violation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViolationDetail {
    pub id: Identifier,
    pub resident_id: Identifier,
    pub resident_name: String,
    pub contact_no: String,
    pub vehicle_id: Identifier,
    pub plate_no: String,
    pub brand: String,
    pub model: String,
    pub violation_type_id: Identifier,
    pub violation_type: String,
    pub fine: Amount,
    pub date: NaiveDate,
    pub status: PaymentStatus,
    /// Present if and only if `status` is `Paid`
    pub payment_date: Option<NaiveDateTime>,
    pub receipt_no: Option<String>,
    pub is_deleted: bool,
}

// ============================================================================
// ROW HELPERS
// ============================================================================

pub(crate) fn date_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    NaiveDate::parse_from_str(&raw, DATE_FORMAT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

pub(crate) fn datetime_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<NaiveDateTime>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        NaiveDateTime::parse_from_str(&s, DATETIME_FORMAT).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
    })
    .transpose()
}

// ============================================================================
// OPERATIONS
// ============================================================================

/// Record a new violation against an existing vehicle.
pub fn create_violation(
    conn: &mut Connection,
    vehicle_id: Identifier,
    violation_type_id: Identifier,
    date: NaiveDate,
) -> Result<Identifier> {
    create_violation_as(conn, LEDGER_ACTOR, vehicle_id, violation_type_id, date)
}

/// `create_violation`, logged under `actor` (the admin's user ID or name)
pub fn create_violation_as(
    conn: &mut Connection,
    actor: &str,
    vehicle_id: Identifier,
    violation_type_id: Identifier,
    date: NaiveDate,
) -> Result<Identifier> {
    let vehicle_id = vehicle_id.expect(EntityKind::Vehicle)?;
    let violation_type_id = violation_type_id.expect(EntityKind::ViolationType)?;

    let tx = begin_write(conn)?;

    for (kind, id) in [
        (EntityKind::Vehicle, vehicle_id),
        (EntityKind::ViolationType, violation_type_id),
    ] {
        let sql = format!(
            "SELECT 1 FROM {} WHERE {} = ?1",
            kind.table(),
            kind.id_column()
        );
        let found = tx
            .query_row(&sql, [id], |_| Ok(()))
            .optional()
            .map_err(LedgerError::from_write)?
            .is_some();
        if !found {
            return Err(LedgerError::ReferenceNotFound {
                kind,
                id: id.to_string(),
            });
        }
    }

    let id = allocate(&tx, EntityKind::Violation)?;

    tx.execute(
        "INSERT INTO violations (ViolationID, VehicleID, ViolationTypeID, ViolationDate, IsDeleted)
         VALUES (?1, ?2, ?3, ?4, 0)",
        params![
            id,
            vehicle_id,
            violation_type_id,
            date.format(DATE_FORMAT).to_string()
        ],
    )
    .map_err(LedgerError::from_write)?;

    record_activity(
        &tx,
        &ActivityEvent::new(
            actor,
            "violation_created",
            Some("violations"),
            Some(&id.to_string()),
            serde_json::json!({
                "vehicle_id": vehicle_id,
                "violation_type_id": violation_type_id,
                "date": date.format(DATE_FORMAT).to_string(),
            }),
        ),
    )?;

    tx.commit()?;
    info!(
        violation = %id,
        vehicle = %vehicle_id,
        violation_type = %violation_type_id,
        %date,
        actor,
        "violation created"
    );

    Ok(id)
}

/// Full detail for one violation, tombstoned or not.
pub fn get_violation(conn: &Connection, id: Identifier) -> Result<ViolationDetail> {
    let id = id.expect(EntityKind::Violation).map_err(|_| LedgerError::NotFound {
        kind: EntityKind::Violation,
        id: id.to_string(),
    })?;

    let sql = format!(
        "SELECT v.ViolationID,
                r.ResidentID,
                r.RFirstName || ' ' || r.RLastName,
                r.ContactNo,
                vh.VehicleID,
                vh.PlateNo,
                vh.Brand,
                vh.Model,
                vt.ViolationTypeID,
                vt.ViolationName,
                vt.FineAmount,
                v.ViolationDate,
                {STATUS_SQL},
                {PAID_DATE_SQL},
                {PAID_RECEIPT_SQL},
                v.IsDeleted
         {LEDGER_JOIN}
         WHERE v.ViolationID = ?1"
    );

    let detail = conn
        .query_row(&sql, [id], |row| {
            Ok(ViolationDetail {
                id: row.get(0)?,
                resident_id: row.get(1)?,
                resident_name: row.get(2)?,
                contact_no: row.get(3)?,
                vehicle_id: row.get(4)?,
                plate_no: row.get(5)?,
                brand: row.get(6)?,
                model: row.get(7)?,
                violation_type_id: row.get(8)?,
                violation_type: row.get(9)?,
                fine: row.get(10)?,
                date: date_at(row, 11)?,
                status: row.get(12)?,
                payment_date: datetime_at(row, 13)?,
                receipt_no: row.get(14)?,
                is_deleted: row.get(15)?,
            })
        })
        .optional()?;

    debug!(violation = %id, found = detail.is_some(), "violation lookup");

    detail.ok_or_else(|| LedgerError::NotFound {
        kind: EntityKind::Violation,
        id: id.to_string(),
    })
}

/// Live violations matching `filter`, newest first.
pub fn list_violations(
    conn: &Connection,
    filter: &ViolationFilter,
) -> Result<Vec<ViolationSummary>> {
    let resident = filter.scope.resident()?;
    let sql = format!(
        "SELECT v.ViolationID,
                r.RFirstName || ' ' || r.RLastName,
                vh.PlateNo,
                vt.ViolationName,
                v.ViolationDate,
                vt.FineAmount,
                {STATUS_SQL}
         {LEDGER_JOIN}
         {LIVE_IN_SCOPE}
         ORDER BY v.ViolationDate DESC, v.ViolationID DESC"
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([resident], |row| {
            Ok(ViolationSummary {
                id: row.get(0)?,
                resident_name: row.get(1)?,
                plate_no: row.get(2)?,
                violation_type: row.get(3)?,
                date: date_at(row, 4)?,
                fine: row.get(5)?,
                status: row.get(6)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let needle = filter
        .search
        .as_deref()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty());

    let filtered: Vec<ViolationSummary> = rows
        .into_iter()
        .filter(|v| filter.status.admits(v.status))
        .filter(|v| needle.as_deref().map_or(true, |n| v.matches(n)))
        .collect();

    debug!(count = filtered.len(), "violations listed");
    Ok(filtered)
}

/// Tombstone a violation.
///
/// Returns `true` if this call deleted it, `false` if it was already
/// deleted. Only an unknown ID is an error.
pub fn soft_delete(conn: &mut Connection, id: Identifier) -> Result<bool> {
    soft_delete_as(conn, LEDGER_ACTOR, id)
}

/// `soft_delete`, logged under `actor`
pub fn soft_delete_as(conn: &mut Connection, actor: &str, id: Identifier) -> Result<bool> {
    let not_found = || LedgerError::NotFound {
        kind: EntityKind::Violation,
        id: id.to_string(),
    };
    let id = id.expect(EntityKind::Violation).map_err(|_| not_found())?;

    let tx = begin_write(conn)?;
    let current: Option<bool> = tx
        .query_row(
            "SELECT IsDeleted FROM violations WHERE ViolationID = ?1",
            [id],
            |row| row.get(0),
        )
        .optional()
        .map_err(LedgerError::from_write)?;

    match current {
        None => Err(not_found()),
        Some(true) => {
            debug!(violation = %id, "already deleted");
            Ok(false)
        }
        Some(false) => {
            tx.execute(
                "UPDATE violations SET IsDeleted = 1 WHERE ViolationID = ?1",
                [id],
            )
            .map_err(LedgerError::from_write)?;

            record_activity(
                &tx,
                &ActivityEvent::new(
                    actor,
                    "violation_deleted",
                    Some("violations"),
                    Some(&id.to_string()),
                    serde_json::json!({}),
                ),
            )?;

            tx.commit()?;
            info!(violation = %id, actor, "violation deleted");
            Ok(true)
        }
    }
}
