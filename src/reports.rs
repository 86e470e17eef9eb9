// 📑 Reports - the dashboard, the printable violations report, and the
// payment summary
//
// Each report takes its counters and peso totals from `stats::aggregate`
// and reads inside one snapshot, so a report's rows and its totals always
// describe the same state of the ledger.

use crate::entities::resident::{count_residents, get_resident};
use crate::entities::vehicle::{count_vehicles, vehicles_for_resident};
use crate::error::Result;
use crate::ids::Identifier;
use crate::money::Amount;
use crate::payments::{recent_payments, PaymentStatus, RecentPayment, PAID_DATE_SQL, STATUS_SQL};
use crate::stats::{aggregate, monthly_breakdown, Aggregate, MonthlyBreakdown, Scope};
use crate::violations::{
    date_at, datetime_at, DATETIME_FORMAT, DATE_FORMAT, LEDGER_JOIN, LIVE_IN_SCOPE,
};
use chrono::{Local, NaiveDate, NaiveDateTime};
use rusqlite::Connection;
use serde::Serialize;
use std::io::Write;
use tracing::info;

// ============================================================================
// DASHBOARD
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dashboard {
    pub scope: Scope,
    pub stats: Aggregate,
    pub monthly: MonthlyBreakdown,
    /// Registered residents; only reported for the all-violations scope
    pub residents: Option<i64>,
    /// All vehicles, or the resident's own
    pub vehicles: i64,
}

pub fn dashboard(conn: &Connection, scope: &Scope, year: i32) -> Result<Dashboard> {
    let snapshot = conn.unchecked_transaction()?;

    let (residents, vehicles) = match scope.resident()? {
        None => (Some(count_residents(&snapshot)?), count_vehicles(&snapshot)?),
        Some(resident) => {
            // unknown resident is NotFound, not an empty dashboard
            get_resident(&snapshot, resident)?;
            let owned = vehicles_for_resident(&snapshot, resident)?.len();
            (None, i64::try_from(owned).unwrap_or(i64::MAX))
        }
    };

    let dashboard = Dashboard {
        scope: *scope,
        stats: aggregate(&snapshot, scope)?,
        monthly: monthly_breakdown(&snapshot, scope, year)?,
        residents,
        vehicles,
    };

    Ok(dashboard)
}

// ============================================================================
// VIOLATIONS REPORT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportRow {
    pub violation_id: Identifier,
    pub resident_name: String,
    pub plate_no: String,
    pub brand: String,
    pub model: String,
    pub violation_type: String,
    pub date: NaiveDate,
    pub fine: Amount,
    pub status: PaymentStatus,
    /// Only set when the violation is paid
    pub payment_date: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViolationsReport {
    pub generated_at: NaiveDateTime,
    pub rows: Vec<ReportRow>,
    pub stats: Aggregate,
}

/// Every live violation, newest first, with the overall totals
pub fn violations_report(conn: &Connection) -> Result<ViolationsReport> {
    let snapshot = conn.unchecked_transaction()?;

    let sql = format!(
        "SELECT v.ViolationID,
                r.RFirstName || ' ' || r.RLastName,
                vh.PlateNo,
                vh.Brand,
                vh.Model,
                vt.ViolationName,
                v.ViolationDate,
                vt.FineAmount,
                {STATUS_SQL},
                {PAID_DATE_SQL}
         {LEDGER_JOIN}
         {LIVE_IN_SCOPE}
         ORDER BY v.ViolationDate DESC, v.ViolationID DESC"
    );

    let mut stmt = snapshot.prepare(&sql)?;
    let rows = stmt
        .query_map([Option::<Identifier>::None], |row| {
            Ok(ReportRow {
                violation_id: row.get(0)?,
                resident_name: row.get(1)?,
                plate_no: row.get(2)?,
                brand: row.get(3)?,
                model: row.get(4)?,
                violation_type: row.get(5)?,
                date: date_at(row, 6)?,
                fine: row.get(7)?,
                status: row.get(8)?,
                payment_date: datetime_at(row, 9)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let stats = aggregate(&snapshot, &Scope::All)?;

    Ok(ViolationsReport {
        generated_at: Local::now().naive_local(),
        rows,
        stats,
    })
}

#[derive(Serialize)]
struct CsvRow<'a> {
    #[serde(rename = "Violation ID")]
    violation_id: String,
    #[serde(rename = "Resident")]
    resident: &'a str,
    #[serde(rename = "Plate No")]
    plate_no: &'a str,
    #[serde(rename = "Vehicle")]
    vehicle: String,
    #[serde(rename = "Violation")]
    violation_type: &'a str,
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Fine")]
    fine: String,
    #[serde(rename = "Status")]
    status: &'static str,
    #[serde(rename = "Payment Date")]
    payment_date: String,
}

/// Write the report rows as CSV with a header line
pub fn export_violations_csv<W: Write>(report: &ViolationsReport, writer: W) -> csv::Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);

    for row in &report.rows {
        wtr.serialize(CsvRow {
            violation_id: row.violation_id.to_string(),
            resident: &row.resident_name,
            plate_no: &row.plate_no,
            vehicle: format!("{} {}", row.brand, row.model),
            violation_type: &row.violation_type,
            date: row.date.format(DATE_FORMAT).to_string(),
            fine: row.fine.to_string(),
            status: row.status.as_str(),
            payment_date: row
                .payment_date
                .map(|d| d.format(DATETIME_FORMAT).to_string())
                .unwrap_or_default(),
        })?;
    }

    wtr.flush()?;
    info!(rows = report.rows.len(), "violations report exported");
    Ok(())
}

// ============================================================================
// PAYMENT SUMMARY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentSummary {
    pub stats: Aggregate,
    pub recent: Vec<RecentPayment>,
}

pub fn payment_summary(conn: &Connection, limit: usize) -> Result<PaymentSummary> {
    let snapshot = conn.unchecked_transaction()?;

    Ok(PaymentSummary {
        stats: aggregate(&snapshot, &Scope::All)?,
        recent: recent_payments(&snapshot, limit)?,
    })
}
