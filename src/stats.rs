// 📊 Statistics Aggregator - counts and peso totals over the ledger view
//
// Every reporting surface (dashboard, violations report, payment summary)
// calls `aggregate` instead of running its own query, so the numbers they
// show can never disagree. The scan uses the same join and the same derived
// status as the violation listings.

use crate::error::{LedgerError, Result};
use crate::ids::{EntityKind, Identifier};
use crate::money::Amount;
use crate::payments::{PaymentStatus, STATUS_SQL};
use crate::violations::{LEDGER_JOIN, LIVE_IN_SCOPE};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use tracing::debug;

const MONTH_NAMES: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Which violations a query covers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scope {
    #[default]
    All,
    Resident(Identifier),
}

impl Scope {
    /// The resident to bind as `?1` in `LIVE_IN_SCOPE`, or `None` for all
    pub fn resident(&self) -> Result<Option<Identifier>> {
        match self {
            Scope::All => Ok(None),
            Scope::Resident(id) => Ok(Some(id.expect(EntityKind::Resident)?)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aggregate {
    pub total: u64,
    pub paid_count: u64,
    pub unpaid_count: u64,
    pub revenue_collected: Amount,
    pub revenue_pending: Amount,
}

impl Aggregate {
    /// Sum of every fine in scope, paid or not
    pub fn total_possible(&self) -> Amount {
        self.revenue_collected + self.revenue_pending
    }

    /// Count one violation. Fails without changing anything if the grand
    /// total would overflow; each half is then bounded by it as well.
    fn add(&mut self, fine: Amount, status: PaymentStatus) -> Result<()> {
        self.total_possible()
            .checked_add(fine)
            .ok_or(LedgerError::Overflow { what: "revenue total" })?;

        self.total += 1;
        if status.is_paid() {
            self.paid_count += 1;
            self.revenue_collected += fine;
        } else {
            self.unpaid_count += 1;
            self.revenue_pending += fine;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MonthCount {
    /// 1 = January
    pub month: u32,
    pub label: &'static str,
    pub count: u64,
}

/// Violations per calendar month; always exactly twelve entries, Jan..Dec
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthlyBreakdown {
    pub year: i32,
    pub months: Vec<MonthCount>,
}

impl MonthlyBreakdown {
    fn zeroed(year: i32) -> Self {
        let months = MONTH_NAMES
            .iter()
            .zip(1u32..)
            .map(|(&label, month)| MonthCount {
                month,
                label,
                count: 0,
            })
            .collect();
        MonthlyBreakdown { year, months }
    }

    pub fn count(&self, month: u32) -> u64 {
        self.months
            .iter()
            .find(|m| m.month == month)
            .map_or(0, |m| m.count)
    }

    pub fn total(&self) -> u64 {
        self.months.iter().map(|m| m.count).sum()
    }
}

// ============================================================================
// OPERATIONS
// ============================================================================

pub fn aggregate(conn: &Connection, scope: &Scope) -> Result<Aggregate> {
    let resident = scope.resident()?;
    let sql = format!(
        "SELECT vt.FineAmount, {STATUS_SQL}
         {LEDGER_JOIN}
         {LIVE_IN_SCOPE}"
    );

    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([resident])?;

    let mut agg = Aggregate::default();
    while let Some(row) = rows.next()? {
        agg.add(row.get(0)?, row.get(1)?)?;
    }

    debug!(?scope, total = agg.total, paid = agg.paid_count, "aggregate computed");
    Ok(agg)
}

pub fn monthly_breakdown(conn: &Connection, scope: &Scope, year: i32) -> Result<MonthlyBreakdown> {
    let resident = scope.resident()?;
    let sql = format!(
        "SELECT CAST(strftime('%m', v.ViolationDate) AS INTEGER), COUNT(*)
         {LEDGER_JOIN}
         {LIVE_IN_SCOPE}
           AND strftime('%Y', v.ViolationDate) = ?2
         GROUP BY 1"
    );

    let mut breakdown = MonthlyBreakdown::zeroed(year);

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![resident, format!("{year:04}")], |row| {
        Ok((row.get::<_, Option<u32>>(0)?, row.get::<_, i64>(1)?))
    })?;

    for row in rows {
        let (month, count) = row?;
        // unparseable dates give NULL and are skipped
        let Some(month) = month else { continue };
        if let Some(slot) = breakdown.months.iter_mut().find(|m| m.month == month) {
            slot.count = u64::try_from(count).unwrap_or(0);
        }
    }

    Ok(breakdown)
}
