// 💳 Payment Ledger - the single source of truth for "is this violation paid"
//
// At most one payment row per violation. Paying again overwrites that row
// (method, amount, timestamp, receipt) instead of adding a second one; the
// UNIQUE constraint on payments.ViolationID backs this up in the store.
//
// PaymentStatus is derived: PAID if a payment row with Status = 'PAID'
// exists, UNPAID otherwise. It is never copied onto the violation.

use crate::db::{begin_write, record_activity, ActivityEvent, LEDGER_ACTOR};
use crate::error::{LedgerError, Result};
use crate::ids::{allocate, EntityKind, Identifier};
use crate::money::Amount;
use crate::validation::{self, PaymentForm};
use crate::violations::{datetime_at, DATETIME_FORMAT};
use chrono::{Local, NaiveDateTime, Timelike};
use rand::Rng;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{info, warn};

/// Derived status column; needs `payments p` in the query
pub(crate) const STATUS_SQL: &str = "CASE WHEN p.Status = 'PAID' THEN 'PAID' ELSE 'UNPAID' END";

/// Payment date, suppressed unless the status is PAID
pub(crate) const PAID_DATE_SQL: &str = "CASE WHEN p.Status = 'PAID' THEN p.PaymentDate END";

pub(crate) const PAID_RECEIPT_SQL: &str = "CASE WHEN p.Status = 'PAID' THEN p.ReceiptNo END";

const RECEIPT_PREFIX: &str = "RCPT";
const RECEIPT_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const RECEIPT_SUFFIX_LEN: usize = 4;
const RECEIPT_ATTEMPTS: usize = 8;

// ============================================================================
// PAYMENT STATUS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentStatus {
    Paid,
    Unpaid,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Paid => "PAID",
            PaymentStatus::Unpaid => "UNPAID",
        }
    }

    pub fn is_paid(&self) -> bool {
        matches!(self, PaymentStatus::Paid)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentStatus::Paid => f.write_str("Paid"),
            PaymentStatus::Unpaid => f.write_str("Unpaid"),
        }
    }
}

impl FromSql for PaymentStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "PAID" => Ok(PaymentStatus::Paid),
            _ => Ok(PaymentStatus::Unpaid),
        }
    }
}

// ============================================================================
// PAYMENT METHOD
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentMethod {
    Cash,
    GCash,
    PayMaya,
    BankTransfer,
    CreditCard,
    DebitCard,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 6] = [
        PaymentMethod::Cash,
        PaymentMethod::GCash,
        PaymentMethod::PayMaya,
        PaymentMethod::BankTransfer,
        PaymentMethod::CreditCard,
        PaymentMethod::DebitCard,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "Cash",
            PaymentMethod::GCash => "GCash",
            PaymentMethod::PayMaya => "PayMaya",
            PaymentMethod::BankTransfer => "Bank Transfer",
            PaymentMethod::CreditCard => "Credit Card",
            PaymentMethod::DebitCard => "Debit Card",
        }
    }

    /// Online methods need a transaction reference; cash does not
    pub fn requires_reference(&self) -> bool {
        !matches!(self, PaymentMethod::Cash)
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted: String = s
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '-' && *c != '_')
            .collect::<String>()
            .to_lowercase();

        PaymentMethod::ALL
            .into_iter()
            .find(|m| m.as_str().replace(' ', "").to_lowercase() == wanted)
            .ok_or_else(|| format!("unknown payment method '{s}'"))
    }
}

impl ToSql for PaymentMethod {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for PaymentMethod {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

// ============================================================================
// RECORDS
// ============================================================================

/// Confirmation returned by `record_payment`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Receipt {
    pub violation_id: Identifier,
    pub payment_id: Identifier,
    pub receipt_no: String,
    pub amount: Amount,
    pub method: PaymentMethod,
    pub payer_name: String,
    pub contact: String,
    pub paid_at: NaiveDateTime,
    /// Receipt this payment overwrote, when the violation was already paid
    pub replaced_receipt: Option<String>,
}

/// A stored payment row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Payment {
    pub id: Identifier,
    pub violation_id: Identifier,
    pub method: PaymentMethod,
    pub receipt_no: String,
    pub amount: Amount,
    pub paid_at: NaiveDateTime,
    pub status: PaymentStatus,
    pub payer_name: Option<String>,
    pub contact: Option<String>,
    pub reference: Option<String>,
}

/// Admin dashboard row for a recent payment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecentPayment {
    pub payment_id: Identifier,
    pub violation_id: Identifier,
    pub resident_name: String,
    pub violation_type: String,
    pub fine: Amount,
    pub amount_paid: Amount,
    pub paid_at: NaiveDateTime,
}

// ============================================================================
// RECEIPTS
// ============================================================================

/// "RCPT-" + yyyymmddHHMMSS + "-" + 4 uppercase alphanumerics
pub fn generate_receipt_number<R: Rng + ?Sized>(at: NaiveDateTime, rng: &mut R) -> String {
    let suffix: String = (0..RECEIPT_SUFFIX_LEN)
        .map(|_| RECEIPT_ALPHABET[rng.gen_range(0..RECEIPT_ALPHABET.len())] as char)
        .collect();
    format!("{}-{}-{}", RECEIPT_PREFIX, at.format("%Y%m%d%H%M%S"), suffix)
}

fn receipt_taken(conn: &Connection, receipt_no: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT 1 FROM payments WHERE ReceiptNo = ?1",
        [receipt_no],
        |_| Ok(()),
    )
    .optional()
    .map(|found| found.is_some())
}

// ============================================================================
// OPERATIONS
// ============================================================================

/// Mark a violation as paid.
///
/// Inserts the payment row the first time; afterwards updates that same row
/// with the new method, amount, timestamp and receipt. Lookup, ID
/// allocation, receipt generation and the write are one transaction.
pub fn record_payment(
    conn: &mut Connection,
    violation_id: Identifier,
    form: &PaymentForm,
) -> Result<Receipt> {
    record_payment_as(conn, LEDGER_ACTOR, violation_id, form)
}

/// `record_payment`, logged under `actor` (the cashier or the paying resident)
pub fn record_payment_as(
    conn: &mut Connection,
    actor: &str,
    violation_id: Identifier,
    form: &PaymentForm,
) -> Result<Receipt> {
    let violation_id = violation_id.expect(EntityKind::Violation)?;

    if let Err(err) = validation::payment_form(form) {
        warn!(violation = %violation_id, method = %form.method, "payment rejected: {err}");
        return Err(err);
    }

    let reference = form
        .reference
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty() && form.method.requires_reference())
        .map(str::to_string);
    let payer_name = form.payer_name.trim().to_string();
    let contact = form.contact.trim().to_string();

    let tx = begin_write(conn)?;

    let fine: Option<Amount> = tx
        .query_row(
            "SELECT vt.FineAmount
             FROM violations v
             INNER JOIN violation_types vt ON v.ViolationTypeID = vt.ViolationTypeID
             WHERE v.ViolationID = ?1 AND v.IsDeleted = 0",
            [violation_id],
            |row| row.get(0),
        )
        .optional()
        .map_err(LedgerError::from_write)?;
    let Some(fine) = fine else {
        return Err(LedgerError::ReferenceNotFound {
            kind: EntityKind::Violation,
            id: violation_id.to_string(),
        });
    };
    if fine != form.amount {
        warn!(
            violation = %violation_id,
            %fine,
            amount = %form.amount,
            "payment amount differs from fine"
        );
    }

    let existing: Option<(Identifier, String)> = tx
        .query_row(
            "SELECT PaymentID, ReceiptNo FROM payments WHERE ViolationID = ?1",
            [violation_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .map_err(LedgerError::from_write)?;

    let paid_at = now();
    let paid_at_str = paid_at.format(DATETIME_FORMAT).to_string();

    let mut rng = rand::thread_rng();
    let mut receipt_no = None;
    for _ in 0..RECEIPT_ATTEMPTS {
        let candidate = generate_receipt_number(paid_at, &mut rng);
        if !receipt_taken(&tx, &candidate).map_err(LedgerError::from_write)? {
            receipt_no = Some(candidate);
            break;
        }
    }
    let receipt_no = receipt_no.ok_or_else(|| LedgerError::Allocation {
        kind: EntityKind::Payment,
        reason: "no free receipt number".to_string(),
    })?;

    let (payment_id, replaced_receipt) = match existing {
        Some((payment_id, old_receipt)) => {
            tx.execute(
                "UPDATE payments
                 SET Status = 'PAID',
                     PaymentType = ?1,
                     AmountPaid = ?2,
                     PaymentDate = ?3,
                     ReceiptNo = ?4,
                     PayerName = ?5,
                     ContactNo = ?6,
                     ReferenceNo = ?7
                 WHERE PaymentID = ?8",
                params![
                    form.method,
                    form.amount,
                    paid_at_str,
                    receipt_no,
                    payer_name,
                    contact,
                    reference,
                    payment_id
                ],
            )
            .map_err(LedgerError::from_write)?;
            (payment_id, Some(old_receipt))
        }
        None => {
            let payment_id = allocate(&tx, EntityKind::Payment)?;
            tx.execute(
                "INSERT INTO payments
                 (PaymentID, ViolationID, PaymentType, ReceiptNo, AmountPaid, PaymentDate, Status,
                  PayerName, ContactNo, ReferenceNo)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'PAID', ?7, ?8, ?9)",
                params![
                    payment_id,
                    violation_id,
                    form.method,
                    receipt_no,
                    form.amount,
                    paid_at_str,
                    payer_name,
                    contact,
                    reference
                ],
            )
            .map_err(LedgerError::from_write)?;
            (payment_id, None)
        }
    };

    record_activity(
        &tx,
        &ActivityEvent::new(
            actor,
            if replaced_receipt.is_some() { "payment_updated" } else { "payment_recorded" },
            Some("payments"),
            Some(&payment_id.to_string()),
            serde_json::json!({
                "violation_id": violation_id,
                "receipt_no": receipt_no,
                "replaced_receipt": replaced_receipt,
                "method": form.method.as_str(),
                "amount_centavos": form.amount.centavos(),
            }),
        ),
    )?;

    tx.commit()?;
    info!(
        violation = %violation_id,
        payment = %payment_id,
        receipt = %receipt_no,
        method = %form.method,
        amount = %form.amount,
        replaced = replaced_receipt.is_some(),
        actor,
        "payment recorded"
    );

    Ok(Receipt {
        violation_id,
        payment_id,
        receipt_no,
        amount: form.amount,
        method: form.method,
        payer_name,
        contact,
        paid_at,
        replaced_receipt,
    })
}

/// Local time at the second precision the store keeps
fn now() -> NaiveDateTime {
    let local = Local::now().naive_local();
    local.with_nanosecond(0).unwrap_or(local)
}

/// Current derived status of one violation
pub fn payment_status(conn: &Connection, violation_id: Identifier) -> Result<PaymentStatus> {
    let violation_id = violation_id.expect(EntityKind::Violation)?;
    let status: Option<PaymentStatus> = conn
        .query_row(
            &format!(
                "SELECT {STATUS_SQL}
                 FROM violations v
                 LEFT JOIN payments p ON v.ViolationID = p.ViolationID
                 WHERE v.ViolationID = ?1"
            ),
            [violation_id],
            |row| row.get(0),
        )
        .optional()?;

    status.ok_or_else(|| LedgerError::NotFound {
        kind: EntityKind::Violation,
        id: violation_id.to_string(),
    })
}

/// The payment row attached to a violation, if any
pub fn payment_for_violation(
    conn: &Connection,
    violation_id: Identifier,
) -> Result<Option<Payment>> {
    let violation_id = violation_id.expect(EntityKind::Violation)?;
    let payment = conn
        .query_row(
            "SELECT PaymentID, ViolationID, PaymentType, ReceiptNo, AmountPaid, PaymentDate,
                    Status, PayerName, ContactNo, ReferenceNo
             FROM payments
             WHERE ViolationID = ?1",
            [violation_id],
            |row| {
                Ok(Payment {
                    id: row.get(0)?,
                    violation_id: row.get(1)?,
                    method: row.get(2)?,
                    receipt_no: row.get(3)?,
                    amount: row.get(4)?,
                    paid_at: paid_at(row, 5)?,
                    status: row.get(6)?,
                    payer_name: row.get(7)?,
                    contact: row.get(8)?,
                    reference: row.get(9)?,
                })
            },
        )
        .optional()?;
    Ok(payment)
}

fn paid_at(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<NaiveDateTime> {
    datetime_at(row, idx)?.ok_or(rusqlite::Error::InvalidColumnType(
        idx,
        "PaymentDate".to_string(),
        rusqlite::types::Type::Null,
    ))
}

/// A resident's paid payments, newest first
pub fn payment_history(conn: &Connection, resident_id: Identifier) -> Result<Vec<Payment>> {
    let resident_id = resident_id.expect(EntityKind::Resident)?;
    let mut stmt = conn.prepare(
        "SELECT p.PaymentID, p.ViolationID, p.PaymentType, p.ReceiptNo, p.AmountPaid,
                p.PaymentDate, p.Status, p.PayerName, p.ContactNo, p.ReferenceNo
         FROM payments p
         INNER JOIN violations v ON p.ViolationID = v.ViolationID
         INNER JOIN vehicles vh ON v.VehicleID = vh.VehicleID
         WHERE vh.ResidentID = ?1
           AND p.Status = 'PAID'
           AND v.IsDeleted = 0
         ORDER BY p.PaymentDate DESC, p.PaymentID DESC",
    )?;

    let payments = stmt
        .query_map([resident_id], |row| {
            Ok(Payment {
                id: row.get(0)?,
                violation_id: row.get(1)?,
                method: row.get(2)?,
                receipt_no: row.get(3)?,
                amount: row.get(4)?,
                paid_at: paid_at(row, 5)?,
                status: row.get(6)?,
                payer_name: row.get(7)?,
                contact: row.get(8)?,
                reference: row.get(9)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(payments)
}

/// Most recent paid payments across all residents (admin view)
pub fn recent_payments(conn: &Connection, limit: usize) -> Result<Vec<RecentPayment>> {
    let mut stmt = conn.prepare(
        "SELECT p.PaymentID,
                v.ViolationID,
                r.RFirstName || ' ' || r.RLastName,
                vt.ViolationName,
                vt.FineAmount,
                p.AmountPaid,
                p.PaymentDate
         FROM payments p
         INNER JOIN violations v ON p.ViolationID = v.ViolationID
         INNER JOIN vehicles vh ON v.VehicleID = vh.VehicleID
         INNER JOIN residents r ON vh.ResidentID = r.ResidentID
         INNER JOIN violation_types vt ON v.ViolationTypeID = vt.ViolationTypeID
         WHERE p.Status = 'PAID'
           AND v.IsDeleted = 0
         ORDER BY p.PaymentDate DESC, p.PaymentID DESC
         LIMIT ?1",
    )?;

    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let payments = stmt
        .query_map([limit], |row| {
            Ok(RecentPayment {
                payment_id: row.get(0)?,
                violation_id: row.get(1)?,
                resident_name: row.get(2)?,
                violation_type: row.get(3)?,
                fine: row.get(4)?,
                amount_paid: row.get(5)?,
                paid_at: paid_at(row, 6)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(payments)
}
