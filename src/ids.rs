// 🏷️ Identifier Allocator - human-readable IDs like "V001", "VH012", "P103"
//
// Internally an ID is (kind, sequence number). The display string is only
// produced at the boundary (SQL parameters, JSON, UI).
//
// Allocation reads and bumps a per-prefix counter row. It only accepts a
// `WriteTx`, which holds the database write lock from BEGIN, so two callers
// can never be handed the same number.

use crate::db::WriteTx;
use crate::error::{LedgerError, Result};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Minimum digits in the displayed sequence number
const SEQUENCE_WIDTH: usize = 3;

// ============================================================================
// ENTITY KIND
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKind {
    User,
    Resident,
    Vehicle,
    ViolationType,
    Violation,
    Payment,
}

impl EntityKind {
    pub const ALL: [EntityKind; 6] = [
        EntityKind::User,
        EntityKind::Resident,
        EntityKind::Vehicle,
        EntityKind::ViolationType,
        EntityKind::Violation,
        EntityKind::Payment,
    ];

    pub const fn prefix(self) -> &'static str {
        match self {
            EntityKind::User => "U",
            EntityKind::Resident => "R",
            EntityKind::Vehicle => "VH",
            EntityKind::ViolationType => "VT",
            EntityKind::Violation => "V",
            EntityKind::Payment => "P",
        }
    }

    /// Table holding rows of this kind
    pub const fn table(self) -> &'static str {
        match self {
            EntityKind::User => "users",
            EntityKind::Resident => "residents",
            EntityKind::Vehicle => "vehicles",
            EntityKind::ViolationType => "violation_types",
            EntityKind::Violation => "violations",
            EntityKind::Payment => "payments",
        }
    }

    pub const fn id_column(self) -> &'static str {
        match self {
            EntityKind::User => "UserID",
            EntityKind::Resident => "ResidentID",
            EntityKind::Vehicle => "VehicleID",
            EntityKind::ViolationType => "ViolationTypeID",
            EntityKind::Violation => "ViolationID",
            EntityKind::Payment => "PaymentID",
        }
    }

    /// Lowercase name for messages
    pub const fn label(self) -> &'static str {
        match self {
            EntityKind::User => "user",
            EntityKind::Resident => "resident",
            EntityKind::Vehicle => "vehicle",
            EntityKind::ViolationType => "violation type",
            EntityKind::Violation => "violation",
            EntityKind::Payment => "payment",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ============================================================================
// IDENTIFIER
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier {
    kind: EntityKind,
    seq: u32,
}

impl Identifier {
    pub fn new(kind: EntityKind, seq: u32) -> Self {
        Identifier { kind, seq }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn seq(&self) -> u32 {
        self.seq
    }

    /// Parse a display string that must belong to `kind`.
    ///
    /// "VH001" is not a violation ID even though it starts with "V":
    /// everything after the prefix has to be digits.
    pub fn parse_as(kind: EntityKind, s: &str) -> Option<Identifier> {
        let digits = s.trim().strip_prefix(kind.prefix())?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let seq: u32 = digits.parse().ok()?;
        if seq == 0 {
            return None;
        }
        Some(Identifier { kind, seq })
    }

    /// Parse, or report the value as a dangling reference of `kind`
    pub fn reference(kind: EntityKind, s: &str) -> Result<Identifier> {
        Identifier::parse_as(kind, s).ok_or_else(|| LedgerError::ReferenceNotFound {
            kind,
            id: s.to_string(),
        })
    }

    /// Check that an already-typed ID is of the expected kind.
    pub(crate) fn expect(self, kind: EntityKind) -> Result<Identifier> {
        if self.kind == kind {
            Ok(self)
        } else {
            Err(LedgerError::ReferenceNotFound {
                kind,
                id: self.to_string(),
            })
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{:0width$}",
            self.kind.prefix(),
            self.seq,
            width = SEQUENCE_WIDTH
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdentifierError(pub String);

impl fmt::Display for ParseIdentifierError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "not a ledger identifier: '{}'", self.0)
    }
}

impl std::error::Error for ParseIdentifierError {}

impl FromStr for Identifier {
    type Err = ParseIdentifierError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        EntityKind::ALL
            .iter()
            .find_map(|kind| Identifier::parse_as(*kind, s))
            .ok_or_else(|| ParseIdentifierError(s.to_string()))
    }
}

impl ToSql for Identifier {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.to_string()))
    }
}

impl FromSql for Identifier {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        s.parse().map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

impl Serialize for Identifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Identifier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// ALLOCATION
// ============================================================================

/// Hand out the next identifier for `kind`.
///
/// The counter is seeded from the highest existing ID the first time a
/// prefix is used, and skips past any ID that already exists in the table
/// (rows written by other tools). The bump is part of `tx`: if the caller
/// rolls back, the number is handed out again.
pub fn allocate(tx: &WriteTx<'_>, kind: EntityKind) -> Result<Identifier> {
    let alloc_err = |e: rusqlite::Error| LedgerError::Allocation {
        kind,
        reason: e.to_string(),
    };

    let counter: Option<i64> = tx
        .query_row(
            "SELECT LastValue FROM id_sequences WHERE Prefix = ?1",
            [kind.prefix()],
            |row| row.get(0),
        )
        .optional()
        .map_err(alloc_err)?;

    let last = match counter {
        Some(value) => u32::try_from(value).map_err(|_| LedgerError::Allocation {
            kind,
            reason: format!("corrupt counter value {value}"),
        })?,
        None => max_existing_seq(tx, kind).map_err(alloc_err)?,
    };

    let mut next = bump(kind, last)?;
    while id_exists(tx, Identifier::new(kind, next)).map_err(alloc_err)? {
        next = bump(kind, next)?;
    }

    tx.execute(
        "INSERT INTO id_sequences (Prefix, LastValue) VALUES (?1, ?2)
         ON CONFLICT(Prefix) DO UPDATE SET LastValue = excluded.LastValue",
        params![kind.prefix(), i64::from(next)],
    )
    .map_err(alloc_err)?;

    Ok(Identifier::new(kind, next))
}

fn bump(kind: EntityKind, seq: u32) -> Result<u32> {
    seq.checked_add(1).ok_or_else(|| LedgerError::Allocation {
        kind,
        reason: "sequence exhausted".to_string(),
    })
}

fn max_existing_seq(tx: &WriteTx<'_>, kind: EntityKind) -> rusqlite::Result<u32> {
    let sql = format!("SELECT {} FROM {}", kind.id_column(), kind.table());
    let mut stmt = tx.prepare(&sql)?;
    let ids = stmt.query_map([], |row| row.get::<_, String>(0))?;

    let mut max = 0;
    for id in ids {
        if let Some(parsed) = Identifier::parse_as(kind, &id?) {
            max = max.max(parsed.seq);
        }
    }
    Ok(max)
}

fn id_exists(tx: &WriteTx<'_>, id: Identifier) -> rusqlite::Result<bool> {
    let sql = format!(
        "SELECT 1 FROM {} WHERE {} = ?1",
        id.kind.table(),
        id.kind.id_column()
    );
    tx.query_row(&sql, [id], |_| Ok(()))
        .optional()
        .map(|found| found.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{begin_write, open_in_memory};

    #[test]
    fn test_display_is_zero_padded() {
        assert_eq!(Identifier::new(EntityKind::Violation, 1).to_string(), "V001");
        assert_eq!(Identifier::new(EntityKind::Vehicle, 42).to_string(), "VH042");
        assert_eq!(Identifier::new(EntityKind::Payment, 1234).to_string(), "P1234");
    }

    #[test]
    fn test_parse_distinguishes_prefixes() {
        assert_eq!(
            Identifier::parse_as(EntityKind::Violation, "V007"),
            Some(Identifier::new(EntityKind::Violation, 7))
        );
        assert_eq!(Identifier::parse_as(EntityKind::Violation, "VH007"), None);
        assert_eq!(Identifier::parse_as(EntityKind::Violation, "VT007"), None);
        assert_eq!(Identifier::parse_as(EntityKind::Violation, "V"), None);
        assert_eq!(Identifier::parse_as(EntityKind::Violation, "V000"), None);

        let vehicle: Identifier = "VH010".parse().unwrap();
        assert_eq!(vehicle.kind(), EntityKind::Vehicle);
        let vtype: Identifier = "VT002".parse().unwrap();
        assert_eq!(vtype.kind(), EntityKind::ViolationType);
        assert!("X001".parse::<Identifier>().is_err());
    }

    #[test]
    fn test_serde_uses_display_string() {
        let id = Identifier::new(EntityKind::Resident, 5);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"R005\"");

        let back: Identifier = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_allocate_starts_at_one_and_increments() {
        let mut conn = open_in_memory().unwrap();

        let tx = begin_write(&mut conn).unwrap();
        let first = allocate(&tx, EntityKind::Payment).unwrap();
        let second = allocate(&tx, EntityKind::Payment).unwrap();
        let other_kind = allocate(&tx, EntityKind::User).unwrap();
        tx.commit().unwrap();

        assert_eq!(first.to_string(), "P001");
        assert_eq!(second.to_string(), "P002");
        assert_eq!(other_kind.to_string(), "U001");
    }

    #[test]
    fn test_allocate_continues_after_existing_rows() {
        let mut conn = open_in_memory().unwrap();
        conn.execute(
            "INSERT INTO violation_types (ViolationTypeID, ViolationName, FineAmount)
             VALUES ('VT007', 'Speeding', 50000), ('VT003', 'No Helmet', 20000)",
            [],
        )
        .unwrap();

        let tx = begin_write(&mut conn).unwrap();
        let next = allocate(&tx, EntityKind::ViolationType).unwrap();
        tx.commit().unwrap();

        assert_eq!(next.to_string(), "VT008");
    }

    #[test]
    fn test_allocate_skips_ids_inserted_behind_the_counter() {
        let mut conn = open_in_memory().unwrap();

        let tx = begin_write(&mut conn).unwrap();
        assert_eq!(allocate(&tx, EntityKind::ViolationType).unwrap().seq(), 1);
        tx.commit().unwrap();

        conn.execute(
            "INSERT INTO violation_types (ViolationTypeID, ViolationName, FineAmount)
             VALUES ('VT002', 'Imported', 10000)",
            [],
        )
        .unwrap();

        let tx = begin_write(&mut conn).unwrap();
        assert_eq!(allocate(&tx, EntityKind::ViolationType).unwrap().seq(), 3);
        tx.commit().unwrap();
    }

    #[test]
    fn test_rolled_back_allocation_is_reused() {
        let mut conn = open_in_memory().unwrap();

        {
            let tx = begin_write(&mut conn).unwrap();
            assert_eq!(allocate(&tx, EntityKind::Violation).unwrap().seq(), 1);
            // dropped: rollback
        }

        let tx = begin_write(&mut conn).unwrap();
        assert_eq!(allocate(&tx, EntityKind::Violation).unwrap().seq(), 1);
    }
}
