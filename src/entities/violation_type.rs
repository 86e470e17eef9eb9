// 📋 Violation Types - reference data: a name and a fixed fine

use crate::db::{begin_write, record_activity, ActivityEvent, LEDGER_ACTOR};
use crate::entities::resident::duplicate_or_write;
use crate::error::{LedgerError, Result};
use crate::ids::{allocate, EntityKind, Identifier};
use crate::money::Amount;
use crate::validation;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolationType {
    pub id: Identifier,
    pub name: String,
    pub fine: Amount,
}

impl ViolationType {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<ViolationType> {
        Ok(ViolationType {
            id: row.get(0)?,
            name: row.get(1)?,
            fine: row.get(2)?,
        })
    }
}

pub fn add_violation_type(
    conn: &mut Connection,
    name: &str,
    fine: Amount,
) -> Result<ViolationType> {
    validation::required(name, "Violation name").map_err(LedgerError::validation)?;
    if fine.centavos() < 0 {
        return Err(LedgerError::validation("Fine amount cannot be negative"));
    }
    if fine > Amount::MAX_CHARGE {
        return Err(LedgerError::validation(format!(
            "Fine amount cannot exceed {}",
            Amount::MAX_CHARGE
        )));
    }

    let tx = begin_write(conn)?;
    let vtype = ViolationType {
        id: allocate(&tx, EntityKind::ViolationType)?,
        name: name.trim().to_string(),
        fine,
    };

    tx.execute(
        "INSERT INTO violation_types (ViolationTypeID, ViolationName, FineAmount)
         VALUES (?1, ?2, ?3)",
        params![vtype.id, vtype.name, vtype.fine],
    )
    .map_err(|e| duplicate_or_write(e, "violation name", &vtype.name))?;

    record_activity(
        &tx,
        &ActivityEvent::new(
            LEDGER_ACTOR,
            "violation_type_added",
            Some("violation_types"),
            Some(&vtype.id.to_string()),
            serde_json::json!({ "name": vtype.name, "fine_centavos": vtype.fine.centavos() }),
        ),
    )?;

    tx.commit()?;
    info!(
        violation_type = %vtype.id,
        name = %vtype.name,
        fine = %vtype.fine,
        "violation type added"
    );

    Ok(vtype)
}

/// All violation types ordered by name
pub fn list_violation_types(conn: &Connection) -> Result<Vec<ViolationType>> {
    let mut stmt = conn.prepare(
        "SELECT ViolationTypeID, ViolationName, FineAmount
         FROM violation_types
         ORDER BY ViolationName",
    )?;

    let types = stmt
        .query_map([], ViolationType::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(types)
}

pub fn get_violation_type(conn: &Connection, id: Identifier) -> Result<ViolationType> {
    let id = id.expect(EntityKind::ViolationType)?;
    conn.query_row(
        "SELECT ViolationTypeID, ViolationName, FineAmount
         FROM violation_types WHERE ViolationTypeID = ?1",
        [id],
        ViolationType::from_row,
    )
    .optional()?
    .ok_or_else(|| LedgerError::NotFound {
        kind: EntityKind::ViolationType,
        id: id.to_string(),
    })
}
