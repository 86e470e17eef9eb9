// 🏠 Resident Entity - a registered person with a login account
//
// Registration creates the `users` row (U###) and the `residents` row (R###)
// in one write: either both exist afterwards or neither does.

use crate::db::{begin_write, record_activity, ActivityEvent, LEDGER_ACTOR};
use crate::error::{is_unique_violation, LedgerError, Result};
use crate::ids::{allocate, EntityKind, Identifier};
use crate::validation::{self, Problems};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

// ============================================================================
// SEX
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sex {
    Male,
    Female,
}

impl Sex {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sex::Male => "Male",
            Sex::Female => "Female",
        }
    }

    pub fn parse(value: &str) -> Option<Sex> {
        match value.trim().to_lowercase().as_str() {
            "male" | "m" => Some(Sex::Male),
            "female" | "f" => Some(Sex::Female),
            _ => None,
        }
    }
}

impl ToSql for Sex {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Sex {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        Sex::parse(s).ok_or_else(|| FromSqlError::Other(format!("unknown sex '{s}'").into()))
    }
}

// ============================================================================
// RESIDENT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resident {
    pub id: Identifier,
    pub user_id: Option<Identifier>,
    pub first_name: String,
    pub middle_name: Option<String>,
    pub last_name: String,
    pub sex: Sex,
    pub contact_no: String,
    pub address: Option<String>,
}

impl Resident {
    /// "First Last", the form used on every listing and report
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Resident> {
        Ok(Resident {
            id: row.get(0)?,
            user_id: row.get(1)?,
            first_name: row.get(2)?,
            middle_name: row
                .get::<_, Option<String>>(3)?
                .filter(|m| !m.trim().is_empty()),
            last_name: row.get(4)?,
            sex: row.get(5)?,
            contact_no: row.get(6)?,
            address: row.get(7)?,
        })
    }
}

/// Resident row plus live (non-deleted) violation count
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResidentSummary {
    pub resident: Resident,
    pub total_violations: i64,
}

/// Registration form
#[derive(Debug, Clone)]
pub struct NewResident {
    pub username: String,
    pub password: String,
    pub first_name: String,
    pub middle_name: Option<String>,
    pub last_name: String,
    pub sex: Sex,
    pub contact_no: String,
    pub address: Option<String>,
}

impl NewResident {
    fn validate(&self) -> Result<()> {
        let mut problems = Problems::new();
        problems
            .check(validation::username(&self.username))
            .check(validation::password(&self.password))
            .check(validation::person_name(&self.first_name, "First name"))
            .check(validation::person_name(&self.last_name, "Last name"))
            .check(validation::contact_number(&self.contact_no));
        problems.into_result()
    }
}

/// SHA-256 hex digest stored in `users.Password`
pub fn hash_password(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

const RESIDENT_COLUMNS: &str = "r.ResidentID, r.UserID, r.RFirstName, r.RMiddleName, r.RLastName,
                                r.Sex, r.ContactNo, r.Address";

// ============================================================================
// OPERATIONS
// ============================================================================

pub fn register_resident(conn: &mut Connection, new: &NewResident) -> Result<Resident> {
    if let Err(err) = new.validate() {
        warn!(username = %new.username, "registration rejected: {err}");
        return Err(err);
    }

    let username = new.username.trim().to_string();
    let tx = begin_write(conn)?;

    let taken = tx
        .query_row(
            "SELECT 1 FROM users WHERE Username = ?1",
            [&username],
            |_| Ok(()),
        )
        .optional()
        .map_err(LedgerError::from_write)?
        .is_some();
    if taken {
        return Err(LedgerError::DuplicateKey {
            field: "username",
            value: username,
        });
    }

    let user_id = allocate(&tx, EntityKind::User)?;
    let resident_id = allocate(&tx, EntityKind::Resident)?;

    tx.execute(
        "INSERT INTO users (UserID, Username, Password, UserType, IsActive)
         VALUES (?1, ?2, ?3, 'Resident', 1)",
        params![user_id, username, hash_password(&new.password)],
    )
    .map_err(|e| duplicate_or_write(e, "username", &username))?;

    let resident = Resident {
        id: resident_id,
        user_id: Some(user_id),
        first_name: new.first_name.trim().to_string(),
        middle_name: new
            .middle_name
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_string),
        last_name: new.last_name.trim().to_string(),
        sex: new.sex,
        contact_no: new.contact_no.trim().to_string(),
        address: new.address.clone(),
    };

    tx.execute(
        "INSERT INTO residents (ResidentID, UserID, RFirstName, RMiddleName, RLastName,
                                Sex, ContactNo, Address)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            resident.id,
            resident.user_id,
            resident.first_name,
            resident.middle_name,
            resident.last_name,
            resident.sex,
            resident.contact_no,
            resident.address,
        ],
    )
    .map_err(LedgerError::from_write)?;

    record_activity(
        &tx,
        &ActivityEvent::new(
            LEDGER_ACTOR,
            "resident_registered",
            Some("residents"),
            Some(&resident.id.to_string()),
            serde_json::json!({ "user_id": user_id, "username": username }),
        ),
    )?;

    tx.commit()?;
    info!(resident = %resident.id, user = %user_id, "resident registered");

    Ok(resident)
}

pub fn get_resident(conn: &Connection, id: Identifier) -> Result<Resident> {
    let id = id.expect(EntityKind::Resident)?;
    let sql = format!("SELECT {RESIDENT_COLUMNS} FROM residents r WHERE r.ResidentID = ?1");

    conn.query_row(&sql, [id], Resident::from_row)
        .optional()?
        .ok_or_else(|| LedgerError::NotFound {
            kind: EntityKind::Resident,
            id: id.to_string(),
        })
}

/// All residents with their live violation counts, ordered by ID
pub fn list_residents(conn: &Connection) -> Result<Vec<ResidentSummary>> {
    let sql = format!(
        "SELECT {RESIDENT_COLUMNS}, COUNT(v.ViolationID)
         FROM residents r
         LEFT JOIN vehicles vh ON r.ResidentID = vh.ResidentID
         LEFT JOIN violations v ON vh.VehicleID = v.VehicleID AND v.IsDeleted = 0
         GROUP BY r.ResidentID
         ORDER BY r.ResidentID"
    );
    let mut stmt = conn.prepare(&sql)?;

    let residents = stmt
        .query_map([], |row| {
            Ok(ResidentSummary {
                resident: Resident::from_row(row)?,
                total_violations: row.get(8)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(residents)
}

pub fn count_residents(conn: &Connection) -> Result<i64> {
    let count = conn.query_row("SELECT COUNT(*) FROM residents", [], |row| row.get(0))?;
    Ok(count)
}

/// Existence check used by other writes (inside their transaction)
pub(crate) fn resident_exists(conn: &Connection, id: Identifier) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT 1 FROM residents WHERE ResidentID = ?1",
        [id],
        |_| Ok(()),
    )
    .optional()
    .map(|found| found.is_some())
}

pub(crate) fn duplicate_or_write(
    err: rusqlite::Error,
    field: &'static str,
    value: &str,
) -> LedgerError {
    if is_unique_violation(&err) {
        LedgerError::DuplicateKey {
            field,
            value: value.to_string(),
        }
    } else {
        LedgerError::from_write(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;
    use crate::error::ErrorKind;

    fn juan() -> NewResident {
        NewResident {
            username: "juan_dc".to_string(),
            password: "pass123".to_string(),
            first_name: "Juan".to_string(),
            middle_name: Some("S.".to_string()),
            last_name: "Dela Cruz".to_string(),
            sex: Sex::Male,
            contact_no: "09171234567".to_string(),
            address: Some("Block 3, Lot 5, Village Heights".to_string()),
        }
    }

    #[test]
    fn test_register_allocates_user_and_resident_ids() {
        let mut conn = open_in_memory().unwrap();

        let resident = register_resident(&mut conn, &juan()).unwrap();

        assert_eq!(resident.id.to_string(), "R001");
        assert_eq!(resident.user_id.unwrap().to_string(), "U001");
        assert_eq!(resident.full_name(), "Juan Dela Cruz");

        let stored: String = conn
            .query_row("SELECT Password FROM users WHERE UserID = 'U001'", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(stored, hash_password("pass123"));
        assert_eq!(stored.len(), 64);
    }

    #[test]
    fn test_duplicate_username_rejected_without_side_effects() {
        let mut conn = open_in_memory().unwrap();
        register_resident(&mut conn, &juan()).unwrap();

        let mut again = juan();
        again.first_name = "Pedro".to_string();
        let err = register_resident(&mut conn, &again).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::DuplicateKey);
        assert_eq!(count_residents(&conn).unwrap(), 1);
    }

    #[test]
    fn test_invalid_form_rejected() {
        let mut conn = open_in_memory().unwrap();
        let mut bad = juan();
        bad.username = "ju".to_string();
        bad.password = "123".to_string();

        let err = register_resident(&mut conn, &bad).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(count_residents(&conn).unwrap(), 0);
    }

    #[test]
    fn test_get_and_list_residents() {
        let mut conn = open_in_memory().unwrap();
        let created = register_resident(&mut conn, &juan()).unwrap();

        let fetched = get_resident(&conn, created.id).unwrap();
        assert_eq!(fetched, created);

        let listed = list_residents(&conn).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].total_violations, 0);

        let missing = get_resident(&conn, Identifier::new(EntityKind::Resident, 99)).unwrap_err();
        assert_eq!(missing.kind(), ErrorKind::NotFound);
    }
}
