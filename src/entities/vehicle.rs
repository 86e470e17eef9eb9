// 🚗 Vehicle Entity - plate number is identity in the real world
//
// "The plate never changes; brand, model and color are just values."
//
// - Plate numbers are unique across all residents (normalized to uppercase)
// - A vehicle belongs to exactly one resident
// - Updates touch brand/model/color only

use crate::db::{begin_write, record_activity, ActivityEvent, LEDGER_ACTOR};
use crate::entities::resident::{duplicate_or_write, resident_exists};
use crate::error::{LedgerError, Result};
use crate::ids::{allocate, EntityKind, Identifier};
use crate::validation::{self, Problems};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: Identifier,
    pub resident_id: Identifier,
    pub plate_no: String,
    pub brand: String,
    pub model: String,
    pub color: Option<String>,
}

impl Vehicle {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Vehicle> {
        Ok(Vehicle {
            id: row.get(0)?,
            resident_id: row.get(1)?,
            plate_no: row.get(2)?,
            brand: row.get(3)?,
            model: row.get(4)?,
            color: row.get(5)?,
        })
    }

    /// Canonical plate form used for storage and uniqueness
    pub fn normalize_plate(plate: &str) -> String {
        plate.trim().to_uppercase()
    }
}

/// Listing row: vehicle, owner name and live violation count
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VehicleSummary {
    pub id: Identifier,
    pub plate_no: String,
    pub owner_name: String,
    pub brand: String,
    pub model: String,
    pub violations: i64,
}

#[derive(Debug, Clone)]
pub struct NewVehicle {
    pub resident_id: Identifier,
    pub plate_no: String,
    pub brand: String,
    pub model: String,
    pub color: Option<String>,
}

/// Editable fields; there is deliberately no plate here
#[derive(Debug, Clone)]
pub struct VehicleUpdate {
    pub brand: String,
    pub model: String,
    pub color: Option<String>,
}

const VEHICLE_COLUMNS: &str = "VehicleID, ResidentID, PlateNo, Brand, Model, Color";

fn clean_color(color: &Option<String>) -> Option<String> {
    color
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
}

// ============================================================================
// OPERATIONS
// ============================================================================

pub fn add_vehicle(conn: &mut Connection, new: &NewVehicle) -> Result<Vehicle> {
    let resident_id = new.resident_id.expect(EntityKind::Resident)?;

    let mut problems = Problems::new();
    problems
        .check(validation::plate_number(&new.plate_no))
        .check(validation::required(&new.brand, "Brand"))
        .check(validation::required(&new.model, "Model"));
    if let Err(err) = problems.into_result() {
        warn!(plate = %new.plate_no, "vehicle rejected: {err}");
        return Err(err);
    }

    let plate = Vehicle::normalize_plate(&new.plate_no);
    let tx = begin_write(conn)?;

    if !resident_exists(&tx, resident_id).map_err(LedgerError::from_write)? {
        return Err(LedgerError::ReferenceNotFound {
            kind: EntityKind::Resident,
            id: resident_id.to_string(),
        });
    }

    let plate_taken = tx
        .query_row("SELECT 1 FROM vehicles WHERE PlateNo = ?1", [&plate], |_| Ok(()))
        .optional()
        .map_err(LedgerError::from_write)?
        .is_some();
    if plate_taken {
        return Err(LedgerError::DuplicateKey {
            field: "plate number",
            value: plate,
        });
    }

    let vehicle = Vehicle {
        id: allocate(&tx, EntityKind::Vehicle)?,
        resident_id,
        plate_no: plate,
        brand: new.brand.trim().to_string(),
        model: new.model.trim().to_string(),
        color: clean_color(&new.color),
    };

    tx.execute(
        "INSERT INTO vehicles (VehicleID, ResidentID, PlateNo, Brand, Model, Color)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            vehicle.id,
            vehicle.resident_id,
            vehicle.plate_no,
            vehicle.brand,
            vehicle.model,
            vehicle.color,
        ],
    )
    .map_err(|e| duplicate_or_write(e, "plate number", &vehicle.plate_no))?;

    record_activity(
        &tx,
        &ActivityEvent::new(
            LEDGER_ACTOR,
            "vehicle_registered",
            Some("vehicles"),
            Some(&vehicle.id.to_string()),
            serde_json::json!({ "resident_id": vehicle.resident_id, "plate_no": vehicle.plate_no }),
        ),
    )?;

    tx.commit()?;
    info!(vehicle = %vehicle.id, plate = %vehicle.plate_no, "vehicle registered");

    Ok(vehicle)
}

/// Change brand/model/color. The plate number cannot be changed.
pub fn update_vehicle(
    conn: &mut Connection,
    id: Identifier,
    update: &VehicleUpdate,
) -> Result<Vehicle> {
    let id = id.expect(EntityKind::Vehicle)?;

    let mut problems = Problems::new();
    problems
        .check(validation::required(&update.brand, "Brand"))
        .check(validation::required(&update.model, "Model"));
    problems.into_result()?;

    let tx = begin_write(conn)?;
    let changed = tx
        .execute(
            "UPDATE vehicles SET Brand = ?1, Model = ?2, Color = ?3 WHERE VehicleID = ?4",
            params![
                update.brand.trim(),
                update.model.trim(),
                clean_color(&update.color),
                id
            ],
        )
        .map_err(LedgerError::from_write)?;

    if changed == 0 {
        return Err(LedgerError::NotFound {
            kind: EntityKind::Vehicle,
            id: id.to_string(),
        });
    }

    record_activity(
        &tx,
        &ActivityEvent::new(
            LEDGER_ACTOR,
            "vehicle_updated",
            Some("vehicles"),
            Some(&id.to_string()),
            serde_json::json!({ "brand": update.brand.trim(), "model": update.model.trim() }),
        ),
    )?;

    let vehicle = fetch(&tx, id)?.ok_or_else(|| LedgerError::NotFound {
        kind: EntityKind::Vehicle,
        id: id.to_string(),
    })?;
    tx.commit()?;
    info!(vehicle = %id, "vehicle updated");

    Ok(vehicle)
}

pub fn get_vehicle(conn: &Connection, id: Identifier) -> Result<Vehicle> {
    let id = id.expect(EntityKind::Vehicle)?;
    fetch(conn, id)?.ok_or_else(|| LedgerError::NotFound {
        kind: EntityKind::Vehicle,
        id: id.to_string(),
    })
}

pub fn find_by_plate(conn: &Connection, plate: &str) -> Result<Option<Vehicle>> {
    let sql = format!("SELECT {VEHICLE_COLUMNS} FROM vehicles WHERE PlateNo = ?1");
    let vehicle = conn
        .query_row(&sql, [Vehicle::normalize_plate(plate)], Vehicle::from_row)
        .optional()?;
    Ok(vehicle)
}

fn fetch(conn: &Connection, id: Identifier) -> rusqlite::Result<Option<Vehicle>> {
    let sql = format!("SELECT {VEHICLE_COLUMNS} FROM vehicles WHERE VehicleID = ?1");
    conn.query_row(&sql, [id], Vehicle::from_row).optional()
}

/// All vehicles with owner and live violation count, ordered by ID
pub fn list_vehicles(conn: &Connection) -> Result<Vec<VehicleSummary>> {
    let mut stmt = conn.prepare(
        "SELECT vh.VehicleID,
                vh.PlateNo,
                r.RFirstName || ' ' || r.RLastName,
                vh.Brand,
                vh.Model,
                COUNT(v.ViolationID)
         FROM vehicles vh
         INNER JOIN residents r ON vh.ResidentID = r.ResidentID
         LEFT JOIN violations v ON vh.VehicleID = v.VehicleID AND v.IsDeleted = 0
         GROUP BY vh.VehicleID
         ORDER BY vh.VehicleID",
    )?;

    let vehicles = stmt
        .query_map([], |row| {
            Ok(VehicleSummary {
                id: row.get(0)?,
                plate_no: row.get(1)?,
                owner_name: row.get(2)?,
                brand: row.get(3)?,
                model: row.get(4)?,
                violations: row.get(5)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(vehicles)
}

pub fn vehicles_for_resident(conn: &Connection, resident_id: Identifier) -> Result<Vec<Vehicle>> {
    let resident_id = resident_id.expect(EntityKind::Resident)?;
    let sql = format!(
        "SELECT {VEHICLE_COLUMNS} FROM vehicles WHERE ResidentID = ?1 ORDER BY PlateNo"
    );
    let mut stmt = conn.prepare(&sql)?;

    let vehicles = stmt
        .query_map([resident_id], Vehicle::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(vehicles)
}

pub fn count_vehicles(conn: &Connection) -> Result<i64> {
    let count = conn.query_row("SELECT COUNT(*) FROM vehicles", [], |row| row.get(0))?;
    Ok(count)
}
