// 🌱 Demo Data - fills an empty ledger with residents, vehicles, violations
// spread across a year, and a share of payments
//
// Everything goes through the public ledger operations, so seeded data obeys
// the same rules (unique plates, derived status, allocated IDs) as real data.

use crate::entities::resident::{count_residents, register_resident, NewResident, Sex};
use crate::entities::vehicle::{add_vehicle, find_by_plate, NewVehicle};
use crate::entities::violation_type::{add_violation_type, list_violation_types, ViolationType};
use crate::error::{LedgerError, Result};
use crate::ids::{EntityKind, Identifier};
use crate::money::Amount;
use crate::payments::{record_payment, PaymentMethod};
use crate::validation::PaymentForm;
use crate::violations::create_violation;
use chrono::{Datelike, Local, NaiveDate};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::info;

const DEFAULT_VIOLATION_TYPES: [(&str, i64); 8] = [
    ("Speeding", 500),
    ("Illegal Parking", 300),
    ("Beating the Red Light", 1000),
    ("No Helmet", 1500),
    ("No Seatbelt", 1000),
    ("Reckless Driving", 2000),
    ("Driving Without License", 3000),
    ("Obstruction", 1000),
];

const FIRST_NAMES: [&str; 20] = [
    "Juan", "Maria", "Jose", "Ana", "Pedro", "Rosa", "Carlos", "Elena", "Luis", "Carmen",
    "Miguel", "Sofia", "Antonio", "Isabel", "Ramon", "Teresa", "Gabriel", "Diana", "Rafael",
    "Cristina",
];

const LAST_NAMES: [&str; 16] = [
    "Santos", "Reyes", "Cruz", "Garcia", "Flores", "Ramos", "Mendoza", "Torres", "Rivera",
    "Dela Cruz", "Villanueva", "Aquino", "Bautista", "Castro", "Navarro", "Aguilar",
];

const ADDRESSES: [&str; 6] = [
    "Purok 1, Barangay San Miguel",
    "Purok 2, Barangay Poblacion",
    "Purok 5, Barangay Talomo",
    "Phase 1, Subdivision A",
    "Block 3, Lot 5, Village Heights",
    "Unit 12, Building A",
];

const VEHICLES: [(&str, &[&str]); 5] = [
    ("Toyota", &["Vios", "Innova", "Fortuner", "Wigo"]),
    ("Honda", &["City", "Civic", "CR-V", "Jazz"]),
    ("Mitsubishi", &["Mirage", "Montero", "Xpander"]),
    ("Suzuki", &["Swift", "Dzire", "Ertiga"]),
    ("Isuzu", &["D-Max", "mu-X", "Traviz"]),
];

const COLORS: [&str; 6] = ["White", "Black", "Silver", "Red", "Blue", "Gray"];

const PLATE_PREFIXES: [&str; 6] = ["ABC", "XYZ", "DEF", "GHI", "JKL", "MNO"];
const PLATE_ATTEMPTS: usize = 20;

const SEED_METHODS: [PaymentMethod; 4] = [
    PaymentMethod::Cash,
    PaymentMethod::GCash,
    PaymentMethod::PayMaya,
    PaymentMethod::BankTransfer,
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedPlan {
    pub residents: usize,
    /// Each resident gets between 1 and this many vehicles
    pub max_vehicles_per_resident: usize,
    /// Each vehicle gets between 0 and this many violations
    pub max_violations_per_vehicle: usize,
    /// Chance (0-100) that a violation gets paid
    pub paid_percent: u8,
    /// Violation dates fall inside this calendar year
    pub year: i32,
    /// Same seed, same data
    pub rng_seed: u64,
}

impl Default for SeedPlan {
    fn default() -> Self {
        SeedPlan {
            residents: 30,
            max_vehicles_per_resident: 3,
            max_violations_per_vehicle: 5,
            paid_percent: 70,
            year: Local::now().year(),
            rng_seed: 42,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    pub violation_types: usize,
    pub residents: usize,
    pub vehicles: usize,
    pub violations: usize,
    pub payments: usize,
}

pub fn populate(conn: &mut Connection, plan: &SeedPlan) -> Result<SeedReport> {
    let mut rng = StdRng::seed_from_u64(plan.rng_seed);
    let mut report = SeedReport::default();

    let types = ensure_violation_types(conn, &mut report)?;
    // usernames carry a running number so repeated runs never collide
    let offset = usize::try_from(count_residents(conn)?).unwrap_or(0);

    for i in 0..plan.residents {
        let first = *FIRST_NAMES.choose(&mut rng).unwrap_or(&"Juan");
        let last = *LAST_NAMES.choose(&mut rng).unwrap_or(&"Santos");
        let contact = format!("09{:09}", rng.gen_range(100_000_000..1_000_000_000u64));

        let resident = register_resident(
            conn,
            &NewResident {
                username: format!(
                    "{}_{}{}",
                    first.to_lowercase(),
                    last.to_lowercase().replace(' ', ""),
                    offset + i + 1
                ),
                password: "pass123".to_string(),
                first_name: first.to_string(),
                middle_name: None,
                last_name: last.to_string(),
                sex: if rng.gen_bool(0.5) { Sex::Male } else { Sex::Female },
                contact_no: contact.clone(),
                address: ADDRESSES.choose(&mut rng).map(|a| a.to_string()),
            },
        )?;
        report.residents += 1;

        let vehicle_count = rng.gen_range(1..=plan.max_vehicles_per_resident.max(1));
        for _ in 0..vehicle_count {
            let vehicle = add_seed_vehicle(conn, &mut rng, resident.id)?;
            report.vehicles += 1;

            let violation_count = rng.gen_range(0..=plan.max_violations_per_vehicle);
            for _ in 0..violation_count {
                let Some(vtype) = types.choose(&mut rng) else { break };
                let date = random_day(&mut rng, plan.year);
                let violation = create_violation(conn, vehicle, vtype.id, date)?;
                report.violations += 1;

                if rng.gen_range(0..100u8) < plan.paid_percent {
                    let method = *SEED_METHODS.choose(&mut rng).unwrap_or(&PaymentMethod::Cash);
                    let reference = method
                        .requires_reference()
                        .then(|| format!("REF{:08}", rng.gen_range(0..100_000_000u32)));
                    record_payment(
                        conn,
                        violation,
                        &PaymentForm {
                            method,
                            amount: vtype.fine,
                            payer_name: resident.full_name(),
                            contact: contact.clone(),
                            reference,
                        },
                    )?;
                    report.payments += 1;
                }
            }
        }
    }

    info!(
        residents = report.residents,
        vehicles = report.vehicles,
        violations = report.violations,
        payments = report.payments,
        "demo data populated"
    );
    Ok(report)
}

fn ensure_violation_types(
    conn: &mut Connection,
    report: &mut SeedReport,
) -> Result<Vec<ViolationType>> {
    let existing = list_violation_types(conn)?;
    if !existing.is_empty() {
        return Ok(existing);
    }

    let mut created = Vec::with_capacity(DEFAULT_VIOLATION_TYPES.len());
    for (name, pesos) in DEFAULT_VIOLATION_TYPES {
        created.push(add_violation_type(conn, name, Amount::pesos(pesos))?);
        report.violation_types += 1;
    }
    Ok(created)
}

fn add_seed_vehicle(
    conn: &mut Connection,
    rng: &mut StdRng,
    owner: Identifier,
) -> Result<Identifier> {
    for _ in 0..PLATE_ATTEMPTS {
        let prefix = PLATE_PREFIXES.choose(rng).unwrap_or(&"ABC");
        let plate = format!("{}{}", prefix, rng.gen_range(1000..10000u32));
        if find_by_plate(conn, &plate)?.is_some() {
            continue;
        }

        let (brand, models) = VEHICLES[rng.gen_range(0..VEHICLES.len())];
        let vehicle = add_vehicle(
            conn,
            &NewVehicle {
                resident_id: owner,
                plate_no: plate,
                brand: brand.to_string(),
                model: models.choose(rng).unwrap_or(&"Vios").to_string(),
                color: COLORS.choose(rng).map(|c| c.to_string()),
            },
        )?;
        return Ok(vehicle.id);
    }

    Err(LedgerError::Allocation {
        kind: EntityKind::Vehicle,
        reason: "could not find a free plate number".to_string(),
    })
}

fn random_day(rng: &mut StdRng, year: i32) -> NaiveDate {
    let days = NaiveDate::from_ymd_opt(year, 12, 31).map_or(365, |d| d.ordinal());
    let ordinal = rng.gen_range(1..=days);
    NaiveDate::from_yo_opt(year, ordinal)
        .or_else(|| NaiveDate::from_ymd_opt(year, 1, 1))
        .unwrap_or_default()
}
