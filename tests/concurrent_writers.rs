//! Several connections writing to one on-disk store at the same time.
//!
//! Each thread opens its own handle, the way separate administrators would.
//! Identifier allocation must never hand out the same ID twice, and payments
//! on different violations must not interfere with each other. A writer
//! stuck behind another one gives up after its busy timeout.

use chrono::NaiveDate;
use roadeye_ledger::entities::resident::register_resident;
use roadeye_ledger::entities::vehicle::add_vehicle;
use roadeye_ledger::entities::violation_type::add_violation_type;
use roadeye_ledger::{
    aggregate, begin_write, create_violation, open, payment_for_violation, record_payment, Amount,
    ErrorKind, Identifier, NewResident, NewVehicle, PaymentForm, PaymentMethod, Scope, Sex,
};
use rusqlite::Connection;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

const THREADS: usize = 6;
const PER_THREAD: usize = 10;

fn connect(path: &Path) -> Connection {
    open(path, Duration::from_secs(30)).unwrap()
}

/// One resident, one vehicle, one violation type
fn prepare(dir: &TempDir) -> (PathBuf, Identifier, Identifier) {
    let path = dir.path().join("roadeye.db");
    let mut conn = connect(&path);

    let resident = register_resident(
        &mut conn,
        &NewResident {
            username: "carmen_v".to_string(),
            password: "pass123".to_string(),
            first_name: "Carmen".to_string(),
            middle_name: None,
            last_name: "Villanueva".to_string(),
            sex: Sex::Female,
            contact_no: "09998887777".to_string(),
            address: None,
        },
    )
    .unwrap();
    let vehicle = add_vehicle(
        &mut conn,
        &NewVehicle {
            resident_id: resident.id,
            plate_no: "JKL5555".to_string(),
            brand: "Nissan".to_string(),
            model: "Almera".to_string(),
            color: None,
        },
    )
    .unwrap();
    let speeding = add_violation_type(&mut conn, "Speeding", Amount::pesos(500)).unwrap();

    (path, vehicle.id, speeding.id)
}

#[test]
fn concurrent_creates_never_share_an_id() {
    let dir = tempfile::tempdir().unwrap();
    let (path, vehicle, speeding) = prepare(&dir);
    let date = NaiveDate::from_ymd_opt(2025, 7, 1).unwrap();

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let path = path.clone();
            thread::spawn(move || {
                let mut conn = connect(&path);
                (0..PER_THREAD)
                    .map(|_| create_violation(&mut conn, vehicle, speeding, date).unwrap())
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut seen = HashSet::new();
    for handle in handles {
        for id in handle.join().unwrap() {
            assert!(seen.insert(id), "{id} allocated twice");
        }
    }
    assert_eq!(seen.len(), THREADS * PER_THREAD);

    // sequence is dense: V001..V060
    let max = seen.iter().map(|id| id.seq()).max().unwrap();
    assert_eq!(max as usize, THREADS * PER_THREAD);

    let conn = connect(&path);
    assert_eq!(aggregate(&conn, &Scope::All).unwrap().total as usize, THREADS * PER_THREAD);
}

#[test]
fn concurrent_payments_on_different_violations() {
    let dir = tempfile::tempdir().unwrap();
    let (path, vehicle, speeding) = prepare(&dir);
    let date = NaiveDate::from_ymd_opt(2025, 8, 15).unwrap();

    let violations: Vec<Identifier> = {
        let mut conn = connect(&path);
        (0..THREADS * 2)
            .map(|_| create_violation(&mut conn, vehicle, speeding, date).unwrap())
            .collect()
    };

    let handles: Vec<_> = violations
        .chunks(2)
        .map(|chunk| {
            let path = path.clone();
            let chunk = chunk.to_vec();
            thread::spawn(move || {
                let mut conn = connect(&path);
                chunk
                    .into_iter()
                    .map(|violation| {
                        record_payment(
                            &mut conn,
                            violation,
                            &PaymentForm {
                                method: PaymentMethod::GCash,
                                amount: Amount::pesos(500),
                                payer_name: "Carmen Villanueva".to_string(),
                                contact: "09998887777".to_string(),
                                reference: Some(format!("GC-{violation}")),
                            },
                        )
                        .unwrap()
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let receipts: Vec<_> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();

    let payment_ids: HashSet<_> = receipts.iter().map(|r| r.payment_id).collect();
    let receipt_nos: HashSet<_> = receipts.iter().map(|r| r.receipt_no.clone()).collect();
    assert_eq!(payment_ids.len(), violations.len());
    assert_eq!(receipt_nos.len(), violations.len());

    let conn = connect(&path);
    for violation in &violations {
        let payment = payment_for_violation(&conn, *violation).unwrap().unwrap();
        assert_eq!(payment.reference.as_deref(), Some(format!("GC-{violation}").as_str()));
    }

    let totals = aggregate(&conn, &Scope::All).unwrap();
    assert_eq!(totals.paid_count as usize, violations.len());
    assert_eq!(totals.unpaid_count, 0);
    assert_eq!(totals.revenue_collected, Amount::pesos(500 * violations.len() as i64));
}

#[test]
fn blocked_writer_fails_after_busy_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let (path, vehicle, speeding) = prepare(&dir);
    let date = NaiveDate::from_ymd_opt(2025, 9, 1).unwrap();

    let mut holder = connect(&path);
    let mut waiter = open(&path, Duration::from_millis(100)).unwrap();

    let lock = begin_write(&mut holder).unwrap();

    let started = Instant::now();
    let err = add_violation_type(&mut waiter, "Counterflow", Amount::pesos(1000)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connectivity);
    assert!(started.elapsed() < Duration::from_secs(10), "waited {:?}", started.elapsed());

    let err = create_violation(&mut waiter, vehicle, speeding, date).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connectivity);

    // once the lock is released the same handle writes normally
    drop(lock);
    create_violation(&mut waiter, vehicle, speeding, date).unwrap();
    assert_eq!(aggregate(&waiter, &Scope::All).unwrap().total, 1);
}
