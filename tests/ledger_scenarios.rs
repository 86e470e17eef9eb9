//! End-to-end ledger scenarios: two violation types, a handful of violations,
//! payments and tombstones, checked through every reporting surface.

use chrono::NaiveDate;
use roadeye_ledger::{
    activity_for_record, aggregate, create_violation, dashboard, get_violation, list_violations,
    monthly_breakdown, open_in_memory, payment_for_violation, payment_status, payment_summary,
    record_payment, soft_delete, violations_report, Aggregate, Amount, ErrorKind, Identifier,
    NewResident, NewVehicle, PaymentForm, PaymentMethod, PaymentStatus, Scope, Sex,
    ViolationFilter,
};
use rusqlite::Connection;

struct World {
    conn: Connection,
    speeding: Identifier,
    parking: Identifier,
    vehicle: Identifier,
}

fn world() -> World {
    let mut conn = open_in_memory().unwrap();

    let juan = roadeye_ledger::entities::resident::register_resident(
        &mut conn,
        &NewResident {
            username: "juan_dc".to_string(),
            password: "pass123".to_string(),
            first_name: "Juan".to_string(),
            middle_name: Some("S.".to_string()),
            last_name: "Dela Cruz".to_string(),
            sex: Sex::Male,
            contact_no: "09171234567".to_string(),
            address: Some("Purok 2, Barangay Poblacion".to_string()),
        },
    )
    .unwrap();

    let vehicle = roadeye_ledger::entities::vehicle::add_vehicle(
        &mut conn,
        &NewVehicle {
            resident_id: juan.id,
            plate_no: "abc1234".to_string(),
            brand: "Toyota".to_string(),
            model: "Vios".to_string(),
            color: Some("Silver".to_string()),
        },
    )
    .unwrap();

    let speeding = roadeye_ledger::entities::violation_type::add_violation_type(
        &mut conn,
        "Speeding",
        Amount::pesos(500),
    )
    .unwrap();
    let parking = roadeye_ledger::entities::violation_type::add_violation_type(
        &mut conn,
        "Illegal Parking",
        Amount::pesos(300),
    )
    .unwrap();

    World {
        conn,
        speeding: speeding.id,
        parking: parking.id,
        vehicle: vehicle.id,
    }
}

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn form(method: PaymentMethod, pesos: i64, reference: Option<&str>) -> PaymentForm {
    PaymentForm {
        method,
        amount: Amount::pesos(pesos),
        payer_name: "Juan Dela Cruz".to_string(),
        contact: "09171234567".to_string(),
        reference: reference.map(str::to_string),
    }
}

fn agg(total: u64, paid: u64, unpaid: u64, collected: i64, pending: i64) -> Aggregate {
    Aggregate {
        total,
        paid_count: paid,
        unpaid_count: unpaid,
        revenue_collected: Amount::pesos(collected),
        revenue_pending: Amount::pesos(pending),
    }
}

#[test]
fn speeding_unpaid_parking_paid_then_tombstoned() {
    let mut w = world();

    let v1 = create_violation(&mut w.conn, w.vehicle, w.speeding, day(2025, 3, 1)).unwrap();
    let v2 = create_violation(&mut w.conn, w.vehicle, w.parking, day(2025, 3, 8)).unwrap();
    assert_eq!(v1.to_string(), "V001");
    assert_eq!(v2.to_string(), "V002");

    record_payment(&mut w.conn, v2, &form(PaymentMethod::Cash, 300, None)).unwrap();

    assert_eq!(aggregate(&w.conn, &Scope::All).unwrap(), agg(2, 1, 1, 300, 500));

    assert!(soft_delete(&mut w.conn, v2).unwrap());

    let after = aggregate(&w.conn, &Scope::All).unwrap();
    assert_eq!(after, agg(1, 0, 1, 0, 500));

    let listed = list_violations(&w.conn, &ViolationFilter::all()).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, v1);

    // every surface reports the same totals
    assert_eq!(dashboard(&w.conn, &Scope::All, 2025).unwrap().stats, after);
    assert_eq!(violations_report(&w.conn).unwrap().stats, after);
    let summary = payment_summary(&w.conn, 10).unwrap();
    assert_eq!(summary.stats, after);
    assert!(summary.recent.is_empty(), "payment of a tombstoned violation is hidden");
}

#[test]
fn online_payment_needs_reference() {
    let mut w = world();
    let v1 = create_violation(&mut w.conn, w.vehicle, w.speeding, day(2025, 4, 2)).unwrap();

    let err = record_payment(&mut w.conn, v1, &form(PaymentMethod::GCash, 500, None)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(payment_status(&w.conn, v1).unwrap(), PaymentStatus::Unpaid);
    assert!(payment_for_violation(&w.conn, v1).unwrap().is_none());

    let with_reference = form(PaymentMethod::GCash, 500, Some("GC-20250402-77"));
    let receipt = record_payment(&mut w.conn, v1, &with_reference).unwrap();
    assert!(receipt.receipt_no.starts_with("RCPT-"));
    assert_eq!(payment_status(&w.conn, v1).unwrap(), PaymentStatus::Paid);
}

#[test]
fn paying_twice_keeps_one_row_with_latest_receipt() {
    let mut w = world();
    let v1 = create_violation(&mut w.conn, w.vehicle, w.speeding, day(2025, 5, 20)).unwrap();

    let first = record_payment(&mut w.conn, v1, &form(PaymentMethod::Cash, 500, None)).unwrap();
    let bank = form(PaymentMethod::BankTransfer, 500, Some("BT-1"));
    let second = record_payment(&mut w.conn, v1, &bank).unwrap();

    let rows: i64 = w
        .conn
        .query_row("SELECT COUNT(*) FROM payments WHERE ViolationID = ?1", [v1], |row| row.get(0))
        .unwrap();
    assert_eq!(rows, 1);

    let stored = payment_for_violation(&w.conn, v1).unwrap().unwrap();
    assert_eq!(stored.receipt_no, second.receipt_no);
    assert_eq!(stored.method, PaymentMethod::BankTransfer);
    assert_eq!(second.payment_id, first.payment_id);

    let totals = aggregate(&w.conn, &Scope::All).unwrap();
    assert_eq!(totals.paid_count, 1);
    assert_eq!(totals.revenue_collected, Amount::pesos(500));

    let payment_key = first.payment_id.to_string();
    let actions: Vec<String> = activity_for_record(&w.conn, "payments", &payment_key)
        .unwrap()
        .into_iter()
        .map(|e| e.action)
        .collect();
    assert_eq!(actions, vec!["payment_updated", "payment_recorded"], "newest first");
}

#[test]
fn payment_date_present_only_when_paid() {
    let mut w = world();
    let unpaid = create_violation(&mut w.conn, w.vehicle, w.speeding, day(2025, 1, 1)).unwrap();
    let paid = create_violation(&mut w.conn, w.vehicle, w.parking, day(2025, 1, 2)).unwrap();
    record_payment(&mut w.conn, paid, &form(PaymentMethod::Cash, 300, None)).unwrap();

    let unpaid = get_violation(&w.conn, unpaid).unwrap();
    assert_eq!(unpaid.status, PaymentStatus::Unpaid);
    assert!(unpaid.payment_date.is_none());
    assert!(unpaid.receipt_no.is_none());

    let paid = get_violation(&w.conn, paid).unwrap();
    assert_eq!(paid.status, PaymentStatus::Paid);
    assert!(paid.payment_date.is_some());
    assert!(paid.receipt_no.is_some());
}

#[test]
fn monthly_breakdown_always_has_twelve_months() {
    let mut w = world();
    create_violation(&mut w.conn, w.vehicle, w.speeding, day(2025, 2, 14)).unwrap();
    create_violation(&mut w.conn, w.vehicle, w.parking, day(2025, 2, 28)).unwrap();
    let gone = create_violation(&mut w.conn, w.vehicle, w.parking, day(2025, 9, 9)).unwrap();
    soft_delete(&mut w.conn, gone).unwrap();

    for year in [2020, 2025, 2031] {
        let b = monthly_breakdown(&w.conn, &Scope::All, year).unwrap();
        assert_eq!(b.months.len(), 12, "year {year}");
        let months: Vec<u32> = b.months.iter().map(|m| m.month).collect();
        assert_eq!(months, (1..=12).collect::<Vec<_>>());
    }

    let b = monthly_breakdown(&w.conn, &Scope::All, 2025).unwrap();
    assert_eq!(b.count(2), 2);
    assert_eq!(b.count(9), 0, "tombstoned violation not counted");
}

#[test]
fn invariants_hold_through_a_mixed_history() {
    let mut w = world();
    let mut ids = Vec::new();
    for (i, vtype) in [w.speeding, w.parking, w.speeding, w.parking, w.speeding]
        .into_iter()
        .enumerate()
    {
        let date = day(2025, (i + 1) as u32, 10);
        ids.push(create_violation(&mut w.conn, w.vehicle, vtype, date).unwrap());
    }

    let check = |conn: &Connection| {
        let a = aggregate(conn, &Scope::All).unwrap();
        assert_eq!(a.paid_count + a.unpaid_count, a.total);
        let fines: Amount = list_violations(conn, &ViolationFilter::all())
            .unwrap()
            .into_iter()
            .map(|v| v.fine)
            .sum();
        assert_eq!(a.total_possible(), fines);
    };

    check(&w.conn);
    record_payment(&mut w.conn, ids[0], &form(PaymentMethod::Cash, 500, None)).unwrap();
    check(&w.conn);
    record_payment(&mut w.conn, ids[3], &form(PaymentMethod::PayMaya, 300, Some("PM-9"))).unwrap();
    check(&w.conn);
    soft_delete(&mut w.conn, ids[0]).unwrap();
    check(&w.conn);
    soft_delete(&mut w.conn, ids[1]).unwrap();
    check(&w.conn);

    let a = aggregate(&w.conn, &Scope::All).unwrap();
    assert_eq!(a, agg(3, 1, 2, 300, 1000));
}
