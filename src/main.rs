// RoadEye Ledger - Command Line
//
// Thin wrapper over the library: every command opens the configured store,
// brings the schema up to date, runs one ledger operation and prints it.

use anyhow::{bail, Context, Result};
use chrono::{Datelike, Local};
use roadeye_ledger::{
    dashboard, ensure_schema, export_violations_csv, list_violations, open_with_config,
    payment_summary, populate, record_payment_as, soft_delete_as, violations_report, Amount,
    EntityKind, Identifier, LedgerConfig, LedgerError, PaymentForm, PaymentMethod, Scope,
    SeedPlan, StatusFilter, ViolationFilter,
};
use rusqlite::Connection;
use std::env;
use std::fs::File;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: roadeye <command>

commands:
  migrate                                   bring the schema up to date
  seed [RESIDENTS]                          populate demo data
  dashboard [RESIDENT_ID] [YEAR]            counters and monthly breakdown
  violations [SEARCH] [--paid|--unpaid]     list live violations
  pay <VIOLATION_ID> <METHOD> <AMOUNT> <PAYER> <CONTACT> [REFERENCE]
  delete <VIOLATION_ID>                     tombstone a violation
  report <CSV_PATH>                         export the violations report
  payments [LIMIT]                          payment summary";

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let Some(command) = args.first() else {
        eprintln!("{USAGE}");
        std::process::exit(2);
    };

    let config = LedgerConfig::from_env()?;
    let mut conn = open_with_config(&config)
        .with_context(|| format!("opening {}", config.database_path.display()))?;

    let report = ensure_schema(&mut conn).context("schema migration failed")?;
    if command == "migrate" {
        if report.is_noop() {
            println!("✓ Schema is up to date");
        } else {
            for step in &report.applied {
                println!("✓ Applied {step}");
            }
        }
        return Ok(());
    }

    let rest = &args[1..];
    let outcome = match command.as_str() {
        "seed" => run_seed(&mut conn, rest),
        "dashboard" => run_dashboard(&conn, rest),
        "violations" => run_violations(&conn, rest),
        "pay" => run_pay(&mut conn, &config.actor, rest),
        "delete" => run_delete(&mut conn, &config.actor, rest),
        "report" => run_report(&conn, rest),
        "payments" => run_payments(&conn, rest),
        _ => {
            eprintln!("{USAGE}");
            std::process::exit(2);
        }
    };

    // ledger errors carry a message meant for people; show that, not the store text
    if let Err(err) = outcome {
        if let Some(ledger) = err.downcast_ref::<LedgerError>() {
            eprintln!("❌ {}", ledger.user_message());
            std::process::exit(1);
        }
        return Err(err);
    }
    Ok(())
}

fn run_seed(conn: &mut Connection, args: &[String]) -> Result<()> {
    let mut plan = SeedPlan::default();
    if let Some(raw) = args.first() {
        plan.residents = raw.parse().with_context(|| format!("invalid resident count '{raw}'"))?;
    }

    println!("🌱 Populating demo data ({} residents, {})...", plan.residents, plan.year);
    let seeded = populate(conn, &plan)?;

    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("✓ Violation types: {}", seeded.violation_types);
    println!("✓ Residents:       {}", seeded.residents);
    println!("✓ Vehicles:        {}", seeded.vehicles);
    println!("✓ Violations:      {}", seeded.violations);
    println!("✓ Payments:        {}", seeded.payments);
    Ok(())
}

fn run_dashboard(conn: &Connection, args: &[String]) -> Result<()> {
    let mut scope = Scope::All;
    let mut year = Local::now().year();

    for arg in args {
        if let Some(resident) = Identifier::parse_as(EntityKind::Resident, arg) {
            scope = Scope::Resident(resident);
        } else {
            year = arg
                .parse()
                .with_context(|| format!("expected a resident ID or a year, got '{arg}'"))?;
        }
    }

    let dash = dashboard(conn, &scope, year)?;
    let stats = &dash.stats;

    match scope {
        Scope::All => println!("📊 Dashboard - all residents ({year})"),
        Scope::Resident(id) => println!("📊 Dashboard - resident {id} ({year})"),
    }
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    if let Some(residents) = dash.residents {
        println!("Residents:          {residents}");
    }
    println!("Vehicles:           {}", dash.vehicles);
    println!("Total violations:   {}", stats.total);
    println!("Paid:               {}", stats.paid_count);
    println!("Unpaid:             {}", stats.unpaid_count);
    println!("Revenue collected:  {}", stats.revenue_collected);
    println!("Revenue pending:    {}", stats.revenue_pending);
    println!("\n📅 Violations by month");
    for month in &dash.monthly.months {
        println!("  {} {:>4} {}", month.label, month.count, "█".repeat(month.count as usize));
    }
    Ok(())
}

fn run_violations(conn: &Connection, args: &[String]) -> Result<()> {
    let mut filter = ViolationFilter::all();
    for arg in args {
        match arg.as_str() {
            "--paid" => filter = filter.status(StatusFilter::Paid),
            "--unpaid" => filter = filter.status(StatusFilter::Unpaid),
            search => filter = filter.search(search),
        }
    }

    let rows = list_violations(conn, &filter)?;
    println!(
        "{:<6} {:<24} {:<10} {:<24} {:<10} {:>12} {:<6}",
        "ID", "Resident", "Plate", "Violation", "Date", "Fine", "Status"
    );
    for v in &rows {
        println!(
            "{:<6} {:<24} {:<10} {:<24} {:<10} {:>12} {:<6}",
            v.id.to_string(),
            v.resident_name,
            v.plate_no,
            v.violation_type,
            v.date.to_string(),
            v.fine.to_string(),
            v.status.to_string()
        );
    }
    println!("\n{} violation(s)", rows.len());
    Ok(())
}

fn run_pay(conn: &mut Connection, actor: &str, args: &[String]) -> Result<()> {
    let [violation, method, amount, payer, contact, reference @ ..] = args else {
        bail!("usage: roadeye pay <VIOLATION_ID> <METHOD> <AMOUNT> <PAYER> <CONTACT> [REFERENCE]");
    };

    let violation = Identifier::reference(EntityKind::Violation, violation)?;
    let method: PaymentMethod = method.parse().map_err(anyhow::Error::msg)?;
    let Some(amount) = Amount::parse(amount) else {
        bail!("invalid amount '{amount}'");
    };

    let receipt = record_payment_as(
        conn,
        actor,
        violation,
        &PaymentForm {
            method,
            amount,
            payer_name: payer.clone(),
            contact: contact.clone(),
            reference: reference.first().cloned(),
        },
    )?;

    println!("✅ Payment recorded");
    println!("   Receipt:   {}", receipt.receipt_no);
    println!("   Violation: {}", receipt.violation_id);
    println!("   Amount:    {} via {}", receipt.amount, receipt.method);
    if let Some(old) = &receipt.replaced_receipt {
        println!("   Replaces:  {old}");
    }
    Ok(())
}

fn run_delete(conn: &mut Connection, actor: &str, args: &[String]) -> Result<()> {
    let Some(raw) = args.first() else {
        bail!("usage: roadeye delete <VIOLATION_ID>");
    };
    let Some(id) = Identifier::parse_as(EntityKind::Violation, raw) else {
        bail!("'{raw}' is not a violation ID");
    };

    if soft_delete_as(conn, actor, id)? {
        println!("🗑️  Violation {id} deleted");
    } else {
        println!("✓ Violation {id} was already deleted");
    }
    Ok(())
}

fn run_report(conn: &Connection, args: &[String]) -> Result<()> {
    let Some(path) = args.first() else {
        bail!("usage: roadeye report <CSV_PATH>");
    };

    let report = violations_report(conn)?;
    let file = File::create(path).with_context(|| format!("creating {path}"))?;
    export_violations_csv(&report, file).with_context(|| format!("writing {path}"))?;

    println!("📄 Report written to {path}");
    println!("   Rows:      {}", report.rows.len());
    println!("   Collected: {}", report.stats.revenue_collected);
    println!("   Pending:   {}", report.stats.revenue_pending);
    Ok(())
}

fn run_payments(conn: &Connection, args: &[String]) -> Result<()> {
    let limit = match args.first() {
        Some(raw) => raw.parse().with_context(|| format!("invalid limit '{raw}'"))?,
        None => 10,
    };

    let summary = payment_summary(conn, limit)?;
    println!("💰 Payment summary");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Paid:      {} ({})", summary.stats.paid_count, summary.stats.revenue_collected);
    println!("Unpaid:    {} ({})", summary.stats.unpaid_count, summary.stats.revenue_pending);
    println!("\nRecent payments");
    for p in &summary.recent {
        println!(
            "  {} {} {:<24} {:<24} {}",
            p.paid_at, p.violation_id, p.resident_name, p.violation_type, p.amount_paid
        );
    }
    Ok(())
}
