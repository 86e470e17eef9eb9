// RoadEye Ledger - Core Library
// Violation/payment ledger shared by the CLI, the API server, and tests

pub mod config;
pub mod db;
pub mod entities;
pub mod error;
pub mod ids;
pub mod migration;
pub mod money;
pub mod payments;
pub mod reports;
pub mod seed;
pub mod stats;
pub mod validation;
pub mod violations;

// Re-export commonly used types
pub use config::LedgerConfig;
pub use db::{
    activity_for_record, begin_write, open, open_in_memory, open_with_config, record_activity,
    setup_database, ActivityEvent, WriteTx,
};
pub use entities::{
    NewResident, NewVehicle, Resident, ResidentSummary, Sex, Vehicle, VehicleSummary,
    VehicleUpdate, ViolationType,
};
pub use error::{ErrorKind, LedgerError, Result};
pub use ids::{allocate, EntityKind, Identifier, ParseIdentifierError};
pub use migration::{ensure_schema, MigrationReport};
pub use money::Amount;
pub use payments::{
    payment_for_violation, payment_history, payment_status, recent_payments, record_payment,
    record_payment_as, Payment, PaymentMethod, PaymentStatus, Receipt, RecentPayment,
};
pub use reports::{
    dashboard, export_violations_csv, payment_summary, violations_report, Dashboard,
    PaymentSummary, ReportRow, ViolationsReport,
};
pub use seed::{populate, SeedPlan, SeedReport};
pub use stats::{aggregate, monthly_breakdown, Aggregate, MonthCount, MonthlyBreakdown, Scope};
pub use validation::PaymentForm;
pub use violations::{
    create_violation, create_violation_as, get_violation, list_violations, soft_delete,
    soft_delete_as, StatusFilter, ViolationDetail, ViolationFilter, ViolationSummary,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
