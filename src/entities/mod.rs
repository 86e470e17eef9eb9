// Registration entities
//
// Residents own vehicles; violation types are reference data with a fixed
// fine. None of them are ever hard-deleted: violations point at them.

pub mod resident;
pub mod vehicle;
pub mod violation_type;

pub use resident::{NewResident, Resident, ResidentSummary, Sex};
pub use vehicle::{NewVehicle, Vehicle, VehicleSummary, VehicleUpdate};
pub use violation_type::ViolationType;
