//! Core types for the Viper SmartStart bridge
//!
//! This crate provides the fundamental types shared by every other crate in the
//! workspace: vehicle identifiers and snapshots, commands and refresh reasons,
//! entity ids and rendered entity states, service calls and their context.

mod command;
mod context;
mod entity_id;
mod service_call;
mod state;
mod vehicle;

pub use command::{Command, CommandRequest, RefreshReason, StatusRead};
pub use context::Context;
pub use entity_id::{slugify, EntityId, EntityIdError, IdPart};
pub use service_call::ServiceCall;
pub use state::State;
pub use vehicle::{VehicleId, VehicleInfo, VehicleSnapshot, VehicleStatus};

/// Integration domain, used for service names and device identifiers
pub const DOMAIN: &str = "viper_smartstart";

/// Number of upstream calls consumed by one status refresh (read_active + read_current)
pub const CALLS_PER_REFRESH: u32 = 2;

/// Documented yearly call allowance of the Viper service
pub const ANNUAL_CALL_BUDGET: u64 = 5_000;

/// Manufacturer reported for every vehicle device
pub const MANUFACTURER: &str = "Viper SmartStart";

/// State value for entities without any successful snapshot
pub const STATE_UNAVAILABLE: &str = "unavailable";

/// State value for entities whose upstream field was not reported
pub const STATE_UNKNOWN: &str = "unknown";

/// Standard service names exposed by the bridge
pub mod services {
    /// Refresh every configured vehicle
    pub const REFRESH: &str = "refresh";
}
