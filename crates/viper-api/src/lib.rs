//! Viper SmartStart API client
//!
//! This crate defines the [`VehicleApi`] boundary the coordinator talks to and
//! [`ViperClient`], its HTTP implementation against the Viper cloud service.
//!
//! One status refresh is two upstream calls: `read_active` (GPS, battery, doors,
//! ignition, trunk, hood) and `read_current` (locks, remote starter, security
//! system). [`combine`] merges the two partial reads into a [`VehicleStatus`].

mod client;
mod error;
mod parse;

pub use client::{ViperClient, ViperClientBuilder, DEFAULT_BASE_URL};
pub use error::{ApiError, ApiResult};
pub use parse::{ActiveStatus, CurrentStatus};

use async_trait::async_trait;
use std::sync::Arc;
use viper_core::{Command, VehicleId, VehicleInfo, VehicleStatus};

/// Authenticated access to the vehicle telematics service
///
/// Every method may fail with any [`ApiError`] kind. Implementations do not
/// retry; retry and re-authentication policy belongs to the caller.
#[async_trait]
pub trait VehicleApi: Send + Sync {
    /// Obtain (or renew) an access token
    async fn login(&self) -> ApiResult<()>;

    /// Replace the account credentials used by the next `login`
    ///
    /// Any current token is discarded.
    async fn set_credentials(&self, username: &str, password: &str);

    /// List the vehicles registered to the account
    async fn list_vehicles(&self) -> ApiResult<Vec<VehicleInfo>>;

    /// Read GPS, battery and body state (`read_active`)
    async fn get_active_status(&self, vehicle_id: &VehicleId) -> ApiResult<ActiveStatus>;

    /// Read lock, remote starter and alarm state (`read_current`)
    async fn get_current_status(&self, vehicle_id: &VehicleId) -> ApiResult<CurrentStatus>;

    /// Send a control command
    async fn send_command(&self, vehicle_id: &VehicleId, command: Command) -> ApiResult<()>;
}

/// Shared handle to a vehicle API implementation
pub type SharedVehicleApi = Arc<dyn VehicleApi>;

/// Merge the two partial status reads into one complete observation
pub fn combine(active: ActiveStatus, current: CurrentStatus) -> VehicleStatus {
    VehicleStatus {
        latitude: active.latitude,
        longitude: active.longitude,
        speed: active.speed,
        heading: active.heading,
        battery_voltage: active.battery_voltage,
        doors_open: active.doors_open,
        ignition_on: active.ignition_on,
        trunk_open: active.trunk_open,
        hood_open: active.hood_open,
        doors_locked: current.doors_locked,
        remote_starter_active: current.remote_starter_active,
        security_system_armed: current.security_system_armed,
        panic_on: current.panic_on,
        valet_on: current.valet_on,
    }
}
