//! Common test utilities for the coordinator
//!
//! Provides a scriptable in-memory vehicle API and coordinator builders.

mod mock_api;

pub use mock_api::*;

use std::sync::Arc;
use std::time::Duration;
use viper_coordinator::{Coordinator, CoordinatorConfig};
use viper_core::VehicleId;

/// Coordinator config with no settle delay and polling disabled
pub fn quick_config() -> CoordinatorConfig {
    CoordinatorConfig {
        action_refresh_delay: Duration::ZERO,
        ..Default::default()
    }
}

/// Build a coordinator over the given mock for vehicles "1" and "2"
pub fn coordinator(api: &Arc<MockApi>, config: CoordinatorConfig) -> Coordinator {
    Coordinator::new(api.clone(), vec![VehicleId::new("1"), VehicleId::new("2")], config)
}

pub fn vid(id: &str) -> VehicleId {
    VehicleId::new(id)
}
