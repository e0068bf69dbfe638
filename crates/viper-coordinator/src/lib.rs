//! Vehicle state coordinator for the Viper SmartStart bridge
//!
//! This crate owns the cached [`VehicleSnapshot`](viper_core::VehicleSnapshot)
//! of every configured vehicle and is the only component that talks to the
//! upstream API on their behalf:
//! - refreshes for one vehicle are coalesced into a single pair of status reads
//! - a failed refresh never clears previously known data
//! - scheduled refreshes are gated by a per-vehicle call budget
//! - accepted commands are verified by a follow-up refresh

mod budget;
mod cache;
mod coordinator;
mod error;
mod listeners;
mod scheduler;

pub use budget::RateBudget;
pub use cache::StateCache;
pub use coordinator::{CommandOutcome, Coordinator, CoordinatorConfig, RefreshState};
pub use error::{CommandError, RefreshError, RefreshResult};
pub use listeners::{ListenerId, SnapshotListener};

use std::sync::Arc;

/// Shared coordinator handle
pub type SharedCoordinator = Arc<Coordinator>;
