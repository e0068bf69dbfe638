//! Last-known-good snapshot store

use dashmap::DashMap;
use tracing::trace;
use viper_core::{VehicleId, VehicleSnapshot};

/// Keyed store of one snapshot per configured vehicle
///
/// Entries are created invalid at registration and replaced wholesale on each
/// successful refresh. There is no eviction.
pub struct StateCache {
    snapshots: DashMap<VehicleId, VehicleSnapshot>,
}

impl StateCache {
    pub fn new() -> Self {
        Self {
            snapshots: DashMap::new(),
        }
    }

    /// Create the invalid entry for a vehicle, leaving an existing entry alone
    pub fn register(&self, vehicle_id: &VehicleId) {
        self.snapshots
            .entry(vehicle_id.clone())
            .or_insert_with(|| VehicleSnapshot::invalid(vehicle_id.clone()));
    }

    /// Copy of the current snapshot, None for unregistered vehicles
    pub fn get(&self, vehicle_id: &VehicleId) -> Option<VehicleSnapshot> {
        self.snapshots.get(vehicle_id).map(|s| s.clone())
    }

    /// Replace the snapshot for its vehicle; false if nothing was written
    ///
    /// A valid entry is never replaced by an invalid one, and vehicles that are
    /// not registered (or were removed) are ignored.
    pub fn put(&self, snapshot: VehicleSnapshot) -> bool {
        let Some(mut existing) = self.snapshots.get_mut(&snapshot.vehicle_id) else {
            trace!(vehicle_id = %snapshot.vehicle_id, "Ignoring snapshot for unregistered vehicle");
            return false;
        };
        if existing.valid && !snapshot.valid {
            return false;
        }
        trace!(vehicle_id = %snapshot.vehicle_id, valid = snapshot.valid, "Writing snapshot");
        *existing = snapshot;
        true
    }

    /// Drop a vehicle's entry at deregistration
    pub fn remove(&self, vehicle_id: &VehicleId) -> Option<VehicleSnapshot> {
        self.snapshots.remove(vehicle_id).map(|(_, s)| s)
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

impl Default for StateCache {
    fn default() -> Self {
        Self::new()
    }
}
