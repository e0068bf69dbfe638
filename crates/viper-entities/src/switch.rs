//! Remote start switch

use tracing::{debug, warn};
use viper_coordinator::{CommandOutcome, Coordinator};
use viper_core::{Command, EntityIdError, VehicleInfo, VehicleSnapshot};

use crate::entity::{on_off, EntityBase, EntityError, VehicleEntity};

/// Shows and controls the remote starter
///
/// Upstream the starter is a toggle, so both directions are guarded against
/// the last known state: a start while the engine runs would stop it.
pub struct RemoteStartSwitch {
    base: EntityBase,
}

impl RemoteStartSwitch {
    pub fn new(vehicle: &VehicleInfo, device_name: &str) -> Result<Self, EntityIdError> {
        let base = EntityBase::new("switch", vehicle, device_name, "remote_start", "Remote Start")?
            .with_icon("mdi:car-key")
            .with_device_class("switch");
        Ok(Self { base })
    }

    /// Remote start the engine
    ///
    /// Refused when the last snapshot shows the starter active or the ignition on.
    pub async fn turn_on(&self, coordinator: &Coordinator) -> Result<CommandOutcome, EntityError> {
        if let Some(snapshot) = self.known_snapshot(coordinator) {
            if snapshot.status.remote_starter_active == Some(true) {
                debug!(entity_id = %self.base.entity_id, "Remote starter already active");
                return Err(self.refused("remote starter already active"));
            }
            if snapshot.status.ignition_on == Some(true) {
                warn!(entity_id = %self.base.entity_id, "Cannot remote start, ignition is on");
                return Err(self.refused("ignition is already on"));
            }
        }

        Ok(coordinator
            .send_command(&self.base.vehicle_id, Command::Start)
            .await?)
    }

    /// Stop a remote-started engine
    ///
    /// Refused when the starter is not active, or the ignition is on because a
    /// key is in the vehicle.
    pub async fn turn_off(&self, coordinator: &Coordinator) -> Result<CommandOutcome, EntityError> {
        if let Some(snapshot) = self.known_snapshot(coordinator) {
            if snapshot.status.remote_starter_active != Some(true) {
                debug!(entity_id = %self.base.entity_id, "Remote starter not active");
                return Err(self.refused("remote starter not active"));
            }
            if snapshot.status.ignition_on == Some(true) {
                warn!(entity_id = %self.base.entity_id, "Cannot stop, ignition is on");
                return Err(self.refused("ignition is on"));
            }
        }

        Ok(coordinator
            .send_command(&self.base.vehicle_id, Command::Stop)
            .await?)
    }

    /// The cached snapshot, if any refresh has succeeded
    fn known_snapshot(&self, coordinator: &Coordinator) -> Option<VehicleSnapshot> {
        coordinator
            .get_snapshot(&self.base.vehicle_id)
            .filter(|s| s.valid)
    }

    fn refused(&self, reason: &'static str) -> EntityError {
        EntityError::Refused {
            entity_id: self.base.entity_id.clone(),
            reason,
        }
    }
}

impl VehicleEntity for RemoteStartSwitch {
    fn base(&self) -> &EntityBase {
        &self.base
    }

    fn native_state(&self, snapshot: &VehicleSnapshot) -> Option<String> {
        on_off(snapshot.status.remote_starter_active)
    }
}
