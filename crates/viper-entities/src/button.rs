//! Lock, unlock and refresh buttons

use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Mutex;
use tracing::debug;
use viper_coordinator::Coordinator;
use viper_core::{Command, EntityIdError, RefreshReason, VehicleInfo, VehicleSnapshot, STATE_UNKNOWN};

use crate::entity::{Attributes, EntityBase, EntityError, VehicleEntity};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonKind {
    Lock,
    Unlock,
    Refresh,
}

impl ButtonKind {
    pub const ALL: [ButtonKind; 3] = [ButtonKind::Lock, ButtonKind::Unlock, ButtonKind::Refresh];

    pub fn key(self) -> &'static str {
        match self {
            ButtonKind::Lock => "lock",
            ButtonKind::Unlock => "unlock",
            ButtonKind::Refresh => "refresh",
        }
    }

    fn name(self) -> &'static str {
        match self {
            ButtonKind::Lock => "Lock",
            ButtonKind::Unlock => "Unlock",
            ButtonKind::Refresh => "Refresh Status",
        }
    }

    fn icon(self) -> &'static str {
        match self {
            ButtonKind::Lock => "mdi:car-door-lock",
            ButtonKind::Unlock => "mdi:car-door-lock-open",
            ButtonKind::Refresh => "mdi:refresh",
        }
    }
}

/// A stateless action; its state is the time it was last pressed
///
/// Buttons stay available without a snapshot so a first refresh can be requested.
pub struct VehicleButton {
    base: EntityBase,
    kind: ButtonKind,
    last_pressed: Mutex<Option<DateTime<Utc>>>,
}

impl VehicleButton {
    pub fn new(vehicle: &VehicleInfo, device_name: &str, kind: ButtonKind) -> Result<Self, EntityIdError> {
        let base = EntityBase::new("button", vehicle, device_name, kind.key(), kind.name())?
            .with_icon(kind.icon());
        Ok(Self {
            base,
            kind,
            last_pressed: Mutex::new(None),
        })
    }

    pub fn kind(&self) -> ButtonKind {
        self.kind
    }

    /// Run the button's action through the coordinator
    ///
    /// Lock and unlock return once the command has been verified; a failed
    /// verification is not an error.
    pub async fn press(&self, coordinator: &Coordinator) -> Result<(), EntityError> {
        debug!(entity_id = %self.base.entity_id, "Button pressed");
        *self.last_pressed.lock().unwrap_or_else(|e| e.into_inner()) = Some(Utc::now());

        let vehicle_id = &self.base.vehicle_id;
        match self.kind {
            ButtonKind::Lock => {
                coordinator.send_command(vehicle_id, Command::Lock).await?;
            }
            ButtonKind::Unlock => {
                coordinator.send_command(vehicle_id, Command::Unlock).await?;
            }
            ButtonKind::Refresh => {
                coordinator.refresh(vehicle_id, RefreshReason::Manual).await?;
            }
        }
        Ok(())
    }

    pub fn last_pressed(&self) -> Option<DateTime<Utc>> {
        *self.last_pressed.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl VehicleEntity for VehicleButton {
    fn base(&self) -> &EntityBase {
        &self.base
    }

    fn native_state(&self, _snapshot: &VehicleSnapshot) -> Option<String> {
        self.last_pressed().map(|at| at.to_rfc3339())
    }

    fn render(&self, snapshot: &VehicleSnapshot) -> (String, Attributes) {
        let mut attributes = self.base.static_attributes();
        if let Some(at) = snapshot.last_updated {
            attributes.insert("last_updated".into(), json!(at.to_rfc3339()));
        }
        let state = self
            .native_state(snapshot)
            .unwrap_or_else(|| STATE_UNKNOWN.to_string());
        (state, attributes)
    }
}
