//! On/off sensors for doors, ignition, trunk and hood

use viper_core::{EntityIdError, VehicleInfo, VehicleSnapshot, VehicleStatus};

use crate::entity::{on_off, EntityBase, VehicleEntity};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinarySensorKind {
    DoorsOpen,
    Ignition,
    TrunkOpen,
    HoodOpen,
}

impl BinarySensorKind {
    pub const ALL: [BinarySensorKind; 4] = [
        BinarySensorKind::DoorsOpen,
        BinarySensorKind::Ignition,
        BinarySensorKind::TrunkOpen,
        BinarySensorKind::HoodOpen,
    ];

    pub fn key(self) -> &'static str {
        match self {
            BinarySensorKind::DoorsOpen => "doors_open",
            BinarySensorKind::Ignition => "ignition_on",
            BinarySensorKind::TrunkOpen => "trunk_open",
            BinarySensorKind::HoodOpen => "hood_open",
        }
    }

    fn name(self) -> &'static str {
        match self {
            BinarySensorKind::DoorsOpen => "Doors Open",
            BinarySensorKind::Ignition => "Ignition",
            BinarySensorKind::TrunkOpen => "Trunk Open",
            BinarySensorKind::HoodOpen => "Hood Open",
        }
    }

    fn device_class(self) -> &'static str {
        match self {
            BinarySensorKind::DoorsOpen => "door",
            BinarySensorKind::Ignition => "running",
            BinarySensorKind::TrunkOpen | BinarySensorKind::HoodOpen => "opening",
        }
    }

    fn value(self, status: &VehicleStatus) -> Option<bool> {
        match self {
            BinarySensorKind::DoorsOpen => status.doors_open,
            BinarySensorKind::Ignition => status.ignition_on,
            BinarySensorKind::TrunkOpen => status.trunk_open,
            BinarySensorKind::HoodOpen => status.hood_open,
        }
    }
}

pub struct VehicleBinarySensor {
    base: EntityBase,
    kind: BinarySensorKind,
}

impl VehicleBinarySensor {
    pub fn new(
        vehicle: &VehicleInfo,
        device_name: &str,
        kind: BinarySensorKind,
    ) -> Result<Self, EntityIdError> {
        let base = EntityBase::new("binary_sensor", vehicle, device_name, kind.key(), kind.name())?
            .with_device_class(kind.device_class());
        Ok(Self { base, kind })
    }

    pub fn kind(&self) -> BinarySensorKind {
        self.kind
    }
}

impl VehicleEntity for VehicleBinarySensor {
    fn base(&self) -> &EntityBase {
        &self.base
    }

    fn native_state(&self, snapshot: &VehicleSnapshot) -> Option<String> {
        on_off(self.kind.value(&snapshot.status))
    }
}
