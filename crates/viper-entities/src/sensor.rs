//! Numeric and timestamp sensors

use serde_json::json;
use viper_core::{EntityIdError, VehicleInfo, VehicleSnapshot};

use crate::entity::{Attributes, EntityBase, VehicleEntity};

/// Battery voltage in volts, two decimals
pub struct BatteryVoltageSensor {
    base: EntityBase,
}

impl BatteryVoltageSensor {
    pub fn new(vehicle: &VehicleInfo, device_name: &str) -> Result<Self, EntityIdError> {
        let base = EntityBase::new("sensor", vehicle, device_name, "battery_voltage", "Battery Voltage")?
            .with_device_class("voltage");
        Ok(Self { base })
    }
}

impl VehicleEntity for BatteryVoltageSensor {
    fn base(&self) -> &EntityBase {
        &self.base
    }

    fn native_state(&self, snapshot: &VehicleSnapshot) -> Option<String> {
        snapshot.status.battery_voltage.map(|v| format!("{:.2}", v))
    }

    fn attributes(&self, _snapshot: &VehicleSnapshot) -> Attributes {
        let mut attributes = Attributes::new();
        attributes.insert("unit_of_measurement".into(), json!("V"));
        attributes.insert("state_class".into(), json!("measurement"));
        attributes
    }
}

/// Time of the vehicle's last successful refresh
pub struct LastUpdatedSensor {
    base: EntityBase,
}

impl LastUpdatedSensor {
    pub fn new(vehicle: &VehicleInfo, device_name: &str) -> Result<Self, EntityIdError> {
        let base = EntityBase::new("sensor", vehicle, device_name, "last_updated", "Last Updated")?
            .with_device_class("timestamp")
            .with_icon("mdi:clock-outline");
        Ok(Self { base })
    }
}

impl VehicleEntity for LastUpdatedSensor {
    fn base(&self) -> &EntityBase {
        &self.base
    }

    fn native_state(&self, snapshot: &VehicleSnapshot) -> Option<String> {
        snapshot.last_updated.map(|at| at.to_rfc3339())
    }
}
