//! Device description shared by a vehicle's entities

use serde::Serialize;
use viper_core::{VehicleId, VehicleInfo, DOMAIN, MANUFACTURER};

/// How the host should group a vehicle's entities
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    /// `(domain, vehicle id)`
    pub identifiers: Vec<(String, String)>,
    pub name: String,
    pub manufacturer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl DeviceInfo {
    pub fn for_vehicle(info: &VehicleInfo, name: &str) -> Self {
        Self {
            identifiers: vec![(DOMAIN.to_string(), info.id.to_string())],
            name: name.to_string(),
            manufacturer: MANUFACTURER.to_string(),
            model: info.model_description(),
        }
    }

    pub fn vehicle_id(&self) -> Option<VehicleId> {
        self.identifiers
            .iter()
            .find(|(domain, _)| domain == DOMAIN)
            .map(|(_, id)| VehicleId::new(id.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_info() {
        let mut info = VehicleInfo::unnamed(VehicleId::new("77"));
        info.make = Some("Ford".into());
        info.model = Some("F-150".into());

        let device = DeviceInfo::for_vehicle(&info, "Truck");
        assert_eq!(device.identifiers, vec![(DOMAIN.to_string(), "77".to_string())]);
        assert_eq!(device.model.as_deref(), Some("Ford F-150"));
        assert_eq!(device.manufacturer, MANUFACTURER);
        assert_eq!(device.vehicle_id(), Some(VehicleId::new("77")));
    }
}
