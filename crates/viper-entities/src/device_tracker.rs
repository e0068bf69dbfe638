//! GPS location of a vehicle

use serde_json::json;
use viper_core::{EntityIdError, VehicleInfo, VehicleSnapshot};

use crate::entity::{Attributes, EntityBase, VehicleEntity};

/// Tracker state without zone matching: `not_home` with a fix, `unknown` without
const STATE_NOT_HOME: &str = "not_home";

pub struct VehicleTracker {
    base: EntityBase,
}

impl VehicleTracker {
    pub fn new(vehicle: &VehicleInfo, device_name: &str) -> Result<Self, EntityIdError> {
        let base = EntityBase::new("device_tracker", vehicle, device_name, "location", "Location")?
            .with_icon("mdi:car");
        Ok(Self { base })
    }
}

impl VehicleEntity for VehicleTracker {
    fn base(&self) -> &EntityBase {
        &self.base
    }

    fn native_state(&self, snapshot: &VehicleSnapshot) -> Option<String> {
        snapshot
            .status
            .coordinates()
            .map(|_| STATE_NOT_HOME.to_string())
    }

    fn attributes(&self, snapshot: &VehicleSnapshot) -> Attributes {
        let status = &snapshot.status;
        let mut attributes = Attributes::new();
        attributes.insert("source_type".into(), json!("gps"));
        if let Some((latitude, longitude)) = status.coordinates() {
            attributes.insert("latitude".into(), json!(latitude));
            attributes.insert("longitude".into(), json!(longitude));
        }
        if let Some(heading) = status.heading {
            attributes.insert("heading".into(), json!(heading));
        }
        if let Some(speed) = &status.speed {
            attributes.insert("speed".into(), json!(speed));
        }
        attributes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use viper_core::{VehicleId, VehicleStatus, STATE_UNKNOWN};

    #[test]
    fn test_tracker_with_fix() {
        let tracker = VehicleTracker::new(&VehicleInfo::unnamed(VehicleId::new("1")), "Car").unwrap();
        let snapshot = VehicleSnapshot::observed(
            VehicleId::new("1"),
            VehicleStatus {
                latitude: Some(45.5),
                longitude: Some(-73.6),
                heading: Some(90),
                ..Default::default()
            },
            Utc::now(),
        );

        let (state, attributes) = tracker.render(&snapshot);
        assert_eq!(state, "not_home");
        assert_eq!(attributes["latitude"], 45.5);
        assert_eq!(attributes["heading"], 90);
        assert_eq!(tracker.entity_id().to_string(), "device_tracker.car_location");
    }

    #[test]
    fn test_tracker_without_fix() {
        let tracker = VehicleTracker::new(&VehicleInfo::unnamed(VehicleId::new("1")), "Car").unwrap();
        let snapshot = VehicleSnapshot::observed(
            VehicleId::new("1"),
            VehicleStatus {
                latitude: Some(45.5),
                ..Default::default()
            },
            Utc::now(),
        );

        let (state, attributes) = tracker.render(&snapshot);
        assert_eq!(state, STATE_UNKNOWN);
        assert!(!attributes.contains_key("latitude"));
    }
}
