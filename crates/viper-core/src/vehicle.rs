//! Vehicle identity, observed status, and cached snapshots

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Upstream device identifier of a vehicle
///
/// The Viper API reports device ids as numbers in some payloads and strings in
/// others; the bridge always carries them as strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VehicleId(String);

impl VehicleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VehicleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VehicleId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for VehicleId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Account-level description of a vehicle, as listed by the device search endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleInfo {
    pub id: VehicleId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub make: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
}

impl VehicleInfo {
    /// Placeholder info for a configured vehicle the account listing did not include
    pub fn unnamed(id: VehicleId) -> Self {
        let name = format!("Vehicle {}", id);
        Self {
            id,
            name,
            make: None,
            model: None,
            year: None,
        }
    }

    /// Model string built from year, make and model, if any are known
    pub fn model_description(&self) -> Option<String> {
        let parts: Vec<&str> = [&self.year, &self.make, &self.model]
            .into_iter()
            .filter_map(|p| p.as_deref())
            .collect();

        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }
}

/// One observation of a vehicle, merged from the active and current status reads
///
/// Every field is optional because the upstream service omits whatever the
/// module did not report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VehicleStatus {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub speed: Option<String>,
    pub heading: Option<i64>,
    pub battery_voltage: Option<f64>,
    pub doors_locked: Option<bool>,
    pub doors_open: Option<bool>,
    pub remote_starter_active: Option<bool>,
    pub ignition_on: Option<bool>,
    pub trunk_open: Option<bool>,
    pub hood_open: Option<bool>,
    pub security_system_armed: Option<bool>,
    pub panic_on: Option<bool>,
    pub valet_on: Option<bool>,
}

impl VehicleStatus {
    /// GPS fix, only when both coordinates were reported
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        self.latitude.zip(self.longitude)
    }
}

/// The last-known-good state of one vehicle
///
/// Snapshots are immutable: a successful refresh replaces the whole value,
/// a failed one leaves it alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleSnapshot {
    pub vehicle_id: VehicleId,
    pub status: VehicleStatus,
    /// Time of the last successful refresh
    pub last_updated: Option<DateTime<Utc>>,
    /// True once at least one refresh has succeeded
    pub valid: bool,
}

impl VehicleSnapshot {
    /// Snapshot for a freshly registered vehicle with no data yet
    pub fn invalid(vehicle_id: VehicleId) -> Self {
        Self {
            vehicle_id,
            status: VehicleStatus::default(),
            last_updated: None,
            valid: false,
        }
    }

    /// Snapshot produced by a successful refresh
    pub fn observed(vehicle_id: VehicleId, status: VehicleStatus, at: DateTime<Utc>) -> Self {
        Self {
            vehicle_id,
            status,
            last_updated: Some(at),
            valid: true,
        }
    }

    /// Age of the snapshot relative to `now`, None if never populated
    pub fn age(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.last_updated.map(|t| now - t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_description() {
        let mut info = VehicleInfo::unnamed(VehicleId::new("42"));
        assert_eq!(info.name, "Vehicle 42");
        assert_eq!(info.model_description(), None);

        info.year = Some("2019".into());
        info.make = Some("Ford".into());
        info.model = Some("F-150".into());
        assert_eq!(info.model_description().as_deref(), Some("2019 Ford F-150"));
    }

    #[test]
    fn test_invalid_snapshot_has_no_timestamp() {
        let snapshot = VehicleSnapshot::invalid(VehicleId::new("1"));
        assert!(!snapshot.valid);
        assert!(snapshot.last_updated.is_none());
        assert!(snapshot.age(Utc::now()).is_none());
    }

    #[test]
    fn test_coordinates_require_both_axes() {
        let mut status = VehicleStatus {
            latitude: Some(45.5),
            ..Default::default()
        };
        assert_eq!(status.coordinates(), None);

        status.longitude = Some(-73.6);
        assert_eq!(status.coordinates(), Some((45.5, -73.6)));
    }

    #[test]
    fn test_vehicle_id_serializes_as_plain_string() {
        let id = VehicleId::new("123456");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"123456\"");
    }
}
