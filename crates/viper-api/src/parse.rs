//! Response parsing for the Viper cloud API
//!
//! The service wraps every payload in `{"results": {...}}`. Numbers arrive as
//! JSON numbers or numeric strings depending on the module firmware, and status
//! flags as booleans or 0/1, so parsing here is deliberately tolerant of value
//! types while strict about envelope shape.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::trace;
use viper_core::{VehicleId, VehicleInfo};

use crate::error::{ApiError, ApiResult};

/// Fields reported by a `read_active` call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActiveStatus {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub speed: Option<String>,
    pub heading: Option<i64>,
    pub battery_voltage: Option<f64>,
    pub doors_open: Option<bool>,
    pub ignition_on: Option<bool>,
    pub trunk_open: Option<bool>,
    pub hood_open: Option<bool>,
}

/// Fields reported by a `read_current` call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CurrentStatus {
    pub doors_locked: Option<bool>,
    pub remote_starter_active: Option<bool>,
    pub security_system_armed: Option<bool>,
    pub panic_on: Option<bool>,
    pub valet_on: Option<bool>,
}

/// Access token issued by the login endpoint
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct AuthToken {
    pub access_token: String,
    pub expiration: Option<i64>,
}

/// Parse a login response body
///
/// A body without `results.authToken.accessToken` is an authentication failure,
/// not a data error: the service answers 200 with an error payload for bad passwords.
pub(crate) fn parse_login(body: &Value) -> ApiResult<AuthToken> {
    let token = body
        .get("results")
        .and_then(|r| r.get("authToken"))
        .ok_or_else(|| ApiError::Auth("invalid authentication response".into()))?;

    let access_token = token
        .get("accessToken")
        .and_then(Value::as_str)
        .ok_or_else(|| ApiError::Auth("authentication response has no access token".into()))?
        .to_string();

    Ok(AuthToken {
        access_token,
        expiration: token.get("expiration").and_then(as_i64),
    })
}

/// Parse the device search response into vehicle descriptions
pub(crate) fn parse_devices(body: &Value) -> ApiResult<Vec<VehicleInfo>> {
    let devices = body
        .get("results")
        .ok_or_else(|| ApiError::Malformed("device list has no results".into()))?
        .get("devices")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let vehicles = devices
        .iter()
        .filter_map(|device| {
            let id = device.get("id").and_then(as_string)?;
            let name = device
                .get("name")
                .and_then(Value::as_str)
                .map(String::from)
                .unwrap_or_else(|| format!("Vehicle {}", id));

            Some(VehicleInfo {
                id: VehicleId::new(id),
                name,
                make: device.get("make").and_then(as_string),
                model: device.get("model").and_then(as_string),
                year: device.get("year").and_then(as_string),
            })
        })
        .collect();

    Ok(vehicles)
}

/// Parse a `read_active` command response
pub(crate) fn parse_active(body: &Value) -> ApiResult<ActiveStatus> {
    let device = device_object(body, "read_active")?;
    let flags = device.get("deviceStatus");
    trace!(?device, "Parsing active status");

    Ok(ActiveStatus {
        latitude: device.get("latitude").and_then(as_f64),
        longitude: device.get("longitude").and_then(as_f64),
        speed: device.get("speed").and_then(as_string),
        heading: device.get("heading").and_then(as_i64),
        battery_voltage: device.get("batteryVoltage").and_then(as_f64),
        doors_open: flag(flags, "doorsOpen"),
        ignition_on: flag(flags, "ignitionOn"),
        trunk_open: flag(flags, "trunkOpen"),
        hood_open: flag(flags, "hoodOpen"),
    })
}

/// Parse a `read_current` command response
pub(crate) fn parse_current(body: &Value) -> ApiResult<CurrentStatus> {
    let device = device_object(body, "read_current")?;
    let flags = device.get("deviceStatus");
    trace!(?device, "Parsing current status");

    Ok(CurrentStatus {
        doors_locked: flag(flags, "doorsLocked"),
        remote_starter_active: flag(flags, "remoteStarterActive"),
        security_system_armed: flag(flags, "securitySystemArmed"),
        panic_on: flag(flags, "panicOn"),
        valet_on: flag(flags, "valetOn"),
    })
}

/// A command response is accepted when it carries a `results` member
pub(crate) fn command_accepted(body: &Value) -> bool {
    body.get("results").is_some()
}

fn device_object<'a>(body: &'a Value, read: &str) -> ApiResult<&'a Value> {
    body.get("results")
        .and_then(|r| r.get("device"))
        .filter(|d| d.is_object())
        .ok_or_else(|| ApiError::Malformed(format!("{} response has no device", read)))
}

fn flag(flags: Option<&Value>, key: &str) -> Option<bool> {
    flags.and_then(|f| f.get(key)).and_then(truthy)
}

/// JSON truthiness; null means "not reported"
fn truthy(value: &Value) -> Option<bool> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(*b),
        Value::Number(n) => Some(n.as_f64().map(|f| f != 0.0).unwrap_or(true)),
        Value::String(s) => Some(!s.is_empty()),
        Value::Array(a) => Some(!a.is_empty()),
        Value::Object(o) => Some(!o.is_empty()),
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_login() {
        let body = json!({
            "results": {"authToken": {"accessToken": "abc", "expiration": 1700000000}}
        });
        let token = parse_login(&body).unwrap();
        assert_eq!(token.access_token, "abc");
        assert_eq!(token.expiration, Some(1700000000));

        let err = parse_login(&json!({"error": "bad password"})).unwrap_err();
        assert!(err.is_auth());
    }

    #[test]
    fn test_parse_devices_accepts_numeric_ids() {
        let body = json!({
            "results": {"devices": [
                {"id": 123456, "name": "Truck", "make": "Ford", "model": "F-150", "year": "2019"},
                {"id": "789"},
                {"name": "no id, skipped"}
            ]}
        });

        let vehicles = parse_devices(&body).unwrap();
        assert_eq!(vehicles.len(), 2);
        assert_eq!(vehicles[0].id.as_str(), "123456");
        assert_eq!(vehicles[0].name, "Truck");
        assert_eq!(vehicles[0].model_description().as_deref(), Some("2019 Ford F-150"));
        assert_eq!(vehicles[1].name, "Vehicle 789");
    }

    #[test]
    fn test_parse_active() {
        let body = json!({
            "results": {"device": {
                "latitude": "45.5017",
                "longitude": -73.5673,
                "speed": "0",
                "heading": 270,
                "batteryVoltage": 12.6,
                "deviceStatus": {"doorsOpen": 0, "ignitionOn": false, "trunkOpen": 1, "hoodOpen": null}
            }}
        });

        let status = parse_active(&body).unwrap();
        assert_eq!(status.latitude, Some(45.5017));
        assert_eq!(status.longitude, Some(-73.5673));
        assert_eq!(status.speed.as_deref(), Some("0"));
        assert_eq!(status.heading, Some(270));
        assert_eq!(status.battery_voltage, Some(12.6));
        assert_eq!(status.doors_open, Some(false));
        assert_eq!(status.ignition_on, Some(false));
        assert_eq!(status.trunk_open, Some(true));
        assert_eq!(status.hood_open, None);
    }

    #[test]
    fn test_parse_active_with_bad_coordinates() {
        let body = json!({"results": {"device": {"latitude": "n/a", "longitude": null}}});
        let status = parse_active(&body).unwrap();
        assert_eq!(status.latitude, None);
        assert_eq!(status.longitude, None);
        assert_eq!(status.ignition_on, None);
    }

    #[test]
    fn test_parse_current() {
        let body = json!({
            "results": {"device": {"deviceStatus": {
                "doorsLocked": true,
                "remoteStarterActive": 1,
                "securitySystemArmed": true,
                "panicOn": false
            }}}
        });

        let status = parse_current(&body).unwrap();
        assert_eq!(status.doors_locked, Some(true));
        assert_eq!(status.remote_starter_active, Some(true));
        assert_eq!(status.security_system_armed, Some(true));
        assert_eq!(status.panic_on, Some(false));
        assert_eq!(status.valet_on, None);
    }

    #[test]
    fn test_missing_device_is_malformed() {
        let err = parse_current(&json!({"results": {}})).unwrap_err();
        assert!(matches!(err, ApiError::Malformed(_)));

        let err = parse_active(&json!({"results": {"device": "oops"}})).unwrap_err();
        assert!(matches!(err, ApiError::Malformed(_)));
    }

    #[test]
    fn test_command_accepted() {
        assert!(command_accepted(&json!({"results": {}})));
        assert!(!command_accepted(&json!({"error": "queue full"})));
    }
}
