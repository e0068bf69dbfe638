//! Entity identifiers for vehicle entities
//!
//! An id is `domain.object_id`, e.g. `sensor.truck_battery_voltage`. Both
//! parts are lowercase ASCII letters, digits and underscores, and neither may
//! start or end with an underscore. The domain additionally may not contain a
//! double underscore.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Which half of an entity id failed validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdPart {
    Domain,
    ObjectId,
}

impl fmt::Display for IdPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IdPart::Domain => "domain",
            IdPart::ObjectId => "object_id",
        })
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EntityIdError {
    #[error("entity_id must contain exactly one '.' separator")]
    InvalidFormat,

    #[error("{0} cannot be empty")]
    Empty(IdPart),

    #[error("{part} {value:?} must be lowercase alphanumeric with underscores, not starting or ending with '_'")]
    InvalidChars { part: IdPart, value: String },
}

/// Identifier of an entity exposed for a vehicle
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityId {
    domain: String,
    object_id: String,
}

impl EntityId {
    pub fn new(
        domain: impl Into<String>,
        object_id: impl Into<String>,
    ) -> Result<Self, EntityIdError> {
        let domain = domain.into();
        let object_id = object_id.into();
        check(IdPart::Domain, &domain)?;
        check(IdPart::ObjectId, &object_id)?;
        Ok(Self { domain, object_id })
    }

    /// Build the entity id for one of a vehicle's entities
    ///
    /// The object id is slugged from the device name followed by the entity key,
    /// so "My Truck" + "battery_voltage" becomes `my_truck_battery_voltage`.
    pub fn for_device(
        domain: impl Into<String>,
        device_name: &str,
        key: &str,
    ) -> Result<Self, EntityIdError> {
        Self::new(domain, slugify(&format!("{device_name} {key}")))
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn object_id(&self) -> &str {
        &self.object_id
    }
}

/// Object-id form of free text: "Mom's F-150" becomes `mom_s_f_150`
///
/// Names that slug to the same string produce the same entity ids.
pub fn slugify(text: &str) -> String {
    slug::slugify(text).replace('-', "_")
}

fn check(part: IdPart, value: &str) -> Result<(), EntityIdError> {
    if value.is_empty() {
        return Err(EntityIdError::Empty(part));
    }

    let charset_ok = value
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    let edges_ok = !value.starts_with('_') && !value.ends_with('_');
    let doubled = part == IdPart::Domain && value.contains("__");

    if charset_ok && edges_ok && !doubled {
        Ok(())
    } else {
        Err(EntityIdError::InvalidChars {
            part,
            value: value.to_string(),
        })
    }
}

impl FromStr for EntityId {
    type Err = EntityIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('.') {
            Some((domain, object_id)) if !object_id.contains('.') => Self::new(domain, object_id),
            _ => Err(EntityIdError::InvalidFormat),
        }
    }
}

impl TryFrom<String> for EntityId {
    type Error = EntityIdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> String {
        id.to_string()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.domain, self.object_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_device_slugs_name_and_key() {
        let id = EntityId::for_device("sensor", "My Truck", "battery_voltage").unwrap();
        assert_eq!(id.to_string(), "sensor.my_truck_battery_voltage");
    }

    #[test]
    fn test_for_device_strips_punctuation() {
        let id = EntityId::for_device("binary_sensor", "Mom's F-150!", "hood_open").unwrap();
        assert_eq!(id.domain(), "binary_sensor");
        assert_eq!(id.object_id(), "mom_s_f_150_hood_open");
    }

    #[test]
    fn test_slugify_folds_case_and_separators() {
        assert_eq!(slugify("Truck"), slugify("truck"));
        assert_eq!(slugify("My Truck"), slugify("My-Truck"));
        assert_eq!(slugify("My Truck"), "my_truck");
    }

    #[test]
    fn test_parse_entity_id() {
        let id: EntityId = "switch.truck_remote_start".parse().unwrap();
        assert_eq!(id.domain(), "switch");
        assert_eq!(id.object_id(), "truck_remote_start");
    }

    #[test]
    fn test_invalid_entity_ids() {
        assert_eq!(
            "no_separator".parse::<EntityId>().unwrap_err(),
            EntityIdError::InvalidFormat
        );
        assert_eq!(
            "a.b.c".parse::<EntityId>().unwrap_err(),
            EntityIdError::InvalidFormat
        );
        assert_eq!(
            "domain.".parse::<EntityId>().unwrap_err(),
            EntityIdError::Empty(IdPart::ObjectId)
        );
        assert!(matches!(
            "sensor.Upper".parse::<EntityId>().unwrap_err(),
            EntityIdError::InvalidChars { part: IdPart::ObjectId, .. }
        ));
        assert!(matches!(
            "sensor._leading".parse::<EntityId>().unwrap_err(),
            EntityIdError::InvalidChars { part: IdPart::ObjectId, .. }
        ));
        assert!(matches!(
            "my__sensor.x".parse::<EntityId>().unwrap_err(),
            EntityIdError::InvalidChars { part: IdPart::Domain, .. }
        ));
    }

    #[test]
    fn test_object_id_may_contain_double_underscore() {
        assert!(EntityId::new("sensor", "truck__2").is_ok());
    }

    #[test]
    fn test_serde_as_string() {
        let id = EntityId::new("button", "truck_lock").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"button.truck_lock\"");

        let parsed: EntityId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
    }
}
