//! The entity trait and the identity shared by every adapter

use serde_json::json;
use std::collections::HashMap;
use thiserror::Error;
use viper_coordinator::{CommandError, RefreshError};
use viper_core::{
    EntityId, EntityIdError, VehicleId, VehicleInfo, VehicleSnapshot, STATE_UNAVAILABLE,
    STATE_UNKNOWN,
};

/// Entity attributes as handed to the host
pub type Attributes = HashMap<String, serde_json::Value>;

#[derive(Debug, Error)]
pub enum EntityError {
    /// The action was refused locally; nothing was sent
    #[error("{entity_id}: {reason}")]
    Refused {
        entity_id: EntityId,
        reason: &'static str,
    },

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Refresh(#[from] RefreshError),

    #[error("entity not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    InvalidId(#[from] EntityIdError),
}

/// Identity and static presentation of one entity
#[derive(Debug, Clone, PartialEq)]
pub struct EntityBase {
    pub entity_id: EntityId,
    /// Stable across renames: `{vehicle_id}_{key}`
    pub unique_id: String,
    pub vehicle_id: VehicleId,
    /// Friendly name, e.g. "Civic Battery Voltage"
    pub name: String,
    pub icon: Option<&'static str>,
    pub device_class: Option<&'static str>,
}

impl EntityBase {
    /// Build the identity of `key` on a vehicle shown as `device_name`
    pub fn new(
        domain: &str,
        vehicle: &VehicleInfo,
        device_name: &str,
        key: &str,
        name: &str,
    ) -> Result<Self, EntityIdError> {
        Ok(Self {
            entity_id: EntityId::for_device(domain, device_name, key)?,
            unique_id: format!("{}_{}", vehicle.id, key),
            vehicle_id: vehicle.id.clone(),
            name: format!("{} {}", device_name, name),
            icon: None,
            device_class: None,
        })
    }

    pub fn with_icon(mut self, icon: &'static str) -> Self {
        self.icon = Some(icon);
        self
    }

    pub fn with_device_class(mut self, device_class: &'static str) -> Self {
        self.device_class = Some(device_class);
        self
    }

    /// Attributes that do not depend on the snapshot
    pub fn static_attributes(&self) -> Attributes {
        let mut attributes = Attributes::new();
        attributes.insert("friendly_name".into(), json!(self.name));
        if let Some(icon) = self.icon {
            attributes.insert("icon".into(), json!(icon));
        }
        if let Some(device_class) = self.device_class {
            attributes.insert("device_class".into(), json!(device_class));
        }
        attributes
    }
}

/// A view of one aspect of a vehicle's snapshot
pub trait VehicleEntity: Send + Sync {
    fn base(&self) -> &EntityBase;

    /// State value for a valid snapshot; None renders as `unknown`
    fn native_state(&self, snapshot: &VehicleSnapshot) -> Option<String>;

    /// Extra attributes for a valid snapshot
    fn attributes(&self, _snapshot: &VehicleSnapshot) -> Attributes {
        Attributes::new()
    }

    fn entity_id(&self) -> &EntityId {
        &self.base().entity_id
    }

    /// Render the state value and attributes for `snapshot`
    fn render(&self, snapshot: &VehicleSnapshot) -> (String, Attributes) {
        let mut attributes = self.base().static_attributes();
        if !snapshot.valid {
            return (STATE_UNAVAILABLE.to_string(), attributes);
        }

        attributes.extend(self.attributes(snapshot));
        if let Some(at) = snapshot.last_updated {
            attributes.insert("last_updated".into(), json!(at.to_rfc3339()));
        }

        let state = self
            .native_state(snapshot)
            .unwrap_or_else(|| STATE_UNKNOWN.to_string());
        (state, attributes)
    }
}

/// `on`/`off` for a reported flag
pub(crate) fn on_off(value: Option<bool>) -> Option<String> {
    value.map(|on| if on { "on" } else { "off" }.to_string())
}
