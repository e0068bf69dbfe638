//! Service call type for invoking bridge services

use crate::Context;
use serde::{Deserialize, Serialize};

/// Represents a call to one of the bridge's services
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceCall {
    /// The domain the service belongs to (always `viper_smartstart` for this bridge)
    pub domain: String,

    /// The service name (e.g., "refresh")
    pub service: String,

    /// Data passed to the service
    pub service_data: serde_json::Value,

    /// Context tracking who initiated this call
    pub context: Context,
}

impl ServiceCall {
    /// Create a new service call
    pub fn new(
        domain: impl Into<String>,
        service: impl Into<String>,
        service_data: serde_json::Value,
        context: Context,
    ) -> Self {
        Self {
            domain: domain.into(),
            service: service.into(),
            service_data,
            context,
        }
    }

    /// Create a service call with empty service data
    pub fn simple(domain: impl Into<String>, service: impl Into<String>, context: Context) -> Self {
        Self::new(
            domain,
            service,
            serde_json::Value::Object(Default::default()),
            context,
        )
    }

    /// Get the full service identifier (domain.service)
    pub fn service_id(&self) -> String {
        format!("{}.{}", self.domain, self.service)
    }

    /// Get a value from service_data
    pub fn get<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.service_data
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}
