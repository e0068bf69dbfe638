//! The bridge's configuration schema

use crate::error::{ConfigError, ConfigResult};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use viper_coordinator::CoordinatorConfig;
use viper_core::VehicleId;

/// Upper bound for `refresh_interval`, one day
pub const MAX_REFRESH_INTERVAL: u64 = 86_400;

pub const DEFAULT_REQUEST_TIMEOUT: u64 = 30;

pub const DEFAULT_ACTION_REFRESH_DELAY: u64 = 10;

/// Validated bridge configuration
///
/// Durations are whole seconds. A `refresh_interval` of 0 disables scheduled
/// refreshes.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ViperConfig {
    pub username: String,
    pub password: String,
    #[serde(deserialize_with = "vehicle_ids")]
    pub vehicles: Vec<VehicleId>,
    #[serde(default, deserialize_with = "seconds")]
    pub refresh_interval: u64,
    #[serde(default = "default_request_timeout", deserialize_with = "seconds")]
    pub request_timeout: u64,
    #[serde(default = "default_action_refresh_delay", deserialize_with = "seconds")]
    pub action_refresh_delay: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl ViperConfig {
    /// Deserialize from an already tag-resolved YAML value
    pub fn from_value(value: serde_yaml::Value, source: &Path) -> ConfigResult<Self> {
        serde_yaml::from_value(value).map_err(|source_err| ConfigError::ParseYaml {
            path: source.to_path_buf(),
            source: source_err,
        })
    }

    /// Check ranges and required values
    pub fn validate(&self) -> ConfigResult<()> {
        if self.username.trim().is_empty() {
            return Err(ConfigError::invalid("username", "must not be empty"));
        }
        if self.password.is_empty() {
            return Err(ConfigError::invalid("password", "must not be empty"));
        }
        if self.vehicles.is_empty() {
            return Err(ConfigError::ValidationFailed {
                message: "at least one vehicle id is required".into(),
            });
        }
        if self.vehicles.iter().any(|v| v.as_str().is_empty()) {
            return Err(ConfigError::invalid("vehicles", "vehicle ids must not be empty"));
        }
        if self.refresh_interval > MAX_REFRESH_INTERVAL {
            return Err(ConfigError::invalid(
                "refresh_interval",
                format!("must be between 0 and {MAX_REFRESH_INTERVAL} seconds"),
            ));
        }
        if self.request_timeout == 0 {
            return Err(ConfigError::invalid("request_timeout", "must be greater than 0"));
        }
        if let Some(url) = &self.base_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::invalid("base_url", "must be an http(s) URL"));
            }
        }
        Ok(())
    }

    /// Coordinator tuning for this configuration
    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            refresh_interval: Duration::from_secs(self.refresh_interval),
            request_timeout: Duration::from_secs(self.request_timeout),
            action_refresh_delay: Duration::from_secs(self.action_refresh_delay),
            ..Default::default()
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }
}

impl fmt::Debug for ViperConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViperConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("vehicles", &self.vehicles)
            .field("refresh_interval", &self.refresh_interval)
            .field("request_timeout", &self.request_timeout)
            .field("action_refresh_delay", &self.action_refresh_delay)
            .field("base_url", &self.base_url)
            .finish()
    }
}

fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT
}

fn default_action_refresh_delay() -> u64 {
    DEFAULT_ACTION_REFRESH_DELAY
}

/// Scalars arrive as numbers, or as strings after `!secret`/`!env_var` substitution
#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Number(u64),
    Text(String),
}

fn vehicle_ids<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<VehicleId>, D::Error> {
    let raw = Vec::<Scalar>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|id| match id {
            Scalar::Number(n) => VehicleId::new(n.to_string()),
            Scalar::Text(s) => VehicleId::new(s.trim()),
        })
        .collect())
}

fn seconds<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    match Scalar::deserialize(deserializer)? {
        Scalar::Number(n) => Ok(n),
        Scalar::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("expected whole seconds, got '{s}'"))),
    }
}
