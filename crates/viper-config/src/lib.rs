//! Configuration for the Viper SmartStart bridge
//!
//! The bridge reads one YAML file. Two custom tags are resolved while loading:
//!
//! - `!secret key` - substitute a value from `secrets.yaml` next to the file
//! - `!env_var VAR` - substitute an environment variable
//!
//! # Example
//!
//! ```ignore
//! use viper_config::load_config;
//!
//! let config = load_config("/etc/viper/viper.yaml")?;
//! let coordinator_config = config.coordinator_config();
//! ```

mod error;
mod loader;
mod secrets;
mod settings;

pub use error::{ConfigError, ConfigResult};
pub use loader::{load_config, load_yaml, YamlLoader};
pub use secrets::Secrets;
pub use settings::{
    ViperConfig, DEFAULT_ACTION_REFRESH_DELAY, DEFAULT_REQUEST_TIMEOUT, MAX_REFRESH_INTERVAL,
};

pub use serde_yaml::Value;
