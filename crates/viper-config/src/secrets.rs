//! `secrets.yaml` lookup for `!secret` tags

use crate::error::{ConfigError, ConfigResult};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Flat key/value secrets, all values rendered as strings
#[derive(Debug, Clone)]
pub struct Secrets {
    values: HashMap<String, String>,
    path: PathBuf,
}

impl Secrets {
    /// Load `secrets.yaml` from `dir`; a missing file yields an empty store
    pub fn load(dir: &Path) -> ConfigResult<Self> {
        let path = dir.join("secrets.yaml");
        if !path.exists() {
            debug!(path = %path.display(), "No secrets file");
            return Ok(Self {
                values: HashMap::new(),
                path,
            });
        }

        let content = fs::read_to_string(&path).map_err(|source| ConfigError::ReadFile {
            path: path.clone(),
            source,
        })?;

        let raw: HashMap<String, serde_yaml::Value> =
            serde_yaml::from_str(&content).map_err(|source| ConfigError::ParseYaml {
                path: path.clone(),
                source,
            })?;

        let values: HashMap<String, String> = raw
            .into_iter()
            .filter_map(|(key, value)| scalar_to_string(value).map(|v| (key, v)))
            .collect();

        debug!(path = %path.display(), count = values.len(), "Loaded secrets");
        Ok(Self { values, path })
    }

    pub fn get(&self, key: &str) -> ConfigResult<&str> {
        self.values
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| ConfigError::SecretNotFound {
                key: key.to_string(),
            })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Default for Secrets {
    fn default() -> Self {
        Self {
            values: HashMap::new(),
            path: PathBuf::from("secrets.yaml"),
        }
    }
}

/// Secrets are substituted as strings; nested values are skipped
fn scalar_to_string(value: serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        serde_yaml::Value::Null => Some(String::new()),
        _ => None,
    }
}
