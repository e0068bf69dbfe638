//! YAML loading with `!secret` and `!env_var` substitution

use crate::error::{ConfigError, ConfigResult};
use crate::secrets::Secrets;
use crate::settings::ViperConfig;
use serde_yaml::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace};

/// Loads YAML documents and resolves custom tags against one config directory
pub struct YamlLoader {
    config_dir: PathBuf,
    secrets: Secrets,
}

impl YamlLoader {
    /// Create a loader, reading `secrets.yaml` from `config_dir` if present
    pub fn new(config_dir: impl Into<PathBuf>) -> ConfigResult<Self> {
        let config_dir = config_dir.into();
        let secrets = Secrets::load(&config_dir)?;
        Ok(Self {
            config_dir,
            secrets,
        })
    }

    pub fn with_secrets(config_dir: impl Into<PathBuf>, secrets: Secrets) -> Self {
        Self {
            config_dir: config_dir.into(),
            secrets,
        }
    }

    /// Read a file, relative paths resolved against the config directory
    pub fn load_file(&self, path: impl AsRef<Path>) -> ConfigResult<Value> {
        let path = self.resolve_path(path.as_ref());
        debug!(path = %path.display(), "Loading YAML file");

        let content = fs::read_to_string(&path).map_err(|source| ConfigError::ReadFile {
            path: path.clone(),
            source,
        })?;

        self.load_string(&content, &path)
    }

    pub fn load_string(&self, content: &str, source_path: &Path) -> ConfigResult<Value> {
        let value: Value = serde_yaml::from_str(content).map_err(|source| ConfigError::ParseYaml {
            path: source_path.to_path_buf(),
            source,
        })?;

        self.process_value(value)
    }

    fn process_value(&self, value: Value) -> ConfigResult<Value> {
        match value {
            Value::Tagged(tagged) => self.process_tagged(*tagged),
            Value::Mapping(map) => {
                let mut result = serde_yaml::Mapping::new();
                for (k, v) in map {
                    result.insert(self.process_value(k)?, self.process_value(v)?);
                }
                Ok(Value::Mapping(result))
            }
            Value::Sequence(seq) => seq
                .into_iter()
                .map(|v| self.process_value(v))
                .collect::<ConfigResult<Vec<_>>>()
                .map(Value::Sequence),
            _ => Ok(value),
        }
    }

    fn process_tagged(&self, tagged: serde_yaml::value::TaggedValue) -> ConfigResult<Value> {
        let tag = tagged.tag.to_string();
        trace!(tag = %tag, "Resolving tag");

        match tag.as_str() {
            "!secret" => {
                let key = tag_argument(&tag, tagged.value)?;
                let value = self.secrets.get(&key)?;
                debug!(key = %key, "Substituted secret");
                Ok(Value::String(value.to_string()))
            }
            "!env_var" => {
                let var = tag_argument(&tag, tagged.value)?;
                let value = std::env::var(&var)
                    .map_err(|_| ConfigError::EnvVarNotFound { var: var.clone() })?;
                debug!(var = %var, "Substituted environment variable");
                Ok(Value::String(value))
            }
            _ => Err(ConfigError::invalid(&tag, "unsupported YAML tag")),
        }
    }

    fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.config_dir.join(path)
        }
    }

    pub fn secrets(&self) -> &Secrets {
        &self.secrets
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }
}

fn tag_argument(tag: &str, value: Value) -> ConfigResult<String> {
    match value {
        Value::String(s) => Ok(s),
        _ => Err(ConfigError::invalid(tag, "argument must be a string")),
    }
}

/// Load a YAML file from `config_dir` with tag substitution
pub fn load_yaml(config_dir: impl Into<PathBuf>, file: impl AsRef<Path>) -> ConfigResult<Value> {
    YamlLoader::new(config_dir)?.load_file(file)
}

/// Load and validate the bridge configuration at `path`
///
/// Secrets are looked up in `secrets.yaml` in the same directory.
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<ViperConfig> {
    let path = path.as_ref();
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let value = YamlLoader::new(dir)?.load_file(path)?;
    let config = ViperConfig::from_value(value, path)?;
    config.validate()?;

    info!(
        path = %path.display(),
        vehicles = config.vehicles.len(),
        refresh_interval = config.refresh_interval,
        "Configuration loaded"
    );
    Ok(config)
}
