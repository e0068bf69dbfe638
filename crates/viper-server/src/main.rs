//! Viper SmartStart bridge
//!
//! Loads the configuration, logs in, exposes each vehicle as entities and
//! keeps them fresh until interrupted. On SIGHUP the configuration is read
//! again and changed credentials are applied without a restart.

use anyhow::{Context as _, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use viper_api::{SharedVehicleApi, ViperClient};
use viper_config::ViperConfig;
use viper_coordinator::Coordinator;
use viper_core::{services, Context, DOMAIN};
use viper_entities::{EntityPlatform, EntityStateStore};
use viper_service_registry::{register_vehicle_services, ServiceRegistry, SharedServiceRegistry};

const CONFIG_ENV: &str = "VIPER_CONFIG";
const DEFAULT_CONFIG: &str = "viper.yaml";

/// The running bridge
pub struct Bridge {
    pub coordinator: Coordinator,
    pub entities: EntityPlatform,
    pub services: SharedServiceRegistry,
    config: ViperConfig,
}

impl Bridge {
    /// Build the client, coordinator, entities and services for a configuration
    pub async fn start(config: &ViperConfig) -> Result<Self> {
        let mut builder = ViperClient::builder(&config.username, &config.password)
            .timeout(config.request_timeout());
        if let Some(base_url) = &config.base_url {
            builder = builder.base_url(base_url);
        }
        let api: SharedVehicleApi = Arc::new(builder.build()?);

        let coordinator = Coordinator::new(api, config.vehicles.clone(), config.coordinator_config());
        if let Err(e) = coordinator.setup().await {
            // Entities still come up, unavailable, so the failure is visible
            error!(error = %e, "Viper login failed");
        }

        let entities = EntityPlatform::setup(coordinator.clone(), Arc::new(EntityStateStore::new()))?;

        let services = Arc::new(ServiceRegistry::new());
        register_vehicle_services(&services, coordinator.clone());

        Ok(Self {
            coordinator,
            entities,
            services,
            config: config.clone(),
        })
    }

    /// Apply a re-read configuration
    ///
    /// New credentials, or rejected old ones, trigger reauthentication; returns
    /// whether it ran. Other settings only take effect after a restart.
    pub async fn reload(&mut self, config: &ViperConfig) -> Result<bool> {
        let credentials_changed =
            config.username != self.config.username || config.password != self.config.password;

        let restart_needed = ViperConfig {
            username: self.config.username.clone(),
            password: self.config.password.clone(),
            ..config.clone()
        } != self.config;
        if restart_needed {
            warn!("Only credential changes apply on reload, restart to apply the rest");
        }

        if !credentials_changed && !self.coordinator.is_auth_failed() {
            return Ok(false);
        }

        self.config.username = config.username.clone();
        self.config.password = config.password.clone();
        self.coordinator
            .reauthenticate(&config.username, &config.password)
            .await?;
        info!("Credentials reloaded");
        Ok(true)
    }

    pub fn stop(self) {
        self.entities.unload();
        self.services.unregister_domain(DOMAIN);
        self.coordinator.unload();
    }
}

/// SIGHUP on unix; never fires elsewhere
struct ReloadSignal {
    #[cfg(unix)]
    hangup: tokio::signal::unix::Signal,
}

impl ReloadSignal {
    fn new() -> Result<Self> {
        Ok(Self {
            #[cfg(unix)]
            hangup: tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup())?,
        })
    }

    async fn recv(&mut self) {
        #[cfg(unix)]
        if self.hangup.recv().await.is_some() {
            return;
        }
        std::future::pending::<()>().await
    }
}

fn config_path() -> PathBuf {
    std::env::args()
        .nth(1)
        .or_else(|| std::env::var(CONFIG_ENV).ok())
        .unwrap_or_else(|| DEFAULT_CONFIG.to_string())
        .into()
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .init();

    info!("Starting Viper SmartStart bridge");

    let path = config_path();
    let config = viper_config::load_config(&path)
        .with_context(|| format!("loading {}", path.display()))?;

    let mut bridge = Bridge::start(&config).await?;
    info!(
        vehicles = bridge.coordinator.vehicle_ids().len(),
        entities = bridge.entities.entity_ids().len(),
        "Bridge initialized"
    );

    if !bridge.coordinator.is_auth_failed() {
        let response = bridge
            .services
            .call(DOMAIN, services::REFRESH, serde_json::Value::Null, Context::new())
            .await;
        match response {
            Ok(Some(results)) => info!(%results, "Initial refresh"),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Initial refresh failed"),
        }
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = bridge.coordinator.spawn_scheduler(shutdown_rx);

    info!("Bridge is running");

    let mut reload = ReloadSignal::new()?;
    loop {
        tokio::select! {
            interrupted = tokio::signal::ctrl_c() => {
                interrupted?;
                break;
            }
            _ = reload.recv() => {
                info!(path = %path.display(), "Reloading configuration");
                match viper_config::load_config(&path) {
                    Ok(config) => {
                        if let Err(e) = bridge.reload(&config).await {
                            error!(error = %e, "Reauthentication failed");
                        }
                    }
                    Err(e) => error!(error = %e, "Configuration reload failed, keeping current settings"),
                }
            }
        }
    }

    info!("Shutting down...");

    shutdown_tx.send(true)?;
    if let Some(handle) = scheduler {
        if let Err(e) = handle.await {
            warn!(error = %e, "Scheduler task ended abnormally");
        }
    }
    bridge.stop();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bridge_starts_with_unreachable_service() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("viper.yaml");
        std::fs::write(
            &path,
            "username: user@example.com\npassword: hunter2\nvehicles: [1]\nrequest_timeout: 2\nbase_url: http://127.0.0.1:1\n",
        )
        .unwrap();
        let config = viper_config::load_config(&path).unwrap();

        let bridge = Bridge::start(&config).await.unwrap();

        assert!(!bridge.coordinator.is_auth_failed());
        assert!(bridge.services.has_service(DOMAIN, services::REFRESH));
        let states = bridge.entities.states();
        assert_eq!(states.len(), 11);
        assert!(states
            .iter()
            .filter(|s| s.entity_id.domain() != "button")
            .all(|s| s.is_unavailable()));

        bridge.stop();
    }

    #[tokio::test]
    async fn test_reload_applies_only_changed_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("viper.yaml");
        std::fs::write(
            &path,
            "username: user@example.com\npassword: hunter2\nvehicles: [1]\nrequest_timeout: 2\nbase_url: http://127.0.0.1:1\n",
        )
        .unwrap();
        let config = viper_config::load_config(&path).unwrap();
        let mut bridge = Bridge::start(&config).await.unwrap();

        assert!(!bridge.reload(&config).await.unwrap());

        let changed = ViperConfig {
            password: "correct horse".into(),
            ..config.clone()
        };
        // The service is unreachable, so the attempt itself fails
        assert!(bridge.reload(&changed).await.is_err());
        assert_eq!(bridge.config.password, "correct horse");
        assert!(!bridge.coordinator.is_auth_failed());

        bridge.stop();
    }
}
