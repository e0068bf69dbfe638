//! Service registry with async handlers
//!
//! Services are how a host asks the bridge to do something outside the normal
//! entity surface. The bridge registers `viper_smartstart.refresh`, see
//! [`register_vehicle_services`].

mod vehicle_services;

pub use vehicle_services::register_vehicle_services;

use dashmap::DashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, instrument, warn};
use viper_core::{Context, ServiceCall};

pub type ServiceResult = Result<Option<serde_json::Value>, ServiceError>;

type ServiceFuture = Pin<Box<dyn Future<Output = ServiceResult> + Send>>;
type ServiceHandler = Arc<dyn Fn(ServiceCall) -> ServiceFuture + Send + Sync>;

#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    #[error("service not found: {domain}.{service}")]
    NotFound { domain: String, service: String },

    #[error("invalid service data: {0}")]
    InvalidData(String),
}

/// Handlers keyed by `(domain, service)`
#[derive(Default)]
pub struct ServiceRegistry {
    handlers: DashMap<(String, String), ServiceHandler>,
}

/// Shared service registry handle
pub type SharedServiceRegistry = Arc<ServiceRegistry>;

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service, replacing any previous handler under the same name
    pub fn register<F, Fut>(&self, domain: &str, service: &str, handler: F)
    where
        F: Fn(ServiceCall) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ServiceResult> + Send + 'static,
    {
        debug!(domain, service, "Registering service");
        let handler: ServiceHandler =
            Arc::new(move |call| Box::pin(handler(call)) as ServiceFuture);
        self.handlers
            .insert((domain.to_string(), service.to_string()), handler);
    }

    /// Call a service and return its response, if it produced one
    #[instrument(skip(self, service_data, context))]
    pub async fn call(
        &self,
        domain: &str,
        service: &str,
        service_data: serde_json::Value,
        context: Context,
    ) -> ServiceResult {
        let key = (domain.to_string(), service.to_string());
        let Some(handler) = self.handlers.get(&key).map(|h| h.clone()) else {
            warn!("Service not found");
            return Err(ServiceError::NotFound {
                domain: key.0,
                service: key.1,
            });
        };

        debug!("Calling service");
        handler(ServiceCall::new(domain, service, service_data, context)).await
    }

    pub fn has_service(&self, domain: &str, service: &str) -> bool {
        self.handlers
            .contains_key(&(domain.to_string(), service.to_string()))
    }

    /// Remove every service of a domain, returning how many were removed
    pub fn unregister_domain(&self, domain: &str) -> usize {
        let before = self.handlers.len();
        self.handlers.retain(|(d, _), _| d != domain);
        let count = before - self.handlers.len();
        debug!(domain, count, "Unregistered domain services");
        count
    }
}
