//! API Coordinator
//!
//! A service registry with heartbeat-driven health tracking, discovery
//! queries and a gateway that proxies requests to healthy services.

pub mod api;
pub mod backend;
pub mod config;
pub mod credentials;
pub mod error;
pub mod gateway;
pub mod middleware;
pub mod registry;

pub use error::{AppError, Result};

use std::sync::Arc;
use tokio::sync::RwLock;

use backend::Upstream;
use credentials::CredentialStore;
use gateway::{DispatchConfig, Dispatcher, HealthMonitor, MonitorConfig};
use registry::ServiceRegistry;

/// Application state shared across all handlers
pub struct AppState {
    pub settings: Arc<RwLock<config::Settings>>,
    pub registry: Arc<ServiceRegistry>,
    pub health_monitor: Arc<HealthMonitor>,
    pub dispatcher: Arc<Dispatcher>,
    pub credentials: Arc<CredentialStore>,
}

impl AppState {
    /// Wire up the registry, monitor, dispatcher and credential store from settings
    pub fn new(settings: config::Settings, upstream: Arc<dyn Upstream>) -> Self {
        let registry = Arc::new(ServiceRegistry::new());
        let health_monitor = Arc::new(HealthMonitor::new(
            registry.clone(),
            MonitorConfig::from(&settings.registry),
        ));
        let dispatcher = Arc::new(Dispatcher::new(
            registry.clone(),
            upstream,
            DispatchConfig::from(&settings.gateway),
        ));
        let credentials = Arc::new(
            CredentialStore::new(settings.credentials.encryption_key.as_deref())
                .with_audit_capacity(settings.credentials.audit_capacity),
        );

        Self {
            settings: Arc::new(RwLock::new(settings)),
            registry,
            health_monitor,
            dispatcher,
            credentials,
        }
    }
}
