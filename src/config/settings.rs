//! Application settings and configuration management

use crate::error::{AppError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub credentials: CredentialsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Heartbeat and health monitor configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RegistryConfig {
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,
    #[serde(default = "default_heartbeat_timeout")]
    pub heartbeat_timeout_secs: u64,
    /// Pause after a failed monitor tick
    #[serde(default = "default_monitor_backoff")]
    pub monitor_backoff_secs: u64,
}

fn default_heartbeat_interval() -> u64 {
    30
}

fn default_heartbeat_timeout() -> u64 {
    90
}

fn default_monitor_backoff() -> u64 {
    5
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: default_heartbeat_interval(),
            heartbeat_timeout_secs: default_heartbeat_timeout(),
            monitor_backoff_secs: default_monitor_backoff(),
        }
    }
}

impl RegistryConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }

    pub fn monitor_backoff(&self) -> Duration {
        Duration::from_secs(self.monitor_backoff_secs)
    }
}

/// Outbound call deadlines used by the gateway
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayConfig {
    #[serde(default = "default_proxy_timeout")]
    pub proxy_timeout_ms: u64,
    #[serde(default = "default_proxy_guard")]
    pub proxy_guard_ms: u64,
    #[serde(default = "default_health_check_timeout")]
    pub health_check_timeout_ms: u64,
    #[serde(default = "default_health_check_guard")]
    pub health_check_guard_ms: u64,
}

fn default_proxy_timeout() -> u64 {
    30_000
}

fn default_proxy_guard() -> u64 {
    35_000
}

fn default_health_check_timeout() -> u64 {
    10_000
}

fn default_health_check_guard() -> u64 {
    12_000
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            proxy_timeout_ms: default_proxy_timeout(),
            proxy_guard_ms: default_proxy_guard(),
            health_check_timeout_ms: default_health_check_timeout(),
            health_check_guard_ms: default_health_check_guard(),
        }
    }
}

/// Credential store configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CredentialsConfig {
    /// Secret the encryption key is derived from. A random key is used when unset,
    /// which makes stored ciphertexts unreadable after a restart.
    #[serde(default)]
    pub encryption_key: Option<String>,
    /// Audit entries kept in memory before the oldest are dropped
    #[serde(default = "default_audit_capacity")]
    pub audit_capacity: usize,
}

fn default_audit_capacity() -> usize {
    crate::credentials::store::DEFAULT_AUDIT_CAPACITY
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            encryption_key: None,
            audit_capacity: default_audit_capacity(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Settings {
    /// Load settings from configuration files and environment variables
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/default.toml")
    }

    /// Load settings from a specific configuration file path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_str().ok_or_else(|| {
            AppError::Config(config::ConfigError::Message(
                "Configuration path is not valid UTF-8".to_string(),
            ))
        })?;

        let config = Config::builder()
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port() as i64)?
            .set_default("registry.heartbeat_interval_secs", default_heartbeat_interval() as i64)?
            .set_default("registry.heartbeat_timeout_secs", default_heartbeat_timeout() as i64)?
            // Load from configuration file
            .add_source(File::with_name(path).required(false))
            // Override with environment variables (prefixed with COORDINATOR__)
            .add_source(
                Environment::with_prefix("COORDINATOR")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        Ok(settings)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(invalid("Server port cannot be 0"));
        }

        let registry = &self.registry;
        if registry.heartbeat_interval_secs == 0 {
            return Err(invalid("Heartbeat interval must be at least one second"));
        }
        if registry.heartbeat_timeout_secs <= registry.heartbeat_interval_secs {
            return Err(invalid(format!(
                "Heartbeat timeout ({}s) must exceed the heartbeat interval ({}s)",
                registry.heartbeat_timeout_secs, registry.heartbeat_interval_secs
            )));
        }

        let gateway = &self.gateway;
        if gateway.proxy_timeout_ms == 0 || gateway.health_check_timeout_ms == 0 {
            return Err(invalid("Gateway timeouts cannot be 0"));
        }
        if gateway.proxy_guard_ms < gateway.proxy_timeout_ms {
            return Err(invalid(format!(
                "Proxy guard ({}ms) is shorter than the proxy timeout ({}ms)",
                gateway.proxy_guard_ms, gateway.proxy_timeout_ms
            )));
        }
        if gateway.health_check_guard_ms < gateway.health_check_timeout_ms {
            return Err(invalid(format!(
                "Health check guard ({}ms) is shorter than the health check timeout ({}ms)",
                gateway.health_check_guard_ms, gateway.health_check_timeout_ms
            )));
        }

        if self.credentials.audit_capacity == 0 {
            return Err(invalid("Credential audit capacity cannot be 0"));
        }

        if !["json", "pretty"].contains(&self.logging.format.as_str()) {
            return Err(invalid(format!(
                "Unknown log format '{}'. Must be 'json' or 'pretty'",
                self.logging.format
            )));
        }

        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> AppError {
    AppError::Config(config::ConfigError::Message(message.into()))
}
