//! Service records and the payloads that create or modify them

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{AppError, Result};

/// Liveness status of a registered service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Healthy,
    Degraded,
    Offline,
    Unknown,
}

impl ServiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceStatus::Healthy => "healthy",
            ServiceStatus::Degraded => "degraded",
            ServiceStatus::Offline => "offline",
            ServiceStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "healthy" => Ok(Self::Healthy),
            "degraded" => Ok(Self::Degraded),
            "offline" => Ok(Self::Offline),
            "unknown" => Ok(Self::Unknown),
            other => Err(AppError::Validation(format!(
                "Unknown status '{}'. Must be one of: healthy, degraded, offline, unknown",
                other
            ))),
        }
    }
}

/// Stored state for one named backend instance
#[derive(Debug, Clone, Serialize)]
pub struct ServiceRecord {
    pub name: String,
    pub version: String,
    pub address: String,
    pub port: u16,
    pub health_endpoint: String,
    pub dependencies: Vec<String>,
    pub credentials_needed: Vec<String>,
    pub metadata: HashMap<String, Value>,
    pub status: ServiceStatus,
    pub registered_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
    pub heartbeat_count: u64,
    pub request_count: u64,
    pub error_count: u64,
    pub avg_response_time_ms: f64,
    /// Position in registration order
    #[serde(skip)]
    pub(crate) sequence: u64,
}

/// Short listing entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSummary {
    pub name: String,
    pub version: String,
    pub status: ServiceStatus,
    pub address: String,
    pub port: u16,
    pub registered_at: DateTime<Utc>,
}

impl From<&ServiceRecord> for ServiceSummary {
    fn from(record: &ServiceRecord) -> Self {
        Self {
            name: record.name.clone(),
            version: record.version.clone(),
            status: record.status,
            address: record.address.clone(),
            port: record.port,
            registered_at: record.registered_at,
        }
    }
}

/// Registration payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceRegistration {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "default_address")]
    pub address: String,
    pub port: u16,
    #[serde(default = "default_health_endpoint")]
    pub health_endpoint: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub credentials_needed: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

fn default_address() -> String {
    "localhost".to_string()
}

fn default_health_endpoint() -> String {
    "/health".to_string()
}

impl ServiceRegistration {
    pub fn new(name: impl Into<String>, address: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            version: default_version(),
            address: address.into(),
            port,
            health_endpoint: default_health_endpoint(),
            dependencies: Vec::new(),
            credentials_needed: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_health_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.health_endpoint = endpoint.into();
        self
    }

    pub fn with_dependency(mut self, name: impl Into<String>) -> Self {
        self.dependencies.push(name.into());
        self
    }

    pub fn with_credential(mut self, name: impl Into<String>) -> Self {
        self.credentials_needed.push(name.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_name(&self.name)?;
        validate_version(&self.version)?;
        validate_address(&self.address)?;
        validate_port(self.port)?;
        validate_health_endpoint(&self.health_endpoint)?;

        if self.dependencies.iter().any(|d| d.trim().is_empty()) {
            return Err(AppError::Validation(
                "Dependency names cannot be empty".to_string(),
            ));
        }
        if self.credentials_needed.iter().any(|c| c.trim().is_empty()) {
            return Err(AppError::Validation(
                "Credential names cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

/// Administrative patch for an existing record
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceUpdate {
    pub version: Option<String>,
    pub address: Option<String>,
    pub port: Option<u16>,
    pub health_endpoint: Option<String>,
    /// Replaces the stored metadata when present
    pub metadata: Option<HashMap<String, Value>>,
}

impl ServiceUpdate {
    pub fn validate(&self) -> Result<()> {
        if let Some(version) = &self.version {
            validate_version(version)?;
        }
        if let Some(address) = &self.address {
            validate_address(address)?;
        }
        if let Some(port) = self.port {
            validate_port(port)?;
        }
        if let Some(endpoint) = &self.health_endpoint {
            validate_health_endpoint(endpoint)?;
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.version.is_none()
            && self.address.is_none()
            && self.port.is_none()
            && self.health_endpoint.is_none()
            && self.metadata.is_none()
    }
}

/// Heartbeat and stats latencies must be usable in the running average
pub fn validate_response_time(response_time_ms: f64) -> Result<()> {
    if !response_time_ms.is_finite() || response_time_ms < 0.0 {
        return Err(AppError::Validation(format!(
            "Response time must be a non-negative number, got {}",
            response_time_ms
        )));
    }
    Ok(())
}

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() || name.len() > 255 {
        return Err(AppError::Validation(
            "Service name must be between 1 and 255 characters".to_string(),
        ));
    }
    if name.contains('/') {
        return Err(AppError::Validation(format!(
            "Service name '{}' cannot contain '/'",
            name
        )));
    }
    Ok(())
}

fn validate_version(version: &str) -> Result<()> {
    if version.trim().is_empty() {
        return Err(AppError::Validation("Version cannot be empty".to_string()));
    }
    Ok(())
}

fn validate_address(address: &str) -> Result<()> {
    if address.trim().is_empty() {
        return Err(AppError::Validation("Address cannot be empty".to_string()));
    }
    Ok(())
}

fn validate_port(port: u16) -> Result<()> {
    if port < 1024 {
        return Err(AppError::Validation(format!(
            "Port {} is outside the allowed range 1024-65535",
            port
        )));
    }
    Ok(())
}

fn validate_health_endpoint(endpoint: &str) -> Result<()> {
    if !endpoint.starts_with('/') {
        return Err(AppError::Validation(format!(
            "Health endpoint '{}' must start with '/'",
            endpoint
        )));
    }
    Ok(())
}
