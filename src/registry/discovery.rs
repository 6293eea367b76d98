//! Read-only discovery queries used for routing decisions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::store::ServiceRegistry;
use super::types::{ServiceRecord, ServiceStatus};

/// Where and how loaded a service currently is
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredService {
    pub name: String,
    pub address: String,
    pub port: u16,
    pub status: ServiceStatus,
    pub version: String,
    pub load_percentage: f64,
    pub estimated_response_time_ms: f64,
}

/// Routing target for a healthy service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthyInstance {
    pub name: String,
    pub address: String,
    pub port: u16,
    pub version: String,
}

/// Heartbeat and traffic diagnostics for one service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceDiagnostics {
    pub name: String,
    pub status: ServiceStatus,
    pub last_heartbeat: DateTime<Utc>,
    pub time_since_heartbeat_seconds: f64,
    pub heartbeat_count: u64,
    pub request_count: u64,
    pub error_count: u64,
    pub error_rate: f64,
    pub avg_response_time_ms: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingInfo {
    pub service_name: String,
    pub url: String,
    pub status: ServiceStatus,
    pub load_percentage: f64,
    pub response_time_ms: f64,
    pub error_rate: f64,
    pub recommended: bool,
}

/// Number of services per status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub healthy: usize,
    pub degraded: usize,
    pub offline: usize,
    pub unknown: usize,
    pub total: usize,
}

/// Traffic aggregated over every registered service
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TrafficTotals {
    pub total_requests: u64,
    pub total_errors: u64,
    pub error_rate: f64,
    pub average_response_time_ms: f64,
}

/// Saturating linear load estimate: one percent per request served, capped at 100.
pub fn load_percentage(request_count: u64) -> f64 {
    request_count.min(100) as f64
}

/// Errors per request, with the denominator floored at one
pub fn error_rate(error_count: u64, request_count: u64) -> f64 {
    error_count as f64 / request_count.max(1) as f64
}

fn base_url(record: &ServiceRecord) -> String {
    format!("http://{}:{}", record.address, record.port)
}

impl ServiceRegistry {
    /// Locate a service by name
    pub fn discover(&self, name: &str) -> Option<DiscoveredService> {
        let Some(record) = self.get(name) else {
            warn!(service = %name, "Service discovery failed: not registered");
            return None;
        };

        Some(DiscoveredService {
            load_percentage: load_percentage(record.request_count),
            estimated_response_time_ms: record.avg_response_time_ms,
            name: record.name,
            address: record.address,
            port: record.port,
            status: record.status,
            version: record.version,
        })
    }

    /// Every service currently marked healthy, in registration order
    pub fn discover_all_healthy(&self) -> Vec<HealthyInstance> {
        self.records()
            .into_iter()
            .filter(|r| r.status == ServiceStatus::Healthy)
            .map(|r| HealthyInstance {
                name: r.name,
                address: r.address,
                port: r.port,
                version: r.version,
            })
            .collect()
    }

    /// Diagnostics for a single service
    pub fn get_status(&self, name: &str) -> Option<ServiceDiagnostics> {
        self.get(name).map(|r| diagnostics(&r, Utc::now()))
    }

    /// Diagnostics for every service in registration order
    pub fn all_statuses(&self) -> Vec<ServiceDiagnostics> {
        let now = Utc::now();
        self.records().iter().map(|r| diagnostics(r, now)).collect()
    }

    /// Base URL of a service, e.g. `http://10.0.0.5:9001`
    pub fn service_url(&self, name: &str) -> Option<String> {
        self.get(name).map(|r| base_url(&r))
    }

    pub fn routing_info(&self, name: &str) -> Option<RoutingInfo> {
        let record = self.get(name)?;

        Some(RoutingInfo {
            service_name: record.name.clone(),
            url: base_url(&record),
            status: record.status,
            load_percentage: load_percentage(record.request_count),
            response_time_ms: record.avg_response_time_ms,
            error_rate: error_rate(record.error_count, record.request_count),
            recommended: record.status == ServiceStatus::Healthy,
        })
    }

    pub fn status_counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for record in self.records() {
            match record.status {
                ServiceStatus::Healthy => counts.healthy += 1,
                ServiceStatus::Degraded => counts.degraded += 1,
                ServiceStatus::Offline => counts.offline += 1,
                ServiceStatus::Unknown => counts.unknown += 1,
            }
            counts.total += 1;
        }
        counts
    }

    pub fn traffic_totals(&self) -> TrafficTotals {
        let records = self.records();
        let total_requests: u64 = records.iter().map(|r| r.request_count).sum();
        let total_errors: u64 = records.iter().map(|r| r.error_count).sum();
        let average_response_time_ms = if records.is_empty() {
            0.0
        } else {
            records.iter().map(|r| r.avg_response_time_ms).sum::<f64>() / records.len() as f64
        };

        TrafficTotals {
            total_requests,
            total_errors,
            error_rate: error_rate(total_errors, total_requests),
            average_response_time_ms,
        }
    }
}

fn diagnostics(record: &ServiceRecord, now: DateTime<Utc>) -> ServiceDiagnostics {
    let silence = (now - record.last_heartbeat).num_milliseconds().max(0);

    ServiceDiagnostics {
        name: record.name.clone(),
        status: record.status,
        last_heartbeat: record.last_heartbeat,
        time_since_heartbeat_seconds: silence as f64 / 1000.0,
        heartbeat_count: record.heartbeat_count,
        request_count: record.request_count,
        error_count: record.error_count,
        error_rate: error_rate(record.error_count, record.request_count),
        avg_response_time_ms: record.avg_response_time_ms,
    }
}
