//! In-memory registry store, the only owner of service records

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

use super::types::{
    ServiceRecord, ServiceRegistration, ServiceStatus, ServiceSummary, ServiceUpdate,
};

/// A status transition applied by a monitor pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub name: String,
    pub from: ServiceStatus,
    pub to: ServiceStatus,
}

/// Registry of named services.
///
/// Every mutation of a record happens while holding the write guard of the
/// map shard that contains it, so concurrent heartbeats, stats updates and
/// monitor passes never lose each other's writes. Reads hand out clones.
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    services: DashMap<String, ServiceRecord>,
    next_sequence: AtomicU64,
}

impl ServiceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service, overwriting any record already stored under its name.
    ///
    /// An overwritten record keeps its place in registration order.
    pub fn register(&self, registration: ServiceRegistration) -> ServiceRecord {
        let now = Utc::now();
        let fresh = ServiceRecord {
            name: registration.name.clone(),
            version: registration.version,
            address: registration.address,
            port: registration.port,
            health_endpoint: registration.health_endpoint,
            dependencies: registration.dependencies,
            credentials_needed: registration.credentials_needed,
            metadata: registration.metadata,
            status: ServiceStatus::Healthy,
            registered_at: now,
            last_heartbeat: now,
            heartbeat_count: 0,
            request_count: 0,
            error_count: 0,
            avg_response_time_ms: 0.0,
            sequence: 0,
        };

        let mut replaced = false;
        let record = self
            .services
            .entry(registration.name)
            .and_modify(|existing| {
                replaced = true;
                *existing = ServiceRecord {
                    sequence: existing.sequence,
                    ..fresh.clone()
                };
            })
            .or_insert_with(|| ServiceRecord {
                sequence: self.next_sequence.fetch_add(1, Ordering::Relaxed),
                ..fresh
            })
            .clone();

        if replaced {
            warn!(
                service = %record.name,
                version = %record.version,
                "Service re-registered, previous record overwritten"
            );
        }
        info!(
            service = %record.name,
            version = %record.version,
            address = %record.address,
            port = record.port,
            "Registered service"
        );

        record
    }

    /// Remove a service. Returns whether it existed.
    pub fn deregister(&self, name: &str) -> bool {
        let existed = self.services.remove(name).is_some();
        if existed {
            info!(service = %name, "Deregistered service");
        }
        existed
    }

    /// Record a heartbeat. Returns `false` for unknown services.
    pub fn heartbeat(&self, name: &str, response_time_ms: f64) -> bool {
        let Some(mut record) = self.services.get_mut(name) else {
            warn!(service = %name, "Heartbeat from unknown service");
            return false;
        };

        record.last_heartbeat = Utc::now();
        record.heartbeat_count += 1;
        let n = record.heartbeat_count as f64;
        record.avg_response_time_ms =
            (record.avg_response_time_ms * (n - 1.0) + response_time_ms) / n;
        record.status = ServiceStatus::Healthy;

        debug!(
            service = %name,
            heartbeat_count = record.heartbeat_count,
            avg_response_time_ms = record.avg_response_time_ms,
            "Heartbeat received"
        );
        true
    }

    /// Count a request outcome against a service.
    ///
    /// Leaves the running average and the status untouched.
    pub fn update_stats(&self, name: &str, success: bool, response_time_ms: f64) {
        let Some(mut record) = self.services.get_mut(name) else {
            return;
        };

        record.request_count += 1;
        if !success {
            record.error_count += 1;
        }

        debug!(
            service = %name,
            success = success,
            response_time_ms = response_time_ms,
            request_count = record.request_count,
            error_count = record.error_count,
            "Updated service stats"
        );
    }

    /// Apply an administrative patch. Returns the updated record, or `None` if unknown.
    pub fn update(&self, name: &str, update: ServiceUpdate) -> Option<ServiceRecord> {
        let mut record = self.services.get_mut(name)?;

        if let Some(version) = update.version {
            record.version = version;
        }
        if let Some(address) = update.address {
            record.address = address;
        }
        if let Some(port) = update.port {
            record.port = port;
        }
        if let Some(endpoint) = update.health_endpoint {
            record.health_endpoint = endpoint;
        }
        if let Some(metadata) = update.metadata {
            record.metadata = metadata;
        }

        info!(service = %name, "Updated service record");
        Some(record.clone())
    }

    /// Snapshot of a single record
    pub fn get(&self, name: &str) -> Option<ServiceRecord> {
        self.services.get(name).map(|r| r.clone())
    }

    /// Whether a record exists for `name`
    pub fn contains(&self, name: &str) -> bool {
        self.services.contains_key(name)
    }

    /// Snapshots of every record in registration order
    pub fn records(&self) -> Vec<ServiceRecord> {
        let mut records: Vec<ServiceRecord> =
            self.services.iter().map(|entry| entry.value().clone()).collect();
        records.sort_by_key(|r| r.sequence);
        records
    }

    /// Summaries of every record in registration order
    pub fn list(&self) -> Vec<ServiceSummary> {
        self.records().iter().map(ServiceSummary::from).collect()
    }

    /// Summaries of records currently in `status`
    pub fn list_by_status(&self, status: ServiceStatus) -> Vec<ServiceSummary> {
        self.list()
            .into_iter()
            .filter(|s| s.status == status)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Re-evaluate every record's status from its heartbeat silence.
    ///
    /// `decide` receives the time since the last heartbeat and the current
    /// status and returns the status to store, if any. Each record is decided
    /// and written under its own shard guard.
    pub fn apply_status_decay<F>(&self, now: DateTime<Utc>, mut decide: F) -> Vec<StatusChange>
    where
        F: FnMut(Duration, ServiceStatus) -> Option<ServiceStatus>,
    {
        let mut changes = Vec::new();

        for mut entry in self.services.iter_mut() {
            let elapsed = now - entry.last_heartbeat;
            let current = entry.status;

            if let Some(next) = decide(elapsed, current) {
                if next != current {
                    entry.status = next;
                    changes.push(StatusChange {
                        name: entry.key().clone(),
                        from: current,
                        to: next,
                    });
                }
            }
        }

        changes
    }

    #[cfg(test)]
    pub(crate) fn set_last_heartbeat(&self, name: &str, at: DateTime<Utc>) {
        if let Some(mut record) = self.services.get_mut(name) {
            record.last_heartbeat = at;
        }
    }
}
