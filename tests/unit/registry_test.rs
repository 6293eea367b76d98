//! Unit tests for the service registry, discovery queries and heartbeat decay

use api_coordinator::gateway::{HealthMonitor, MonitorConfig};
use api_coordinator::registry::{ServiceRegistration, ServiceRegistry, ServiceStatus, ServiceUpdate};
use chrono::{Duration, Utc};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

fn billing() -> ServiceRegistration {
    ServiceRegistration::new("billing", "10.0.0.5", 9001).with_version("1.0.0")
}

fn monitor(registry: &Arc<ServiceRegistry>) -> HealthMonitor {
    HealthMonitor::new(registry.clone(), MonitorConfig::default())
}

#[test]
fn test_registered_service_is_discoverable_and_healthy() {
    let registry = ServiceRegistry::new();
    registry.register(billing());

    let discovered = registry.discover("billing").unwrap();
    assert_eq!(discovered.address, "10.0.0.5");
    assert_eq!(discovered.port, 9001);
    assert_eq!(discovered.version, "1.0.0");
    assert_eq!(discovered.status, ServiceStatus::Healthy);
    assert_eq!(discovered.load_percentage, 0.0);
    assert_eq!(discovered.estimated_response_time_ms, 0.0);
}

#[test]
fn test_failed_requests_raise_error_rate_without_changing_status() {
    let registry = ServiceRegistry::new();
    registry.register(billing());

    for _ in 0..5 {
        registry.update_stats("billing", false, 120.0);
    }

    let info = registry.routing_info("billing").unwrap();
    assert_eq!(info.error_rate, 1.0);
    assert_eq!(info.load_percentage, 5.0);
    assert_eq!(info.status, ServiceStatus::Healthy);
    assert!(info.recommended);
    assert_eq!(info.url, "http://10.0.0.5:9001");

    // Stats never feed the heartbeat latency average
    assert_eq!(info.response_time_ms, 0.0);
}

#[test]
fn test_load_percentage_saturates_at_one_hundred() {
    let registry = ServiceRegistry::new();
    registry.register(billing());

    for _ in 0..150 {
        registry.update_stats("billing", true, 1.0);
    }

    assert_eq!(registry.discover("billing").unwrap().load_percentage, 100.0);
}

#[test]
fn test_silent_service_decays_to_offline() {
    let registry = Arc::new(ServiceRegistry::new());
    let record = registry.register(billing());
    let monitor = monitor(&registry);

    let report = monitor.tick_at(record.last_heartbeat + Duration::seconds(91));
    assert_eq!(report.scanned, 1);
    assert_eq!(report.changes.len(), 1);
    assert_eq!(report.changes[0].from, ServiceStatus::Healthy);
    assert_eq!(report.changes[0].to, ServiceStatus::Offline);

    assert_eq!(
        registry.discover("billing").unwrap().status,
        ServiceStatus::Offline
    );
    assert!(registry.discover_all_healthy().is_empty());
}

#[test]
fn test_decay_passes_through_degraded() {
    let registry = Arc::new(ServiceRegistry::new());
    let record = registry.register(billing());
    let monitor = monitor(&registry);
    let start = record.last_heartbeat;

    assert!(monitor.tick_at(start + Duration::seconds(60)).changes.is_empty());

    monitor.tick_at(start + Duration::seconds(61));
    assert_eq!(registry.get("billing").unwrap().status, ServiceStatus::Degraded);

    monitor.tick_at(start + Duration::seconds(90));
    assert_eq!(registry.get("billing").unwrap().status, ServiceStatus::Degraded);

    monitor.tick_at(start + Duration::seconds(91));
    assert_eq!(registry.get("billing").unwrap().status, ServiceStatus::Offline);

    // An earlier clock reading never promotes
    monitor.tick_at(start + Duration::seconds(65));
    assert_eq!(registry.get("billing").unwrap().status, ServiceStatus::Offline);
}

#[test]
fn test_heartbeat_restores_offline_service() {
    let registry = Arc::new(ServiceRegistry::new());
    let record = registry.register(billing());
    let monitor = monitor(&registry);

    monitor.tick_at(record.last_heartbeat + Duration::seconds(120));
    assert_eq!(registry.get("billing").unwrap().status, ServiceStatus::Offline);

    assert!(registry.heartbeat("billing", 40.0));
    let record = registry.get("billing").unwrap();
    assert_eq!(record.status, ServiceStatus::Healthy);
    assert_eq!(record.heartbeat_count, 1);
    assert_eq!(record.avg_response_time_ms, 40.0);
}

#[test]
fn test_heartbeat_average_is_running_mean() {
    let registry = ServiceRegistry::new();
    registry.register(billing());

    registry.heartbeat("billing", 10.0);
    registry.heartbeat("billing", 20.0);
    registry.heartbeat("billing", 30.0);

    let discovered = registry.discover("billing").unwrap();
    assert!((discovered.estimated_response_time_ms - 20.0).abs() < 1e-9);
}

#[test]
fn test_heartbeat_for_unknown_service_is_rejected() {
    let registry = ServiceRegistry::new();
    assert!(!registry.heartbeat("ghost", 1.0));
    assert!(registry.is_empty());
}

#[test]
fn test_deregistered_service_is_not_discoverable() {
    let registry = ServiceRegistry::new();
    registry.register(billing());

    assert!(registry.deregister("billing"));
    assert!(registry.discover("billing").is_none());
    assert!(registry.routing_info("billing").is_none());
    assert!(!registry.deregister("billing"));
}

#[test]
fn test_reregistration_resets_counters_and_keeps_order() {
    let registry = ServiceRegistry::new();
    registry.register(billing());
    registry.register(ServiceRegistration::new("search", "10.0.0.6", 9002));
    registry.update_stats("billing", false, 5.0);
    registry.heartbeat("billing", 5.0);

    let replaced = registry.register(billing().with_version("2.0.0"));
    assert_eq!(replaced.version, "2.0.0");
    assert_eq!(replaced.request_count, 0);
    assert_eq!(replaced.error_count, 0);
    assert_eq!(replaced.heartbeat_count, 0);

    let names: Vec<String> = registry.list().into_iter().map(|s| s.name).collect();
    assert_eq!(names, vec!["billing", "search"]);
}

#[test]
fn test_list_by_status_filters() {
    let registry = Arc::new(ServiceRegistry::new());
    let first = registry.register(billing());
    registry.register(ServiceRegistration::new("search", "10.0.0.6", 9002));
    let monitor = monitor(&registry);

    // Only search keeps heartbeating
    let later = first.last_heartbeat + Duration::seconds(95);
    monitor.tick_at(later);
    registry.heartbeat("search", 3.0);

    let healthy = registry.list_by_status(ServiceStatus::Healthy);
    assert_eq!(healthy.len(), 1);
    assert_eq!(healthy[0].name, "search");

    let offline = registry.list_by_status(ServiceStatus::Offline);
    assert_eq!(offline.len(), 1);
    assert_eq!(offline[0].name, "billing");

    let counts = registry.status_counts();
    assert_eq!(counts.healthy, 1);
    assert_eq!(counts.offline, 1);
    assert_eq!(counts.total, 2);
}

#[test]
fn test_admin_update_replaces_metadata() {
    let registry = ServiceRegistry::new();
    registry.register(billing().with_metadata("tier", "gold").with_metadata("region", "eu"));

    let update = ServiceUpdate {
        port: Some(9100),
        metadata: Some(HashMap::from([("tier".to_string(), json!("silver"))])),
        ..Default::default()
    };
    let record = registry.update("billing", update).unwrap();

    assert_eq!(record.port, 9100);
    assert_eq!(record.metadata.len(), 1);
    assert_eq!(record.metadata["tier"], json!("silver"));
    assert!(registry.update("ghost", ServiceUpdate::default()).is_none());
}

#[test]
fn test_diagnostics_report_silence_and_error_rate() {
    let registry = ServiceRegistry::new();
    registry.register(billing());
    registry.update_stats("billing", true, 10.0);
    registry.update_stats("billing", false, 10.0);

    let diagnostics = registry.get_status("billing").unwrap();
    assert_eq!(diagnostics.request_count, 2);
    assert_eq!(diagnostics.error_count, 1);
    assert_eq!(diagnostics.error_rate, 0.5);
    assert!(diagnostics.time_since_heartbeat_seconds >= 0.0);
    assert!(diagnostics.last_heartbeat <= Utc::now());

    let totals = registry.traffic_totals();
    assert_eq!(totals.total_requests, 2);
    assert_eq!(totals.total_errors, 1);
    assert_eq!(totals.error_rate, 0.5);
}

#[test]
fn test_registration_validation() {
    assert!(billing().validate().is_ok());
    assert!(ServiceRegistration::new("", "10.0.0.5", 9001).validate().is_err());
    assert!(ServiceRegistration::new("billing", "10.0.0.5", 80).validate().is_err());
    assert!(billing().with_health_endpoint("health").validate().is_err());
}

#[test]
fn test_concurrent_heartbeats_are_all_counted() {
    let registry = Arc::new(ServiceRegistry::new());
    registry.register(billing());

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let registry = registry.clone();
            std::thread::spawn(move || {
                for _ in 0..250 {
                    registry.heartbeat("billing", 10.0);
                    registry.update_stats("billing", true, 10.0);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let record = registry.get("billing").unwrap();
    assert_eq!(record.heartbeat_count, 1000);
    assert_eq!(record.request_count, 1000);
    assert!((record.avg_response_time_ms - 10.0).abs() < 1e-9);
}
