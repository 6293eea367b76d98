//! Functional tests for the gateway dispatcher

use api_coordinator::backend::{HttpUpstream, Upstream, UpstreamResponse};
use api_coordinator::gateway::{DispatchConfig, Dispatcher, HealthMonitor, MonitorConfig};
use api_coordinator::registry::{ServiceRegistration, ServiceRegistry, ServiceStatus};
use api_coordinator::{AppError, Result};
use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Upstream that sleeps well past any deadline it is given
struct StallingUpstream {
    calls: AtomicUsize,
}

#[async_trait]
impl Upstream for StallingUpstream {
    async fn post_json(
        &self,
        _url: &str,
        _body: Option<&Value>,
        _request_id: &str,
        _timeout: Duration,
    ) -> Result<UpstreamResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(UpstreamResponse {
            status: 200,
            body: Value::Null,
        })
    }

    async fn get(&self, _url: &str, _timeout: Duration) -> Result<UpstreamResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(UpstreamResponse {
            status: 200,
            body: Value::Null,
        })
    }
}

fn short_deadlines() -> DispatchConfig {
    DispatchConfig {
        proxy_timeout: Duration::from_millis(50),
        proxy_guard: Duration::from_millis(100),
        health_check_timeout: Duration::from_millis(50),
        health_check_guard: Duration::from_millis(100),
    }
}

/// Register a service pointing at the mock server
fn register_mock(registry: &ServiceRegistry, name: &str, server: &MockServer) {
    let addr = server.address();
    registry.register(ServiceRegistration::new(
        name,
        addr.ip().to_string(),
        addr.port(),
    ));
}

fn http_dispatcher(registry: &Arc<ServiceRegistry>) -> Dispatcher {
    Dispatcher::new(
        registry.clone(),
        Arc::new(HttpUpstream::new().unwrap()),
        DispatchConfig::default(),
    )
}

#[tokio::test]
async fn test_proxy_success_records_stats() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/charge"))
        .and(header("x-request-id", "req-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"charged": true})))
        .expect(1)
        .mount(&server)
        .await;

    let registry = Arc::new(ServiceRegistry::new());
    register_mock(&registry, "billing", &server);
    let dispatcher = http_dispatcher(&registry);

    let response = dispatcher
        .proxy("billing", "v1/charge", Some(json!({"amount": 10})), "req-1")
        .await
        .unwrap();

    assert_eq!(response.status, "success");
    assert_eq!(response.service_name, "billing");
    assert_eq!(response.status_code, 200);
    assert_eq!(response.response, json!({"charged": true}));
    assert_eq!(response.request_id, "req-1");
    assert!(response.response_time_ms >= 0.0);

    let record = registry.get("billing").unwrap();
    assert_eq!(record.request_count, 1);
    assert_eq!(record.error_count, 0);
}

#[tokio::test]
async fn test_proxy_server_error_counts_as_failure_but_returns() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502).set_body_json(json!({"error": "bad gateway"})))
        .mount(&server)
        .await;

    let registry = Arc::new(ServiceRegistry::new());
    register_mock(&registry, "billing", &server);
    let dispatcher = http_dispatcher(&registry);

    let response = dispatcher
        .proxy("billing", "/v1/charge", None, "req-2")
        .await
        .unwrap();
    assert_eq!(response.status_code, 502);

    let record = registry.get("billing").unwrap();
    assert_eq!(record.request_count, 1);
    assert_eq!(record.error_count, 1);
    assert_eq!(record.status, ServiceStatus::Healthy);
}

#[tokio::test]
async fn test_proxy_client_error_counts_as_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let registry = Arc::new(ServiceRegistry::new());
    register_mock(&registry, "billing", &server);
    let dispatcher = http_dispatcher(&registry);

    let response = dispatcher
        .proxy("billing", "missing", None, "req-3")
        .await
        .unwrap();
    assert_eq!(response.status_code, 404);
    assert_eq!(response.response, Value::Null);
    assert_eq!(registry.get("billing").unwrap().error_count, 0);
}

#[tokio::test]
async fn test_proxy_unknown_service_is_not_found() {
    let registry = Arc::new(ServiceRegistry::new());
    let dispatcher = http_dispatcher(&registry);

    let result = dispatcher.proxy("ghost", "x", None, "req-4").await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_offline_service_is_unavailable_without_a_call() {
    let registry = Arc::new(ServiceRegistry::new());
    let record = registry.register(ServiceRegistration::new("billing", "10.0.0.5", 9001));
    for _ in 0..5 {
        registry.update_stats("billing", false, 100.0);
    }
    assert_eq!(registry.routing_info("billing").unwrap().error_rate, 1.0);

    let monitor = HealthMonitor::new(registry.clone(), MonitorConfig::default());
    monitor.tick_at(record.last_heartbeat + ChronoDuration::seconds(91));
    assert_eq!(
        registry.get("billing").unwrap().status,
        ServiceStatus::Offline
    );

    let upstream = Arc::new(StallingUpstream {
        calls: AtomicUsize::new(0),
    });
    let dispatcher = Dispatcher::new(registry.clone(), upstream.clone(), short_deadlines());

    let result = dispatcher.proxy("billing", "v1/charge", None, "req-5").await;
    assert!(matches!(result, Err(AppError::Unavailable(_))));
    assert_eq!(upstream.calls.load(Ordering::SeqCst), 0);
    assert_eq!(registry.get("billing").unwrap().request_count, 5);
}

#[tokio::test]
async fn test_degraded_service_is_unavailable() {
    let registry = Arc::new(ServiceRegistry::new());
    let record = registry.register(ServiceRegistration::new("billing", "10.0.0.5", 9001));
    let monitor = HealthMonitor::new(registry.clone(), MonitorConfig::default());
    monitor.tick_at(record.last_heartbeat + ChronoDuration::seconds(75));
    assert_eq!(
        registry.get("billing").unwrap().status,
        ServiceStatus::Degraded
    );

    let dispatcher = http_dispatcher(&registry);
    let result = dispatcher.proxy("billing", "x", None, "req-6").await;
    assert!(matches!(result, Err(AppError::Unavailable(_))));
}

#[tokio::test]
async fn test_stalled_upstream_hits_guard_and_records_ceiling() {
    let registry = Arc::new(ServiceRegistry::new());
    registry.register(ServiceRegistration::new("billing", "10.0.0.5", 9001));
    let upstream = Arc::new(StallingUpstream {
        calls: AtomicUsize::new(0),
    });
    let dispatcher = Dispatcher::new(registry.clone(), upstream.clone(), short_deadlines());

    let started = std::time::Instant::now();
    let result = dispatcher.proxy("billing", "v1/charge", None, "req-7").await;

    assert!(matches!(result, Err(AppError::Timeout(_))));
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(upstream.calls.load(Ordering::SeqCst), 1);

    let record = registry.get("billing").unwrap();
    assert_eq!(record.request_count, 1);
    assert_eq!(record.error_count, 1);
    // Timeouts never demote a service
    assert_eq!(record.status, ServiceStatus::Healthy);
}

#[tokio::test]
async fn test_transport_timeout_is_reported_as_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let registry = Arc::new(ServiceRegistry::new());
    register_mock(&registry, "billing", &server);
    let dispatcher = Dispatcher::new(
        registry.clone(),
        Arc::new(HttpUpstream::new().unwrap()),
        DispatchConfig {
            proxy_timeout: Duration::from_millis(50),
            proxy_guard: Duration::from_secs(5),
            ..DispatchConfig::default()
        },
    );

    let result = dispatcher.proxy("billing", "slow", None, "req-8").await;
    assert!(matches!(result, Err(AppError::Timeout(_))));
    assert_eq!(registry.get("billing").unwrap().error_count, 1);
}

#[tokio::test]
async fn test_connection_failure_is_internal() {
    let registry = Arc::new(ServiceRegistry::new());
    registry.register(ServiceRegistration::new("billing", "127.0.0.1", 1));
    let dispatcher = http_dispatcher(&registry);

    let result = dispatcher.proxy("billing", "v1/charge", None, "req-9").await;
    assert!(matches!(result, Err(AppError::Internal(_))));

    let record = registry.get("billing").unwrap();
    assert_eq!(record.request_count, 1);
    assert_eq!(record.error_count, 1);
}

#[tokio::test]
async fn test_manual_health_check_uses_registered_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/status/live"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let registry = Arc::new(ServiceRegistry::new());
    let addr = server.address();
    registry.register(
        ServiceRegistration::new("billing", addr.ip().to_string(), addr.port())
            .with_health_endpoint("/status/live"),
    );
    let dispatcher = http_dispatcher(&registry);

    let probe = dispatcher.check_health("billing").await.unwrap();
    assert!(probe.healthy);
    assert_eq!(probe.status_code, 200);

    let record = registry.get("billing").unwrap();
    assert_eq!(record.request_count, 1);
    assert_eq!(record.error_count, 0);
}

#[tokio::test]
async fn test_manual_health_check_failure_does_not_change_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let registry = Arc::new(ServiceRegistry::new());
    register_mock(&registry, "billing", &server);
    let dispatcher = http_dispatcher(&registry);

    let probe = dispatcher.check_health("billing").await.unwrap();
    assert!(!probe.healthy);
    assert_eq!(probe.status_code, 503);

    let record = registry.get("billing").unwrap();
    assert_eq!(record.error_count, 1);
    assert_eq!(record.status, ServiceStatus::Healthy);
}

#[tokio::test]
async fn test_manual_health_check_timeout() {
    let registry = Arc::new(ServiceRegistry::new());
    registry.register(ServiceRegistration::new("billing", "10.0.0.5", 9001));
    let upstream = Arc::new(StallingUpstream {
        calls: AtomicUsize::new(0),
    });
    let dispatcher = Dispatcher::new(registry.clone(), upstream, short_deadlines());

    let result = dispatcher.check_health("billing").await;
    assert!(matches!(result, Err(AppError::Timeout(_))));
    assert_eq!(registry.get("billing").unwrap().error_count, 1);

    assert!(matches!(
        dispatcher.check_health("ghost").await,
        Err(AppError::NotFound(_))
    ));
}
