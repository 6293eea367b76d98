//! Gateway dispatcher: discovery-driven proxying with outcome feedback

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::backend::traits::{Upstream, UpstreamResponse};
use crate::config::GatewayConfig;
use crate::error::{AppError, Result};
use crate::registry::{ServiceRegistry, ServiceStatus};

/// Deadlines for outbound calls
#[derive(Debug, Clone, Copy)]
pub struct DispatchConfig {
    /// Deadline handed to the transport for proxied requests
    pub proxy_timeout: Duration,
    /// Outer guard around a proxied request
    pub proxy_guard: Duration,
    pub health_check_timeout: Duration,
    pub health_check_guard: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            proxy_timeout: Duration::from_secs(30),
            proxy_guard: Duration::from_secs(35),
            health_check_timeout: Duration::from_secs(10),
            health_check_guard: Duration::from_secs(12),
        }
    }
}

impl From<&GatewayConfig> for DispatchConfig {
    fn from(config: &GatewayConfig) -> Self {
        Self {
            proxy_timeout: Duration::from_millis(config.proxy_timeout_ms),
            proxy_guard: Duration::from_millis(config.proxy_guard_ms),
            health_check_timeout: Duration::from_millis(config.health_check_timeout_ms),
            health_check_guard: Duration::from_millis(config.health_check_guard_ms),
        }
    }
}

/// Result of a proxied request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyResponse {
    pub status: String,
    pub service_name: String,
    pub status_code: u16,
    pub response: Value,
    pub response_time_ms: f64,
    pub request_id: String,
}

/// Result of a manual health probe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthProbe {
    pub service_name: String,
    pub healthy: bool,
    pub status_code: u16,
    pub timestamp: DateTime<Utc>,
}

/// How a guarded outbound call ended
enum CallOutcome {
    Completed(UpstreamResponse, f64),
    TimedOut,
    Failed(AppError, f64),
}

/// Routes requests to registered services and records their outcomes
pub struct Dispatcher {
    registry: Arc<ServiceRegistry>,
    upstream: Arc<dyn Upstream>,
    config: DispatchConfig,
}

impl Dispatcher {
    /// Create a new dispatcher
    pub fn new(
        registry: Arc<ServiceRegistry>,
        upstream: Arc<dyn Upstream>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            registry,
            upstream,
            config,
        }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Proxy a JSON request to `path` on the named service.
    ///
    /// Only a Healthy service is contacted. Every attempted call is counted
    /// against the service, whatever its outcome.
    pub async fn proxy(
        &self,
        service_name: &str,
        path: &str,
        body: Option<Value>,
        request_id: &str,
    ) -> Result<ProxyResponse> {
        let instance = self
            .registry
            .discover(service_name)
            .ok_or_else(|| AppError::service_not_found(service_name))?;

        if instance.status != ServiceStatus::Healthy {
            warn!(
                service = %service_name,
                status = %instance.status,
                request_id = %request_id,
                "Refusing to proxy to unhealthy service"
            );
            return Err(AppError::Unavailable(format!(
                "Service {} is not healthy (status: {})",
                service_name, instance.status
            )));
        }

        let url = target_url(&instance.address, instance.port, path);
        debug!(service = %service_name, url = %url, request_id = %request_id, "Proxying request");

        let call = self.upstream.post_json(
            &url,
            body.as_ref(),
            request_id,
            self.config.proxy_timeout,
        );

        match guarded(call, self.config.proxy_guard).await {
            CallOutcome::Completed(response, elapsed_ms) => {
                self.registry
                    .update_stats(service_name, !response.is_server_error(), elapsed_ms);
                info!(
                    service = %service_name,
                    status_code = response.status,
                    response_time_ms = elapsed_ms,
                    request_id = %request_id,
                    "Proxied request completed"
                );

                Ok(ProxyResponse {
                    status: "success".to_string(),
                    service_name: service_name.to_string(),
                    status_code: response.status,
                    response: response.body,
                    response_time_ms: elapsed_ms,
                    request_id: request_id.to_string(),
                })
            }
            CallOutcome::TimedOut => {
                let ceiling_ms = self.config.proxy_timeout.as_millis() as f64;
                self.registry.update_stats(service_name, false, ceiling_ms);
                error!(
                    service = %service_name,
                    timeout_ms = ceiling_ms,
                    request_id = %request_id,
                    "Proxied request timed out"
                );
                Err(AppError::Timeout(format!(
                    "Request to {} timed out",
                    service_name
                )))
            }
            CallOutcome::Failed(e, elapsed_ms) => {
                self.registry.update_stats(service_name, false, elapsed_ms);
                error!(
                    service = %service_name,
                    error = %e,
                    request_id = %request_id,
                    "Proxied request failed"
                );
                Err(AppError::Internal(format!(
                    "Gateway proxy to {} failed: {}",
                    service_name, e
                )))
            }
        }
    }

    /// Probe the service's health endpoint once.
    ///
    /// The probe is counted like a request but never changes the service status.
    pub async fn check_health(&self, service_name: &str) -> Result<HealthProbe> {
        let record = self
            .registry
            .get(service_name)
            .ok_or_else(|| AppError::service_not_found(service_name))?;

        let url = format!(
            "{}{}",
            target_url(&record.address, record.port, ""),
            record.health_endpoint.trim_start_matches('/')
        );
        let call = self.upstream.get(&url, self.config.health_check_timeout);

        match guarded(call, self.config.health_check_guard).await {
            CallOutcome::Completed(response, _) => {
                let healthy = response.status == 200;
                self.registry.update_stats(service_name, healthy, 0.0);
                info!(
                    service = %service_name,
                    healthy = healthy,
                    status_code = response.status,
                    "Manual health check completed"
                );

                Ok(HealthProbe {
                    service_name: service_name.to_string(),
                    healthy,
                    status_code: response.status,
                    timestamp: Utc::now(),
                })
            }
            CallOutcome::TimedOut => {
                let ceiling_ms = self.config.health_check_timeout.as_millis() as f64;
                self.registry.update_stats(service_name, false, ceiling_ms);
                warn!(service = %service_name, "Manual health check timed out");
                Err(AppError::Timeout(format!(
                    "Health check of {} timed out",
                    service_name
                )))
            }
            CallOutcome::Failed(e, elapsed_ms) => {
                self.registry.update_stats(service_name, false, elapsed_ms);
                warn!(service = %service_name, error = %e, "Manual health check failed");
                Err(AppError::Internal(format!(
                    "Health check of {} failed: {}",
                    service_name, e
                )))
            }
        }
    }
}

/// Run an outbound call under an outer guard.
///
/// A transport-level timeout and an expired guard both end as `TimedOut`.
async fn guarded<F>(call: F, guard: Duration) -> CallOutcome
where
    F: Future<Output = Result<UpstreamResponse>>,
{
    let started = Instant::now();
    let result = tokio::time::timeout(guard, call).await;
    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

    match result {
        Ok(Ok(response)) => CallOutcome::Completed(response, elapsed_ms),
        Ok(Err(AppError::Timeout(_))) | Err(_) => CallOutcome::TimedOut,
        Ok(Err(e)) => CallOutcome::Failed(e, elapsed_ms),
    }
}

/// `http://address:port/path`, with exactly one slash before the path
pub fn target_url(address: &str, port: u16, path: &str) -> String {
    format!(
        "http://{}:{}/{}",
        address,
        port,
        path.trim_start_matches('/')
    )
}
