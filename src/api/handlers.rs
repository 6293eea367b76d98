//! HTTP handlers for the registry, discovery, gateway and credential APIs

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

use crate::credentials::{AuditEntry, CredentialUpdate, CredentialView, NewCredential};
use crate::error::{ApiError, AppError};
use crate::gateway::{HealthProbe, ProxyResponse};
use crate::middleware::RequestId;
use crate::registry::{
    types::validate_response_time, DiscoveredService, HealthyInstance, RoutingInfo,
    ServiceDiagnostics, ServiceRecord, ServiceRegistration, ServiceStatus, ServiceSummary,
    ServiceUpdate,
};
use super::extract::{ApiPath, ApiQuery};
use crate::AppState;

const VERSION: &str = env!("CARGO_PKG_VERSION");

type ApiResult<T> = std::result::Result<T, ApiError>;

/// Decode a JSON request body into `T`, reporting malformed input as a validation error
fn parse_json<T: DeserializeOwned>(body: &Bytes) -> crate::Result<T> {
    serde_json::from_slice(body).map_err(AppError::from)
}

// ----------------------------------------------------------------------------
// Health
// ----------------------------------------------------------------------------

pub async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": env!("CARGO_PKG_NAME"),
        "version": VERSION,
        "timestamp": Utc::now(),
    }))
}

#[derive(Debug, Serialize)]
pub struct SystemHealth {
    pub status: ServiceStatus,
    pub timestamp: DateTime<Utc>,
    pub services_healthy: usize,
    pub services_degraded: usize,
    pub services_offline: usize,
    pub services_unknown: usize,
    pub services_total: usize,
    pub monitor_running: bool,
    pub version: &'static str,
}

pub async fn system_health(State(state): State<Arc<AppState>>) -> Json<SystemHealth> {
    let counts = state.registry.status_counts();

    let status = if counts.offline > 0 {
        ServiceStatus::Offline
    } else if counts.degraded > 0 {
        ServiceStatus::Degraded
    } else {
        ServiceStatus::Healthy
    };

    Json(SystemHealth {
        status,
        timestamp: Utc::now(),
        services_healthy: counts.healthy,
        services_degraded: counts.degraded,
        services_offline: counts.offline,
        services_unknown: counts.unknown,
        services_total: counts.total,
        monitor_running: state.health_monitor.is_running().await,
        version: VERSION,
    })
}

// ----------------------------------------------------------------------------
// Services
// ----------------------------------------------------------------------------

pub async fn register_service(
    State(state): State<Arc<AppState>>,
    request_id: RequestId,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<ServiceRecord>)> {
    let registration: ServiceRegistration =
        parse_json(&body).map_err(|e| e.with_request_id(request_id.as_str()))?;
    registration
        .validate()
        .map_err(|e| e.with_request_id(request_id.as_str()))?;

    let record = state.registry.register(registration);
    Ok((StatusCode::CREATED, Json(record)))
}

#[derive(Debug, Deserialize)]
pub struct ListServicesQuery {
    pub status: Option<String>,
}

pub async fn list_services(
    State(state): State<Arc<AppState>>,
    request_id: RequestId,
    ApiQuery(query): ApiQuery<ListServicesQuery>,
) -> ApiResult<Json<Vec<ServiceSummary>>> {
    let services = match query.status.as_deref() {
        Some(status) => {
            let status: ServiceStatus = status
                .parse()
                .map_err(|e: AppError| e.with_request_id(request_id.as_str()))?;
            state.registry.list_by_status(status)
        }
        None => state.registry.list(),
    };

    Ok(Json(services))
}

pub async fn get_service(
    State(state): State<Arc<AppState>>,
    request_id: RequestId,
    ApiPath(name): ApiPath<String>,
) -> ApiResult<Json<ServiceDiagnostics>> {
    state
        .registry
        .get_status(&name)
        .map(Json)
        .ok_or_else(|| AppError::service_not_found(&name).with_request_id(request_id.as_str()))
}

#[derive(Debug, Serialize)]
pub struct ServiceHealth {
    pub service_name: String,
    pub status: ServiceStatus,
    pub healthy: bool,
    pub last_heartbeat: DateTime<Utc>,
    pub response_time_ms: f64,
}

pub async fn get_service_health(
    State(state): State<Arc<AppState>>,
    request_id: RequestId,
    ApiPath(name): ApiPath<String>,
) -> ApiResult<Json<ServiceHealth>> {
    let record = state
        .registry
        .get(&name)
        .ok_or_else(|| AppError::service_not_found(&name).with_request_id(request_id.as_str()))?;

    Ok(Json(ServiceHealth {
        service_name: record.name,
        status: record.status,
        healthy: record.status == ServiceStatus::Healthy,
        last_heartbeat: record.last_heartbeat,
        response_time_ms: record.avg_response_time_ms,
    }))
}

pub async fn update_service(
    State(state): State<Arc<AppState>>,
    request_id: RequestId,
    ApiPath(name): ApiPath<String>,
    body: Bytes,
) -> ApiResult<Json<ServiceRecord>> {
    let update: ServiceUpdate =
        parse_json(&body).map_err(|e| e.with_request_id(request_id.as_str()))?;
    update
        .validate()
        .map_err(|e| e.with_request_id(request_id.as_str()))?;

    state
        .registry
        .update(&name, update)
        .map(Json)
        .ok_or_else(|| AppError::service_not_found(&name).with_request_id(request_id.as_str()))
}

pub async fn deregister_service(
    State(state): State<Arc<AppState>>,
    request_id: RequestId,
    ApiPath(name): ApiPath<String>,
) -> ApiResult<StatusCode> {
    if state.registry.deregister(&name) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::service_not_found(&name).with_request_id(request_id.as_str()))
    }
}

#[derive(Debug, Deserialize)]
pub struct HeartbeatQuery {
    #[serde(default)]
    pub response_time_ms: f64,
}

#[derive(Debug, Serialize)]
pub struct HeartbeatAck {
    pub service_name: String,
    pub heartbeat_received: bool,
    pub timestamp: DateTime<Utc>,
}

pub async fn heartbeat(
    State(state): State<Arc<AppState>>,
    request_id: RequestId,
    ApiPath(name): ApiPath<String>,
    ApiQuery(query): ApiQuery<HeartbeatQuery>,
) -> ApiResult<Json<HeartbeatAck>> {
    validate_response_time(query.response_time_ms)
        .map_err(|e| e.with_request_id(request_id.as_str()))?;

    if !state.registry.heartbeat(&name, query.response_time_ms) {
        return Err(AppError::service_not_found(&name).with_request_id(request_id.as_str()));
    }

    Ok(Json(HeartbeatAck {
        service_name: name,
        heartbeat_received: true,
        timestamp: Utc::now(),
    }))
}

// ----------------------------------------------------------------------------
// Discovery
// ----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct DiscoverQuery {
    pub service_name: String,
}

pub async fn discover(
    State(state): State<Arc<AppState>>,
    request_id: RequestId,
    ApiQuery(query): ApiQuery<DiscoverQuery>,
) -> ApiResult<Json<DiscoveredService>> {
    state
        .registry
        .discover(&query.service_name)
        .map(Json)
        .ok_or_else(|| {
            AppError::service_not_found(&query.service_name).with_request_id(request_id.as_str())
        })
}

pub async fn discover_healthy(State(state): State<Arc<AppState>>) -> Json<Vec<HealthyInstance>> {
    Json(state.registry.discover_all_healthy())
}

// ----------------------------------------------------------------------------
// Gateway
// ----------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct GatewayStatus {
    pub status: &'static str,
    pub healthy_services: usize,
    pub total_services: usize,
    pub timestamp: DateTime<Utc>,
    pub gateway_version: &'static str,
}

pub async fn gateway_status(State(state): State<Arc<AppState>>) -> Json<GatewayStatus> {
    let counts = state.registry.status_counts();

    Json(GatewayStatus {
        status: if counts.healthy > 0 {
            "operational"
        } else {
            "degraded"
        },
        healthy_services: counts.healthy,
        total_services: counts.total,
        timestamp: Utc::now(),
        gateway_version: VERSION,
    })
}

#[derive(Debug, Serialize)]
pub struct GatewayMetrics {
    pub timestamp: DateTime<Utc>,
    pub total_requests: u64,
    pub total_errors: u64,
    pub error_rate: f64,
    pub average_response_time_ms: f64,
    pub services_count: usize,
    pub healthy_count: usize,
}

pub async fn gateway_metrics(State(state): State<Arc<AppState>>) -> Json<GatewayMetrics> {
    let totals = state.registry.traffic_totals();
    let counts = state.registry.status_counts();

    Json(GatewayMetrics {
        timestamp: Utc::now(),
        total_requests: totals.total_requests,
        total_errors: totals.total_errors,
        error_rate: totals.error_rate,
        average_response_time_ms: totals.average_response_time_ms,
        services_count: counts.total,
        healthy_count: counts.healthy,
    })
}

#[derive(Debug, Serialize)]
pub struct ServicesHealth {
    pub timestamp: DateTime<Utc>,
    pub services: Vec<ServiceDiagnostics>,
}

pub async fn services_health(State(state): State<Arc<AppState>>) -> Json<ServicesHealth> {
    Json(ServicesHealth {
        timestamp: Utc::now(),
        services: state.registry.all_statuses(),
    })
}

pub async fn manual_health_check(
    State(state): State<Arc<AppState>>,
    request_id: RequestId,
    ApiPath(name): ApiPath<String>,
) -> ApiResult<Json<HealthProbe>> {
    debug!(service = %name, request_id = %request_id.as_str(), "Manual health check requested");
    state
        .dispatcher
        .check_health(&name)
        .await
        .map(Json)
        .map_err(|e| e.with_request_id(request_id.as_str()))
}

pub async fn routing_info(
    State(state): State<Arc<AppState>>,
    request_id: RequestId,
    ApiPath(name): ApiPath<String>,
) -> ApiResult<Json<RoutingInfo>> {
    state
        .registry
        .routing_info(&name)
        .map(Json)
        .ok_or_else(|| AppError::service_not_found(&name).with_request_id(request_id.as_str()))
}

pub async fn proxy(
    State(state): State<Arc<AppState>>,
    request_id: RequestId,
    ApiPath((name, path)): ApiPath<(String, String)>,
    body: Bytes,
) -> ApiResult<Json<ProxyResponse>> {
    let payload: Option<serde_json::Value> = if body.iter().all(u8::is_ascii_whitespace) {
        None
    } else {
        Some(parse_json(&body).map_err(|e| e.with_request_id(request_id.as_str()))?)
    };

    state
        .dispatcher
        .proxy(&name, &path, payload, request_id.as_str())
        .await
        .map(Json)
        .map_err(|e| e.with_request_id(request_id.as_str()))
}

// ----------------------------------------------------------------------------
// Credentials
// ----------------------------------------------------------------------------

pub async fn create_credential(
    State(state): State<Arc<AppState>>,
    request_id: RequestId,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<CredentialView>)> {
    let credential: NewCredential =
        parse_json(&body).map_err(|e| e.with_request_id(request_id.as_str()))?;

    let view = state
        .credentials
        .create(credential)
        .map_err(|e| e.with_request_id(request_id.as_str()))?;
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn get_credential(
    State(state): State<Arc<AppState>>,
    request_id: RequestId,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<Json<CredentialView>> {
    state
        .credentials
        .get(&id)
        .map(Json)
        .ok_or_else(|| AppError::credential_not_found(&id).with_request_id(request_id.as_str()))
}

pub async fn list_service_credentials(
    State(state): State<Arc<AppState>>,
    ApiPath(service_name): ApiPath<String>,
) -> Json<Vec<CredentialView>> {
    Json(state.credentials.list_for_service(&service_name))
}

pub async fn update_credential(
    State(state): State<Arc<AppState>>,
    request_id: RequestId,
    ApiPath(id): ApiPath<String>,
    body: Bytes,
) -> ApiResult<Json<CredentialView>> {
    let update: CredentialUpdate =
        parse_json(&body).map_err(|e| e.with_request_id(request_id.as_str()))?;

    state
        .credentials
        .update(&id, update)
        .map(Json)
        .ok_or_else(|| AppError::credential_not_found(&id).with_request_id(request_id.as_str()))
}

pub async fn delete_credential(
    State(state): State<Arc<AppState>>,
    request_id: RequestId,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<StatusCode> {
    if state.credentials.delete(&id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::credential_not_found(&id).with_request_id(request_id.as_str()))
    }
}

#[derive(Debug, Deserialize)]
pub struct RotateCredential {
    pub value: String,
}

pub async fn rotate_credential(
    State(state): State<Arc<AppState>>,
    request_id: RequestId,
    ApiPath(id): ApiPath<String>,
    body: Bytes,
) -> ApiResult<Json<CredentialView>> {
    let rotate: RotateCredential =
        parse_json(&body).map_err(|e| e.with_request_id(request_id.as_str()))?;

    let view = state
        .credentials
        .rotate(&id, &rotate.value)
        .map_err(|e| e.with_request_id(request_id.as_str()))?;
    info!(credential_id = %id, request_id = %request_id.as_str(), "Credential rotated via API");
    Ok(Json(view))
}

pub async fn credential_audit(
    State(state): State<Arc<AppState>>,
    request_id: RequestId,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<Json<Vec<AuditEntry>>> {
    if state.credentials.get(&id).is_none() {
        return Err(AppError::credential_not_found(&id).with_request_id(request_id.as_str()));
    }
    Ok(Json(state.credentials.audit_log(&id)))
}
