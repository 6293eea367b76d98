//! Router construction

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::handlers;
use crate::middleware::RequestIdLayer;
use crate::AppState;

/// Build the application router over shared state
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health
        .route("/health", get(handlers::health))
        .route("/api/health/system", get(handlers::system_health))
        // Services
        .route("/api/services", get(handlers::list_services))
        .route("/api/services/register", post(handlers::register_service))
        .route(
            "/api/services/:name",
            get(handlers::get_service)
                .patch(handlers::update_service)
                .delete(handlers::deregister_service),
        )
        .route("/api/services/:name/health", get(handlers::get_service_health))
        .route("/api/services/:name/heartbeat", post(handlers::heartbeat))
        // Discovery
        .route("/api/discover", get(handlers::discover))
        .route("/api/discover/healthy", get(handlers::discover_healthy))
        // Gateway
        .route("/api/gateway/status", get(handlers::gateway_status))
        .route("/api/gateway/metrics", get(handlers::gateway_metrics))
        .route("/api/gateway/health/services", get(handlers::services_health))
        .route(
            "/api/gateway/health/check/:name",
            post(handlers::manual_health_check),
        )
        .route("/api/gateway/routing-info/:name", get(handlers::routing_info))
        .route("/api/gateway/proxy/:name/*path", post(handlers::proxy))
        // Credentials
        .route("/api/credentials", post(handlers::create_credential))
        .route(
            "/api/credentials/:id",
            get(handlers::get_credential)
                .patch(handlers::update_credential)
                .delete(handlers::delete_credential),
        )
        .route("/api/credentials/:id/rotate", post(handlers::rotate_credential))
        .route("/api/credentials/:id/audit", get(handlers::credential_audit))
        .route(
            "/api/credentials/service/:name",
            get(handlers::list_service_credentials),
        )
        .layer(RequestIdLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
