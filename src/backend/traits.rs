//! Common traits and types for outbound calls to registered services

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::error::Result;

/// Header carrying the correlation id to downstream services
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Response received from a downstream service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamResponse {
    /// HTTP status code returned by the service
    pub status: u16,

    /// Decoded JSON body, or the raw text as a JSON string when the body is not JSON
    pub body: Value,
}

impl UpstreamResponse {
    pub fn is_server_error(&self) -> bool {
        self.status >= 500
    }
}

/// Transport used by the gateway to reach registered services.
///
/// Implementations must report a missed `timeout` as [`AppError::Timeout`]
/// and any other transport failure as a different variant.
///
/// [`AppError::Timeout`]: crate::error::AppError::Timeout
#[async_trait]
pub trait Upstream: Send + Sync {
    /// POST a JSON body to `url`, forwarding the correlation id
    async fn post_json(
        &self,
        url: &str,
        body: Option<&Value>,
        request_id: &str,
        timeout: Duration,
    ) -> Result<UpstreamResponse>;

    /// GET `url`
    async fn get(&self, url: &str, timeout: Duration) -> Result<UpstreamResponse>;
}
