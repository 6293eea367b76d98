//! HTTP upstream client implementation

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::backend::traits::{Upstream, UpstreamResponse, REQUEST_ID_HEADER};
use crate::error::{AppError, Result};

/// reqwest-backed [`Upstream`] sharing one connection pool across all services
#[derive(Clone)]
pub struct HttpUpstream {
    client: Client,
}

impl HttpUpstream {
    /// Create a new HTTP upstream client
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    async fn send(&self, request: RequestBuilder, url: &str) -> Result<UpstreamResponse> {
        let response = request.send().await.map_err(|e| classify(url, e))?;
        let status = response.status().as_u16();
        let text = response.text().await.map_err(|e| classify(url, e))?;

        let body = if text.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };

        debug!(url = %url, status = status, "Upstream responded");
        Ok(UpstreamResponse { status, body })
    }
}

fn classify(url: &str, error: reqwest::Error) -> AppError {
    if error.is_timeout() {
        AppError::Timeout(format!("Request to {} timed out", url))
    } else {
        AppError::HttpClient(error)
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn post_json(
        &self,
        url: &str,
        body: Option<&Value>,
        request_id: &str,
        timeout: Duration,
    ) -> Result<UpstreamResponse> {
        debug!(url = %url, request_id = %request_id, "Sending proxied request");

        let mut request = self
            .client
            .post(url)
            .header(REQUEST_ID_HEADER, request_id)
            .timeout(timeout);
        if let Some(body) = body {
            request = request.json(body);
        }

        self.send(request, url).await
    }

    async fn get(&self, url: &str, timeout: Duration) -> Result<UpstreamResponse> {
        self.send(self.client.get(url).timeout(timeout), url).await
    }
}
