//! Request correlation middleware
//!
//! Assigns or propagates `X-Request-ID`, makes it available to handlers and
//! logs one line per completed request.

use axum::{
    async_trait,
    body::Body,
    extract::FromRequestParts,
    http::{request::Parts, HeaderValue, Request},
    response::Response,
};
use futures::future::BoxFuture;
use std::{
    convert::Infallible,
    task::{Context, Poll},
    time::Instant,
};
use tower::{Layer, Service};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::backend::traits::REQUEST_ID_HEADER;

/// Correlation id of the current request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Id stored by [`RequestIdMiddleware`], else taken from the headers
    pub fn from_parts(parts: &Parts) -> Self {
        parts
            .extensions
            .get::<RequestId>()
            .cloned()
            .unwrap_or_else(|| RequestId::from_headers(&parts.headers))
    }

    /// Take the id from the request headers, or mint a new one
    fn from_headers(headers: &axum::http::HeaderMap) -> Self {
        headers
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| RequestId(v.to_string()))
            .unwrap_or_else(|| RequestId(Uuid::new_v4().to_string()))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestId
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(RequestId::from_parts(parts))
    }
}

/// Request id layer
#[derive(Clone, Default)]
pub struct RequestIdLayer;

impl RequestIdLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for RequestIdLayer {
    type Service = RequestIdMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestIdMiddleware { inner }
    }
}

/// Request id middleware service
#[derive(Clone)]
pub struct RequestIdMiddleware<S> {
    inner: S,
}

impl<S> Service<Request<Body>> for RequestIdMiddleware<S>
where
    S: Service<Request<Body>, Response = Response> + Send + Clone + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<Body>) -> Self::Future {
        let request_id = RequestId::from_headers(request.headers());
        let method = request.method().clone();
        let path = request.uri().path().to_string();
        request.extensions_mut().insert(request_id.clone());

        let started = Instant::now();
        let future = self.inner.call(request);

        Box::pin(async move {
            let mut response = future.await?;
            let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
            let status = response.status();

            if let Ok(value) = HeaderValue::from_str(request_id.as_str()) {
                response.headers_mut().insert(REQUEST_ID_HEADER, value);
            }

            if status.is_server_error() {
                error!(
                    method = %method,
                    path = %path,
                    status = status.as_u16(),
                    latency_ms = latency_ms,
                    request_id = %request_id.as_str(),
                    "Request failed"
                );
            } else if status.is_client_error() {
                warn!(
                    method = %method,
                    path = %path,
                    status = status.as_u16(),
                    latency_ms = latency_ms,
                    request_id = %request_id.as_str(),
                    "Request rejected"
                );
            } else {
                info!(
                    method = %method,
                    path = %path,
                    status = status.as_u16(),
                    latency_ms = latency_ms,
                    request_id = %request_id.as_str(),
                    "Request completed"
                );
            }

            Ok(response)
        })
    }
}
