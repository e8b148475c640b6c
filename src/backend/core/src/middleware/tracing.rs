//! Request tracing middleware.
//!
//! Wraps each request in an `http_request` span tagged with a request id,
//! echoes the id back in `X-Request-ID` and records request metrics.

use std::{
    task::{Context, Poll},
    time::Instant,
};

use axum::{
    body::Body,
    extract::{MatchedPath, Request},
    http::{header::HeaderName, HeaderValue},
    response::Response,
};
use futures::future::BoxFuture;
use metrics::{counter, histogram};
use tower::{Layer, Service};
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Header carrying the request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Request id attached to request extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

/// Tracing layer for Tower.
#[derive(Debug, Clone, Default)]
pub struct TracingLayer;

impl TracingLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for TracingLayer {
    type Service = TracingService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TracingService { inner }
    }
}

/// Tracing service.
#[derive(Debug, Clone)]
pub struct TracingService<S> {
    inner: S,
}

impl<S> Service<Request<Body>> for TracingService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<Body>) -> Self::Future {
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let start = Instant::now();

            let request_id = request
                .headers()
                .get(REQUEST_ID_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string())
                .unwrap_or_else(|| Uuid::new_v4().to_string());
            let method = request.method().to_string();
            let route = request
                .extensions()
                .get::<MatchedPath>()
                .map(|p| p.as_str().to_string())
                .unwrap_or_else(|| "unmatched".to_string());

            let span = info_span!(
                "http_request",
                request_id = %request_id,
                method = %method,
                path = %request.uri().path(),
                otel.kind = "server",
                http.status_code = tracing::field::Empty,
            );

            request.extensions_mut().insert(RequestId(request_id.clone()));

            let result = inner.call(request).instrument(span.clone()).await;
            let duration = start.elapsed();

            if let Ok(response) = &result {
                let status = response.status().as_u16();
                span.record("http.status_code", status);

                let _guard = span.enter();
                let duration_ms = duration.as_millis() as u64;
                if status >= 500 {
                    error!(status, duration_ms, "Request failed");
                } else if status >= 400 {
                    warn!(status, duration_ms, "Request rejected");
                } else {
                    info!(status, duration_ms, "Request completed");
                }

                counter!(
                    "calendar_http_requests_total",
                    "method" => method.clone(),
                    "route" => route.clone(),
                    "status" => status.to_string()
                )
                .increment(1);
                histogram!(
                    "calendar_http_request_duration_seconds",
                    "method" => method,
                    "route" => route
                )
                .record(duration.as_secs_f64());
            }

            result.map(|mut response| {
                if let Ok(value) = HeaderValue::from_str(&request_id) {
                    response
                        .headers_mut()
                        .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
                }
                response
            })
        })
    }
}
