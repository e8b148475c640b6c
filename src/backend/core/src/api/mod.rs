//! REST API.
//!
//! Every JSON body is wrapped in an envelope:
//!
//! ```text
//! { "success": true, "results": 2, "data": [...] }
//! { "success": false, "error": { "code": "RECORD_NOT_FOUND", ... } }
//! ```
//!
//! Unversioned endpoints:
//! - `GET /health`
//! - `GET /metrics`
//!
//! Resources live under `/api/v1`, see [`v1::routes`].

mod handlers;
pub mod v1;

use std::sync::Arc;

use axum::{
    extract::{FromRef, OriginalUri},
    routing::get,
    Router,
};
use serde::Serialize;
use tokio::sync::Mutex;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::Config;
use crate::error::{CalendarError, ErrorCode};
use crate::jobs::Dispatcher;
use crate::middleware::{Authenticator, TracingLayer};
use crate::query::QueryConfig;
use crate::store::Collections;

/// Application state shared across handlers.
#[derive(Clone, FromRef)]
pub struct AppState {
    pub collections: Collections,
    pub dispatcher: Dispatcher,
    pub authenticator: Arc<Authenticator>,
    pub query: Arc<QueryConfig>,
    /// Serializes the active-session check with the insert that follows it.
    pub session_gate: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(collections: Collections, dispatcher: Dispatcher, config: &Config) -> Self {
        Self {
            collections,
            dispatcher,
            authenticator: Arc::new(Authenticator::new(&config.auth)),
            query: Arc::new(config.query.clone()),
            session_gate: Arc::new(Mutex::new(())),
        }
    }
}

/// Build the API router.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::prometheus_metrics))
        .nest(v1::V1_PREFIX, v1::v1_router())
        .fallback(route_not_defined)
        .layer(TracingLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors)
        .with_state(state)
}

async fn route_not_defined(OriginalUri(uri): OriginalUri) -> CalendarError {
    CalendarError::new(
        ErrorCode::RouteNotFound,
        format!("This route {} is not yet defined", uri.path()),
    )
}

/// API response wrapper.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            results: None,
            data: Some(data),
            message: None,
        }
    }
}

impl<T: Serialize> ApiResponse<Vec<T>> {
    /// A list, with its length in `results`.
    pub fn list(items: Vec<T>) -> Self {
        Self {
            success: true,
            results: Some(items.len()),
            data: Some(items),
            message: None,
        }
    }
}

impl ApiResponse<()> {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            results: None,
            data: None,
            message: Some(message.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_response_success() {
        let response = ApiResponse::success("test data");
        assert!(response.success);
        assert_eq!(response.data, Some("test data"));
        assert!(response.results.is_none());
    }

    #[test]
    fn test_api_response_list() {
        let json = serde_json::to_value(ApiResponse::list(vec![1, 2, 3])).unwrap();
        assert_eq!(json["results"], 3);
        assert_eq!(json["data"], serde_json::json!([1, 2, 3]));
        assert!(json.get("message").is_none());
    }

    #[test]
    fn test_api_response_message() {
        let json = serde_json::to_value(ApiResponse::message("done")).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["message"], "done");
        assert!(json.get("data").is_none());
    }
}
