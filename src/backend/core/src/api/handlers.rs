//! Unversioned handlers and helpers shared by the resource handlers.

use axum::{http::header, response::IntoResponse, Json};
use serde::Serialize;
use serde_json::Value;

use crate::error::{CalendarError, ErrorCode, Result};
use crate::query::{parse_leading_int, QueryConfig, QueryFeatures};
use crate::store::{Record, RecordStore};

// ═══════════════════════════════════════════════════════════════════════════════
// Health & Metrics
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

pub async fn prometheus_metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        crate::observability::metrics::render(),
    )
}

// ═══════════════════════════════════════════════════════════════════════════════
// Helpers
// ═══════════════════════════════════════════════════════════════════════════════

/// Run the full filter/sort/project/paginate pipeline over `store`.
pub(crate) async fn find_with_features(
    store: &dyn RecordStore,
    params: Vec<(String, String)>,
    config: &QueryConfig,
) -> Result<Vec<Record>> {
    QueryFeatures::new(params, config).all()?.execute(store).await
}

/// Parse a path id the way `parseInt` would; anything else is a missing record.
pub(crate) fn path_id(raw: &str, entity: &str) -> Result<i64> {
    parse_leading_int(raw).ok_or_else(|| CalendarError::not_found(entity, raw))
}

/// Read a required integer id from a JSON body. Numeric strings are accepted.
pub(crate) fn required_id(body: &Record, field: &str) -> Result<i64> {
    match body.get(field) {
        None | Some(Value::Null) => Err(CalendarError::missing_field(field)),
        Some(Value::Number(n)) => n.as_i64().ok_or_else(|| invalid_id(field)),
        Some(Value::String(s)) => parse_leading_int(s).ok_or_else(|| invalid_id(field)),
        Some(_) => Err(invalid_id(field)),
    }
}

fn invalid_id(field: &str) -> CalendarError {
    CalendarError::new(ErrorCode::InvalidInput, format!("{} must be an integer id", field))
        .with_context("field", field)
}

/// Serialize a request struct into record fields.
pub(crate) fn to_record<T: Serialize>(value: &T) -> Result<Record> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        _ => Err(CalendarError::internal("Record fields must serialize to an object")),
    }
}

/// Current time as stored in records.
pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
