//! Edit session handlers.
//!
//! A session is active from its `startTime` until `endTime` is set. A user
//! edits at most one event at a time, and an event has at most one editor.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::Value;

use crate::api::handlers::{find_with_features, now_rfc3339, path_id, required_id};
use crate::api::{ApiResponse, AppState};
use crate::error::{CalendarError, ErrorCode, Result};
use crate::query::QueryRequest;
use crate::store::{Record, RecordStore};

const ENTITY: &str = "Edit session";

fn is_active(session: &Record) -> bool {
    matches!(session.get("endTime"), None | Some(Value::Null))
}

async fn has_active_session(store: &dyn RecordStore, field: &str, id: i64) -> Result<bool> {
    let sessions = store
        .find_many(QueryRequest::where_eq(field, id.to_string()))
        .await?;
    Ok(sessions.iter().any(is_active))
}

pub async fn list_sessions(
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Json<ApiResponse<Vec<Record>>>> {
    let sessions =
        find_with_features(state.collections.edit_sessions.as_ref(), params, &state.query).await?;
    if sessions.is_empty() {
        return Err(CalendarError::new(ErrorCode::RecordNotFound, "No edit sessions found"));
    }
    Ok(Json(ApiResponse::list(sessions)))
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Record>>> {
    let id = path_id(&id, ENTITY)?;
    let session = state
        .collections
        .edit_sessions
        .find_by_id(id)
        .await?
        .ok_or_else(|| CalendarError::not_found(ENTITY, id.to_string()))?;
    Ok(Json(ApiResponse::success(session)))
}

pub async fn start_session(
    State(state): State<AppState>,
    Json(body): Json<Record>,
) -> Result<(StatusCode, Json<ApiResponse<Record>>)> {
    let event_id = required_id(&body, "eventId")?;
    let user_id = required_id(&body, "userId")?;

    let store = state.collections.edit_sessions.as_ref();
    let _gate = state.session_gate.lock().await;
    if has_active_session(store, "eventId", event_id).await?
        || has_active_session(store, "userId", user_id).await?
    {
        return Err(CalendarError::new(
            ErrorCode::EditSessionActive,
            "An active edit session already exists for this user or event.",
        )
        .with_context("eventId", event_id)
        .with_context("userId", user_id));
    }

    let mut fields = Record::new();
    fields.insert("eventId".into(), event_id.into());
    fields.insert("userId".into(), user_id.into());
    fields.insert("startTime".into(), now_rfc3339().into());
    fields.insert("changes".into(), Value::Object(Record::new()));

    let session = store.insert(fields).await?;
    tracing::info!(event_id, user_id, "Edit session started");
    Ok((StatusCode::CREATED, Json(ApiResponse::success(session))))
}

/// Replace the recorded changes. Accepts `newChanges` or `changes`.
pub async fn update_changes(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(mut body): Json<Record>,
) -> Result<Json<ApiResponse<Record>>> {
    let id = path_id(&id, ENTITY)?;
    let changes = body
        .remove("newChanges")
        .or_else(|| body.remove("changes"))
        .ok_or_else(|| CalendarError::missing_field("newChanges"))?;

    let mut patch = Record::new();
    patch.insert("changes".into(), changes);

    let session = state
        .collections
        .edit_sessions
        .update(id, patch)
        .await?
        .ok_or_else(|| CalendarError::not_found(ENTITY, id.to_string()))?;
    Ok(Json(ApiResponse::success(session)))
}

pub async fn end_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Record>>> {
    let id = path_id(&id, ENTITY)?;

    let mut patch = Record::new();
    patch.insert("endTime".into(), now_rfc3339().into());

    let session = state
        .collections
        .edit_sessions
        .update(id, patch)
        .await?
        .ok_or_else(|| CalendarError::not_found(ENTITY, id.to_string()))?;
    tracing::info!(session_id = id, "Edit session ended");
    Ok(Json(ApiResponse::success(session)))
}
