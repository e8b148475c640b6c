//! Event handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::handlers::{find_with_features, path_id, to_record};
use crate::api::{ApiResponse, AppState};
use crate::error::{CalendarError, ErrorCode, Result};
use crate::jobs::NotificationJob;
use crate::middleware::AuthUser;
use crate::query::QueryRequest;
use crate::store::{record_id, Record};

const ENTITY: &str = "Event";

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEventRequest {
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    /// Collaborator ids
    #[serde(default)]
    pub collaborators: Vec<i64>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEventRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
}

pub async fn list_events(
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Json<ApiResponse<Vec<Record>>>> {
    let events = find_with_features(state.collections.events.as_ref(), params, &state.query).await?;
    if events.is_empty() {
        return Err(CalendarError::new(ErrorCode::RecordNotFound, "No events found"));
    }
    Ok(Json(ApiResponse::list(events)))
}

pub async fn get_event(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Record>>> {
    let id = path_id(&id, ENTITY)?;
    let mut event = state
        .collections
        .events
        .find_by_id(id)
        .await?
        .ok_or_else(|| CalendarError::not_found(ENTITY, id.to_string()))?;

    let sessions = state
        .collections
        .edit_sessions
        .find_many(QueryRequest::where_eq("eventId", id.to_string()))
        .await?;
    event.insert("editSessions".into(), Value::Array(sessions.into_iter().map(Value::Object).collect()));

    Ok(Json(ApiResponse::success(event)))
}

/// Create an event owned by the caller and email each collaborator.
///
/// Notification failures are logged; the event is created regardless.
pub async fn create_event(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<CreateEventRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Record>>)> {
    let title = match req.title.as_deref().map(str::trim) {
        Some(title) if !title.is_empty() => title.to_string(),
        _ => return Err(CalendarError::missing_field("title")),
    };

    let mut fields = to_record(&req)?;
    fields.insert("createdBy".into(), user.id.into());
    let event = state.collections.events.insert(fields).await?;

    tracing::info!(event_id = ?record_id(&event), created_by = user.id, "Event created");

    if let Err(e) = notify_collaborators(&state, &user, &title, &req.collaborators).await {
        tracing::warn!(error = %e, "Error sending mail notification");
    }

    Ok((StatusCode::CREATED, Json(ApiResponse::success(event))))
}

async fn notify_collaborators(
    state: &AppState,
    creator: &AuthUser,
    title: &str,
    collaborator_ids: &[i64],
) -> Result<()> {
    let Some(creator_email) = creator.record.get("email").and_then(Value::as_str) else {
        return Ok(());
    };

    for &collaborator_id in collaborator_ids {
        let Some(collaborator) = state.collections.collaborators.find_by_id(collaborator_id).await? else {
            continue;
        };
        let Some(user_id) = collaborator.get("userId").and_then(Value::as_i64) else {
            continue;
        };
        let Some(user) = state.collections.users.find_by_id(user_id).await? else {
            continue;
        };
        let Some(email) = user.get("email").and_then(Value::as_str) else {
            continue;
        };

        let job = NotificationJob::email(
            email,
            "New Event Created",
            format!("A new event \"{}\" has been created by user {}.", title, creator_email),
        )
        .from_sender(creator_email);
        state.dispatcher.dispatch(job).await?;
    }
    Ok(())
}

pub async fn update_event(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateEventRequest>,
) -> Result<Json<ApiResponse<Record>>> {
    let id = path_id(&id, ENTITY)?;
    let event = state
        .collections
        .events
        .update(id, to_record(&req)?)
        .await?
        .ok_or_else(|| CalendarError::not_found(ENTITY, id.to_string()))?;
    Ok(Json(ApiResponse::success(event)))
}

/// Only the user who created an event may delete it.
pub async fn delete_event(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<()>>> {
    let id = path_id(&id, ENTITY)?;
    let event = state
        .collections
        .events
        .find_by_id(id)
        .await?
        .ok_or_else(|| CalendarError::not_found(ENTITY, id.to_string()))?;

    if event.get("createdBy").and_then(Value::as_i64) != Some(user.id) {
        return Err(CalendarError::forbidden("You are not authorized to delete this event"));
    }

    state.collections.events.delete(id).await?;
    tracing::info!(event_id = id, deleted_by = user.id, "Event deleted");
    Ok(Json(ApiResponse::message("Event deleted successfully")))
}
