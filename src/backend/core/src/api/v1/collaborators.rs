//! Collaborator handlers.

use std::fmt;
use std::str::FromStr;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::handlers::{find_with_features, path_id, required_id};
use crate::api::{ApiResponse, AppState};
use crate::error::{CalendarError, ErrorCode, Result};
use crate::store::Record;

const ENTITY: &str = "Collaborator";

/// Access level a collaborator holds on an event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CollaboratorRole {
    #[default]
    Viewer,
    Editor,
    Admin,
}

impl CollaboratorRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Viewer => "VIEWER",
            Self::Editor => "EDITOR",
            Self::Admin => "ADMIN",
        }
    }
}

impl fmt::Display for CollaboratorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CollaboratorRole {
    type Err = CalendarError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "VIEWER" => Ok(Self::Viewer),
            "EDITOR" => Ok(Self::Editor),
            "ADMIN" => Ok(Self::Admin),
            other => Err(CalendarError::new(
                ErrorCode::InvalidInput,
                format!("Unknown collaborator role: {}", other),
            )
            .with_context("allowed", ["VIEWER", "EDITOR", "ADMIN"])),
        }
    }
}

/// Normalize an optional `role` value in a request body.
fn parse_role(body: &Record) -> Result<Option<CollaboratorRole>> {
    match body.get("role") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => s.parse().map(Some),
        Some(_) => Err(CalendarError::new(ErrorCode::InvalidInput, "role must be a string")),
    }
}

pub async fn list_collaborators(
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Json<ApiResponse<Vec<Record>>>> {
    let collaborators =
        find_with_features(state.collections.collaborators.as_ref(), params, &state.query).await?;
    if collaborators.is_empty() {
        return Err(CalendarError::new(ErrorCode::RecordNotFound, "No collaborators found"));
    }
    Ok(Json(ApiResponse::list(collaborators)))
}

pub async fn get_collaborator(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Record>>> {
    let id = path_id(&id, ENTITY)?;
    let collaborator = state
        .collections
        .collaborators
        .find_by_id(id)
        .await?
        .ok_or_else(|| CalendarError::not_found(ENTITY, id.to_string()))?;
    Ok(Json(ApiResponse::success(collaborator)))
}

pub async fn create_collaborator(
    State(state): State<AppState>,
    Json(body): Json<Record>,
) -> Result<(StatusCode, Json<ApiResponse<Record>>)> {
    let user_id = required_id(&body, "userId")?;
    let event_id = required_id(&body, "eventId")?;
    let role = parse_role(&body)?.unwrap_or_default();

    let mut fields = Record::new();
    fields.insert("userId".into(), user_id.into());
    fields.insert("eventId".into(), event_id.into());
    fields.insert("role".into(), role.as_str().into());

    let collaborator = state.collections.collaborators.insert(fields).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(collaborator))))
}

pub async fn update_collaborator(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(mut body): Json<Record>,
) -> Result<Json<ApiResponse<Record>>> {
    let id = path_id(&id, ENTITY)?;
    if body.is_empty() {
        return Err(CalendarError::validation("No data provided"));
    }

    if let Some(role) = parse_role(&body)? {
        body.insert("role".into(), role.as_str().into());
    }
    for field in ["userId", "eventId"] {
        if body.contains_key(field) {
            let value = required_id(&body, field)?;
            body.insert(field.into(), value.into());
        }
    }

    let collaborator = state
        .collections
        .collaborators
        .update(id, body)
        .await?
        .ok_or_else(|| CalendarError::not_found(ENTITY, id.to_string()))?;
    Ok(Json(ApiResponse::success(collaborator)))
}

pub async fn delete_collaborator(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<()>>> {
    let id = path_id(&id, ENTITY)?;
    if !state.collections.collaborators.delete(id).await? {
        return Err(CalendarError::not_found(ENTITY, id.to_string()));
    }
    Ok(Json(ApiResponse::message("Collaborator deleted successfully")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_role_parse() {
        assert_eq!("editor".parse::<CollaboratorRole>().unwrap(), CollaboratorRole::Editor);
        assert_eq!(CollaboratorRole::default(), CollaboratorRole::Viewer);
        assert!("OWNER".parse::<CollaboratorRole>().is_err());
    }

    #[test]
    fn test_parse_role_from_body() {
        let body = json!({"role": "ADMIN"}).as_object().cloned().unwrap();
        assert_eq!(parse_role(&body).unwrap(), Some(CollaboratorRole::Admin));

        let body = json!({"role": 3}).as_object().cloned().unwrap();
        assert!(parse_role(&body).is_err());

        assert_eq!(parse_role(&Record::new()).unwrap(), None);
    }
}
