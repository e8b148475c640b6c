//! User handlers.
//!
//! Accounts are provisioned elsewhere; this API reads them and toggles their
//! `active` flag.

use axum::{
    extract::{Path, Query, State},
    Json,
};

use crate::api::handlers::{find_with_features, path_id};
use crate::api::{ApiResponse, AppState};
use crate::error::{CalendarError, Result};
use crate::middleware::AuthUser;
use crate::store::Record;

const ENTITY: &str = "User";

/// Fields never returned by the user endpoints.
const HIDDEN_FIELDS: &[&str] = &[
    "password",
    "passwordResetToken",
    "passwordResetExpiresAt",
    "hashedRandomToken",
    "emailTokenExpiresAt",
];

fn redact(mut user: Record) -> Record {
    for field in HIDDEN_FIELDS {
        user.remove(*field);
    }
    user
}

pub async fn list_users(
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Json<ApiResponse<Vec<Record>>>> {
    let users = find_with_features(state.collections.users.as_ref(), params, &state.query).await?;
    Ok(Json(ApiResponse::list(users.into_iter().map(redact).collect())))
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Record>>> {
    let id = path_id(&id, ENTITY)?;
    let user = state
        .collections
        .users
        .find_by_id(id)
        .await?
        .ok_or_else(|| CalendarError::not_found(ENTITY, id.to_string()))?;
    Ok(Json(ApiResponse::success(redact(user))))
}

/// Users may deactivate themselves; admins may deactivate anyone.
pub async fn deactivate_user(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<()>>> {
    let id = path_id(&id, ENTITY)?;
    if caller.id != id {
        caller.require_admin()?;
    }
    set_active(&state, id, "INACTIVE").await?;
    Ok(Json(ApiResponse::message("User deactivated successfully")))
}

pub async fn activate_user(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<()>>> {
    caller.require_admin()?;
    let id = path_id(&id, ENTITY)?;
    set_active(&state, id, "ACTIVE").await?;
    Ok(Json(ApiResponse::message("User activated successfully")))
}

async fn set_active(state: &AppState, id: i64, active: &str) -> Result<()> {
    let mut patch = Record::new();
    patch.insert("active".into(), active.into());
    state
        .collections
        .users
        .update(id, patch)
        .await?
        .ok_or_else(|| CalendarError::not_found(ENTITY, id.to_string()))?;
    tracing::info!(user_id = id, active, "User status changed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_redact() {
        let user = json!({"id": 1, "name": "Ada", "password": "hash"})
            .as_object()
            .cloned()
            .unwrap();
        let user = redact(user);
        assert!(user.contains_key("name"));
        assert!(!user.contains_key("password"));
    }
}
