//! Queue administration. Every handler requires the admin role.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;

use crate::api::{ApiResponse, AppState};
use crate::error::{CalendarError, ErrorCode, Result};
use crate::jobs::{JobId, JobKind, QueueStats, QueuedJob};
use crate::middleware::AuthUser;

#[derive(Debug, Serialize)]
pub struct QueueSummary {
    pub queue: &'static str,
    #[serde(flatten)]
    pub stats: QueueStats,
}

pub async fn queue_stats(
    State(state): State<AppState>,
    caller: AuthUser,
) -> Result<Json<ApiResponse<Vec<QueueSummary>>>> {
    caller.require_admin()?;
    let summaries = state
        .dispatcher
        .stats()
        .await?
        .into_iter()
        .map(|(kind, stats)| QueueSummary {
            queue: kind.queue_name(),
            stats,
        })
        .collect();
    Ok(Json(ApiResponse::list(summaries)))
}

pub async fn get_job(
    State(state): State<AppState>,
    caller: AuthUser,
    Path((kind, id)): Path<(String, String)>,
) -> Result<Json<ApiResponse<QueuedJob>>> {
    caller.require_admin()?;
    let kind: JobKind = kind.parse()?;
    let job_id = JobId::parse(&id).ok_or_else(|| {
        CalendarError::new(ErrorCode::InvalidInput, "Job id must be a UUID").with_context("id", &id)
    })?;

    let job = state
        .dispatcher
        .find(kind, job_id)
        .await?
        .ok_or_else(|| CalendarError::job_not_found(job_id))?;
    Ok(Json(ApiResponse::success(job)))
}
