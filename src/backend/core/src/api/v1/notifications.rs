//! Notification handler.

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use crate::api::{ApiResponse, AppState};
use crate::error::{CalendarError, Result};
use crate::jobs::{JobId, NotificationJob};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRequest {
    pub phone_number: Option<String>,
    pub message: Option<String>,
    pub from: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationAccepted {
    pub job_id: JobId,
    pub queue: &'static str,
}

/// Enqueue an SMS and return before it is delivered.
///
/// Delivery failures are recorded on the job, never reported here.
pub async fn send_notification(
    State(state): State<AppState>,
    Json(req): Json<NotificationRequest>,
) -> Result<(StatusCode, Json<ApiResponse<NotificationAccepted>>)> {
    let phone_number = req
        .phone_number
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| CalendarError::missing_field("phoneNumber"))?;
    let message = req
        .message
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| CalendarError::missing_field("message"))?;

    let mut job = NotificationJob::sms(phone_number, message);
    if let Some(from) = req.from {
        job = job.from_sender(from);
    }
    let queue = job.kind().queue_name();
    let job_id = state.dispatcher.dispatch(job).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::success(NotificationAccepted { job_id, queue })),
    ))
}
