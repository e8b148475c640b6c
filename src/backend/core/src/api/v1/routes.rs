//! V1 API routes.

use axum::{
    routing::{get, patch, post},
    Router,
};

use super::{admin, collaborators, edit_sessions, events, notifications, users};
use crate::api::AppState;

/// V1 API prefix.
pub const V1_PREFIX: &str = "/api/v1";

/// Build the V1 API router.
///
/// # Endpoints
///
/// ## Events
/// - `GET /events` - List events (query features)
/// - `POST /events` - Create an event, emailing its collaborators
/// - `GET /events/:id` - Get an event with its edit sessions
/// - `PATCH /events/:id` - Update title, description or times
/// - `DELETE /events/:id` - Delete an event (creator only)
///
/// ## Collaborators
/// - `GET /collaborators`, `POST /collaborators`
/// - `GET /collaborators/:id`, `PATCH /collaborators/:id`, `DELETE /collaborators/:id`
///
/// ## Edit sessions
/// - `GET /editSession` - List sessions
/// - `POST /editSession` - Start a session
/// - `GET /editSession/:id`, `PATCH /editSession/:id` (record changes)
/// - `DELETE /editSession/:id` - End a session
///
/// ## Notifications
/// - `POST /notification` - Enqueue an SMS
///
/// ## Users
/// - `GET /users`, `GET /users/:id`
/// - `PATCH /users/deactivate/:id`, `PATCH /users/activate/:id` (admin)
///
/// ## Admin
/// - `GET /admin/queues` - Queue statistics
/// - `GET /admin/queues/:kind/jobs/:id` - Job status
pub fn v1_router() -> Router<AppState> {
    Router::new()
        // Events
        .route("/events", get(events::list_events).post(events::create_event))
        .route(
            "/events/:id",
            get(events::get_event)
                .patch(events::update_event)
                .delete(events::delete_event),
        )
        // Collaborators
        .route(
            "/collaborators",
            get(collaborators::list_collaborators).post(collaborators::create_collaborator),
        )
        .route(
            "/collaborators/:id",
            get(collaborators::get_collaborator)
                .patch(collaborators::update_collaborator)
                .delete(collaborators::delete_collaborator),
        )
        // Edit sessions
        .route(
            "/editSession",
            get(edit_sessions::list_sessions).post(edit_sessions::start_session),
        )
        .route(
            "/editSession/:id",
            get(edit_sessions::get_session)
                .patch(edit_sessions::update_changes)
                .delete(edit_sessions::end_session),
        )
        // Notifications
        .route("/notification", post(notifications::send_notification))
        // Users
        .route("/users", get(users::list_users))
        .route("/users/:id", get(users::get_user))
        .route("/users/deactivate/:id", patch(users::deactivate_user))
        .route("/users/activate/:id", patch(users::activate_user))
        // Admin
        .route("/admin/queues", get(admin::queue_stats))
        .route("/admin/queues/:kind/jobs/:id", get(admin::get_job))
}
