//! V1 API: events, collaborators, edit sessions, notifications, users and
//! queue administration.

pub mod admin;
pub mod collaborators;
pub mod edit_sessions;
pub mod events;
pub mod notifications;
pub mod routes;
pub mod users;

pub use routes::{v1_router, V1_PREFIX};
