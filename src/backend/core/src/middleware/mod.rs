//! HTTP middleware: bearer authentication and request tracing.
pub mod auth;
pub mod tracing;

pub use auth::{AuthUser, Authenticator, Claims, ADMIN_ROLE};
pub use self::tracing::{RequestId, TracingLayer, REQUEST_ID_HEADER};
