#![allow(clippy::result_large_err)]
//! # Calendar Core
//!
//! Backend for a collaborative calendar: events, collaborators, edit
//! sessions and notifications over a JSON REST API.
//!
//! ## Architecture
//!
//! - **Query**: Turns flat query strings into filter/sort/projection/page requests
//! - **Store**: Record collections in memory or as Postgres JSONB documents
//! - **Jobs**: Email and SMS queues with out-of-band workers, in memory or on Redis
//! - **API**: Axum routes under `/api/v1`
//! - **Middleware**: Bearer token authentication and request tracing
//! - **Observability**: Structured logging, OpenTelemetry export and Prometheus metrics

pub mod api;
pub mod config;
pub mod error;
pub mod jobs;
pub mod middleware;
pub mod observability;
pub mod query;
pub mod store;

pub use error::{CalendarError, ErrorCode, ErrorContext, ErrorDetails, ErrorSeverity, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::api::{build_router, ApiResponse, AppState};
    pub use crate::config::Config;
    pub use crate::error::{CalendarError, ErrorCode, ErrorContext, Result};
    pub use crate::jobs::{
        Dispatcher, JobHandler, JobId, JobKind, JobQueue, JobStatus, JobWorker,
        NotificationHandler, NotificationJob, QueueConfig, WorkerConfig,
    };
    pub use crate::middleware::{AuthUser, Authenticator};
    pub use crate::query::{OperatorPolicy, QueryConfig, QueryFeatures, QueryRequest};
    pub use crate::store::{Collections, InMemoryStore, Record, RecordStore};
}
