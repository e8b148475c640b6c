//! Background notification jobs.
//!
//! Request handlers enqueue [`NotificationJob`]s and return immediately;
//! workers claim them from the named `email` and `sms` queues and deliver
//! them out of band.
//!
//! - **Payload**: Discriminated job payloads, one variant per queue
//! - **Queue**: FIFO queue with atomic claim, in memory or on Redis
//! - **Worker**: Concurrent execution with per-job timeout and graceful shutdown
//! - **Delivery**: Transport traits and the notification handler
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   dispatch    ┌──────────────┐    claim     ┌──────────────┐
//! │ HTTP handler │ ────────────▶ │  JobQueue    │ ───────────▶ │  JobWorker   │
//! │              │  (returns id) │ email | sms  │              │  + handler   │
//! └──────────────┘               └──────────────┘              └──────┬───────┘
//!                                       ▲                             │
//!                                       └──── complete / fail ────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use calendar_core::jobs::{Dispatcher, NotificationJob, QueueConfig, WorkerConfig};
//!
//! let dispatcher = Dispatcher::in_memory(QueueConfig::default());
//! let id = dispatcher.dispatch(NotificationJob::sms("+4712345678", "Reminder")).await?;
//!
//! let workers = dispatcher.spawn_logging_workers(&WorkerConfig::default());
//! ```

pub mod delivery;
pub mod dispatch;
pub mod job;
pub mod payload;
pub mod queue;
pub mod worker;

pub use delivery::{EmailTransport, LogTransport, NotificationHandler, SmsGateway};
pub use dispatch::Dispatcher;
pub use job::{
    JobContext, JobError, JobHandler, JobId, JobMetadata, JobResult, JobStatus, RetryPolicy,
};
pub use payload::{EmailPayload, JobKind, NotificationJob, SmsPayload};
pub use queue::{
    FailureDisposition, InMemoryQueueBackend, JobQueue, QueueBackend, QueueConfig, QueueStats,
    QueuedJob, RedisQueueBackend,
};
pub use worker::{JobOutcome, JobWorker, WorkerConfig, WorkerHandle, WorkerStats};
