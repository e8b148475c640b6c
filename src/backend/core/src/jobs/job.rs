//! Job definitions and traits.
//!
//! This module provides the core abstractions for background notification jobs:
//!
//! - **JobHandler trait**: The interface a queue consumer implements
//! - **JobStatus**: Lifecycle of a job (`pending → running → completed | failed`)
//! - **JobContext**: Context passed to handlers during execution
//! - **RetryPolicy**: Re-enqueue behavior, off by default

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::payload::{JobKind, NotificationJob};
use crate::error::CalendarError;

// ═══════════════════════════════════════════════════════════════════════════════
// Job Identification
// ═══════════════════════════════════════════════════════════════════════════════

/// Unique identifier for a job instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    /// Create a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse from the textual form.
    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for JobId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Job Status
// ═══════════════════════════════════════════════════════════════════════════════

/// Status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job is waiting in the queue
    Pending,
    /// Job has been claimed by a worker
    Running,
    /// Job completed successfully
    Completed,
    /// Job failed and will not run again
    Failed,
}

impl JobStatus {
    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Job Error
// ═══════════════════════════════════════════════════════════════════════════════

/// Error type for job execution failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobError {
    /// Error message
    pub message: String,
    /// Whether this error is retryable
    pub retryable: bool,
    /// Optional error code
    pub code: Option<String>,
}

impl JobError {
    /// Create a new retryable error.
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
            code: None,
        }
    }

    /// Create a new non-retryable (fatal) error.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
            code: None,
        }
    }

    /// Add an error code.
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(code) = &self.code {
            write!(f, " (code: {})", code)?;
        }
        Ok(())
    }
}

impl std::error::Error for JobError {}

impl From<CalendarError> for JobError {
    fn from(error: CalendarError) -> Self {
        let message = match error.internal_message() {
            Some(internal) => format!("{}: {}", error.user_message(), internal),
            None => error.user_message().to_string(),
        };
        Self {
            message,
            retryable: error.is_retryable(),
            code: Some(error.code().to_string()),
        }
    }
}

/// Result type for job execution.
pub type JobResult = std::result::Result<(), JobError>;

// ═══════════════════════════════════════════════════════════════════════════════
// Retry Policy
// ═══════════════════════════════════════════════════════════════════════════════

/// Configuration for job retry behavior.
///
/// The default makes a single attempt: a job that fails once stays failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts allowed, the first run included
    pub max_attempts: u32,
    /// Whether to retry on any error or only retryable errors
    pub retry_on_any_error: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::no_retry()
    }
}

impl RetryPolicy {
    /// Create a policy with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            retry_on_any_error: false,
        }
    }

    /// Create a policy allowing `max_attempts` runs in total.
    pub fn with_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            retry_on_any_error: false,
        }
    }

    /// Check if another attempt should be made after `attempts` runs.
    pub fn should_retry(&self, attempts: u32, error: &JobError) -> bool {
        if attempts >= self.max_attempts {
            return false;
        }

        self.retry_on_any_error || error.retryable
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Job Metadata
// ═══════════════════════════════════════════════════════════════════════════════

/// Metadata associated with a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobMetadata {
    /// Unique job identifier
    pub id: JobId,
    /// Queue the job belongs to
    pub kind: JobKind,
    /// Current status
    pub status: JobStatus,
    /// Number of execution attempts
    pub attempts: u32,
    /// Maximum attempts allowed
    pub max_attempts: u32,
    /// When the job was created
    pub created_at: DateTime<Utc>,
    /// When the job last started executing
    pub started_at: Option<DateTime<Utc>>,
    /// When the job finished (success or failure)
    pub finished_at: Option<DateTime<Utc>>,
    /// Last error message (if failed)
    pub last_error: Option<String>,
}

impl JobMetadata {
    /// Create new metadata for a job.
    pub fn new(kind: JobKind) -> Self {
        Self {
            id: JobId::new(),
            kind,
            status: JobStatus::Pending,
            attempts: 0,
            max_attempts: 1,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            last_error: None,
        }
    }

    /// Set the maximum attempts.
    pub fn with_max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = max.max(1);
        self
    }

    /// Mark as running.
    pub fn mark_running(&mut self) {
        self.status = JobStatus::Running;
        self.started_at = Some(Utc::now());
        self.attempts += 1;
    }

    /// Mark as completed.
    pub fn mark_completed(&mut self) {
        self.status = JobStatus::Completed;
        self.finished_at = Some(Utc::now());
    }

    /// Mark as failed.
    pub fn mark_failed(&mut self, error: &str) {
        self.status = JobStatus::Failed;
        self.finished_at = Some(Utc::now());
        self.last_error = Some(error.to_string());
    }

    /// Put the job back in line for another attempt.
    pub fn mark_pending(&mut self, error: &str) {
        self.status = JobStatus::Pending;
        self.last_error = Some(error.to_string());
    }

    /// Get the duration if finished.
    pub fn duration(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Job Context
// ═══════════════════════════════════════════════════════════════════════════════

/// Context passed to handlers during execution.
#[derive(Debug, Clone)]
pub struct JobContext {
    /// Job metadata
    pub metadata: JobMetadata,
}

impl JobContext {
    pub fn new(metadata: JobMetadata) -> Self {
        Self { metadata }
    }

    /// Get the job ID.
    pub fn job_id(&self) -> JobId {
        self.metadata.id
    }

    /// Get the queue name.
    pub fn queue(&self) -> &'static str {
        self.metadata.kind.queue_name()
    }

    /// Get the current attempt number (1-indexed).
    pub fn attempt(&self) -> u32 {
        self.metadata.attempts
    }

    /// Log an error associated with this job.
    pub fn log_error(&self, message: &str) {
        tracing::error!(
            job_id = %self.metadata.id,
            queue = self.queue(),
            attempt = self.metadata.attempts,
            message
        );
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Job Handler Trait
// ═══════════════════════════════════════════════════════════════════════════════

/// A queue consumer: performs the side effect a job describes.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Execute one job.
    ///
    /// # Errors
    ///
    /// Return a `JobError` if delivery fails. Use `JobError::retryable()` for
    /// transient failures and `JobError::fatal()` for permanent ones; either
    /// way the error is recorded on the job and never reaches the producer.
    async fn handle(&self, job: &NotificationJob, ctx: &JobContext) -> JobResult;
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn test_job_id() {
        let id1 = JobId::new();
        let id2 = JobId::new();
        assert_ne!(id1, id2);
        assert_eq!(JobId::parse(&id1.to_string()), Some(id1));
        assert_eq!(JobId::parse("not-a-uuid"), None);
    }

    #[test]
    fn test_job_status() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert_eq!(JobStatus::Running.to_string(), "running");
    }

    #[test]
    fn test_default_policy_never_retries() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 1);
        assert!(!policy.should_retry(1, &JobError::retryable("smtp down")));
    }

    #[test]
    fn test_retry_policy() {
        let policy = RetryPolicy::with_attempts(3);

        let retryable_error = JobError::retryable("temporary failure");
        let fatal_error = JobError::fatal("permanent failure");

        assert!(policy.should_retry(1, &retryable_error));
        assert!(policy.should_retry(2, &retryable_error));
        assert!(!policy.should_retry(3, &retryable_error));

        assert!(!policy.should_retry(1, &fatal_error));

        let any = RetryPolicy { retry_on_any_error: true, ..policy };
        assert!(any.should_retry(1, &fatal_error));
    }

    #[test]
    fn test_job_metadata_lifecycle() {
        let mut metadata = JobMetadata::new(JobKind::Email).with_max_attempts(2);
        assert_eq!(metadata.status, JobStatus::Pending);

        metadata.mark_running();
        assert_eq!(metadata.status, JobStatus::Running);
        assert_eq!(metadata.attempts, 1);

        metadata.mark_pending("smtp timeout");
        assert_eq!(metadata.status, JobStatus::Pending);

        metadata.mark_running();
        metadata.mark_failed("smtp timeout");
        assert_eq!(metadata.status, JobStatus::Failed);
        assert_eq!(metadata.attempts, 2);
        assert!(metadata.duration().is_some());
    }

    #[test]
    fn test_job_error_from_calendar_error() {
        let error = CalendarError::with_internal(ErrorCode::DeliveryFailed, "Delivery failed", "550 mailbox");
        let job_error = JobError::from(error);
        assert!(job_error.retryable);
        assert_eq!(job_error.code.as_deref(), Some("DeliveryFailed"));
        assert!(job_error.message.contains("550 mailbox"));
    }
}
