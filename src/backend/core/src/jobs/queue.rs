//! Named FIFO job queues with atomic claim.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::counter;
use parking_lot::Mutex;
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use super::job::{JobError, JobId, JobMetadata, JobStatus, RetryPolicy};
use super::payload::{JobKind, NotificationJob};
use crate::error::{CalendarError, ErrorCode, Result};

/// Configuration for a job queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Retry behavior for failed jobs
    pub retry: RetryPolicy,
    /// Finished jobs kept for status polling (in-memory backend)
    pub retain_finished: usize,
    /// Lifetime of finished job records in seconds (Redis backend)
    pub finished_ttl_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            retain_finished: 10_000,
            finished_ttl_secs: 86_400,
        }
    }
}

/// A job in the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedJob {
    /// Job metadata
    pub metadata: JobMetadata,
    /// What to deliver
    pub payload: NotificationJob,
    /// When the job was enqueued
    pub enqueued_at: DateTime<Utc>,
}

impl QueuedJob {
    pub fn new(payload: NotificationJob, retry: &RetryPolicy) -> Self {
        Self {
            metadata: JobMetadata::new(payload.kind()).with_max_attempts(retry.max_attempts),
            payload,
            enqueued_at: Utc::now(),
        }
    }

    pub fn id(&self) -> JobId {
        self.metadata.id
    }
}

/// Queue statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Jobs waiting to be claimed
    pub pending: usize,
    /// Jobs claimed and not yet finished
    pub running: usize,
    /// Jobs completed (total)
    pub completed: u64,
    /// Jobs failed for good (total)
    pub failed: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Backend Trait
// ═══════════════════════════════════════════════════════════════════════════════

/// Storage for one named queue.
#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Append a job to the tail of the queue.
    async fn push(&self, job: QueuedJob) -> Result<()>;

    /// Take the head job and mark it running.
    ///
    /// A given job is handed to at most one caller, even across processes.
    async fn claim(&self) -> Result<Option<QueuedJob>>;

    /// Record a claimed job as completed.
    async fn complete(&self, job: &QueuedJob) -> Result<()>;

    /// Record a claimed job as failed.
    async fn fail(&self, job: &QueuedJob) -> Result<()>;

    /// Return a claimed job to the tail of the queue.
    async fn requeue(&self, job: &QueuedJob) -> Result<()>;

    /// Look up a job by id.
    async fn get(&self, id: JobId) -> Result<Option<QueuedJob>>;

    /// Get queue statistics.
    async fn stats(&self) -> Result<QueueStats>;

    /// Get the number of waiting jobs.
    async fn len(&self) -> Result<usize>;

    /// Check if the queue is empty.
    async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// In-Memory Backend
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Default)]
struct MemoryState {
    waiting: VecDeque<JobId>,
    active: HashSet<JobId>,
    jobs: HashMap<JobId, QueuedJob>,
    finished: VecDeque<JobId>,
    completed: u64,
    failed: u64,
}

impl MemoryState {
    fn finish(&mut self, job: &QueuedJob, retain: usize) {
        self.active.remove(&job.id());
        self.jobs.insert(job.id(), job.clone());
        self.finished.push_back(job.id());
        while self.finished.len() > retain {
            if let Some(old) = self.finished.pop_front() {
                self.jobs.remove(&old);
            }
        }
    }
}

/// In-memory queue backend for testing and single-process deployments.
pub struct InMemoryQueueBackend {
    state: Mutex<MemoryState>,
    retain_finished: usize,
}

impl InMemoryQueueBackend {
    pub fn new() -> Self {
        Self::with_retention(QueueConfig::default().retain_finished)
    }

    pub fn with_retention(retain_finished: usize) -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            retain_finished,
        }
    }
}

impl Default for InMemoryQueueBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueueBackend for InMemoryQueueBackend {
    async fn push(&self, job: QueuedJob) -> Result<()> {
        let mut state = self.state.lock();
        state.waiting.push_back(job.id());
        state.jobs.insert(job.id(), job);
        Ok(())
    }

    async fn claim(&self) -> Result<Option<QueuedJob>> {
        let mut state = self.state.lock();
        while let Some(id) = state.waiting.pop_front() {
            if let Some(job) = state.jobs.get_mut(&id) {
                job.metadata.mark_running();
                let claimed = job.clone();
                state.active.insert(id);
                return Ok(Some(claimed));
            }
        }
        Ok(None)
    }

    async fn complete(&self, job: &QueuedJob) -> Result<()> {
        let mut state = self.state.lock();
        state.completed += 1;
        state.finish(job, self.retain_finished);
        Ok(())
    }

    async fn fail(&self, job: &QueuedJob) -> Result<()> {
        let mut state = self.state.lock();
        state.failed += 1;
        state.finish(job, self.retain_finished);
        Ok(())
    }

    async fn requeue(&self, job: &QueuedJob) -> Result<()> {
        let mut state = self.state.lock();
        state.active.remove(&job.id());
        state.jobs.insert(job.id(), job.clone());
        state.waiting.push_back(job.id());
        Ok(())
    }

    async fn get(&self, id: JobId) -> Result<Option<QueuedJob>> {
        Ok(self.state.lock().jobs.get(&id).cloned())
    }

    async fn stats(&self) -> Result<QueueStats> {
        let state = self.state.lock();
        Ok(QueueStats {
            pending: state.waiting.len(),
            running: state.active.len(),
            completed: state.completed,
            failed: state.failed,
        })
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.state.lock().waiting.len())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Redis Backend
// ═══════════════════════════════════════════════════════════════════════════════

/// Redis-backed queue backend shared by producer and worker processes.
///
/// Keys, for prefix `calendar` and queue `email`:
/// - `calendar:email:wait`: list of waiting job ids
/// - `calendar:email:active`: list of claimed job ids
/// - `calendar:email:job:<id>`: hash with `data` (JSON) and `status`
/// - `calendar:email:completed` / `calendar:email:failed`: counters
///
/// A claim is a single `LMOVE` from `wait` to `active`, so two workers can
/// never pop the same id.
pub struct RedisQueueBackend {
    conn: ConnectionManager,
    prefix: String,
    finished_ttl_secs: u64,
}

impl RedisQueueBackend {
    /// Create a backend for `kind` on an existing connection.
    pub fn new(conn: ConnectionManager, key_prefix: &str, kind: JobKind, config: &QueueConfig) -> Self {
        Self {
            conn,
            prefix: format!("{}:{}", key_prefix, kind.queue_name()),
            finished_ttl_secs: config.finished_ttl_secs,
        }
    }

    /// Open a managed connection for queue backends.
    pub async fn connect(url: &str) -> Result<ConnectionManager> {
        let client = redis::Client::open(url).map_err(|e| {
            CalendarError::with_internal(
                ErrorCode::InvalidConfiguration,
                "Invalid Redis URL",
                e.to_string(),
            )
        })?;

        ConnectionManager::new(client).await.map_err(|e| {
            CalendarError::with_internal(
                ErrorCode::QueueConnectionFailed,
                "Failed to get Redis connection for job queue",
                e.to_string(),
            )
        })
    }

    fn wait_key(&self) -> String {
        format!("{}:wait", self.prefix)
    }

    fn active_key(&self) -> String {
        format!("{}:active", self.prefix)
    }

    fn job_key(&self, id: &str) -> String {
        format!("{}:job:{}", self.prefix, id)
    }

    fn counter_key(&self, name: &str) -> String {
        format!("{}:{}", self.prefix, name)
    }

    async fn finish(&self, job: &QueuedJob, counter: &str) -> Result<()> {
        let id = job.id().to_string();
        let data = serde_json::to_string(job)?;
        let mut conn = self.conn.clone();

        redis::pipe()
            .atomic()
            .cmd("HSET")
            .arg(self.job_key(&id))
            .arg("data")
            .arg(&data)
            .arg("status")
            .arg(job.metadata.status.as_str())
            .ignore()
            .cmd("EXPIRE")
            .arg(self.job_key(&id))
            .arg(self.finished_ttl_secs)
            .ignore()
            .cmd("LREM")
            .arg(self.active_key())
            .arg(1)
            .arg(&id)
            .ignore()
            .cmd("INCR")
            .arg(self.counter_key(counter))
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl QueueBackend for RedisQueueBackend {
    async fn push(&self, job: QueuedJob) -> Result<()> {
        let _span = tracing::info_span!("redis_queue_push", queue = %self.prefix);
        let _guard = _span.enter();

        let id = job.id().to_string();
        let data = serde_json::to_string(&job)?;
        let mut conn = self.conn.clone();

        redis::pipe()
            .atomic()
            .cmd("HSET")
            .arg(self.job_key(&id))
            .arg("data")
            .arg(&data)
            .arg("status")
            .arg(job.metadata.status.as_str())
            .ignore()
            .cmd("RPUSH")
            .arg(self.wait_key())
            .arg(&id)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await?;

        tracing::debug!(queue = %self.prefix, job_id = %id, "Job enqueued");
        Ok(())
    }

    async fn claim(&self) -> Result<Option<QueuedJob>> {
        let mut conn = self.conn.clone();

        let id: Option<String> = redis::cmd("LMOVE")
            .arg(self.wait_key())
            .arg(self.active_key())
            .arg("LEFT")
            .arg("RIGHT")
            .query_async::<_, Option<String>>(&mut conn)
            .await?;

        let Some(id) = id else {
            return Ok(None);
        };

        let data: Option<String> = redis::cmd("HGET")
            .arg(self.job_key(&id))
            .arg("data")
            .query_async::<_, Option<String>>(&mut conn)
            .await?;

        let Some(data) = data else {
            tracing::warn!(queue = %self.prefix, job_id = %id, "Claimed job has no record, dropping");
            redis::cmd("LREM")
                .arg(self.active_key())
                .arg(1)
                .arg(&id)
                .query_async::<_, i64>(&mut conn)
                .await?;
            return Ok(None);
        };

        let mut job: QueuedJob = serde_json::from_str(&data)?;
        job.metadata.mark_running();

        redis::cmd("HSET")
            .arg(self.job_key(&id))
            .arg("data")
            .arg(serde_json::to_string(&job)?)
            .arg("status")
            .arg(job.metadata.status.as_str())
            .query_async::<_, i64>(&mut conn)
            .await?;

        tracing::debug!(queue = %self.prefix, job_id = %id, "Job claimed");
        Ok(Some(job))
    }

    async fn complete(&self, job: &QueuedJob) -> Result<()> {
        self.finish(job, "completed").await
    }

    async fn fail(&self, job: &QueuedJob) -> Result<()> {
        self.finish(job, "failed").await
    }

    async fn requeue(&self, job: &QueuedJob) -> Result<()> {
        let id = job.id().to_string();
        let data = serde_json::to_string(job)?;
        let mut conn = self.conn.clone();

        redis::pipe()
            .atomic()
            .cmd("HSET")
            .arg(self.job_key(&id))
            .arg("data")
            .arg(&data)
            .arg("status")
            .arg(job.metadata.status.as_str())
            .ignore()
            .cmd("LREM")
            .arg(self.active_key())
            .arg(1)
            .arg(&id)
            .ignore()
            .cmd("RPUSH")
            .arg(self.wait_key())
            .arg(&id)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await?;

        Ok(())
    }

    async fn get(&self, id: JobId) -> Result<Option<QueuedJob>> {
        let mut conn = self.conn.clone();
        let data: Option<String> = redis::cmd("HGET")
            .arg(self.job_key(&id.to_string()))
            .arg("data")
            .query_async::<_, Option<String>>(&mut conn)
            .await?;

        match data {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    async fn stats(&self) -> Result<QueueStats> {
        let mut conn = self.conn.clone();
        let (pending, running, completed, failed): (usize, usize, Option<u64>, Option<u64>) =
            redis::pipe()
                .cmd("LLEN")
                .arg(self.wait_key())
                .cmd("LLEN")
                .arg(self.active_key())
                .cmd("GET")
                .arg(self.counter_key("completed"))
                .cmd("GET")
                .arg(self.counter_key("failed"))
                .query_async(&mut conn)
                .await?;

        Ok(QueueStats {
            pending,
            running,
            completed: completed.unwrap_or(0),
            failed: failed.unwrap_or(0),
        })
    }

    async fn len(&self) -> Result<usize> {
        let mut conn = self.conn.clone();
        let length: usize = redis::cmd("LLEN")
            .arg(self.wait_key())
            .query_async::<_, usize>(&mut conn)
            .await?;
        Ok(length)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Job Queue
// ═══════════════════════════════════════════════════════════════════════════════

/// What happened to a job after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDisposition {
    /// Returned to the queue for another attempt
    Requeued,
    /// Marked failed for good
    Failed,
}

/// One named queue: the producer and consumer entry point.
pub struct JobQueue {
    kind: JobKind,
    backend: Arc<dyn QueueBackend>,
    config: QueueConfig,
}

impl JobQueue {
    /// Create a new job queue with the given backend.
    pub fn new(kind: JobKind, backend: Arc<dyn QueueBackend>, config: QueueConfig) -> Self {
        Self {
            kind,
            backend,
            config,
        }
    }

    /// Create a new in-memory job queue.
    pub fn in_memory(kind: JobKind) -> Self {
        let config = QueueConfig::default();
        let backend = Arc::new(InMemoryQueueBackend::with_retention(config.retain_finished));
        Self::new(kind, backend, config)
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    pub fn name(&self) -> &'static str {
        self.kind.queue_name()
    }

    /// Append a job and return its id without waiting for delivery.
    pub async fn enqueue(&self, payload: NotificationJob) -> Result<JobId> {
        if payload.kind() != self.kind {
            return Err(CalendarError::with_internal(
                ErrorCode::InvalidInput,
                "Job sent to the wrong queue",
                format!("{} job on {} queue", payload.kind(), self.kind),
            ));
        }
        payload.validate()?;

        let job = QueuedJob::new(payload, &self.config.retry);
        let id = job.id();
        self.backend.push(job).await?;

        counter!("calendar_jobs_enqueued_total", "queue" => self.name()).increment(1);
        tracing::info!(queue = self.name(), job_id = %id, "Job enqueued");
        Ok(id)
    }

    /// Claim the next waiting job.
    pub async fn claim(&self) -> Result<Option<QueuedJob>> {
        self.backend.claim().await
    }

    /// Mark a claimed job completed.
    pub async fn complete(&self, mut job: QueuedJob) -> Result<QueuedJob> {
        job.metadata.mark_completed();
        self.backend.complete(&job).await?;
        Ok(job)
    }

    /// Record a failed attempt, requeueing when the retry policy allows.
    pub async fn fail(&self, mut job: QueuedJob, error: &JobError) -> Result<(QueuedJob, FailureDisposition)> {
        if self.config.retry.should_retry(job.metadata.attempts, error) {
            job.metadata.mark_pending(&error.to_string());
            self.backend.requeue(&job).await?;
            return Ok((job, FailureDisposition::Requeued));
        }

        job.metadata.mark_failed(&error.to_string());
        self.backend.fail(&job).await?;
        Ok((job, FailureDisposition::Failed))
    }

    /// Look up a job's current state.
    pub async fn get(&self, id: JobId) -> Result<Option<QueuedJob>> {
        self.backend.get(id).await
    }

    /// Current status of a job, if known.
    pub async fn status(&self, id: JobId) -> Result<Option<JobStatus>> {
        Ok(self.get(id).await?.map(|job| job.metadata.status))
    }

    /// Get queue statistics.
    pub async fn stats(&self) -> Result<QueueStats> {
        self.backend.stats().await
    }

    /// Get the number of waiting jobs.
    pub async fn len(&self) -> Result<usize> {
        self.backend.len().await
    }

    pub async fn is_empty(&self) -> Result<bool> {
        self.backend.is_empty().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = JobQueue::in_memory(JobKind::Sms);
        let first = queue.enqueue(NotificationJob::sms("+1", "one")).await.unwrap();
        let second = queue.enqueue(NotificationJob::sms("+2", "two")).await.unwrap();

        assert_eq!(queue.len().await.unwrap(), 2);
        assert_eq!(queue.claim().await.unwrap().unwrap().id(), first);
        assert_eq!(queue.claim().await.unwrap().unwrap().id(), second);
        assert!(queue.claim().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_claim_marks_running() {
        let queue = JobQueue::in_memory(JobKind::Email);
        let id = queue
            .enqueue(NotificationJob::email("a@b.c", "hello", "body"))
            .await
            .unwrap();

        let job = queue.claim().await.unwrap().unwrap();
        assert_eq!(job.metadata.status, JobStatus::Running);
        assert_eq!(job.metadata.attempts, 1);
        assert_eq!(queue.status(id).await.unwrap(), Some(JobStatus::Running));

        let stats = queue.stats().await.unwrap();
        assert_eq!(stats.pending, 0);
        assert_eq!(stats.running, 1);
    }

    #[tokio::test]
    async fn test_wrong_queue_rejected() {
        let queue = JobQueue::in_memory(JobKind::Email);
        let err = queue.enqueue(NotificationJob::sms("+1", "x")).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidInput);
        assert!(queue.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_retry_policy_requeues() {
        let config = QueueConfig {
            retry: RetryPolicy::with_attempts(2),
            ..QueueConfig::default()
        };
        let queue = JobQueue::new(JobKind::Sms, Arc::new(InMemoryQueueBackend::new()), config);
        queue.enqueue(NotificationJob::sms("+1", "x")).await.unwrap();

        let error = JobError::retryable("gateway timeout");
        let job = queue.claim().await.unwrap().unwrap();
        let (_, disposition) = queue.fail(job, &error).await.unwrap();
        assert_eq!(disposition, FailureDisposition::Requeued);

        let job = queue.claim().await.unwrap().unwrap();
        assert_eq!(job.metadata.attempts, 2);
        let (job, disposition) = queue.fail(job, &error).await.unwrap();
        assert_eq!(disposition, FailureDisposition::Failed);
        assert_eq!(job.metadata.status, JobStatus::Failed);

        let stats = queue.stats().await.unwrap();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.pending, 0);
    }

    #[tokio::test]
    async fn test_retention_evicts_oldest() {
        let backend = Arc::new(InMemoryQueueBackend::with_retention(1));
        let queue = JobQueue::new(JobKind::Sms, backend, QueueConfig::default());
        let a = queue.enqueue(NotificationJob::sms("+1", "a")).await.unwrap();
        let b = queue.enqueue(NotificationJob::sms("+2", "b")).await.unwrap();

        for _ in 0..2 {
            let job = queue.claim().await.unwrap().unwrap();
            queue.complete(job).await.unwrap();
        }

        assert!(queue.get(a).await.unwrap().is_none());
        assert_eq!(queue.status(b).await.unwrap(), Some(JobStatus::Completed));
    }
}
