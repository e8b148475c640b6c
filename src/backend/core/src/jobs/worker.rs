//! Job worker for concurrent job execution.

use futures::FutureExt;
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;

use super::job::{JobContext, JobError, JobHandler, JobId};
use super::queue::{FailureDisposition, JobQueue, QueuedJob};
use crate::config::WorkerSettings;
use crate::error::Result;

/// Configuration for the job worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Maximum concurrent job executions
    pub concurrency: usize,
    /// Poll interval when the queue is empty (milliseconds)
    pub poll_interval_ms: u64,
    /// Per-job execution limit
    #[serde(with = "humantime_serde")]
    pub job_timeout: Duration,
    /// Shutdown timeout (seconds)
    pub shutdown_timeout_secs: u64,
    /// Worker name/identifier
    pub name: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            poll_interval_ms: 500,
            job_timeout: Duration::from_secs(30),
            shutdown_timeout_secs: 30,
            name: "calendar-worker".to_string(),
        }
    }
}

impl WorkerConfig {
    /// Build from the `[worker]` config section.
    pub fn from_settings(settings: &WorkerSettings, name: impl Into<String>) -> Self {
        Self {
            concurrency: settings.concurrency.max(1),
            poll_interval_ms: settings.poll_interval_ms,
            job_timeout: settings.job_timeout,
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Statistics for the job worker.
#[derive(Debug, Clone, Default)]
pub struct WorkerStats {
    /// Total jobs processed
    pub processed: Arc<AtomicU64>,
    /// Total jobs succeeded
    pub succeeded: Arc<AtomicU64>,
    /// Total failed attempts
    pub failed: Arc<AtomicU64>,
    /// Currently running jobs
    pub active: Arc<AtomicU64>,
}

impl WorkerStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn succeeded(&self) -> u64 {
        self.succeeded.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn active(&self) -> u64 {
        self.active.load(Ordering::Relaxed)
    }
}

/// Result of running one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed(JobId),
    Failed { id: JobId, error: String },
    Requeued { id: JobId, error: String },
}

impl JobOutcome {
    pub fn job_id(&self) -> JobId {
        match self {
            Self::Completed(id) | Self::Failed { id, .. } | Self::Requeued { id, .. } => *id,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Completed(_) => "completed",
            Self::Failed { .. } => "failed",
            Self::Requeued { .. } => "requeued",
        }
    }
}

/// Handle for controlling a running worker.
pub struct WorkerHandle {
    shutdown: watch::Sender<bool>,
    stats: WorkerStats,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    /// Signal the worker to shut down gracefully.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Signal shutdown and wait for in-flight jobs to drain.
    pub async fn stop(self) {
        self.shutdown();
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Worker task ended abnormally");
        }
    }

    /// Get worker statistics.
    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }
}

/// Job worker that processes jobs from one queue.
#[derive(Clone)]
pub struct JobWorker {
    queue: Arc<JobQueue>,
    handler: Arc<dyn JobHandler>,
    config: WorkerConfig,
    stats: WorkerStats,
}

impl JobWorker {
    /// Create a new job worker.
    pub fn new(queue: Arc<JobQueue>, handler: Arc<dyn JobHandler>, config: WorkerConfig) -> Self {
        Self {
            queue,
            handler,
            config,
            stats: WorkerStats::new(),
        }
    }

    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    /// Claim and run the next job, if any.
    pub async fn process_next(&self) -> Result<Option<JobOutcome>> {
        match self.queue.claim().await? {
            Some(job) => self.run(job).await.map(Some),
            None => Ok(None),
        }
    }

    /// Run a claimed job to its next state. Handler errors, panics and
    /// timeouts are recorded on the job; only queue errors are returned.
    async fn run(&self, job: QueuedJob) -> Result<JobOutcome> {
        let queue = self.queue.name();
        let ctx = JobContext::new(job.metadata.clone());
        let id = job.id();

        self.stats.active.fetch_add(1, Ordering::Relaxed);
        let started = Instant::now();

        let handled = AssertUnwindSafe(self.handler.handle(&job.payload, &ctx)).catch_unwind();
        let result = match tokio::time::timeout(self.config.job_timeout, handled).await {
            Ok(Ok(result)) => result,
            Ok(Err(panic)) => Err(JobError::fatal(format!(
                "Job handler panicked: {}",
                panic_message(panic.as_ref())
            ))
            .with_code("JobPanicked")),
            Err(_) => Err(JobError::retryable(format!(
                "Job timed out after {:?}",
                self.config.job_timeout
            ))
            .with_code("JobTimeout")),
        };

        self.stats.active.fetch_sub(1, Ordering::Relaxed);
        self.stats.processed.fetch_add(1, Ordering::Relaxed);
        histogram!("calendar_job_duration_seconds", "queue" => queue)
            .record(started.elapsed().as_secs_f64());

        let outcome = match result {
            Ok(()) => {
                self.queue.complete(job).await?;
                self.stats.succeeded.fetch_add(1, Ordering::Relaxed);
                tracing::info!(queue, job_id = %id, attempt = ctx.attempt(), "Job completed");
                JobOutcome::Completed(id)
            }
            Err(error) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                let message = error.to_string();
                let (_, disposition) = self.queue.fail(job, &error).await?;
                match disposition {
                    FailureDisposition::Requeued => {
                        tracing::warn!(queue, job_id = %id, attempt = ctx.attempt(), error = %message, "Job failed, requeued");
                        JobOutcome::Requeued { id, error: message }
                    }
                    FailureDisposition::Failed => {
                        tracing::error!(queue, job_id = %id, attempt = ctx.attempt(), error = %message, "Job failed");
                        JobOutcome::Failed { id, error: message }
                    }
                }
            }
        };

        counter!("calendar_jobs_processed_total", "queue" => queue, "outcome" => outcome.label())
            .increment(1);
        Ok(outcome)
    }

    /// Start the worker loop, returning a handle for control.
    ///
    /// Dropping the handle stops the loop like [`WorkerHandle::shutdown`].
    pub fn start(self) -> WorkerHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let stats = self.stats.clone();

        let task = tokio::spawn(async move {
            let config = self.config.clone();
            let semaphore = Arc::new(Semaphore::new(config.concurrency));
            let poll_interval = Duration::from_millis(config.poll_interval_ms);

            tracing::info!(
                worker = %config.name,
                queue = self.queue.name(),
                concurrency = config.concurrency,
                "Job worker started"
            );

            loop {
                if *shutdown_rx.borrow() {
                    break;
                }

                let permit = tokio::select! {
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        continue;
                    }
                    permit = semaphore.clone().acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => break,
                    },
                };

                match self.queue.claim().await {
                    Ok(Some(job)) => {
                        let worker = self.clone();
                        tokio::spawn(async move {
                            let id = job.id();
                            if let Err(e) = worker.run(job).await {
                                tracing::error!(job_id = %id, error = %e, "Failed to record job result");
                            }
                            drop(permit);
                        });
                    }
                    Ok(None) => {
                        drop(permit);
                        tokio::select! {
                            changed = shutdown_rx.changed() => {
                                if changed.is_err() {
                                    break;
                                }
                            }
                            _ = tokio::time::sleep(poll_interval) => {}
                        }
                    }
                    Err(e) => {
                        drop(permit);
                        tracing::warn!(worker = %config.name, error = %e, "Failed to claim job");
                        tokio::select! {
                            changed = shutdown_rx.changed() => {
                                if changed.is_err() {
                                    break;
                                }
                            }
                            _ = tokio::time::sleep(poll_interval) => {}
                        }
                    }
                }
            }

            tracing::info!(worker = %config.name, "Worker shutting down");

            let drain = semaphore.acquire_many(config.concurrency as u32);
            let timeout = Duration::from_secs(config.shutdown_timeout_secs);
            if tokio::time::timeout(timeout, drain).await.is_err() {
                tracing::warn!(worker = %config.name, "In-flight jobs did not finish before shutdown timeout");
            }

            tracing::info!(worker = %config.name, "Worker stopped");
        });

        WorkerHandle {
            shutdown: shutdown_tx,
            stats,
            task,
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_config_default() {
        let config = WorkerConfig::default();
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.poll_interval_ms, 500);
        assert_eq!(config.job_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_worker_config_from_settings() {
        let settings = WorkerSettings {
            concurrency: 0,
            ..WorkerSettings::default()
        };
        let config = WorkerConfig::from_settings(&settings, "sms-worker");
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.name, "sms-worker");
    }

    #[test]
    fn test_worker_stats() {
        let stats = WorkerStats::new();
        assert_eq!(stats.processed(), 0);
        assert_eq!(stats.succeeded(), 0);
        assert_eq!(stats.failed(), 0);
        assert_eq!(stats.active(), 0);

        stats.processed.fetch_add(1, Ordering::Relaxed);
        assert_eq!(stats.processed(), 1);
    }

    #[test]
    fn test_panic_message() {
        let text: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(text.as_ref()), "boom");

        let owned: Box<dyn Any + Send> = Box::new(String::from("gateway down"));
        assert_eq!(panic_message(owned.as_ref()), "gateway down");

        let other: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(other.as_ref()), "unknown panic");
    }
}
