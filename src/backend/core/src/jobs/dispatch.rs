//! Routes notification jobs to their named queue.

use std::sync::Arc;

use super::delivery::NotificationHandler;
use super::job::{JobHandler, JobId, RetryPolicy};
use super::payload::{JobKind, NotificationJob};
use super::queue::{
    InMemoryQueueBackend, JobQueue, QueueConfig, QueueStats, QueuedJob, RedisQueueBackend,
};
use super::worker::{JobWorker, WorkerConfig, WorkerHandle};
use crate::config::Config;
use crate::error::Result;

/// Owns one queue per [`JobKind`].
#[derive(Clone)]
pub struct Dispatcher {
    email: Arc<JobQueue>,
    sms: Arc<JobQueue>,
}

impl Dispatcher {
    pub fn new(email: Arc<JobQueue>, sms: Arc<JobQueue>) -> Self {
        Self { email, sms }
    }

    /// Process-local queues.
    pub fn in_memory(config: QueueConfig) -> Self {
        let queue = |kind| {
            let backend = Arc::new(InMemoryQueueBackend::with_retention(config.retain_finished));
            Arc::new(JobQueue::new(kind, backend, config.clone()))
        };
        Self::new(queue(JobKind::Email), queue(JobKind::Sms))
    }

    /// Queues shared through Redis.
    pub async fn redis(url: &str, key_prefix: &str, config: QueueConfig) -> Result<Self> {
        let conn = RedisQueueBackend::connect(url).await?;
        let queue = |kind| {
            let backend = Arc::new(RedisQueueBackend::new(conn.clone(), key_prefix, kind, &config));
            Arc::new(JobQueue::new(kind, backend, config.clone()))
        };
        Ok(Self::new(queue(JobKind::Email), queue(JobKind::Sms)))
    }

    /// Redis queues when `redis.url` is set, process-local otherwise.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let queue_config = QueueConfig {
            retry: RetryPolicy::with_attempts(config.worker.max_attempts),
            ..QueueConfig::default()
        };

        match config.redis.url.as_deref() {
            Some(url) => {
                tracing::info!(prefix = %config.redis.key_prefix, "Using Redis job queues");
                Self::redis(url, &config.redis.key_prefix, queue_config).await
            }
            None => {
                tracing::warn!("redis.url not set, job queues are local to this process");
                Ok(Self::in_memory(queue_config))
            }
        }
    }

    pub fn queue(&self, kind: JobKind) -> &Arc<JobQueue> {
        match kind {
            JobKind::Email => &self.email,
            JobKind::Sms => &self.sms,
        }
    }

    /// Enqueue a job on the queue matching its payload.
    pub async fn dispatch(&self, job: NotificationJob) -> Result<JobId> {
        self.queue(job.kind()).enqueue(job).await
    }

    /// Look up a job on a queue.
    pub async fn find(&self, kind: JobKind, id: JobId) -> Result<Option<QueuedJob>> {
        self.queue(kind).get(id).await
    }

    /// Statistics for every queue.
    pub async fn stats(&self) -> Result<Vec<(JobKind, QueueStats)>> {
        let mut all = Vec::with_capacity(JobKind::ALL.len());
        for kind in JobKind::ALL {
            all.push((kind, self.queue(kind).stats().await?));
        }
        Ok(all)
    }

    /// Start one worker per requested queue.
    pub fn spawn_workers(
        &self,
        kinds: &[JobKind],
        handler: Arc<dyn JobHandler>,
        config: &WorkerConfig,
    ) -> Vec<WorkerHandle> {
        kinds
            .iter()
            .map(|kind| {
                let config = WorkerConfig {
                    name: format!("{}-{}", config.name, kind),
                    ..config.clone()
                };
                JobWorker::new(self.queue(*kind).clone(), handler.clone(), config).start()
            })
            .collect()
    }

    /// Start log-only workers for every queue.
    pub fn spawn_logging_workers(&self, config: &WorkerConfig) -> Vec<WorkerHandle> {
        self.spawn_workers(&JobKind::ALL, Arc::new(NotificationHandler::logging()), config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dispatch_routes_by_kind() {
        let dispatcher = Dispatcher::in_memory(QueueConfig::default());

        let email = dispatcher
            .dispatch(NotificationJob::email("a@b.c", "Invite", "You were added"))
            .await
            .unwrap();
        dispatcher
            .dispatch(NotificationJob::sms("+4712345678", "Reminder"))
            .await
            .unwrap();

        assert_eq!(dispatcher.queue(JobKind::Email).len().await.unwrap(), 1);
        assert_eq!(dispatcher.queue(JobKind::Sms).len().await.unwrap(), 1);
        assert!(dispatcher.find(JobKind::Email, email).await.unwrap().is_some());
        assert!(dispatcher.find(JobKind::Sms, email).await.unwrap().is_none());

        let stats = dispatcher.stats().await.unwrap();
        assert_eq!(stats.len(), 2);
        assert!(stats.iter().all(|(_, s)| s.pending == 1));
    }
}
