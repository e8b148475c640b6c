//! Integration tests for the Redis queue backend.
//!
//! These need a running Redis server and are ignored by default:
//!
//! ```text
//! REDIS_URL=redis://127.0.0.1:6379 cargo test --test redis_queue_tests -- --ignored
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use calendar_core::jobs::{
    FailureDisposition, JobError, JobKind, JobQueue, JobStatus, NotificationJob, QueueConfig,
    RedisQueueBackend, RetryPolicy,
};
use redis::aio::ConnectionManager;
use uuid::Uuid;

struct RedisQueue {
    conn: ConnectionManager,
    prefix: String,
    queue: Arc<JobQueue>,
}

impl RedisQueue {
    async fn open(kind: JobKind, config: QueueConfig) -> Self {
        let url = std::env::var("REDIS_URL").expect("REDIS_URL must be set");
        let conn = RedisQueueBackend::connect(&url).await.unwrap();
        let prefix = format!("calendar-test-{}", Uuid::new_v4());
        let backend = RedisQueueBackend::new(conn.clone(), &prefix, kind, &config);
        Self {
            conn,
            prefix,
            queue: Arc::new(JobQueue::new(kind, Arc::new(backend), config)),
        }
    }

    async fn cleanup(mut self) {
        let pattern = format!("{}:*", self.prefix);
        let keys: Vec<String> = redis::cmd("KEYS")
            .arg(&pattern)
            .query_async(&mut self.conn)
            .await
            .unwrap();
        if !keys.is_empty() {
            redis::cmd("DEL")
                .arg(keys)
                .query_async::<_, i64>(&mut self.conn)
                .await
                .unwrap();
        }
    }
}

#[tokio::test]
#[ignore = "requires REDIS_URL"]
async fn test_redis_lifecycle_and_stats() {
    let redis = RedisQueue::open(JobKind::Email, QueueConfig::default()).await;
    let queue = redis.queue.clone();

    let done = queue
        .enqueue(NotificationJob::email("ada@example.com", "New Event Created", "Standup"))
        .await
        .unwrap();
    let broken = queue
        .enqueue(NotificationJob::email("grace@example.com", "New Event Created", "Retro"))
        .await
        .unwrap();
    assert_eq!(queue.status(done).await.unwrap(), Some(JobStatus::Pending));
    assert_eq!(queue.len().await.unwrap(), 2);

    let job = queue.claim().await.unwrap().unwrap();
    assert_eq!(job.id(), done);
    assert_eq!(queue.status(done).await.unwrap(), Some(JobStatus::Running));
    queue.complete(job).await.unwrap();

    let job = queue.claim().await.unwrap().unwrap();
    assert_eq!(job.id(), broken);
    let (_, disposition) = queue.fail(job, &JobError::fatal("smtp down")).await.unwrap();
    assert_eq!(disposition, FailureDisposition::Failed);

    assert!(queue.claim().await.unwrap().is_none());
    assert_eq!(queue.status(done).await.unwrap(), Some(JobStatus::Completed));
    let failed = queue.get(broken).await.unwrap().unwrap();
    assert_eq!(failed.metadata.status, JobStatus::Failed);
    assert_eq!(failed.metadata.last_error.as_deref(), Some("smtp down"));

    let stats = queue.stats().await.unwrap();
    assert_eq!((stats.pending, stats.running), (0, 0));
    assert_eq!((stats.completed, stats.failed), (1, 1));

    redis.cleanup().await;
}

#[tokio::test]
#[ignore = "requires REDIS_URL"]
async fn test_redis_requeue_returns_job_to_wait_list() {
    let config = QueueConfig {
        retry: RetryPolicy::with_attempts(2),
        ..QueueConfig::default()
    };
    let redis = RedisQueue::open(JobKind::Sms, config).await;
    let queue = redis.queue.clone();

    let id = queue
        .enqueue(NotificationJob::sms("+4712345678", "Reminder"))
        .await
        .unwrap();

    let job = queue.claim().await.unwrap().unwrap();
    let (_, disposition) = queue.fail(job, &JobError::retryable("gateway busy")).await.unwrap();
    assert_eq!(disposition, FailureDisposition::Requeued);
    assert_eq!(queue.status(id).await.unwrap(), Some(JobStatus::Pending));
    assert_eq!(queue.stats().await.unwrap().running, 0);

    let job = queue.claim().await.unwrap().unwrap();
    assert_eq!(job.metadata.attempts, 2);
    let (_, disposition) = queue.fail(job, &JobError::retryable("gateway busy")).await.unwrap();
    assert_eq!(disposition, FailureDisposition::Failed);
    assert!(queue.claim().await.unwrap().is_none());

    redis.cleanup().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "requires REDIS_URL"]
async fn test_redis_claims_are_exclusive() {
    let redis = RedisQueue::open(JobKind::Email, QueueConfig::default()).await;
    let queue = redis.queue.clone();

    for i in 0..100 {
        queue
            .enqueue(NotificationJob::email(format!("user{}@example.com", i), "Hi", "Body"))
            .await
            .unwrap();
    }

    let mut tasks = Vec::new();
    for _ in 0..6 {
        let queue = queue.clone();
        tasks.push(tokio::spawn(async move {
            let mut claimed = Vec::new();
            while let Some(job) = queue.claim().await.unwrap() {
                claimed.push(job.id());
            }
            claimed
        }));
    }

    let mut seen = HashSet::new();
    for task in tasks {
        for id in task.await.unwrap() {
            assert!(seen.insert(id), "job {} claimed twice", id);
        }
    }
    assert_eq!(seen.len(), 100);
    assert_eq!(queue.stats().await.unwrap().running, 100);

    redis.cleanup().await;
}
