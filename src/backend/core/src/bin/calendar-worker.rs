//! Calendar Worker - drains the notification queues.
//!
//! ```text
//! calendar-worker --config calendar.toml --queue sms --concurrency 8
//! ```

use std::time::Duration;

use clap::{Parser, ValueEnum};

use calendar_core::{
    config::Config,
    jobs::{Dispatcher, JobKind, NotificationHandler, WorkerConfig},
    observability,
};

#[derive(Parser)]
#[command(
    name = "calendar-worker",
    version,
    about = "Consume email and SMS notification jobs"
)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "CALENDAR_CONFIG")]
    config: Option<String>,

    /// Queue to consume
    #[arg(short, long, value_enum, default_value = "all")]
    queue: QueueSelection,

    /// Concurrent jobs per queue (overrides worker.concurrency)
    #[arg(long)]
    concurrency: Option<usize>,

    /// Seconds between stats log lines, 0 disables them
    #[arg(long, default_value_t = 60)]
    stats_interval: u64,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum QueueSelection {
    Email,
    Sms,
    All,
}

impl QueueSelection {
    fn kinds(self) -> Vec<JobKind> {
        match self {
            Self::Email => vec![JobKind::Email],
            Self::Sms => vec![JobKind::Sms],
            Self::All => JobKind::ALL.to_vec(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = match cli.config.as_deref() {
        Some(path) => Config::from_file(path)?,
        None => Config::load()?,
    };
    if let Some(concurrency) = cli.concurrency {
        config.worker.concurrency = concurrency;
    }

    observability::init("calendar-worker", &config.observability)?;

    if config.redis.url.is_none() {
        tracing::warn!("redis.url not set, this worker only sees jobs enqueued in its own process");
    }
    let dispatcher = Dispatcher::from_config(&config).await?;

    let kinds = cli.queue.kinds();
    let worker_config = WorkerConfig::from_settings(&config.worker, "calendar-worker");
    tracing::info!(
        queues = ?kinds,
        concurrency = worker_config.concurrency,
        job_timeout = ?worker_config.job_timeout,
        "Starting workers"
    );

    let workers = dispatcher.spawn_workers(
        &kinds,
        std::sync::Arc::new(NotificationHandler::logging()),
        &worker_config,
    );

    let report = async {
        if cli.stats_interval == 0 {
            return std::future::pending::<()>().await;
        }
        let mut ticker = tokio::time::interval(Duration::from_secs(cli.stats_interval));
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match dispatcher.stats().await {
                Ok(stats) => {
                    for (kind, s) in stats {
                        tracing::info!(
                            queue = kind.queue_name(),
                            pending = s.pending,
                            running = s.running,
                            completed = s.completed,
                            failed = s.failed,
                            "Queue stats"
                        );
                    }
                }
                Err(e) => tracing::warn!(error = %e, "Failed to read queue stats"),
            }
        }
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            }
        }
        _ = report => {}
    }

    tracing::info!("Shutdown signal received, draining workers");
    for worker in workers {
        let stats = worker.stats().clone();
        worker.stop().await;
        tracing::info!(
            processed = stats.processed(),
            succeeded = stats.succeeded(),
            failed = stats.failed(),
            "Worker stopped"
        );
    }

    observability::shutdown();
    Ok(())
}
