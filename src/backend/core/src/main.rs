//! Calendar Server - Main entry point

use calendar_core::{
    api::{self, AppState},
    config::Config,
    jobs::{Dispatcher, WorkerConfig},
    observability,
    store::Collections,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::load()?;

    observability::init("calendar-server", &config.observability)?;
    observability::metrics::install()?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting Calendar Server");

    let collections = Collections::from_config(&config.database).await?;
    let dispatcher = Dispatcher::from_config(&config).await?;

    // Workers in-process, otherwise `calendar-worker` drains the queues
    let workers = if config.worker.embedded {
        let worker_config = WorkerConfig::from_settings(&config.worker, "embedded-worker");
        tracing::info!(concurrency = worker_config.concurrency, "Starting embedded workers");
        dispatcher.spawn_logging_workers(&worker_config)
    } else {
        Vec::new()
    };

    let app = api::build_router(AppState::new(collections, dispatcher, &config));

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Starting HTTP server");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    for worker in workers {
        worker.stop().await;
    }

    observability::shutdown();
    tracing::info!("Server shutdown complete");

    Ok(())
}

/// Wait for shutdown signal.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
