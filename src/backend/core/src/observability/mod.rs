//! Observability: logging, distributed tracing and metrics.

use opentelemetry::trace::TraceContextExt;
use opentelemetry::Context;
use opentelemetry_otlp::WithExportConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ObservabilityConfig;

/// Initialize the observability stack.
///
/// `RUST_LOG` wins over `observability.log_level` when both are set.
pub fn init(service_name: &str, config: &ObservabilityConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))?;

    let telemetry_layer = match config.otlp_endpoint.as_deref() {
        Some(endpoint) => {
            let tracer = opentelemetry_otlp::new_pipeline()
                .tracing()
                .with_exporter(
                    opentelemetry_otlp::new_exporter()
                        .tonic()
                        .with_endpoint(endpoint),
                )
                .with_trace_config(
                    opentelemetry_sdk::trace::config()
                        .with_resource(opentelemetry_sdk::Resource::new(vec![
                            opentelemetry::KeyValue::new("service.name", service_name.to_string()),
                        ])),
                )
                .install_batch(opentelemetry_sdk::runtime::Tokio)?;
            Some(tracing_opentelemetry::layer().with_tracer(tracer))
        }
        None => None,
    };

    let json = config.json_logging;
    tracing_subscriber::registry()
        .with(filter)
        .with(telemetry_layer)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(|| tracing_subscriber::fmt::layer()))
        .try_init()?;

    tracing::info!(
        service = %service_name,
        otlp = config.otlp_endpoint.is_some(),
        "Observability initialized"
    );
    Ok(())
}

/// Flush and shut down OpenTelemetry.
pub fn shutdown() {
    opentelemetry::global::shutdown_tracer_provider();
}

/// Current trace id, when running inside a sampled span.
pub fn current_trace_id() -> Option<String> {
    let ctx = Context::current();
    let span = ctx.span();
    let span_ctx = span.span_context();

    if span_ctx.is_valid() {
        Some(span_ctx.trace_id().to_string())
    } else {
        None
    }
}

/// Prometheus exporter and metric descriptions.
pub mod metrics {
    use std::sync::OnceLock;

    use metrics::{describe_counter, describe_histogram};
    use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

    static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

    /// Install the global Prometheus recorder. Later calls are no-ops.
    pub fn install() -> anyhow::Result<()> {
        if HANDLE.get().is_some() {
            return Ok(());
        }

        let handle = PrometheusBuilder::new().install_recorder()?;
        register_metrics();
        let _ = HANDLE.set(handle);
        Ok(())
    }

    /// Render every metric in Prometheus text format.
    pub fn render() -> String {
        HANDLE.get().map(|h| h.render()).unwrap_or_default()
    }

    /// Register all metric descriptions.
    pub fn register_metrics() {
        describe_counter!(
            "calendar_http_requests_total",
            "Total HTTP requests by method, route and status"
        );
        describe_histogram!(
            "calendar_http_request_duration_seconds",
            "HTTP request latency in seconds"
        );
        describe_counter!(
            "calendar_errors_total",
            "Errors raised, by code and category"
        );
        describe_counter!(
            "calendar_queries_total",
            "Record queries executed, by collection"
        );
        describe_counter!(
            "calendar_jobs_enqueued_total",
            "Notification jobs enqueued, by queue"
        );
        describe_counter!(
            "calendar_jobs_processed_total",
            "Notification jobs processed, by queue and outcome"
        );
        describe_histogram!(
            "calendar_job_duration_seconds",
            "Notification job execution time in seconds"
        );
        describe_counter!(
            "calendar_auth_denied_total",
            "Requests refused for lack of a role"
        );
    }
}
