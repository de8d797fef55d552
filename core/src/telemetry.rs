use crate::config::{LogFormat, TelemetryConfig};
use metrics::{describe_counter, describe_histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Installs the log subscriber and, when enabled, the Prometheus exporter.
///
/// Logs go to stderr so that stdout carries only command output.
pub fn init(config: &TelemetryConfig) -> anyhow::Result<()> {
    let fmt_layer = match config.log_format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_current_span(true)
            .with_span_list(false)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .compact()
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter(&config.log_level))
        .with(fmt_layer)
        .try_init()?;

    if config.metrics_enabled {
        let addr: SocketAddr = ([127, 0, 0, 1], config.metrics_port).into();
        PrometheusBuilder::new().with_http_listener(addr).install()?;
        describe_metrics();

        tracing::info!(%addr, "Metrics endpoint listening");
    }

    Ok(())
}

/// `RUST_LOG` wins over the configured level.
fn env_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level))
}

fn describe_metrics() {
    describe_counter!(
        "collector_retry_attempts_total",
        "Attempts made by retrying operations"
    );
    describe_counter!(
        "collector_transport_failures_total",
        "Upstream request attempts that failed"
    );
    describe_histogram!(
        "collector_transport_request_ms",
        Unit::Milliseconds,
        "Latency of one upstream request attempt"
    );
    describe_counter!(
        "collector_sections_total",
        "Section outcomes by section and status"
    );
    describe_histogram!(
        "collector_section_duration_ms",
        Unit::Milliseconds,
        "Time spent fetching one section"
    );
    describe_histogram!(
        "collector_aggregate_duration_ms",
        Unit::Milliseconds,
        "Time spent aggregating one place"
    );
    describe_counter!("collector_batch_items_total", "Work items processed by batch runs");
    describe_counter!("collector_checkpoint_writes_total", "Checkpoint files written");
}

pub fn shutdown() {
    tracing::debug!("Telemetry shut down");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_configured_level() {
        std::env::remove_var("RUST_LOG");
        assert_eq!(env_filter("warn").to_string(), "warn");
    }
}
