//! Tracing and metrics initialisation.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::{AppConfig, LogFormat};
use crate::error::{AppError, Result};

/// Installs the global tracing subscriber. Logs go to stderr so that stdout
/// carries only replies.
pub fn init_tracing(config: &AppConfig) -> Result<()> {
    let filter = EnvFilter::try_new(&config.log_level)
        .map_err(|err| AppError::Telemetry(format!("bad log filter: {err}")))?;
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match config.log_format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Pretty => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init(),
    };
    installed.map_err(|err| AppError::Telemetry(err.to_string()))
}

/// Installs the Prometheus recorder behind the `metrics` macros.
pub fn install_metrics() -> Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .map_err(|err| AppError::Telemetry(err.to_string()))
}
