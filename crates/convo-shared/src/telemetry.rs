//! Telemetry setup

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingSettings;
use crate::error::AppError;

/// Install the global subscriber: stdout plus a daily-rotated file in `settings.directory`.
///
/// The returned guard flushes the file writer on drop, so keep it alive for the
/// lifetime of the process.
pub fn init_telemetry(settings: &LoggingSettings) -> Result<WorkerGuard, AppError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,convo=debug"));

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("convo")
        .filename_suffix("log")
        .build(&settings.directory)
        .map_err(|e| AppError::TelemetryError(e.to_string()))?;
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let registry = tracing_subscriber::registry().with(env_filter);

    let result = match settings.format.as_str() {
        "json" => registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(true))
            .with(fmt::layer().json().with_writer(file_writer).with_target(true))
            .try_init(),
        _ => registry
            .with(fmt::layer().pretty().with_target(true))
            .with(fmt::layer().with_writer(file_writer).with_ansi(false))
            .try_init(),
    };
    result.map_err(|e| AppError::TelemetryError(e.to_string()))?;

    Ok(guard)
}
