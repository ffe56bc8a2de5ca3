use anyhow::Result;
use std::env;
use std::path::PathBuf;
use tracing::{warn, Level};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const LOG_FILE: &str = "operator.log";

/// `OPERATOR_LOG_DIR`, or the platform data dir.
pub fn log_dir() -> PathBuf {
    if let Ok(custom_dir) = env::var("OPERATOR_LOG_DIR") {
        return PathBuf::from(custom_dir);
    }
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("operator")
        .join("logs")
}

/// Installs stderr and daily-rolling file output. Keep the returned guard
/// alive for the life of the process so buffered file lines are flushed.
pub fn init_logging(verbose: bool) -> Result<WorkerGuard> {
    let log_level = env::var("LOG_LEVEL")
        .map(|level| match level.to_lowercase().as_str() {
            "error" => Level::ERROR,
            "warn" => Level::WARN,
            "info" => Level::INFO,
            "debug" => Level::DEBUG,
            "trace" => Level::TRACE,
            _ => Level::INFO,
        })
        .unwrap_or(if verbose { Level::DEBUG } else { Level::INFO });

    let log_dir = log_dir();
    if let Err(e) = std::fs::create_dir_all(&log_dir) {
        eprintln!("Failed to create log directory {}: {e}", log_dir.display());
    }
    let (file_writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(&log_dir, LOG_FILE));

    let filter = || {
        EnvFilter::from_default_env()
            .add_directive(log_level.into())
            .add_directive("tungstenite=warn".parse().expect("static directive"))
            .add_directive("tokio_tungstenite=warn".parse().expect("static directive"))
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_filter(filter()),
        )
        .with(
            fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_filter(filter()),
        )
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {e}"))?;

    if !log_dir.exists() {
        warn!("Logging to stderr only; {} is unavailable", log_dir.display());
    }
    Ok(guard)
}
