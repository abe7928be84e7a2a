//! Logging setup.

use perp_config::LoggingConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Setup logging from the configured level, format and optional file.
///
/// Returns the appender guard when a log file is configured; dropping it
/// flushes buffered lines, so the caller holds it for the process lifetime.
pub fn setup_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));
    let json = config.format.eq_ignore_ascii_case("json");

    match &config.file {
        Some(path) => {
            let appender = tracing_appender::rolling::daily(".", path);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            if json {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer().json().with_writer(writer))
                    .init();
            } else {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer().with_ansi(false).with_writer(writer))
                    .init();
            }
            Some(guard)
        }
        None => {
            if json {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer().json())
                    .init();
            } else {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer().pretty())
                    .init();
            }
            None
        }
    }
}
