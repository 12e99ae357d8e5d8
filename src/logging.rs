//! Tracing setup: an ANSI console layer plus a non-blocking rolling file.
//!
//! The returned guard must live for the whole process; dropping it early
//! loses buffered log lines on exit.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{self, RollingFileAppender};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LogConfig;

pub fn init_logging(config: &LogConfig) -> WorkerGuard {
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender(config));
    let base = tracing_subscriber::registry().with(level_filter(&config.level));

    if config.use_json {
        // JSON file only; a console layer would just duplicate the stream
        // in deployments that scrape the file.
        base.with(
            fmt::layer()
                .json()
                .with_writer(file_writer)
                .with_ansi(false),
        )
        .init();
    } else {
        base.with(
            fmt::layer()
                .compact()
                .with_writer(file_writer)
                .with_ansi(false),
        )
        .with(fmt::layer().with_ansi(true))
        .init();
    }

    guard
}

fn file_appender(config: &LogConfig) -> RollingFileAppender {
    match config.rotation.as_str() {
        "hourly" => rolling::hourly(&config.dir, &config.file),
        "daily" => rolling::daily(&config.dir, &config.file),
        _ => rolling::never(&config.dir, &config.file),
    }
}

/// `RUST_LOG` wins over the configured level, so operators can raise
/// verbosity without touching the config file.
fn level_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}
