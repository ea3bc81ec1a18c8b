//! Tracing setup.
//!
//! Console output is always on and filtered by `RUST_LOG` (default `info`).
//! With a log directory, a daily-rotated file layer is added.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Keeps the file writer alive. Dropping it flushes pending lines.
pub struct LoggingGuard {
    _guard: Option<WorkerGuard>,
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber.
pub fn init(log_dir: Option<&Path>) -> anyhow::Result<LoggingGuard> {
    let Some(log_dir) = log_dir else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter())
            .with_target(false)
            .init();
        return Ok(LoggingGuard { _guard: None });
    };

    std::fs::create_dir_all(log_dir).map_err(|e| {
        anyhow::anyhow!("failed to create log directory {}: {e}", log_dir.display())
    })?;

    let file_appender = tracing_appender::rolling::daily(log_dir, "sms-relay.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(env_filter())
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(non_blocking),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    Ok(LoggingGuard {
        _guard: Some(guard),
    })
}
