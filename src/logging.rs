use chrono::Utc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::error::AppError;

/// Install the global fmt subscriber.
///
/// `RUST_LOG` wins over `level` when it parses. Calling this again is a
/// no-op, so tests may call it freely.
pub fn init_logging(level: &str) {
    let filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info")));

    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// One line per directory-backed operation on the `access_log` target
pub fn access_log(operation: &str, endpoint: &str, outcome: Result<usize, &AppError>, duration: Duration) {
    let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
    match outcome {
        Ok(count) => info!(
            target: "access_log",
            "{} {} {} {} {} {}ms",
            timestamp,
            operation,
            endpoint,
            200,
            count,
            duration.as_millis()
        ),
        Err(err) => info!(
            target: "access_log",
            "{} {} {} {} \"{}\" {}ms",
            timestamp,
            operation,
            endpoint,
            err.status(),
            err,
            duration.as_millis()
        ),
    }
}
