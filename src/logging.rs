//! Logging setup
//!
//! Non-blocking rolling log file plus stdout. With `use_json` both outputs
//! are JSON lines (targets kept so processor events can be filtered by
//! module); otherwise the file is plain text and stdout is colored.

use crate::config::AppConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Dependencies that are chatty at `debug`
const QUIET_DEPENDENCIES: &[&str] = &["sqlx=warn", "reqwest=warn", "hyper=warn", "hyper_util=warn"];

fn rotation(name: &str) -> Rotation {
    match name {
        "minutely" => Rotation::MINUTELY,
        "hourly" => Rotation::HOURLY,
        "daily" => Rotation::DAILY,
        _ => Rotation::NEVER,
    }
}

/// Filter used when `RUST_LOG` is unset
fn default_directives(config: &AppConfig) -> String {
    let mut directives = vec![config.log_level.clone()];
    directives.extend(QUIET_DEPENDENCIES.iter().map(|d| d.to_string()));
    directives.join(",")
}

/// Install the global subscriber. Keep the returned guard alive until exit,
/// otherwise buffered file output is lost.
pub fn init_logging(config: &AppConfig) -> WorkerGuard {
    let file_appender =
        RollingFileAppender::new(rotation(&config.rotation), &config.log_dir, &config.log_file);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(config)));
    let registry = tracing_subscriber::registry().with(filter);

    if config.use_json {
        let file_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_writer(non_blocking)
            .with_ansi(false);
        let stdout_layer = fmt::layer().json().with_target(true).with_ansi(false);
        registry.with(file_layer).with(stdout_layer).init();
    } else {
        let file_layer = fmt::layer()
            .with_target(false)
            .with_writer(non_blocking)
            .with_ansi(false);
        let stdout_layer = fmt::layer().with_target(false).with_ansi(true);
        registry.with(file_layer).with(stdout_layer).init();
    }

    guard
}
