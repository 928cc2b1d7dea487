//! Tracing subscriber for the ledger
//!
//! The configured `log_level` applies to this crate only. Dependencies log at
//! `warn`, which keeps per-statement sqlx output and tokio internals out of
//! the ledger log. `RUST_LOG` overrides everything.

use crate::config::AppConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Target prefix of every event emitted by this crate
const LEDGER_TARGET: &str = env!("CARGO_CRATE_NAME");

/// Level for everything outside the ledger
const DEPENDENCY_LEVEL: &str = "warn";

fn filter_directives(config: &AppConfig) -> String {
    format!(
        "{dep},{ledger}={level}",
        dep = DEPENDENCY_LEVEL,
        ledger = LEDGER_TARGET,
        level = config.log_level
    )
}

fn rotation(config: &AppConfig) -> Rotation {
    match config.rotation.as_str() {
        "hourly" => Rotation::HOURLY,
        "daily" => Rotation::DAILY,
        _ => Rotation::NEVER,
    }
}

pub fn init_logging(config: &AppConfig) -> WorkerGuard {
    let file_appender =
        RollingFileAppender::new(rotation(config), &config.log_dir, &config.log_file);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(config)));
    let registry = tracing_subscriber::registry().with(filter);

    if config.use_json {
        let file_layer = fmt::layer()
            .json()
            .with_current_span(true)
            .with_target(true)
            .with_writer(non_blocking)
            .with_ansi(false);
        registry.with(file_layer).init();
    } else {
        let file_layer = fmt::layer()
            .with_target(true)
            .with_writer(non_blocking)
            .with_ansi(false);
        // stdout is reserved for command output
        let console_layer = fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .with_ansi(true);
        registry.with(file_layer).with(console_layer).init();
    }

    guard
}
