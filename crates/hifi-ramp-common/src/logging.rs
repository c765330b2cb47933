//! ---
//! ramp_section: "01-core-functionality"
//! ramp_subsection: "module"
//! ramp_type: "source"
//! ramp_scope: "code"
//! ramp_description: "Shared primitives and utilities for the ramp controller."
//! ramp_version: "v0.1.0"
//! ramp_owner: "tbd"
//! ---
//! Tracing setup for one ramp daemon instance.
//!
//! Each daemon drives a single supply, so its JSON log file is named after the
//! supply's PV prefix and several daemons can share one log directory.

use std::path::PathBuf;

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::daily;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;

const LOG_ENV: &str = "HIFI_RAMP_LOG";
const DAEMON_NAME: &str = "hifi-rampd";

static GUARDS: OnceCell<(WorkerGuard, WorkerGuard)> = OnceCell::new();

/// Console log format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    #[default]
    StructuredJson,
    Pretty,
}

/// File name stem for the log of the daemon driving `device`.
///
/// `IN:HIFI:PSU` becomes `hifi-rampd-in-hifi-psu`. An explicit
/// `logging.file_prefix` wins.
pub fn log_file_prefix(device: &str, config: &LoggingConfig) -> String {
    if let Some(prefix) = config.file_prefix.as_deref().filter(|p| !p.trim().is_empty()) {
        return prefix.trim().to_owned();
    }
    let device: String = device
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    let device = device.trim_matches('-');
    if device.is_empty() {
        DAEMON_NAME.to_owned()
    } else {
        format!("{DAEMON_NAME}-{device}")
    }
}

/// Pick the filter from an environment directive, falling back to the configured level.
fn resolve_filter(directive: Option<String>, level: &str) -> EnvFilter {
    if let Some(directive) = directive {
        match EnvFilter::try_new(&directive) {
            Ok(filter) => return filter,
            Err(err) => eprintln!("invalid log directive `{directive}` ({err}); using `{level}`"),
        }
    }
    EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber for the daemon driving `device`.
///
/// `HIFI_RAMP_LOG`, then `RUST_LOG`, override `logging.level`. Events go to stdout
/// in the configured format and to `<directory>/<prefix>.log.<date>` as JSON.
/// Returns the path stem of the log file.
pub fn init_tracing(device: &str, config: &LoggingConfig) -> Result<PathBuf> {
    std::fs::create_dir_all(&config.directory).with_context(|| {
        format!("failed to create log directory {}", config.directory.display())
    })?;
    let prefix = log_file_prefix(device, config);
    let file_name = format!("{prefix}.log");

    let (file_writer, file_guard) =
        tracing_appender::non_blocking(daily(&config.directory, &file_name));
    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());
    let _ = GUARDS.set((file_guard, stdout_guard));

    let directive = std::env::var(LOG_ENV)
        .ok()
        .or_else(|| std::env::var("RUST_LOG").ok());
    let filter = resolve_filter(directive, &config.level);

    let console = match config.format {
        LogFormat::StructuredJson => fmt::layer()
            .with_target(false)
            .json()
            .with_writer(stdout_writer)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .with_target(true)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .with_writer(stdout_writer)
            .boxed(),
    };
    let file = fmt::layer()
        .with_target(true)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .json()
        .with_writer(file_writer);

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()
        .ok();

    let path = config.directory.join(file_name);
    info!(device = %device, log_file = %path.display(), format = ?config.format, "tracing initialised");
    Ok(path)
}
