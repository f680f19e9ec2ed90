//! Logging initialization and configuration.
//!
//! Environment-aware logging setup:
//! - **Production**: JSON logs to rolling files + compact logs to stdout
//! - **Development**: Pretty logs to stdout with span events
//!
//! Check runs are wrapped in `proximity_check` and `geo_check` spans. In
//! production the file layer records span closes, so every check leaves a
//! JSON line with its busy/idle time next to its outcome.

use std::path::PathBuf;
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Variable consulted when `RUST_LOG` is unset.
const LEVEL_VAR: &str = "EXPOSURE_LOG_LEVEL";

/// Overrides the platform log directory.
const DIR_VAR: &str = "EXPOSURE_LOG_DIR";

/// Rolling file name prefix; files are suffixed with the date.
const FILE_PREFIX: &str = "exposure-server";

/// Keeps the non-blocking writers flushing for the life of the process.
static GUARDS: OnceLock<[WorkerGuard; 2]> = OnceLock::new();

/// Initialize the logging system with environment-appropriate configuration.
///
/// # Arguments
///
/// * `is_production` - `server.production` from the engine configuration
///
/// # Production Mode
///
/// - Logs to daily rolling files in `/var/log/exposure-watch/` (or `EXPOSURE_LOG_DIR`)
/// - Also logs to stdout for the service journal
/// - JSON format in files, including check span timings
///
/// # Development Mode
///
/// - Logs to stdout only with pretty formatting
/// - Span open/close events for every check
///
/// # Errors
///
/// Returns an error if the env filter cannot be parsed or the log directory
/// cannot be created.
pub fn init(is_production: bool) -> anyhow::Result<()> {
    let env_filter = env_filter()?;

    if is_production {
        init_production(env_filter)
    } else {
        init_development(env_filter);
        Ok(())
    }
}

/// `RUST_LOG` first, then `EXPOSURE_LOG_LEVEL`, then `info`.
fn env_filter() -> anyhow::Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let level = std::env::var(LEVEL_VAR).unwrap_or_else(|_| "info".to_string());
    Ok(EnvFilter::try_new(level)?)
}

fn init_production(env_filter: EnvFilter) -> anyhow::Result<()> {
    let (file_writer, stdout_writer) = production_writers()?;

    let file_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(file_writer)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_current_span(true)
        .with_span_events(FmtSpan::CLOSE);

    // The journal adds its own timestamps and does not render colour.
    let stdout_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(stdout_writer)
        .with_target(true)
        .with_ansi(false)
        .without_time();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();

    Ok(())
}

/// Builds both non-blocking writers and parks their guards.
fn production_writers() -> anyhow::Result<(NonBlocking, NonBlocking)> {
    let log_dir = log_directory();
    std::fs::create_dir_all(&log_dir)?;

    let appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, FILE_PREFIX);
    let (file_writer, file_guard) = tracing_appender::non_blocking(appender);
    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());
    let _ = GUARDS.set([file_guard, stdout_guard]);

    Ok((file_writer, stdout_writer))
}

fn init_development(env_filter: EnvFilter) {
    let stdout_layer = tracing_subscriber::fmt::layer()
        .pretty()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .init();
}

/// Returns the log directory for the current platform.
fn log_directory() -> PathBuf {
    if let Some(dir) = std::env::var_os(DIR_VAR) {
        return PathBuf::from(dir);
    }
    #[cfg(target_os = "linux")]
    {
        PathBuf::from("/var/log/exposure-watch")
    }
    #[cfg(not(target_os = "linux"))]
    {
        directories::ProjectDirs::from("", "", "exposure-watch")
            .map_or_else(|| PathBuf::from("./logs"), |dirs| dirs.data_dir().join("logs"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_directory_is_valid_path() {
        let dir = log_directory();
        assert!(!dir.as_os_str().is_empty());
    }

    #[test]
    fn test_level_fallback_parses() {
        assert!(EnvFilter::try_new("info").is_ok());
        assert!(EnvFilter::try_new("exposure_core=debug,tower_http=warn").is_ok());
    }
}
