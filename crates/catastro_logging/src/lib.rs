//! Shared logging setup for catastro binaries.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub const DEFAULT_LOG_FILTER: &str = "catastro=info,catastro_worker=info,catastro_sinks=info";
const VERBOSE_LOG_FILTER: &str = "catastro=debug,catastro_worker=debug,catastro_sinks=debug";
const QUIET_LOG_FILTER: &str = "warn";

/// Logging configuration shared by catastro binaries.
#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    pub verbose: bool,
    /// Only warnings and errors on stderr (the file log keeps full detail).
    pub quiet: bool,
    /// Append a plain-text copy of the log to this file.
    pub log_file: Option<PathBuf>,
}

/// Pick the stderr filter. `RUST_LOG` wins over the flags.
fn console_filter(config: &LogConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if config.verbose {
            EnvFilter::new(VERBOSE_LOG_FILTER)
        } else if config.quiet {
            EnvFilter::new(QUIET_LOG_FILTER)
        } else {
            EnvFilter::new(DEFAULT_LOG_FILTER)
        }
    })
}

fn file_filter(config: &LogConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if config.verbose {
            VERBOSE_LOG_FILTER
        } else {
            DEFAULT_LOG_FILTER
        })
    })
}

/// Open (creating parent directories) the log file in append mode.
pub fn open_log_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory: {}", parent.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file: {}", path.display()))
}

/// Initialize tracing with stderr output and an optional file copy.
pub fn init_logging(config: LogConfig) -> Result<()> {
    let file_layer = match &config.log_file {
        Some(path) => {
            let file = open_log_file(path)?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false)
                    .with_filter(file_filter(&config)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(file_layer)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_filter(console_filter(&config)),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(())
}
