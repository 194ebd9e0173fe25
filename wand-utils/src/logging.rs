//! Logging infrastructure for wand
//!
//! Provides unified logging setup using the tracing ecosystem. The client
//! writes the transcript to stdout, so logs only ever go to stderr or to a
//! file under the state directory.

use std::fs::File;
use std::path::PathBuf;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::{paths, Result, WandError};

/// Environment variable holding the log filter directive
pub const LOG_ENV_VAR: &str = "WAND_LOG";

/// Log output destination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutput {
    /// Log to stderr
    Stderr,
    /// Append to [`paths::log_file`]
    File,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Output destination
    pub output: LogOutput,
    /// Log level filter (e.g., "info", "debug", "wand=debug,tokio=warn")
    pub filter: String,
    /// Include file/line in logs
    pub file_line: bool,
}

impl LogConfig {
    /// Create config for the interactive client (stderr, quiet by default)
    pub fn client() -> Self {
        Self {
            output: LogOutput::Stderr,
            filter: filter_from_env("warn"),
            file_line: false,
        }
    }

    /// Create config for the client logging to a file instead of the terminal
    pub fn client_file() -> Self {
        Self {
            output: LogOutput::File,
            filter: filter_from_env("info"),
            file_line: true,
        }
    }
}

fn filter_from_env(default: &str) -> String {
    std::env::var(LOG_ENV_VAR).unwrap_or_else(|_| default.into())
}

/// Initialize logging with custom configuration
pub fn init_logging_with_config(config: LogConfig) -> Result<()> {
    let filter = EnvFilter::try_new(&config.filter)
        .map_err(|e| WandError::config(format!("Invalid log filter: {}", e)))?;

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(config.file_line)
        .with_line_number(config.file_line);

    let init_result = match config.output {
        LogOutput::Stderr => tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer.with_writer(std::io::stderr))
            .try_init(),
        LogOutput::File => {
            let file = open_log_file(paths::log_file())?;
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer.with_writer(file).with_ansi(false))
                .try_init()
        }
    };

    init_result.map_err(|e| WandError::internal(format!("Failed to init logging: {}", e)))
}

/// Open (creating parent directories) the log file in append mode
fn open_log_file(path: PathBuf) -> Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| WandError::FileWrite {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| WandError::FileWrite { path, source: e })
}
