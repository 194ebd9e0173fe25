//! wand-utils: Common utilities shared across wand crates
//!
//! This crate provides:
//! - Unified error types ([`WandError`], [`Result`])
//! - Logging infrastructure ([`init_logging_with_config`], [`LogConfig`])
//! - Config and log file locations ([`paths`] module)

pub mod error;
pub mod logging;
pub mod paths;

// Re-export main types at crate root for convenience
pub use error::{Result, WandError};
pub use logging::{init_logging_with_config, LogConfig, LogOutput};

pub use paths::{config_file, log_file};
