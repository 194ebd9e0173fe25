//! Error types for wand
//!
//! Provides a unified error type used across all wand crates.

use std::path::PathBuf;

/// Main error type for wand operations
#[derive(Debug, thiserror::Error)]
pub enum WandError {
    // === IO Errors ===

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write file {path}: {source}")]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    // === Connection Errors ===

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Connection closed unexpectedly")]
    ConnectionClosed,

    #[error("Not connected (session is {state})")]
    NotConnected { state: String },

    #[error("Invalid endpoint '{input}': {reason}")]
    InvalidEndpoint { input: String, reason: String },

    // === Command Errors ===

    #[error("Refusing to send an empty command")]
    EmptyCommand,

    #[error("A command is already awaiting confirmation")]
    SendPending,

    // === Configuration Errors ===

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration at {path}: {message}")]
    ConfigInvalid { path: PathBuf, message: String },

    // === Internal Errors ===

    #[error("Internal error: {0}")]
    Internal(String),
}

impl WandError {
    /// Create a connection error
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a not-connected error for the given session state
    pub fn not_connected(state: impl std::fmt::Display) -> Self {
        Self::NotConnected {
            state: state.to_string(),
        }
    }

    /// Create an invalid endpoint error
    pub fn invalid_endpoint(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidEndpoint {
            input: input.into(),
            reason: reason.into(),
        }
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

/// Result type alias using WandError
pub type Result<T> = std::result::Result<T, WandError>;
