//! Error types shared by the bach bridge crates
//!
//! Covers configuration and filesystem failures. Transport and
//! conversation errors live next to the code that raises them.

use std::path::PathBuf;

/// Main error type for bach utility operations
#[derive(Debug, thiserror::Error)]
pub enum BachError {
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

    // === Configuration Errors ===

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration at {path}: {message}")]
    ConfigInvalid { path: PathBuf, message: String },

    #[error("Configuration file not found: {0}")]
    ConfigNotFound(PathBuf),

    // === Internal Errors ===

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BachError {
    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether the error was caused by the user's configuration
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::ConfigInvalid { .. } | Self::ConfigNotFound(_)
        )
    }
}

/// Result type alias using BachError
pub type Result<T> = std::result::Result<T, BachError>;
