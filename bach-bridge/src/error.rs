//! Bridge error types

use std::io;

use bach_utils::BachError;

use crate::llm::LlmError;

/// Errors surfaced by the transport, correlator, tool layer and tool loop
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    // === Transport Errors ===

    /// Outbound link was not connected when the command was sent
    #[error("Transport failed: outbound connection is not established")]
    TransportFailed,

    /// Outbound link dropped while a reply was awaited
    #[error("Transport lost while waiting for a reply")]
    TransportLost,

    #[error("Timed out after {millis}ms waiting for a reply")]
    TimedOut { millis: u64 },

    /// A request is already outstanding on the outbound channel
    #[error("Busy: another request is still awaiting its reply")]
    Busy,

    // === Tool Errors ===

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Invalid arguments for {tool}: {message}")]
    InvalidArguments { tool: String, message: String },

    // === Conversation Errors ===

    #[error("No configured model is available (tried: {})", tried.join(", "))]
    ModelUnavailable { tried: Vec<String> },

    #[error("Tool loop stopped after {rounds} rounds")]
    RoundLimitExceeded { rounds: u32 },

    #[error("Chat backend error: {0}")]
    Backend(#[from] LlmError),

    // === Ambient Errors ===

    #[error(transparent)]
    Config(#[from] BachError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Session shut down before the operation finished
    #[error("Cancelled: session is shutting down")]
    Cancelled,
}

impl BridgeError {
    /// Create an invalid-arguments error
    pub fn invalid_arguments(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArguments {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Transport-level conditions that may clear up on their own
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TransportFailed | Self::TransportLost | Self::TimedOut { .. } | Self::Busy
        )
    }

    /// Errors that are caught locally and never touch the wire
    pub fn is_local_validation(&self) -> bool {
        matches!(self, Self::ToolNotFound(_) | Self::InvalidArguments { .. })
    }
}

/// Result type alias using BridgeError
pub type Result<T> = std::result::Result<T, BridgeError>;
