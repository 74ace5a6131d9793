//! GoDAM Player Error Definitions
//!
//! Defines the error kinds surfaced by the remote-control client.

use thiserror::Error;

use super::CommandName;

/// Remote-control client error types
#[derive(Error, Debug)]
pub enum ClientError {
    // =========================================================================
    // Construction Errors
    // =========================================================================
    #[error("Initialization error: {0}")]
    Initialization(String),

    // =========================================================================
    // Command Errors
    // =========================================================================
    #[error("Player iframe is not available for command '{command}'")]
    UnavailableTarget { command: CommandName },

    #[error("Command '{command}' timed out after {timeout_ms}ms")]
    CommandTimeout {
        command: CommandName,
        timeout_ms: u64,
    },

    /// The embedded player answered with a `:error` response. Displays the
    /// remote-supplied message verbatim.
    #[error("{message}")]
    CommandFailed {
        command: CommandName,
        message: String,
    },

    #[error("Malformed response to '{command}': missing or invalid '{field}'")]
    MalformedResponse {
        command: CommandName,
        field: &'static str,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Player client has been destroyed")]
    Destroyed,

    #[error("Failed to post message: {0}")]
    Transport(String),

    // =========================================================================
    // General Errors
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Remote-control client result type
pub type ClientResult<T> = Result<T, ClientError>;

impl ClientError {
    /// Whether retrying the same call later may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::UnavailableTarget { .. } | ClientError::CommandTimeout { .. }
        )
    }

    /// Name of the command this error belongs to, if any
    pub fn command(&self) -> Option<&str> {
        match self {
            ClientError::UnavailableTarget { command }
            | ClientError::CommandTimeout { command, .. }
            | ClientError::CommandFailed { command, .. }
            | ClientError::MalformedResponse { command, .. } => Some(command.as_str()),
            _ => None,
        }
    }
}
