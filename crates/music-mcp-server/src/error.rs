//! Error types for tools and the protocol loop.

use music_mcp_auth::AuthError;
use music_mcp_spotify::ApiError;
use thiserror::Error;

/// Result type for tool operations.
pub type ToolResult<T> = Result<T, ToolError>;

/// Errors a tool can return.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Arguments did not match the declared schema. Reported as a protocol error.
    #[error("Invalid params: {0}")]
    Validation(String),

    /// The service call failed. Reported in-band as an error result.
    #[error(transparent)]
    Api(#[from] ApiError),
}

impl ToolError {
    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

/// Errors that stop the protocol server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// No usable token at startup.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Reading from or writing to the transport failed.
    #[error("Transport error: {0}")]
    Io(#[from] std::io::Error),

    /// A response could not be serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// `serve` was called on a server that already shut down.
    #[error("Server has already shut down")]
    AlreadyShutdown,
}

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;
