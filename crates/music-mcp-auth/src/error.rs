//! Error types for the authorization lifecycle.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while authorizing, storing or refreshing tokens.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Nothing has been stored yet; the authorization flow must run first.
    #[error("No credentials found. Run `music-mcp setup` to authorize this machine")]
    NoCredentials,

    /// No redirect arrived within the authorization window.
    #[error("Authorization timed out after {}s without a redirect", .0.as_secs())]
    AuthTimeout(Duration),

    /// The provider (or the operator) declined the authorization.
    #[error("Authorization denied: {0}")]
    AuthDenied(String),

    /// The code-for-token exchange was rejected.
    #[error("Authorization code exchange failed: {0}")]
    AuthExchangeFailed(String),

    /// The refresh-token exchange was rejected; full re-authorization is required.
    #[error("Token refresh failed: {0}. Run `music-mcp setup` to re-authorize")]
    RefreshFailed(String),

    /// The token endpoint could not be reached.
    #[error("Token endpoint unreachable: {0}")]
    Transport(String),

    /// The configured redirect URI cannot be used.
    #[error("Invalid redirect URI '{uri}': {reason}")]
    InvalidRedirectUri { uri: String, reason: String },

    /// The credentials file was written by a newer version.
    #[error("Unsupported credentials file version {0}")]
    UnsupportedVersion(u32),

    /// Could not determine the config directory.
    #[error("Could not determine config directory")]
    NoConfigDir,

    /// Failed to set file permissions.
    #[error("Failed to set file permissions: {0}")]
    Permissions(String),

    /// Failed to read or write the credentials file or the callback socket.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to serialize or deserialize stored data.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AuthError {
    /// Create an invalid redirect URI error.
    pub fn invalid_redirect(uri: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRedirectUri {
            uri: uri.into(),
            reason: reason.into(),
        }
    }

    /// Whether the operator has to run the authorization flow again.
    pub fn requires_reauthorization(&self) -> bool {
        matches!(
            self,
            Self::NoCredentials | Self::RefreshFailed(_) | Self::UnsupportedVersion(_)
        )
    }
}

/// Result type for auth operations.
pub type AuthResult<T> = Result<T, AuthError>;
