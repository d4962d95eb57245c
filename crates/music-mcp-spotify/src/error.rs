//! Error types for Web API calls.

use music_mcp_auth::AuthError;
use thiserror::Error;

/// Errors returned by [`MusicApi`](crate::MusicApi) calls.
#[derive(Debug, Error)]
pub enum ApiError {
    /// No usable access token could be obtained.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The service answered with a non-success status.
    ///
    /// `message` is the service's own explanation and is shown verbatim.
    #[error("{message}")]
    ProviderRejected { status: u16, message: String },

    /// The request did not complete. Not retried.
    #[error("Network error: {0}")]
    Transport(String),

    /// The response body did not have the expected shape.
    #[error("Unexpected response from Spotify: {0}")]
    Decode(String),
}

impl ApiError {
    /// HTTP status of a provider rejection.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::ProviderRejected { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The player refused a command because it is already in that state
    /// (for example pausing while paused).
    pub fn is_restriction_violated(&self) -> bool {
        matches!(
            self,
            Self::ProviderRejected { status: 403, message }
                if message.to_ascii_lowercase().contains("restriction violated")
        )
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

/// Result type for Web API calls.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_rejection_displays_message_verbatim() {
        let err = ApiError::ProviderRejected {
            status: 404,
            message: "Device not found".to_string(),
        };
        assert_eq!(err.to_string(), "Device not found");
        assert_eq!(err.status(), Some(404));
    }

    #[test]
    fn test_restriction_violated() {
        let err = ApiError::ProviderRejected {
            status: 403,
            message: "Player command failed: Restriction violated".to_string(),
        };
        assert!(err.is_restriction_violated());

        let other = ApiError::ProviderRejected {
            status: 403,
            message: "Player command failed: Premium required".to_string(),
        };
        assert!(!other.is_restriction_violated());
        assert!(!ApiError::Transport("timeout".to_string()).is_restriction_violated());
    }

    #[test]
    fn test_auth_error_passes_through() {
        let err = ApiError::from(AuthError::NoCredentials);
        assert!(err.to_string().contains("music-mcp setup"));
        assert_eq!(err.status(), None);
    }
}
