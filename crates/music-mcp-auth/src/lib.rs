//! OAuth2 authorization-code lifecycle for music-mcp.
//!
//! This crate owns everything needed to obtain and keep a user-delegated
//! access token for the streaming service:
//!
//! - [`TokenStore`]: durable, versioned storage of client credentials and the
//!   current token record.
//! - [`AuthorizationFlow`]: the three-legged browser dance, capturing the
//!   redirect with a short-lived loopback listener ([`CallbackServer`]) or
//!   falling back to manual code entry.
//! - [`TokenRefresher`]: hands out a valid bearer token, refreshing it under
//!   a lock when it is about to expire.
//!
//! # Storage Location
//!
//! Credentials are stored in a platform-specific config directory:
//! - Linux: `~/.config/music-mcp-server/credentials.json`
//! - macOS: `~/Library/Application Support/music-mcp-server/credentials.json`
//! - Windows: `%APPDATA%/music-mcp-server/credentials.json`
//!
//! The file is created with restrictive permissions (0600 on Unix).
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use music_mcp_auth::{
//!     OAuthEndpoints, TokenClient, TokenRefresher, TokenStore, DEFAULT_ACCOUNTS_URL,
//! };
//!
//! # async fn example() -> Result<(), music_mcp_auth::AuthError> {
//! let store = Arc::new(TokenStore::new()?);
//! let endpoints = OAuthEndpoints::from_base(DEFAULT_ACCOUNTS_URL)?;
//! let refresher = TokenRefresher::new(store, TokenClient::new(&endpoints));
//!
//! let bearer = refresher.get_valid_access_token().await?;
//! println!("Authorization: Bearer {bearer}");
//! # Ok(())
//! # }
//! ```

pub mod callback;
mod error;
pub mod flow;
pub mod oauth;
pub mod refresh;
mod store;

pub use callback::CallbackServer;
pub use error::{AuthError, AuthResult};
pub use flow::{AuthorizationFlow, AuthorizationPrompt, CaptureMode, DEFAULT_AUTH_TIMEOUT};
pub use oauth::{
    OAuthEndpoints, TokenClient, TokenGrant, DEFAULT_ACCOUNTS_URL, DEFAULT_HTTP_TIMEOUT, SCOPES,
};
pub use refresh::{AccessTokenSource, StaticToken, TokenRefresher, DEFAULT_REFRESH_MARGIN};
pub use store::{Credentials, StoredAuth, TokenRecord, TokenStore, SCHEMA_VERSION};

/// Directory name used under the platform config directory.
pub const APP_DIR_NAME: &str = "music-mcp-server";

/// Default redirect URI registered with the provider.
pub const DEFAULT_REDIRECT_URI: &str = "http://127.0.0.1:8888/callback";

/// Get the default config directory for the current platform.
///
/// Returns `None` if the config directory cannot be determined.
pub fn default_config_dir() -> Option<std::path::PathBuf> {
    dirs::config_dir().map(|p| p.join(APP_DIR_NAME))
}

/// Get the default credentials file path for the current platform.
pub fn default_credentials_path() -> Option<std::path::PathBuf> {
    default_config_dir().map(|p| p.join("credentials.json"))
}
