//! Durable storage of client credentials and the current token record.

use crate::error::{AuthError, AuthResult};
use crate::oauth::TokenGrant;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Version written into every credentials file.
pub const SCHEMA_VERSION: u32 = 1;

/// Client credentials registered with the provider.
///
/// Supplied once by the operator and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

impl Credentials {
    /// Create a new set of client credentials.
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
        }
    }
}

/// The current user-delegated token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRecord {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Absolute expiry, computed from the issue time and `expires_in`.
    pub expires_at: DateTime<Utc>,
    pub scopes: BTreeSet<String>,
}

impl TokenRecord {
    /// Build the initial record from an authorization-code grant.
    ///
    /// The provider must return a refresh token for this grant type.
    pub fn from_grant(grant: TokenGrant, issued_at: DateTime<Utc>) -> AuthResult<Self> {
        let expires_at = grant.expires_at(issued_at);
        let scopes = grant.scopes();
        let refresh_token = grant
            .refresh_token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                AuthError::AuthExchangeFailed(
                    "token response did not include a refresh token".to_string(),
                )
            })?;

        Ok(Self {
            access_token: grant.access_token,
            refresh_token,
            token_type: grant.token_type,
            expires_at,
            scopes,
        })
    }

    /// Apply a refresh grant, keeping the refresh token unless a new one was issued.
    pub fn refreshed(&self, grant: TokenGrant, issued_at: DateTime<Utc>) -> Self {
        let expires_at = grant.expires_at(issued_at);
        let scopes = if grant.scope.is_some() {
            grant.scopes()
        } else {
            self.scopes.clone()
        };
        let refresh_token = grant
            .refresh_token
            .filter(|token| !token.is_empty())
            .unwrap_or_else(|| self.refresh_token.clone());

        Self {
            access_token: grant.access_token,
            refresh_token,
            token_type: grant.token_type,
            expires_at,
            scopes,
        }
    }

    /// Whether the token must be refreshed before use at `now`.
    ///
    /// A token inside its last `margin` of validity counts as expired.
    pub fn is_expired(&self, now: DateTime<Utc>, margin: chrono::Duration) -> bool {
        now + margin >= self.expires_at
    }
}

/// Everything persisted for one authorized account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredAuth {
    pub credentials: Credentials,
    pub token: TokenRecord,
}

/// On-disk shape of the credentials file.
///
/// Files written before versioning carry only the client credentials and the
/// two tokens; they load with an already-expired token.
#[derive(Debug, Serialize, Deserialize)]
struct CredentialsFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<u32>,
    client_id: String,
    client_secret: String,
    #[serde(default = "default_redirect_uri")]
    redirect_uri: String,
    access_token: String,
    refresh_token: String,
    #[serde(default = "default_token_type")]
    token_type: String,
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    scopes: BTreeSet<String>,
}

fn default_redirect_uri() -> String {
    crate::DEFAULT_REDIRECT_URI.to_string()
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl From<&StoredAuth> for CredentialsFile {
    fn from(auth: &StoredAuth) -> Self {
        Self {
            version: Some(SCHEMA_VERSION),
            client_id: auth.credentials.client_id.clone(),
            client_secret: auth.credentials.client_secret.clone(),
            redirect_uri: auth.credentials.redirect_uri.clone(),
            access_token: auth.token.access_token.clone(),
            refresh_token: auth.token.refresh_token.clone(),
            token_type: auth.token.token_type.clone(),
            expires_at: Some(auth.token.expires_at),
            scopes: auth.token.scopes.clone(),
        }
    }
}

impl CredentialsFile {
    fn into_stored(self) -> AuthResult<StoredAuth> {
        if let Some(version) = self.version {
            if version > SCHEMA_VERSION {
                return Err(AuthError::UnsupportedVersion(version));
            }
        }

        Ok(StoredAuth {
            credentials: Credentials {
                client_id: self.client_id,
                client_secret: self.client_secret,
                redirect_uri: self.redirect_uri,
            },
            token: TokenRecord {
                access_token: self.access_token,
                refresh_token: self.refresh_token,
                token_type: self.token_type,
                // Unknown expiry: force a refresh on first use.
                expires_at: self.expires_at.unwrap_or_default(),
                scopes: self.scopes,
            },
        })
    }
}

/// Durable storage for [`StoredAuth`].
///
/// The file on disk is the single source of truth; every `load` reads it
/// and every `save` replaces it atomically.
pub struct TokenStore {
    /// Path to the credentials file.
    path: PathBuf,
}

impl TokenStore {
    /// Create a token store using the default path.
    ///
    /// # Errors
    ///
    /// Returns an error if the config directory cannot be determined.
    pub fn new() -> AuthResult<Self> {
        let path = crate::default_credentials_path().ok_or(AuthError::NoConfigDir)?;
        Ok(Self { path })
    }

    /// Create a token store with a custom path.
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the path to the credentials file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check whether a credentials file exists.
    pub async fn exists(&self) -> bool {
        tokio::fs::try_exists(&self.path).await.unwrap_or(false)
    }

    /// Load the stored credentials and token.
    ///
    /// Returns `None` if nothing has been stored yet.
    pub async fn load(&self) -> AuthResult<Option<StoredAuth>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if content.trim().is_empty() {
            return Ok(None);
        }

        let file: CredentialsFile = serde_json::from_str(&content)?;
        if file.version.is_none() {
            debug!(path = ?self.path, "Loaded unversioned credentials file");
        }
        file.into_stored().map(Some)
    }

    /// Load the stored credentials, failing if none exist.
    pub async fn require(&self) -> AuthResult<StoredAuth> {
        self.load().await?.ok_or(AuthError::NoCredentials)
    }

    /// Persist credentials and token, replacing any previous record.
    pub async fn save(&self, auth: &StoredAuth) -> AuthResult<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(&CredentialsFile::from(auth))?;

        // Write atomically (write to temp file, then rename). The temp file is
        // created owner-only so the token is never readable by others.
        let temp_path = self.path.with_extension("json.tmp");
        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);
        let mut file = options.open(&temp_path).await?;
        file.write_all(content.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);

        // A leftover temp file keeps its old mode through open()
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            if let Err(e) = tokio::fs::set_permissions(&temp_path, perms).await {
                let _ = tokio::fs::remove_file(&temp_path).await;
                return Err(AuthError::Permissions(format!(
                    "Failed to set permissions on {:?}: {}",
                    temp_path, e
                )));
            }
        }

        tokio::fs::rename(&temp_path, &self.path).await?;

        debug!(path = ?self.path, expires_at = %auth.token.expires_at, "Wrote credentials file");
        Ok(())
    }

    /// Remove stored credentials.
    ///
    /// Returns `true` if a file was removed.
    pub async fn clear(&self) -> AuthResult<bool> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                info!(path = ?self.path, "Removed credentials file");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore")
            .field("path", &self.path)
            .finish()
    }
}
