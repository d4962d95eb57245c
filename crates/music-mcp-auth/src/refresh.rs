//! Hands out valid bearer tokens, refreshing them ahead of expiry.

use crate::error::AuthResult;
use crate::oauth::TokenClient;
use crate::store::{StoredAuth, TokenRecord, TokenStore};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Tokens inside their last minute of validity are refreshed before use.
pub const DEFAULT_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Anything that can produce a bearer token for an API call.
#[async_trait]
pub trait AccessTokenSource: Send + Sync {
    async fn access_token(&self) -> AuthResult<String>;
}

/// A fixed token. Useful for tests and for tokens minted elsewhere.
#[derive(Debug, Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl AccessTokenSource for StaticToken {
    async fn access_token(&self) -> AuthResult<String> {
        Ok(self.0.clone())
    }
}

/// Refreshing token source backed by a [`TokenStore`].
///
/// The check-then-refresh sequence runs under a single lock, so concurrent
/// callers that all see an expired token trigger exactly one refresh; the
/// rest reread the file the winner wrote.
pub struct TokenRefresher {
    store: Arc<TokenStore>,
    client: TokenClient,
    margin: Duration,
    lock: Mutex<()>,
}

impl TokenRefresher {
    pub fn new(store: Arc<TokenStore>, client: TokenClient) -> Self {
        Self {
            store,
            client,
            margin: DEFAULT_REFRESH_MARGIN,
            lock: Mutex::new(()),
        }
    }

    /// Set how long before expiry a token is considered stale.
    pub fn with_margin(mut self, margin: Duration) -> Self {
        self.margin = margin;
        self
    }

    /// The backing store.
    pub fn store(&self) -> &Arc<TokenStore> {
        &self.store
    }

    /// Return a token that is valid for at least the refresh margin.
    ///
    /// Makes no network call while the stored token is fresh. A failed
    /// refresh leaves the stored record untouched.
    pub async fn get_valid_access_token(&self) -> AuthResult<String> {
        let _guard = self.lock.lock().await;

        let auth = self.store.require().await?;
        if !auth.token.is_expired(Utc::now(), self.chrono_margin()) {
            return Ok(auth.token.access_token);
        }

        debug!(expires_at = %auth.token.expires_at, "Access token stale, refreshing");
        let token = self.refresh_locked(auth).await?;
        Ok(token.access_token)
    }

    /// Refresh unconditionally and return the new record.
    pub async fn force_refresh(&self) -> AuthResult<TokenRecord> {
        let _guard = self.lock.lock().await;
        let auth = self.store.require().await?;
        self.refresh_locked(auth).await
    }

    /// The stored record as-is, without refreshing.
    pub async fn current(&self) -> AuthResult<StoredAuth> {
        self.store.require().await
    }

    async fn refresh_locked(&self, auth: StoredAuth) -> AuthResult<TokenRecord> {
        let issued_at = Utc::now();
        let grant = match self
            .client
            .refresh(&auth.credentials, &auth.token.refresh_token)
            .await
        {
            Ok(grant) => grant,
            Err(e) => {
                warn!(error = %e, "Token refresh failed");
                return Err(e);
            }
        };

        let token = auth.token.refreshed(grant, issued_at);
        let rotated = token.refresh_token != auth.token.refresh_token;

        self.store
            .save(&StoredAuth {
                credentials: auth.credentials,
                token: token.clone(),
            })
            .await?;

        info!(expires_at = %token.expires_at, rotated, "Access token refreshed");
        Ok(token)
    }

    fn chrono_margin(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.margin).unwrap_or_else(|_| chrono::Duration::zero())
    }
}

#[async_trait]
impl AccessTokenSource for TokenRefresher {
    async fn access_token(&self) -> AuthResult<String> {
        self.get_valid_access_token().await
    }
}

impl std::fmt::Debug for TokenRefresher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenRefresher")
            .field("store", &self.store)
            .field("margin", &self.margin)
            .finish()
    }
}
