//! OAuth 2.0 endpoints for the streaming service.
//!
//! Builds the consent URL and talks to the token endpoint for both the
//! authorization-code and refresh-token grants. Client credentials are sent
//! as HTTP Basic auth.

use crate::error::{AuthError, AuthResult};
use crate::store::Credentials;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Accounts service base URL.
pub const DEFAULT_ACCOUNTS_URL: &str = "https://accounts.spotify.com";

/// Upper bound on one token endpoint round-trip.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Scopes requested during authorization.
///
/// The smallest set covering every exposed tool: playback state and control,
/// the currently playing item, and reading/modifying playlists.
pub const SCOPES: &[&str] = &[
    "user-read-playback-state",
    "user-modify-playback-state",
    "user-read-currently-playing",
    "playlist-read-private",
    "playlist-modify-public",
    "playlist-modify-private",
];

/// Authorization and token endpoint locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthEndpoints {
    pub authorize_url: Url,
    pub token_url: Url,
}

impl OAuthEndpoints {
    /// Endpoints relative to an accounts base URL (`/authorize`, `/api/token`).
    pub fn from_base(base: &str) -> AuthResult<Self> {
        let base = Url::parse(base.trim_end_matches('/'))
            .map_err(|e| AuthError::Transport(format!("invalid accounts URL '{base}': {e}")))?;
        let join = |path: &str| {
            base.join(path)
                .map_err(|e| AuthError::Transport(format!("invalid accounts URL: {e}")))
        };
        Ok(Self {
            authorize_url: join("/authorize")?,
            token_url: join("/api/token")?,
        })
    }
}

/// Token endpoint response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    pub expires_in: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl TokenGrant {
    /// Absolute expiry for a grant issued at `issued_at`.
    pub fn expires_at(&self, issued_at: DateTime<Utc>) -> DateTime<Utc> {
        let secs = i64::try_from(self.expires_in).unwrap_or(i64::MAX / 1000);
        issued_at + chrono::Duration::seconds(secs.min(10 * 365 * 24 * 3600))
    }

    /// Granted scopes (space- or comma-separated on the wire).
    pub fn scopes(&self) -> BTreeSet<String> {
        self.scope
            .as_deref()
            .unwrap_or_default()
            .split(|c: char| c == ' ' || c == ',')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Error body returned by the token endpoint.
#[derive(Debug, Deserialize)]
struct TokenErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Why a grant request did not produce tokens.
#[derive(Debug)]
enum GrantFailure {
    /// The provider answered and refused the grant.
    Rejected(String),
    /// The request never completed.
    Transport(String),
}

/// Generate the OAuth `state` parameter.
pub fn generate_state() -> String {
    let mut rng = rand::thread_rng();
    let bytes: Vec<u8> = (0..16).map(|_| rng.gen()).collect();
    URL_SAFE_NO_PAD.encode(&bytes)
}

/// Build the consent URL the user opens in a browser.
pub fn build_auth_url(
    authorize_url: &Url,
    client_id: &str,
    redirect_uri: &str,
    scopes: &[&str],
    state: &str,
) -> String {
    let mut url = format!(
        "{}?client_id={}&response_type=code&redirect_uri={}&state={}",
        authorize_url,
        urlencoding::encode(client_id),
        urlencoding::encode(redirect_uri),
        urlencoding::encode(state),
    );

    if !scopes.is_empty() {
        url.push_str(&format!("&scope={}", urlencoding::encode(&scopes.join(" "))));
    }

    url
}

fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_default()
}

/// Client for the token endpoint.
#[derive(Debug, Clone)]
pub struct TokenClient {
    http: reqwest::Client,
    token_url: Url,
}

impl TokenClient {
    /// Create a token client for the given endpoints.
    pub fn new(endpoints: &OAuthEndpoints) -> Self {
        Self {
            http: http_client(DEFAULT_HTTP_TIMEOUT),
            token_url: endpoints.token_url.clone(),
        }
    }

    /// Give up on token requests that take longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.http = http_client(timeout);
        self
    }

    /// Use a preconfigured HTTP client (timeouts, proxies).
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// Token endpoint URL.
    pub fn token_url(&self) -> &Url {
        &self.token_url
    }

    /// Exchange an authorization code for tokens.
    pub async fn exchange_code(
        &self,
        credentials: &Credentials,
        code: &str,
    ) -> AuthResult<TokenGrant> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", credentials.redirect_uri.as_str()),
        ];

        match self.request_grant(credentials, &params).await {
            Ok(grant) => {
                info!(expires_in = grant.expires_in, "Exchanged authorization code");
                Ok(grant)
            }
            Err(GrantFailure::Rejected(msg)) => Err(AuthError::AuthExchangeFailed(msg)),
            Err(GrantFailure::Transport(msg)) => Err(AuthError::AuthExchangeFailed(format!(
                "token request failed: {msg}"
            ))),
        }
    }

    /// Exchange a refresh token for a new access token.
    pub async fn refresh(
        &self,
        credentials: &Credentials,
        refresh_token: &str,
    ) -> AuthResult<TokenGrant> {
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];

        match self.request_grant(credentials, &params).await {
            Ok(grant) => {
                debug!(
                    expires_in = grant.expires_in,
                    rotated = grant.refresh_token.is_some(),
                    "Refreshed access token"
                );
                Ok(grant)
            }
            Err(GrantFailure::Rejected(msg)) => Err(AuthError::RefreshFailed(msg)),
            Err(GrantFailure::Transport(msg)) => Err(AuthError::Transport(msg)),
        }
    }

    async fn request_grant(
        &self,
        credentials: &Credentials,
        params: &[(&str, &str)],
    ) -> Result<TokenGrant, GrantFailure> {
        let response = self
            .http
            .post(self.token_url.clone())
            .basic_auth(&credentials.client_id, Some(&credentials.client_secret))
            .form(params)
            .send()
            .await
            .map_err(|e| GrantFailure::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!(status = %status, "Token endpoint rejected grant");
            return Err(GrantFailure::Rejected(describe_token_error(status, &text)));
        }

        response
            .json::<TokenGrant>()
            .await
            .map_err(|e| GrantFailure::Rejected(format!("invalid token response: {e}")))
    }
}

/// Render a token endpoint error body as `error: description`.
fn describe_token_error(status: reqwest::StatusCode, body: &str) -> String {
    match serde_json::from_str::<TokenErrorBody>(body) {
        Ok(TokenErrorBody {
            error,
            error_description: Some(description),
        }) => format!("{error}: {description}"),
        Ok(TokenErrorBody { error, .. }) => error,
        Err(_) if body.trim().is_empty() => format!("HTTP {status}"),
        Err(_) => format!("HTTP {status}: {}", body.trim()),
    }
}
