//! Interactive authorization-code flow.

use crate::callback::{loopback_addr, CallbackServer};
use crate::error::{AuthError, AuthResult};
use crate::oauth::{build_auth_url, generate_state, OAuthEndpoints, TokenClient, SCOPES};
use crate::store::{Credentials, StoredAuth, TokenRecord, TokenStore};
use async_trait::async_trait;
use chrono::Utc;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

/// How long to wait for the browser redirect.
pub const DEFAULT_AUTH_TIMEOUT: Duration = Duration::from_secs(120);

/// How the authorization code will be obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    /// A listener on this loopback address receives the redirect.
    Loopback(SocketAddr),
    /// The operator pastes the code (or the whole redirected URL).
    Manual,
}

/// Operator-facing side of the flow.
#[async_trait]
pub trait AuthorizationPrompt: Send + Sync {
    /// Tell the operator where to grant consent and how the code comes back.
    fn announce(&self, consent_url: &str, mode: &CaptureMode);

    /// Read a pasted code or redirected URL.
    async fn read_code(&self) -> std::io::Result<String>;
}

/// Runs the three-legged flow and persists its result.
pub struct AuthorizationFlow {
    endpoints: OAuthEndpoints,
    token_client: TokenClient,
    store: Arc<TokenStore>,
    timeout: Duration,
    open_browser: bool,
    prompt: Option<Arc<dyn AuthorizationPrompt>>,
}

impl AuthorizationFlow {
    pub fn new(endpoints: OAuthEndpoints, store: Arc<TokenStore>) -> Self {
        let token_client = TokenClient::new(&endpoints);
        Self {
            endpoints,
            token_client,
            store,
            timeout: DEFAULT_AUTH_TIMEOUT,
            open_browser: true,
            prompt: None,
        }
    }

    /// Set the redirect wait window.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Enable or disable launching the system browser.
    pub fn with_browser(mut self, open_browser: bool) -> Self {
        self.open_browser = open_browser;
        self
    }

    /// Attach an interactive prompt. Required for manual code entry.
    pub fn with_prompt(mut self, prompt: Arc<dyn AuthorizationPrompt>) -> Self {
        self.prompt = Some(prompt);
        self
    }

    /// Consent URL for the given credentials and state nonce.
    pub fn consent_url(&self, credentials: &Credentials, state: &str) -> String {
        build_auth_url(
            &self.endpoints.authorize_url,
            &credentials.client_id,
            &credentials.redirect_uri,
            SCOPES,
            state,
        )
    }

    /// Run the flow: consent, capture, exchange, persist.
    ///
    /// On success the stored record is replaced and returned. The loopback
    /// listener, if one was started, is always shut down before returning.
    pub async fn initiate(&self, credentials: Credentials) -> AuthResult<TokenRecord> {
        let redirect = Url::parse(&credentials.redirect_uri)
            .map_err(|e| AuthError::invalid_redirect(&credentials.redirect_uri, e.to_string()))?;

        let state = generate_state();
        let consent_url = self.consent_url(&credentials, &state);

        let mut server = match loopback_addr(&redirect) {
            Some(addr) => match CallbackServer::bind(addr, redirect.path(), Some(state.clone()))
                .await
            {
                Ok(server) => Some(server),
                Err(e) if self.prompt.is_some() => {
                    warn!(addr = %addr, error = %e, "Could not bind callback listener, falling back to manual entry");
                    None
                }
                Err(e) => return Err(e),
            },
            None => None,
        };

        let mode = match &server {
            Some(server) => CaptureMode::Loopback(server.local_addr()),
            None if self.prompt.is_some() => CaptureMode::Manual,
            None => {
                return Err(AuthError::invalid_redirect(
                    &credentials.redirect_uri,
                    "not a loopback address and no interactive prompt is available",
                ))
            }
        };

        match &self.prompt {
            Some(prompt) => prompt.announce(&consent_url, &mode),
            None => info!(url = %consent_url, "Open this URL to authorize"),
        }

        if self.open_browser {
            if let Err(e) = open::that_detached(&consent_url) {
                warn!(error = %e, "Failed to open browser");
            }
        }

        let code = match server.take() {
            Some(mut server) => {
                let result = server.wait_for_code(self.timeout).await;
                server.shutdown().await;
                result?
            }
            None => self.read_manual_code(&state).await?,
        };

        let issued_at = Utc::now();
        let grant = self.token_client.exchange_code(&credentials, &code).await?;
        let token = TokenRecord::from_grant(grant, issued_at)?;

        self.store
            .save(&StoredAuth {
                credentials,
                token: token.clone(),
            })
            .await?;

        info!(
            expires_at = %token.expires_at,
            scopes = token.scopes.len(),
            "Authorization complete"
        );
        Ok(token)
    }

    async fn read_manual_code(&self, state: &str) -> AuthResult<String> {
        let prompt = self
            .prompt
            .as_ref()
            .ok_or_else(|| AuthError::AuthDenied("no prompt available".to_string()))?;
        let input = prompt.read_code().await?;
        extract_code(&input, state)
    }
}

/// Pull the code out of operator input: either the bare code or the full
/// redirected URL.
fn extract_code(input: &str, expected_state: &str) -> AuthResult<String> {
    let input = input.trim();
    if input.is_empty() {
        return Err(AuthError::AuthDenied(
            "no authorization code entered".to_string(),
        ));
    }

    let url = match Url::parse(input) {
        Ok(url) if input.contains("://") => url,
        _ => return Ok(input.to_string()),
    };

    let mut code = None;
    let mut state = None;
    let mut error = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(error) = error {
        return Err(AuthError::AuthDenied(error));
    }
    if let Some(state) = state {
        if state != expected_state {
            return Err(AuthError::AuthDenied(
                "redirected URL belongs to a different authorization attempt".to_string(),
            ));
        }
    }
    code.filter(|c| !c.is_empty())
        .ok_or_else(|| AuthError::AuthDenied("redirected URL has no code".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refresh::TokenRefresher;
    use std::sync::Mutex;
    use tempfile::TempDir;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Follows the consent URL by hitting the loopback listener directly.
    struct RedirectingPrompt {
        code: String,
        announced: Mutex<Option<CaptureMode>>,
    }

    #[async_trait]
    impl AuthorizationPrompt for RedirectingPrompt {
        fn announce(&self, consent_url: &str, mode: &CaptureMode) {
            *self.announced.lock().unwrap() = Some(*mode);
            let CaptureMode::Loopback(addr) = *mode else {
                return;
            };
            let state = Url::parse(consent_url)
                .unwrap()
                .query_pairs()
                .find(|(k, _)| k == "state")
                .map(|(_, v)| v.into_owned())
                .unwrap();
            let target = format!("http://{addr}/callback?code={}&state={state}", self.code);
            tokio::spawn(async move {
                let _ = reqwest::get(target).await;
            });
        }

        async fn read_code(&self) -> std::io::Result<String> {
            Err(std::io::Error::other("not interactive"))
        }
    }

    /// Types a fixed answer.
    struct TypedPrompt(String);

    #[async_trait]
    impl AuthorizationPrompt for TypedPrompt {
        fn announce(&self, _consent_url: &str, mode: &CaptureMode) {
            assert_eq!(*mode, CaptureMode::Manual);
        }

        async fn read_code(&self) -> std::io::Result<String> {
            Ok(self.0.clone())
        }
    }

    async fn token_endpoint(expected_code: &str) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/token"))
            .and(body_string_contains(format!("code={expected_code}").as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "access-1",
                "token_type": "Bearer",
                "expires_in": 3600,
                "refresh_token": "refresh-1",
                "scope": "user-read-playback-state user-modify-playback-state"
            })))
            .expect(1)
            .mount(&server)
            .await;
        server
    }

    fn flow_for(server: &MockServer, dir: &TempDir) -> (AuthorizationFlow, Arc<TokenStore>) {
        let store = Arc::new(TokenStore::with_path(dir.path().join("credentials.json")));
        let endpoints = OAuthEndpoints::from_base(&server.uri()).unwrap();
        let flow = AuthorizationFlow::new(endpoints, store.clone())
            .with_browser(false)
            .with_timeout(Duration::from_secs(5));
        (flow, store)
    }

    #[test]
    fn test_extract_code_bare() {
        assert_eq!(extract_code("  abc123\n", "s").unwrap(), "abc123");
    }

    #[test]
    fn test_extract_code_from_url() {
        let code = extract_code("https://example.com/callback?code=xyz&state=s1", "s1").unwrap();
        assert_eq!(code, "xyz");
    }

    #[test]
    fn test_extract_code_rejects_foreign_state() {
        let err = extract_code("https://example.com/callback?code=xyz&state=other", "s1")
            .unwrap_err();
        assert!(matches!(err, AuthError::AuthDenied(_)));
    }

    #[test]
    fn test_extract_code_error_and_empty() {
        assert!(matches!(
            extract_code("https://example.com/cb?error=access_denied", "s"),
            Err(AuthError::AuthDenied(ref m)) if m == "access_denied"
        ));
        assert!(extract_code("   ", "s").is_err());
    }

    #[test]
    fn test_consent_url_carries_state_and_scopes() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(TokenStore::with_path(dir.path().join("c.json")));
        let endpoints = OAuthEndpoints::from_base(crate::DEFAULT_ACCOUNTS_URL).unwrap();
        let flow = AuthorizationFlow::new(endpoints, store);
        let creds = Credentials::new("cid", "secret", "http://127.0.0.1:8888/callback");

        let url = flow.consent_url(&creds, "nonce");
        assert!(url.contains("client_id=cid"));
        assert!(url.contains("state=nonce"));
        assert!(url.contains("playlist-modify-private"));
    }

    #[tokio::test]
    async fn test_loopback_flow_persists_token() {
        let server = token_endpoint("loop-code").await;
        let dir = TempDir::new().unwrap();
        let (flow, store) = flow_for(&server, &dir);
        let prompt = Arc::new(RedirectingPrompt {
            code: "loop-code".to_string(),
            announced: Mutex::new(None),
        });
        let flow = flow.with_prompt(prompt.clone());

        let creds = Credentials::new("cid", "secret", "http://127.0.0.1:0/callback");
        let token = flow.initiate(creds.clone()).await.unwrap();

        assert_eq!(token.access_token, "access-1");
        assert_eq!(token.refresh_token, "refresh-1");
        assert!(token.expires_at > Utc::now());
        assert!(matches!(
            *prompt.announced.lock().unwrap(),
            Some(CaptureMode::Loopback(_))
        ));

        let stored = store.require().await.unwrap();
        assert_eq!(stored.credentials, creds);
        assert_eq!(stored.token, token);

        // A refresher over the same file serves the new token without a grant
        let endpoints = OAuthEndpoints::from_base(&server.uri()).unwrap();
        let refresher = TokenRefresher::new(store.clone(), TokenClient::new(&endpoints));
        assert_eq!(refresher.get_valid_access_token().await.unwrap(), "access-1");

        Mock::given(method("POST"))
            .and(path("/api/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=refresh-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "access-2",
                "token_type": "Bearer",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;

        let refreshed = refresher.force_refresh().await.unwrap();
        assert_eq!(refreshed.access_token, "access-2");
        assert_eq!(refreshed.refresh_token, "refresh-1");
        assert_eq!(store.require().await.unwrap().token, refreshed);
        assert_eq!(refresher.get_valid_access_token().await.unwrap(), "access-2");
    }

    #[tokio::test]
    async fn test_manual_flow_accepts_pasted_url() {
        let server = token_endpoint("pasted").await;
        let dir = TempDir::new().unwrap();
        let (flow, store) = flow_for(&server, &dir);
        let flow = flow.with_prompt(Arc::new(TypedPrompt(
            "https://example.com/callback?code=pasted".to_string(),
        )));

        let creds = Credentials::new("cid", "secret", "https://example.com/callback");
        flow.initiate(creds).await.unwrap();

        assert!(store.exists().await);
    }

    #[tokio::test]
    async fn test_non_loopback_without_prompt_is_rejected() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        let (flow, store) = flow_for(&server, &dir);

        let creds = Credentials::new("cid", "secret", "https://example.com/callback");
        let err = flow.initiate(creds).await.unwrap_err();

        assert!(matches!(err, AuthError::InvalidRedirectUri { .. }));
        assert!(!store.exists().await);
    }

    #[tokio::test]
    async fn test_timeout_leaves_store_untouched() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        let (flow, store) = flow_for(&server, &dir);
        let flow = flow.with_timeout(Duration::from_millis(50));

        let creds = Credentials::new("cid", "secret", "http://127.0.0.1:0/callback");
        let err = flow.initiate(creds).await.unwrap_err();

        assert!(matches!(err, AuthError::AuthTimeout(_)));
        assert!(!store.exists().await);
    }

    #[tokio::test]
    async fn test_rejected_exchange_leaves_store_untouched() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant"
            })))
            .mount(&server)
            .await;
        let dir = TempDir::new().unwrap();
        let (flow, store) = flow_for(&server, &dir);
        let flow = flow.with_prompt(Arc::new(TypedPrompt("bad-code".to_string())));

        let creds = Credentials::new("cid", "secret", "urn:ietf:wg:oauth:2.0:oob");
        let err = flow.initiate(creds).await.unwrap_err();

        assert!(matches!(err, AuthError::AuthExchangeFailed(_)));
        assert!(!store.exists().await);
    }
}
