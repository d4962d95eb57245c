//! The `status` command.

use super::token_store;
use anyhow::Context;
use chrono::Utc;
use music_mcp::Config;
use music_mcp_auth::{AccessTokenSource, TokenClient, TokenRefresher};
use music_mcp_spotify::{MusicApi, SpotifyClient};
use std::path::Path;
use std::sync::Arc;

/// Report stored credentials, token expiry and the account behind them.
pub async fn handle_status(config: &Config, config_dir: &Path, refresh: bool) -> anyhow::Result<()> {
    let store = Arc::new(token_store(config_dir));
    let Some(auth) = store.load().await? else {
        println!("Not configured. Run `music-mcp setup` to authorize this machine.");
        return Ok(());
    };

    println!("Credentials: {}", store.path().display());
    println!("  Client ID:    {}", auth.credentials.client_id);
    println!("  Redirect URI: {}", auth.credentials.redirect_uri);
    if !auth.token.scopes.is_empty() {
        let scopes: Vec<&str> = auth.token.scopes.iter().map(String::as_str).collect();
        println!("  Scopes:       {}", scopes.join(" "));
    }

    let refresher = Arc::new(
        TokenRefresher::new(store, TokenClient::new(&config.endpoints()?))
            .with_margin(config.refresh_margin()),
    );

    let token = if refresh {
        let token = refresher.force_refresh().await.context("Token refresh failed")?;
        println!("  Token refreshed.");
        token
    } else {
        auth.token
    };

    let remaining = token.expires_at - Utc::now();
    if remaining <= chrono::Duration::zero() {
        println!("  Token expired at {} (refreshed on next use)", token.expires_at.to_rfc3339());
    } else {
        println!(
            "  Token expires at {} (in {} min)",
            token.expires_at.to_rfc3339(),
            remaining.num_minutes()
        );
    }

    let source: Arc<dyn AccessTokenSource> = refresher;
    let api = SpotifyClient::with_base_url(source, &config.api_url);
    let user = api.current_user().await.context("Could not reach Spotify")?;
    println!(
        "Logged in as {}",
        user.display_name.as_deref().unwrap_or(user.id.as_str())
    );
    Ok(())
}
