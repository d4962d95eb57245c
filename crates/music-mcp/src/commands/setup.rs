//! The `setup` command: authorize this machine and save credentials.

use super::token_store;
use anyhow::bail;
use async_trait::async_trait;
use music_mcp::Config;
use music_mcp_auth::{AuthorizationFlow, AuthorizationPrompt, CaptureMode, Credentials};
use serde_json::json;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader, Stdin};
use tokio::sync::Mutex;
use tracing::warn;

/// Line input from stdin shared by every prompt of one setup run.
///
/// Piped input can arrive in one read; a single buffered reader keeps the
/// lines meant for later prompts.
struct Console {
    input: Mutex<BufReader<Stdin>>,
}

impl Console {
    fn new() -> Self {
        Self {
            input: Mutex::new(BufReader::new(tokio::io::stdin())),
        }
    }

    async fn read_line(&self) -> io::Result<String> {
        let mut line = String::new();
        self.input.lock().await.read_line(&mut line).await?;
        Ok(line.trim().to_string())
    }

    async fn ask(&self, question: &str) -> io::Result<String> {
        print!("{question}");
        io::stdout().flush()?;
        self.read_line().await
    }
}

/// Operator prompt on the controlling terminal.
struct ConsolePrompt {
    console: Arc<Console>,
}

#[async_trait]
impl AuthorizationPrompt for ConsolePrompt {
    fn announce(&self, consent_url: &str, mode: &CaptureMode) {
        println!();
        println!("Open this URL in your browser to authorize music-mcp:");
        println!();
        println!("  {consent_url}");
        println!();
        match mode {
            CaptureMode::Loopback(addr) => {
                println!("Waiting for Spotify to redirect to http://{addr} ...");
            }
            CaptureMode::Manual => {
                println!("After approving, your browser is sent to the redirect URI.");
                println!("Paste that full URL (or just the code parameter) below.");
            }
        }
    }

    async fn read_code(&self) -> io::Result<String> {
        self.console.ask("Redirected URL or code: ").await
    }
}

/// Run the authorization flow and persist the result.
pub async fn handle_setup(
    config: &Config,
    config_dir: &Path,
    force: bool,
    no_browser: bool,
) -> anyhow::Result<()> {
    let store = Arc::new(token_store(config_dir));
    let console = Arc::new(Console::new());

    println!();
    println!("Spotify Authorization");
    println!("=====================");

    match store.load().await {
        Ok(Some(existing)) if !force => {
            println!();
            println!(
                "Credentials for client {} already exist at {}.",
                existing.credentials.client_id,
                store.path().display()
            );
            let answer = console.ask("Reconfigure? [y/N]: ").await?;
            if !answer.eq_ignore_ascii_case("y") && !answer.eq_ignore_ascii_case("yes") {
                println!("Keeping existing credentials.");
                return Ok(());
            }
        }
        Ok(_) => {}
        Err(e) => {
            warn!(error = %e, "Existing credentials are unreadable, replacing them");
            println!();
            println!("Existing credentials could not be read ({e}); they will be replaced.");
        }
    }

    println!();
    println!("Create an app at https://developer.spotify.com/dashboard and register");
    println!("the redirect URI below in its settings.");
    println!();

    let client_id = match &config.client_id {
        Some(id) => id.clone(),
        None => console.ask("Client ID: ").await?,
    };
    let client_secret = match &config.client_secret {
        Some(secret) => secret.clone(),
        None => console.ask("Client secret: ").await?,
    };
    if client_id.is_empty() || client_secret.is_empty() {
        bail!("Client ID and client secret are both required");
    }

    let redirect_uri = console
        .ask(&format!("Redirect URI [{}]: ", config.redirect_uri))
        .await?;
    let redirect_uri = if redirect_uri.is_empty() {
        config.redirect_uri.clone()
    } else {
        redirect_uri
    };

    let flow = AuthorizationFlow::new(config.endpoints()?, store.clone())
        .with_timeout(config.auth_timeout())
        .with_browser(!no_browser)
        .with_prompt(Arc::new(ConsolePrompt { console }));

    let token = flow
        .initiate(Credentials::new(client_id, client_secret, redirect_uri))
        .await?;

    println!();
    println!("Authorization complete.");
    println!("  Credentials: {}", store.path().display());
    println!("  Token valid until: {}", token.expires_at.to_rfc3339());
    println!();
    println!("Add this to your MCP client configuration:");
    println!();
    println!("{}", client_snippet(config_dir)?);

    Ok(())
}

/// MCP client configuration pointing at this binary.
fn client_snippet(config_dir: &Path) -> anyhow::Result<String> {
    let command = std::env::current_exe()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| "music-mcp".to_string());
    let snippet = json!({
        "mcpServers": {
            "music": {
                "command": command,
                "args": ["--config-dir", config_dir.display().to_string(), "serve"]
            }
        }
    });
    Ok(serde_json::to_string_pretty(&snippet)?)
}
