//! The `serve` command: MCP over stdio.

use super::token_store;
use anyhow::Context;
use music_mcp::Config;
use music_mcp_auth::{TokenClient, TokenRefresher};
use music_mcp_server::{Dispatcher, McpServer, ToolContext, ToolRegistry};
use music_mcp_spotify::SpotifyClient;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Serve MCP requests until stdin closes or Ctrl-C.
pub async fn handle_serve(config: &Config, config_dir: &Path) -> anyhow::Result<()> {
    let store = Arc::new(token_store(config_dir));
    let token_client = TokenClient::new(&config.endpoints()?);
    let refresher = Arc::new(
        TokenRefresher::new(store, token_client).with_margin(config.refresh_margin()),
    );

    let api = SpotifyClient::with_base_url(refresher.clone(), &config.api_url);
    let dispatcher = Dispatcher::new(
        Arc::new(ToolRegistry::with_builtins()),
        ToolContext::new(Arc::new(api)),
    )
    .with_server_info("music-mcp", env!("CARGO_PKG_VERSION"));

    let cancel = CancellationToken::new();
    let mut server = McpServer::new(dispatcher)
        .with_token_source(refresher)
        .with_cancellation(cancel.clone());

    let interrupted = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupted, shutting down");
                cancel.cancel();
            }
            Err(e) => warn!(error = %e, "Could not listen for Ctrl-C"),
        }
    });

    let result = server.serve_stdio().await.context("MCP server failed");

    if interrupted.is_cancelled() {
        // A pending stdin read holds a blocking thread that runtime shutdown
        // would wait on until the peer closes the pipe.
        let _ = std::io::Write::flush(&mut std::io::stdout());
        let code = match &result {
            Ok(()) => 0,
            Err(e) => {
                error!(error = %e, "MCP server failed");
                1
            }
        };
        info!("Exiting after interrupt");
        std::process::exit(code);
    }

    result
}
