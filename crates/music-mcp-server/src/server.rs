//! Protocol server lifecycle.

use crate::dispatch::Dispatcher;
use crate::error::{ServerError, ServerResult};
use crate::protocol::{error_codes, JsonRpcResponse};
use crate::transport::{self, Inbound, LineTransport};
use music_mcp_auth::AccessTokenSource;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Where the server is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Constructed; no token checked yet.
    Uninitialized,
    /// A valid access token was obtained; waiting for `initialize`.
    Ready,
    /// Handshake done; serving tool requests.
    Serving,
    /// Transport closed or cancelled.
    Shutdown,
}

/// MCP server over a line transport.
pub struct McpServer {
    dispatcher: Dispatcher,
    tokens: Option<Arc<dyn AccessTokenSource>>,
    cancel: CancellationToken,
    state: ServerState,
}

impl McpServer {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher,
            tokens: None,
            cancel: CancellationToken::new(),
            state: ServerState::Uninitialized,
        }
    }

    /// Require a valid access token before serving.
    pub fn with_token_source(mut self, tokens: Arc<dyn AccessTokenSource>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    /// Stop serving when `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    /// Token that stops the serve loop.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Acquire a valid access token, refreshing it if needed.
    ///
    /// Missing or unrefreshable credentials are fatal here, before any
    /// request has been read.
    pub async fn start(&mut self) -> ServerResult<()> {
        match self.state {
            ServerState::Uninitialized => {}
            ServerState::Shutdown => return Err(ServerError::AlreadyShutdown),
            ServerState::Ready | ServerState::Serving => return Ok(()),
        }

        if let Some(tokens) = &self.tokens {
            tokens.access_token().await?;
            debug!("Startup access token is valid");
        }
        self.state = ServerState::Ready;
        info!(tools = self.dispatcher.registry().len(), "MCP server ready");
        Ok(())
    }

    /// Serve over stdin/stdout until EOF or cancellation.
    pub async fn serve_stdio(&mut self) -> ServerResult<()> {
        self.serve(transport::stdio()).await.map(|_| ())
    }

    /// Serve one request at a time until the input ends or the server is
    /// cancelled. Returns the transport so callers can inspect the writer.
    pub async fn serve<R, W>(
        &mut self,
        mut transport: LineTransport<R, W>,
    ) -> ServerResult<LineTransport<R, W>>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        self.start().await?;

        let result = self.serve_loop(&mut transport).await;
        self.state = ServerState::Shutdown;
        info!("MCP server shut down");
        result.map(|()| transport)
    }

    async fn serve_loop<R, W>(&mut self, transport: &mut LineTransport<R, W>) -> ServerResult<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        loop {
            let line = tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("Cancellation requested");
                    return Ok(());
                }
                line = transport.recv() => line?,
            };

            let response = match line {
                None => {
                    info!("Input closed");
                    return Ok(());
                }
                Some(Inbound::Message(line)) => self.dispatcher.handle_line(&line).await,
                Some(Inbound::Malformed(reason)) => Some(JsonRpcResponse::error(
                    None,
                    error_codes::PARSE_ERROR,
                    format!("Parse error: {reason}"),
                )),
            };

            if let Some(response) = response {
                transport.send(&response).await?;
            }

            if self.state == ServerState::Ready && self.dispatcher.is_initialized() {
                self.state = ServerState::Serving;
                debug!("Handshake complete, serving");
            }
        }
    }
}
