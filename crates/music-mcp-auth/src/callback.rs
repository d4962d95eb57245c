//! Loopback listener that captures the authorization redirect.
//!
//! The listener lives only for the duration of one authorization attempt.
//! The first redirect carrying a code fills a single-use slot; later hits
//! are answered with 400 and never replace the captured value.

use crate::error::{AuthError, AuthResult};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::{Host, Url};

/// How long a single browser connection may take to send its request line.
const READ_TIMEOUT: Duration = Duration::from_secs(5);

const HTML_SUCCESS: &str = r#"<!DOCTYPE html>
<html>
<head>
  <title>music-mcp - Authorization Successful</title>
  <style>
    body { font-family: system-ui, -apple-system, sans-serif; display: flex; justify-content: center; align-items: center; height: 100vh; margin: 0; background: #121212; color: #eee; }
    .container { text-align: center; padding: 2rem; }
    h1 { color: #1db954; margin-bottom: 1rem; }
    p { color: #aaa; }
  </style>
</head>
<body>
  <div class="container">
    <h1>Authorization Successful</h1>
    <p>You can close this window and return to the terminal.</p>
  </div>
  <script>setTimeout(() => window.close(), 2000);</script>
</body>
</html>"#;

fn html_error(error: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
  <title>music-mcp - Authorization Failed</title>
  <style>
    body {{ font-family: system-ui, -apple-system, sans-serif; display: flex; justify-content: center; align-items: center; height: 100vh; margin: 0; background: #121212; color: #eee; }}
    .container {{ text-align: center; padding: 2rem; }}
    h1 {{ color: #f87171; margin-bottom: 1rem; }}
    .error {{ color: #fca5a5; font-family: monospace; margin-top: 1rem; }}
  </style>
</head>
<body>
  <div class="container">
    <h1>Authorization Failed</h1>
    <div class="error">{}</div>
  </div>
</body>
</html>"#,
        html_escape(error)
    )
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Outcome delivered through the capture slot: a code, or the provider's error.
type Capture = Result<String, String>;

/// Single-use slot filled by the first valid redirect.
type CaptureSlot = Arc<Mutex<Option<oneshot::Sender<Capture>>>>;

/// Routing rules shared by every connection.
struct CallbackRoute {
    path: String,
    expected_state: Option<String>,
}

/// Short-lived HTTP listener for the authorization redirect.
pub struct CallbackServer {
    local_addr: SocketAddr,
    receiver: Option<oneshot::Receiver<Capture>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl CallbackServer {
    /// Bind the listener and start accepting connections.
    ///
    /// Requests are only honored on `path`. When `expected_state` is set, a
    /// redirect whose `state` differs is rejected without consuming the slot.
    pub async fn bind(
        addr: SocketAddr,
        path: impl Into<String>,
        expected_state: Option<String>,
    ) -> AuthResult<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, "Authorization callback listener started");

        let (code_tx, code_rx) = oneshot::channel();
        let slot: CaptureSlot = Arc::new(Mutex::new(Some(code_tx)));
        let route = Arc::new(CallbackRoute {
            path: path.into(),
            expected_state,
        });
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, peer)) => {
                                debug!(peer = %peer, "Callback connection");
                                let slot = slot.clone();
                                let route = route.clone();
                                tokio::spawn(async move {
                                    if let Err(e) = handle_connection(stream, &route, &slot).await {
                                        warn!(error = %e, "Error handling authorization callback");
                                    }
                                });
                            }
                            Err(e) => {
                                warn!(error = %e, "Error accepting connection");
                            }
                        }
                    }
                    _ = &mut shutdown_rx => {
                        debug!("Authorization callback listener shutting down");
                        break;
                    }
                }
            }
        });

        Ok(Self {
            local_addr,
            receiver: Some(code_rx),
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Wait for the redirect to deliver a code.
    pub async fn wait_for_code(&mut self, timeout: Duration) -> AuthResult<String> {
        let receiver = self
            .receiver
            .as_mut()
            .ok_or_else(|| AuthError::AuthDenied("authorization code already taken".to_string()))?;

        let outcome = match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(Ok(code))) => Ok(code),
            Ok(Ok(Err(error))) => Err(AuthError::AuthDenied(error)),
            Ok(Err(_)) => Err(AuthError::AuthDenied(
                "callback listener stopped".to_string(),
            )),
            Err(_) => return Err(AuthError::AuthTimeout(timeout)),
        };

        self.receiver = None;
        outcome
    }

    /// Stop accepting connections and release the port.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for CallbackServer {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Socket address to listen on for a loopback redirect URI.
///
/// Returns `None` unless the URI is plain `http` on `localhost`, `127.0.0.1`
/// or `[::1]`; such redirects can only be captured by hand.
pub fn loopback_addr(redirect_uri: &Url) -> Option<SocketAddr> {
    if redirect_uri.scheme() != "http" {
        return None;
    }

    let ip = match redirect_uri.host()? {
        Host::Domain(domain) if domain.eq_ignore_ascii_case("localhost") => {
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        }
        Host::Domain(_) => return None,
        Host::Ipv4(addr) if addr.is_loopback() => IpAddr::V4(addr),
        Host::Ipv6(addr) if addr.is_loopback() => IpAddr::V6(addr),
        _ => return None,
    };

    let port = redirect_uri.port_or_known_default()?;
    Some(SocketAddr::new(ip, port))
}

async fn handle_connection(
    mut stream: TcpStream,
    route: &CallbackRoute,
    slot: &CaptureSlot,
) -> std::io::Result<()> {
    let mut buffer = [0u8; 4096];
    let n = match tokio::time::timeout(READ_TIMEOUT, stream.read(&mut buffer)).await {
        Ok(read) => read?,
        Err(_) => return Ok(()),
    };

    let request = String::from_utf8_lossy(&buffer[..n]);
    let first_line = request.lines().next().unwrap_or("");
    let parts: Vec<&str> = first_line.split_whitespace().collect();

    let (status, content_type, body) = if parts.len() < 2 || parts[0] != "GET" {
        (400, "text/plain", "Bad Request".to_string())
    } else {
        route_request(parts[1], route, slot).await
    };

    let response = http_response(status, content_type, &body);
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await.ok();
    Ok(())
}

async fn route_request(
    target: &str,
    route: &CallbackRoute,
    slot: &CaptureSlot,
) -> (u16, &'static str, String) {
    let parsed = match Url::parse(&format!("http://127.0.0.1{target}")) {
        Ok(u) => u,
        Err(_) => return (400, "text/plain", "Invalid URL".to_string()),
    };

    if parsed.path() != route.path {
        return (404, "text/plain", "Not Found".to_string());
    }

    let params: HashMap<String, String> = parsed
        .query_pairs()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    if let Some(expected) = &route.expected_state {
        if params.get("state") != Some(expected) {
            warn!("Authorization callback with mismatched state");
            return (
                400,
                "text/html",
                html_error("State parameter does not match this authorization attempt"),
            );
        }
    }

    if let Some(err) = params.get("error") {
        let message = params
            .get("error_description")
            .cloned()
            .unwrap_or_else(|| err.clone());
        if let Some(sender) = slot.lock().await.take() {
            let _ = sender.send(Err(message.clone()));
        }
        return (400, "text/html", html_error(&message));
    }

    let Some(code) = params.get("code").filter(|c| !c.is_empty()) else {
        return (
            400,
            "text/html",
            html_error("No authorization code provided"),
        );
    };

    match slot.lock().await.take() {
        Some(sender) => {
            let _ = sender.send(Ok(code.clone()));
            info!("Captured authorization code");
            (200, "text/html", HTML_SUCCESS.to_string())
        }
        None => (
            400,
            "text/html",
            html_error("An authorization code was already received"),
        ),
    }
}

fn http_response(status: u16, content_type: &str, body: &str) -> String {
    let status_text = match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        _ => "Unknown",
    };

    format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        status_text,
        content_type,
        body.len(),
        body
    )
}
