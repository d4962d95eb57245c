//! Newline-delimited JSON transport.
//!
//! One JSON-RPC message per line in each direction. Stdout carries nothing
//! but protocol messages; logs go elsewhere.

use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::io::{Stdin, Stdout};
use tracing::{trace, warn};

/// One line read from the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A line of text, not yet parsed.
    Message(String),
    /// A line that is not valid UTF-8.
    Malformed(String),
}

/// Line-oriented message transport over any async reader/writer pair.
pub struct LineTransport<R, W> {
    reader: R,
    buf: Vec<u8>,
    writer: W,
}

impl<R, W> LineTransport<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            writer,
        }
    }

    /// Next non-blank line, or `None` at end of input.
    ///
    /// Cancel-safe: bytes of a partially read line stay buffered for the
    /// next call.
    pub async fn recv(&mut self) -> std::io::Result<Option<Inbound>> {
        loop {
            let n = self.reader.read_until(b'\n', &mut self.buf).await?;
            if n == 0 && self.buf.is_empty() {
                return Ok(None);
            }

            let raw = std::mem::take(&mut self.buf);
            let line = match String::from_utf8(raw) {
                Ok(line) => line,
                Err(e) => {
                    warn!(error = %e.utf8_error(), "Received a line that is not UTF-8");
                    return Ok(Some(Inbound::Malformed(e.utf8_error().to_string())));
                }
            };

            let line = line.trim_end_matches(['\n', '\r']);
            if line.trim().is_empty() {
                continue;
            }
            trace!(line = %line, "Received");
            return Ok(Some(Inbound::Message(line.to_string())));
        }
    }

    /// Serialize `message` as one line and flush it.
    pub async fn send<T: Serialize>(&mut self, message: &T) -> std::io::Result<()> {
        let mut json = serde_json::to_string(message)?;
        trace!(line = %json, "Sending");
        json.push('\n');
        self.writer.write_all(json.as_bytes()).await?;
        self.writer.flush().await
    }

    /// Give back the writer, e.g. to inspect what was sent.
    pub fn into_writer(self) -> W {
        self.writer
    }
}

/// Transport over the process's stdin and stdout.
pub fn stdio() -> LineTransport<BufReader<Stdin>, Stdout> {
    LineTransport::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
}
