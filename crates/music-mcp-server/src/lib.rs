//! MCP server exposing Spotify remote-control tools.
//!
//! Requests arrive as newline-delimited JSON-RPC 2.0 on stdin and are
//! answered on stdout:
//!
//! - `initialize` / `notifications/initialized` - handshake
//! - `tools/list` - the tool catalogue with JSON Schema parameters
//! - `tools/call` - run a tool against the Spotify Web API
//!
//! Tool failures caused by the service are returned in-band as error
//! results; only malformed requests become JSON-RPC errors.

pub mod dispatch;
mod error;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod tools;
pub mod transport;

pub use dispatch::Dispatcher;
pub use error::{ServerError, ServerResult, ToolError, ToolResult};
pub use registry::{BoxedTool, Tool, ToolContext, ToolDescriptor, ToolRegistry};
pub use server::{McpServer, ServerState};
pub use transport::{Inbound, LineTransport};
