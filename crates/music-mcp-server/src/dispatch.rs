//! JSON-RPC dispatch onto the tool registry.

use crate::error::ToolError;
use crate::protocol::{
    error_codes, CallToolParams, InitializeParams, InitializeResult, JsonRpcError, JsonRpcId,
    JsonRpcRequest, JsonRpcResponse, ListToolsResult, McpTool, ServerCapabilities, ServerInfo,
    ToolCallResult, ToolsCapability, PROTOCOL_VERSION,
};
use crate::registry::{ToolContext, ToolRegistry};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Resolves requests against a [`ToolRegistry`].
///
/// Until `initialize` has been seen, only `initialize` and `ping` are served.
pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
    context: ToolContext,
    name: String,
    version: String,
    initialized: AtomicBool,
}

impl Dispatcher {
    pub fn new(registry: Arc<ToolRegistry>, context: ToolContext) -> Self {
        Self {
            registry,
            context,
            name: "music-mcp".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            initialized: AtomicBool::new(false),
        }
    }

    /// Override the name and version reported by `initialize`.
    pub fn with_server_info(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.name = name.into();
        self.version = version.into();
        self
    }

    /// Whether the `initialize` handshake has completed.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Handle one raw line from the transport.
    ///
    /// Returns `None` for notifications.
    pub async fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        let value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "Unparseable request");
                return Some(JsonRpcResponse::error(
                    None,
                    error_codes::PARSE_ERROR,
                    format!("Parse error: {e}"),
                ));
            }
        };

        let id = value
            .get("id")
            .and_then(|id| serde_json::from_value::<JsonRpcId>(id.clone()).ok());

        let request: JsonRpcRequest = match serde_json::from_value(value) {
            Ok(request) => request,
            Err(e) => {
                return Some(JsonRpcResponse::error(
                    id,
                    error_codes::INVALID_REQUEST,
                    format!("Invalid request: {e}"),
                ));
            }
        };

        if request.jsonrpc != "2.0" {
            return request.id.map(|id| {
                JsonRpcResponse::error(
                    Some(id),
                    error_codes::INVALID_REQUEST,
                    "Invalid request: jsonrpc must be \"2.0\"",
                )
            });
        }

        self.handle_request(request).await
    }

    /// Handle a parsed request.
    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        debug!(method = %request.method, id = ?request.id, "Handling MCP request");

        let Some(id) = request.id else {
            match request.method.as_str() {
                "notifications/initialized" => debug!("Received initialized notification"),
                "notifications/cancelled" => debug!("Received cancellation notification"),
                other => debug!(method = %other, "Ignoring notification"),
            }
            return None;
        };

        let method = request.method.as_str();
        if !self.is_initialized() && method != "initialize" && method != "ping" {
            warn!(method = %method, "Request before initialize");
            return Some(JsonRpcResponse::error(
                Some(id),
                error_codes::SERVER_NOT_INITIALIZED,
                "Server not initialized",
            ));
        }

        let response = match method {
            "initialize" => self.handle_initialize(id, request.params),
            "ping" => JsonRpcResponse::success(id, json!({})),
            "tools/list" => self.handle_list_tools(id),
            "tools/call" => self.handle_call_tool(id, request.params).await,
            other => JsonRpcResponse::error(
                Some(id),
                error_codes::METHOD_NOT_FOUND,
                format!("Method not found: {other}"),
            ),
        };
        Some(response)
    }

    fn handle_initialize(&self, id: JsonRpcId, params: Option<Value>) -> JsonRpcResponse {
        let params: InitializeParams = params
            .and_then(|p| serde_json::from_value(p).ok())
            .unwrap_or_default();
        info!(
            client = params.client_info.as_ref().map(|c| c.name.as_str()).unwrap_or("unknown"),
            protocol = params.protocol_version.as_deref().unwrap_or("unspecified"),
            "Client initialized"
        );

        self.initialized.store(true, Ordering::SeqCst);

        let result = InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability {
                    list_changed: false,
                }),
            },
            server_info: ServerInfo {
                name: self.name.clone(),
                version: Some(self.version.clone()),
            },
        };
        to_response(id, &result)
    }

    fn handle_list_tools(&self, id: JsonRpcId) -> JsonRpcResponse {
        debug!(count = self.registry.len(), "Listing tools");
        let tools: Vec<McpTool> = self
            .registry
            .descriptors()
            .into_iter()
            .map(McpTool::from)
            .collect();
        to_response(id, &ListToolsResult { tools })
    }

    async fn handle_call_tool(&self, id: JsonRpcId, params: Option<Value>) -> JsonRpcResponse {
        let Some(params) = params else {
            return JsonRpcResponse::error(Some(id), error_codes::INVALID_PARAMS, "Missing params");
        };
        let params: CallToolParams = match serde_json::from_value(params) {
            Ok(params) => params,
            Err(e) => {
                return JsonRpcResponse::error(
                    Some(id),
                    error_codes::INVALID_PARAMS,
                    format!("Invalid params: {e}"),
                );
            }
        };

        match self
            .call_tool(&params.name, params.arguments.unwrap_or(Value::Null))
            .await
        {
            Ok(result) => to_response(id, &result),
            Err(error) => JsonRpcResponse {
                jsonrpc: "2.0".to_string(),
                id: Some(id),
                result: None,
                error: Some(error),
            },
        }
    }

    /// Run a tool by name.
    ///
    /// Unknown tools and invalid arguments are protocol errors; everything
    /// that goes wrong after validation is an in-band error result.
    pub async fn call_tool(&self, name: &str, args: Value) -> Result<ToolCallResult, JsonRpcError> {
        let Some(tool) = self.registry.get(name) else {
            return Err(JsonRpcError {
                code: error_codes::INVALID_PARAMS,
                message: format!("Unknown tool: {name}"),
                data: None,
            });
        };

        debug!(tool = %name, "Calling tool");
        match tool.execute(args, &self.context).await {
            Ok(text) => {
                debug!(tool = %name, output_len = text.len(), "Tool completed successfully");
                Ok(ToolCallResult::text(text))
            }
            Err(ToolError::Validation(message)) => {
                debug!(tool = %name, error = %message, "Tool arguments rejected");
                Err(JsonRpcError {
                    code: error_codes::INVALID_PARAMS,
                    message: format!("Invalid params for {name}: {message}"),
                    data: None,
                })
            }
            Err(e) => {
                warn!(tool = %name, error = %e, "Tool failed");
                Ok(ToolCallResult::error(format!("Error: {e}")))
            }
        }
    }
}

fn to_response<T: serde::Serialize>(id: JsonRpcId, result: &T) -> JsonRpcResponse {
    match serde_json::to_value(result) {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(e) => JsonRpcResponse::error(
            Some(id),
            error_codes::INTERNAL_ERROR,
            format!("Failed to serialize result: {e}"),
        ),
    }
}
