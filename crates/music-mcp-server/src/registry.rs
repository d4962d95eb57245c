//! Tool trait and registry.

use crate::error::ToolResult;
use crate::protocol::McpTool;
use async_trait::async_trait;
use music_mcp_spotify::MusicApi;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Context provided to tools during execution.
#[derive(Clone)]
pub struct ToolContext {
    /// Streaming-service client. Fetches (and refreshes) a token per call.
    pub api: Arc<dyn MusicApi>,
}

impl ToolContext {
    pub fn new(api: Arc<dyn MusicApi>) -> Self {
        Self { api }
    }
}

/// A named, schema-typed operation exposed to the protocol client.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool ID.
    fn id(&self) -> &str;

    /// Get the tool description (for the model).
    fn description(&self) -> &str;

    /// Get the JSON Schema for the tool's parameters.
    fn parameters_schema(&self) -> Value;

    /// OAuth scopes the tool relies on.
    fn required_scopes(&self) -> &'static [&'static str];

    /// Execute the tool, returning human-readable text.
    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolResult<String>;
}

/// A boxed tool for dynamic dispatch.
pub type BoxedTool = Arc<dyn Tool>;

/// Static description of a registered tool.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub scopes: Vec<String>,
}

impl From<ToolDescriptor> for McpTool {
    fn from(descriptor: ToolDescriptor) -> Self {
        Self {
            name: descriptor.name,
            description: Some(descriptor.description),
            input_schema: descriptor.input_schema,
        }
    }
}

/// Registry of available tools, ordered by name.
pub struct ToolRegistry {
    tools: BTreeMap<String, BoxedTool>,
}

impl ToolRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// Create a registry with every music tool.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::tools::register_all(&mut registry);
        registry
    }

    /// Register a tool, replacing any tool with the same ID.
    pub fn register(&mut self, tool: BoxedTool) {
        self.tools.insert(tool.id().to_string(), tool);
    }

    /// Get a tool by ID.
    pub fn get(&self, id: &str) -> Option<&BoxedTool> {
        self.tools.get(id)
    }

    /// List all tool IDs.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Describe every registered tool.
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools
            .values()
            .map(|tool| ToolDescriptor {
                name: tool.id().to_string(),
                description: tool.description().to_string(),
                input_schema: tool.parameters_schema(),
                scopes: tool
                    .required_scopes()
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            })
            .collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use music_mcp_auth::SCOPES;

    #[test]
    fn test_builtins_are_registered() {
        let registry = ToolRegistry::with_builtins();
        assert_eq!(registry.len(), 15);
        for name in [
            "play_music",
            "pause_music",
            "next_track",
            "previous_track",
            "play_track",
            "current_track",
            "get_devices",
            "transfer_playback",
            "get_playlists",
            "create_playlist",
            "get_playlist_tracks",
            "add_to_playlist",
            "remove_from_playlist",
            "delete_playlist",
            "search_tracks",
        ] {
            assert!(registry.get(name).is_some(), "missing tool {name}");
        }
    }

    #[test]
    fn test_names_are_sorted() {
        let registry = ToolRegistry::with_builtins();
        let names = registry.names();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        assert_eq!(names, sorted);
    }

    #[test]
    fn test_descriptors_have_object_schemas() {
        for descriptor in ToolRegistry::with_builtins().descriptors() {
            assert_eq!(
                descriptor.input_schema["type"], "object",
                "{} schema is not an object",
                descriptor.name
            );
            assert!(!descriptor.description.is_empty());
        }
    }

    #[test]
    fn test_declared_scopes_are_requested() {
        for descriptor in ToolRegistry::with_builtins().descriptors() {
            for scope in &descriptor.scopes {
                assert!(
                    SCOPES.contains(&scope.as_str()),
                    "{} declares unrequested scope {scope}",
                    descriptor.name
                );
            }
        }
    }
}
