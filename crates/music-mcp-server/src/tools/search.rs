//! Track search.

use super::{bounded_limit, format_track_line, parse_args, required_str};
use crate::error::ToolResult;
use crate::registry::{Tool, ToolContext};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

const DEFAULT_LIMIT: u32 = 5;
const MAX_LIMIT: u32 = 50;

pub struct SearchTracksTool;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SearchArgs {
    query: String,
    #[serde(default)]
    limit: Option<i64>,
}

#[async_trait]
impl Tool for SearchTracksTool {
    fn id(&self) -> &str {
        "search_tracks"
    }

    fn description(&self) -> &str {
        "Search for tracks on Spotify. Returns names, artists and URIs usable with play_track and add_to_playlist."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["query"],
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search text, e.g. an artist, title or both"
                },
                "limit": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": MAX_LIMIT,
                    "description": format!("Maximum number of results (default: {DEFAULT_LIMIT})")
                }
            },
            "additionalProperties": false
        })
    }

    fn required_scopes(&self) -> &'static [&'static str] {
        &[]
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolResult<String> {
        let args: SearchArgs = parse_args(args)?;
        let query = required_str("query", &args.query)?;
        let limit = bounded_limit("limit", args.limit, DEFAULT_LIMIT, MAX_LIMIT)?;

        let tracks = ctx.api.search_tracks(query, limit).await?;
        if tracks.is_empty() {
            return Ok(format!("No tracks found for '{query}'."));
        }

        let lines: Vec<String> = tracks.iter().map(format_track_line).collect();
        Ok(format!("Search results for '{query}':\n{}", lines.join("\n")))
    }
}
