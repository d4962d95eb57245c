//! Music tools exposed over MCP.
//!
//! Every tool parses its arguments into a typed struct before touching the
//! network. Argument problems come back as [`ToolError::Validation`]; service
//! failures as [`ToolError::Api`].

mod devices;
mod playback;
mod playlists;
mod search;

pub use devices::{GetDevicesTool, TransferPlaybackTool};
pub use playback::{
    CurrentTrackTool, NextTrackTool, PauseMusicTool, PlayMusicTool, PlayTrackTool,
    PreviousTrackTool,
};
pub use playlists::{
    AddToPlaylistTool, CreatePlaylistTool, DeletePlaylistTool, GetPlaylistTracksTool,
    GetPlaylistsTool, RemoveFromPlaylistTool,
};
pub use search::SearchTracksTool;

use crate::error::{ToolError, ToolResult};
use crate::registry::ToolRegistry;
use music_mcp_spotify::Track;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

const MODIFY_PLAYBACK: &[&str] = &["user-modify-playback-state"];
const READ_PLAYBACK: &[&str] = &["user-read-playback-state"];
const READ_CURRENTLY_PLAYING: &[&str] = &["user-read-currently-playing"];
const READ_PLAYLISTS: &[&str] = &["playlist-read-private"];
const MODIFY_PLAYLISTS: &[&str] = &["playlist-modify-public", "playlist-modify-private"];

/// Register every music tool.
pub fn register_all(registry: &mut ToolRegistry) {
    registry.register(Arc::new(PlayMusicTool));
    registry.register(Arc::new(PauseMusicTool));
    registry.register(Arc::new(NextTrackTool));
    registry.register(Arc::new(PreviousTrackTool));
    registry.register(Arc::new(PlayTrackTool));
    registry.register(Arc::new(CurrentTrackTool));
    registry.register(Arc::new(GetDevicesTool));
    registry.register(Arc::new(TransferPlaybackTool));
    registry.register(Arc::new(GetPlaylistsTool));
    registry.register(Arc::new(CreatePlaylistTool));
    registry.register(Arc::new(GetPlaylistTracksTool));
    registry.register(Arc::new(AddToPlaylistTool));
    registry.register(Arc::new(RemoveFromPlaylistTool));
    registry.register(Arc::new(DeletePlaylistTool));
    registry.register(Arc::new(SearchTracksTool));
}

/// Deserialize tool arguments. A missing or `null` argument object is
/// treated as `{}`.
pub(crate) fn parse_args<T: DeserializeOwned>(args: Value) -> ToolResult<T> {
    let args = if args.is_null() {
        Value::Object(serde_json::Map::new())
    } else {
        args
    };
    serde_json::from_value(args).map_err(|e| ToolError::validation(e.to_string()))
}

/// Trimmed, non-empty string argument.
pub(crate) fn required_str<'a>(field: &str, value: &'a str) -> ToolResult<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ToolError::validation(format!("{field} must not be empty")));
    }
    Ok(value)
}

/// Optional device id; an empty string means "no preference".
pub(crate) fn optional_device(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Apply a default and check `1..=max`.
pub(crate) fn bounded_limit(
    field: &str,
    value: Option<i64>,
    default: u32,
    max: u32,
) -> ToolResult<u32> {
    let Some(value) = value else {
        return Ok(default);
    };
    if value < 1 || value > i64::from(max) {
        return Err(ToolError::validation(format!(
            "{field} must be between 1 and {max}, got {value}"
        )));
    }
    Ok(value as u32)
}

/// Accept a track URI, an open.spotify.com track link or a bare track id.
pub(crate) fn normalize_track_uri(value: &str) -> ToolResult<String> {
    let value = required_str("track_uri", value)?;
    if let Some(id) = value.strip_prefix("spotify:track:") {
        return resource_id("track_uri", id).map(|id| format!("spotify:track:{id}"));
    }
    if let Some(rest) = strip_web_prefix(value, "track") {
        return resource_id("track_uri", rest).map(|id| format!("spotify:track:{id}"));
    }
    if value.contains(':') || value.contains('/') {
        return Err(ToolError::validation(format!(
            "track_uri must look like spotify:track:<id>, got '{value}'"
        )));
    }
    resource_id("track_uri", value).map(|id| format!("spotify:track:{id}"))
}

/// Accept a playlist id, a `spotify:playlist:` URI or an open.spotify.com link.
pub(crate) fn normalize_playlist_id(value: &str) -> ToolResult<String> {
    let value = required_str("playlist_id", value)?;
    if let Some(id) = value.strip_prefix("spotify:playlist:") {
        return resource_id("playlist_id", id);
    }
    if let Some(rest) = strip_web_prefix(value, "playlist") {
        return resource_id("playlist_id", rest);
    }
    resource_id("playlist_id", value)
}

fn strip_web_prefix<'a>(value: &'a str, kind: &str) -> Option<&'a str> {
    let rest = value
        .strip_prefix("https://open.spotify.com/")
        .or_else(|| value.strip_prefix("http://open.spotify.com/"))?;
    rest.strip_prefix(kind)?.strip_prefix('/')
}

/// Keep the id portion, dropping any query string.
fn resource_id(field: &str, value: &str) -> ToolResult<String> {
    let id = value.split(['?', '#']).next().unwrap_or_default().trim();
    if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ToolError::validation(format!(
            "{field} has an invalid id '{value}'"
        )));
    }
    Ok(id.to_string())
}

/// `Name - Artist, Artist\n  URI: spotify:track:...`
pub(crate) fn format_track_line(track: &Track) -> String {
    let artists = track.artist_names();
    if artists.is_empty() {
        format!("{}\n  URI: {}", track.name, track.uri)
    } else {
        format!("{} - {}\n  URI: {}", track.name, artists, track.uri)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    #[serde(deny_unknown_fields)]
    struct Args {
        #[serde(default)]
        limit: Option<i64>,
    }

    #[test]
    fn test_parse_args_null_is_empty_object() {
        let args: Args = parse_args(Value::Null).unwrap();
        assert!(args.limit.is_none());
    }

    #[test]
    fn test_parse_args_rejects_unknown_and_mistyped() {
        assert!(matches!(
            parse_args::<Args>(json!({"limt": 3})),
            Err(ToolError::Validation(_))
        ));
        assert!(matches!(
            parse_args::<Args>(json!({"limit": "three"})),
            Err(ToolError::Validation(_))
        ));
    }

    #[test]
    fn test_bounded_limit() {
        assert_eq!(bounded_limit("limit", None, 20, 50).unwrap(), 20);
        assert_eq!(bounded_limit("limit", Some(50), 20, 50).unwrap(), 50);
        assert!(bounded_limit("limit", Some(0), 20, 50).is_err());
        assert!(bounded_limit("limit", Some(51), 20, 50).is_err());
        assert!(bounded_limit("limit", Some(-3), 20, 50).is_err());
    }

    #[test]
    fn test_required_str() {
        assert_eq!(required_str("name", "  Mix ").unwrap(), "Mix");
        assert!(required_str("name", "   ").is_err());
    }

    #[test]
    fn test_normalize_track_uri() {
        let id = "4uLU6hMCjMI75M1A2tKUQC";
        let expected = format!("spotify:track:{id}");
        assert_eq!(normalize_track_uri(&expected).unwrap(), expected);
        assert_eq!(normalize_track_uri(id).unwrap(), expected);
        assert_eq!(
            normalize_track_uri(&format!("https://open.spotify.com/track/{id}?si=abc")).unwrap(),
            expected
        );
        assert!(normalize_track_uri("spotify:album:xyz").is_err());
        assert!(normalize_track_uri("").is_err());
    }

    #[test]
    fn test_normalize_playlist_id() {
        let id = "37i9dQZF1DXcBWIGoYBM5M";
        assert_eq!(normalize_playlist_id(id).unwrap(), id);
        assert_eq!(
            normalize_playlist_id(&format!("spotify:playlist:{id}")).unwrap(),
            id
        );
        assert_eq!(
            normalize_playlist_id(&format!("https://open.spotify.com/playlist/{id}")).unwrap(),
            id
        );
        assert!(normalize_playlist_id("../me").is_err());
    }

    #[test]
    fn test_optional_device() {
        assert_eq!(optional_device(&None), None);
        assert_eq!(optional_device(&Some("  ".to_string())), None);
        assert_eq!(optional_device(&Some("dev".to_string())), Some("dev"));
    }
}
