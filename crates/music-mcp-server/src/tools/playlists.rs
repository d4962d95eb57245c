//! Playlist tools.
//!
//! Playlist ids are opaque to the server; links and `spotify:playlist:` URIs
//! are reduced to the id before use.

use super::{
    bounded_limit, format_track_line, normalize_playlist_id, normalize_track_uri, parse_args,
    required_str, MODIFY_PLAYLISTS, READ_PLAYLISTS,
};
use crate::error::ToolResult;
use crate::registry::{Tool, ToolContext};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

const DEFAULT_PLAYLISTS_LIMIT: u32 = 20;
const MAX_PLAYLISTS_LIMIT: u32 = 50;
const DEFAULT_TRACKS_LIMIT: u32 = 50;
const MAX_TRACKS_LIMIT: u32 = 100;

fn playlist_id_property() -> Value {
    json!({
        "type": "string",
        "description": "Playlist ID (from get_playlists), spotify:playlist: URI or open.spotify.com link"
    })
}

fn track_uri_property() -> Value {
    json!({
        "type": "string",
        "description": "Spotify track URI (spotify:track:...)"
    })
}

pub struct GetPlaylistsTool;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct GetPlaylistsArgs {
    #[serde(default)]
    limit: Option<i64>,
}

#[async_trait]
impl Tool for GetPlaylistsTool {
    fn id(&self) -> &str {
        "get_playlists"
    }

    fn description(&self) -> &str {
        "Get the current user's playlists with their IDs."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "limit": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": MAX_PLAYLISTS_LIMIT,
                    "description": format!("Maximum number of playlists (default: {DEFAULT_PLAYLISTS_LIMIT})")
                }
            },
            "additionalProperties": false
        })
    }

    fn required_scopes(&self) -> &'static [&'static str] {
        READ_PLAYLISTS
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolResult<String> {
        let args: GetPlaylistsArgs = parse_args(args)?;
        let limit = bounded_limit(
            "limit",
            args.limit,
            DEFAULT_PLAYLISTS_LIMIT,
            MAX_PLAYLISTS_LIMIT,
        )?;

        let playlists = ctx.api.current_user_playlists(limit).await?;
        if playlists.is_empty() {
            return Ok("No playlists found.".to_string());
        }

        let lines: Vec<String> = playlists
            .iter()
            .map(|pl| format!("{}\n  ID: {}", pl.name, pl.id))
            .collect();
        Ok(format!("Your playlists:\n{}", lines.join("\n")))
    }
}

pub struct CreatePlaylistTool;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CreatePlaylistArgs {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default = "default_public")]
    public: bool,
}

fn default_public() -> bool {
    true
}

#[async_trait]
impl Tool for CreatePlaylistTool {
    fn id(&self) -> &str {
        "create_playlist"
    }

    fn description(&self) -> &str {
        "Create a new playlist in the current user's library."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["name"],
            "properties": {
                "name": {
                    "type": "string",
                    "description": "Name of the new playlist"
                },
                "description": {
                    "type": "string",
                    "description": "Playlist description (default: empty)"
                },
                "public": {
                    "type": "boolean",
                    "description": "Whether the playlist is public (default: true)"
                }
            },
            "additionalProperties": false
        })
    }

    fn required_scopes(&self) -> &'static [&'static str] {
        MODIFY_PLAYLISTS
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolResult<String> {
        let args: CreatePlaylistArgs = parse_args(args)?;
        let name = required_str("name", &args.name)?;
        let playlist = ctx
            .api
            .create_playlist(name, args.description.trim(), args.public)
            .await?;
        Ok(format!(
            "Created playlist '{}'\n  ID: {}",
            playlist.name, playlist.id
        ))
    }
}

pub struct GetPlaylistTracksTool;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct GetPlaylistTracksArgs {
    playlist_id: String,
    #[serde(default)]
    limit: Option<i64>,
}

#[async_trait]
impl Tool for GetPlaylistTracksTool {
    fn id(&self) -> &str {
        "get_playlist_tracks"
    }

    fn description(&self) -> &str {
        "Get the tracks in a playlist with their URIs."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["playlist_id"],
            "properties": {
                "playlist_id": playlist_id_property(),
                "limit": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": MAX_TRACKS_LIMIT,
                    "description": format!("Maximum number of tracks (default: {DEFAULT_TRACKS_LIMIT})")
                }
            },
            "additionalProperties": false
        })
    }

    fn required_scopes(&self) -> &'static [&'static str] {
        READ_PLAYLISTS
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolResult<String> {
        let args: GetPlaylistTracksArgs = parse_args(args)?;
        let playlist_id = normalize_playlist_id(&args.playlist_id)?;
        let limit = bounded_limit("limit", args.limit, DEFAULT_TRACKS_LIMIT, MAX_TRACKS_LIMIT)?;

        let tracks = ctx.api.playlist_tracks(&playlist_id, limit).await?;
        if tracks.is_empty() {
            return Ok("Playlist is empty.".to_string());
        }

        let lines: Vec<String> = tracks.iter().map(format_track_line).collect();
        Ok(format!("Tracks in playlist:\n{}", lines.join("\n")))
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PlaylistTrackArgs {
    playlist_id: String,
    track_uri: String,
}

fn playlist_track_schema() -> Value {
    json!({
        "type": "object",
        "required": ["playlist_id", "track_uri"],
        "properties": {
            "playlist_id": playlist_id_property(),
            "track_uri": track_uri_property()
        },
        "additionalProperties": false
    })
}

pub struct AddToPlaylistTool;

#[async_trait]
impl Tool for AddToPlaylistTool {
    fn id(&self) -> &str {
        "add_to_playlist"
    }

    fn description(&self) -> &str {
        "Add a track to a playlist."
    }

    fn parameters_schema(&self) -> Value {
        playlist_track_schema()
    }

    fn required_scopes(&self) -> &'static [&'static str] {
        MODIFY_PLAYLISTS
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolResult<String> {
        let args: PlaylistTrackArgs = parse_args(args)?;
        let playlist_id = normalize_playlist_id(&args.playlist_id)?;
        let uri = normalize_track_uri(&args.track_uri)?;
        ctx.api
            .add_to_playlist(&playlist_id, std::slice::from_ref(&uri))
            .await?;
        Ok("Added track to playlist.".to_string())
    }
}

pub struct RemoveFromPlaylistTool;

#[async_trait]
impl Tool for RemoveFromPlaylistTool {
    fn id(&self) -> &str {
        "remove_from_playlist"
    }

    fn description(&self) -> &str {
        "Remove every occurrence of a track from a playlist."
    }

    fn parameters_schema(&self) -> Value {
        playlist_track_schema()
    }

    fn required_scopes(&self) -> &'static [&'static str] {
        MODIFY_PLAYLISTS
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolResult<String> {
        let args: PlaylistTrackArgs = parse_args(args)?;
        let playlist_id = normalize_playlist_id(&args.playlist_id)?;
        let uri = normalize_track_uri(&args.track_uri)?;
        ctx.api
            .remove_from_playlist(&playlist_id, std::slice::from_ref(&uri))
            .await?;
        Ok("Removed track from playlist.".to_string())
    }
}

/// Unfollow a playlist.
///
/// The service has no true delete: the playlist leaves the user's library,
/// but other followers keep it.
pub struct DeletePlaylistTool;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DeletePlaylistArgs {
    playlist_id: String,
}

#[async_trait]
impl Tool for DeletePlaylistTool {
    fn id(&self) -> &str {
        "delete_playlist"
    }

    fn description(&self) -> &str {
        "Remove a playlist from your library (unfollow). Spotify has no permanent delete; other followers keep their copy."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["playlist_id"],
            "properties": {
                "playlist_id": playlist_id_property()
            },
            "additionalProperties": false
        })
    }

    fn required_scopes(&self) -> &'static [&'static str] {
        MODIFY_PLAYLISTS
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolResult<String> {
        let args: DeletePlaylistArgs = parse_args(args)?;
        let playlist_id = normalize_playlist_id(&args.playlist_id)?;
        ctx.api.unfollow_playlist(&playlist_id).await?;
        Ok("Removed playlist from your library (unfollowed).".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ToolError;
    use crate::tools::testing::{context, spotify_error, track};
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PLAYLIST: &str = "37i9dQZF1DXcBWIGoYBM5M";
    const TRACK: &str = "spotify:track:4uLU6hMCjMI75M1A2tKUQC";

    #[tokio::test]
    async fn test_get_playlists_default_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/me/playlists"))
            .and(query_param("limit", "20"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{"id": "p1", "name": "Road Trip"}, {"id": "p2", "name": "Focus"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let out = GetPlaylistsTool
            .execute(json!({}), &context(&server))
            .await
            .unwrap();
        assert_eq!(out, "Your playlists:\nRoad Trip\n  ID: p1\nFocus\n  ID: p2");
    }

    #[tokio::test]
    async fn test_get_playlists_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/me/playlists"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
            .mount(&server)
            .await;

        let out = GetPlaylistsTool
            .execute(json!({"limit": 5}), &context(&server))
            .await
            .unwrap();
        assert_eq!(out, "No playlists found.");
    }

    #[tokio::test]
    async fn test_get_playlists_limit_out_of_range() {
        let server = MockServer::start().await;
        let err = GetPlaylistsTool
            .execute(json!({"limit": 500}), &context(&server))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Validation(_)));
    }

    #[tokio::test]
    async fn test_create_playlist_defaults_to_public() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/me/playlists"))
            .and(body_json(json!({"name": "Mix", "description": "", "public": true})))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(json!({"id": "new1", "name": "Mix"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let out = CreatePlaylistTool
            .execute(json!({"name": "Mix"}), &context(&server))
            .await
            .unwrap();
        assert_eq!(out, "Created playlist 'Mix'\n  ID: new1");
    }

    #[tokio::test]
    async fn test_create_playlist_requires_name() {
        let server = MockServer::start().await;
        let err = CreatePlaylistTool
            .execute(json!({"name": ""}), &context(&server))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Validation(_)));
    }

    #[tokio::test]
    async fn test_get_playlist_tracks() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/playlists/{PLAYLIST}/tracks")))
            .and(query_param("limit", "50"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{"track": track("a1", "One More Time", &["Daft Punk"])}]
            })))
            .mount(&server)
            .await;

        let out = GetPlaylistTracksTool
            .execute(
                json!({"playlist_id": format!("spotify:playlist:{PLAYLIST}")}),
                &context(&server),
            )
            .await
            .unwrap();
        assert_eq!(
            out,
            "Tracks in playlist:\nOne More Time - Daft Punk\n  URI: spotify:track:a1"
        );
    }

    #[tokio::test]
    async fn test_get_playlist_tracks_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/playlists/{PLAYLIST}/tracks")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
            .mount(&server)
            .await;

        let out = GetPlaylistTracksTool
            .execute(json!({"playlist_id": PLAYLIST}), &context(&server))
            .await
            .unwrap();
        assert_eq!(out, "Playlist is empty.");
    }

    #[tokio::test]
    async fn test_add_to_playlist() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/playlists/{PLAYLIST}/tracks")))
            .and(body_json(json!({"uris": [TRACK]})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"snapshot_id": "s1"})))
            .expect(1)
            .mount(&server)
            .await;

        let out = AddToPlaylistTool
            .execute(
                json!({"playlist_id": PLAYLIST, "track_uri": TRACK}),
                &context(&server),
            )
            .await
            .unwrap();
        assert_eq!(out, "Added track to playlist.");
    }

    #[tokio::test]
    async fn test_remove_from_foreign_playlist_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path(format!("/playlists/{PLAYLIST}/tracks")))
            .respond_with(
                ResponseTemplate::new(403).set_body_json(spotify_error(403, "You cannot remove tracks from a playlist you don't own.")),
            )
            .mount(&server)
            .await;

        let err = RemoveFromPlaylistTool
            .execute(
                json!({"playlist_id": PLAYLIST, "track_uri": TRACK}),
                &context(&server),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("don't own"));
    }

    #[tokio::test]
    async fn test_delete_playlist_unfollows() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path(format!("/playlists/{PLAYLIST}/followers")))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let out = DeletePlaylistTool
            .execute(json!({"playlist_id": PLAYLIST}), &context(&server))
            .await
            .unwrap();
        assert!(out.contains("unfollowed"));
    }
}
