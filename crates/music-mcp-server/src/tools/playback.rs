//! Playback control tools.

use super::{
    normalize_track_uri, optional_device, parse_args, MODIFY_PLAYBACK, READ_CURRENTLY_PLAYING,
};
use crate::error::ToolResult;
use crate::registry::{Tool, ToolContext};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DeviceArgs {
    #[serde(default)]
    device_id: Option<String>,
}

fn device_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "device_id": {
                "type": "string",
                "description": "Target device ID (from get_devices). Defaults to the active device."
            }
        },
        "additionalProperties": false
    })
}

/// Resume playback.
pub struct PlayMusicTool;

#[async_trait]
impl Tool for PlayMusicTool {
    fn id(&self) -> &str {
        "play_music"
    }

    fn description(&self) -> &str {
        "Play or resume music on Spotify."
    }

    fn parameters_schema(&self) -> Value {
        device_schema()
    }

    fn required_scopes(&self) -> &'static [&'static str] {
        MODIFY_PLAYBACK
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolResult<String> {
        let args: DeviceArgs = parse_args(args)?;
        match ctx
            .api
            .start_playback(optional_device(&args.device_id), None)
            .await
        {
            Ok(()) => Ok("Music started playing.".to_string()),
            Err(e) if e.is_restriction_violated() => {
                debug!("Resume rejected as a no-op");
                Ok("Music is already playing.".to_string())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Pause playback. Pausing while paused is not an error.
pub struct PauseMusicTool;

#[async_trait]
impl Tool for PauseMusicTool {
    fn id(&self) -> &str {
        "pause_music"
    }

    fn description(&self) -> &str {
        "Pause the music on Spotify."
    }

    fn parameters_schema(&self) -> Value {
        device_schema()
    }

    fn required_scopes(&self) -> &'static [&'static str] {
        MODIFY_PLAYBACK
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolResult<String> {
        let args: DeviceArgs = parse_args(args)?;
        match ctx
            .api
            .pause_playback(optional_device(&args.device_id))
            .await
        {
            Ok(()) => Ok("Music paused.".to_string()),
            Err(e) if e.is_restriction_violated() => {
                debug!("Pause rejected as a no-op");
                Ok("Music is already paused.".to_string())
            }
            Err(e) => Err(e.into()),
        }
    }
}

pub struct NextTrackTool;

#[async_trait]
impl Tool for NextTrackTool {
    fn id(&self) -> &str {
        "next_track"
    }

    fn description(&self) -> &str {
        "Skip to the next track."
    }

    fn parameters_schema(&self) -> Value {
        device_schema()
    }

    fn required_scopes(&self) -> &'static [&'static str] {
        MODIFY_PLAYBACK
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolResult<String> {
        let args: DeviceArgs = parse_args(args)?;
        ctx.api
            .next_track(optional_device(&args.device_id))
            .await?;
        Ok("Skipped to next track.".to_string())
    }
}

pub struct PreviousTrackTool;

#[async_trait]
impl Tool for PreviousTrackTool {
    fn id(&self) -> &str {
        "previous_track"
    }

    fn description(&self) -> &str {
        "Go back to the previous track."
    }

    fn parameters_schema(&self) -> Value {
        device_schema()
    }

    fn required_scopes(&self) -> &'static [&'static str] {
        MODIFY_PLAYBACK
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolResult<String> {
        let args: DeviceArgs = parse_args(args)?;
        ctx.api
            .previous_track(optional_device(&args.device_id))
            .await?;
        Ok("Went to previous track.".to_string())
    }
}

/// Start a specific track.
pub struct PlayTrackTool;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PlayTrackArgs {
    track_uri: String,
    #[serde(default)]
    device_id: Option<String>,
}

#[async_trait]
impl Tool for PlayTrackTool {
    fn id(&self) -> &str {
        "play_track"
    }

    fn description(&self) -> &str {
        "Play a specific track by its Spotify URI (spotify:track:...). Use search_tracks to find URIs."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["track_uri"],
            "properties": {
                "track_uri": {
                    "type": "string",
                    "description": "Spotify track URI, e.g. spotify:track:4uLU6hMCjMI75M1A2tKUQC"
                },
                "device_id": {
                    "type": "string",
                    "description": "Target device ID. Defaults to the active device."
                }
            },
            "additionalProperties": false
        })
    }

    fn required_scopes(&self) -> &'static [&'static str] {
        MODIFY_PLAYBACK
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolResult<String> {
        let args: PlayTrackArgs = parse_args(args)?;
        let uri = normalize_track_uri(&args.track_uri)?;
        ctx.api
            .start_playback(
                optional_device(&args.device_id),
                Some(std::slice::from_ref(&uri)),
            )
            .await?;
        Ok("Playing track.".to_string())
    }
}

/// Report the currently playing item.
pub struct CurrentTrackTool;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct NoArgs {}

#[async_trait]
impl Tool for CurrentTrackTool {
    fn id(&self) -> &str {
        "current_track"
    }

    fn description(&self) -> &str {
        "Get information about the currently playing track."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {},
            "additionalProperties": false
        })
    }

    fn required_scopes(&self) -> &'static [&'static str] {
        READ_CURRENTLY_PLAYING
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolResult<String> {
        let _: NoArgs = parse_args(args)?;
        let item = ctx
            .api
            .currently_playing()
            .await?
            .and_then(|playing| playing.item);

        Ok(match item {
            Some(track) if track.artists.is_empty() => format!("Now playing: {}", track.name),
            Some(track) => format!("Now playing: {} by {}", track.name, track.artist_names()),
            None => "No track is currently playing.".to_string(),
        })
    }
}
