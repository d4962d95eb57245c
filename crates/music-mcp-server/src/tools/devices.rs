//! Device tools.

use super::{parse_args, required_str, MODIFY_PLAYBACK, READ_PLAYBACK};
use crate::error::ToolResult;
use crate::registry::{Tool, ToolContext};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

pub struct GetDevicesTool;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct NoArgs {}

#[async_trait]
impl Tool for GetDevicesTool {
    fn id(&self) -> &str {
        "get_devices"
    }

    fn description(&self) -> &str {
        "Get list of available Spotify devices with their IDs."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {},
            "additionalProperties": false
        })
    }

    fn required_scopes(&self) -> &'static [&'static str] {
        READ_PLAYBACK
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolResult<String> {
        let _: NoArgs = parse_args(args)?;
        let devices = ctx.api.devices().await?;
        if devices.is_empty() {
            return Ok(
                "No devices found. Make sure Spotify is open on at least one device.".to_string(),
            );
        }

        let lines: Vec<String> = devices
            .iter()
            .map(|device| {
                let status = if device.is_active { "Active" } else { "Inactive" };
                format!(
                    "{} ({}) - {}\n  ID: {}",
                    device.name,
                    device.device_type,
                    status,
                    device.id.as_deref().unwrap_or("(restricted)")
                )
            })
            .collect();
        Ok(format!("Available devices:\n{}", lines.join("\n")))
    }
}

pub struct TransferPlaybackTool;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TransferArgs {
    device_id: String,
    #[serde(default)]
    play: Option<bool>,
}

#[async_trait]
impl Tool for TransferPlaybackTool {
    fn id(&self) -> &str {
        "transfer_playback"
    }

    fn description(&self) -> &str {
        "Transfer playback to a specific device by its ID (from get_devices)."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["device_id"],
            "properties": {
                "device_id": {
                    "type": "string",
                    "description": "ID of the device to move playback to"
                },
                "play": {
                    "type": "boolean",
                    "description": "Start playing on the new device (default: true)"
                }
            },
            "additionalProperties": false
        })
    }

    fn required_scopes(&self) -> &'static [&'static str] {
        MODIFY_PLAYBACK
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolResult<String> {
        let args: TransferArgs = parse_args(args)?;
        let device_id = required_str("device_id", &args.device_id)?;
        ctx.api
            .transfer_playback(device_id, args.play.unwrap_or(true))
            .await?;
        Ok("Transferred playback to device.".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ToolError;
    use crate::tools::testing::{context, spotify_error};
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_get_devices_lists_status_and_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/me/player/devices"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "devices": [
                    {"id": "d1", "name": "Laptop", "type": "Computer", "is_active": true},
                    {"id": "d2", "name": "Kitchen", "type": "Speaker", "is_active": false}
                ]
            })))
            .mount(&server)
            .await;

        let out = GetDevicesTool
            .execute(json!({}), &context(&server))
            .await
            .unwrap();
        assert_eq!(
            out,
            "Available devices:\nLaptop (Computer) - Active\n  ID: d1\nKitchen (Speaker) - Inactive\n  ID: d2"
        );
    }

    #[tokio::test]
    async fn test_get_devices_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/me/player/devices"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"devices": []})))
            .mount(&server)
            .await;

        let out = GetDevicesTool
            .execute(json!({}), &context(&server))
            .await
            .unwrap();
        assert!(out.starts_with("No devices found."));
    }

    #[tokio::test]
    async fn test_transfer_unknown_device_surfaces_message() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/me/player"))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(spotify_error(404, "Device not found")),
            )
            .mount(&server)
            .await;

        let err = TransferPlaybackTool
            .execute(json!({"device_id": "ghost"}), &context(&server))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Api(_)));
        assert_eq!(err.to_string(), "Device not found");
    }

    #[tokio::test]
    async fn test_transfer_with_play() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/me/player"))
            .and(body_json(json!({"device_ids": ["d2"], "play": true})))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        TransferPlaybackTool
            .execute(json!({"device_id": "d2", "play": true}), &context(&server))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_transfer_requires_non_empty_id() {
        let server = MockServer::start().await;
        let err = TransferPlaybackTool
            .execute(json!({"device_id": "  "}), &context(&server))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Validation(_)));
    }

    mod with_refresher {
        use super::*;
        use music_mcp_auth::{
            Credentials, OAuthEndpoints, StoredAuth, TokenClient, TokenRecord, TokenRefresher,
            TokenStore,
        };
        use music_mcp_spotify::SpotifyClient;
        use std::path::PathBuf;
        use std::sync::Arc;
        use tempfile::TempDir;
        use wiremock::matchers::header;

        struct Fixture {
            _dir: TempDir,
            file: PathBuf,
            accounts: MockServer,
            api: MockServer,
            ctx: ToolContext,
        }

        /// Context backed by a real refresher over a stored, still-valid token.
        async fn fixture() -> Fixture {
            let dir = TempDir::new().unwrap();
            let file = dir.path().join("credentials.json");
            let store = Arc::new(TokenStore::with_path(&file));
            store
                .save(&StoredAuth {
                    credentials: Credentials::new("cid", "secret", "http://127.0.0.1:8888/callback"),
                    token: TokenRecord {
                        access_token: "stored-access".to_string(),
                        refresh_token: "stored-refresh".to_string(),
                        token_type: "Bearer".to_string(),
                        expires_at: chrono::Utc::now() + chrono::Duration::hours(1),
                        scopes: Default::default(),
                    },
                })
                .await
                .unwrap();

            let accounts = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/api/token"))
                .respond_with(ResponseTemplate::new(500))
                .expect(0)
                .mount(&accounts)
                .await;

            let api = MockServer::start().await;
            let endpoints = OAuthEndpoints::from_base(&accounts.uri()).unwrap();
            let refresher = Arc::new(TokenRefresher::new(store, TokenClient::new(&endpoints)));
            let ctx = ToolContext::new(Arc::new(SpotifyClient::with_base_url(
                refresher,
                &api.uri(),
            )));

            Fixture {
                _dir: dir,
                file,
                accounts,
                api,
                ctx,
            }
        }

        #[tokio::test]
        async fn test_transfer_uses_stored_token_and_leaves_file_alone() {
            let fx = fixture().await;
            Mock::given(method("PUT"))
                .and(path("/me/player"))
                .and(header("Authorization", "Bearer stored-access"))
                .and(body_json(json!({"device_ids": ["d1"], "play": true})))
                .respond_with(ResponseTemplate::new(204))
                .expect(1)
                .mount(&fx.api)
                .await;

            let before = tokio::fs::read(&fx.file).await.unwrap();
            let out = TransferPlaybackTool
                .execute(json!({"device_id": "d1"}), &fx.ctx)
                .await
                .unwrap();
            assert_eq!(out, "Transferred playback to device.");
            assert_eq!(tokio::fs::read(&fx.file).await.unwrap(), before);

            fx.accounts.verify().await;
        }

        #[tokio::test]
        async fn test_transfer_to_unknown_device_leaves_file_alone() {
            let fx = fixture().await;
            Mock::given(method("PUT"))
                .and(path("/me/player"))
                .respond_with(
                    ResponseTemplate::new(404)
                        .set_body_json(spotify_error(404, "Device not found")),
                )
                .expect(1)
                .mount(&fx.api)
                .await;

            let before = tokio::fs::read(&fx.file).await.unwrap();
            let err = TransferPlaybackTool
                .execute(json!({"device_id": "ghost"}), &fx.ctx)
                .await
                .unwrap_err();
            assert_eq!(err.to_string(), "Device not found");
            assert_eq!(tokio::fs::read(&fx.file).await.unwrap(), before);

            fx.accounts.verify().await;
        }
    }
}
