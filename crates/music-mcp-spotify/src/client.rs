//! HTTP implementation of [`MusicApi`].

use crate::error::{ApiError, ApiResult};
use crate::types::{
    CurrentlyPlaying, Device, DevicesResponse, ErrorResponse, Paging, Playlist, PlaylistItem,
    SearchResponse, SnapshotResponse, Track, User,
};
use async_trait::async_trait;
use music_mcp_auth::AccessTokenSource;
use reqwest::{header::CONTENT_LENGTH, Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Web API base URL.
pub const DEFAULT_API_URL: &str = "https://api.spotify.com/v1";

/// Upper bound on one Web API request, including reading the body.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Operations the tools need from the streaming service.
///
/// Each method performs exactly one request. Nothing is retried.
#[async_trait]
pub trait MusicApi: Send + Sync {
    /// Resume playback, or start the given URIs.
    async fn start_playback(&self, device_id: Option<&str>, uris: Option<&[String]>)
        -> ApiResult<()>;

    async fn pause_playback(&self, device_id: Option<&str>) -> ApiResult<()>;

    async fn next_track(&self, device_id: Option<&str>) -> ApiResult<()>;

    async fn previous_track(&self, device_id: Option<&str>) -> ApiResult<()>;

    /// `None` when the service reports no active playback.
    async fn currently_playing(&self) -> ApiResult<Option<CurrentlyPlaying>>;

    async fn devices(&self) -> ApiResult<Vec<Device>>;

    async fn transfer_playback(&self, device_id: &str, play: bool) -> ApiResult<()>;

    async fn current_user(&self) -> ApiResult<User>;

    async fn current_user_playlists(&self, limit: u32) -> ApiResult<Vec<Playlist>>;

    async fn create_playlist(
        &self,
        name: &str,
        description: &str,
        public: bool,
    ) -> ApiResult<Playlist>;

    /// Tracks of a playlist; unavailable entries are skipped.
    async fn playlist_tracks(&self, playlist_id: &str, limit: u32) -> ApiResult<Vec<Track>>;

    /// Returns the new snapshot id.
    async fn add_to_playlist(&self, playlist_id: &str, uris: &[String]) -> ApiResult<String>;

    /// Returns the new snapshot id.
    async fn remove_from_playlist(&self, playlist_id: &str, uris: &[String])
        -> ApiResult<String>;

    /// Remove the playlist from the user's library.
    async fn unfollow_playlist(&self, playlist_id: &str) -> ApiResult<()>;

    async fn search_tracks(&self, query: &str, limit: u32) -> ApiResult<Vec<Track>>;
}

fn http_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_default()
}

/// Spotify Web API client.
pub struct SpotifyClient {
    http: Client,
    tokens: Arc<dyn AccessTokenSource>,
    base_url: String,
}

impl SpotifyClient {
    /// Create a client against the production API.
    pub fn new(tokens: Arc<dyn AccessTokenSource>) -> Self {
        Self::with_base_url(tokens, DEFAULT_API_URL)
    }

    /// Create a client with a custom base URL.
    pub fn with_base_url(tokens: Arc<dyn AccessTokenSource>, base_url: &str) -> Self {
        Self {
            http: http_client(DEFAULT_REQUEST_TIMEOUT),
            tokens,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Fail requests that take longer than `timeout` with a transport error.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.http = http_client(timeout);
        self
    }

    /// Use a preconfigured HTTP client.
    pub fn with_http_client(mut self, http: Client) -> Self {
        self.http = http;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Start an authorized request. Fetching the token may refresh it.
    async fn request(&self, method: Method, path: &str) -> ApiResult<RequestBuilder> {
        let token = self.tokens.access_token().await?;
        let url = format!("{}{}", self.base_url, path);
        Ok(self.http.request(method, url).bearer_auth(token))
    }

    /// Send and turn non-success statuses into [`ApiError::ProviderRejected`].
    async fn send(&self, builder: RequestBuilder) -> ApiResult<Response> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = rejection_message(status, &body);
        warn!(status = status.as_u16(), message = %message, "Spotify rejected request");
        Err(ApiError::ProviderRejected {
            status: status.as_u16(),
            message,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> ApiResult<T> {
        let response = self.send(builder).await?;
        decode(response).await
    }

    /// Send a command that returns no useful body.
    async fn command(&self, builder: RequestBuilder) -> ApiResult<()> {
        self.send(builder).await?;
        Ok(())
    }
}

impl std::fmt::Debug for SpotifyClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpotifyClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> ApiResult<T> {
    let text = response.text().await?;
    serde_json::from_str(&text).map_err(|e| ApiError::Decode(e.to_string()))
}

/// Extract the service's explanation from an error body.
fn rejection_message(status: StatusCode, body: &str) -> String {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(parsed) if !parsed.error.message.is_empty() => parsed.error.message,
        _ if body.trim().is_empty() => format!("Spotify returned HTTP {status}"),
        _ => format!("Spotify returned HTTP {status}: {}", body.trim()),
    }
}

fn device_query(device_id: Option<&str>) -> Vec<(&'static str, &str)> {
    device_id
        .filter(|id| !id.is_empty())
        .map(|id| vec![("device_id", id)])
        .unwrap_or_default()
}

fn segment(id: &str) -> String {
    urlencoding::encode(id).into_owned()
}

#[async_trait]
impl MusicApi for SpotifyClient {
    async fn start_playback(
        &self,
        device_id: Option<&str>,
        uris: Option<&[String]>,
    ) -> ApiResult<()> {
        let builder = self
            .request(Method::PUT, "/me/player/play")
            .await?
            .query(&device_query(device_id));
        let builder = match uris {
            Some(uris) => builder.json(&json!({ "uris": uris })),
            None => builder.header(CONTENT_LENGTH, 0),
        };
        self.command(builder).await
    }

    async fn pause_playback(&self, device_id: Option<&str>) -> ApiResult<()> {
        let builder = self
            .request(Method::PUT, "/me/player/pause")
            .await?
            .query(&device_query(device_id))
            .header(CONTENT_LENGTH, 0);
        self.command(builder).await
    }

    async fn next_track(&self, device_id: Option<&str>) -> ApiResult<()> {
        let builder = self
            .request(Method::POST, "/me/player/next")
            .await?
            .query(&device_query(device_id))
            .header(CONTENT_LENGTH, 0);
        self.command(builder).await
    }

    async fn previous_track(&self, device_id: Option<&str>) -> ApiResult<()> {
        let builder = self
            .request(Method::POST, "/me/player/previous")
            .await?
            .query(&device_query(device_id))
            .header(CONTENT_LENGTH, 0);
        self.command(builder).await
    }

    async fn currently_playing(&self) -> ApiResult<Option<CurrentlyPlaying>> {
        let builder = self
            .request(Method::GET, "/me/player/currently-playing")
            .await?;
        let response = self.send(builder).await?;
        if response.status() == StatusCode::NO_CONTENT {
            debug!("No active playback");
            return Ok(None);
        }

        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn devices(&self) -> ApiResult<Vec<Device>> {
        let builder = self.request(Method::GET, "/me/player/devices").await?;
        let response: DevicesResponse = self.get_json(builder).await?;
        Ok(response.devices)
    }

    async fn transfer_playback(&self, device_id: &str, play: bool) -> ApiResult<()> {
        let builder = self
            .request(Method::PUT, "/me/player")
            .await?
            .json(&json!({ "device_ids": [device_id], "play": play }));
        self.command(builder).await
    }

    async fn current_user(&self) -> ApiResult<User> {
        let builder = self.request(Method::GET, "/me").await?;
        self.get_json(builder).await
    }

    async fn current_user_playlists(&self, limit: u32) -> ApiResult<Vec<Playlist>> {
        let builder = self
            .request(Method::GET, "/me/playlists")
            .await?
            .query(&[("limit", limit)]);
        let page: Paging<Playlist> = self.get_json(builder).await?;
        Ok(page.items)
    }

    async fn create_playlist(
        &self,
        name: &str,
        description: &str,
        public: bool,
    ) -> ApiResult<Playlist> {
        let builder = self
            .request(Method::POST, "/me/playlists")
            .await?
            .json(&json!({
                "name": name,
                "description": description,
                "public": public,
            }));
        self.get_json(builder).await
    }

    async fn playlist_tracks(&self, playlist_id: &str, limit: u32) -> ApiResult<Vec<Track>> {
        let path = format!("/playlists/{}/tracks", segment(playlist_id));
        let builder = self
            .request(Method::GET, &path)
            .await?
            .query(&[("limit", limit)]);
        let page: Paging<PlaylistItem> = self.get_json(builder).await?;
        Ok(page.items.into_iter().filter_map(|item| item.track).collect())
    }

    async fn add_to_playlist(&self, playlist_id: &str, uris: &[String]) -> ApiResult<String> {
        let path = format!("/playlists/{}/tracks", segment(playlist_id));
        let builder = self
            .request(Method::POST, &path)
            .await?
            .json(&json!({ "uris": uris }));
        let snapshot: SnapshotResponse = self.get_json(builder).await?;
        Ok(snapshot.snapshot_id)
    }

    async fn remove_from_playlist(
        &self,
        playlist_id: &str,
        uris: &[String],
    ) -> ApiResult<String> {
        let path = format!("/playlists/{}/tracks", segment(playlist_id));
        let tracks: Vec<_> = uris.iter().map(|uri| json!({ "uri": uri })).collect();
        let builder = self
            .request(Method::DELETE, &path)
            .await?
            .json(&json!({ "tracks": tracks }));
        let snapshot: SnapshotResponse = self.get_json(builder).await?;
        Ok(snapshot.snapshot_id)
    }

    async fn unfollow_playlist(&self, playlist_id: &str) -> ApiResult<()> {
        let path = format!("/playlists/{}/followers", segment(playlist_id));
        let builder = self.request(Method::DELETE, &path).await?;
        self.command(builder).await
    }

    async fn search_tracks(&self, query: &str, limit: u32) -> ApiResult<Vec<Track>> {
        let limit = limit.to_string();
        let builder = self
            .request(Method::GET, "/search")
            .await?
            .query(&[("q", query), ("type", "track"), ("limit", limit.as_str())]);
        let response: SearchResponse = self.get_json(builder).await?;
        Ok(response.tracks.items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use music_mcp_auth::{AuthError, AuthResult, StaticToken};
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> SpotifyClient {
        SpotifyClient::with_base_url(Arc::new(StaticToken::new("token-1")), &server.uri())
    }

    fn track_json(id: &str, name: &str) -> serde_json::Value {
        json!({
            "id": id,
            "name": name,
            "uri": format!("spotify:track:{id}"),
            "artists": [{"name": "Artist"}],
            "album": {"name": "Album"},
            "duration_ms": 200000
        })
    }

    struct NoToken;

    #[async_trait]
    impl AccessTokenSource for NoToken {
        async fn access_token(&self) -> AuthResult<String> {
            Err(AuthError::NoCredentials)
        }
    }

    #[test]
    fn test_rejection_message() {
        let body = r#"{"error":{"status":404,"message":"Device not found"}}"#;
        assert_eq!(
            rejection_message(StatusCode::NOT_FOUND, body),
            "Device not found"
        );
        assert_eq!(
            rejection_message(StatusCode::BAD_GATEWAY, ""),
            "Spotify returned HTTP 502 Bad Gateway"
        );
    }

    #[tokio::test]
    async fn test_bearer_token_is_sent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/me"))
            .and(header("authorization", "Bearer token-1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"id": "u1", "display_name": "Ada"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let user = client(&server).current_user().await.unwrap();
        assert_eq!(user.display_name.as_deref(), Some("Ada"));
    }

    #[tokio::test]
    async fn test_token_failure_makes_no_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = SpotifyClient::with_base_url(Arc::new(NoToken), &server.uri());
        let err = client.devices().await.unwrap_err();
        assert!(matches!(err, ApiError::Auth(AuthError::NoCredentials)));
    }

    #[tokio::test]
    async fn test_currently_playing_no_content() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/me/player/currently-playing"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        assert!(client(&server).currently_playing().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_currently_playing_with_item() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/me/player/currently-playing"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "is_playing": true,
                "progress_ms": 1000,
                "item": track_json("t1", "Song")
            })))
            .mount(&server)
            .await;

        let playing = client(&server).currently_playing().await.unwrap().unwrap();
        assert!(playing.is_playing);
        assert_eq!(playing.item.unwrap().name, "Song");
    }

    #[tokio::test]
    async fn test_transfer_playback_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/me/player"))
            .and(body_json(json!({"device_ids": ["nope"], "play": false})))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": {"status": 404, "message": "Device not found"}
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .transfer_playback("nope", false)
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(404));
        assert_eq!(err.to_string(), "Device not found");
    }

    #[tokio::test]
    async fn test_pause_with_device() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/me/player/pause"))
            .and(query_param("device_id", "dev-1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        client(&server).pause_playback(Some("dev-1")).await.unwrap();
    }

    #[tokio::test]
    async fn test_start_playback_with_uris() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/me/player/play"))
            .and(body_json(json!({"uris": ["spotify:track:1"]})))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let uris = vec!["spotify:track:1".to_string()];
        client(&server)
            .start_playback(None, Some(&uris))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_playlist_tracks_skips_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/playlists/pl1/tracks"))
            .and(query_param("limit", "50"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{"track": track_json("a", "One")}, {"track": null}]
            })))
            .mount(&server)
            .await;

        let tracks = client(&server).playlist_tracks("pl1", 50).await.unwrap();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].name, "One");
    }

    #[tokio::test]
    async fn test_remove_from_playlist_body() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/playlists/pl1/tracks"))
            .and(body_json(json!({"tracks": [{"uri": "spotify:track:1"}]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"snapshot_id": "s2"})))
            .mount(&server)
            .await;

        let snapshot = client(&server)
            .remove_from_playlist("pl1", &["spotify:track:1".to_string()])
            .await
            .unwrap();
        assert_eq!(snapshot, "s2");
    }

    #[tokio::test]
    async fn test_create_playlist_uses_me_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/me/playlists"))
            .and(body_json(json!({"name": "Mix", "description": "", "public": false})))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(json!({"id": "new1", "name": "Mix"})),
            )
            .mount(&server)
            .await;

        let playlist = client(&server)
            .create_playlist("Mix", "", false)
            .await
            .unwrap();
        assert_eq!(playlist.id, "new1");
    }

    #[tokio::test]
    async fn test_search_tracks_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "daft punk"))
            .and(query_param("type", "track"))
            .and(query_param("limit", "5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "tracks": {"items": [track_json("x", "Around the World")]}
            })))
            .mount(&server)
            .await;

        let tracks = client(&server).search_tracks("daft punk", 5).await.unwrap();
        assert_eq!(tracks[0].uri, "spotify:track:x");
    }

    #[tokio::test]
    async fn test_malformed_body_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/me/player/devices"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = client(&server).devices().await.unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));
    }

    #[tokio::test]
    async fn test_slow_response_times_out_as_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/me/player/devices"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"devices": []}))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let err = client(&server)
            .with_timeout(Duration::from_millis(200))
            .devices()
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Transport(_)));
    }
}
