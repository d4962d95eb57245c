//! Spotify Web API client for music-mcp.
//!
//! Tools talk to the streaming service through the [`MusicApi`] trait so
//! that the dispatch layer can be exercised against a fake. [`SpotifyClient`]
//! is the production implementation; it asks an
//! [`AccessTokenSource`](music_mcp_auth::AccessTokenSource) for a bearer
//! token before every request, which is where expiry checks and refreshes
//! happen.

mod client;
mod error;
pub mod types;

pub use client::{MusicApi, SpotifyClient, DEFAULT_API_URL, DEFAULT_REQUEST_TIMEOUT};
pub use error::{ApiError, ApiResult};
pub use types::{CurrentlyPlaying, Device, Playlist, Track, User};
