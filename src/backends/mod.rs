//! Backend adapter abstractions and concrete implementations.

pub mod plex;

use crate::connection::ServerConnection;

/// One discovered media server and its candidate connections.
#[derive(Debug, Clone)]
pub struct RemoteServer {
    pub name: String,
    pub client_identifier: String,
    /// Server-scoped access token, when the account has one.
    pub access_token: Option<String>,
    pub connections: Vec<ServerConnection>,
}

/// Remote playlist payload returned by backend adapters.
#[derive(Debug, Clone)]
pub struct RemotePlaylist {
    pub rating_key: String,
    /// Items endpoint key, e.g. `/playlists/17/items`.
    pub key: String,
    pub title: String,
    pub smart: bool,
    pub track_count: u64,
    pub summary: String,
    pub thumb: Option<String>,
}

/// One playable part of a remote track.
#[derive(Debug, Clone)]
pub struct RemotePart {
    pub key: String,
    pub container: String,
    pub size_bytes: u64,
}

/// Remote track payload returned by backend adapters.
#[derive(Debug, Clone)]
pub struct RemoteTrack {
    /// Metadata key, e.g. `/library/metadata/1001`.
    pub key: String,
    pub rating_key: String,
    pub title: String,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub thumb: Option<String>,
    pub duration_ms: Option<u64>,
    /// Public 0-10 rating scale.
    pub user_rating: Option<f32>,
    pub parts: Vec<RemotePart>,
}

/// Connection and identification profile used by backend adapters.
#[derive(Debug, Clone)]
pub struct PlexProfileAuth {
    /// Account-level discovery endpoint.
    pub discovery_url: String,
    /// Selected server connection URI; empty until a connection is chosen.
    pub server_uri: String,
    pub access_token: String,
    pub client_identifier: String,
}

/// Interface implemented by concrete media server adapters.
pub trait MediaServerAdapter: Send + Sync {
    fn test_connection(&self, profile: &PlexProfileAuth) -> Result<(), String>;
    fn fetch_resources(&self, profile: &PlexProfileAuth) -> Result<Vec<RemoteServer>, String>;
    fn fetch_playlists(&self, profile: &PlexProfileAuth) -> Result<Vec<RemotePlaylist>, String>;
    fn fetch_playlist_items(
        &self,
        profile: &PlexProfileAuth,
        playlist_key: &str,
        limit: usize,
    ) -> Result<Vec<RemoteTrack>, String>;
    fn create_playlist(
        &self,
        profile: &PlexProfileAuth,
        title: &str,
    ) -> Result<RemotePlaylist, String>;
    fn rate_track(
        &self,
        profile: &PlexProfileAuth,
        rating_key: &str,
        rating: f32,
    ) -> Result<(), String>;
    fn fetch_top_rated(
        &self,
        profile: &PlexProfileAuth,
        min_rating: f32,
        limit: usize,
    ) -> Result<Vec<RemoteTrack>, String>;
}
