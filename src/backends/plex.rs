//! Plex Media Server backend adapter implementation.

use std::time::Duration;

use serde_json::Value;

use crate::backends::{
    MediaServerAdapter, PlexProfileAuth, RemotePart, RemotePlaylist, RemoteServer, RemoteTrack,
};
use crate::connection::ServerConnection;

const PRODUCT_NAME: &str = "plextune";
const PRODUCT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Plex adapter backed by `ureq`.
pub struct PlexAdapter {
    http_client: ureq::Agent,
}

impl PlexAdapter {
    /// Creates a new Plex adapter.
    pub fn new() -> Self {
        let http_client = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(5))
            .timeout_read(Duration::from_secs(15))
            .timeout_write(Duration::from_secs(15))
            .build();
        Self { http_client }
    }

    fn auth_params(profile: &PlexProfileAuth) -> Vec<(String, String)> {
        vec![
            ("X-Plex-Token".to_string(), profile.access_token.clone()),
            (
                "X-Plex-Client-Identifier".to_string(),
                profile.client_identifier.clone(),
            ),
            ("X-Plex-Product".to_string(), PRODUCT_NAME.to_string()),
            ("X-Plex-Version".to_string(), PRODUCT_VERSION.to_string()),
        ]
    }

    fn endpoint_base(endpoint: &str) -> String {
        endpoint.trim().trim_end_matches('/').to_string()
    }

    fn api_url(
        base: &str,
        profile: &PlexProfileAuth,
        path: &str,
        params: &[(String, String)],
    ) -> String {
        let mut query_parts: Vec<String> = Self::auth_params(profile)
            .into_iter()
            .map(|(key, value)| format!("{key}={}", urlencoding::encode(&value)))
            .collect();
        query_parts.extend(
            params
                .iter()
                .map(|(key, value)| format!("{key}={}", urlencoding::encode(value))),
        );
        format!(
            "{}{}?{}",
            Self::endpoint_base(base),
            path,
            query_parts.join("&")
        )
    }

    fn request_json(&self, url: &str, label: &str) -> Result<Value, String> {
        let response = self
            .http_client
            .get(url)
            .set("Accept", "application/json")
            .call()
            .map_err(|err| format!("Plex request failed ({label}): {err}"))?;
        response
            .into_json()
            .map_err(|err| format!("Plex response parse failed ({label}): {err}"))
    }

    fn array_or_single(value: Option<&Value>) -> Vec<&Value> {
        match value {
            Some(Value::Array(items)) => items.iter().collect(),
            Some(item @ Value::Object(_)) => vec![item],
            _ => Vec::new(),
        }
    }

    fn container_metadata(payload: &Value) -> Vec<&Value> {
        Self::array_or_single(
            payload
                .get("MediaContainer")
                .and_then(|value| value.get("Metadata")),
        )
    }

    fn string_field(value: &Value, field: &str) -> Option<String> {
        value
            .get(field)
            .and_then(Value::as_str)
            .map(ToOwned::to_owned)
            .or_else(|| value.get(field).and_then(Value::as_i64).map(|n| n.to_string()))
    }

    fn flag_field(value: &Value, field: &str) -> bool {
        match value.get(field) {
            Some(Value::Bool(flag)) => *flag,
            Some(Value::Number(number)) => number.as_i64().unwrap_or(0) != 0,
            Some(Value::String(text)) => text == "1" || text.eq_ignore_ascii_case("true"),
            _ => false,
        }
    }

    fn parse_connection(connection: &Value) -> Option<ServerConnection> {
        let uri = Self::string_field(connection, "uri")?;
        Some(ServerConnection {
            protocol: Self::string_field(connection, "protocol")
                .unwrap_or_else(|| "http".to_string()),
            address: Self::string_field(connection, "address").unwrap_or_default(),
            port: connection
                .get("port")
                .and_then(Value::as_u64)
                .unwrap_or(32_400) as u16,
            uri,
            local: Self::flag_field(connection, "local"),
            relay: Self::flag_field(connection, "relay"),
            ipv6: Self::flag_field(connection, "IPv6"),
        })
    }

    fn parse_resource(device: &Value) -> Option<RemoteServer> {
        let provides = Self::string_field(device, "provides").unwrap_or_default();
        if !provides.split(',').any(|p| p.trim() == "server") {
            return None;
        }
        let connections = Self::array_or_single(device.get("connections"))
            .into_iter()
            .filter_map(Self::parse_connection)
            .collect();
        Some(RemoteServer {
            name: Self::string_field(device, "name").unwrap_or_else(|| "Unnamed".to_string()),
            client_identifier: Self::string_field(device, "clientIdentifier")?,
            access_token: Self::string_field(device, "accessToken")
                .filter(|token| !token.is_empty()),
            connections,
        })
    }

    fn parse_playlist(item: &Value) -> Option<RemotePlaylist> {
        Some(RemotePlaylist {
            rating_key: Self::string_field(item, "ratingKey")?,
            key: Self::string_field(item, "key")?,
            title: Self::string_field(item, "title").unwrap_or_else(|| "Untitled".to_string()),
            smart: Self::flag_field(item, "smart"),
            track_count: item.get("leafCount").and_then(Value::as_u64).unwrap_or(0),
            summary: Self::string_field(item, "summary").unwrap_or_default(),
            thumb: Self::string_field(item, "thumb").filter(|thumb| !thumb.is_empty()),
        })
    }

    fn parse_track(item: &Value) -> Option<RemoteTrack> {
        let key = Self::string_field(item, "key")?;
        let rating_key = Self::string_field(item, "ratingKey")?;
        let parts = Self::array_or_single(item.get("Media"))
            .into_iter()
            .flat_map(|media| Self::array_or_single(media.get("Part")).into_iter())
            .filter_map(|part| {
                Some(RemotePart {
                    key: Self::string_field(part, "key")?,
                    container: Self::string_field(part, "container").unwrap_or_default(),
                    size_bytes: part.get("size").and_then(Value::as_u64).unwrap_or(0),
                })
            })
            .collect();
        Some(RemoteTrack {
            key,
            rating_key,
            title: Self::string_field(item, "title").unwrap_or_else(|| "Unknown".to_string()),
            artist: Self::string_field(item, "grandparentTitle"),
            album: Self::string_field(item, "parentTitle"),
            thumb: Self::string_field(item, "thumb").filter(|thumb| !thumb.is_empty()),
            duration_ms: item.get("duration").and_then(Value::as_u64),
            user_rating: item
                .get("userRating")
                .and_then(Value::as_f64)
                .map(|rating| (rating / 2.0) as f32),
            parts,
        })
    }

    fn music_section_key(&self, profile: &PlexProfileAuth) -> Result<String, String> {
        let url = Self::api_url(&profile.server_uri, profile, "/library/sections", &[]);
        let payload = self.request_json(&url, "librarySections")?;
        let sections = Self::array_or_single(
            payload
                .get("MediaContainer")
                .and_then(|value| value.get("Directory")),
        );
        sections
            .into_iter()
            .find(|section| {
                Self::string_field(section, "type").as_deref() == Some("artist")
            })
            .and_then(|section| Self::string_field(section, "key"))
            .ok_or_else(|| "no music library section found".to_string())
    }
}

impl Default for PlexAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaServerAdapter for PlexAdapter {
    fn test_connection(&self, profile: &PlexProfileAuth) -> Result<(), String> {
        let url = Self::api_url(&profile.server_uri, profile, "/identity", &[]);
        let payload = self.request_json(&url, "identity")?;
        if payload.get("MediaContainer").is_some() {
            Ok(())
        } else {
            Err("server identity response was malformed".to_string())
        }
    }

    fn fetch_resources(&self, profile: &PlexProfileAuth) -> Result<Vec<RemoteServer>, String> {
        let url = Self::api_url(
            &profile.discovery_url,
            profile,
            "/api/v2/resources",
            &[
                ("includeHttps".to_string(), "1".to_string()),
                ("includeRelay".to_string(), "1".to_string()),
            ],
        );
        let payload = self.request_json(&url, "resources")?;
        let devices = match &payload {
            Value::Array(devices) => devices.iter().collect(),
            other => Self::array_or_single(Some(other)),
        };
        Ok(devices.into_iter().filter_map(Self::parse_resource).collect())
    }

    fn fetch_playlists(&self, profile: &PlexProfileAuth) -> Result<Vec<RemotePlaylist>, String> {
        let url = Self::api_url(
            &profile.server_uri,
            profile,
            "/playlists",
            &[("playlistType".to_string(), "audio".to_string())],
        );
        let payload = self.request_json(&url, "playlists")?;
        Ok(Self::container_metadata(&payload)
            .into_iter()
            .filter_map(Self::parse_playlist)
            .collect())
    }

    fn fetch_playlist_items(
        &self,
        profile: &PlexProfileAuth,
        playlist_key: &str,
        limit: usize,
    ) -> Result<Vec<RemoteTrack>, String> {
        let url = Self::api_url(
            &profile.server_uri,
            profile,
            playlist_key,
            &[
                ("X-Plex-Container-Start".to_string(), "0".to_string()),
                ("X-Plex-Container-Size".to_string(), limit.to_string()),
            ],
        );
        let payload = self.request_json(&url, "playlistItems")?;
        Ok(Self::container_metadata(&payload)
            .into_iter()
            .filter_map(Self::parse_track)
            .collect())
    }

    fn create_playlist(
        &self,
        profile: &PlexProfileAuth,
        title: &str,
    ) -> Result<RemotePlaylist, String> {
        let url = Self::api_url(
            &profile.server_uri,
            profile,
            "/playlists",
            &[
                ("type".to_string(), "audio".to_string()),
                ("title".to_string(), title.to_string()),
                ("smart".to_string(), "0".to_string()),
                ("uri".to_string(), String::new()),
            ],
        );
        let response = self
            .http_client
            .post(&url)
            .set("Accept", "application/json")
            .call()
            .map_err(|err| format!("Plex request failed (createPlaylist): {err}"))?;
        let payload: Value = response
            .into_json()
            .map_err(|err| format!("Plex response parse failed (createPlaylist): {err}"))?;
        Self::container_metadata(&payload)
            .first()
            .and_then(|item| Self::parse_playlist(item))
            .ok_or_else(|| "created playlist missing from response".to_string())
    }

    fn rate_track(
        &self,
        profile: &PlexProfileAuth,
        rating_key: &str,
        rating: f32,
    ) -> Result<(), String> {
        if !(0.0..=10.0).contains(&rating) {
            return Err("rating must be between 0 and 10".to_string());
        }
        // Public scale is 0-10; the server stores twice that.
        let url = Self::api_url(
            &profile.server_uri,
            profile,
            "/:/rate",
            &[
                ("key".to_string(), rating_key.to_string()),
                (
                    "identifier".to_string(),
                    "com.plexapp.plugins.library".to_string(),
                ),
                ("rating".to_string(), format!("{}", rating * 2.0)),
            ],
        );
        self.http_client
            .put(&url)
            .set("Accept", "application/json")
            .call()
            .map_err(|err| format!("Plex request failed (rate): {err}"))?;
        Ok(())
    }

    fn fetch_top_rated(
        &self,
        profile: &PlexProfileAuth,
        min_rating: f32,
        limit: usize,
    ) -> Result<Vec<RemoteTrack>, String> {
        let section_key = self.music_section_key(profile)?;
        let url = Self::api_url(
            &profile.server_uri,
            profile,
            &format!("/library/sections/{section_key}/all"),
            &[
                // type 10 is a track in the library hierarchy.
                ("type".to_string(), "10".to_string()),
                (
                    "userRating>".to_string(),
                    format!("{}", (min_rating * 2.0) - 0.01),
                ),
                ("sort".to_string(), "userRating:desc".to_string()),
                ("X-Plex-Container-Size".to_string(), limit.to_string()),
            ],
        );
        let payload = self.request_json(&url, "topRated")?;
        Ok(Self::container_metadata(&payload)
            .into_iter()
            .filter_map(Self::parse_track)
            .collect())
    }
}
