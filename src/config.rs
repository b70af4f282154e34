//! Persistent application configuration model and defaults.

/// Root configuration persisted to `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Config {
    /// Remote server account and discovery preferences.
    pub server: ServerConfig,
    #[serde(default)]
    /// Streaming and transcode preferences.
    pub playback: PlaybackConfig,
    #[serde(default)]
    /// Queue persistence behavior.
    pub queue: QueueConfig,
}

/// Remote server account and discovery preferences.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ServerConfig {
    /// Discovery endpoint used to enumerate reachable servers.
    #[serde(default = "default_discovery_url")]
    pub discovery_url: String,
    /// API token. Leave empty to read the token from the OS keyring instead.
    #[serde(default)]
    pub auth_token: String,
    /// Stable client identifier sent with every request; generated on first run.
    #[serde(default)]
    pub client_identifier: String,
    /// Preferred server name; first discovered server wins when empty.
    #[serde(default)]
    pub preferred_server: String,
    /// Treat this machine as part of the server's local network when scoring
    /// connection candidates.
    #[serde(default)]
    pub local_network: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            discovery_url: default_discovery_url(),
            auth_token: String::new(),
            client_identifier: String::new(),
            preferred_server: String::new(),
            local_network: false,
        }
    }
}

/// Streaming and transcode preferences.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct PlaybackConfig {
    /// Always request a transcoded stream instead of direct play.
    #[serde(default)]
    pub force_transcode: bool,
    /// Target codec for transcoded streams.
    #[serde(default = "default_transcode_codec")]
    pub transcode_codec: String,
    /// Target bitrate for transcoded streams, in kbps.
    #[serde(default = "default_transcode_bitrate_kbps")]
    pub transcode_bitrate_kbps: u32,
    /// Channel-count ceiling for transcoded streams.
    #[serde(default = "default_max_audio_channels")]
    pub max_audio_channels: u16,
    /// Send the token as a request header instead of a URL query parameter.
    #[serde(default)]
    pub header_auth_transport: bool,
    /// Containers that neither direct play nor the server transcoder handle.
    /// Tracks in these containers are skipped.
    #[serde(default = "default_problematic_containers")]
    pub problematic_containers: Vec<String>,
    /// Containers that are playable only through the server transcoder.
    #[serde(default = "default_transcode_containers")]
    pub transcode_containers: Vec<String>,
    #[serde(default = "default_volume")]
    pub volume: f32,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            force_transcode: false,
            transcode_codec: default_transcode_codec(),
            transcode_bitrate_kbps: default_transcode_bitrate_kbps(),
            max_audio_channels: default_max_audio_channels(),
            header_auth_transport: false,
            problematic_containers: default_problematic_containers(),
            transcode_containers: default_transcode_containers(),
            volume: default_volume(),
        }
    }
}

/// Queue persistence behavior.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct QueueConfig {
    /// Queues longer than this are persisted as a window around the current
    /// track instead of in full.
    #[serde(default = "default_persist_threshold")]
    pub persist_threshold: usize,
    /// Number of tracks kept on each side of the current track in a windowed
    /// snapshot.
    #[serde(default = "default_persist_window")]
    pub persist_window: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            persist_threshold: default_persist_threshold(),
            persist_window: default_persist_window(),
        }
    }
}

fn default_discovery_url() -> String {
    "https://plex.tv".to_string()
}

fn default_transcode_codec() -> String {
    "mp3".to_string()
}

fn default_transcode_bitrate_kbps() -> u32 {
    320
}

fn default_max_audio_channels() -> u16 {
    2
}

fn default_problematic_containers() -> Vec<String> {
    ["wma", "asf", "wmv"].iter().map(|s| s.to_string()).collect()
}

fn default_transcode_containers() -> Vec<String> {
    ["ape", "wv", "tta", "shn"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_volume() -> f32 {
    1.0
}

fn default_persist_threshold() -> usize {
    100
}

fn default_persist_window() -> usize {
    10
}
