//! Event-bus protocol shared by all runtime components.
//!
//! This module defines all message payloads exchanged between the playback
//! queue, the audio engine, the remote library manager, media controls, and
//! the CLI front end.

use std::path::PathBuf;

use crate::backends::{RemotePlaylist, RemoteServer};
use crate::config::Config;
use crate::player_state::PlayerState;

/// Repeat behavior applied when navigating beyond the current track.
#[derive(Debug, Clone, Copy, PartialEq, serde::Deserialize, serde::Serialize)]
pub enum RepeatMode {
    Off,      // Stop after reaching the end of the queue
    Playlist, // Repeat queue from the beginning
    Track,    // Repeat current track
}

impl RepeatMode {
    /// Advances the mode in the fixed Off -> Playlist -> Track -> Off cycle.
    pub fn cycled(self) -> RepeatMode {
        match self {
            RepeatMode::Off => RepeatMode::Playlist,
            RepeatMode::Playlist => RepeatMode::Track,
            RepeatMode::Track => RepeatMode::Off,
        }
    }
}

/// Top-level envelope for all bus traffic.
#[derive(Debug, Clone)]
pub enum Message {
    Queue(QueueMessage),
    Playback(PlaybackMessage),
    Media(MediaEvent),
    Library(LibraryMessage),
    Server(ServerMessage),
    Config(ConfigMessage),
}

/// One playable part of a track's media item, used for lazy URL building.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct MediaPartRef {
    /// Server-relative part key, e.g. `/library/parts/1234/file.flac`.
    pub part_key: String,
    /// Container/extension hint as reported by the server (`flac`, `mp3`, ...).
    pub container: String,
    /// Part size in bytes, 0 when unreported.
    pub size_bytes: u64,
}

/// A track placed in the playback queue.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct QueuedTrack {
    /// Stable metadata key, unique within one queue snapshot.
    pub key: String,
    pub title: String,
    pub artist: Option<String>,
    pub album: Option<String>,
    /// Server-relative artwork reference.
    pub thumb: Option<String>,
    pub duration_ms: Option<u64>,
    /// Pre-resolved absolute playback URL, when the server already handed one out.
    pub playback_url: Option<String>,
    /// Raw media-part descriptors for lazy URL building.
    pub media: Vec<MediaPartRef>,
}

/// Queue-domain commands and notifications.
#[derive(Debug, Clone)]
pub enum QueueMessage {
    /// Replace the whole queue and start playback at `start_index`.
    SetQueue {
        tracks: Vec<QueuedTrack>,
        start_index: usize,
    },
    AddToQueue(QueuedTrack),
    AddNextInQueue(QueuedTrack),
    RemoveFromQueue(usize),
    ToggleShuffle,
    CycleRepeat,
    ClearQueue,
    /// Snapshot notification emitted after every queue mutation.
    QueueChanged {
        len: usize,
        current_index: Option<usize>,
        current: Option<QueuedTrack>,
        shuffle: bool,
        repeat: RepeatMode,
    },
}

/// Playback-domain commands and notifications.
///
/// Transport commands (`Next`, `Previous`, `PlayTrackAtIndex`) are handled by
/// the now-playing orchestrator; engine commands (`LoadTrack`, `Play`, ...)
/// are handled by the audio engine.
#[derive(Debug, Clone)]
pub enum PlaybackMessage {
    Next,
    Previous,
    PlayTrackAtIndex(usize),
    LoadTrack {
        url: String,
        requires_auth_headers: bool,
    },
    Play,
    Pause,
    TogglePlayPause,
    Stop,
    /// Absolute seek position in seconds.
    Seek(f64),
    SetVolume(f32),
    ToggleMute,
    /// Engine state notification, emitted after every state transition.
    StateChanged(PlayerState),
}

/// Events emitted by the media element into the bus.
///
/// Playback-path events carry the load generation that produced them so that
/// the engine can drop events raced out by a newer `LoadTrack`.
#[derive(Debug, Clone)]
pub enum MediaEvent {
    LoadStart { generation: u64 },
    LoadedData { generation: u64 },
    DurationChange { generation: u64, duration_s: f64 },
    TimeUpdate { generation: u64, position_s: f64 },
    Progress { generation: u64, buffered_to_s: f64 },
    Play { generation: u64 },
    Pause { generation: u64 },
    Ended { generation: u64 },
    VolumeChange { volume: f32, muted: bool },
    Error { generation: u64, message: String },
    /// Header-authenticated fetch finished; the blob is ready to load.
    BlobReady { generation: u64, path: PathBuf },
}

impl MediaEvent {
    /// Load generation this event belongs to, when it has one.
    pub fn generation(&self) -> Option<u64> {
        match self {
            MediaEvent::LoadStart { generation }
            | MediaEvent::LoadedData { generation }
            | MediaEvent::DurationChange { generation, .. }
            | MediaEvent::TimeUpdate { generation, .. }
            | MediaEvent::Progress { generation, .. }
            | MediaEvent::Play { generation }
            | MediaEvent::Pause { generation }
            | MediaEvent::Ended { generation }
            | MediaEvent::Error { generation, .. }
            | MediaEvent::BlobReady { generation, .. } => Some(*generation),
            MediaEvent::VolumeChange { .. } => None,
        }
    }
}

/// Remote-library commands and notifications.
#[derive(Debug, Clone)]
pub enum LibraryMessage {
    RequestServers,
    /// Select a discovered server by list index and pick its best connection.
    SelectServer(usize),
    RequestPlaylists,
    /// Fetch a playlist's tracks and queue them starting at `start_index`.
    OpenPlaylist {
        playlist_index: usize,
        start_index: usize,
    },
    CreatePlaylist {
        title: String,
    },
    RateTrack {
        rating_key: String,
        rating: f32,
    },
    RequestTopRated {
        min_rating: f32,
        limit: usize,
    },
    PlaylistsResult(Vec<RemotePlaylist>),
    TopRatedResult(Vec<QueuedTrack>),
    RatingSaved {
        rating_key: String,
        rating: f32,
    },
    PlaylistCreated {
        id: String,
        title: String,
    },
    LibraryError(String),
}

/// Server discovery and connection selection notifications.
#[derive(Debug, Clone)]
pub enum ServerMessage {
    ServersDiscovered(Vec<RemoteServer>),
    /// A connection was chosen for the active server; playback may start.
    ConnectionSelected {
        server_name: String,
        server_uri: String,
        access_token: String,
    },
    /// Logout: all session-scoped state must be dropped.
    SessionReset,
}

/// Runtime configuration updates.
#[derive(Debug, Clone)]
pub enum ConfigMessage {
    ConfigChanged(Config),
}
