//! Remote library manager: server discovery, playlists, ratings.
//!
//! Thin orchestration between the bus and a [`MediaServerAdapter`]. Selecting
//! a server scores its connection candidates and publishes the winning URI so
//! playback components can resolve stream URLs against it.

use log::{debug, error, info, warn};
use tokio::sync::broadcast::{Receiver, Sender};

use crate::backends::{MediaServerAdapter, PlexProfileAuth, RemoteServer, RemoteTrack};
use crate::config::Config;
use crate::connection::{score_connection, select_best_connection};
use crate::protocol::{
    LibraryMessage, MediaPartRef, Message, QueueMessage, QueuedTrack, ServerMessage,
};

/// Upper bound on tracks fetched for one playlist.
const PLAYLIST_ITEM_LIMIT: usize = 1_000;

pub struct LibraryManager {
    bus_consumer: Receiver<Message>,
    bus_producer: Sender<Message>,
    adapter: Box<dyn MediaServerAdapter>,
    profile: PlexProfileAuth,
    /// Account token from configuration; server tokens may override it.
    account_token: String,
    local_network: bool,
    preferred_server: String,
    servers: Vec<RemoteServer>,
    playlists: Vec<crate::backends::RemotePlaylist>,
}

impl LibraryManager {
    pub fn new(
        bus_consumer: Receiver<Message>,
        bus_producer: Sender<Message>,
        adapter: Box<dyn MediaServerAdapter>,
        config: &Config,
        auth_token: String,
    ) -> Self {
        let profile = PlexProfileAuth {
            discovery_url: config.server.discovery_url.clone(),
            server_uri: String::new(),
            access_token: auth_token.clone(),
            client_identifier: config.server.client_identifier.clone(),
        };
        Self {
            bus_consumer,
            bus_producer,
            adapter,
            profile,
            account_token: auth_token,
            local_network: config.server.local_network,
            preferred_server: config.server.preferred_server.clone(),
            servers: Vec::new(),
            playlists: Vec::new(),
        }
    }

    pub fn run(&mut self) {
        loop {
            match self.bus_consumer.blocking_recv() {
                Ok(Message::Library(message)) => self.handle_library(message),
                Ok(Message::Server(ServerMessage::SessionReset)) => {
                    self.servers.clear();
                    self.playlists.clear();
                    self.profile.server_uri.clear();
                    self.profile.access_token = self.account_token.clone();
                }
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {
                    // Ignore lag as we've increased the bus capacity
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                    error!("LibraryManager: bus closed");
                    break;
                }
            }
        }
    }

    fn handle_library(&mut self, message: LibraryMessage) {
        match message {
            LibraryMessage::RequestServers => self.request_servers(),
            LibraryMessage::SelectServer(index) => self.select_server(index),
            LibraryMessage::RequestPlaylists => self.request_playlists(),
            LibraryMessage::OpenPlaylist {
                playlist_index,
                start_index,
            } => self.open_playlist(playlist_index, start_index),
            LibraryMessage::CreatePlaylist { title } => self.create_playlist(&title),
            LibraryMessage::RateTrack { rating_key, rating } => {
                self.rate_track(&rating_key, rating)
            }
            LibraryMessage::RequestTopRated { min_rating, limit } => {
                self.request_top_rated(min_rating, limit)
            }
            // Notifications we emit ourselves.
            _ => {}
        }
    }

    fn request_servers(&mut self) {
        match self.adapter.fetch_resources(&self.profile) {
            Ok(servers) => {
                info!("LibraryManager: discovered {} server(s)", servers.len());
                self.servers = servers;
                let _ = self.bus_producer.send(Message::Server(
                    ServerMessage::ServersDiscovered(self.servers.clone()),
                ));
                if let Some(index) = self.auto_select_index() {
                    self.select_server(index);
                }
            }
            Err(err) => self.report_error(format!("server discovery failed: {err}")),
        }
    }

    /// Picks a server without user input when the choice is unambiguous:
    /// a configured preferred name, or a single discovered server.
    fn auto_select_index(&self) -> Option<usize> {
        if !self.preferred_server.is_empty() {
            let preferred = self
                .servers
                .iter()
                .position(|server| server.name == self.preferred_server);
            if preferred.is_some() {
                return preferred;
            }
            warn!(
                "LibraryManager: preferred server '{}' not found",
                self.preferred_server
            );
        }
        if self.servers.len() == 1 {
            return Some(0);
        }
        None
    }

    fn select_server(&mut self, index: usize) {
        let server = match self.servers.get(index) {
            Some(server) => server.clone(),
            None => {
                self.report_error(format!("no discovered server at index {index}"));
                return;
            }
        };

        let connection = match select_best_connection(&server.connections, self.local_network) {
            Some(connection) => connection,
            None => {
                self.report_error(format!("server '{}' has no usable connection", server.name));
                return;
            }
        };
        for candidate in &server.connections {
            debug!(
                "LibraryManager: connection candidate {} scored {}",
                candidate.uri,
                score_connection(candidate, self.local_network)
            );
        }
        info!(
            "LibraryManager: selected connection {} for '{}'",
            connection.uri, server.name
        );

        self.profile.server_uri = connection.uri.clone();
        self.profile.access_token = server
            .access_token
            .clone()
            .unwrap_or_else(|| self.account_token.clone());

        if let Err(err) = self.adapter.test_connection(&self.profile) {
            warn!(
                "LibraryManager: connection test against {} failed: {}",
                self.profile.server_uri, err
            );
        }

        let _ = self
            .bus_producer
            .send(Message::Server(ServerMessage::ConnectionSelected {
                server_name: server.name.clone(),
                server_uri: self.profile.server_uri.clone(),
                access_token: self.profile.access_token.clone(),
            }));
    }

    fn request_playlists(&mut self) {
        if self.profile.server_uri.is_empty() {
            self.report_error("no server selected".to_string());
            return;
        }
        match self.adapter.fetch_playlists(&self.profile) {
            Ok(playlists) => {
                info!("LibraryManager: fetched {} playlist(s)", playlists.len());
                self.playlists = playlists;
                let _ = self.bus_producer.send(Message::Library(
                    LibraryMessage::PlaylistsResult(self.playlists.clone()),
                ));
            }
            Err(err) => self.report_error(format!("playlist fetch failed: {err}")),
        }
    }

    fn open_playlist(&mut self, playlist_index: usize, start_index: usize) {
        let playlist = match self.playlists.get(playlist_index) {
            Some(playlist) => playlist.clone(),
            None => {
                self.report_error(format!("no playlist at index {playlist_index}"));
                return;
            }
        };
        match self
            .adapter
            .fetch_playlist_items(&self.profile, &playlist.key, PLAYLIST_ITEM_LIMIT)
        {
            Ok(tracks) => {
                info!(
                    "LibraryManager: queueing playlist '{}' with {} track(s)",
                    playlist.title,
                    tracks.len()
                );
                let tracks = tracks.into_iter().map(queued_track_from_remote).collect();
                let _ = self
                    .bus_producer
                    .send(Message::Queue(QueueMessage::SetQueue {
                        tracks,
                        start_index,
                    }));
            }
            Err(err) => self.report_error(format!("playlist items fetch failed: {err}")),
        }
    }

    fn create_playlist(&mut self, title: &str) {
        match self.adapter.create_playlist(&self.profile, title) {
            Ok(playlist) => {
                info!("LibraryManager: created playlist '{}'", playlist.title);
                let _ = self
                    .bus_producer
                    .send(Message::Library(LibraryMessage::PlaylistCreated {
                        id: playlist.rating_key.clone(),
                        title: playlist.title.clone(),
                    }));
                self.request_playlists();
            }
            Err(err) => self.report_error(format!("playlist creation failed: {err}")),
        }
    }

    fn rate_track(&mut self, rating_key: &str, rating: f32) {
        match self.adapter.rate_track(&self.profile, rating_key, rating) {
            Ok(()) => {
                debug!("LibraryManager: rated {} as {}/10", rating_key, rating);
                let _ = self
                    .bus_producer
                    .send(Message::Library(LibraryMessage::RatingSaved {
                        rating_key: rating_key.to_string(),
                        rating,
                    }));
            }
            Err(err) => self.report_error(format!("rating failed: {err}")),
        }
    }

    fn request_top_rated(&mut self, min_rating: f32, limit: usize) {
        match self
            .adapter
            .fetch_top_rated(&self.profile, min_rating, limit)
        {
            Ok(tracks) => {
                let tracks: Vec<QueuedTrack> =
                    tracks.into_iter().map(queued_track_from_remote).collect();
                let _ = self
                    .bus_producer
                    .send(Message::Library(LibraryMessage::TopRatedResult(tracks)));
            }
            Err(err) => self.report_error(format!("top-rated fetch failed: {err}")),
        }
    }

    fn report_error(&self, message: String) {
        error!("LibraryManager: {}", message);
        let _ = self
            .bus_producer
            .send(Message::Library(LibraryMessage::LibraryError(message)));
    }
}

/// Maps a backend track payload into a queueable track.
pub fn queued_track_from_remote(track: RemoteTrack) -> QueuedTrack {
    QueuedTrack {
        key: track.key,
        title: track.title,
        artist: track.artist,
        album: track.album,
        thumb: track.thumb,
        duration_ms: track.duration_ms,
        playback_url: None,
        media: track
            .parts
            .into_iter()
            .map(|part| MediaPartRef {
                part_key: part.key,
                container: part.container,
                size_bytes: part.size_bytes,
            })
            .collect(),
    }
}
