//! Audio engine: owns the media element and the player state.
//!
//! Commands arrive as `PlaybackMessage`s; element feedback arrives as
//! `MediaEvent`s. Every accepted event is folded into [`PlayerState`] and the
//! new state is broadcast as `PlaybackMessage::StateChanged`.

use std::path::PathBuf;
use std::thread;

use log::{debug, error, warn};
use tokio::sync::broadcast::{Receiver, Sender};

use crate::media::{fetch, MediaElement, MediaSourceSpec};
use crate::player_state::PlayerState;
use crate::protocol::{MediaEvent, Message, PlaybackMessage, ServerMessage};

pub struct AudioEngine {
    bus_consumer: Receiver<Message>,
    bus_producer: Sender<Message>,
    element: Box<dyn MediaElement>,
    state: PlayerState,
    /// Monotonic load generation; element events from older loads are stale.
    generation: u64,
    http_agent: ureq::Agent,
    client_identifier: String,
    access_token: String,
    blob_path: Option<PathBuf>,
}

impl AudioEngine {
    pub fn new(
        bus_consumer: Receiver<Message>,
        bus_producer: Sender<Message>,
        element: Box<dyn MediaElement>,
        client_identifier: String,
        initial_volume: f32,
    ) -> Self {
        let mut state = PlayerState::default();
        state.volume = initial_volume.clamp(0.0, 1.0);
        Self {
            bus_consumer,
            bus_producer,
            element,
            state,
            generation: 0,
            http_agent: fetch::build_agent(),
            client_identifier,
            access_token: String::new(),
            blob_path: None,
        }
    }

    pub fn run(&mut self) {
        loop {
            match self.bus_consumer.blocking_recv() {
                Ok(Message::Playback(message)) => self.handle_playback(message),
                Ok(Message::Media(event)) => self.handle_media_event(event),
                Ok(Message::Server(ServerMessage::ConnectionSelected {
                    access_token, ..
                })) => {
                    self.access_token = access_token;
                }
                Ok(Message::Server(ServerMessage::SessionReset)) => {
                    debug!("AudioEngine: session reset, stopping playback");
                    self.access_token.clear();
                    self.stop();
                }
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {
                    // Ignore lag as we've increased the bus capacity
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                    error!("AudioEngine: bus closed");
                    self.cleanup_blob();
                    break;
                }
            }
        }
    }

    fn handle_playback(&mut self, message: PlaybackMessage) {
        match message {
            PlaybackMessage::LoadTrack {
                url,
                requires_auth_headers,
            } => self.load_track(url, requires_auth_headers),
            PlaybackMessage::Play => self.element.play(),
            PlaybackMessage::Pause => self.element.pause(),
            PlaybackMessage::TogglePlayPause => {
                if self.state.is_playing {
                    self.element.pause();
                } else {
                    self.element.play();
                }
            }
            PlaybackMessage::Stop => self.stop(),
            PlaybackMessage::Seek(position_s) => {
                let position_ms = (position_s.max(0.0) * 1_000.0) as u64;
                self.element.seek_ms(position_ms);
            }
            PlaybackMessage::SetVolume(volume) => self.element.set_volume(volume),
            PlaybackMessage::ToggleMute => self.element.set_muted(!self.state.is_muted),
            // Transport and notification messages belong to other components.
            _ => {}
        }
    }

    fn handle_media_event(&mut self, event: MediaEvent) {
        if let Some(generation) = event.generation() {
            if generation != self.generation {
                debug!(
                    "AudioEngine: dropping stale media event from generation {} (current {})",
                    generation, self.generation
                );
                if let MediaEvent::BlobReady { path, .. } = event {
                    fetch::remove_blob(&path);
                }
                return;
            }
        }

        if let MediaEvent::BlobReady { path, generation } = event {
            self.blob_path = Some(path.clone());
            self.element.load(MediaSourceSpec::Blob(path), generation, 0);
            return;
        }

        self.state.apply(&event);
        self.broadcast_state();
    }

    /// Stops and rewinds the previous source, then starts the new load. With
    /// `requires_auth_headers`, the bytes are fetched on a worker thread with
    /// identification headers and materialized as a local blob first.
    fn load_track(&mut self, url: String, requires_auth_headers: bool) {
        self.generation += 1;
        let generation = self.generation;
        self.element.stop();
        self.cleanup_blob();
        self.state.begin_load(url.clone());
        self.broadcast_state();

        if !requires_auth_headers {
            self.element.load(MediaSourceSpec::Url(url), generation, 0);
            return;
        }

        if self.access_token.is_empty() {
            self.handle_media_event(MediaEvent::Error {
                generation,
                message: "no access token for header-authenticated fetch".to_string(),
            });
            return;
        }

        let bus_producer = self.bus_producer.clone();
        let agent = self.http_agent.clone();
        let token = self.access_token.clone();
        let client_identifier = self.client_identifier.clone();
        thread::spawn(move || {
            let event = match fetch::fetch_to_blob(&agent, &url, &token, &client_identifier) {
                Ok(path) => MediaEvent::BlobReady { generation, path },
                Err(message) => {
                    warn!("AudioEngine: blob fetch failed: {}", message);
                    MediaEvent::Error {
                        generation,
                        message,
                    }
                }
            };
            let _ = bus_producer.send(Message::Media(event));
        });
    }

    fn stop(&mut self) {
        self.element.stop();
        self.cleanup_blob();
        self.state.reset();
        self.broadcast_state();
    }

    fn cleanup_blob(&mut self) {
        if let Some(path) = self.blob_path.take() {
            fetch::remove_blob(&path);
        }
    }

    fn broadcast_state(&self) {
        let _ = self
            .bus_producer
            .send(Message::Playback(PlaybackMessage::StateChanged(
                self.state.clone(),
            )));
    }
}
