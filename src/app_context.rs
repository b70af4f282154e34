//! Shared application context with an explicit lifecycle.
//!
//! Everything session- or process-scoped that more than one component needs
//! hangs off [`AppContext`]: the bus, the live config, and persistence paths.
//! It is constructed once at startup and passed down; logout goes through
//! [`AppContext::reset_session`] instead of components clearing globals.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;

use crate::config::Config;
use crate::protocol::{Message, PlaybackMessage, QueueMessage, ServerMessage};

#[derive(Clone)]
pub struct PersistencePaths {
    pub config_file: PathBuf,
}

impl PersistencePaths {
    pub fn from_platform_dirs() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("plextune");
        Self {
            config_file: config_dir.join("config.toml"),
        }
    }
}

#[derive(Clone)]
pub struct AppContext {
    pub bus_sender: broadcast::Sender<Message>,
    pub config_state: Arc<Mutex<Config>>,
    pub persistence_paths: PersistencePaths,
}

impl AppContext {
    pub fn new(
        bus_sender: broadcast::Sender<Message>,
        config: Config,
        persistence_paths: PersistencePaths,
    ) -> Self {
        Self {
            bus_sender,
            config_state: Arc::new(Mutex::new(config)),
            persistence_paths,
        }
    }

    pub fn config(&self) -> Config {
        match self.config_state.lock() {
            Ok(config) => config.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Updates the shared config and notifies subscribed components.
    pub fn update_config(&self, config: Config) {
        {
            let mut shared = match self.config_state.lock() {
                Ok(shared) => shared,
                Err(poisoned) => poisoned.into_inner(),
            };
            *shared = config.clone();
        }
        let _ = self
            .bus_sender
            .send(Message::Config(crate::protocol::ConfigMessage::ConfigChanged(config)));
    }

    /// Logout: stop playback, drop the queue, and tell every component to
    /// forget session-scoped state.
    pub fn reset_session(&self) {
        let _ = self
            .bus_sender
            .send(Message::Playback(PlaybackMessage::Stop));
        let _ = self
            .bus_sender
            .send(Message::Queue(QueueMessage::ClearQueue));
        let _ = self
            .bus_sender
            .send(Message::Server(ServerMessage::SessionReset));
    }
}
