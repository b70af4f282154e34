//! OS media controls bridge (MPRIS/SMTC/Now Playing).
//!
//! This manager connects the runtime event bus to platform media control
//! integrations via `souvlaki`.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::warn;
use souvlaki::{
    MediaControlEvent, MediaControls, MediaMetadata, MediaPlayback, MediaPosition, PlatformConfig,
    SeekDirection,
};
use tokio::sync::broadcast::{Receiver, Sender};

use crate::protocol::{Message, PlaybackMessage, QueueMessage, QueuedTrack};

const MEDIA_CONTROLS_DISPLAY_NAME: &str = "Plextune";
const MEDIA_CONTROLS_DBUS_NAME: &str = "plextune";

#[derive(Debug, Clone, Copy, Default)]
struct ControlState {
    is_playing: bool,
    elapsed_s: f64,
    total_s: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlaybackPublishState {
    Stopped,
    Paused,
    Playing,
}

/// Handles OS media control events and publishes app playback state.
pub struct MediaControlsManager {
    bus_consumer: Receiver<Message>,
    control_state: Arc<Mutex<ControlState>>,
    controls: Option<MediaControls>,
    current_track: Option<QueuedTrack>,
    last_published_playback: Option<PlaybackPublishState>,
    last_published_track_key: Option<String>,
}

impl MediaControlsManager {
    /// Creates a manager and attempts to initialize platform media controls.
    pub fn new(bus_consumer: Receiver<Message>, bus_producer: Sender<Message>) -> Self {
        let control_state = Arc::new(Mutex::new(ControlState::default()));
        let controls = Self::create_controls(bus_producer, Arc::clone(&control_state));

        Self {
            bus_consumer,
            control_state,
            controls,
            current_track: None,
            last_published_playback: None,
            last_published_track_key: None,
        }
    }

    #[cfg(not(target_os = "windows"))]
    fn create_controls(
        bus_producer: Sender<Message>,
        control_state: Arc<Mutex<ControlState>>,
    ) -> Option<MediaControls> {
        let mut controls = match MediaControls::new(PlatformConfig {
            display_name: MEDIA_CONTROLS_DISPLAY_NAME,
            dbus_name: MEDIA_CONTROLS_DBUS_NAME,
            hwnd: None,
        }) {
            Ok(controls) => controls,
            Err(err) => {
                warn!(
                    "MediaControlsManager: failed to create media controls backend: {}",
                    err
                );
                return None;
            }
        };

        if let Err(err) = controls.attach(move |event| {
            let snapshot = match control_state.lock() {
                Ok(state) => *state,
                Err(poisoned) => *poisoned.into_inner(),
            };

            if let Some(playback_message) = Self::map_control_event(event, snapshot) {
                let _ = bus_producer.send(Message::Playback(playback_message));
            }
        }) {
            warn!(
                "MediaControlsManager: failed to attach media controls handler: {}",
                err
            );
            return None;
        }

        Some(controls)
    }

    #[cfg(target_os = "windows")]
    fn create_controls(
        _bus_producer: Sender<Message>,
        _control_state: Arc<Mutex<ControlState>>,
    ) -> Option<MediaControls> {
        // Souvlaki requires an HWND on Windows, which a headless CLI does not
        // have.
        warn!("MediaControlsManager: Windows media controls are disabled without an HWND");
        None
    }

    fn map_control_event(event: MediaControlEvent, state: ControlState) -> Option<PlaybackMessage> {
        match event {
            MediaControlEvent::Play => Some(PlaybackMessage::Play),
            MediaControlEvent::Pause => Some(PlaybackMessage::Pause),
            MediaControlEvent::Toggle => {
                if state.is_playing {
                    Some(PlaybackMessage::Pause)
                } else {
                    Some(PlaybackMessage::Play)
                }
            }
            MediaControlEvent::Next => Some(PlaybackMessage::Next),
            MediaControlEvent::Previous => Some(PlaybackMessage::Previous),
            MediaControlEvent::Stop => Some(PlaybackMessage::Stop),
            MediaControlEvent::SetPosition(MediaPosition(position)) => {
                if state.total_s <= 0.0 {
                    return None;
                }
                Some(PlaybackMessage::Seek(
                    position.as_secs_f64().min(state.total_s),
                ))
            }
            MediaControlEvent::SeekBy(direction, amount) => {
                if state.total_s <= 0.0 {
                    return None;
                }
                let delta = amount.as_secs_f64();
                let target = match direction {
                    SeekDirection::Forward => state.elapsed_s + delta,
                    SeekDirection::Backward => state.elapsed_s - delta,
                };
                Some(PlaybackMessage::Seek(target.clamp(0.0, state.total_s)))
            }
            _ => None,
        }
    }

    pub fn run(&mut self) {
        loop {
            match self.bus_consumer.blocking_recv() {
                Ok(Message::Playback(PlaybackMessage::StateChanged(state))) => {
                    {
                        let mut control_state = match self.control_state.lock() {
                            Ok(control_state) => control_state,
                            Err(poisoned) => poisoned.into_inner(),
                        };
                        control_state.is_playing = state.is_playing;
                        control_state.elapsed_s = state.current_time_s;
                        control_state.total_s = state.duration_s;
                    }
                    self.publish_playback(&state);
                }
                Ok(Message::Queue(QueueMessage::QueueChanged { current, .. })) => {
                    self.current_track = current;
                    self.publish_metadata();
                }
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("MediaControlsManager: bus lagged by {} messages", skipped);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    fn publish_playback(&mut self, state: &crate::player_state::PlayerState) {
        let next = if state.is_playing {
            PlaybackPublishState::Playing
        } else if state.is_paused {
            PlaybackPublishState::Paused
        } else {
            PlaybackPublishState::Stopped
        };
        if self.last_published_playback == Some(next) {
            return;
        }
        let controls = match self.controls.as_mut() {
            Some(controls) => controls,
            None => return,
        };
        let progress = Some(MediaPosition(Duration::from_secs_f64(
            state.current_time_s.max(0.0),
        )));
        let playback = match next {
            PlaybackPublishState::Playing => MediaPlayback::Playing { progress },
            PlaybackPublishState::Paused => MediaPlayback::Paused { progress },
            PlaybackPublishState::Stopped => MediaPlayback::Stopped,
        };
        if let Err(err) = controls.set_playback(playback) {
            warn!("MediaControlsManager: failed to publish playback: {}", err);
            return;
        }
        self.last_published_playback = Some(next);
    }

    fn publish_metadata(&mut self) {
        let track_key = self.current_track.as_ref().map(|track| track.key.clone());
        if self.last_published_track_key == track_key {
            return;
        }
        let controls = match self.controls.as_mut() {
            Some(controls) => controls,
            None => return,
        };
        let metadata = match self.current_track.as_ref() {
            Some(track) => MediaMetadata {
                title: Some(track.title.as_str()),
                artist: track.artist.as_deref(),
                album: track.album.as_deref(),
                duration: track.duration_ms.map(Duration::from_millis),
                ..MediaMetadata::default()
            },
            None => MediaMetadata::default(),
        };
        if let Err(err) = controls.set_metadata(metadata) {
            warn!("MediaControlsManager: failed to publish metadata: {}", err);
            return;
        }
        self.last_published_track_key = track_key;
    }
}

#[cfg(test)]
mod tests {
    use super::{ControlState, MediaControlsManager};
    use crate::protocol::PlaybackMessage;
    use souvlaki::{MediaControlEvent, MediaPosition, SeekDirection};
    use std::time::Duration;

    fn assert_seek_message(message: Option<PlaybackMessage>, expected: f64) {
        match message {
            Some(PlaybackMessage::Seek(value)) => {
                assert!((value - expected).abs() < f64::EPSILON);
            }
            _ => panic!("expected PlaybackMessage::Seek"),
        }
    }

    #[test]
    fn test_toggle_event_pauses_when_currently_playing() {
        let state = ControlState {
            is_playing: true,
            elapsed_s: 0.0,
            total_s: 0.0,
        };
        let message = MediaControlsManager::map_control_event(MediaControlEvent::Toggle, state);
        assert!(matches!(message, Some(PlaybackMessage::Pause)));
    }

    #[test]
    fn test_toggle_event_plays_when_currently_paused() {
        let state = ControlState {
            is_playing: false,
            elapsed_s: 0.0,
            total_s: 0.0,
        };
        let message = MediaControlsManager::map_control_event(MediaControlEvent::Toggle, state);
        assert!(matches!(message, Some(PlaybackMessage::Play)));
    }

    #[test]
    fn test_set_position_event_maps_to_absolute_seek() {
        let state = ControlState {
            is_playing: true,
            elapsed_s: 0.0,
            total_s: 200.0,
        };
        let message = MediaControlsManager::map_control_event(
            MediaControlEvent::SetPosition(MediaPosition(Duration::from_secs(50))),
            state,
        );
        assert_seek_message(message, 50.0);
    }

    #[test]
    fn test_seek_by_forward_adds_to_elapsed_time() {
        let state = ControlState {
            is_playing: true,
            elapsed_s: 80.0,
            total_s: 200.0,
        };
        let message = MediaControlsManager::map_control_event(
            MediaControlEvent::SeekBy(SeekDirection::Forward, Duration::from_secs(20)),
            state,
        );
        assert_seek_message(message, 100.0);
    }

    #[test]
    fn test_seek_without_duration_is_ignored() {
        let state = ControlState {
            is_playing: true,
            elapsed_s: 10.0,
            total_s: 0.0,
        };
        let message = MediaControlsManager::map_control_event(
            MediaControlEvent::SeekBy(SeekDirection::Backward, Duration::from_secs(5)),
            state,
        );
        assert!(message.is_none());
    }

    #[test]
    fn test_seek_backward_clamps_at_track_start() {
        let state = ControlState {
            is_playing: true,
            elapsed_s: 2.0,
            total_s: 200.0,
        };
        let message = MediaControlsManager::map_control_event(
            MediaControlEvent::SeekBy(SeekDirection::Backward, Duration::from_secs(10)),
            state,
        );
        assert_seek_message(message, 0.0);
    }
}
