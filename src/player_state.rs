//! Playback engine state, derived purely from media element events.
//!
//! The state machine is independent of any audio backend so tests can drive
//! it with synthetic events.

use crate::protocol::MediaEvent;

/// Coarse engine status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackStatus {
    Idle,
    Loading,
    Playing,
    Paused,
    Ended,
    Errored,
}

/// Transient playback status owned by the audio engine. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerState {
    pub status: PlaybackStatus,
    pub is_playing: bool,
    pub is_paused: bool,
    pub is_loading: bool,
    pub current_time_s: f64,
    pub duration_s: f64,
    pub buffered_to_s: f64,
    pub volume: f32,
    pub is_muted: bool,
    pub current_url: Option<String>,
    pub error: Option<String>,
}

impl Default for PlayerState {
    fn default() -> Self {
        Self {
            status: PlaybackStatus::Idle,
            is_playing: false,
            is_paused: false,
            is_loading: false,
            current_time_s: 0.0,
            duration_s: 0.0,
            buffered_to_s: 0.0,
            volume: 1.0,
            is_muted: false,
            current_url: None,
            error: None,
        }
    }
}

impl PlayerState {
    /// Resets per-track fields for a fresh load. Volume and mute survive.
    pub fn begin_load(&mut self, url: String) {
        self.status = PlaybackStatus::Loading;
        self.is_playing = false;
        self.is_paused = false;
        self.is_loading = true;
        self.current_time_s = 0.0;
        self.duration_s = 0.0;
        self.buffered_to_s = 0.0;
        self.current_url = Some(url);
        self.error = None;
    }

    /// Full reset back to idle; used by `Stop` and teardown.
    pub fn reset(&mut self) {
        let volume = self.volume;
        let is_muted = self.is_muted;
        *self = PlayerState::default();
        self.volume = volume;
        self.is_muted = is_muted;
    }

    /// Folds one media event into the state.
    pub fn apply(&mut self, event: &MediaEvent) {
        match event {
            MediaEvent::LoadStart { .. } => {
                self.is_loading = true;
                self.status = PlaybackStatus::Loading;
            }
            MediaEvent::LoadedData { .. } => {
                self.is_loading = false;
                if self.status == PlaybackStatus::Loading {
                    self.status = if self.is_playing {
                        PlaybackStatus::Playing
                    } else {
                        PlaybackStatus::Paused
                    };
                }
            }
            MediaEvent::DurationChange { duration_s, .. } => {
                self.duration_s = *duration_s;
            }
            MediaEvent::TimeUpdate { position_s, .. } => {
                self.current_time_s = *position_s;
            }
            MediaEvent::Progress { buffered_to_s, .. } => {
                self.buffered_to_s = *buffered_to_s;
            }
            MediaEvent::Play { .. } => {
                self.is_playing = true;
                self.is_paused = false;
                self.error = None;
                self.status = PlaybackStatus::Playing;
            }
            MediaEvent::Pause { .. } => {
                self.is_playing = false;
                self.is_paused = true;
                if !self.is_loading {
                    self.status = PlaybackStatus::Paused;
                }
            }
            MediaEvent::Ended { .. } => {
                self.is_playing = false;
                self.is_paused = false;
                self.is_loading = false;
                self.current_time_s = 0.0;
                self.status = PlaybackStatus::Ended;
            }
            MediaEvent::VolumeChange { volume, muted } => {
                self.volume = *volume;
                self.is_muted = *muted;
            }
            MediaEvent::Error { message, .. } => {
                self.error = Some(message.clone());
                self.is_playing = false;
                self.is_loading = false;
                self.status = PlaybackStatus::Errored;
            }
            // BlobReady is an engine-internal handoff, not a state transition.
            MediaEvent::BlobReady { .. } => {}
        }
    }

    /// True when the last loaded track ran to completion on its own: playback
    /// and loading are over, the clock rewound, and a real duration is known.
    pub fn finished_naturally(&self) -> bool {
        !self.is_playing && !self.is_loading && self.current_time_s == 0.0 && self.duration_s > 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event_sequence(state: &mut PlayerState, events: &[MediaEvent]) {
        for event in events {
            state.apply(event);
        }
    }

    #[test]
    fn test_load_play_sequence_reaches_playing() {
        let mut state = PlayerState::default();
        state.begin_load("http://server/track.flac".to_string());
        event_sequence(
            &mut state,
            &[
                MediaEvent::LoadStart { generation: 1 },
                MediaEvent::DurationChange {
                    generation: 1,
                    duration_s: 200.0,
                },
                MediaEvent::LoadedData { generation: 1 },
                MediaEvent::Play { generation: 1 },
                MediaEvent::TimeUpdate {
                    generation: 1,
                    position_s: 3.5,
                },
            ],
        );
        assert_eq!(state.status, PlaybackStatus::Playing);
        assert!(state.is_playing);
        assert!(!state.is_paused);
        assert!(!state.is_loading);
        assert_eq!(state.current_time_s, 3.5);
        assert_eq!(state.duration_s, 200.0);
    }

    #[test]
    fn test_playing_and_paused_are_mutually_exclusive() {
        let mut state = PlayerState::default();
        state.apply(&MediaEvent::Play { generation: 1 });
        assert!(state.is_playing && !state.is_paused);
        state.apply(&MediaEvent::Pause { generation: 1 });
        assert!(!state.is_playing && state.is_paused);
        state.apply(&MediaEvent::Play { generation: 1 });
        assert!(state.is_playing && !state.is_paused);
    }

    #[test]
    fn test_error_clears_playing_and_loading() {
        let mut state = PlayerState::default();
        state.apply(&MediaEvent::LoadStart { generation: 1 });
        state.apply(&MediaEvent::Play { generation: 1 });
        state.apply(&MediaEvent::Error {
            generation: 1,
            message: "decode failed".to_string(),
        });
        assert_eq!(state.status, PlaybackStatus::Errored);
        assert_eq!(state.error.as_deref(), Some("decode failed"));
        assert!(!state.is_playing);
        assert!(!state.is_loading);
    }

    #[test]
    fn test_successful_play_clears_previous_error() {
        let mut state = PlayerState::default();
        state.apply(&MediaEvent::Error {
            generation: 1,
            message: "network".to_string(),
        });
        state.begin_load("http://server/next.mp3".to_string());
        assert!(state.error.is_none());

        state.apply(&MediaEvent::Error {
            generation: 2,
            message: "network".to_string(),
        });
        state.apply(&MediaEvent::Play { generation: 2 });
        assert!(state.error.is_none());
        assert_eq!(state.status, PlaybackStatus::Playing);
    }

    #[test]
    fn test_ended_rewinds_clock_and_reads_as_finished() {
        let mut state = PlayerState::default();
        state.begin_load("http://server/track.mp3".to_string());
        event_sequence(
            &mut state,
            &[
                MediaEvent::LoadStart { generation: 1 },
                MediaEvent::DurationChange {
                    generation: 1,
                    duration_s: 5.0,
                },
                MediaEvent::LoadedData { generation: 1 },
                MediaEvent::Play { generation: 1 },
                MediaEvent::TimeUpdate {
                    generation: 1,
                    position_s: 5.0,
                },
            ],
        );
        assert!(!state.finished_naturally());
        state.apply(&MediaEvent::Ended { generation: 1 });
        assert_eq!(state.status, PlaybackStatus::Ended);
        assert_eq!(state.current_time_s, 0.0);
        assert!(state.finished_naturally());
    }

    #[test]
    fn test_begin_load_does_not_read_as_finished() {
        let mut state = PlayerState::default();
        state.begin_load("http://server/track.mp3".to_string());
        // duration is zeroed, so a fresh load never looks like a completed one
        assert!(!state.finished_naturally());
    }

    #[test]
    fn test_volume_survives_reset() {
        let mut state = PlayerState::default();
        state.apply(&MediaEvent::VolumeChange {
            volume: 0.4,
            muted: true,
        });
        state.reset();
        assert_eq!(state.volume, 0.4);
        assert!(state.is_muted);
        assert_eq!(state.status, PlaybackStatus::Idle);
    }
}
