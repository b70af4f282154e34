//! Now-playing orchestration: queue, resolver, and engine glued together.
//!
//! Owns the playback queue and the selected connection context. On natural
//! track end or engine error it picks the next thing to do: retry the same
//! track through the transcoder once, skip unplayable tracks, or stop at the
//! end of the queue. Error recovery sits behind a 500ms cooldown so a
//! fast-failing source cannot spin the advance logic.

use std::num::NonZeroU32;
use std::time::Duration;

use governor::state::NotKeyed;
use governor::{Quota, RateLimiter};
use log::{debug, info, warn};
use tokio::sync::broadcast::{Receiver, Sender};

use crate::config::{Config, PlaybackConfig, QueueConfig};
use crate::db_manager::DbManager;
use crate::player_state::PlayerState;
use crate::protocol::{
    Message, PlaybackMessage, QueueMessage, QueuedTrack, ServerMessage,
};
use crate::queue::PlayQueue;
use crate::queue_persistence;
use crate::stream_url::{resolve_track_playback, ResolveOptions, StreamSource};

/// Elapsed-time threshold after which "previous" restarts the current track.
const PREVIOUS_RESTART_THRESHOLD_S: f64 = 3.0;
/// Minimum spacing between error-recovery attempts.
const RECOVERY_COOLDOWN_MS: u64 = 500;

enum Direction {
    Forward,
    Backward,
}

pub struct NowPlayingManager {
    bus_consumer: Receiver<Message>,
    bus_producer: Sender<Message>,
    queue: PlayQueue,
    db: DbManager,
    playback_config: PlaybackConfig,
    queue_config: QueueConfig,
    server_uri: Option<String>,
    access_token: Option<String>,
    last_state: PlayerState,
    /// The current track was already retried through the transcoder.
    transcode_retried: bool,
    recovery_limiter:
        RateLimiter<NotKeyed, governor::state::InMemoryState, governor::clock::DefaultClock>,
}

impl NowPlayingManager {
    pub fn new(
        bus_consumer: Receiver<Message>,
        bus_producer: Sender<Message>,
        db: DbManager,
        config: &Config,
    ) -> Self {
        Self {
            bus_consumer,
            bus_producer,
            queue: PlayQueue::new(),
            db,
            playback_config: config.playback.clone(),
            queue_config: config.queue.clone(),
            server_uri: None,
            access_token: None,
            last_state: PlayerState::default(),
            transcode_retried: false,
            recovery_limiter: RateLimiter::direct(
                Quota::with_period(Duration::from_millis(RECOVERY_COOLDOWN_MS))
                    .expect("valid cooldown period")
                    .allow_burst(NonZeroU32::new(1).expect("non-zero cooldown burst")),
            ),
        }
    }

    pub fn run(&mut self) {
        // Degraded resume: restore the (possibly windowed) snapshot without
        // starting playback.
        if let Some(snapshot) = queue_persistence::load_queue_snapshot(&self.db) {
            info!(
                "NowPlayingManager: restored queue snapshot with {} of {} tracks",
                snapshot.tracks.len(),
                snapshot.original_len
            );
            self.queue = queue_persistence::queue_from_snapshot(snapshot);
            self.broadcast_queue_changed();
        }

        loop {
            match self.bus_consumer.blocking_recv() {
                Ok(Message::Queue(message)) => self.handle_queue(message),
                Ok(Message::Playback(message)) => self.handle_playback(message),
                Ok(Message::Server(message)) => self.handle_server(message),
                Ok(Message::Config(crate::protocol::ConfigMessage::ConfigChanged(config))) => {
                    self.playback_config = config.playback;
                    self.queue_config = config.queue;
                }
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {
                    // Ignore lag as we've increased the bus capacity
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                    log::error!("NowPlayingManager: bus closed");
                    break;
                }
            }
        }
    }

    fn handle_queue(&mut self, message: QueueMessage) {
        match message {
            QueueMessage::SetQueue {
                tracks,
                start_index,
            } => {
                debug!(
                    "NowPlayingManager: queueing {} tracks starting at {}",
                    tracks.len(),
                    start_index
                );
                self.queue.set_queue(tracks, start_index);
                self.transcode_retried = false;
                self.after_queue_mutation();
                self.start_current();
            }
            QueueMessage::AddToQueue(track) => {
                self.queue.add_to_queue(track);
                self.after_queue_mutation();
            }
            QueueMessage::AddNextInQueue(track) => {
                self.queue.add_next_in_queue(track);
                self.after_queue_mutation();
            }
            QueueMessage::RemoveFromQueue(index) => {
                self.queue.remove_from_queue(index);
                self.after_queue_mutation();
            }
            QueueMessage::ToggleShuffle => {
                let shuffle = self.queue.toggle_shuffle();
                debug!("NowPlayingManager: shuffle {}", shuffle);
                self.after_queue_mutation();
            }
            QueueMessage::CycleRepeat => {
                let repeat = self.queue.cycle_repeat();
                debug!("NowPlayingManager: repeat mode {:?}", repeat);
                self.after_queue_mutation();
            }
            QueueMessage::ClearQueue => {
                self.queue.clear();
                queue_persistence::clear_saved_queue(&self.db);
                self.send_engine(PlaybackMessage::Stop);
                self.broadcast_queue_changed();
            }
            QueueMessage::QueueChanged { .. } => {}
        }
    }

    fn handle_playback(&mut self, message: PlaybackMessage) {
        match message {
            PlaybackMessage::Next => {
                self.send_engine(PlaybackMessage::Pause);
                self.advance(Direction::Forward);
            }
            PlaybackMessage::Previous => self.handle_previous(),
            PlaybackMessage::PlayTrackAtIndex(index) => {
                let track = self.queue.play_track_at_index(index).cloned();
                if let Some(track) = track {
                    self.after_queue_mutation();
                    self.start_track(&track);
                }
            }
            PlaybackMessage::StateChanged(state) => self.handle_state_changed(state),
            _ => {}
        }
    }

    fn handle_server(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::ConnectionSelected {
                server_name,
                server_uri,
                access_token,
            } => {
                info!(
                    "NowPlayingManager: using server '{}' at {}",
                    server_name, server_uri
                );
                self.server_uri = Some(server_uri);
                self.access_token = Some(access_token);
            }
            ServerMessage::SessionReset => {
                debug!("NowPlayingManager: session reset");
                self.server_uri = None;
                self.access_token = None;
                self.queue.clear();
                queue_persistence::clear_saved_queue(&self.db);
                self.broadcast_queue_changed();
            }
            ServerMessage::ServersDiscovered(_) => {}
        }
    }

    fn handle_state_changed(&mut self, state: PlayerState) {
        let finished_now =
            state.finished_naturally() && !self.last_state.finished_naturally();
        let fresh_error = state.error.is_some() && state.error != self.last_state.error;
        if state.is_playing && state.error.is_none() {
            // Playback recovered; the same track may transcode-retry again
            // if it errors later.
            self.transcode_retried = false;
        }
        self.last_state = state;

        if finished_now && self.queue.current_track().is_some() {
            debug!("NowPlayingManager: track finished, advancing");
            self.advance(Direction::Forward);
        } else if fresh_error {
            self.recover_from_error();
        }
    }

    /// Bounded recovery: one transcode retry for the current track, then
    /// skip. Re-entry inside the cooldown window is ignored.
    fn recover_from_error(&mut self) {
        if self.recovery_limiter.check().is_err() {
            debug!("NowPlayingManager: recovery suppressed by cooldown");
            return;
        }

        if !self.transcode_retried {
            let current = self.queue.current_track().cloned();
            if let Some(track) = current {
                let source = self.resolve(&track, true);
                if !source.is_unplayable() {
                    warn!(
                        "NowPlayingManager: retrying '{}' with forced transcode",
                        track.title
                    );
                    self.transcode_retried = true;
                    self.load_and_play(source);
                    return;
                }
            }
        }

        debug!("NowPlayingManager: skipping erroring track");
        self.advance(Direction::Forward);
    }

    fn handle_previous(&mut self) {
        self.send_engine(PlaybackMessage::Pause);
        // Grace rule: far enough into the track, or with nowhere to go back
        // to, previous restarts the current track instead of moving.
        if self.last_state.current_time_s > PREVIOUS_RESTART_THRESHOLD_S
            || !self.queue.has_previous()
        {
            self.send_engine(PlaybackMessage::Seek(0.0));
            self.send_engine(PlaybackMessage::Play);
            return;
        }
        self.advance(Direction::Backward);
    }

    /// Moves the queue pointer until a playable track is found, loading and
    /// playing it. Unplayable tracks are skipped, never retried. Runs out of
    /// legal moves: the engine is left stopped.
    fn advance(&mut self, direction: Direction) {
        for _ in 0..self.queue.len().max(1) {
            let track = match direction {
                Direction::Forward => self.queue.play_next().cloned(),
                Direction::Backward => self.queue.play_previous().cloned(),
            };
            let track = match track {
                Some(track) => track,
                None => {
                    debug!("NowPlayingManager: no further track to play");
                    self.after_queue_mutation();
                    return;
                }
            };
            self.after_queue_mutation();

            let source = self.resolve(&track, false);
            if source.is_unplayable() {
                info!(
                    "NowPlayingManager: skipping unplayable track '{}'",
                    track.title
                );
                continue;
            }
            self.transcode_retried = false;
            self.load_and_play(source);
            return;
        }
        warn!("NowPlayingManager: no playable track found, stopping");
        self.send_engine(PlaybackMessage::Stop);
    }

    /// Resolves and starts the given (already current) track; advances past
    /// it when it is unplayable.
    fn start_track(&mut self, track: &QueuedTrack) {
        let source = self.resolve(track, false);
        if source.is_unplayable() {
            info!(
                "NowPlayingManager: current track '{}' is unplayable, skipping",
                track.title
            );
            self.advance(Direction::Forward);
            return;
        }
        self.transcode_retried = false;
        self.load_and_play(source);
    }

    fn start_current(&mut self) {
        let track = self.queue.current_track().cloned();
        if let Some(track) = track {
            self.start_track(&track);
        }
    }

    fn resolve(&self, track: &QueuedTrack, force_transcode: bool) -> StreamSource {
        let opts = ResolveOptions::from_config(&self.playback_config, force_transcode);
        resolve_track_playback(
            track,
            self.server_uri.as_deref(),
            self.access_token.as_deref(),
            &opts,
        )
    }

    fn load_and_play(&self, source: StreamSource) {
        self.send_engine(PlaybackMessage::LoadTrack {
            url: source.url,
            requires_auth_headers: source.requires_auth_headers,
        });
        self.send_engine(PlaybackMessage::Play);
    }

    fn send_engine(&self, message: PlaybackMessage) {
        let _ = self.bus_producer.send(Message::Playback(message));
    }

    fn after_queue_mutation(&mut self) {
        queue_persistence::save_queue(&self.db, &self.queue, &self.queue_config);
        self.broadcast_queue_changed();
    }

    fn broadcast_queue_changed(&self) {
        let _ = self
            .bus_producer
            .send(Message::Queue(QueueMessage::QueueChanged {
                len: self.queue.len(),
                current_index: self.queue.current_index(),
                current: self.queue.current_track().cloned(),
                shuffle: self.queue.is_shuffled(),
                repeat: self.queue.repeat_mode(),
            }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::MediaPartRef;
    use std::thread;
    use std::time::{Duration, Instant};
    use tokio::sync::broadcast::{self, error::TryRecvError, Receiver, Sender};

    struct NowPlayingHarness {
        bus_sender: Sender<Message>,
        receiver: Receiver<Message>,
    }

    impl NowPlayingHarness {
        fn new() -> Self {
            let (bus_sender, _) = broadcast::channel(4096);
            let manager_receiver = bus_sender.subscribe();
            let manager_sender = bus_sender.clone();

            thread::spawn(move || {
                let db = DbManager::new_in_memory().expect("failed to create in-memory db");
                let mut manager = NowPlayingManager::new(
                    manager_receiver,
                    manager_sender,
                    db,
                    &Config::default(),
                );
                manager.run();
            });

            let receiver = bus_sender.subscribe();
            let harness = Self {
                bus_sender,
                receiver,
            };
            harness.select_connection();
            harness
        }

        fn select_connection(&self) {
            self.send(Message::Server(ServerMessage::ConnectionSelected {
                server_name: "test".to_string(),
                server_uri: "http://server:32400".to_string(),
                access_token: "tok".to_string(),
            }));
        }

        fn send(&self, message: Message) {
            self.bus_sender.send(message).expect("bus send");
        }

        fn playing_state(time_s: f64, duration_s: f64) -> PlayerState {
            let mut state = PlayerState::default();
            state.is_playing = true;
            state.current_time_s = time_s;
            state.duration_s = duration_s;
            state
        }

        fn finished_state(duration_s: f64) -> PlayerState {
            let mut state = PlayerState::default();
            state.current_time_s = 0.0;
            state.duration_s = duration_s;
            state
        }

        fn errored_state(message: &str) -> PlayerState {
            let mut state = PlayerState::default();
            state.error = Some(message.to_string());
            state
        }

        fn wait_for_message<F>(&mut self, timeout: Duration, mut predicate: F) -> Message
        where
            F: FnMut(&Message) -> bool,
        {
            let start = Instant::now();
            loop {
                if start.elapsed() > timeout {
                    panic!("timed out waiting for expected message");
                }
                match self.receiver.try_recv() {
                    Ok(message) => {
                        if predicate(&message) {
                            return message;
                        }
                    }
                    Err(TryRecvError::Empty) => thread::sleep(Duration::from_millis(5)),
                    Err(TryRecvError::Lagged(_)) => continue,
                    Err(TryRecvError::Closed) => panic!("bus closed"),
                }
            }
        }

        fn assert_no_message<F>(&mut self, timeout: Duration, mut predicate: F)
        where
            F: FnMut(&Message) -> bool,
        {
            let start = Instant::now();
            loop {
                if start.elapsed() > timeout {
                    return;
                }
                match self.receiver.try_recv() {
                    Ok(message) => {
                        if predicate(&message) {
                            panic!("received unexpected message: {:?}", message);
                        }
                    }
                    Err(TryRecvError::Empty) => thread::sleep(Duration::from_millis(5)),
                    Err(TryRecvError::Lagged(_)) => continue,
                    Err(TryRecvError::Closed) => return,
                }
            }
        }

        fn wait_for_load(&mut self, part: &str) -> String {
            let needle = part.to_string();
            let message = self.wait_for_message(Duration::from_secs(1), |message| {
                matches!(
                    message,
                    Message::Playback(PlaybackMessage::LoadTrack { url, .. }) if url.contains(&needle)
                )
            });
            match message {
                Message::Playback(PlaybackMessage::LoadTrack { url, .. }) => url,
                _ => unreachable!(),
            }
        }

        fn drain(&mut self) {
            loop {
                match self.receiver.try_recv() {
                    Ok(_) => {}
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Lagged(_)) => continue,
                    Err(TryRecvError::Closed) => break,
                }
            }
        }
    }

    fn track(key: &str, container: &str) -> QueuedTrack {
        QueuedTrack {
            key: key.to_string(),
            title: format!("Track {key}"),
            artist: None,
            album: None,
            thumb: None,
            duration_ms: Some(5_000),
            playback_url: None,
            media: vec![MediaPartRef {
                part_key: format!("/library/parts/{key}/file.{container}"),
                container: container.to_string(),
                size_bytes: 1_000,
            }],
        }
    }

    fn is_load(message: &Message) -> bool {
        matches!(message, Message::Playback(PlaybackMessage::LoadTrack { .. }))
    }

    #[test]
    fn test_set_queue_loads_and_plays_first_track() {
        let mut harness = NowPlayingHarness::new();
        harness.send(Message::Queue(QueueMessage::SetQueue {
            tracks: vec![track("t1", "flac"), track("t2", "flac")],
            start_index: 0,
        }));
        let url = harness.wait_for_load("/library/parts/t1/");
        assert!(url.contains("X-Plex-Token=tok"));
        harness.wait_for_message(Duration::from_secs(1), |message| {
            matches!(message, Message::Playback(PlaybackMessage::Play))
        });
    }

    #[test]
    fn test_natural_end_advances_then_stops_at_queue_end() {
        let mut harness = NowPlayingHarness::new();
        harness.send(Message::Queue(QueueMessage::SetQueue {
            tracks: vec![track("t1", "flac"), track("t2", "flac")],
            start_index: 0,
        }));
        harness.wait_for_load("/library/parts/t1/");

        // T1 plays, then ends naturally.
        harness.send(Message::Playback(PlaybackMessage::StateChanged(
            NowPlayingHarness::playing_state(4.9, 5.0),
        )));
        harness.send(Message::Playback(PlaybackMessage::StateChanged(
            NowPlayingHarness::finished_state(5.0),
        )));
        harness.wait_for_load("/library/parts/t2/");

        // T2 plays, then ends; nothing further to load.
        harness.send(Message::Playback(PlaybackMessage::StateChanged(
            NowPlayingHarness::playing_state(4.9, 5.0),
        )));
        harness.drain();
        harness.send(Message::Playback(PlaybackMessage::StateChanged(
            NowPlayingHarness::finished_state(5.0),
        )));
        harness.assert_no_message(Duration::from_millis(300), is_load);
    }

    #[test]
    fn test_unplayable_track_is_skipped_not_transcoded() {
        let mut harness = NowPlayingHarness::new();
        harness.send(Message::Queue(QueueMessage::SetQueue {
            tracks: vec![
                track("t1", "flac"),
                track("bad", "wma"),
                track("t3", "flac"),
            ],
            start_index: 0,
        }));
        harness.wait_for_load("/library/parts/t1/");

        harness.send(Message::Playback(PlaybackMessage::StateChanged(
            NowPlayingHarness::playing_state(4.9, 5.0),
        )));
        harness.send(Message::Playback(PlaybackMessage::StateChanged(
            NowPlayingHarness::finished_state(5.0),
        )));

        // The windows-media track is passed over entirely; no load of any
        // kind (direct or transcoded) is ever requested for it.
        let mut loads = Vec::new();
        let start = Instant::now();
        while !loads.iter().any(|url: &String| url.contains("/library/parts/t3/")) {
            if start.elapsed() > Duration::from_secs(1) {
                panic!("timed out waiting for the queue to reach t3");
            }
            let message = harness.wait_for_message(Duration::from_secs(1), is_load);
            if let Message::Playback(PlaybackMessage::LoadTrack { url, .. }) = message {
                loads.push(url);
            }
        }
        assert!(loads
            .iter()
            .all(|url| !url.contains("bad") && !url.contains("transcode")));
    }

    #[test]
    fn test_error_retries_with_transcode_then_skips() {
        let mut harness = NowPlayingHarness::new();
        harness.send(Message::Queue(QueueMessage::SetQueue {
            tracks: vec![track("t1", "flac"), track("t2", "flac")],
            start_index: 0,
        }));
        harness.wait_for_load("/library/parts/t1/");

        harness.send(Message::Playback(PlaybackMessage::StateChanged(
            NowPlayingHarness::errored_state("decode failed"),
        )));
        let url = harness.wait_for_load("transcode");
        assert!(url.contains("path=%2Flibrary%2Fmetadata%2Ft1"));

        // Past the cooldown, a second distinct error skips to the next track.
        thread::sleep(Duration::from_millis(600));
        harness.send(Message::Playback(PlaybackMessage::StateChanged(
            NowPlayingHarness::errored_state("transcode also failed"),
        )));
        harness.wait_for_load("/library/parts/t2/");
    }

    #[test]
    fn test_error_recovery_is_rate_limited() {
        let mut harness = NowPlayingHarness::new();
        harness.send(Message::Queue(QueueMessage::SetQueue {
            tracks: vec![track("t1", "flac"), track("t2", "flac")],
            start_index: 0,
        }));
        harness.wait_for_load("/library/parts/t1/");

        harness.send(Message::Playback(PlaybackMessage::StateChanged(
            NowPlayingHarness::errored_state("failure one"),
        )));
        harness.wait_for_load("transcode");
        harness.drain();

        // A different error right behind the first lands inside the cooldown
        // window and must be ignored.
        harness.send(Message::Playback(PlaybackMessage::StateChanged(
            NowPlayingHarness::errored_state("failure two"),
        )));
        harness.assert_no_message(Duration::from_millis(250), is_load);
    }

    #[test]
    fn test_successful_playback_rearms_transcode_retry() {
        let mut harness = NowPlayingHarness::new();
        harness.send(Message::Queue(QueueMessage::SetQueue {
            tracks: vec![track("t1", "flac")],
            start_index: 0,
        }));
        harness.wait_for_load("/library/parts/t1/");

        harness.send(Message::Playback(PlaybackMessage::StateChanged(
            NowPlayingHarness::errored_state("first failure"),
        )));
        harness.wait_for_load("transcode");

        // Transcoded playback succeeds, which resets the retry flag.
        harness.send(Message::Playback(PlaybackMessage::StateChanged(
            NowPlayingHarness::playing_state(1.0, 5.0),
        )));
        thread::sleep(Duration::from_millis(600));
        harness.drain();
        harness.send(Message::Playback(PlaybackMessage::StateChanged(
            NowPlayingHarness::errored_state("second failure"),
        )));
        harness.wait_for_load("transcode");
    }

    #[test]
    fn test_previous_restarts_after_grace_threshold() {
        let mut harness = NowPlayingHarness::new();
        harness.send(Message::Queue(QueueMessage::SetQueue {
            tracks: vec![track("t1", "flac"), track("t2", "flac")],
            start_index: 1,
        }));
        harness.wait_for_load("/library/parts/t2/");

        harness.send(Message::Playback(PlaybackMessage::StateChanged(
            NowPlayingHarness::playing_state(5.0, 30.0),
        )));
        harness.drain();
        harness.send(Message::Playback(PlaybackMessage::Previous));
        harness.wait_for_message(Duration::from_secs(1), |message| {
            matches!(message, Message::Playback(PlaybackMessage::Seek(position)) if *position == 0.0)
        });
        harness.assert_no_message(Duration::from_millis(200), is_load);
    }

    #[test]
    fn test_previous_moves_back_early_in_track() {
        let mut harness = NowPlayingHarness::new();
        harness.send(Message::Queue(QueueMessage::SetQueue {
            tracks: vec![track("t1", "flac"), track("t2", "flac")],
            start_index: 1,
        }));
        harness.wait_for_load("/library/parts/t2/");

        harness.send(Message::Playback(PlaybackMessage::StateChanged(
            NowPlayingHarness::playing_state(1.5, 30.0),
        )));
        harness.send(Message::Playback(PlaybackMessage::Previous));
        harness.wait_for_load("/library/parts/t1/");
    }

    #[test]
    fn test_previous_at_queue_head_restarts_even_when_early() {
        let mut harness = NowPlayingHarness::new();
        harness.send(Message::Queue(QueueMessage::SetQueue {
            tracks: vec![track("t1", "flac"), track("t2", "flac")],
            start_index: 0,
        }));
        harness.wait_for_load("/library/parts/t1/");

        harness.send(Message::Playback(PlaybackMessage::StateChanged(
            NowPlayingHarness::playing_state(1.5, 30.0),
        )));
        harness.drain();
        harness.send(Message::Playback(PlaybackMessage::Previous));
        harness.wait_for_message(Duration::from_secs(1), |message| {
            matches!(message, Message::Playback(PlaybackMessage::Seek(position)) if *position == 0.0)
        });
        harness.assert_no_message(Duration::from_millis(200), is_load);
    }

    #[test]
    fn test_next_pauses_before_advancing() {
        let mut harness = NowPlayingHarness::new();
        harness.send(Message::Queue(QueueMessage::SetQueue {
            tracks: vec![track("t1", "flac"), track("t2", "flac")],
            start_index: 0,
        }));
        harness.wait_for_load("/library/parts/t1/");
        harness.drain();

        harness.send(Message::Playback(PlaybackMessage::Next));
        harness.wait_for_message(Duration::from_secs(1), |message| {
            matches!(message, Message::Playback(PlaybackMessage::Pause))
        });
        harness.wait_for_load("/library/parts/t2/");
    }

    #[test]
    fn test_queue_mutations_broadcast_snapshots() {
        let mut harness = NowPlayingHarness::new();
        harness.send(Message::Queue(QueueMessage::SetQueue {
            tracks: vec![track("t1", "flac")],
            start_index: 0,
        }));
        harness.wait_for_message(Duration::from_secs(1), |message| {
            matches!(
                message,
                Message::Queue(QueueMessage::QueueChanged { len: 1, .. })
            )
        });

        harness.send(Message::Queue(QueueMessage::AddToQueue(track("t2", "flac"))));
        harness.wait_for_message(Duration::from_secs(1), |message| {
            matches!(
                message,
                Message::Queue(QueueMessage::QueueChanged { len: 2, .. })
            )
        });

        harness.send(Message::Queue(QueueMessage::ClearQueue));
        harness.wait_for_message(Duration::from_secs(1), |message| {
            matches!(
                message,
                Message::Queue(QueueMessage::QueueChanged { len: 0, .. })
            )
        });
    }
}
