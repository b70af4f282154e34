//! Playback queue state: order, shuffle, repeat, and history.

use std::collections::VecDeque;

use rand::{rngs::StdRng, RngExt, SeedableRng};

use crate::protocol::{QueuedTrack, RepeatMode};

/// History keeps the most recent track keys, newest first.
const HISTORY_CAP: usize = 50;

/// Ordered collection of queued tracks with a current-position pointer.
///
/// The pointer indexes the active sequence: the shuffled permutation while
/// shuffle is on, the base order otherwise. Toggling shuffle relocates the
/// current track inside the new permutation so the sounding track stays
/// current.
pub struct PlayQueue {
    tracks: Vec<QueuedTrack>,
    shuffled_indices: Vec<usize>,
    current: Option<usize>,
    history: VecDeque<String>,
    shuffle: bool,
    repeat: RepeatMode,
    // Use StdRng instead of ThreadRng for thread safety
    rng_seed: [u8; 32],
}

impl PlayQueue {
    pub fn new() -> PlayQueue {
        // Generate a random seed
        let mut seed = [0u8; 32];
        getrandom::fill(&mut seed).expect("Failed to generate random seed");

        PlayQueue {
            tracks: Vec::new(),
            shuffled_indices: Vec::new(),
            current: None,
            history: VecDeque::new(),
            shuffle: false,
            repeat: RepeatMode::Off,
            rng_seed: seed,
        }
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn is_shuffled(&self) -> bool {
        self.shuffle
    }

    pub fn repeat_mode(&self) -> RepeatMode {
        self.repeat
    }

    pub fn set_repeat_mode(&mut self, mode: RepeatMode) {
        self.repeat = mode;
    }

    /// Base-order view of the queued tracks.
    pub fn tracks(&self) -> &[QueuedTrack] {
        &self.tracks
    }

    /// Current position in the active sequence.
    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    /// Base-sequence index of the current track.
    pub fn current_base_index(&self) -> Option<usize> {
        let position = self.current?;
        if self.shuffle {
            self.shuffled_indices.get(position).copied()
        } else {
            Some(position)
        }
    }

    pub fn current_track(&self) -> Option<&QueuedTrack> {
        self.tracks.get(self.current_base_index()?)
    }

    /// Most-recent-first keys of previously current tracks.
    pub fn history(&self) -> &VecDeque<String> {
        &self.history
    }

    /// Replaces the queue wholesale and points at `start_index` (clamped).
    pub fn set_queue(&mut self, tracks: Vec<QueuedTrack>, start_index: usize) {
        self.tracks = tracks;
        self.history.clear();
        if self.tracks.is_empty() {
            self.shuffled_indices.clear();
            self.current = None;
            return;
        }
        let start = start_index.min(self.tracks.len() - 1);
        if self.shuffle {
            self.generate_shuffle_order();
            self.current = self.shuffled_position_of(start);
        } else {
            self.current = Some(start);
        }
    }

    /// Empties the queue; shuffle and repeat modes are left alone.
    pub fn clear(&mut self) {
        self.tracks.clear();
        self.shuffled_indices.clear();
        self.history.clear();
        self.current = None;
    }

    /// Appends to the end of the base sequence.
    pub fn add_to_queue(&mut self, track: QueuedTrack) {
        self.tracks.push(track);
        if self.shuffle {
            let current_base = self.current_base_index();
            self.generate_shuffle_order();
            self.current = current_base.and_then(|base| self.shuffled_position_of(base));
        }
    }

    /// Inserts right after the current track in the base sequence, and right
    /// after the current position in the shuffled sequence when shuffle is on.
    pub fn add_next_in_queue(&mut self, track: QueuedTrack) {
        let insert_at = match self.current_base_index() {
            Some(base) => base + 1,
            None => self.tracks.len(),
        };
        self.tracks.insert(insert_at, track);

        if self.shuffle {
            for index in self.shuffled_indices.iter_mut() {
                if *index >= insert_at {
                    *index += 1;
                }
            }
            let shuffled_insert_at = match self.current {
                Some(position) => position + 1,
                None => self.shuffled_indices.len(),
            };
            self.shuffled_indices.insert(shuffled_insert_at, insert_at);
        }
    }

    /// Removes the track at `index` in the base sequence.
    pub fn remove_from_queue(&mut self, index: usize) {
        if index >= self.tracks.len() {
            return;
        }
        let current_base = self.current_base_index();
        self.tracks.remove(index);

        if self.tracks.is_empty() {
            self.shuffled_indices.clear();
            self.current = None;
            return;
        }

        let next_base = current_base.map(|base| {
            if index < base {
                base - 1
            } else {
                base.min(self.tracks.len() - 1)
            }
        });

        if self.shuffle {
            self.generate_shuffle_order();
            self.current = next_base.and_then(|base| self.shuffled_position_of(base));
        } else {
            self.current = next_base;
        }
    }

    /// Advances per the repeat rules and returns the newly current track.
    ///
    /// Returns `None` only when no forward movement is legal (end of queue
    /// with repeat off). Repeat-track returns the same track without touching
    /// the pointer or the history.
    pub fn play_next(&mut self) -> Option<&QueuedTrack> {
        if self.tracks.is_empty() {
            return None;
        }
        let position = match self.current {
            Some(position) => position,
            None => {
                self.current = Some(0);
                return self.current_track();
            }
        };
        let next = self.next_position_from(position)?;
        self.move_current_to(next);
        self.current_track()
    }

    /// Steps backward and returns the newly current track, or `None` when no
    /// backward movement is legal.
    pub fn play_previous(&mut self) -> Option<&QueuedTrack> {
        if self.tracks.is_empty() {
            return None;
        }
        let position = self.current?;
        let previous = self.previous_position_from(position)?;
        self.move_current_to(previous);
        self.current_track()
    }

    /// Jumps to a base-sequence index with history-push semantics.
    /// Out-of-range indices change nothing and return `None`.
    pub fn play_track_at_index(&mut self, index: usize) -> Option<&QueuedTrack> {
        if index >= self.tracks.len() {
            return None;
        }
        let target = if self.shuffle {
            self.shuffled_position_of(index)?
        } else {
            index
        };
        self.move_current_to(target);
        self.current_track()
    }

    /// Flips shuffle. Turning it on recomputes the permutation from the base
    /// sequence; either direction relocates the current track so it stays
    /// current.
    pub fn toggle_shuffle(&mut self) -> bool {
        self.shuffle = !self.shuffle;
        if self.shuffle {
            let current_base = self.current;
            self.generate_shuffle_order();
            self.current = current_base.and_then(|base| self.shuffled_position_of(base));
        } else {
            self.current = self
                .current
                .and_then(|position| self.shuffled_indices.get(position).copied());
            self.shuffled_indices.clear();
        }
        self.shuffle
    }

    /// Off -> Playlist -> Track -> Off.
    pub fn cycle_repeat(&mut self) -> RepeatMode {
        self.repeat = self.repeat.cycled();
        self.repeat
    }

    pub fn has_next(&self) -> bool {
        match self.current {
            Some(position) => self.next_position_from(position).is_some(),
            None => !self.tracks.is_empty(),
        }
    }

    pub fn has_previous(&self) -> bool {
        match self.current {
            Some(position) => self.previous_position_from(position).is_some(),
            None => false,
        }
    }

    /// The track `play_next` would land on, without mutating anything.
    pub fn next_track(&self) -> Option<&QueuedTrack> {
        let position = match self.current {
            Some(position) => self.next_position_from(position)?,
            None => 0,
        };
        self.tracks.get(self.base_index_at(position)?)
    }

    /// The track `play_previous` would land on, without mutating anything.
    pub fn previous_track(&self) -> Option<&QueuedTrack> {
        let position = self.previous_position_from(self.current?)?;
        self.tracks.get(self.base_index_at(position)?)
    }

    fn base_index_at(&self, position: usize) -> Option<usize> {
        if self.shuffle {
            self.shuffled_indices.get(position).copied()
        } else if position < self.tracks.len() {
            Some(position)
        } else {
            None
        }
    }

    fn shuffled_position_of(&self, base_index: usize) -> Option<usize> {
        self.shuffled_indices
            .iter()
            .position(|&index| index == base_index)
    }

    fn next_position_from(&self, position: usize) -> Option<usize> {
        match self.repeat {
            RepeatMode::Track => Some(position),
            _ => {
                if position + 1 < self.tracks.len() {
                    Some(position + 1)
                } else if self.repeat == RepeatMode::Playlist {
                    Some(0)
                } else {
                    None
                }
            }
        }
    }

    fn previous_position_from(&self, position: usize) -> Option<usize> {
        if position > 0 {
            Some(position - 1)
        } else if self.repeat == RepeatMode::Playlist {
            Some(self.tracks.len() - 1)
        } else {
            None
        }
    }

    /// Moves the pointer, pushing the departed track onto the history when the
    /// position actually changes.
    fn move_current_to(&mut self, position: usize) {
        if self.current == Some(position) {
            return;
        }
        let departed_key = self.current_track().map(|track| track.key.clone());
        if let Some(key) = departed_key {
            self.history.push_front(key);
            self.history.truncate(HISTORY_CAP);
        }
        self.current = Some(position);
    }

    // Generate a random order for all tracks
    fn generate_shuffle_order(&mut self) {
        let track_count = self.tracks.len();
        let mut indices: Vec<usize> = (0..track_count).collect();

        // Create a new RNG with our seed
        let mut rng = StdRng::from_seed(self.rng_seed);

        // Fisher-Yates
        for i in (1..track_count).rev() {
            let j = rng.random_range(0..=i);
            indices.swap(i, j);
        }

        // Update the seed for next time
        let mut new_seed = [0u8; 32];
        for (i, val) in new_seed.iter_mut().enumerate() {
            *val = self.rng_seed[i].wrapping_add(1);
        }
        self.rng_seed = new_seed;

        self.shuffled_indices = indices;
    }
}

impl Default for PlayQueue {
    fn default() -> Self {
        Self::new()
    }
}
