//! Versioned, windowed persistence for the playback queue.
//!
//! Large queues are persisted as a bounded window around the current track so
//! the snapshot stays small; restoring such a snapshot is a degraded resume,
//! not full continuity. Corrupt or unknown-version snapshots are discarded
//! rather than surfaced as errors.

use log::{debug, warn};
use serde_json::Value;

use crate::config::QueueConfig;
use crate::db_manager::DbManager;
use crate::protocol::{QueuedTrack, RepeatMode};
use crate::queue::PlayQueue;

const SNAPSHOT_KEY: &str = "play_queue";
const SNAPSHOT_VERSION: u32 = 2;

/// Persisted queue snapshot. `tracks` may be a window of a larger queue;
/// `original_len`/`original_index` record the full-queue shape for
/// bookkeeping.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct QueueSnapshot {
    pub version: u32,
    pub tracks: Vec<QueuedTrack>,
    /// Window-relative index of the current track.
    pub current_index: Option<usize>,
    pub shuffle: bool,
    pub repeat: RepeatMode,
    pub original_len: usize,
    pub original_index: Option<usize>,
}

/// Migrations keyed by the version they upgrade FROM. Each returns the
/// payload at version + 1, or `None` when the payload cannot be carried over.
type Migration = fn(Value) -> Option<Value>;

const MIGRATIONS: &[(u32, Migration)] = &[(1, migrate_v1_to_v2)];

/// v1 stored `repeat` as a bool (off / repeat-all) before repeat-track
/// existed.
fn migrate_v1_to_v2(mut payload: Value) -> Option<Value> {
    let object = payload.as_object_mut()?;
    let repeat = match object.get("repeat") {
        Some(Value::Bool(true)) => Value::String("Playlist".to_string()),
        Some(Value::Bool(false)) | None => Value::String("Off".to_string()),
        Some(other) => other.clone(),
    };
    object.insert("repeat".to_string(), repeat);
    object.insert("version".to_string(), Value::from(2));
    Some(payload)
}

/// Builds the (possibly windowed) snapshot for the queue's current state.
pub fn snapshot_queue(queue: &PlayQueue, config: &QueueConfig) -> QueueSnapshot {
    let tracks = queue.tracks();
    let current = queue.current_base_index();

    if tracks.len() <= config.persist_threshold {
        return QueueSnapshot {
            version: SNAPSHOT_VERSION,
            tracks: tracks.to_vec(),
            current_index: current,
            shuffle: queue.is_shuffled(),
            repeat: queue.repeat_mode(),
            original_len: tracks.len(),
            original_index: current,
        };
    }

    let center = current.unwrap_or(0);
    let window_start = center.saturating_sub(config.persist_window);
    let window_end = (center + config.persist_window + 1).min(tracks.len());

    QueueSnapshot {
        version: SNAPSHOT_VERSION,
        tracks: tracks[window_start..window_end].to_vec(),
        current_index: current.map(|index| index - window_start),
        shuffle: queue.is_shuffled(),
        repeat: queue.repeat_mode(),
        original_len: tracks.len(),
        original_index: current,
    }
}

/// Persists the queue snapshot; failures are logged, never propagated.
pub fn save_queue(db: &DbManager, queue: &PlayQueue, config: &QueueConfig) {
    let snapshot = snapshot_queue(queue, config);
    let payload = match serde_json::to_string(&snapshot) {
        Ok(payload) => payload,
        Err(err) => {
            warn!("Failed to serialize queue snapshot: {}", err);
            return;
        }
    };
    if let Err(err) = db.put_snapshot(SNAPSHOT_KEY, &payload) {
        warn!("Failed to persist queue snapshot: {}", err);
    }
}

/// Loads and migrates the stored snapshot. Corruption, version mismatch, or a
/// failed migration all discard the stored value and return `None`.
pub fn load_queue_snapshot(db: &DbManager) -> Option<QueueSnapshot> {
    let payload = match db.get_snapshot(SNAPSHOT_KEY) {
        Ok(Some(payload)) => payload,
        Ok(None) => return None,
        Err(err) => {
            warn!("Failed to read queue snapshot: {}", err);
            return None;
        }
    };

    let mut value: Value = match serde_json::from_str(&payload) {
        Ok(value) => value,
        Err(err) => {
            warn!("Discarding corrupt queue snapshot: {}", err);
            discard(db);
            return None;
        }
    };

    loop {
        let version = match value.get("version").and_then(Value::as_u64) {
            Some(version) => version as u32,
            None => {
                warn!("Discarding queue snapshot without a version field");
                discard(db);
                return None;
            }
        };
        if version == SNAPSHOT_VERSION {
            break;
        }
        let migration = MIGRATIONS
            .iter()
            .find(|(from, _)| *from == version)
            .map(|(_, migration)| migration);
        match migration {
            Some(migration) => match migration(value) {
                Some(migrated) => {
                    debug!("Migrated queue snapshot from version {}", version);
                    value = migrated;
                }
                None => {
                    warn!("Queue snapshot migration from version {} failed", version);
                    discard(db);
                    return None;
                }
            },
            None => {
                // Unknown (likely future) version: reinitialize instead of
                // guessing at the shape.
                warn!("Discarding queue snapshot with unknown version {}", version);
                discard(db);
                return None;
            }
        }
    }

    match serde_json::from_value::<QueueSnapshot>(value) {
        Ok(snapshot) => Some(snapshot),
        Err(err) => {
            warn!("Discarding malformed queue snapshot: {}", err);
            discard(db);
            None
        }
    }
}

/// Rebuilds a queue from a restored snapshot.
pub fn queue_from_snapshot(snapshot: QueueSnapshot) -> PlayQueue {
    let mut queue = PlayQueue::new();
    let start_index = snapshot.current_index.unwrap_or(0);
    queue.set_queue(snapshot.tracks, start_index);
    queue.set_repeat_mode(snapshot.repeat);
    if snapshot.shuffle {
        queue.toggle_shuffle();
    }
    queue
}

pub fn clear_saved_queue(db: &DbManager) {
    discard(db);
}

fn discard(db: &DbManager) {
    if let Err(err) = db.delete_snapshot(SNAPSHOT_KEY) {
        warn!("Failed to discard queue snapshot: {}", err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(key: &str) -> QueuedTrack {
        QueuedTrack {
            key: key.to_string(),
            title: format!("Track {key}"),
            artist: None,
            album: None,
            thumb: None,
            duration_ms: None,
            playback_url: None,
            media: Vec::new(),
        }
    }

    fn queue_of(count: usize) -> PlayQueue {
        let mut queue = PlayQueue::new();
        queue.set_queue((0..count).map(|i| track(&i.to_string())).collect(), 0);
        queue
    }

    #[test]
    fn test_small_queue_round_trips_in_full() {
        let db = DbManager::new_in_memory().expect("in-memory db");
        let mut queue = queue_of(5);
        queue.play_track_at_index(3);
        queue.set_repeat_mode(RepeatMode::Playlist);

        save_queue(&db, &queue, &QueueConfig::default());
        let snapshot = load_queue_snapshot(&db).expect("snapshot should load");
        assert_eq!(snapshot.tracks.len(), 5);
        assert_eq!(snapshot.current_index, Some(3));
        assert_eq!(snapshot.original_len, 5);
        assert_eq!(snapshot.repeat, RepeatMode::Playlist);

        let restored = queue_from_snapshot(snapshot);
        assert_eq!(restored.len(), 5);
        assert_eq!(restored.current_track().map(|t| t.key.as_str()), Some("3"));
        assert_eq!(restored.repeat_mode(), RepeatMode::Playlist);
    }

    #[test]
    fn test_large_queue_persists_a_window_around_current() {
        let db = DbManager::new_in_memory().expect("in-memory db");
        let mut queue = queue_of(500);
        queue.play_track_at_index(250);

        let config = QueueConfig::default();
        save_queue(&db, &queue, &config);
        let snapshot = load_queue_snapshot(&db).expect("snapshot should load");

        assert_eq!(snapshot.tracks.len(), 21);
        assert_eq!(snapshot.current_index, Some(10));
        assert_eq!(snapshot.original_len, 500);
        assert_eq!(snapshot.original_index, Some(250));
        assert_eq!(snapshot.tracks[10].key, "250");
        assert_eq!(snapshot.tracks.first().map(|t| t.key.as_str()), Some("240"));
        assert_eq!(snapshot.tracks.last().map(|t| t.key.as_str()), Some("260"));
    }

    #[test]
    fn test_window_is_clipped_at_queue_edges() {
        let mut queue = queue_of(200);
        queue.play_track_at_index(2);
        let snapshot = snapshot_queue(&queue, &QueueConfig::default());
        assert_eq!(snapshot.tracks.first().map(|t| t.key.as_str()), Some("0"));
        assert_eq!(snapshot.current_index, Some(2));
        assert_eq!(snapshot.tracks.len(), 13);

        queue.play_track_at_index(199);
        let snapshot = snapshot_queue(&queue, &QueueConfig::default());
        assert_eq!(snapshot.tracks.last().map(|t| t.key.as_str()), Some("199"));
        assert_eq!(snapshot.current_index, Some(10));
        assert_eq!(snapshot.tracks.len(), 11);
    }

    #[test]
    fn test_corrupt_snapshot_is_discarded() {
        let db = DbManager::new_in_memory().expect("in-memory db");
        db.put_snapshot(SNAPSHOT_KEY, "{ not json").expect("seed");
        assert!(load_queue_snapshot(&db).is_none());
        // The broken payload is gone afterwards.
        assert_eq!(db.get_snapshot(SNAPSHOT_KEY).expect("get"), None);
    }

    #[test]
    fn test_unknown_future_version_is_discarded() {
        let db = DbManager::new_in_memory().expect("in-memory db");
        db.put_snapshot(
            SNAPSHOT_KEY,
            "{\"version\":99,\"tracks\":[],\"current_index\":null}",
        )
        .expect("seed");
        assert!(load_queue_snapshot(&db).is_none());
        assert_eq!(db.get_snapshot(SNAPSHOT_KEY).expect("get"), None);
    }

    #[test]
    fn test_v1_snapshot_migrates_repeat_flag() {
        let db = DbManager::new_in_memory().expect("in-memory db");
        let v1 = serde_json::json!({
            "version": 1,
            "tracks": [track("a"), track("b")],
            "current_index": 1,
            "shuffle": false,
            "repeat": true,
            "original_len": 2,
            "original_index": 1,
        });
        db.put_snapshot(SNAPSHOT_KEY, &v1.to_string()).expect("seed");

        let snapshot = load_queue_snapshot(&db).expect("migrated snapshot");
        assert_eq!(snapshot.version, 2);
        assert_eq!(snapshot.repeat, RepeatMode::Playlist);
        assert_eq!(snapshot.current_index, Some(1));
    }

    #[test]
    fn test_restored_shuffle_snapshot_keeps_current_track() {
        let mut queue = queue_of(30);
        queue.play_track_at_index(7);
        queue.toggle_shuffle();
        let snapshot = snapshot_queue(&queue, &QueueConfig::default());
        assert!(snapshot.shuffle);

        let restored = queue_from_snapshot(snapshot);
        assert!(restored.is_shuffled());
        assert_eq!(restored.current_track().map(|t| t.key.as_str()), Some("7"));
    }
}
