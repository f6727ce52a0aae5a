use chrono::DateTime;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::app_dirs::AppDirs;
use crate::model::{ActiveSession, ExerciseEntry, Session};
use crate::session::{SessionChange, SessionObserver};

/// Storage key of the active workout. One per device.
pub const SNAPSHOT_KEY: &str = "activeWorkout";

/// Serialized form of a [`Session`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub active: bool,
    /// Epoch milliseconds.
    pub started_at: Option<i64>,
    #[serde(default)]
    pub entries: Vec<ExerciseEntry>,
}

impl From<&Session> for Snapshot {
    fn from(session: &Session) -> Self {
        Self {
            active: session.is_active(),
            started_at: session.started_at().map(|t| t.timestamp_millis()),
            entries: session.entries().to_vec(),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum SnapshotError {
    #[error("active snapshot has no start time")]
    MissingStartedAt,
    #[error("inactive snapshot still carries workout data")]
    InactiveWithData,
    #[error("start time {0} is out of range")]
    InvalidTimestamp(i64),
    #[error("exercise with empty id")]
    EmptyExerciseId,
    #[error("exercise '{0}' appears more than once")]
    DuplicateExercise(String),
    #[error("exercise '{0}' has no sets")]
    EmptyExercise(String),
    #[error("exercise '{exercise_id}' has invalid weight {weight}")]
    InvalidWeight { exercise_id: String, weight: f64 },
}

impl TryFrom<Snapshot> for Session {
    type Error = SnapshotError;

    fn try_from(snapshot: Snapshot) -> Result<Self, Self::Error> {
        if !snapshot.active {
            if snapshot.started_at.is_some() || !snapshot.entries.is_empty() {
                return Err(SnapshotError::InactiveWithData);
            }
            return Ok(Session::Inactive);
        }

        let millis = snapshot.started_at.ok_or(SnapshotError::MissingStartedAt)?;
        let started_at =
            DateTime::from_timestamp_millis(millis).ok_or(SnapshotError::InvalidTimestamp(millis))?;

        let mut seen = HashSet::new();
        for entry in &snapshot.entries {
            if entry.exercise_id.is_empty() {
                return Err(SnapshotError::EmptyExerciseId);
            }
            if !seen.insert(entry.exercise_id.as_str()) {
                return Err(SnapshotError::DuplicateExercise(entry.exercise_id.clone()));
            }
            if entry.sets.is_empty() {
                return Err(SnapshotError::EmptyExercise(entry.exercise_id.clone()));
            }
            if let Some(bad) = entry.sets.iter().find(|set| !set.is_valid()) {
                return Err(SnapshotError::InvalidWeight {
                    exercise_id: entry.exercise_id.clone(),
                    weight: bad.weight,
                });
            }
        }

        Ok(Session::Active(ActiveSession::restore(
            started_at,
            snapshot.entries,
        )))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("snapshot io error: {0}")]
    Io(#[from] io::Error),
    #[error("snapshot encoding error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("snapshot storage unavailable")]
    Unavailable,
}

/// Durable home of the workout snapshot.
pub trait PersistenceAdapter {
    fn load(&self) -> Result<Option<Snapshot>, PersistenceError>;
    fn save(&self, snapshot: &Snapshot) -> Result<(), PersistenceError>;
    /// Remove the snapshot entirely. Clearing an absent snapshot succeeds.
    fn clear(&self) -> Result<(), PersistenceError>;
}

/// Snapshot kept as a JSON file, `activeWorkout.json` in the state directory.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    path: PathBuf,
}

impl FileSnapshotStore {
    pub fn in_dir<P: AsRef<Path>>(dir: P) -> Self {
        Self::with_path(AppDirs::snapshot_path(dir.as_ref()))
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PersistenceAdapter for FileSnapshotStore {
    fn load(&self) -> Result<Option<Snapshot>, PersistenceError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    fn save(&self, snapshot: &Snapshot) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec(snapshot)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, data)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), PersistenceError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// In-memory key/value store. Clones share contents, so a test can inspect
/// what the tracker wrote, plant raw data, or make writes fail.
#[derive(Debug, Clone, Default)]
pub struct MemorySnapshotStore {
    slots: Arc<Mutex<HashMap<String, String>>>,
    fail_writes: Arc<AtomicBool>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_raw(&self, raw: &str) {
        if let Ok(mut slots) = self.slots.lock() {
            slots.insert(SNAPSHOT_KEY.to_string(), raw.to_string());
        }
    }

    pub fn raw(&self) -> Option<String> {
        self.slots.lock().ok()?.get(SNAPSHOT_KEY).cloned()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn writable(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, PersistenceError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(PersistenceError::Unavailable);
        }
        self.slots.lock().map_err(|_| PersistenceError::Unavailable)
    }
}

impl PersistenceAdapter for MemorySnapshotStore {
    fn load(&self) -> Result<Option<Snapshot>, PersistenceError> {
        match self.raw() {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    fn save(&self, snapshot: &Snapshot) -> Result<(), PersistenceError> {
        let raw = serde_json::to_string(snapshot)?;
        self.writable()?.insert(SNAPSHOT_KEY.to_string(), raw);
        Ok(())
    }

    fn clear(&self) -> Result<(), PersistenceError> {
        self.writable()?.remove(SNAPSHOT_KEY);
        Ok(())
    }
}

/// Mirrors the session into a [`PersistenceAdapter`]: finishing clears the
/// snapshot, every other change rewrites it in full. Failures are logged and
/// the in-memory session stays as it is.
#[derive(Debug)]
pub struct PersistenceListener<P: PersistenceAdapter> {
    adapter: P,
}

impl<P: PersistenceAdapter> PersistenceListener<P> {
    pub fn new(adapter: P) -> Self {
        Self { adapter }
    }
}

impl<P: PersistenceAdapter> SessionObserver for PersistenceListener<P> {
    fn on_change(&mut self, change: &SessionChange, session: &Session) {
        let result = match change {
            SessionChange::Finished(_) => self.adapter.clear(),
            _ => self.adapter.save(&Snapshot::from(session)),
        };
        match result {
            Ok(()) => debug!(?change, "workout snapshot updated"),
            Err(err) => warn!(error = %err, "failed to persist workout snapshot"),
        }
    }
}
