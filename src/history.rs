use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Result};
use serde::Serialize;
use std::io;
use std::path::Path;
use tracing::{debug, warn};

use crate::model::{FinishedWorkout, Session, Set};
use crate::session::{format_elapsed, SessionChange, SessionObserver};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS workouts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at INTEGER NOT NULL,
    finished_at INTEGER NOT NULL,
    duration_secs INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS workout_sets (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    workout_id INTEGER NOT NULL REFERENCES workouts(id) ON DELETE CASCADE,
    exercise_id TEXT NOT NULL,
    exercise_name TEXT NOT NULL,
    set_index INTEGER NOT NULL,
    weight REAL NOT NULL,
    reps INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_workout_sets_exercise ON workout_sets(exercise_id);
CREATE INDEX IF NOT EXISTS idx_workouts_finished_at ON workouts(finished_at);
"#;

/// One line of `liftlog history`
#[derive(Debug, Clone, PartialEq)]
pub struct WorkoutSummary {
    pub id: i64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub exercise_count: i64,
    pub set_count: i64,
    pub total_volume: f64,
}

impl WorkoutSummary {
    pub fn duration_display(&self) -> String {
        format_elapsed(self.finished_at - self.started_at)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HistoryExportError {
    #[error("history query failed: {0}")]
    Db(#[from] rusqlite::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Serialize)]
struct CsvRow {
    workout_id: i64,
    started_at: String,
    exercise_id: String,
    exercise_name: String,
    set_number: i64,
    weight: f64,
    reps: u32,
}

/// SQLite log of finished workouts
#[derive(Debug)]
pub struct HistoryDb {
    conn: Connection,
}

impl HistoryDb {
    /// Open (creating if needed) the database at `path`
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CANTOPEN),
                    Some(format!("Failed to create directory: {}", e)),
                )
            })?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(HistoryDb { conn })
    }

    /// Store a finished workout with all its sets. Workouts without any
    /// exercises are not worth keeping and return `None`.
    pub fn record_workout(&mut self, workout: &FinishedWorkout) -> Result<Option<i64>> {
        if workout.entries.is_empty() {
            return Ok(None);
        }

        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO workouts (started_at, finished_at, duration_secs) VALUES (?1, ?2, ?3)",
            params![
                workout.started_at.timestamp_millis(),
                workout.finished_at.timestamp_millis(),
                workout.duration().num_seconds().max(0),
            ],
        )?;
        let workout_id = tx.last_insert_rowid();

        for entry in &workout.entries {
            for (set_index, set) in entry.sets.iter().enumerate() {
                tx.execute(
                    r#"
                    INSERT INTO workout_sets
                    (workout_id, exercise_id, exercise_name, set_index, weight, reps)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                    "#,
                    params![
                        workout_id,
                        entry.exercise_id,
                        entry.exercise_name,
                        set_index as i64,
                        set.weight,
                        set.reps,
                    ],
                )?;
            }
        }

        tx.commit()?;
        Ok(Some(workout_id))
    }

    /// Final set of the most recent workout that included the exercise
    pub fn last_performed(&self, exercise_id: &str) -> Result<Option<Set>> {
        self.conn
            .query_row(
                r#"
                SELECT s.weight, s.reps
                FROM workout_sets s
                JOIN workouts w ON w.id = s.workout_id
                WHERE s.exercise_id = ?1
                ORDER BY w.finished_at DESC, w.id DESC, s.set_index DESC
                LIMIT 1
                "#,
                [exercise_id],
                |row| Ok(Set::new(row.get(0)?, row.get(1)?)),
            )
            .optional()
    }

    /// Most recent workouts first
    pub fn recent_workouts(&self, limit: usize) -> Result<Vec<WorkoutSummary>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT
                w.id,
                w.started_at,
                w.finished_at,
                COUNT(DISTINCT s.exercise_id),
                COUNT(s.id),
                COALESCE(SUM(s.weight * s.reps), 0.0)
            FROM workouts w
            LEFT JOIN workout_sets s ON s.workout_id = w.id
            GROUP BY w.id
            ORDER BY w.finished_at DESC, w.id DESC
            LIMIT ?1
            "#,
        )?;

        let rows = stmt.query_map([limit as i64], |row| {
            Ok(WorkoutSummary {
                id: row.get(0)?,
                started_at: millis_column(row, 1)?,
                finished_at: millis_column(row, 2)?,
                exercise_count: row.get(3)?,
                set_count: row.get(4)?,
                total_volume: row.get(5)?,
            })
        })?;

        rows.collect()
    }

    pub fn workout_count(&self) -> Result<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM workouts", [], |row| row.get(0))
    }

    /// Write every recorded set as CSV, returning the number of rows
    pub fn export_csv<W: io::Write>(&self, writer: W) -> std::result::Result<usize, HistoryExportError> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT w.id, w.started_at, s.exercise_id, s.exercise_name, s.set_index, s.weight, s.reps
            FROM workout_sets s
            JOIN workouts w ON w.id = s.workout_id
            ORDER BY w.finished_at, w.id, s.id
            "#,
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(CsvRow {
                    workout_id: row.get(0)?,
                    started_at: millis_column(row, 1)?.to_rfc3339(),
                    exercise_id: row.get(2)?,
                    exercise_name: row.get(3)?,
                    set_number: row.get::<_, i64>(4)? + 1,
                    weight: row.get(5)?,
                    reps: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>>>()?;

        let mut wtr = csv::Writer::from_writer(writer);
        for row in &rows {
            wtr.serialize(row)?;
        }
        wtr.flush()?;
        Ok(rows.len())
    }
}

fn millis_column(row: &rusqlite::Row<'_>, idx: usize) -> Result<DateTime<Utc>> {
    let millis: i64 = row.get(idx)?;
    DateTime::from_timestamp_millis(millis)
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, millis))
}

/// Records each finished workout into a [`HistoryDb`]
#[derive(Debug)]
pub struct HistoryListener {
    db: HistoryDb,
}

impl HistoryListener {
    pub fn new(db: HistoryDb) -> Self {
        Self { db }
    }
}

impl SessionObserver for HistoryListener {
    fn on_change(&mut self, change: &SessionChange, _session: &Session) {
        let SessionChange::Finished(Some(workout)) = change else {
            return;
        };
        match self.db.record_workout(workout) {
            Ok(Some(id)) => debug!(workout_id = id, "recorded finished workout"),
            Ok(None) => debug!("finished workout was empty, not recorded"),
            Err(err) => warn!(error = %err, "failed to record workout history"),
        }
    }
}
