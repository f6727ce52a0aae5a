use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// One performed effort: a weight lifted for a number of repetitions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Set {
    pub weight: f64,
    pub reps: u32,
}

impl Set {
    pub fn new(weight: f64, reps: u32) -> Self {
        Self { weight, reps }
    }

    pub fn is_valid(&self) -> bool {
        self.weight.is_finite() && self.weight >= 0.0
    }

    /// Overwrite one field. Negative or non-finite values are rejected and
    /// leave the set untouched. Fractional reps truncate toward zero.
    pub fn apply(&mut self, field: SetField, value: f64) -> bool {
        if !value.is_finite() || value < 0.0 {
            return false;
        }
        match field {
            SetField::Weight => self.weight = value,
            SetField::Reps => self.reps = value as u32,
        }
        true
    }

    pub fn volume(&self) -> f64 {
        self.weight * f64::from(self.reps)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum SetField {
    Weight,
    Reps,
}

#[derive(Debug, thiserror::Error)]
#[error("unknown set field '{0}' (expected 'weight' or 'reps')")]
pub struct ParseSetFieldError(String);

impl FromStr for SetField {
    type Err = ParseSetFieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "weight" => Ok(SetField::Weight),
            "reps" => Ok(SetField::Reps),
            _ => Err(ParseSetFieldError(s.to_string())),
        }
    }
}

/// One exercise performed during the active workout, with its sets in the
/// order they were performed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseEntry {
    pub exercise_id: String,
    pub exercise_name: String,
    pub sets: Vec<Set>,
}

impl ExerciseEntry {
    pub fn new(exercise_id: &str, exercise_name: &str, first_set: Set) -> Self {
        Self {
            exercise_id: exercise_id.to_string(),
            exercise_name: exercise_name.to_string(),
            sets: vec![first_set],
        }
    }
}

/// The workout currently being recorded.
///
/// An inactive session carries no start time and no entries, so those
/// combinations cannot be represented.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Session {
    #[default]
    Inactive,
    Active(ActiveSession),
}

impl Session {
    pub fn is_active(&self) -> bool {
        matches!(self, Session::Active(_))
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Session::Active(active) => Some(active.started_at),
            Session::Inactive => None,
        }
    }

    pub fn entries(&self) -> &[ExerciseEntry] {
        match self {
            Session::Active(active) => &active.entries,
            Session::Inactive => &[],
        }
    }

    pub fn entry(&self, exercise_id: &str) -> Option<&ExerciseEntry> {
        self.entries().iter().find(|e| e.exercise_id == exercise_id)
    }

    pub(crate) fn active_mut(&mut self) -> Option<&mut ActiveSession> {
        match self {
            Session::Active(active) => Some(active),
            Session::Inactive => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActiveSession {
    started_at: DateTime<Utc>,
    pub(crate) entries: Vec<ExerciseEntry>,
}

impl ActiveSession {
    pub(crate) fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            entries: Vec::new(),
        }
    }

    /// Caller must have checked the entry invariants.
    pub(crate) fn restore(started_at: DateTime<Utc>, entries: Vec<ExerciseEntry>) -> Self {
        Self {
            started_at,
            entries,
        }
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn entries(&self) -> &[ExerciseEntry] {
        &self.entries
    }

    pub(crate) fn position(&self, exercise_id: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.exercise_id == exercise_id)
    }

    pub(crate) fn entry_mut(&mut self, exercise_id: &str) -> Option<&mut ExerciseEntry> {
        self.entries.iter_mut().find(|e| e.exercise_id == exercise_id)
    }

    pub(crate) fn into_finished(self, finished_at: DateTime<Utc>) -> FinishedWorkout {
        FinishedWorkout {
            started_at: self.started_at,
            finished_at,
            entries: self.entries,
        }
    }
}

/// What a session looked like at the moment it was finished.
#[derive(Debug, Clone, PartialEq)]
pub struct FinishedWorkout {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub entries: Vec<ExerciseEntry>,
}

impl FinishedWorkout {
    pub fn duration(&self) -> Duration {
        self.finished_at - self.started_at
    }

    pub fn set_count(&self) -> usize {
        self.entries.iter().map(|e| e.sets.len()).sum()
    }

    pub fn total_volume(&self) -> f64 {
        self.entries
            .iter()
            .flat_map(|e| e.sets.iter())
            .map(Set::volume)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_weight_and_reps() {
        let mut set = Set::default();
        assert!(set.apply(SetField::Weight, 62.5));
        assert!(set.apply(SetField::Reps, 8.0));
        assert_eq!(set, Set::new(62.5, 8));
    }

    #[test]
    fn apply_rejects_negative_and_non_finite() {
        let mut set = Set::new(40.0, 5);
        assert!(!set.apply(SetField::Weight, -1.0));
        assert!(!set.apply(SetField::Weight, f64::NAN));
        assert!(!set.apply(SetField::Reps, f64::INFINITY));
        assert_eq!(set, Set::new(40.0, 5));
    }

    #[test]
    fn fractional_reps_truncate() {
        let mut set = Set::default();
        assert!(set.apply(SetField::Reps, 7.9));
        assert_eq!(set.reps, 7);
    }

    #[test]
    fn set_field_parses_case_insensitively() {
        assert_eq!("weight".parse::<SetField>().unwrap(), SetField::Weight);
        assert_eq!("REPS".parse::<SetField>().unwrap(), SetField::Reps);
        assert!("tempo".parse::<SetField>().is_err());
        assert_eq!(SetField::Reps.to_string(), "reps");
    }

    #[test]
    fn inactive_session_has_no_entries() {
        let session = Session::Inactive;
        assert!(!session.is_active());
        assert!(session.started_at().is_none());
        assert!(session.entries().is_empty());
        assert!(session.entry("ex1").is_none());
    }

    #[test]
    fn finished_workout_totals() {
        let start = DateTime::from_timestamp_millis(0).unwrap();
        let workout = FinishedWorkout {
            started_at: start,
            finished_at: start + Duration::seconds(90),
            entries: vec![
                ExerciseEntry {
                    exercise_id: "squat".into(),
                    exercise_name: "Squat".into(),
                    sets: vec![Set::new(100.0, 5), Set::new(100.0, 3)],
                },
                ExerciseEntry::new("row", "Row", Set::new(50.0, 10)),
            ],
        };
        assert_eq!(workout.set_count(), 3);
        assert_eq!(workout.total_volume(), 1300.0);
        assert_eq!(workout.duration(), Duration::seconds(90));
    }
}
