use chrono::Duration;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::model::{ActiveSession, ExerciseEntry, FinishedWorkout, Session, Set, SetField};
use crate::persistence::{PersistenceAdapter, Snapshot};

/// Structural change applied to the session. Derived values (the elapsed
/// clock) never produce one.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionChange {
    Started,
    /// Carries the workout as it stood when finished, if one was active.
    Finished(Option<FinishedWorkout>),
    ExerciseAdded {
        exercise_id: String,
    },
    SetAdded {
        exercise_id: String,
        set_index: usize,
    },
    SetUpdated {
        exercise_id: String,
        set_index: usize,
        field: SetField,
    },
    SetRemoved {
        exercise_id: String,
        set_index: usize,
    },
    /// The last set of an exercise was removed, taking the exercise with it.
    ExerciseRemoved {
        exercise_id: String,
    },
}

/// Receives every structural change after it has been applied.
pub trait SessionObserver {
    fn on_change(&mut self, change: &SessionChange, session: &Session);
}

/// Owns the single active workout and every operation on it.
///
/// Operations on an unknown exercise or set index are no-ops and return
/// `false`; nothing here panics or errors on bad input.
pub struct SessionStore<C: Clock> {
    clock: C,
    session: Session,
    observers: Vec<Box<dyn SessionObserver>>,
}

impl<C: Clock> std::fmt::Debug for SessionStore<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("session", &self.session)
            .field("observer_count", &self.observers.len())
            .finish()
    }
}

impl<C: Clock> SessionStore<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            session: Session::Inactive,
            observers: Vec::new(),
        }
    }

    /// Restore the session left behind by a previous process. Anything that
    /// cannot be read back as a valid session yields an inactive one.
    pub fn rehydrate<P: PersistenceAdapter + ?Sized>(clock: C, adapter: &P) -> Self {
        let session = match adapter.load() {
            Ok(Some(snapshot)) => match Session::try_from(snapshot) {
                Ok(session) => {
                    if session.is_active() {
                        info!(
                            entries = session.entries().len(),
                            "resumed active workout from snapshot"
                        );
                    }
                    session
                }
                Err(err) => {
                    warn!(error = %err, "discarding malformed workout snapshot");
                    Session::Inactive
                }
            },
            Ok(None) => Session::Inactive,
            Err(err) => {
                warn!(error = %err, "could not read workout snapshot");
                Session::Inactive
            }
        };

        Self {
            clock,
            session,
            observers: Vec::new(),
        }
    }

    pub fn add_observer(&mut self, observer: Box<dyn SessionObserver>) {
        self.observers.push(observer);
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot::from(&self.session)
    }

    /// Begin a new workout, discarding any one already in progress.
    pub fn start(&mut self) {
        if self.session.is_active() {
            info!("restarting workout; previous entries discarded");
        }
        self.session = Session::Active(ActiveSession::new(self.clock.now()));
        self.notify(SessionChange::Started);
    }

    pub fn finish(&mut self) -> Option<FinishedWorkout> {
        let finished_at = self.clock.now();
        let finished = match std::mem::take(&mut self.session) {
            Session::Active(active) => Some(active.into_finished(finished_at)),
            Session::Inactive => None,
        };
        self.notify(SessionChange::Finished(finished.clone()));
        finished
    }

    /// Add an exercise with one set seeded from `last_performed`, or zeros.
    /// Adding an exercise that is already in the workout does nothing.
    pub fn add_exercise_to_workout(
        &mut self,
        exercise_id: &str,
        exercise_name: &str,
        last_performed: Option<Set>,
    ) -> bool {
        if exercise_id.is_empty() {
            debug!("ignoring exercise with empty id");
            return false;
        }
        let Some(active) = self.session.active_mut() else {
            warn!(exercise_id, "cannot add exercise: no active workout");
            return false;
        };
        if active.position(exercise_id).is_some() {
            debug!(exercise_id, "exercise already in workout");
            return false;
        }

        let seed = last_performed.filter(Set::is_valid).unwrap_or_default();
        active
            .entries
            .push(ExerciseEntry::new(exercise_id, exercise_name, seed));
        self.notify(SessionChange::ExerciseAdded {
            exercise_id: exercise_id.to_string(),
        });
        true
    }

    pub fn update_set(
        &mut self,
        exercise_id: &str,
        set_index: usize,
        field: SetField,
        value: f64,
    ) -> bool {
        let Some(set) = self.set_mut(exercise_id, set_index) else {
            debug!(exercise_id, set_index, "update_set: no such set");
            return false;
        };
        if !set.apply(field, value) {
            debug!(exercise_id, set_index, %field, value, "update_set: rejected value");
            return false;
        }
        self.notify(SessionChange::SetUpdated {
            exercise_id: exercise_id.to_string(),
            set_index,
            field,
        });
        true
    }

    /// Append a set carrying forward the weight and reps of the previous one.
    pub fn add_set(&mut self, exercise_id: &str) -> bool {
        let Some(entry) = self
            .session
            .active_mut()
            .and_then(|active| active.entry_mut(exercise_id))
        else {
            debug!(exercise_id, "add_set: no such exercise");
            return false;
        };

        let next = entry.sets.last().copied().unwrap_or_default();
        entry.sets.push(next);
        let set_index = entry.sets.len() - 1;
        self.notify(SessionChange::SetAdded {
            exercise_id: exercise_id.to_string(),
            set_index,
        });
        true
    }

    /// Remove one set. Removing the last set removes the exercise as well.
    pub fn remove_set(&mut self, exercise_id: &str, set_index: usize) -> bool {
        let Some(active) = self.session.active_mut() else {
            debug!(exercise_id, "remove_set: no active workout");
            return false;
        };
        let Some(pos) = active.position(exercise_id) else {
            debug!(exercise_id, "remove_set: no such exercise");
            return false;
        };
        let entry = &mut active.entries[pos];
        if set_index >= entry.sets.len() {
            debug!(exercise_id, set_index, "remove_set: index out of range");
            return false;
        }

        entry.sets.remove(set_index);
        let change = if entry.sets.is_empty() {
            active.entries.remove(pos);
            SessionChange::ExerciseRemoved {
                exercise_id: exercise_id.to_string(),
            }
        } else {
            SessionChange::SetRemoved {
                exercise_id: exercise_id.to_string(),
                set_index,
            }
        };
        self.notify(change);
        true
    }

    /// Time since the workout started, or `None` when inactive.
    pub fn elapsed(&self) -> Option<Duration> {
        self.session
            .started_at()
            .map(|started_at| self.clock.now() - started_at)
    }

    /// Live `MM:SS` clock; `00:00` when no workout is running.
    pub fn elapsed_display(&self) -> String {
        self.elapsed()
            .map(format_elapsed)
            .unwrap_or_else(|| "00:00".to_string())
    }

    fn set_mut(&mut self, exercise_id: &str, set_index: usize) -> Option<&mut Set> {
        self.session
            .active_mut()?
            .entry_mut(exercise_id)?
            .sets
            .get_mut(set_index)
    }

    fn notify(&mut self, change: SessionChange) {
        for observer in self.observers.iter_mut() {
            observer.on_change(&change, &self.session);
        }
    }
}

/// Minutes are zero-padded to two digits and grow past 99; a negative span
/// (clock moved backwards) shows as `00:00`.
pub fn format_elapsed(elapsed: Duration) -> String {
    let millis = elapsed.num_milliseconds().max(0);
    let minutes = millis / 60_000;
    let seconds = (millis % 60_000) / 1_000;
    format!("{:02}:{:02}", minutes, seconds)
}
