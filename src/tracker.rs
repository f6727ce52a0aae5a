use std::sync::mpsc::Sender;

use tracing::{debug, trace};

use crate::clock::Clock;
use crate::config::Config;
use crate::history::{HistoryDb, HistoryListener};
use crate::model::{FinishedWorkout, Session, Set, SetField};
use crate::persistence::{PersistenceAdapter, PersistenceListener, Snapshot};
use crate::runtime::{FixedTicker, TickHandle, TrackerEvent};
use crate::session::SessionStore;

/// The active-workout context handed to the UI layer.
///
/// Wraps a [`SessionStore`] with its persistence wiring and owns the tick
/// task, which runs exactly while a workout is active. Dropping the tracker
/// stops the ticker.
#[derive(Debug)]
pub struct Tracker<C: Clock> {
    store: SessionStore<C>,
    ticker: FixedTicker,
    tick: Option<TickHandle>,
    events: Sender<TrackerEvent>,
}

impl<C: Clock> Tracker<C> {
    /// Rehydrate from `adapter` and mirror every later change back into it.
    pub fn new<P: PersistenceAdapter + 'static>(
        clock: C,
        adapter: P,
        config: &Config,
        events: Sender<TrackerEvent>,
    ) -> Self {
        let mut store = SessionStore::rehydrate(clock, &adapter);
        store.add_observer(Box::new(PersistenceListener::new(adapter)));

        let mut tracker = Self {
            store,
            ticker: FixedTicker::new(config.tick_interval()),
            tick: None,
            events,
        };
        if tracker.store.session().is_active() {
            tracker.restart_ticker();
        }
        tracker
    }

    pub fn with_history(mut self, db: HistoryDb) -> Self {
        self.store.add_observer(Box::new(HistoryListener::new(db)));
        self
    }

    pub fn session(&self) -> &Session {
        self.store.session()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.store.snapshot()
    }

    pub fn is_ticking(&self) -> bool {
        self.tick.as_ref().is_some_and(TickHandle::is_running)
    }

    pub fn start(&mut self) {
        self.store.start();
        self.restart_ticker();
    }

    pub fn finish(&mut self) -> Option<FinishedWorkout> {
        if let Some(tick) = self.tick.take() {
            tick.cancel();
        }
        self.store.finish()
    }

    pub fn add_exercise(
        &mut self,
        exercise_id: &str,
        exercise_name: &str,
        last_performed: Option<Set>,
    ) -> bool {
        self.store
            .add_exercise_to_workout(exercise_id, exercise_name, last_performed)
    }

    pub fn update_set(
        &mut self,
        exercise_id: &str,
        set_index: usize,
        field: SetField,
        value: f64,
    ) -> bool {
        self.store.update_set(exercise_id, set_index, field, value)
    }

    pub fn add_set(&mut self, exercise_id: &str) -> bool {
        self.store.add_set(exercise_id)
    }

    pub fn remove_set(&mut self, exercise_id: &str, set_index: usize) -> bool {
        self.store.remove_set(exercise_id, set_index)
    }

    pub fn elapsed_display(&self) -> String {
        self.store.elapsed_display()
    }

    /// Handle a tick: recompute the live clock. Never touches storage.
    pub fn on_tick(&self) -> String {
        let elapsed = self.store.elapsed_display();
        trace!(%elapsed, "tick");
        elapsed
    }

    /// Ask the UI to show the recording screen. Only meaningful while a
    /// workout is running; returns whether the request went out.
    pub fn request_recording_view(&self) -> bool {
        if !self.store.session().is_active() {
            return false;
        }
        if self.events.send(TrackerEvent::NavigateToRecording).is_err() {
            debug!("no listener for navigation request");
        }
        true
    }

    fn restart_ticker(&mut self) {
        if let Some(previous) = self.tick.take() {
            previous.cancel();
        }
        self.tick = Some(TickHandle::spawn(self.ticker, self.events.clone()));
    }
}
