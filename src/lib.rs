// Library surface for the CLI and the integration tests.
// The binary only parses arguments and prints; behavior lives here.
pub mod app_dirs;
pub mod clock;
pub mod config;
pub mod history;
pub mod model;
pub mod persistence;
pub mod runtime;
pub mod session;
pub mod tracker;

pub use model::{ExerciseEntry, FinishedWorkout, Session, Set, SetField};
pub use session::{SessionChange, SessionObserver, SessionStore};
pub use tracker::Tracker;
