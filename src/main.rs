use chrono::Local;
use clap::{Parser, Subcommand};
use liftlog::{
    app_dirs::AppDirs,
    clock::{Clock, SystemClock},
    config::{Config, ConfigStore, FileConfigStore},
    history::HistoryDb,
    persistence::{FileSnapshotStore, Snapshot},
    runtime::{ChannelEventSource, Runner, Step, TrackerEvent},
    session::format_elapsed,
    Set, SetField, Tracker,
};
use serde::Serialize;
use std::{
    error::Error,
    io::{self, Write},
    path::{Path, PathBuf},
    sync::mpsc,
};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

/// track a workout from the terminal: live timer, sets and reps, resumable across restarts
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "Record the workout you are doing right now. Every change is saved as it happens, so closing the terminal or rebooting never loses the session; finished workouts go to a local history that seeds your next session."
)]
pub struct Cli {
    /// directory holding the active workout, history database, and config
    #[clap(long, global = true)]
    state_dir: Option<PathBuf>,

    /// log debug output to stderr
    #[clap(short, long, global = true)]
    verbose: bool,

    /// only log errors
    #[clap(short, long, global = true)]
    quiet: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
enum Command {
    /// start a new workout, discarding any workout in progress
    Start,
    /// add an exercise to the running workout
    Add {
        exercise_id: String,
        exercise_name: String,
        /// first set weight (defaults to what you lifted last time)
        #[clap(long)]
        weight: Option<f64>,
        /// first set reps (defaults to what you lifted last time)
        #[clap(long)]
        reps: Option<u32>,
    },
    /// change the weight or reps of a set (sets are numbered from 0)
    Set {
        exercise_id: String,
        set_index: usize,
        field: SetField,
        #[clap(allow_negative_numbers = true)]
        value: f64,
    },
    /// add a set, copying the previous one
    AddSet { exercise_id: String },
    /// remove a set; removing the last one removes the exercise
    RemoveSet {
        exercise_id: String,
        set_index: usize,
    },
    /// show the running workout
    Status {
        /// print the saved snapshot as JSON
        #[clap(long)]
        json: bool,
    },
    /// finish the workout and log it to history
    Finish,
    /// list recently finished workouts
    History {
        #[clap(short, long)]
        limit: Option<usize>,
    },
    /// export every recorded set as CSV
    Export { path: PathBuf },
    /// print the live clock on every tick
    Watch {
        /// stop after this many ticks
        #[clap(long)]
        ticks: Option<u64>,
    },
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("{0}")]
    NotApplied(String),
    #[error("could not determine a state directory; pass --state-dir")]
    NoStateDir,
}

#[derive(Serialize)]
struct StatusView {
    #[serde(flatten)]
    snapshot: Snapshot,
    elapsed: String,
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_tracing(cli.quiet, cli.verbose)?;

    let state_dir = cli
        .state_dir
        .clone()
        .or_else(AppDirs::state_dir)
        .ok_or(CliError::NoStateDir)?;
    let config_store = match &cli.state_dir {
        Some(dir) => FileConfigStore::with_path(AppDirs::config_path(dir)),
        None => FileConfigStore::new(),
    };
    let config = config_store.load();

    let stdout = io::stdout();
    if let Err(err) = run(cli.command, &state_dir, &config, &mut stdout.lock()) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
    Ok(())
}

fn init_tracing(quiet: bool, verbose: bool) -> Result<(), Box<dyn Error>> {
    let level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "warn"
    };

    let filter = EnvFilter::try_from_env("LIFTLOG_LOG").unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init()
        .map_err(|error| format!("failed to initialize tracing subscriber: {error}"))?;

    Ok(())
}

fn run<W: Write>(
    command: Command,
    state_dir: &Path,
    config: &Config,
    out: &mut W,
) -> Result<(), Box<dyn Error>> {
    let (tx, rx) = mpsc::channel();
    let mut tracker = Tracker::new(
        SystemClock,
        FileSnapshotStore::in_dir(state_dir),
        config,
        tx,
    );

    match command {
        Command::Start => {
            tracker.start();
            writeln!(out, "workout started")?;
        }
        Command::Add {
            exercise_id,
            exercise_name,
            weight,
            reps,
        } => {
            let last_performed = match (weight, reps) {
                (None, None) if config.record_history => open_history(state_dir)
                    .and_then(|db| db.last_performed(&exercise_id).ok().flatten()),
                (None, None) => None,
                (weight, reps) => Some(Set::new(weight.unwrap_or(0.0), reps.unwrap_or(0))),
            };
            applied(
                tracker.add_exercise(&exercise_id, &exercise_name, last_performed),
                || format!("'{exercise_id}' not added: no active workout, or already in it"),
            )?;
            let first = tracker.session().entry(&exercise_id).map(|e| e.sets[0]);
            if let Some(set) = first {
                writeln!(out, "added {exercise_name}: {} x {}", set.weight, set.reps)?;
            }
        }
        Command::Set {
            exercise_id,
            set_index,
            field,
            value,
        } => {
            applied(
                tracker.update_set(&exercise_id, set_index, field, value),
                || format!("no set {set_index} for '{exercise_id}', or invalid {field} {value}"),
            )?;
            writeln!(out, "set {set_index} of {exercise_id}: {field} = {value}")?;
        }
        Command::AddSet { exercise_id } => {
            applied(tracker.add_set(&exercise_id), || {
                format!("'{exercise_id}' is not in the running workout")
            })?;
            let count = tracker
                .session()
                .entry(&exercise_id)
                .map_or(0, |e| e.sets.len());
            writeln!(out, "{exercise_id} now has {count} sets")?;
        }
        Command::RemoveSet {
            exercise_id,
            set_index,
        } => {
            applied(tracker.remove_set(&exercise_id, set_index), || {
                format!("no set {set_index} for '{exercise_id}'")
            })?;
            match tracker.session().entry(&exercise_id) {
                Some(entry) => writeln!(out, "{exercise_id} now has {} sets", entry.sets.len())?,
                None => writeln!(out, "removed {exercise_id} from the workout")?,
            }
        }
        Command::Status { json } => {
            if json {
                let view = StatusView {
                    snapshot: tracker.snapshot(),
                    elapsed: tracker.elapsed_display(),
                };
                writeln!(out, "{}", serde_json::to_string_pretty(&view)?)?;
            } else {
                print_status(&tracker, out)?;
            }
        }
        Command::Finish => {
            if config.record_history {
                if let Some(db) = open_history(state_dir) {
                    tracker = tracker.with_history(db);
                }
            }
            match tracker.finish() {
                Some(workout) => writeln!(
                    out,
                    "finished in {}: {} exercises, {} sets, volume {}",
                    format_elapsed(workout.duration()),
                    workout.entries.len(),
                    workout.set_count(),
                    workout.total_volume()
                )?,
                None => writeln!(out, "no active workout")?,
            }
        }
        Command::History { limit } => {
            let db = HistoryDb::open(&AppDirs::history_db_path(state_dir))?;
            let workouts = db.recent_workouts(limit.unwrap_or(config.history_limit))?;
            if workouts.is_empty() {
                writeln!(out, "no finished workouts yet")?;
            }
            for w in workouts {
                writeln!(
                    out,
                    "#{} {} {} {} exercises, {} sets, volume {}",
                    w.id,
                    w.started_at.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
                    w.duration_display(),
                    w.exercise_count,
                    w.set_count,
                    w.total_volume
                )?;
            }
        }
        Command::Export { path } => {
            let db = HistoryDb::open(&AppDirs::history_db_path(state_dir))?;
            let file = std::fs::File::create(&path)?;
            let rows = db.export_csv(file)?;
            writeln!(out, "exported {rows} sets to {}", path.display())?;
        }
        Command::Watch { ticks } => {
            if !tracker.session().is_active() {
                writeln!(out, "no active workout")?;
                return Ok(());
            }
            let idle_timeout = config.tick_interval() * 2;
            let runner = Runner::new(ChannelEventSource::new(rx), idle_timeout);
            writeln!(out, "{}", tracker.elapsed_display())?;
            if ticks == Some(0) {
                return Ok(());
            }

            let mut seen = 0u64;
            loop {
                match runner.step() {
                    Step::Event(TrackerEvent::Tick) => {
                        let printed =
                            writeln!(out, "{}", tracker.on_tick()).and_then(|()| out.flush());
                        if let Err(err) = printed {
                            warn!(error = %err, "could not print tick");
                        }
                        seen += 1;
                        if ticks.is_some_and(|limit| seen >= limit) {
                            break;
                        }
                    }
                    Step::Event(TrackerEvent::NavigateToRecording) => {}
                    Step::Idle => debug!(?idle_timeout, "no tick received"),
                    Step::Closed => break,
                }
            }
        }
    }

    Ok(())
}

fn applied(ok: bool, message: impl FnOnce() -> String) -> Result<(), CliError> {
    if ok {
        Ok(())
    } else {
        Err(CliError::NotApplied(message()))
    }
}

fn open_history(state_dir: &Path) -> Option<HistoryDb> {
    match HistoryDb::open(&AppDirs::history_db_path(state_dir)) {
        Ok(db) => Some(db),
        Err(err) => {
            warn!(error = %err, "history database unavailable");
            None
        }
    }
}

fn print_status<C: Clock, W: Write>(tracker: &Tracker<C>, out: &mut W) -> io::Result<()> {
    let session = tracker.session();
    if !session.is_active() {
        return writeln!(out, "no active workout");
    }

    writeln!(out, "workout running {}", tracker.elapsed_display())?;
    for entry in session.entries() {
        writeln!(out, "{} ({})", entry.exercise_name, entry.exercise_id)?;
        for (i, set) in entry.sets.iter().enumerate() {
            writeln!(out, "  {}: {} x {}", i, set.weight, set.reps)?;
        }
    }
    Ok(())
}
