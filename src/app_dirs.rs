use directories::ProjectDirs;
use std::path::{Path, PathBuf};

use crate::persistence::SNAPSHOT_KEY;

/// Centralized application directory resolution
pub struct AppDirs;

impl AppDirs {
    /// `$HOME/.local/state/liftlog`, or the platform data-local dir.
    pub fn state_dir() -> Option<PathBuf> {
        if let Ok(home) = std::env::var("HOME") {
            Some(
                PathBuf::from(home)
                    .join(".local")
                    .join("state")
                    .join("liftlog"),
            )
        } else {
            ProjectDirs::from("", "", "liftlog").map(|proj_dirs| proj_dirs.data_local_dir().to_path_buf())
        }
    }

    pub fn snapshot_path(state_dir: &Path) -> PathBuf {
        state_dir.join(format!("{SNAPSHOT_KEY}.json"))
    }

    pub fn history_db_path(state_dir: &Path) -> PathBuf {
        state_dir.join("history.db")
    }

    pub fn config_path(state_dir: &Path) -> PathBuf {
        state_dir.join("config.json")
    }
}
