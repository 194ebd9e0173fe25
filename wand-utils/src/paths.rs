//! Config and log file locations
//!
//! XDG base directories on Linux via `directories`; other platforms get
//! their native equivalents.

use std::path::PathBuf;

use directories::ProjectDirs;

const APP_NAME: &str = "wand";
const CONFIG_FILE: &str = "config.toml";
const LOG_FILE: &str = "wand.log";

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", APP_NAME)
}

/// `$XDG_CONFIG_HOME/wand/config.toml`
///
/// `None` when no home directory can be resolved; the client then runs
/// on defaults and command-line flags alone.
pub fn config_file() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE))
}

/// `$XDG_STATE_HOME/wand/log/wand.log`
///
/// Platforms without a state directory log under the local data directory,
/// and a missing home directory falls back to the system temp dir.
pub fn log_file() -> PathBuf {
    let base = match project_dirs() {
        Some(dirs) => dirs
            .state_dir()
            .unwrap_or_else(|| dirs.data_local_dir())
            .to_path_buf(),
        None => std::env::temp_dir().join(APP_NAME),
    };
    base.join("log").join(LOG_FILE)
}
