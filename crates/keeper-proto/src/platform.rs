//! Where the keeper keeps its files.
//!
//! Unix follows XDG (`~/.config/queue-keeper`, `~/.local/share/queue-keeper`)
//! on macOS too; Windows uses the per-user app folders.

use std::path::PathBuf;

const APP_DIR: &str = "queue-keeper";

/// Config file and fallback catalog.
pub fn config_dir() -> PathBuf {
    #[cfg(unix)]
    let base = dirs::home_dir().map(|home| home.join(".config"));
    #[cfg(windows)]
    let base = dirs::config_dir();

    base.unwrap_or_else(|| PathBuf::from(".")).join(APP_DIR)
}

/// Log file and state snapshots.
pub fn data_dir() -> PathBuf {
    #[cfg(unix)]
    let base = dirs::home_dir().map(|home| home.join(".local").join("share"));
    #[cfg(windows)]
    let base = dirs::data_local_dir();

    base.unwrap_or_else(std::env::temp_dir).join(APP_DIR)
}

pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

pub fn catalog_file() -> PathBuf {
    config_dir().join("catalog.json")
}

pub fn log_file() -> PathBuf {
    data_dir().join("daemon.log")
}

pub fn snapshot_dir() -> PathBuf {
    data_dir().join("snapshots")
}
