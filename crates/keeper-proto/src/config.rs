use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::platform;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub callback: CallbackConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    /// `host[:port]` of the player's REST API.
    #[serde(default = "default_player_host")]
    pub host: String,
}

/// Where the player posts push notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackConfig {
    /// `host[:port]` the player can reach us at.
    #[serde(default = "default_callback_host")]
    pub host: String,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_webhook_path")]
    pub webhook_path: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    #[default]
    Push,
    Poll,
}

impl std::str::FromStr for SyncMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "push" => Ok(SyncMode::Push),
            "poll" => Ok(SyncMode::Poll),
            other => anyhow::bail!("unknown sync mode '{}' (expected push or poll)", other),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub mode: SyncMode,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// How long a finished mutation keeps swallowing its own echoes.  In
    /// poll mode it must cover at least one poll interval.
    #[serde(default = "default_echo_linger_ms")]
    pub echo_linger_ms: u64,
    /// Issue `play` after re-populating the queue during a removal.
    #[serde(default)]
    pub resume_after_removal: bool,
}

impl SyncConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn echo_linger(&self) -> Duration {
        Duration::from_millis(self.echo_linger_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Base name of the daemon log; rotated daily as `daemon.YYYY-MM-DD.log`.
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,
    /// Rotated log files kept before the oldest is deleted.
    #[serde(default = "default_log_max_files")]
    pub log_max_files: usize,
    /// Fallback catalog fixture, `{"queue": [...]}`.
    #[serde(default = "default_catalog_file")]
    pub catalog_file: PathBuf,
    #[serde(default = "default_snapshot_dir")]
    pub snapshot_dir: PathBuf,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            host: default_player_host(),
        }
    }
}

impl Default for CallbackConfig {
    fn default() -> Self {
        Self {
            host: default_callback_host(),
            bind_address: default_bind_address(),
            port: default_port(),
            webhook_path: default_webhook_path(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            mode: SyncMode::default(),
            poll_interval_ms: default_poll_interval_ms(),
            echo_linger_ms: default_echo_linger_ms(),
            resume_after_removal: false,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            log_file: default_log_file(),
            log_max_files: default_log_max_files(),
            catalog_file: default_catalog_file(),
            snapshot_dir: default_snapshot_dir(),
        }
    }
}

fn default_player_host() -> String {
    "volumio.local".to_string()
}

fn default_callback_host() -> String {
    format!("127.0.0.1:{}", default_port())
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8990
}

fn default_webhook_path() -> String {
    "/playerstatus".to_string()
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_echo_linger_ms() -> u64 {
    1500
}

fn default_log_file() -> PathBuf {
    platform::log_file()
}

fn default_log_max_files() -> usize {
    100
}

fn default_catalog_file() -> PathBuf {
    platform::catalog_file()
}

fn default_snapshot_dir() -> PathBuf {
    platform::snapshot_dir()
}

impl Config {
    /// Load `config.toml` (writing defaults on first run), then apply
    /// `KEEPER_*` environment overrides.
    pub fn load() -> anyhow::Result<Self> {
        let mut config = Self::load_from(&Self::config_path())?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from(config_path: &Path) -> anyhow::Result<Self> {
        if !config_path.exists() {
            let config = Self::default();
            config.save_to(config_path)?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(config_path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to(&self, config_path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn apply_env<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("KEEPER_PLAYER_HOST") {
            self.player.host = host;
        }
        if let Some(host) = lookup("KEEPER_CALLBACK_HOST") {
            self.callback.host = host;
        }
        if let Some(mode) = lookup("KEEPER_SYNC_MODE") {
            self.sync.mode = mode.parse()?;
        }
        if let Some(path) = lookup("KEEPER_LOG_PATH") {
            self.paths.log_file = PathBuf::from(path);
        }
        if let Some(path) = lookup("KEEPER_CATALOG_PATH") {
            self.paths.catalog_file = PathBuf::from(path);
        }
        if let Some(path) = lookup("KEEPER_SNAPSHOT_DIR") {
            self.paths.snapshot_dir = PathBuf::from(path);
        }
        Ok(())
    }

    /// Rejects settings that let the keeper react to its own mutations.
    pub fn validate(&self) -> anyhow::Result<()> {
        let sync = &self.sync;
        if sync.mode == SyncMode::Poll && sync.echo_linger_ms < sync.poll_interval_ms {
            anyhow::bail!(
                "poll mode needs echo_linger_ms ({}) >= poll_interval_ms ({})",
                sync.echo_linger_ms,
                sync.poll_interval_ms
            );
        }
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_file()
    }

    /// The url the player should post notifications to.
    pub fn callback_url(&self) -> String {
        format!("http://{}{}", self.callback.host, self.callback.webhook_path)
    }
}
