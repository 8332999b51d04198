use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::validate_enum;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralSettings,

    #[serde(default)]
    pub playback: PlaybackSettings,

    #[serde(default)]
    pub adaptive: AdaptiveSettings,

    /// Camera layout; replaces the built-in layout when non-empty
    #[serde(default)]
    pub stream: Vec<StreamConfig>,

    /// Source overrides: camera id -> local path or URL
    #[serde(default)]
    pub sources: HashMap<String, String>,
}

/// General daemon settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GeneralSettings {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Media backend: "gstreamer" or "none"
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Base directory for relative sources
    #[serde(default)]
    pub media_root: Option<String>,

    /// Session manifest loaded at startup
    #[serde(default)]
    pub session: Option<String>,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            backend: default_backend(),
            media_root: None,
            session: None,
        }
    }
}

impl GeneralSettings {
    /// Maximum log level for `log_level`; unknown values fall back to info
    pub fn level_filter(&self) -> log::LevelFilter {
        self.log_level.parse().unwrap_or(log::LevelFilter::Info)
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_backend() -> String {
    "gstreamer".to_string()
}

/// Transport timing
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlaybackSettings {
    /// Assumed frame rate for frame stepping
    #[serde(default = "default_frame_rate")]
    pub frame_rate: f64,

    /// Skip step in seconds
    #[serde(default = "default_seek_step")]
    pub seek_step: f64,

    /// Pause before resuming after a seek while playing
    #[serde(default = "default_seek_settle_ms")]
    pub seek_settle_ms: u64,

    /// Bounded wait for every stream to become playable on play
    #[serde(default = "default_ready_timeout_ms")]
    pub ready_timeout_ms: u64,

    /// Streams that neither load nor fail within this window count as loaded
    #[serde(default = "default_load_timeout_ms")]
    pub load_timeout_ms: u64,

    #[serde(default = "default_true")]
    pub watchdog: bool,

    #[serde(default = "default_watchdog_interval_ms")]
    pub watchdog_interval_ms: u64,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            frame_rate: default_frame_rate(),
            seek_step: default_seek_step(),
            seek_settle_ms: default_seek_settle_ms(),
            ready_timeout_ms: default_ready_timeout_ms(),
            load_timeout_ms: default_load_timeout_ms(),
            watchdog: true,
            watchdog_interval_ms: default_watchdog_interval_ms(),
        }
    }
}

impl PlaybackSettings {
    pub fn seek_settle(&self) -> Duration {
        Duration::from_millis(self.seek_settle_ms)
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }

    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }

    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_millis(self.watchdog_interval_ms)
    }
}

fn default_true() -> bool {
    true
}
fn default_frame_rate() -> f64 {
    30.0
}
fn default_seek_step() -> f64 {
    10.0
}
fn default_seek_settle_ms() -> u64 {
    50
}
fn default_ready_timeout_ms() -> u64 {
    3000
}
fn default_load_timeout_ms() -> u64 {
    5000
}
fn default_watchdog_interval_ms() -> u64 {
    1000
}

/// Adaptive-streaming recovery
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AdaptiveSettings {
    /// Recovery attempts before a fault is reported as a load error
    #[serde(default = "default_max_recoveries")]
    pub max_recoveries: u32,
}

impl Default for AdaptiveSettings {
    fn default() -> Self {
        Self {
            max_recoveries: default_max_recoveries(),
        }
    }
}

fn default_max_recoveries() -> u32 {
    3
}

/// One camera of a configured layout
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StreamConfig {
    pub id: String,

    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub src: String,
}

impl Config {
    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::info!(
                "Config file not found at {}, using defaults",
                path.display()
            );
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::info!("Loaded configuration from {}", path.display());
        config.validate()?;

        Ok(config)
    }

    /// Get the default config file path
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("camsync");

        Ok(config_dir.join("config.toml"))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.validate_log_level(&self.general.log_level)?;
        self.validate_backend(&self.general.backend)?;

        let playback = &self.playback;
        if !(playback.frame_rate.is_finite() && playback.frame_rate > 0.0) {
            anyhow::bail!("Invalid frame rate: {} (must be positive)", playback.frame_rate);
        }
        if !(playback.seek_step.is_finite() && playback.seek_step > 0.0) {
            anyhow::bail!("Invalid seek step: {} (must be positive)", playback.seek_step);
        }
        if playback.load_timeout_ms == 0 {
            anyhow::bail!("Invalid load timeout: must be at least 1ms");
        }
        if playback.watchdog && playback.watchdog_interval_ms == 0 {
            anyhow::bail!("Invalid watchdog interval: must be at least 1ms");
        }

        let mut seen = HashSet::new();
        for stream in &self.stream {
            if stream.id.trim().is_empty() {
                anyhow::bail!("Stream entry with empty id");
            }
            if !seen.insert(stream.id.as_str()) {
                anyhow::bail!("Duplicate stream id: {}", stream.id);
            }
        }

        Ok(())
    }

    fn validate_log_level(&self, level: &str) -> Result<()> {
        validate_enum!(level, "trace", "debug", "info", "warn", "error")
    }

    fn validate_backend(&self, backend: &str) -> Result<()> {
        validate_enum!(backend, "gstreamer", "none")
    }
}
