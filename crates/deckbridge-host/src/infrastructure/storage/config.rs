//! TOML-based configuration for the desktop host.
//!
//! Reads `AppConfig` from the platform-appropriate config file:
//! - Windows:  `%APPDATA%\deckbridge\config.toml`
//! - Linux:    `~/.config/deckbridge/config.toml`
//! - macOS:    `~/Library/Application Support/deckbridge/config.toml`
//!
//! or from an explicit path given with `--config` / `DECKBRIDGE_CONFIG`.
//! The file is never written by the application.
//!
//! # What is TOML? (for beginners)
//!
//! TOML (Tom's Obvious Minimal Language) is a configuration file format designed
//! to be easy to read and write.  Example:
//!
//! ```toml
//! [serial]
//! port = "/dev/ttyACM0"
//! settle_ms = 2000
//!
//! [playback]
//! bpm = 96
//! ```
//!
//! # Serde default values
//!
//! Every field is annotated with `#[serde(default = "some_fn")]`, and every
//! section with `#[serde(default)]`, so an empty file (or no file at all) gives
//! the same configuration as [`AppConfig::default`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::mediator::MediatorSettings;
use crate::application::sync_engine::SyncTiming;
use crate::infrastructure::media::PlayerSettings;
use crate::infrastructure::serial::LinkSettings;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub app: GeneralConfig,
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneralConfig {
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Serial link settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SerialConfig {
    /// Port to connect to at startup.  No auto-connect when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    /// Wait after opening before the first write (the board resets on open).
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    #[serde(default = "default_inter_byte_ms")]
    pub inter_byte_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncConfig {
    #[serde(default = "default_counter_gap_ms")]
    pub counter_gap_ms: u64,
    #[serde(default = "default_shortcut_gap_ms")]
    pub shortcut_gap_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlaybackConfig {
    #[serde(default = "default_bpm")]
    pub bpm: u32,
    #[serde(default = "default_true")]
    pub beat_enabled: bool,
    #[serde(default = "default_true")]
    pub time_sync_enabled: bool,
    /// Duration assumed for tracks whose length is unknown.
    #[serde(default = "default_duration_secs")]
    pub default_duration_secs: u32,
    #[serde(default = "default_initial_volume")]
    pub initial_volume: u8,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_baud_rate() -> u32 {
    9600
}
fn default_read_timeout_ms() -> u64 {
    100
}
fn default_settle_ms() -> u64 {
    2000
}
fn default_inter_byte_ms() -> u64 {
    10
}
fn default_counter_gap_ms() -> u64 {
    20
}
fn default_shortcut_gap_ms() -> u64 {
    50
}
fn default_bpm() -> u32 {
    120
}
fn default_true() -> bool {
    true
}
fn default_duration_secs() -> u32 {
    180
}
fn default_initial_volume() -> u8 {
    50
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: default_baud_rate(),
            read_timeout_ms: default_read_timeout_ms(),
            settle_ms: default_settle_ms(),
            inter_byte_ms: default_inter_byte_ms(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            counter_gap_ms: default_counter_gap_ms(),
            shortcut_gap_ms: default_shortcut_gap_ms(),
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            bpm: default_bpm(),
            beat_enabled: default_true(),
            time_sync_enabled: default_true(),
            default_duration_secs: default_duration_secs(),
            initial_volume: default_initial_volume(),
        }
    }
}

// ── Runtime conversions ───────────────────────────────────────────────────────

impl SerialConfig {
    pub fn link_settings(&self) -> LinkSettings {
        LinkSettings {
            baud_rate: self.baud_rate,
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            settle_delay: Duration::from_millis(self.settle_ms),
            inter_byte_delay: Duration::from_millis(self.inter_byte_ms),
        }
    }
}

impl SyncConfig {
    pub fn timing(&self) -> SyncTiming {
        SyncTiming {
            counter_gap: Duration::from_millis(self.counter_gap_ms),
            shortcut_gap: Duration::from_millis(self.shortcut_gap_ms),
        }
    }
}

impl PlaybackConfig {
    pub fn mediator_settings(&self) -> MediatorSettings {
        MediatorSettings {
            bpm: self.bpm,
            beat_enabled: self.beat_enabled,
            time_sync_enabled: self.time_sync_enabled,
        }
    }

    pub fn player_settings(&self) -> PlayerSettings {
        PlayerSettings {
            default_duration_secs: self.default_duration_secs,
            initial_volume: self.initial_volume.min(100),
            ..PlayerSettings::default()
        }
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Resolves the full path to the default config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    platform_config_dir()
        .map(|dir| dir.join("config.toml"))
        .ok_or(ConfigError::NoPlatformConfigDir)
}

/// Loads the configuration from `explicit`, or from the platform default
/// location when `None`.
///
/// A missing file yields `AppConfig::default()`.  So does a platform without a
/// config directory, when no explicit path was given.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(explicit: Option<&Path>) -> Result<AppConfig, ConfigError> {
    match explicit {
        Some(path) => load_config_from(path),
        None => match config_file_path() {
            Ok(path) => load_config_from(&path),
            Err(ConfigError::NoPlatformConfigDir) => Ok(AppConfig::default()),
            Err(e) => Err(e),
        },
    }
}

/// Loads `AppConfig` from `path`, returning defaults if the file does not exist.
///
/// # Errors
///
/// See [`load_config`].
pub fn load_config_from(path: &Path) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Resolves the platform config base directory including the `deckbridge` subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("deckbridge"))
    }

    #[cfg(target_os = "linux")]
    {
        // XDG_CONFIG_HOME or ~/.config
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("deckbridge"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("deckbridge")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
