//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{MontageError, MontageResult};

/// Global application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Transcoding engine settings.
    pub engine: EngineConfig,

    /// Durable storage for saved exports.
    pub storage: StorageConfig,

    /// Undo/redo history settings.
    pub history: HistoryConfig,

    /// Saved-export lifecycle defaults.
    pub exports: ExportsConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Transcoding engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// ffmpeg binary name or path.
    pub ffmpeg_bin: String,

    /// ffprobe binary name or path.
    pub ffprobe_bin: String,

    /// Directory for render outputs and batch intermediates.
    pub work_dir: PathBuf,

    /// Kill the engine after this many seconds (None = no limit).
    pub timeout_secs: Option<u64>,
}

/// Durable object storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory of the object store (`{owner}/{content}/{file}` lives under it).
    pub root: PathBuf,

    /// Prefix used to derive public URLs.
    pub public_base_url: String,

    /// JSON document holding saved-export records.
    pub records_path: PathBuf,
}

/// Undo/redo history settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Maximum snapshots kept per content item.
    pub capacity: usize,

    /// Directory holding one history document per content item.
    pub store_dir: PathBuf,
}

/// Saved-export lifecycle defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportsConfig {
    /// Expiry applied when a save request does not specify one.
    pub default_expires_days: i64,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "montage_render_engine=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            storage: StorageConfig::default(),
            history: HistoryConfig::default(),
            exports: ExportsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ffmpeg_bin: "ffmpeg".to_string(),
            ffprobe_bin: "ffprobe".to_string(),
            work_dir: data_dir().join("work"),
            timeout_secs: None,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let base = data_dir();
        Self {
            root: base.join("saved-exports"),
            public_base_url: "/saved-exports".to_string(),
            records_path: base.join("saved-exports.json"),
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            capacity: 50,
            store_dir: data_dir().join("history"),
        }
    }
}

impl Default for ExportsConfig {
    fn default() -> Self {
        Self {
            default_expires_days: 10,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if config_path.exists() {
            match std::fs::read_to_string(&config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        let config_path = config_file_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }

    /// Reject settings the lifecycle rules cannot work with.
    pub fn validate(&self) -> MontageResult<()> {
        if self.history.capacity == 0 {
            return Err(MontageError::config("history.capacity must be at least 1"));
        }
        if !(1..=365).contains(&self.exports.default_expires_days) {
            return Err(MontageError::config(
                "exports.default_expires_days must be within 1..=365",
            ));
        }
        if self.engine.ffmpeg_bin.trim().is_empty() || self.engine.ffprobe_bin.trim().is_empty() {
            return Err(MontageError::config("engine binaries must be named"));
        }
        Ok(())
    }
}

/// Standard config file location.
fn config_file_path() -> PathBuf {
    if let Ok(explicit) = std::env::var("MONTAGE_CONFIG") {
        return PathBuf::from(explicit);
    }
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("montage").join("config.json")
}

/// Default data directory.
fn data_dir() -> PathBuf {
    let base = std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local").join("share")
        });
    base.join("montage")
}
