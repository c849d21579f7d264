//! User settings for deltabak
//!
//! Holds the configuration surface of a backup run: source and backup
//! directories, retention cap, log and event files, and the walk policies.
//! Settings are layered: built-in defaults, then an optional JSON/YAML config
//! file, then environment variables and command-line flags (applied by the
//! binary).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::backup::{BackupOptions, ReadErrorPolicy};
use crate::error::{BackupError, BackupResult};
use crate::storage::file_io::{read_text_optional, write_text_atomic};

/// Default number of archives kept in a backup directory
pub const DEFAULT_MAX_BACKUPS: u32 = 5;

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "DELTABAK_CONFIG";

/// Backup settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Directory tree to back up
    #[serde(default = "default_source_dir")]
    pub source_dir: PathBuf,

    /// Directory holding the ledger and archives
    #[serde(default = "default_backup_dir")]
    pub backup_dir: PathBuf,

    /// Maximum number of archives to keep
    #[serde(default = "default_max_backups")]
    pub max_backups: u32,

    /// Where the binary writes its log
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,

    /// Optional JSON-lines journal of run events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_log: Option<PathBuf>,

    /// Descend into symlinked directories during the walk
    #[serde(default)]
    pub follow_symlinks: bool,

    /// What to do when a source file cannot be read
    #[serde(default)]
    pub on_read_error: ReadErrorPolicy,
}

fn default_source_dir() -> PathBuf {
    PathBuf::from("./source")
}

fn default_backup_dir() -> PathBuf {
    PathBuf::from("./backup")
}

fn default_max_backups() -> u32 {
    DEFAULT_MAX_BACKUPS
}

fn default_log_file() -> PathBuf {
    PathBuf::from("backup.log")
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            source_dir: default_source_dir(),
            backup_dir: default_backup_dir(),
            max_backups: default_max_backups(),
            log_file: default_log_file(),
            event_log: None,
            follow_symlinks: false,
            on_read_error: ReadErrorPolicy::default(),
        }
    }
}

/// Config file formats understood by [`Settings::load`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigFormat {
    Json,
    Yaml,
}

impl ConfigFormat {
    fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => ConfigFormat::Yaml,
            _ => ConfigFormat::Json,
        }
    }
}

impl Settings {
    /// Load settings from a config file, or defaults if the file doesn't exist
    ///
    /// A zero `max_backups` in the file falls back to the default cap.
    pub fn load(path: &Path) -> BackupResult<Self> {
        let Some(contents) = read_text_optional(path)? else {
            return Ok(Settings::default());
        };

        let mut settings: Settings = match ConfigFormat::for_path(path) {
            ConfigFormat::Json => serde_json::from_str(&contents).map_err(|e| {
                BackupError::Config(format!("Failed to parse {}: {}", path.display(), e))
            })?,
            ConfigFormat::Yaml => serde_yaml::from_str(&contents).map_err(|e| {
                BackupError::Config(format!("Failed to parse {}: {}", path.display(), e))
            })?,
        };

        if settings.max_backups == 0 {
            tracing::warn!(
                file = %path.display(),
                "max_backups must be positive, using default of {}",
                DEFAULT_MAX_BACKUPS
            );
            settings.max_backups = DEFAULT_MAX_BACKUPS;
        }

        Ok(settings)
    }

    /// Save settings to a config file, in the format its extension implies
    pub fn save(&self, path: &Path) -> BackupResult<()> {
        let contents = match ConfigFormat::for_path(path) {
            ConfigFormat::Json => serde_json::to_string_pretty(self).map_err(|e| {
                BackupError::Config(format!("Failed to serialize settings: {}", e))
            })?,
            ConfigFormat::Yaml => serde_yaml::to_string(self).map_err(|e| {
                BackupError::Config(format!("Failed to serialize settings: {}", e))
            })?,
        };

        write_text_atomic(path, &contents)
    }

    /// Apply a textual retention cap (from the environment or a flag)
    ///
    /// Values that are not a positive integer leave the current cap in place
    /// and return `false`.
    pub fn apply_max_backups(&mut self, raw: &str) -> bool {
        match parse_max_backups(raw) {
            Some(count) => {
                self.max_backups = count;
                true
            }
            None => false,
        }
    }

    /// Options handed to the backup orchestrator
    pub fn options(&self) -> BackupOptions {
        BackupOptions {
            max_backups: self.max_backups.max(1) as usize,
            follow_symlinks: self.follow_symlinks,
            on_read_error: self.on_read_error,
        }
    }
}

/// Parse a retention cap, accepting only positive integers
pub fn parse_max_backups(raw: &str) -> Option<u32> {
    raw.trim().parse::<u32>().ok().filter(|count| *count > 0)
}

/// Resolve the config file location
///
/// 1. `DELTABAK_CONFIG` env var (explicit override)
/// 2. The platform config directory: `<config dir>/deltabak/config.json`
pub fn default_config_file() -> Option<PathBuf> {
    if let Ok(custom) = std::env::var(CONFIG_ENV_VAR) {
        return Some(PathBuf::from(custom));
    }

    directories::ProjectDirs::from("", "", "deltabak")
        .map(|dirs| dirs.config_dir().join("config.json"))
}
