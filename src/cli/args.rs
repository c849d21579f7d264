//! Global command-line options
//!
//! Flags shared by every subcommand. Each one overrides the matching field
//! of the config file; the directory, cap and log flags can also come from
//! `SOURCE_DIR`, `BACKUP_DIR`, `MAX_BACKUPS` and `LOG_FILE`.

use std::path::PathBuf;

use clap::Args;

use crate::backup::ReadErrorPolicy;
use crate::config::settings::{default_config_file, Settings};
use crate::error::BackupResult;

/// Options accepted before or after any subcommand
#[derive(Args, Debug, Default, Clone)]
pub struct GlobalArgs {
    /// Config file (JSON, or YAML with a .yaml/.yml extension)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory to back up
    #[arg(short, long, global = true, env = "SOURCE_DIR", value_name = "DIR")]
    pub source: Option<PathBuf>,

    /// Directory holding the ledger and archives
    #[arg(short, long, global = true, env = "BACKUP_DIR", value_name = "DIR")]
    pub backup: Option<PathBuf>,

    /// Number of archives to keep (positive integer, default 5)
    #[arg(short, long, global = true, env = "MAX_BACKUPS", value_name = "N")]
    pub max_backups: Option<String>,

    /// Log file
    #[arg(long, global = true, env = "LOG_FILE", value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Also append run events as JSON lines to this file
    #[arg(long, global = true, value_name = "FILE")]
    pub event_log: Option<PathBuf>,

    /// Descend into symlinked directories
    #[arg(long, global = true)]
    pub follow_symlinks: bool,

    /// Skip unreadable files with a warning instead of failing the run
    #[arg(long, global = true)]
    pub skip_unreadable: bool,
}

/// Settings after all layers were applied
#[derive(Debug, Clone)]
pub struct ResolvedSettings {
    /// Effective settings
    pub settings: Settings,
    /// Config file consulted, if any location could be determined
    pub config_file: Option<PathBuf>,
    /// Problems found while resolving, to be logged once logging is up
    pub warnings: Vec<String>,
}

impl GlobalArgs {
    /// Layer config file, environment and flags into effective settings
    pub fn resolve(&self) -> BackupResult<ResolvedSettings> {
        let config_file = self.config.clone().or_else(default_config_file);

        let mut settings = match &config_file {
            Some(path) => Settings::load(path)?,
            None => Settings::default(),
        };

        let mut warnings = Vec::new();
        self.apply(&mut settings, &mut warnings);

        Ok(ResolvedSettings {
            settings,
            config_file,
            warnings,
        })
    }

    /// Apply flag and environment overrides on top of `settings`
    pub fn apply(&self, settings: &mut Settings, warnings: &mut Vec<String>) {
        if let Some(source) = &self.source {
            settings.source_dir = source.clone();
        }
        if let Some(backup) = &self.backup {
            settings.backup_dir = backup.clone();
        }
        if let Some(raw) = &self.max_backups {
            if !settings.apply_max_backups(raw) {
                warnings.push(format!(
                    "Ignoring max backups value '{}': expected a positive integer, keeping {}",
                    raw, settings.max_backups
                ));
            }
        }
        if let Some(log_file) = &self.log_file {
            settings.log_file = log_file.clone();
        }
        if let Some(event_log) = &self.event_log {
            settings.event_log = Some(event_log.clone());
        }
        if self.follow_symlinks {
            settings.follow_symlinks = true;
        }
        if self.skip_unreadable {
            settings.on_read_error = ReadErrorPolicy::Skip;
        }
    }
}
