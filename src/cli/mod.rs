//! CLI command handlers
//!
//! This module contains the implementation of CLI commands,
//! bridging the clap argument parsing with the backup pipeline.

pub mod args;
pub mod backup;

pub use args::{GlobalArgs, ResolvedSettings};
pub use backup::{handle_backup_command, run_backup, run_backup_with, BackupCommands};
