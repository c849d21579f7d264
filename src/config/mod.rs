//! Configuration module for deltabak
//!
//! This module provides configuration management including:
//! - Naming of ledger, staging and archive paths in a backup directory
//! - Layered user settings (defaults, config file, environment, flags)

pub mod paths;
pub mod settings;

pub use paths::BackupPaths;
pub use settings::Settings;
