//! Custom error types for deltabak
//!
//! This module defines the error hierarchy for backup runs using thiserror
//! for ergonomic error definitions. Every failure of a run surfaces to the
//! caller as one of these variants; the core never aborts the process.

use std::path::PathBuf;

use thiserror::Error;

/// The main error type for deltabak operations
#[derive(Error, Debug)]
pub enum BackupError {
    /// Source or backup directory missing/invalid, or unusable settings
    #[error("Configuration error: {0}")]
    Config(String),

    /// A source file could not be read while hashing or copying
    #[error("Cannot read {path}: {message}")]
    Read { path: String, message: String },

    /// Failure to write staging copies, the archive, or the ledger
    #[error("Write error: {0}")]
    Write(String),

    /// Other file I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// The persisted ledger contains a malformed line
    #[error("Malformed ledger at line {line}: {message}")]
    LedgerFormat { line: usize, message: String },

    /// A relative path that cannot be stored in the ledger
    #[error("Unsupported path: {0}")]
    UnsupportedPath(String),

    /// A staging directory or archive for this run's timestamp already exists
    #[error("Backup already exists for this timestamp: {}", .0.display())]
    AlreadyExists(PathBuf),
}

impl BackupError {
    /// Create a read error for a source path
    pub fn read(path: impl Into<String>, message: impl ToString) -> Self {
        Self::Read {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Check if this is a configuration error
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Check if this is a ledger format error
    pub fn is_ledger_format(&self) -> bool {
        matches!(self, Self::LedgerFormat { .. })
    }

    /// Check if this error came from reading a single source entry
    ///
    /// These are the errors the `skip` read-error policy is allowed to absorb.
    pub fn is_per_file(&self) -> bool {
        matches!(self, Self::Read { .. } | Self::UnsupportedPath(_))
    }
}

impl From<std::io::Error> for BackupError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<walkdir::Error> for BackupError {
    fn from(err: walkdir::Error) -> Self {
        let path = err
            .path()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        Self::Read {
            path,
            message: err.to_string(),
        }
    }
}

/// Result type alias for deltabak operations
pub type BackupResult<T> = Result<T, BackupError>;
