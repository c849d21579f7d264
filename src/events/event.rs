//! Backup event data structures
//!
//! Defines the structured events a backup run emits, and the journal entry
//! format used when they are written to an event log.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::backup::RunState;

/// Severity of an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Info,
    Warn,
    Error,
}

impl fmt::Display for EventLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventLevel::Info => write!(f, "INFO"),
            EventLevel::Warn => write!(f, "WARN"),
            EventLevel::Error => write!(f, "ERROR"),
        }
    }
}

/// Something that happened during a backup run
///
/// File paths are source-relative POSIX paths, the same keys the ledger uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackupEvent {
    /// A new or changed file was copied into the snapshot
    FileCopied { path: String },
    /// A file matched its ledger fingerprint and was not copied
    FileUnchanged { path: String },
    /// A walk entry that is not backed up (symlinked directory, socket, ...)
    FileIgnored { path: String, reason: String },
    /// A file could not be read and was left out of this run
    FileUnreadable { path: String, error: String },
    /// A ledger path no longer present in the source
    FileDropped { path: String },
    /// The ledger was persisted
    LedgerSaved { path: PathBuf, entries: usize },
    /// A snapshot was compressed into an archive
    ArchiveCreated { path: PathBuf, files: usize, bytes: u64 },
    /// An archive was deleted by the retention cap
    ArchivePruned { path: PathBuf },
    /// The walk found nothing to back up
    NoChanges { visited: usize },
    /// The run stopped with an error
    RunFailed { state: RunState, error: String },
}

impl BackupEvent {
    /// Short machine-readable name of the event
    pub fn kind(&self) -> &'static str {
        match self {
            BackupEvent::FileCopied { .. } => "file_copied",
            BackupEvent::FileUnchanged { .. } => "file_unchanged",
            BackupEvent::FileIgnored { .. } => "file_ignored",
            BackupEvent::FileUnreadable { .. } => "file_unreadable",
            BackupEvent::FileDropped { .. } => "file_dropped",
            BackupEvent::LedgerSaved { .. } => "ledger_saved",
            BackupEvent::ArchiveCreated { .. } => "archive_created",
            BackupEvent::ArchivePruned { .. } => "archive_pruned",
            BackupEvent::NoChanges { .. } => "no_changes",
            BackupEvent::RunFailed { .. } => "run_failed",
        }
    }

    /// The source-relative path this event is about, for per-file events
    pub fn relative_path(&self) -> Option<&str> {
        match self {
            BackupEvent::FileCopied { path }
            | BackupEvent::FileUnchanged { path }
            | BackupEvent::FileIgnored { path, .. }
            | BackupEvent::FileUnreadable { path, .. }
            | BackupEvent::FileDropped { path } => Some(path),
            _ => None,
        }
    }
}

impl fmt::Display for BackupEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackupEvent::FileCopied { path } => write!(f, "Copied: {}", path),
            BackupEvent::FileUnchanged { path } => write!(f, "Skipped (unchanged): {}", path),
            BackupEvent::FileIgnored { path, reason } => {
                write!(f, "Ignored {}: {}", path, reason)
            }
            BackupEvent::FileUnreadable { path, error } => {
                write!(f, "Unreadable, left out of this backup: {} ({})", path, error)
            }
            BackupEvent::FileDropped { path } => {
                write!(f, "No longer in source: {}", path)
            }
            BackupEvent::LedgerSaved { path, entries } => {
                write!(f, "Ledger saved with {} entries: {}", entries, path.display())
            }
            BackupEvent::ArchiveCreated { path, files, bytes } => write!(
                f,
                "Backup compressed to: {} ({} files, {} bytes)",
                path.display(),
                files,
                bytes
            ),
            BackupEvent::ArchivePruned { path } => {
                write!(f, "Removed old backup: {}", path.display())
            }
            BackupEvent::NoChanges { visited } => write!(
                f,
                "No changes detected in {} files. Backup skipped.",
                visited
            ),
            BackupEvent::RunFailed { state, error } => {
                write!(f, "Error during backup ({}): {}", state, error)
            }
        }
    }
}

/// One line of the JSON event journal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    /// When the event was recorded (UTC)
    pub timestamp: DateTime<Utc>,

    /// Severity the core assigned to the event
    pub level: EventLevel,

    /// The event itself
    pub event: BackupEvent,
}

impl JournalEntry {
    /// Stamp an event with the current time
    pub fn now(level: EventLevel, event: BackupEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            event,
        }
    }
}
