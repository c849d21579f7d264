//! Retention of backup archives
//!
//! Keeps at most `max_count` archives in a backup directory. Archives are
//! ranked by file modification time, newest first; the timestamp in the
//! name is only used to recognise archives, never to order them.

use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::NaiveDateTime;

use crate::config::paths::parse_archive_name;
use crate::error::{BackupError, BackupResult};

/// Metadata about one archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveInfo {
    /// Archive filename
    pub filename: String,
    /// Full path to the archive
    pub path: PathBuf,
    /// Run timestamp parsed from the filename (wall clock of the run)
    pub created_at: NaiveDateTime,
    /// File modification time, the retention ordering key
    pub modified: SystemTime,
    /// Size in bytes
    pub size_bytes: u64,
}

/// Enumerates and prunes the archives of one backup directory
#[derive(Debug, Clone)]
pub struct RetentionManager {
    /// Path to backup directory
    backup_dir: PathBuf,
    /// Number of archives to keep
    max_count: usize,
}

impl RetentionManager {
    /// Create a manager keeping `max_count` archives
    pub fn new(backup_dir: impl Into<PathBuf>, max_count: usize) -> Self {
        Self {
            backup_dir: backup_dir.into(),
            max_count,
        }
    }

    /// Get the backup directory
    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Get the retention cap
    pub fn max_count(&self) -> usize {
        self.max_count
    }

    /// List all archives, newest modification time first
    ///
    /// Only regular files named `backup_<YYYYMMDD_HHMMSS>.tar.gz` count; the
    /// ledger, staging directories and anything else are never listed.
    pub fn list_archives(&self) -> BackupResult<Vec<ArchiveInfo>> {
        if !self.backup_dir.exists() {
            return Ok(Vec::new());
        }

        let mut archives = Vec::new();

        for entry in fs::read_dir(&self.backup_dir).map_err(|e| {
            BackupError::Io(format!("Failed to read backup directory: {}", e))
        })? {
            let entry = entry
                .map_err(|e| BackupError::Io(format!("Failed to read directory entry: {}", e)))?;

            let file_type = entry
                .file_type()
                .map_err(|e| BackupError::Io(format!("Failed to stat archive: {}", e)))?;
            if !file_type.is_file() {
                continue;
            }

            let filename = entry.file_name().to_string_lossy().into_owned();
            let Some(created_at) = parse_archive_name(&filename) else {
                continue;
            };

            let metadata = entry
                .metadata()
                .map_err(|e| BackupError::Io(format!("Failed to stat {}: {}", filename, e)))?;
            let modified = metadata
                .modified()
                .map_err(|e| BackupError::Io(format!("Failed to stat {}: {}", filename, e)))?;

            archives.push(ArchiveInfo {
                filename,
                path: entry.path(),
                created_at,
                modified,
                size_bytes: metadata.len(),
            });
        }

        archives.sort_by(newest_first);

        Ok(archives)
    }

    /// Archives that a prune would delete right now, oldest last
    pub fn planned_deletions(&self) -> BackupResult<Vec<ArchiveInfo>> {
        Ok(self
            .list_archives()?
            .into_iter()
            .skip(self.max_count)
            .collect())
    }

    /// Delete every archive beyond the newest `max_count`
    ///
    /// Returns the deleted paths. Running it again without new archives
    /// deletes nothing.
    pub fn prune(&self) -> BackupResult<Vec<PathBuf>> {
        let mut deleted = Vec::new();

        for archive in self.planned_deletions()? {
            fs::remove_file(&archive.path).map_err(|e| {
                BackupError::Write(format!(
                    "Failed to delete old backup {}: {}",
                    archive.filename, e
                ))
            })?;
            deleted.push(archive.path);
        }

        Ok(deleted)
    }

    /// Get the most recently modified archive
    pub fn latest(&self) -> BackupResult<Option<ArchiveInfo>> {
        Ok(self.list_archives()?.into_iter().next())
    }
}

/// Order by modification time descending; equal times fall back to name
fn newest_first(a: &ArchiveInfo, b: &ArchiveInfo) -> Ordering {
    b.modified
        .cmp(&a.modified)
        .then_with(|| b.filename.cmp(&a.filename))
}
