//! Path management for deltabak
//!
//! Every file the backup core touches inside a backup directory is derived
//! here, so the naming convention lives in one place:
//!
//! - `file_hashes.txt`: the ledger
//! - `backup_<YYYYMMDD_HHMMSS>/`: staging snapshot for one run
//! - `backup_<YYYYMMDD_HHMMSS>.tar.gz`: the archive for one run
//! - `backup_<YYYYMMDD_HHMMSS>.tar.gz.partial`: archive while being written

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDateTime};

/// Name of the ledger file inside the backup directory
pub const LEDGER_FILE_NAME: &str = "file_hashes.txt";

/// Prefix shared by staging directories and archives
pub const BACKUP_PREFIX: &str = "backup_";

/// Extension of finished archives
pub const ARCHIVE_EXTENSION: &str = ".tar.gz";

/// Suffix appended while an archive is still being written
pub const PARTIAL_SUFFIX: &str = ".partial";

/// strftime format of the run timestamp embedded in names
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Manages all paths inside one backup directory
#[derive(Debug, Clone)]
pub struct BackupPaths {
    /// Backup directory holding the ledger, staging dirs and archives
    backup_dir: PathBuf,
}

impl BackupPaths {
    /// Create paths rooted at the given backup directory
    pub fn new(backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            backup_dir: backup_dir.into(),
        }
    }

    /// Get the backup directory
    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Get the path to the ledger file
    pub fn ledger_file(&self) -> PathBuf {
        self.backup_dir.join(LEDGER_FILE_NAME)
    }

    /// Get the staging directory for a run started at `timestamp`
    pub fn staging_dir(&self, timestamp: &DateTime<Local>) -> PathBuf {
        self.backup_dir.join(backup_stem(timestamp))
    }

    /// Get the archive path for a run started at `timestamp`
    pub fn archive_file(&self, timestamp: &DateTime<Local>) -> PathBuf {
        self.backup_dir
            .join(format!("{}{}", backup_stem(timestamp), ARCHIVE_EXTENSION))
    }
}

/// Name shared by a run's staging directory and archive (without extension)
pub fn backup_stem(timestamp: &DateTime<Local>) -> String {
    format!("{}{}", BACKUP_PREFIX, timestamp.format(TIMESTAMP_FORMAT))
}

/// In-progress name of an archive: `<archive>.partial`
pub fn partial_archive_path(archive_path: &Path) -> PathBuf {
    let mut name = archive_path.as_os_str().to_owned();
    name.push(PARTIAL_SUFFIX);
    PathBuf::from(name)
}

/// Parse the run timestamp out of an archive file name
///
/// Returns `None` for anything that does not follow
/// `backup_<YYYYMMDD_HHMMSS>.tar.gz` exactly. The timestamp is wall-clock
/// time as written by the run, with no time zone attached, so a name is
/// recognised whatever zone the reader is in (including DST gaps).
pub fn parse_archive_name(filename: &str) -> Option<NaiveDateTime> {
    let stamp = filename
        .strip_prefix(BACKUP_PREFIX)?
        .strip_suffix(ARCHIVE_EXTENSION)?;

    if stamp.len() != 15 {
        return None;
    }

    NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).ok()
}
