//! Snapshot compression
//!
//! Packs a staging snapshot into one gzip-compressed tar archive whose entry
//! names are relative to the snapshot root, then removes the snapshot. The
//! archive is written under a `.partial` name and renamed once complete, so
//! an interrupted write never looks like a finished backup. If anything goes
//! wrong before the rename the snapshot is left untouched.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use walkdir::WalkDir;

use crate::backup::snapshot::relative_path;
use crate::config::paths::partial_archive_path;
use crate::error::{BackupError, BackupResult};

/// What a finished archive contains
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveSummary {
    /// Path of the finished archive
    pub path: PathBuf,
    /// Number of files packed
    pub files: usize,
    /// Compressed size in bytes
    pub bytes: u64,
}

/// Compresses snapshots into `.tar.gz` archives
#[derive(Debug, Clone, Copy)]
pub struct Archiver {
    compression: Compression,
}

impl Default for Archiver {
    fn default() -> Self {
        Self {
            compression: Compression::default(),
        }
    }
}

impl Archiver {
    /// Create an archiver with the default compression level
    pub fn new() -> Self {
        Self::default()
    }

    /// Compress `snapshot_dir` into `archive_path` and delete the snapshot
    ///
    /// The snapshot is deleted only after the archive has been fully written,
    /// synced and renamed into place.
    pub fn compress(
        &self,
        snapshot_dir: &Path,
        archive_path: &Path,
    ) -> BackupResult<ArchiveSummary> {
        if archive_path.exists() {
            return Err(BackupError::AlreadyExists(archive_path.to_path_buf()));
        }

        let partial = partial_archive_path(archive_path);

        let files = match self.write_archive(snapshot_dir, &partial) {
            Ok(files) => files,
            Err(e) => {
                let _ = fs::remove_file(&partial);
                return Err(e);
            }
        };

        fs::rename(&partial, archive_path).map_err(|e| {
            let _ = fs::remove_file(&partial);
            BackupError::Write(format!(
                "Failed to finalize archive {}: {}",
                archive_path.display(),
                e
            ))
        })?;

        let bytes = fs::metadata(archive_path)?.len();

        fs::remove_dir_all(snapshot_dir).map_err(|e| {
            BackupError::Io(format!(
                "Archive written but snapshot {} could not be removed: {}",
                snapshot_dir.display(),
                e
            ))
        })?;

        Ok(ArchiveSummary {
            path: archive_path.to_path_buf(),
            files,
            bytes,
        })
    }

    /// Write every regular file under `snapshot_dir` into a tar.gz at `dest`
    fn write_archive(&self, snapshot_dir: &Path, dest: &Path) -> BackupResult<usize> {
        let write_err = |e: io::Error| {
            BackupError::Write(format!("Failed to write archive {}: {}", dest.display(), e))
        };

        let file = File::create(dest).map_err(write_err)?;
        let encoder = GzEncoder::new(BufWriter::new(file), self.compression);
        let mut builder = tar::Builder::new(encoder);
        builder.follow_symlinks(false);

        let mut files = 0;
        for entry in WalkDir::new(snapshot_dir).min_depth(1).sort_by_file_name() {
            let entry =
                entry.map_err(|e| BackupError::Io(format!("Failed to walk snapshot: {}", e)))?;
            if !entry.file_type().is_file() {
                continue;
            }

            let name = relative_path(snapshot_dir, entry.path())?;
            builder
                .append_path_with_name(entry.path(), &name)
                .map_err(write_err)?;
            files += 1;
        }

        let encoder = builder.into_inner().map_err(write_err)?;
        let mut writer = encoder.finish().map_err(write_err)?;
        writer.flush().map_err(write_err)?;
        let file = writer.into_inner().map_err(|e| write_err(e.into_error()))?;
        file.sync_all().map_err(write_err)?;

        Ok(files)
    }
}
