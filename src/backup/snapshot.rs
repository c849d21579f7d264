//! Snapshot construction
//!
//! Walks a source tree, fingerprints every regular file, and copies the ones
//! whose fingerprint differs from the previous ledger into a staging
//! directory at the same relative path. The walk also produces the ledger of
//! every path it visited; the caller decides whether to persist it.
//!
//! # Symlinks
//!
//! With `follow_symlinks` off (the default), a symlink to a regular file is
//! backed up by content and a symlinked directory is reported as ignored and
//! not descended. A dangling symlink is a read error. With `follow_symlinks`
//! on, the walk descends into linked directories and a link cycle is a read
//! error.

use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::backup::hasher::fingerprint;
use crate::error::{BackupError, BackupResult};
use crate::events::{BackupEvent, EventSink};
use crate::storage::ledger::{validate_ledger_path, Ledger};

/// What to do when a source entry cannot be read during the walk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadErrorPolicy {
    /// Fail the whole run
    #[default]
    Abort,
    /// Warn, leave the entry out of the snapshot and the ledger, continue
    Skip,
}

/// Result of walking the source tree once
#[derive(Debug, Clone)]
pub struct SnapshotReport {
    /// Staging directory holding the copied files
    pub snapshot_dir: PathBuf,
    /// Whether at least one file was copied
    pub changed: bool,
    /// Fingerprints of every file visited in this walk
    pub ledger: Ledger,
    /// Relative paths copied into the snapshot, in walk order
    pub copied: Vec<String>,
    /// Number of files whose fingerprint matched the previous ledger
    pub unchanged: usize,
    /// Entries that are not backed up by policy
    pub ignored: Vec<String>,
    /// Entries skipped because they could not be read
    pub unreadable: Vec<String>,
    /// Paths in the previous ledger that the walk no longer found
    pub dropped: Vec<String>,
}

impl SnapshotReport {
    fn new(snapshot_dir: &Path) -> Self {
        Self {
            snapshot_dir: snapshot_dir.to_path_buf(),
            changed: false,
            ledger: Ledger::new(),
            copied: Vec::new(),
            unchanged: 0,
            ignored: Vec::new(),
            unreadable: Vec::new(),
            dropped: Vec::new(),
        }
    }

    /// Number of files fingerprinted in this walk
    pub fn visited(&self) -> usize {
        self.ledger.len()
    }
}

/// Builds one staging snapshot from a source tree
pub struct SnapshotBuilder<'a> {
    follow_symlinks: bool,
    on_read_error: ReadErrorPolicy,
    sink: &'a dyn EventSink,
}

impl<'a> SnapshotBuilder<'a> {
    /// Create a builder with the default policies
    pub fn new(sink: &'a dyn EventSink) -> Self {
        Self {
            follow_symlinks: false,
            on_read_error: ReadErrorPolicy::default(),
            sink,
        }
    }

    /// Descend into symlinked directories
    pub fn follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    /// Set the per-file read error policy
    pub fn on_read_error(mut self, policy: ReadErrorPolicy) -> Self {
        self.on_read_error = policy;
        self
    }

    /// Walk `source_root` and stage every new or changed file in `snapshot_dir`
    ///
    /// `previous` is the ledger from the last run; it is only read. The
    /// returned report carries the ledger for the paths visited now.
    pub fn build(
        &self,
        source_root: &Path,
        snapshot_dir: &Path,
        previous: &Ledger,
    ) -> BackupResult<SnapshotReport> {
        if !source_root.is_dir() {
            return Err(BackupError::Config(format!(
                "Source is not a directory: {}",
                source_root.display()
            )));
        }

        fs::create_dir_all(snapshot_dir).map_err(|e| {
            BackupError::Write(format!(
                "Failed to create snapshot directory {}: {}",
                snapshot_dir.display(),
                e
            ))
        })?;

        let mut report = SnapshotReport::new(snapshot_dir);

        let walker = WalkDir::new(source_root)
            .min_depth(1)
            .follow_links(self.follow_symlinks)
            .sort_by_file_name();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    let display = err
                        .path()
                        .map(|p| display_path(source_root, p))
                        .unwrap_or_default();
                    self.absorb(BackupError::from(err), display, &mut report)?;
                    continue;
                }
            };

            let file_type = entry.file_type();
            if file_type.is_dir() {
                continue;
            }

            let path = entry.path();
            let display = display_path(source_root, path);

            if file_type.is_symlink() {
                match fs::metadata(path) {
                    Ok(target) if target.is_file() => {}
                    Ok(target) => {
                        let reason = if target.is_dir() {
                            "symlinked directory not followed"
                        } else {
                            "symlink to a non-regular file"
                        };
                        self.ignore(display, reason, &mut report);
                        continue;
                    }
                    Err(e) => {
                        let err = BackupError::read(display.clone(), e);
                        self.absorb(err, display, &mut report)?;
                        continue;
                    }
                }
            } else if !file_type.is_file() {
                self.ignore(display, "not a regular file", &mut report);
                continue;
            }

            let visited = self.visit_file(source_root, path, snapshot_dir, previous, &mut report);
            if let Err(err) = visited {
                self.absorb(err, display, &mut report)?;
            }
        }

        report.dropped = previous
            .missing_from(&report.ledger)
            .into_iter()
            .filter(|path| !is_within_any(path, &report.unreadable))
            .collect();

        Ok(report)
    }

    /// Fingerprint one file and stage it if it changed
    fn visit_file(
        &self,
        source_root: &Path,
        path: &Path,
        snapshot_dir: &Path,
        previous: &Ledger,
        report: &mut SnapshotReport,
    ) -> BackupResult<()> {
        let relative = relative_path(source_root, path)?;
        validate_ledger_path(&relative)?;

        let current = fingerprint(path).map_err(|err| match err {
            BackupError::Read { message, .. } => BackupError::read(relative.clone(), message),
            other => other,
        })?;

        if previous.get(&relative) == Some(current) {
            report.unchanged += 1;
            self.sink.info(BackupEvent::FileUnchanged {
                path: relative.clone(),
            });
        } else {
            let dest = snapshot_dir.join(path.strip_prefix(source_root).unwrap_or(path));
            copy_preserving(path, &dest)?;
            report.changed = true;
            report.copied.push(relative.clone());
            self.sink.info(BackupEvent::FileCopied {
                path: relative.clone(),
            });
        }

        // Recorded only once hashing (and copying) succeeded
        report.ledger.put(relative, current);
        Ok(())
    }

    /// Apply the read error policy to a failure on one entry
    fn absorb(
        &self,
        err: BackupError,
        display: String,
        report: &mut SnapshotReport,
    ) -> BackupResult<()> {
        if self.on_read_error == ReadErrorPolicy::Skip && err.is_per_file() {
            self.sink.warn(BackupEvent::FileUnreadable {
                path: display.clone(),
                error: err.to_string(),
            });
            report.unreadable.push(display);
            Ok(())
        } else {
            Err(err)
        }
    }

    fn ignore(&self, display: String, reason: &str, report: &mut SnapshotReport) {
        self.sink.info(BackupEvent::FileIgnored {
            path: display.clone(),
            reason: reason.to_string(),
        });
        report.ignored.push(display);
    }
}

/// Source-relative path with `/` separators, the ledger key for a file
pub fn relative_path(source_root: &Path, path: &Path) -> BackupResult<String> {
    let relative = path.strip_prefix(source_root).map_err(|_| {
        BackupError::UnsupportedPath(format!(
            "{} is outside {}",
            path.display(),
            source_root.display()
        ))
    })?;

    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => {
                let part = part.to_str().ok_or_else(|| {
                    BackupError::UnsupportedPath(relative.to_string_lossy().into_owned())
                })?;
                parts.push(part);
            }
            Component::CurDir => {}
            _ => {
                return Err(BackupError::UnsupportedPath(
                    relative.to_string_lossy().into_owned(),
                ))
            }
        }
    }

    Ok(parts.join("/"))
}

/// Whether `path` is one of `roots` or lies below one of them
fn is_within_any(path: &str, roots: &[String]) -> bool {
    roots.iter().any(|root| {
        path.strip_prefix(root.as_str())
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
    })
}

/// Best-effort relative form of a path for events and error reports
fn display_path(source_root: &Path, path: &Path) -> String {
    relative_path(source_root, path)
        .unwrap_or_else(|_| path.to_string_lossy().into_owned())
}

/// Copy a file, keeping its permission bits and modification time
///
/// Metadata is applied through the open handle, so read-only sources still
/// produce a read-only copy with the right mtime.
fn copy_preserving(src: &Path, dest: &Path) -> BackupResult<()> {
    let write_err = |e: io::Error| {
        BackupError::Write(format!(
            "Failed to copy {} -> {}: {}",
            src.display(),
            dest.display(),
            e
        ))
    };

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(write_err)?;
    }

    let mut input = File::open(src).map_err(|e| BackupError::read(src.display().to_string(), e))?;
    let metadata = input
        .metadata()
        .map_err(|e| BackupError::read(src.display().to_string(), e))?;

    let mut output = File::create(dest).map_err(write_err)?;
    io::copy(&mut input, &mut output).map_err(write_err)?;

    let modified = metadata.modified().map_err(write_err)?;
    output.set_modified(modified).map_err(write_err)?;
    output
        .set_permissions(metadata.permissions())
        .map_err(write_err)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::hasher::Fingerprint;
    use crate::events::RecordingSink;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        source: PathBuf,
        staging: PathBuf,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("source");
        let staging = temp.path().join("staging");
        fs::create_dir(&source).unwrap();
        Fixture {
            _temp: temp,
            source,
            staging,
        }
    }

    fn write(root: &Path, relative: &str, contents: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_empty_source_is_unchanged() {
        let fx = fixture();
        let sink = RecordingSink::new();

        let report = SnapshotBuilder::new(&sink)
            .build(&fx.source, &fx.staging, &Ledger::new())
            .unwrap();

        assert!(!report.changed);
        assert_eq!(report.visited(), 0);
        assert!(report.copied.is_empty());
        assert!(sink.events().is_empty());
    }

    #[test]
    fn test_new_files_are_copied_at_relative_paths() {
        let fx = fixture();
        write(&fx.source, "top.txt", "top");
        write(&fx.source, "nested/deeper/leaf.txt", "leaf");
        let sink = RecordingSink::new();

        let report = SnapshotBuilder::new(&sink)
            .build(&fx.source, &fx.staging, &Ledger::new())
            .unwrap();

        assert!(report.changed);
        assert_eq!(
            report.copied,
            vec!["nested/deeper/leaf.txt".to_string(), "top.txt".to_string()]
        );
        assert_eq!(
            fs::read_to_string(fx.staging.join("nested/deeper/leaf.txt")).unwrap(),
            "leaf"
        );
        assert_eq!(
            report.ledger.get("top.txt"),
            Some(Fingerprint::of_bytes(b"top"))
        );
        assert_eq!(sink.paths_of_kind("file_copied").len(), 2);
    }

    #[test]
    fn test_unchanged_files_are_recorded_but_not_copied() {
        let fx = fixture();
        write(&fx.source, "same.txt", "same");
        write(&fx.source, "edited.txt", "new content");

        let mut previous = Ledger::new();
        previous.put("same.txt", Fingerprint::of_bytes(b"same"));
        previous.put("edited.txt", Fingerprint::of_bytes(b"old content"));

        let sink = RecordingSink::new();
        let report = SnapshotBuilder::new(&sink)
            .build(&fx.source, &fx.staging, &previous)
            .unwrap();

        assert!(report.changed);
        assert_eq!(report.copied, vec!["edited.txt".to_string()]);
        assert_eq!(report.unchanged, 1);
        assert!(!fx.staging.join("same.txt").exists());
        assert_eq!(report.ledger.len(), 2);
        assert_eq!(
            report.ledger.get("edited.txt"),
            Some(Fingerprint::of_bytes(b"new content"))
        );
        assert_eq!(sink.paths_of_kind("file_unchanged"), vec!["same.txt".to_string()]);
    }

    #[test]
    fn test_all_unchanged_is_not_a_change() {
        let fx = fixture();
        write(&fx.source, "a.txt", "a");

        let mut previous = Ledger::new();
        previous.put("a.txt", Fingerprint::of_bytes(b"a"));

        let sink = RecordingSink::new();
        let report = SnapshotBuilder::new(&sink)
            .build(&fx.source, &fx.staging, &previous)
            .unwrap();

        assert!(!report.changed);
        assert_eq!(report.visited(), 1);
        assert_eq!(fs::read_dir(&fx.staging).unwrap().count(), 0);
    }

    #[test]
    fn test_deleted_files_are_reported_as_dropped() {
        let fx = fixture();
        write(&fx.source, "kept.txt", "kept");

        let mut previous = Ledger::new();
        previous.put("kept.txt", Fingerprint::of_bytes(b"kept"));
        previous.put("deleted.txt", Fingerprint::of_bytes(b"gone"));

        let sink = RecordingSink::new();
        let report = SnapshotBuilder::new(&sink)
            .build(&fx.source, &fx.staging, &previous)
            .unwrap();

        assert!(!report.changed);
        assert_eq!(report.dropped, vec!["deleted.txt".to_string()]);
        assert!(!report.ledger.contains("deleted.txt"));
    }

    #[test]
    fn test_source_must_be_a_directory() {
        let fx = fixture();
        let file = fx.source.join("plain.txt");
        fs::write(&file, "x").unwrap();

        let sink = RecordingSink::new();
        let err = SnapshotBuilder::new(&sink)
            .build(&file, &fx.staging, &Ledger::new())
            .unwrap_err();

        assert!(err.is_config());
        assert!(!fx.staging.exists());
    }

    #[test]
    fn test_copy_preserves_modification_time() {
        let fx = fixture();
        write(&fx.source, "old.txt", "old");
        let mtime = SystemTime::UNIX_EPOCH + Duration::from_secs(1_600_000_000);
        File::options()
            .write(true)
            .open(fx.source.join("old.txt"))
            .unwrap()
            .set_modified(mtime)
            .unwrap();

        let sink = RecordingSink::new();
        SnapshotBuilder::new(&sink)
            .build(&fx.source, &fx.staging, &Ledger::new())
            .unwrap();

        let copied = fs::metadata(fx.staging.join("old.txt")).unwrap();
        assert_eq!(copied.modified().unwrap(), mtime);
    }

    #[cfg(unix)]
    #[test]
    fn test_copy_preserves_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let fx = fixture();
        write(&fx.source, "shared.txt", "shared");
        write(&fx.source, "frozen.txt", "frozen");
        fs::set_permissions(fx.source.join("shared.txt"), fs::Permissions::from_mode(0o640))
            .unwrap();
        fs::set_permissions(fx.source.join("frozen.txt"), fs::Permissions::from_mode(0o444))
            .unwrap();

        let sink = RecordingSink::new();
        SnapshotBuilder::new(&sink)
            .build(&fx.source, &fx.staging, &Ledger::new())
            .unwrap();

        let mode = |name: &str| {
            fs::metadata(fx.staging.join(name))
                .unwrap()
                .permissions()
                .mode()
                & 0o777
        };
        assert_eq!(mode("shared.txt"), 0o640);
        assert_eq!(mode("frozen.txt"), 0o444);
    }

    #[test]
    fn test_is_within_any() {
        let roots = vec!["locked".to_string()];
        assert!(is_within_any("locked", &roots));
        assert!(is_within_any("locked/x.txt", &roots));
        assert!(is_within_any("locked/deep/y.txt", &roots));
        assert!(!is_within_any("locked2/x.txt", &roots));
        assert!(!is_within_any("other.txt", &roots));
    }

    #[test]
    fn test_relative_path_uses_forward_slashes() {
        let root = Path::new("/data/src");
        let path = root.join("a").join("b").join("c.txt");
        assert_eq!(relative_path(root, &path).unwrap(), "a/b/c.txt");
        assert!(relative_path(root, Path::new("/elsewhere/c.txt")).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_policy_defaults() {
        use std::os::unix::fs::symlink;

        let fx = fixture();
        write(&fx.source, "real.txt", "real");
        write(&fx.source, "dir/inner.txt", "inner");
        symlink(fx.source.join("real.txt"), fx.source.join("link.txt")).unwrap();
        symlink(fx.source.join("dir"), fx.source.join("linked_dir")).unwrap();

        let sink = RecordingSink::new();
        let report = SnapshotBuilder::new(&sink)
            .build(&fx.source, &fx.staging, &Ledger::new())
            .unwrap();

        assert!(report.ledger.contains("link.txt"));
        assert_eq!(fs::read_to_string(fx.staging.join("link.txt")).unwrap(), "real");
        assert!(!report.ledger.contains("linked_dir/inner.txt"));
        assert_eq!(report.ignored, vec!["linked_dir".to_string()]);
        assert_eq!(sink.paths_of_kind("file_ignored"), vec!["linked_dir".to_string()]);
    }

    #[cfg(unix)]
    #[test]
    fn test_follow_symlinks_descends_into_linked_dirs() {
        use std::os::unix::fs::symlink;

        let fx = fixture();
        write(&fx.source, "dir/inner.txt", "inner");
        symlink(fx.source.join("dir"), fx.source.join("linked_dir")).unwrap();

        let sink = RecordingSink::new();
        let report = SnapshotBuilder::new(&sink)
            .follow_symlinks(true)
            .build(&fx.source, &fx.staging, &Ledger::new())
            .unwrap();

        assert!(report.ledger.contains("dir/inner.txt"));
        assert!(report.ledger.contains("linked_dir/inner.txt"));
    }

    #[cfg(unix)]
    #[test]
    fn test_dangling_symlink_aborts_by_default() {
        use std::os::unix::fs::symlink;

        let fx = fixture();
        write(&fx.source, "a.txt", "a");
        symlink(fx.source.join("missing"), fx.source.join("broken")).unwrap();

        let sink = RecordingSink::new();
        let err = SnapshotBuilder::new(&sink)
            .build(&fx.source, &fx.staging, &Ledger::new())
            .unwrap_err();

        assert!(matches!(err, BackupError::Read { ref path, .. } if path == "broken"));
    }

    #[cfg(unix)]
    #[test]
    fn test_dangling_symlink_skipped_with_skip_policy() {
        use std::os::unix::fs::symlink;

        let fx = fixture();
        write(&fx.source, "a.txt", "a");
        symlink(fx.source.join("missing"), fx.source.join("broken")).unwrap();

        let sink = RecordingSink::new();
        let report = SnapshotBuilder::new(&sink)
            .on_read_error(ReadErrorPolicy::Skip)
            .build(&fx.source, &fx.staging, &Ledger::new())
            .unwrap();

        assert_eq!(report.unreadable, vec!["broken".to_string()]);
        assert!(!report.ledger.contains("broken"));
        assert!(report.ledger.contains("a.txt"));
        assert_eq!(sink.paths_of_kind("file_unreadable"), vec!["broken".to_string()]);
    }

    #[cfg(unix)]
    #[test]
    fn test_unsupported_file_name_follows_policy() {
        let fx = fixture();
        write(&fx.source, "fine.txt", "fine");
        write(&fx.source, "line\nbreak.txt", "bad");

        let sink = RecordingSink::new();
        let err = SnapshotBuilder::new(&sink)
            .build(&fx.source, &fx.staging, &Ledger::new())
            .unwrap_err();
        assert!(matches!(err, BackupError::UnsupportedPath(_)));

        let staging = fx.staging.with_file_name("staging-skip");
        let report = SnapshotBuilder::new(&sink)
            .on_read_error(ReadErrorPolicy::Skip)
            .build(&fx.source, &staging, &Ledger::new())
            .unwrap();
        assert_eq!(report.copied, vec!["fine.txt".to_string()]);
        assert_eq!(report.unreadable.len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_loop_is_read_error_when_following() {
        use std::os::unix::fs::symlink;

        let fx = fixture();
        write(&fx.source, "a.txt", "a");
        symlink(&fx.source, fx.source.join("loop")).unwrap();

        let sink = RecordingSink::new();
        let err = SnapshotBuilder::new(&sink)
            .follow_symlinks(true)
            .build(&fx.source, &fx.staging, &Ledger::new())
            .unwrap_err();

        assert!(matches!(err, BackupError::Read { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_files_under_skipped_entry_are_not_dropped() {
        use std::os::unix::fs::symlink;

        let fx = fixture();
        write(&fx.source, "a.txt", "a");
        symlink(&fx.source, fx.source.join("loop")).unwrap();

        let mut previous = Ledger::new();
        previous.put("a.txt", Fingerprint::of_bytes(b"a"));
        previous.put("loop/a.txt", Fingerprint::of_bytes(b"a"));
        previous.put("gone.txt", Fingerprint::of_bytes(b"gone"));

        let sink = RecordingSink::new();
        let report = SnapshotBuilder::new(&sink)
            .follow_symlinks(true)
            .on_read_error(ReadErrorPolicy::Skip)
            .build(&fx.source, &fx.staging, &previous)
            .unwrap();

        assert_eq!(report.unreadable, vec!["loop".to_string()]);
        assert_eq!(report.dropped, vec!["gone.txt".to_string()]);
        assert_eq!(sink.paths_of_kind("file_unreadable"), vec!["loop".to_string()]);
    }
}
