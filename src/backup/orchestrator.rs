//! Backup orchestration
//!
//! Sequences one run: load the ledger, walk and stage changed files, then
//! either discard the empty staging directory or persist the ledger,
//! compress the snapshot and prune old archives.
//!
//! ```text
//! Idle -> Walking -> NoChange
//!                 -> Persisting -> Archiving -> Pruning -> Done
//! ```
//!
//! Ledger paths the walk no longer finds are reported as `FileDropped` on
//! every run, but they only leave the ledger when it is rewritten, which
//! happens on runs that copied something.
//!
//! A failure while walking or archiving leaves the staging directory in the
//! backup directory for inspection. Failures are reported to the sink as
//! `RunFailed` with the state the run was in, then returned to the caller.

use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::backup::archiver::Archiver;
use crate::backup::retention::RetentionManager;
use crate::backup::snapshot::{ReadErrorPolicy, SnapshotBuilder, SnapshotReport};
use crate::config::paths::BackupPaths;
use crate::config::settings::DEFAULT_MAX_BACKUPS;
use crate::error::{BackupError, BackupResult};
use crate::events::{BackupEvent, EventSink};
use crate::storage::Ledger;

/// Phase of a backup run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Walking,
    NoChange,
    Persisting,
    Archiving,
    Pruning,
    Done,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Idle => "idle",
            RunState::Walking => "walking",
            RunState::NoChange => "no change",
            RunState::Persisting => "persisting",
            RunState::Archiving => "archiving",
            RunState::Pruning => "pruning",
            RunState::Done => "done",
        };
        f.write_str(name)
    }
}

/// Options fixed for the lifetime of an orchestrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupOptions {
    /// Number of archives kept after a run
    pub max_backups: usize,
    /// Descend into symlinked directories
    pub follow_symlinks: bool,
    /// Per-file read error policy during the walk
    pub on_read_error: ReadErrorPolicy,
}

impl Default for BackupOptions {
    fn default() -> Self {
        Self {
            max_backups: DEFAULT_MAX_BACKUPS as usize,
            follow_symlinks: false,
            on_read_error: ReadErrorPolicy::default(),
        }
    }
}

/// Counters for one walk
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Files fingerprinted
    pub visited: usize,
    /// Files copied into the snapshot
    pub copied: usize,
    /// Files matching the ledger
    pub unchanged: usize,
    /// Entries not backed up by policy
    pub ignored: usize,
    /// Entries skipped as unreadable
    pub unreadable: usize,
    /// Ledger paths no longer in the source
    pub dropped: usize,
}

impl From<&SnapshotReport> for RunStats {
    fn from(report: &SnapshotReport) -> Self {
        Self {
            visited: report.visited(),
            copied: report.copied.len(),
            unchanged: report.unchanged,
            ignored: report.ignored.len(),
            unreadable: report.unreadable.len(),
            dropped: report.dropped.len(),
        }
    }
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Nothing changed; no archive was written and the ledger is untouched
    NoChange(RunStats),
    /// A new archive was written
    ArchiveCreated {
        archive: PathBuf,
        stats: RunStats,
        pruned: Vec<PathBuf>,
    },
}

impl Outcome {
    /// Path of the new archive, if one was created
    pub fn archive_path(&self) -> Option<&Path> {
        match self {
            Outcome::NoChange(_) => None,
            Outcome::ArchiveCreated { archive, .. } => Some(archive),
        }
    }

    /// Walk counters for the run
    pub fn stats(&self) -> &RunStats {
        match self {
            Outcome::NoChange(stats) => stats,
            Outcome::ArchiveCreated { stats, .. } => stats,
        }
    }

    /// Human-readable one-line result for front-ends
    pub fn summary(&self) -> String {
        match self {
            Outcome::NoChange(_) => "No changes detected. Backup skipped.".to_string(),
            Outcome::ArchiveCreated { archive, .. } => format!(
                "Backup completed successfully. Archive saved at: {}",
                archive.display()
            ),
        }
    }
}

/// Runs incremental backups
///
/// Not meant to be called concurrently for the same backup directory.
pub struct BackupOrchestrator<S: EventSink> {
    options: BackupOptions,
    archiver: Archiver,
    sink: S,
}

impl<S: EventSink> BackupOrchestrator<S> {
    /// Create an orchestrator reporting to `sink`
    pub fn new(options: BackupOptions, sink: S) -> Self {
        Self {
            options,
            archiver: Archiver::new(),
            sink,
        }
    }

    /// Get the options
    pub fn options(&self) -> &BackupOptions {
        &self.options
    }

    /// Get the event sink
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Back up `source_dir` into `backup_dir`, timestamped now
    pub fn run(&self, source_dir: &Path, backup_dir: &Path) -> BackupResult<Outcome> {
        self.run_at(source_dir, backup_dir, Local::now())
    }

    /// Back up `source_dir` into `backup_dir` using an explicit run timestamp
    ///
    /// The timestamp names the staging directory and the archive.
    pub fn run_at(
        &self,
        source_dir: &Path,
        backup_dir: &Path,
        started_at: DateTime<Local>,
    ) -> BackupResult<Outcome> {
        let mut state = RunState::Idle;

        self.execute(source_dir, backup_dir, started_at, &mut state)
            .map_err(|err| {
                self.sink.error(BackupEvent::RunFailed {
                    state,
                    error: err.to_string(),
                });
                err
            })
    }

    fn execute(
        &self,
        source_dir: &Path,
        backup_dir: &Path,
        started_at: DateTime<Local>,
        state: &mut RunState,
    ) -> BackupResult<Outcome> {
        if self.options.max_backups == 0 {
            return Err(BackupError::Config("max_backups must be at least 1".to_string()));
        }
        validate_directories(source_dir, backup_dir)?;

        let paths = BackupPaths::new(backup_dir);
        let staging = paths.staging_dir(&started_at);
        let archive = paths.archive_file(&started_at);

        if archive.exists() {
            return Err(BackupError::AlreadyExists(archive));
        }

        // A corrupt ledger stops the run before anything is written
        let previous = Ledger::load(&paths.ledger_file())?;

        *state = RunState::Walking;
        create_staging(&staging)?;

        let report = SnapshotBuilder::new(&self.sink)
            .follow_symlinks(self.options.follow_symlinks)
            .on_read_error(self.options.on_read_error)
            .build(source_dir, &staging, &previous)?;
        let stats = RunStats::from(&report);
        for path in &report.dropped {
            self.sink.info(BackupEvent::FileDropped { path: path.clone() });
        }

        if !report.changed {
            *state = RunState::NoChange;
            fs::remove_dir_all(&staging).map_err(|e| {
                BackupError::Write(format!(
                    "Failed to remove staging directory {}: {}",
                    staging.display(),
                    e
                ))
            })?;
            self.sink.info(BackupEvent::NoChanges {
                visited: stats.visited,
            });
            return Ok(Outcome::NoChange(stats));
        }

        *state = RunState::Persisting;
        let ledger_file = paths.ledger_file();
        report.ledger.save(&ledger_file)?;
        self.sink.info(BackupEvent::LedgerSaved {
            path: ledger_file,
            entries: report.ledger.len(),
        });

        *state = RunState::Archiving;
        let summary = self.archiver.compress(&staging, &archive)?;
        self.sink.info(BackupEvent::ArchiveCreated {
            path: summary.path.clone(),
            files: summary.files,
            bytes: summary.bytes,
        });

        *state = RunState::Pruning;
        let pruned = RetentionManager::new(backup_dir, self.options.max_backups).prune()?;
        for path in &pruned {
            self.sink.info(BackupEvent::ArchivePruned { path: path.clone() });
        }

        *state = RunState::Done;
        Ok(Outcome::ArchiveCreated {
            archive: summary.path,
            stats,
            pruned,
        })
    }
}

/// Check both directories before any side effect
fn validate_directories(source_dir: &Path, backup_dir: &Path) -> BackupResult<()> {
    if !source_dir.is_dir() {
        return Err(BackupError::Config(format!(
            "Source directory does not exist: {}",
            source_dir.display()
        )));
    }

    if !backup_dir.is_dir() {
        return Err(BackupError::Config(format!(
            "Backup directory does not exist: {}",
            backup_dir.display()
        )));
    }

    let source = source_dir.canonicalize().map_err(|e| {
        BackupError::Config(format!("Cannot resolve {}: {}", source_dir.display(), e))
    })?;
    let backup = backup_dir.canonicalize().map_err(|e| {
        BackupError::Config(format!("Cannot resolve {}: {}", backup_dir.display(), e))
    })?;

    // The walk would otherwise pick up its own staging copies and archives
    if backup.starts_with(&source) {
        return Err(BackupError::Config(format!(
            "Backup directory {} must not be inside the source directory {}",
            backup_dir.display(),
            source_dir.display()
        )));
    }

    Ok(())
}

/// Create the staging directory, refusing to reuse an existing one
fn create_staging(staging: &Path) -> BackupResult<()> {
    fs::create_dir(staging).map_err(|e| {
        if e.kind() == ErrorKind::AlreadyExists {
            BackupError::AlreadyExists(staging.to_path_buf())
        } else {
            BackupError::Write(format!(
                "Failed to create staging directory {}: {}",
                staging.display(),
                e
            ))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RecordingSink;
    use chrono::TimeZone;
    use tempfile::TempDir;

    struct Dirs {
        _temp: TempDir,
        source: PathBuf,
        backup: PathBuf,
    }

    fn dirs() -> Dirs {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("source");
        let backup = temp.path().join("backup");
        fs::create_dir(&source).unwrap();
        fs::create_dir(&backup).unwrap();
        Dirs {
            _temp: temp,
            source,
            backup,
        }
    }

    fn at(minute: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 3, 1, 12, minute, 0).unwrap()
    }

    fn orchestrator() -> BackupOrchestrator<RecordingSink> {
        BackupOrchestrator::new(BackupOptions::default(), RecordingSink::new())
    }

    #[test]
    fn test_missing_source_is_config_error_without_side_effects() {
        let d = dirs();
        let orch = orchestrator();

        let err = orch
            .run_at(&d.source.join("absent"), &d.backup, at(0))
            .unwrap_err();

        assert!(err.is_config());
        assert_eq!(fs::read_dir(&d.backup).unwrap().count(), 0);
        assert_eq!(orch.sink().of_kind("run_failed").len(), 1);
    }

    #[test]
    fn test_missing_backup_dir_is_config_error() {
        let d = dirs();
        let err = orchestrator()
            .run_at(&d.source, &d.backup.join("absent"), at(0))
            .unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_backup_inside_source_is_rejected() {
        let d = dirs();
        let nested = d.source.join("backups");
        fs::create_dir(&nested).unwrap();

        let err = orchestrator().run_at(&d.source, &nested, at(0)).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_no_change_run_leaves_no_trace() {
        let d = dirs();
        let orch = orchestrator();

        let outcome = orch.run_at(&d.source, &d.backup, at(0)).unwrap();

        assert_eq!(outcome, Outcome::NoChange(RunStats::default()));
        assert_eq!(outcome.summary(), "No changes detected. Backup skipped.");
        assert_eq!(fs::read_dir(&d.backup).unwrap().count(), 0);
        assert_eq!(orch.sink().of_kind("no_changes").len(), 1);
    }

    #[test]
    fn test_changed_run_creates_archive_and_ledger() {
        let d = dirs();
        fs::write(d.source.join("a.txt"), "a").unwrap();
        let orch = orchestrator();

        let outcome = orch.run_at(&d.source, &d.backup, at(0)).unwrap();

        let archive = d.backup.join("backup_20250301_120000.tar.gz");
        assert_eq!(outcome.archive_path(), Some(archive.as_path()));
        assert_eq!(
            outcome.summary(),
            format!(
                "Backup completed successfully. Archive saved at: {}",
                archive.display()
            )
        );
        assert!(archive.exists());
        assert!(!d.backup.join("backup_20250301_120000").exists());
        assert_eq!(Ledger::load(&d.backup.join("file_hashes.txt")).unwrap().len(), 1);
        assert_eq!(outcome.stats().copied, 1);

        let kinds: Vec<&str> = orch
            .sink()
            .events()
            .iter()
            .map(|(_, event)| event.kind())
            .collect();
        assert_eq!(kinds, vec!["file_copied", "ledger_saved", "archive_created"]);
    }

    #[test]
    fn test_corrupt_ledger_halts_before_walking() {
        let d = dirs();
        fs::write(d.source.join("a.txt"), "a").unwrap();
        fs::write(d.backup.join("file_hashes.txt"), "garbage\n").unwrap();
        let orch = orchestrator();

        let err = orch.run_at(&d.source, &d.backup, at(0)).unwrap_err();

        assert!(err.is_ledger_format());
        assert!(!d.backup.join("backup_20250301_120000").exists());
        assert_eq!(
            fs::read_to_string(d.backup.join("file_hashes.txt")).unwrap(),
            "garbage\n"
        );
        assert_eq!(
            orch.sink().of_kind("run_failed"),
            vec![BackupEvent::RunFailed {
                state: RunState::Idle,
                error: err.to_string(),
            }]
        );
    }

    #[test]
    fn test_same_timestamp_twice_is_rejected() {
        let d = dirs();
        fs::write(d.source.join("a.txt"), "a").unwrap();
        let orch = orchestrator();
        orch.run_at(&d.source, &d.backup, at(0)).unwrap();

        fs::write(d.source.join("a.txt"), "changed").unwrap();
        let err = orch.run_at(&d.source, &d.backup, at(0)).unwrap_err();

        assert!(matches!(err, BackupError::AlreadyExists(_)));
    }

    #[test]
    fn test_staging_collision_is_rejected() {
        let d = dirs();
        fs::write(d.source.join("a.txt"), "a").unwrap();
        fs::create_dir(d.backup.join("backup_20250301_120000")).unwrap();

        let err = orchestrator()
            .run_at(&d.source, &d.backup, at(0))
            .unwrap_err();

        assert!(matches!(err, BackupError::AlreadyExists(_)));
        assert!(!d.backup.join("file_hashes.txt").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_walk_failure_keeps_staging_for_diagnosis() {
        use std::os::unix::fs::symlink;

        let d = dirs();
        fs::write(d.source.join("a.txt"), "a").unwrap();
        symlink(d.source.join("nowhere"), d.source.join("z-broken")).unwrap();
        let orch = orchestrator();

        let err = orch.run_at(&d.source, &d.backup, at(0)).unwrap_err();

        assert!(matches!(err, BackupError::Read { .. }));
        assert!(d.backup.join("backup_20250301_120000").join("a.txt").exists());
        assert!(!d.backup.join("file_hashes.txt").exists());
        assert_eq!(
            orch.sink().of_kind("run_failed"),
            vec![BackupEvent::RunFailed {
                state: RunState::Walking,
                error: err.to_string(),
            }]
        );
    }

    #[test]
    fn test_zero_retention_cap_is_rejected_before_writing() {
        let d = dirs();
        fs::write(d.source.join("a.txt"), "a").unwrap();
        let options = BackupOptions {
            max_backups: 0,
            ..BackupOptions::default()
        };
        let orch = BackupOrchestrator::new(options, RecordingSink::new());

        let err = orch.run_at(&d.source, &d.backup, at(0)).unwrap_err();

        assert!(err.is_config());
        assert_eq!(fs::read_dir(&d.backup).unwrap().count(), 0);
        assert_eq!(orch.sink().of_kind("run_failed").len(), 1);
    }

    #[test]
    fn test_dropped_reported_on_no_change_run() {
        let d = dirs();
        fs::write(d.source.join("a.txt"), "a").unwrap();
        fs::write(d.source.join("b.txt"), "b").unwrap();
        let orch = orchestrator();
        orch.run_at(&d.source, &d.backup, at(0)).unwrap();
        orch.sink().clear();

        fs::remove_file(d.source.join("b.txt")).unwrap();
        let outcome = orch.run_at(&d.source, &d.backup, at(1)).unwrap();

        assert!(matches!(outcome, Outcome::NoChange(_)));
        assert_eq!(outcome.stats().dropped, 1);
        assert_eq!(orch.sink().paths_of_kind("file_dropped"), vec!["b.txt"]);
        assert!(Ledger::load(&d.backup.join("file_hashes.txt"))
            .unwrap()
            .contains("b.txt"));
    }

    #[test]
    fn test_run_state_display() {
        assert_eq!(RunState::NoChange.to_string(), "no change");
        assert_eq!(RunState::Pruning.to_string(), "pruning");
    }
}
