//! Incremental backup pipeline for deltabak
//!
//! Detects which files changed since the last run by content fingerprint,
//! stages only those into a timestamped snapshot, compresses the snapshot
//! into one archive, and retires archives beyond a retention cap.
//!
//! # Architecture
//!
//! - `hasher`: content fingerprints (SHA-256)
//! - `SnapshotBuilder`: walks the source and stages new/changed files
//! - `Archiver`: packs a snapshot into `backup_<timestamp>.tar.gz`
//! - `RetentionManager`: lists archives and deletes the oldest by mtime
//! - `BackupOrchestrator`: runs the above in order for one backup
//!
//! The ledger those components consult lives in [`crate::storage::ledger`].
//!
//! # Example
//!
//! ```rust,ignore
//! use deltabak::backup::{BackupOptions, BackupOrchestrator, Outcome};
//! use deltabak::events::TracingSink;
//!
//! let orchestrator = BackupOrchestrator::new(BackupOptions::default(), TracingSink);
//! match orchestrator.run(&source_dir, &backup_dir)? {
//!     Outcome::NoChange(_) => println!("nothing to do"),
//!     Outcome::ArchiveCreated { archive, .. } => println!("wrote {}", archive.display()),
//! }
//! ```

pub mod archiver;
pub mod hasher;
pub mod orchestrator;
pub mod retention;
pub mod snapshot;

pub use archiver::{ArchiveSummary, Archiver};
pub use hasher::{fingerprint, Fingerprint};
pub use orchestrator::{BackupOptions, BackupOrchestrator, Outcome, RunState, RunStats};
pub use retention::{ArchiveInfo, RetentionManager};
pub use snapshot::{ReadErrorPolicy, SnapshotBuilder, SnapshotReport};
