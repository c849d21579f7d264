//! deltabak - incremental, content-addressed directory backups
//!
//! Each run fingerprints every file under a source directory, copies only
//! new or changed files into a timestamped snapshot, compresses the snapshot
//! into a single `.tar.gz` archive, and deletes the oldest archives beyond a
//! retention cap. A flat ledger file in the backup directory remembers the
//! fingerprint of every file seen by the last run that changed something.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - `config`: Backup directory naming and layered settings
//! - `error`: Custom error types
//! - `storage`: The fingerprint ledger and atomic file writes
//! - `backup`: Hashing, snapshot building, archiving, retention, orchestration
//! - `events`: Structured run events and the sinks that receive them
//! - `cli`: Command handlers for the `deltabak` binary
//!
//! # Example
//!
//! ```rust,ignore
//! use deltabak::cli::run_backup;
//!
//! let message = run_backup(Path::new("./source"), Path::new("./backup"))?;
//! println!("{}", message);
//! ```

pub mod backup;
pub mod cli;
pub mod config;
pub mod error;
pub mod events;
pub mod storage;

pub use error::{BackupError, BackupResult};
