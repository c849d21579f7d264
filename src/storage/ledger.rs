//! Persistent ledger of file fingerprints
//!
//! The ledger maps a source-relative POSIX path to the fingerprint it had the
//! last time it was backed up. On disk it is a flat text file with one
//! `relative_path|fingerprint_hex` record per line, no header.
//!
//! Lines are split on their *last* `|`: a fingerprint never contains one, so
//! paths that do are still read back unambiguously. Paths containing a line
//! break cannot be stored and are rejected by [`validate_ledger_path`].

use std::collections::HashMap;
use std::path::Path;

use crate::backup::hasher::Fingerprint;
use crate::error::{BackupError, BackupResult};
use crate::storage::file_io::{read_bytes_optional, write_text_atomic};

/// Separator between path and fingerprint in a ledger line
pub const SEPARATOR: char = '|';

/// In-memory mapping from relative path to last-known fingerprint
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ledger {
    entries: HashMap<String, Fingerprint>,
}

impl Ledger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a ledger from disk
    ///
    /// A missing or empty file is an empty ledger. Any malformed line fails
    /// the whole load; there is no partial recovery. Bytes that are not
    /// UTF-8 count as a malformed line.
    pub fn load(path: &Path) -> BackupResult<Self> {
        match read_bytes_optional(path)? {
            Some(bytes) => Self::parse(decode(&bytes)?),
            None => Ok(Self::new()),
        }
    }

    /// Parse the on-disk text form
    ///
    /// Blank lines are ignored. If a path appears twice the last line wins.
    pub fn parse(contents: &str) -> BackupResult<Self> {
        let mut ledger = Self::new();

        for (index, line) in contents.lines().enumerate() {
            if line.is_empty() {
                continue;
            }

            let (path, hex) = line
                .rsplit_once(SEPARATOR)
                .ok_or_else(|| BackupError::LedgerFormat {
                    line: index + 1,
                    message: format!("missing '{}' separator", SEPARATOR),
                })?;

            if path.is_empty() {
                return Err(BackupError::LedgerFormat {
                    line: index + 1,
                    message: "empty path".to_string(),
                });
            }

            let fingerprint = Fingerprint::from_hex(hex).map_err(|message| {
                BackupError::LedgerFormat {
                    line: index + 1,
                    message,
                }
            })?;

            ledger.entries.insert(path.to_string(), fingerprint);
        }

        Ok(ledger)
    }

    /// Look up the last-known fingerprint of a path
    pub fn get(&self, relative_path: &str) -> Option<Fingerprint> {
        self.entries.get(relative_path).copied()
    }

    /// Insert or replace the fingerprint of a path
    ///
    /// Returns the previous fingerprint, if any.
    pub fn put(
        &mut self,
        relative_path: impl Into<String>,
        fingerprint: Fingerprint,
    ) -> Option<Fingerprint> {
        self.entries.insert(relative_path.into(), fingerprint)
    }

    /// Check whether a path is recorded
    pub fn contains(&self, relative_path: &str) -> bool {
        self.entries.contains_key(relative_path)
    }

    /// Number of recorded paths
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check whether the ledger has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Paths recorded here that are absent from `current`, sorted
    pub fn missing_from(&self, current: &Ledger) -> Vec<String> {
        let mut missing: Vec<String> = self
            .entries
            .keys()
            .filter(|path| !current.contains(path))
            .cloned()
            .collect();
        missing.sort();
        missing
    }

    /// Render the on-disk text form, sorted by path
    pub fn to_text(&self) -> String {
        let mut paths: Vec<&String> = self.entries.keys().collect();
        paths.sort();

        let mut output = String::new();
        for path in paths {
            output.push_str(path);
            output.push(SEPARATOR);
            output.push_str(&self.entries[path].to_hex());
            output.push('\n');
        }
        output
    }

    /// Persist every entry, replacing the backing file atomically
    pub fn save(&self, path: &Path) -> BackupResult<()> {
        write_text_atomic(path, &self.to_text())
    }
}

/// View raw ledger bytes as text, locating the first line that isn't UTF-8
fn decode(bytes: &[u8]) -> BackupResult<&str> {
    std::str::from_utf8(bytes).map_err(|e| {
        let line = bytes[..e.valid_up_to()]
            .iter()
            .filter(|b| **b == b'\n')
            .count()
            + 1;
        BackupError::LedgerFormat {
            line,
            message: "not valid UTF-8".to_string(),
        }
    })
}

/// Check that a relative path can be stored as one ledger line
pub fn validate_ledger_path(relative_path: &str) -> BackupResult<()> {
    if relative_path.is_empty() || relative_path.contains(['\n', '\r']) {
        return Err(BackupError::UnsupportedPath(
            relative_path.escape_debug().to_string(),
        ));
    }
    Ok(())
}
