//! Event sinks
//!
//! The backup core reports progress through an [`EventSink`] it is handed at
//! construction, never through global state. A sink that fails to record an
//! event must not fail the backup, so sink methods return nothing.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::{BackupError, BackupResult};

use super::event::{BackupEvent, EventLevel, JournalEntry};

/// Receiver of structured backup events
pub trait EventSink {
    /// Record routine progress
    fn info(&self, event: BackupEvent);

    /// Record something the operator should look at; the run continues
    fn warn(&self, event: BackupEvent) {
        self.info(event)
    }

    /// Record a failure
    fn error(&self, event: BackupEvent);
}

impl<S: EventSink + ?Sized> EventSink for &S {
    fn info(&self, event: BackupEvent) {
        (**self).info(event)
    }

    fn warn(&self, event: BackupEvent) {
        (**self).warn(event)
    }

    fn error(&self, event: BackupEvent) {
        (**self).error(event)
    }
}

impl<S: EventSink + ?Sized> EventSink for Box<S> {
    fn info(&self, event: BackupEvent) {
        (**self).info(event)
    }

    fn warn(&self, event: BackupEvent) {
        (**self).warn(event)
    }

    fn error(&self, event: BackupEvent) {
        (**self).error(event)
    }
}

/// Forwards events to `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn info(&self, event: BackupEvent) {
        tracing::info!(kind = event.kind(), path = event.relative_path(), "{}", event);
    }

    fn warn(&self, event: BackupEvent) {
        tracing::warn!(kind = event.kind(), path = event.relative_path(), "{}", event);
    }

    fn error(&self, event: BackupEvent) {
        tracing::error!(kind = event.kind(), path = event.relative_path(), "{}", event);
    }
}

/// Keeps events in memory
///
/// Clones share the same buffer, so a front-end (or a test) can hold one
/// handle while the orchestrator owns another.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<(EventLevel, BackupEvent)>>>,
}

impl RecordingSink {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded events, oldest first
    pub fn events(&self) -> Vec<(EventLevel, BackupEvent)> {
        self.lock().clone()
    }

    /// Recorded events with the given kind name
    pub fn of_kind(&self, kind: &str) -> Vec<BackupEvent> {
        self.lock()
            .iter()
            .filter(|(_, event)| event.kind() == kind)
            .map(|(_, event)| event.clone())
            .collect()
    }

    /// Relative paths of recorded per-file events with the given kind name
    pub fn paths_of_kind(&self, kind: &str) -> Vec<String> {
        let mut paths: Vec<String> = self
            .of_kind(kind)
            .iter()
            .filter_map(|event| event.relative_path().map(str::to_string))
            .collect();
        paths.sort();
        paths
    }

    /// Forget everything recorded so far
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn push(&self, level: EventLevel, event: BackupEvent) {
        self.lock().push((level, event));
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(EventLevel, BackupEvent)>> {
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl EventSink for RecordingSink {
    fn info(&self, event: BackupEvent) {
        self.push(EventLevel::Info, event);
    }

    fn warn(&self, event: BackupEvent) {
        self.push(EventLevel::Warn, event);
    }

    fn error(&self, event: BackupEvent) {
        self.push(EventLevel::Error, event);
    }
}

/// Appends events to a line-delimited JSON journal
///
/// Each event is written as one JSON line and flushed immediately. Write
/// failures are reported through `tracing` and otherwise ignored.
#[derive(Debug, Clone)]
pub struct JsonLinesSink {
    /// Path to the journal file
    log_path: PathBuf,
}

impl JsonLinesSink {
    /// Create a sink that appends to the specified path
    pub fn new(log_path: impl Into<PathBuf>) -> Self {
        Self {
            log_path: log_path.into(),
        }
    }

    /// Append one entry to the journal
    pub fn append(&self, entry: &JournalEntry) -> BackupResult<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .map_err(|e| BackupError::Write(format!("Failed to open event log: {}", e)))?;

        let json = serde_json::to_string(entry)
            .map_err(|e| BackupError::Write(format!("Failed to serialize event: {}", e)))?;

        writeln!(file, "{}", json)
            .map_err(|e| BackupError::Write(format!("Failed to write event: {}", e)))?;

        file.flush()
            .map_err(|e| BackupError::Write(format!("Failed to flush event log: {}", e)))?;

        Ok(())
    }

    /// Read all journal entries, oldest first
    pub fn read_all(&self) -> BackupResult<Vec<JournalEntry>> {
        if !self.log_path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.log_path)
            .map_err(|e| BackupError::Io(format!("Failed to open event log: {}", e)))?;

        let reader = BufReader::new(file);
        let mut entries = Vec::new();

        for (line_num, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| {
                BackupError::Io(format!("Failed to read event log line {}: {}", line_num + 1, e))
            })?;

            if line.trim().is_empty() {
                continue;
            }

            let entry: JournalEntry = serde_json::from_str(&line).map_err(|e| {
                BackupError::Io(format!(
                    "Failed to parse event at line {}: {}",
                    line_num + 1,
                    e
                ))
            })?;

            entries.push(entry);
        }

        Ok(entries)
    }

    /// Get the path to the journal file
    pub fn path(&self) -> &Path {
        &self.log_path
    }

    fn record(&self, level: EventLevel, event: BackupEvent) {
        if let Err(e) = self.append(&JournalEntry::now(level, event)) {
            tracing::warn!(file = %self.log_path.display(), "event journal write failed: {}", e);
        }
    }
}

impl EventSink for JsonLinesSink {
    fn info(&self, event: BackupEvent) {
        self.record(EventLevel::Info, event);
    }

    fn warn(&self, event: BackupEvent) {
        self.record(EventLevel::Warn, event);
    }

    fn error(&self, event: BackupEvent) {
        self.record(EventLevel::Error, event);
    }
}

/// Sends every event to two sinks
#[derive(Debug, Clone, Default)]
pub struct Tee<A, B> {
    first: A,
    second: B,
}

impl<A, B> Tee<A, B> {
    pub fn new(first: A, second: B) -> Self {
        Self { first, second }
    }
}

impl<A: EventSink, B: EventSink> EventSink for Tee<A, B> {
    fn info(&self, event: BackupEvent) {
        self.first.info(event.clone());
        self.second.info(event);
    }

    fn warn(&self, event: BackupEvent) {
        self.first.warn(event.clone());
        self.second.warn(event);
    }

    fn error(&self, event: BackupEvent) {
        self.first.error(event.clone());
        self.second.error(event);
    }
}

impl<S: EventSink> EventSink for Option<S> {
    fn info(&self, event: BackupEvent) {
        if let Some(sink) = self {
            sink.info(event);
        }
    }

    fn warn(&self, event: BackupEvent) {
        if let Some(sink) = self {
            sink.warn(event);
        }
    }

    fn error(&self, event: BackupEvent) {
        if let Some(sink) = self {
            sink.error(event);
        }
    }
}
