//! Structured backup events
//!
//! The backup core reports what it does (files copied or skipped, ledger
//! saved, archives created and pruned, failures) as [`BackupEvent`] values
//! sent to an injected [`EventSink`].
//!
//! # Sinks
//!
//! - `TracingSink`: forwards events to the `tracing` subscriber the binary
//!   installs (written to the configured log file).
//! - `RecordingSink`: keeps events in memory for tests and front-ends.
//! - `JsonLinesSink`: appends events to a JSONL journal.
//! - `Tee`: fans one event out to two sinks.
//!
//! # Example
//!
//! ```rust,ignore
//! use deltabak::backup::{BackupOptions, BackupOrchestrator};
//! use deltabak::events::RecordingSink;
//!
//! let events = RecordingSink::new();
//! let orchestrator = BackupOrchestrator::new(BackupOptions::default(), events.clone());
//! orchestrator.run(&source, &backup)?;
//!
//! for (level, event) in events.events() {
//!     println!("{}: {}", level, event);
//! }
//! ```

mod event;
mod sink;

pub use event::{BackupEvent, EventLevel, JournalEntry};
pub use sink::{EventSink, JsonLinesSink, RecordingSink, Tee, TracingSink};
