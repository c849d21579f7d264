//! Storage layer for deltabak
//!
//! Persistent state kept in the backup directory: the fingerprint ledger,
//! plus the atomic-write helpers it (and the settings file) rely on.

pub mod file_io;
pub mod ledger;

pub use ledger::Ledger;
