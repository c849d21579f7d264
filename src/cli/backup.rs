//! Backup CLI commands
//!
//! Implements CLI commands for running backups and managing archives. This is
//! the presentation layer: it formats results for the terminal and never
//! holds state between runs.

use std::path::Path;

use chrono::{DateTime, Local};
use clap::Subcommand;

use crate::backup::{BackupOptions, BackupOrchestrator, Outcome, RetentionManager};
use crate::cli::args::ResolvedSettings;
use crate::config::paths::BackupPaths;
use crate::config::settings::Settings;
use crate::error::{BackupError, BackupResult};
use crate::events::{BackupEvent, EventSink, JsonLinesSink, Tee, TracingSink};
use crate::storage::Ledger;

/// Backup subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum BackupCommands {
    /// Run one incremental backup (the default)
    Run,

    /// List archives, newest first
    List {
        /// Show detailed information
        #[arg(short, long)]
        verbose: bool,
    },

    /// Delete archives beyond the retention cap
    Prune {
        /// Actually delete; without this only show what would go
        #[arg(short, long)]
        force: bool,
    },

    /// Show the effective configuration and derived paths
    Config {
        /// Write the effective settings to the config file
        #[arg(long)]
        save: bool,
    },
}

/// Run one backup with default options and return a human-readable result
///
/// Entry point for front-ends. Must not be called concurrently for the same
/// backup directory.
pub fn run_backup(source_dir: &Path, backup_dir: &Path) -> BackupResult<String> {
    let orchestrator = BackupOrchestrator::new(BackupOptions::default(), TracingSink);
    let outcome = orchestrator.run(source_dir, backup_dir)?;
    Ok(outcome.summary())
}

/// Run one backup as configured by `settings`, reporting to `sink`
pub fn run_backup_with<S: EventSink>(settings: &Settings, sink: S) -> BackupResult<String> {
    let orchestrator = BackupOrchestrator::new(settings.options(), sink);
    let outcome = orchestrator.run(&settings.source_dir, &settings.backup_dir)?;

    let stats = outcome.stats();
    let mut message = outcome.summary();
    message.push_str(&format!(
        "\n{} file(s) scanned, {} copied, {} unchanged",
        stats.visited, stats.copied, stats.unchanged
    ));
    if stats.unreadable > 0 {
        message.push_str(&format!(", {} unreadable (skipped)", stats.unreadable));
    }
    if stats.ignored > 0 {
        message.push_str(&format!(", {} ignored", stats.ignored));
    }
    if let Outcome::ArchiveCreated { pruned, .. } = &outcome {
        if !pruned.is_empty() {
            message.push_str(&format!("\nRemoved {} old archive(s)", pruned.len()));
        }
    }

    Ok(message)
}

/// Handle a backup command
pub fn handle_backup_command(resolved: &ResolvedSettings, cmd: BackupCommands) -> BackupResult<()> {
    let settings = &resolved.settings;
    let manager = RetentionManager::new(&settings.backup_dir, settings.options().max_backups);

    match cmd {
        BackupCommands::Run => {
            println!("Backup in progress...");
            let journal = settings.event_log.as_ref().map(JsonLinesSink::new);
            let message = run_backup_with(settings, Tee::new(TracingSink, journal))?;
            println!("{}", message);
        }

        BackupCommands::List { verbose } => {
            let archives = manager.list_archives()?;

            if archives.is_empty() {
                println!("No backups found in {}.", settings.backup_dir.display());
                println!("Create one with: deltabak run");
                return Ok(());
            }

            println!("Available Backups");
            println!("=================");
            if let Some(latest) = manager.latest()? {
                println!("Latest: {}", latest.filename);
            }
            println!();

            let now = Local::now();
            for (i, archive) in archives.iter().enumerate() {
                let modified: DateTime<Local> = archive.modified.into();
                let age_str = format_duration(now.signed_duration_since(modified));
                let keep_marker = if i < manager.max_count() { "" } else { " [over cap]" };

                if verbose {
                    println!(
                        "{}. {}{}\n   Run started: {}\n   Modified: {}\n   Size: {}\n   Age: {}\n",
                        i + 1,
                        archive.filename,
                        keep_marker,
                        archive.created_at.format("%Y-%m-%d %H:%M:%S"),
                        modified.format("%Y-%m-%d %H:%M:%S"),
                        format_size(archive.size_bytes),
                        age_str,
                    );
                } else {
                    println!(
                        "  {}. {} ({} ago, {}){}",
                        i + 1,
                        archive.filename,
                        age_str,
                        format_size(archive.size_bytes),
                        keep_marker,
                    );
                }
            }

            println!();
            println!(
                "Total: {} backup(s), keeping {}",
                archives.len(),
                manager.max_count()
            );
        }

        BackupCommands::Prune { force } => {
            if !settings.backup_dir.is_dir() {
                return Err(BackupError::Config(format!(
                    "Backup directory does not exist: {}",
                    settings.backup_dir.display()
                )));
            }

            let planned = manager.planned_deletions()?;

            if planned.is_empty() {
                println!("No backups to prune.");
                println!("Retention cap: {} archive(s)", manager.max_count());
                return Ok(());
            }

            println!("Prune Summary");
            println!("=============");
            println!("Retention cap: {} archive(s)", manager.max_count());
            println!("To be deleted ({}):", planned.len());
            for archive in &planned {
                println!("  {}", archive.filename);
            }
            println!();

            if !force {
                println!("To delete old backups, run again with --force flag:");
                println!("  deltabak prune --force");
                return Ok(());
            }

            let deleted = manager.prune()?;
            for path in &deleted {
                TracingSink.info(BackupEvent::ArchivePruned { path: path.clone() });
            }
            println!("Deleted {} backup(s).", deleted.len());
        }

        BackupCommands::Config { save } => {
            let paths = BackupPaths::new(&settings.backup_dir);

            println!("deltabak Configuration");
            println!("======================");
            match &resolved.config_file {
                Some(path) => println!("Config file:      {}", path.display()),
                None => println!("Config file:      (none)"),
            }
            println!("Source directory: {}", settings.source_dir.display());
            println!("Backup directory: {}", settings.backup_dir.display());
            println!("Ledger file:      {}", paths.ledger_file().display());
            println!("Log file:         {}", settings.log_file.display());
            if let Some(event_log) = &settings.event_log {
                println!("Event log:        {}", event_log.display());
            }
            println!();
            println!("Settings:");
            println!("  Max backups:      {}", settings.max_backups);
            println!("  Follow symlinks:  {}", settings.follow_symlinks);
            println!("  On read error:    {:?}", settings.on_read_error);

            if paths.ledger_file().exists() {
                let ledger = Ledger::load(&paths.ledger_file())?;
                println!("  Tracked files:    {}", ledger.len());
            }

            if save {
                let path = resolved.config_file.as_ref().ok_or_else(|| {
                    BackupError::Config("No config file location could be determined".into())
                })?;
                settings.save(path)?;
                println!();
                println!("Settings saved to {}", path.display());
            }
        }
    }

    Ok(())
}

/// Format a duration in human-readable form
fn format_duration(duration: chrono::Duration) -> String {
    let total_seconds = duration.num_seconds().max(0);

    if total_seconds < 60 {
        return format!("{}s", total_seconds);
    }

    let minutes = total_seconds / 60;
    if minutes < 60 {
        return format!("{}m", minutes);
    }

    let hours = minutes / 60;
    if hours < 24 {
        return format!("{}h", hours);
    }

    let days = hours / 24;
    if days < 30 {
        return format!("{}d", days);
    }

    let months = days / 30;
    format!("{}mo", months)
}

/// Format a file size in human-readable form
fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
