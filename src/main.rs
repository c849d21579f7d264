use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use deltabak::cli::{handle_backup_command, BackupCommands, GlobalArgs};

#[derive(Parser)]
#[command(
    name = "deltabak",
    author = "Kaylee Beyene",
    version,
    about = "Incremental, content-addressed directory backups",
    long_about = "deltabak fingerprints every file under a source directory, copies \
                  only new or changed files into a timestamped .tar.gz archive, and \
                  keeps a fixed number of the most recent archives."
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Option<BackupCommands>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let resolved = cli.global.resolve()?;
    init_logging(&resolved.settings.log_file);

    for warning in &resolved.warnings {
        tracing::warn!("{}", warning);
    }

    let command = cli.command.unwrap_or(BackupCommands::Run);
    handle_backup_command(&resolved, command)?;

    Ok(())
}

/// Send `tracing` output to the log file, or stderr if it can't be opened
fn init_logging(log_file: &Path) {
    let default_level = "info";
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    match OpenOptions::new().create(true).append(true).open(log_file) {
        Ok(file) => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init();
        }
        Err(e) => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .try_init();
            tracing::warn!(file = %log_file.display(), "cannot open log file: {}", e);
        }
    }
}
