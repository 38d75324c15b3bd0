//! Binary entry point that glues the SQLite-backed store to the TUI: load the
//! configuration, start logging, open the database, and drive the Ratatui
//! event loop until the user exits.
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use reminder_manager::config::Overrides;
use reminder_manager::{logging, run_app, App, AppConfig, ReminderStore};

#[derive(Debug, Parser)]
#[command(version, about = "Manage reminders from the terminal")]
struct Cli {
    /// Config file to read instead of ~/.reminder-manager/config.toml.
    #[arg(long)]
    config: Option<PathBuf>,
    /// SQLite database file.
    #[arg(long, env = "REMINDER_MANAGER_DB")]
    db: Option<PathBuf>,
    /// Log filter directive, e.g. `reminder_manager=debug`.
    #[arg(long)]
    log_filter: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(
        cli.config.as_deref(),
        Overrides {
            db_path: cli.db,
            log_filter: cli.log_filter,
        },
    )
    .context("failed to load configuration")?;

    logging::init(&config.log_path, &config.log_filter)?;
    info!(db = %config.db_path.display(), "starting reminder manager");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    let store = ReminderStore::open(&config.db_path).context("failed to open reminder store")?;
    let mut app = App::new(store, runtime.handle().clone(), config.date_format)?;
    let result = run_app(&mut app);

    info!("shutting down");
    result
}
