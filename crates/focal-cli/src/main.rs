//! Focal CLI - inspect and drive offline sync from the terminal

mod cli;
mod commands;
mod config;
mod error;
#[cfg(test)]
mod tests;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands, OutboxCommands};
use crate::commands::device::run_device;
use crate::commands::flush::run_flush;
use crate::commands::migrate::run_migrate;
use crate::commands::outbox::{run_outbox_clear, run_outbox_count, run_outbox_list};
use crate::commands::storage::run_storage;
use crate::config::resolve_db_path;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("focal=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path);

    match cli.command {
        Commands::Device => run_device(&db_path).await?,
        Commands::Outbox { command } => match command {
            OutboxCommands::List { json } => run_outbox_list(json, &db_path).await?,
            OutboxCommands::Count => run_outbox_count(&db_path).await?,
            OutboxCommands::Clear => run_outbox_clear(&db_path).await?,
        },
        Commands::Storage { json } => run_storage(json, &db_path).await?,
        Commands::Migrate { dry_run } => run_migrate(dry_run, &db_path).await?,
        Commands::Flush => run_flush(&db_path).await?,
    }

    Ok(())
}
