use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "focal")]
#[command(about = "Inspect and drive Focal's offline sync from the command line")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print this device's sync id (created on first use)
    Device,
    /// Inspect pending offline mutations
    Outbox {
        #[command(subcommand)]
        command: OutboxCommands,
    },
    /// Show local storage usage
    Storage {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Upgrade local ids and upload the local dataset
    Migrate {
        /// Only print the id mapping that would be applied
        #[arg(long)]
        dry_run: bool,
    },
    /// Push pending mutations to the remote store
    Flush,
}

#[derive(Subcommand)]
pub enum OutboxCommands {
    /// List queued mutations
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the number of queued mutations
    Count,
    /// Drop every queued mutation
    Clear,
}
