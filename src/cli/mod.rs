//! CLI module for shelter-reconcile.
//!
//! Subcommands:
//! - `init`: Apply pending schema migrations
//! - `reconcile`: Run the reconciliation pipeline
//! - `validate`: Run the integrity validator against the store
//! - `mapping`: Inspect an exported ID mapping

mod init;
mod mapping;
mod reconcile;
mod validate;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{eyre, Result};

use crate::config::Config;
use crate::mapping::Domain;
use crate::store::backends::postgres::PostgresClient;

/// Shelter catalog reconciliation and legacy schema migration
#[derive(Parser)]
#[command(name = "shelter-reconcile")]
#[command(about = "Reconcile shelter catalogs and migrate legacy records")]
#[command(version)]
pub struct App {
    /// Run in verbose mode
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Apply pending schema migrations
    Init,

    /// Reconcile catalogs and migrate dependent records from a legacy snapshot
    Reconcile {
        /// Legacy snapshot JSON (overrides `migration.snapshot`)
        #[arg(long)]
        snapshot: Option<PathBuf>,

        /// ID mapping to resume from and export to (overrides `migration.mapping`)
        #[arg(long)]
        mapping: Option<PathBuf>,

        /// Where to write the JSON run report (overrides `migration.report`)
        #[arg(long)]
        report: Option<PathBuf>,

        /// Run against an empty in-memory store; nothing is written
        #[arg(long)]
        dry_run: bool,
    },

    /// Check hierarchy, name uniqueness and dangling references
    Validate,

    /// Inspect an exported ID mapping
    Mapping {
        /// Mapping file
        path: PathBuf,

        /// Only show this domain
        #[arg(long)]
        domain: Option<Domain>,

        /// Only show this legacy key
        #[arg(long)]
        key: Option<String>,
    },
}

impl App {
    /// Run the CLI application.
    pub async fn run(self) -> Result<()> {
        match self.command {
            Command::Init => self.run_init().await,
            Command::Reconcile {
                ref snapshot,
                ref mapping,
                ref report,
                dry_run,
            } => {
                self.run_reconcile(snapshot.clone(), mapping.clone(), report.clone(), dry_run)
                    .await
            }
            Command::Validate => self.run_validate().await,
            Command::Mapping {
                ref path,
                domain,
                ref key,
            } => self.run_mapping(path, domain, key.as_deref()),
        }
    }
}

/// Connects to the configured PostgreSQL store.
async fn connect(config: &Config) -> Result<PostgresClient> {
    let postgres = config
        .postgres
        .as_ref()
        .ok_or_else(|| eyre!("No [postgres] uri configured"))?;

    tracing::info!("Connecting to PostgreSQL");
    let client = PostgresClient::connect(
        &postgres.uri,
        Duration::from_secs(postgres.connect_timeout_secs),
    )
    .await
    .map_err(|e| eyre!("Failed to connect: {}", e))?;
    tracing::info!("Connected to PostgreSQL");
    Ok(client)
}
