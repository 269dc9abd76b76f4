//! Init command handler.

use color_eyre::eyre::{eyre, Result};

use crate::config::Config;
use crate::migrations::run_migrations;

use super::{connect, App};

impl App {
    /// Run the init command to apply pending schema migrations.
    pub async fn run_init(&self) -> Result<()> {
        let config = Config::load()?;
        let client = connect(&config).await?;

        tracing::info!("Running migrations...");
        let result = run_migrations(&client)
            .await
            .map_err(|e| eyre!("Migration failed: {}", e))?;

        if result.applied.is_empty() {
            tracing::info!(
                version = result.current_version,
                "Schema up to date, no migrations needed"
            );
        } else {
            tracing::info!(
                from = result.previous_version,
                to = result.current_version,
                applied = ?result.applied,
                "Migrations complete"
            );
        }

        Ok(())
    }
}
