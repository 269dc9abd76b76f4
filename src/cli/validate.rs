//! Validate command handler.

use color_eyre::eyre::{bail, eyre, Result};

use crate::config::Config;
use crate::services::IntegrityValidator;

use super::{connect, App};

impl App {
    /// Run the integrity validator against the configured store.
    pub async fn run_validate(&self) -> Result<()> {
        let config = Config::load()?;
        let client = connect(&config).await?;

        let report = IntegrityValidator::default()
            .validate(&client)
            .await
            .map_err(|e| eyre!("Validation failed to run: {}", e))?;

        for issue in &report.unparented {
            tracing::warn!(id = %issue.entity_id, name = %issue.entity_name, "{}", issue.issue);
        }

        if !report.passed() {
            bail!(
                "{} invalid parents, {} duplicate names",
                report.invalid_parents.len(),
                report.duplicates.len()
            );
        }
        tracing::info!(warnings = report.warnings(), "Store passed integrity validation");
        Ok(())
    }
}
