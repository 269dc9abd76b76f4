//! Reconcile command handler.

use std::path::PathBuf;

use color_eyre::eyre::{bail, eyre, Result};

use crate::config::{Config, MigrationConfig};
use crate::error::AppError;
use crate::mapping::IdMapping;
use crate::services::{ReconciliationService, RunReport};
use crate::snapshot::Snapshot;
use crate::store::backends::memory::MemoryStore;
use crate::store::StoreClient;

use super::{connect, App};

impl App {
    /// Run the reconciliation pipeline.
    ///
    /// The mapping is exported even when the run fails, so the next run
    /// resumes from what was committed. Dry runs export nothing.
    pub async fn run_reconcile(
        &self,
        snapshot: Option<PathBuf>,
        mapping: Option<PathBuf>,
        report: Option<PathBuf>,
        dry_run: bool,
    ) -> Result<()> {
        let mut config = Config::load()?;
        let migration = &mut config.migration;
        migration.snapshot = snapshot.or(migration.snapshot.take());
        migration.mapping = mapping.or(migration.mapping.take());
        migration.report = report.or(migration.report.take());

        let snapshot_path = migration
            .snapshot
            .clone()
            .ok_or_else(|| eyre!("No snapshot given (--snapshot or migration.snapshot)"))?;
        let snapshot = Snapshot::load(&snapshot_path)?;

        let mut id_mapping = initial_mapping(&config.migration, dry_run)?;
        tracing::info!(entries = id_mapping.len(), dry_run, "Starting reconciliation");

        let result = if dry_run {
            let store = MemoryStore::new();
            execute(&store, &config.migration, &snapshot, &mut id_mapping).await
        } else {
            let client = connect(&config).await?;
            execute(&client, &config.migration, &snapshot, &mut id_mapping).await
        };

        if !dry_run {
            if let Some(path) = &config.migration.mapping {
                id_mapping.save(path)?;
                tracing::info!(path = %path.display(), entries = id_mapping.len(), "Exported ID mapping");
            }
        }

        let report = result.map_err(|e| eyre!("Reconciliation failed: {}", e))?;
        report.log();
        if let Some(path) = &config.migration.report {
            report.write(path)?;
        }

        if !report.passed() {
            bail!(
                "Integrity validation failed: {} invalid parents, {} duplicate names",
                report.integrity.invalid_parents.len(),
                report.integrity.duplicates.len()
            );
        }
        Ok(())
    }
}

/// Mapping a run starts from.
///
/// A dry run works on an empty in-memory store, so ids from an exported
/// mapping would point at rows it does not have; it starts empty.
fn initial_mapping(config: &MigrationConfig, dry_run: bool) -> Result<IdMapping, AppError> {
    match &config.mapping {
        Some(path) if !dry_run => IdMapping::load(path),
        _ => Ok(IdMapping::new()),
    }
}

async fn execute<C: StoreClient>(
    client: &C,
    config: &MigrationConfig,
    snapshot: &Snapshot,
    mapping: &mut IdMapping,
) -> Result<RunReport, AppError> {
    ReconciliationService::new(client, config)
        .run(snapshot, mapping)
        .await
}
