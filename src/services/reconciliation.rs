//! The reconciliation pipeline.
//!
//! Stages run strictly in order, each in its own transaction:
//! species → breed → flat catalogs → medications → animals →
//! prescriptions → prescription tasks, followed by the integrity
//! validator. The mapping only receives a stage's entries once that
//! stage has committed, so after a failure it reflects exactly what is
//! in the store and the run can be resumed from it.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::validation::{IntegrityReport, IntegrityValidator};
use crate::catalog::{
    extract_candidates, CatalogCandidate, CatalogIndex, CatalogStage, Reconciler, StageReport,
};
use crate::config::MigrationConfig;
use crate::dependents::{DependentMigrator, TableReport};
use crate::error::AppError;
use crate::mapping::{Domain, IdMapping};
use crate::snapshot::Snapshot;
use crate::store::{CatalogExecutor, StoreClient, Transaction};

/// Everything a run did, serializable for the JSON report.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub stages: Vec<StageReport>,
    pub tables: Vec<TableReport>,
    /// Mapping size per domain at the end of the run.
    pub mapping: BTreeMap<Domain, usize>,
    pub integrity: IntegrityReport,
}

impl RunReport {
    /// Whether the validator found no regression.
    pub fn passed(&self) -> bool {
        self.integrity.passed()
    }

    /// Mapping conflicts across all stages.
    pub fn conflicts(&self) -> usize {
        self.stages.iter().map(|s| s.conflicts.len()).sum::<usize>()
            + self.tables.iter().map(|t| t.conflicts.len()).sum::<usize>()
    }

    /// Writes the report as pretty JSON.
    pub fn write(&self, path: &Path) -> Result<(), AppError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        tracing::info!(path = %path.display(), "Wrote run report");
        Ok(())
    }

    /// Logs the summary as structured events.
    pub fn log(&self) {
        for stage in &self.stages {
            for (category, counts) in &stage.categories {
                tracing::info!(
                    stage = %stage.stage,
                    category = %category,
                    inserted = counts.inserted,
                    reused = counts.reused,
                    updated = counts.updated,
                    merged = counts.merged,
                    recategorized = counts.recategorized,
                    unparented = counts.unparented,
                    unresolved = counts.unresolved,
                    "Catalog category"
                );
            }
        }
        for table in &self.tables {
            tracing::info!(
                table = %table.table,
                total = table.total,
                migrated = table.migrated(),
                skipped = table.skipped,
                errors = table.errors.len(),
                skip_reasons = ?table.skip_reasons,
                "Dependent table"
            );
        }
        tracing::info!(
            passed = self.passed(),
            conflicts = self.conflicts(),
            warnings = self.integrity.warnings(),
            mapping = ?self.mapping,
            elapsed_ms = (self.finished_at - self.started_at).num_milliseconds(),
            "Run finished"
        );
    }
}

/// Runs the pipeline against a store.
pub struct ReconciliationService<'a, C> {
    client: &'a C,
    config: &'a MigrationConfig,
}

impl<'a, C: StoreClient> ReconciliationService<'a, C> {
    pub fn new(client: &'a C, config: &'a MigrationConfig) -> Self {
        Self { client, config }
    }

    /// Runs every stage over `snapshot`, extending `mapping`.
    ///
    /// Stops at the first structural error; stages committed before it stay.
    pub async fn run(&self, snapshot: &Snapshot, mapping: &mut IdMapping) -> Result<RunReport, AppError> {
        let started_at = Utc::now();
        let candidates = extract_candidates(snapshot);
        tracing::info!(candidates = candidates.len(), "Extracted catalog candidates");

        let mut stages = Vec::with_capacity(CatalogStage::all().len());
        for stage in CatalogStage::all() {
            stages.push(self.reconcile_stage(*stage, &candidates, mapping).await?);
        }
        self.check_required_categories().await?;

        let tables = DependentMigrator::new(snapshot, &self.config.defaults)
            .migrate_all(self.client, mapping)
            .await?;

        let integrity = IntegrityValidator::default().validate(self.client).await?;

        Ok(RunReport {
            started_at,
            finished_at: Utc::now(),
            stages,
            tables,
            mapping: mapping.counts(),
            integrity,
        })
    }

    /// Reconciles one catalog stage in its own transaction.
    pub async fn reconcile_stage(
        &self,
        stage: CatalogStage,
        candidates: &[CatalogCandidate],
        mapping: &mut IdMapping,
    ) -> Result<StageReport, AppError> {
        let mut staged = mapping.clone();

        let txn = self.client.begin().await?;
        let report = match apply_stage(&txn, stage, candidates, &mut staged).await {
            Ok(report) => {
                txn.commit().await?;
                report
            }
            Err(e) => {
                tracing::error!(stage = %stage, error = %e, "Catalog stage failed");
                txn.rollback().await?;
                return Err(e);
            }
        };
        *mapping = staged;

        let totals = report.totals();
        tracing::info!(
            stage = %stage,
            inserted = totals.inserted,
            reused = totals.reused,
            updated = totals.updated,
            merged = totals.merged,
            recategorized = totals.recategorized,
            unparented = totals.unparented,
            unresolved = totals.unresolved,
            conflicts = report.conflicts.len(),
            "Catalog stage committed"
        );
        Ok(report)
    }

    /// Fails when a required category ended up with no entries.
    async fn check_required_categories(&self) -> Result<(), AppError> {
        let txn = self.client.begin().await?;
        let entries = match txn.load_catalog().await {
            Ok(entries) => {
                txn.commit().await?;
                entries
            }
            Err(e) => {
                txn.rollback().await?;
                return Err(e);
            }
        };

        for category in &self.config.required_categories {
            if !entries.iter().any(|e| &e.category == category) {
                return Err(AppError::MissingCategory(category.clone()));
            }
        }
        Ok(())
    }
}

async fn apply_stage<T: CatalogExecutor>(
    txn: &T,
    stage: CatalogStage,
    candidates: &[CatalogCandidate],
    mapping: &mut IdMapping,
) -> Result<StageReport, AppError> {
    let mut index = CatalogIndex::from_entries(txn.load_catalog().await?);
    let outcome = Reconciler::default().reconcile(stage, &mut index, candidates, mapping);

    tracing::debug!(stage = %stage, changes = outcome.changes.len(), "Applying catalog changes");
    for change in &outcome.changes {
        txn.apply_catalog_change(change).await?;
    }
    Ok(outcome.report)
}
