//! Dependent-record migration.
//!
//! Legacy rows of the tables that reference catalogs (or each other) are
//! mapped to target rows, their foreign keys resolved through the
//! [`IdMapping`], and written with upsert-or-skip under the table's
//! natural key. Every table runs in one transaction; a bad record is
//! counted and skipped without aborting its table.

mod animal;
mod dates;
mod medication;
mod prescription;
mod resolve;
mod task;

pub use animal::AnimalMapper;
pub use dates::{date_field, datetime_field, parse_date, parse_datetime};
pub use medication::MedicationMapper;
pub use prescription::PrescriptionMapper;
pub use resolve::{CatalogCategories, RefResolver, Resolution};
pub use task::TaskMapper;

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::FieldDefaults;
use crate::error::AppError;
use crate::mapping::{Domain, IdMapping, MappingConflict};
use crate::models::{DependentRow, DependentTable, UpsertOutcome};
use crate::snapshot::{Record, RecordError, Snapshot};
use crate::store::{CatalogExecutor, RecordExecutor, StoreClient, Transaction};

/// Result of mapping one legacy record.
#[derive(Debug, Clone, PartialEq)]
pub enum Mapped {
    Row(DependentRow),
    /// A required reference did not resolve; the reason is reported.
    Skip(&'static str),
}

/// Maps legacy records of one table to target rows.
pub trait RecordMapper: Send + Sync {
    /// Target table.
    fn table(&self) -> DependentTable;

    /// Legacy snapshot table read from.
    fn source_table(&self) -> &'static str;

    /// Transforms a record, resolving its references through `refs`.
    fn map(&self, record: &Record, refs: &mut RefResolver<'_>) -> Result<Mapped, RecordError>;
}

/// A record that could not be migrated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordFailure {
    /// Natural identity of the record, e.g. `animals(legacy_id=3)`.
    pub identity: String,
    pub message: String,
}

/// Outcome of migrating one table.
///
/// `total == inserted + existing + skipped + errors.len()`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TableReport {
    pub table: String,
    pub total: usize,
    pub inserted: usize,
    /// Rows already present under their natural key.
    pub existing: usize,
    pub skipped: usize,
    pub skip_reasons: BTreeMap<String, usize>,
    /// Optional catalog references stored as null.
    pub optional_unresolved: usize,
    pub errors: Vec<RecordFailure>,
    pub conflicts: Vec<MappingConflict>,
}

impl TableReport {
    pub fn new(table: DependentTable) -> Self {
        Self {
            table: table.name().to_string(),
            ..Self::default()
        }
    }

    /// Rows now present in the target table for this run's records.
    pub fn migrated(&self) -> usize {
        self.inserted + self.existing
    }

    fn skip(&mut self, reason: &str) {
        self.skipped += 1;
        *self.skip_reasons.entry(reason.to_string()).or_default() += 1;
    }

    fn fail(&mut self, identity: String, message: String) {
        tracing::warn!(table = %self.table, record = %identity, error = %message, "Record not migrated");
        self.errors.push(RecordFailure { identity, message });
    }
}

/// Migrates dependent tables in reference order.
pub struct DependentMigrator<'s> {
    snapshot: &'s Snapshot,
    mappers: Vec<Box<dyn RecordMapper>>,
}

impl<'s> DependentMigrator<'s> {
    pub fn new(snapshot: &'s Snapshot, defaults: &FieldDefaults) -> Self {
        Self {
            snapshot,
            mappers: vec![
                Box::new(MedicationMapper),
                Box::new(AnimalMapper),
                Box::new(PrescriptionMapper::new(defaults.clone())),
                Box::new(TaskMapper),
            ],
        }
    }

    /// Migrates every table: medications, animals, prescriptions, tasks.
    pub async fn migrate_all<C: StoreClient>(
        &self,
        client: &C,
        mapping: &mut IdMapping,
    ) -> Result<Vec<TableReport>, AppError> {
        let mut reports = Vec::with_capacity(self.mappers.len());
        for mapper in &self.mappers {
            reports.push(self.migrate_table(client, mapper.as_ref(), mapping).await?);
        }
        Ok(reports)
    }

    /// Migrates one table in its own transaction.
    ///
    /// `mapping` only receives the table's entries once the transaction
    /// has committed.
    pub async fn migrate_table<C: StoreClient>(
        &self,
        client: &C,
        mapper: &dyn RecordMapper,
        mapping: &mut IdMapping,
    ) -> Result<TableReport, AppError> {
        let records = self.snapshot.table(mapper.source_table());
        let mut report = TableReport::new(mapper.table());
        let mut staged = mapping.clone();

        tracing::info!(table = %report.table, records = records.len(), "Migrating table");

        let txn = client.begin().await?;
        let categories: CatalogCategories = match txn.load_catalog().await {
            Ok(entries) => entries.into_iter().map(|e| (e.id, e.category)).collect(),
            Err(e) => {
                txn.rollback().await?;
                return Err(e);
            }
        };

        for (position, record) in records.iter().enumerate() {
            report.total += 1;
            if let Err(e) = migrate_record(
                &txn,
                mapper,
                position,
                record,
                &categories,
                &mut staged,
                &mut report,
            )
            .await
            {
                tracing::error!(table = %report.table, error = %e, "Table migration aborted");
                txn.rollback().await?;
                return Err(e);
            }
        }
        txn.commit().await?;
        *mapping = staged;

        tracing::info!(
            table = %report.table,
            total = report.total,
            inserted = report.inserted,
            existing = report.existing,
            skipped = report.skipped,
            errors = report.errors.len(),
            optional_unresolved = report.optional_unresolved,
            "Table migrated"
        );
        Ok(report)
    }
}

/// Migrates a single record; only structural errors are returned.
async fn migrate_record<T: RecordExecutor>(
    txn: &T,
    mapper: &dyn RecordMapper,
    position: usize,
    record: &Record,
    categories: &CatalogCategories,
    mapping: &mut IdMapping,
    report: &mut TableReport,
) -> Result<(), AppError> {
    let (mapped, unresolved) = {
        let mut refs = RefResolver::new(mapping, categories);
        let mapped = mapper.map(record, &mut refs);
        (mapped, refs.optional_unresolved())
    };

    let row = match mapped {
        Ok(Mapped::Row(row)) => row,
        Ok(Mapped::Skip(reason)) => {
            tracing::debug!(
                table = %report.table,
                legacy_key = ?record.legacy_id(),
                reason,
                "Record skipped"
            );
            report.skip(reason);
            return Ok(());
        }
        Err(e) => {
            let identity = match record.legacy_id() {
                Some(id) => format!("{}(legacy_id={})", mapper.table(), id),
                None => format!("{}[{}]", mapper.source_table(), position),
            };
            report.fail(identity, e.to_string());
            return Ok(());
        }
    };
    report.optional_unresolved += unresolved;

    match txn.upsert_or_skip(&row).await {
        Ok(outcome) => {
            match &outcome {
                UpsertOutcome::Inserted(_) => report.inserted += 1,
                UpsertOutcome::Existing(_) => report.existing += 1,
            }
            if let Some(legacy_id) = row.get_str("legacy_id") {
                let domain = Domain::for_table(row.table);
                if let Err(conflict) = mapping.put(domain, legacy_id, outcome.id()) {
                    tracing::warn!(error = %conflict, "ID mapping conflict");
                    report.conflicts.push(conflict);
                }
            }
            Ok(())
        }
        Err(e) if e.is_record_level() => {
            report.fail(row.identity(), e.to_string());
            Ok(())
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_DOSAGE;
    use crate::models::CatalogEntry;
    use crate::store::backends::memory::MemoryStore;

    fn species_store() -> (MemoryStore, IdMapping) {
        let store = MemoryStore::new();
        store.seed_catalog(vec![CatalogEntry {
            id: "CAO".to_string(),
            category: "species".to_string(),
            name: "Cão".to_string(),
            parent_id: None,
            shelter_scope: None,
            active: true,
        }]);
        let mut mapping = IdMapping::new();
        mapping.put(Domain::Species, "cão", "CAO").unwrap();
        (store, mapping)
    }

    fn snapshot(json: &str) -> Snapshot {
        Snapshot::from_json(json).unwrap()
    }

    #[tokio::test]
    async fn test_malformed_records_are_isolated() {
        let (store, mut mapping) = species_store();
        let snapshot = snapshot(
            r#"{"animals": [
                {"id": 1, "name": "Rex", "species": "Cachorro", "birth_date": "12/03/2019"},
                {"id": 2, "name": "Bolt", "species": "cão", "birth_date": "ontem"},
                {"id": 3, "name": "Thor", "species": "dog"},
                {"name": "Sem id", "species": "Cão"},
                {"id": 5, "name": "Luna", "species": "Cão", "birth_date": "2020-01-31"}
            ]}"#,
        );
        let migrator = DependentMigrator::new(&snapshot, &FieldDefaults::default());

        let report = migrator
            .migrate_table(&store, &AnimalMapper, &mut mapping)
            .await
            .unwrap();

        assert_eq!(report.total, 5);
        assert_eq!(report.inserted, 3);
        assert_eq!(report.errors.len(), 2);
        assert_eq!(report.errors[0].identity, "animals(legacy_id=2)");
        assert_eq!(report.errors[1].identity, "animals[3]");
        assert_eq!(store.rows(DependentTable::Animals).len(), 3);
        assert!(mapping.contains(Domain::Animal, "5"));
        assert!(!mapping.contains(Domain::Animal, "2"));
    }

    #[tokio::test]
    async fn test_prescription_with_unmapped_medication_is_skipped() {
        let (store, mut mapping) = species_store();
        let snapshot = snapshot(
            r#"{
                "animals": [{"id": 3, "name": "Rex", "species": "Cão"}],
                "prescriptions": [{"id": 9, "animal_id": 3, "medication_id": 7, "frequency_hours": 12}]
            }"#,
        );
        let migrator = DependentMigrator::new(&snapshot, &FieldDefaults::default());

        let reports = migrator.migrate_all(&store, &mut mapping).await.unwrap();
        let prescriptions = &reports[2];

        assert_eq!(prescriptions.table, "prescriptions");
        assert_eq!(prescriptions.skipped, 1);
        assert_eq!(prescriptions.skip_reasons["medication not migrated"], 1);
        assert_eq!(prescriptions.migrated(), 0);
        assert!(store.rows(DependentTable::Prescriptions).is_empty());
    }

    #[tokio::test]
    async fn test_full_chain_with_defaults() {
        let (store, mut mapping) = species_store();
        let snapshot = snapshot(
            r#"{
                "medications": [{"id": 7, "name": "Amoxicilina", "unit": "mg"}, {"id": 8, "name": "amoxicilina "}],
                "animals": [{"id": 3, "name": "Rex", "species": "Cão", "color": "Tigrado"}],
                "prescriptions": [
                    {"id": 9, "animal_id": 3, "medication_id": 8, "dosage": null, "frequency_hours": "12", "start_date": "2024-01-02"},
                    {"id": 10, "animal_id": 4, "medication_id": 7}
                ],
                "prescription_tasks": [
                    {"id": 40, "prescription_id": 9, "scheduled_at": "2024-01-02 08:00", "done": true},
                    {"id": 41, "prescription_id": 9, "scheduled_at": "02/01/2024 08:00"},
                    {"id": 42, "prescription_id": 10, "scheduled_at": "2024-01-02 20:00"}
                ]
            }"#,
        );
        let migrator = DependentMigrator::new(&snapshot, &FieldDefaults::default());

        let reports = migrator.migrate_all(&store, &mut mapping).await.unwrap();
        let [medications, animals, prescriptions, tasks] = reports.as_slice() else {
            panic!("expected four reports");
        };

        // Same name, one row
        assert_eq!((medications.inserted, medications.existing), (1, 1));
        assert_eq!(
            mapping.get(Domain::Medication, "7"),
            mapping.get(Domain::Medication, "8")
        );

        assert_eq!(animals.inserted, 1);
        assert_eq!(animals.optional_unresolved, 1);
        let animal = &store.rows(DependentTable::Animals)[0];
        assert_eq!(animal.get_str("species_id"), Some("CAO"));
        assert_eq!(animal.fields["color_id"], serde_json::Value::Null);

        assert_eq!(prescriptions.inserted, 1);
        assert_eq!(prescriptions.skip_reasons["no animal mapping"], 1);
        let prescription = &store.rows(DependentTable::Prescriptions)[0];
        assert_eq!(prescription.get_str("dosage"), Some(DEFAULT_DOSAGE));
        assert_eq!(prescription.get_str("route"), Some("Oral"));
        assert_eq!(prescription.fields["frequency_hours"], serde_json::json!(12));

        // 40 and 41 share (prescription, scheduled_at)
        assert_eq!((tasks.inserted, tasks.existing, tasks.skipped), (1, 1, 1));
        assert_eq!(tasks.skip_reasons["prescription not migrated"], 1);
    }

    #[tokio::test]
    async fn test_rerun_finds_existing_rows() {
        let (store, mut mapping) = species_store();
        let snapshot = snapshot(
            r#"{"medications": [{"id": 7, "name": "Amoxicilina"}, {"id": 8, "name": "Dipirona"}]}"#,
        );
        let migrator = DependentMigrator::new(&snapshot, &FieldDefaults::default());

        let first = migrator
            .migrate_table(&store, &MedicationMapper, &mut mapping)
            .await
            .unwrap();
        let after_first = mapping.clone();
        let second = migrator
            .migrate_table(&store, &MedicationMapper, &mut mapping)
            .await
            .unwrap();

        assert_eq!(first.inserted, 2);
        assert_eq!((second.inserted, second.existing), (0, 2));
        assert!(second.conflicts.is_empty());
        assert_eq!(mapping, after_first);
    }

    #[tokio::test]
    async fn test_store_rejection_is_recorded() {
        let (store, mut mapping) = species_store();
        // Mapped, but the animal row is gone from the store
        mapping.put(Domain::Animal, "3", "MISSING").unwrap();
        let snapshot = snapshot(
            r#"{
                "medications": [{"id": 7, "name": "Amoxicilina"}],
                "animals": [{"id": 4, "name": "Mia", "species": "Cão"}],
                "prescriptions": [
                    {"id": 9, "animal_id": 3, "medication_id": 7},
                    {"id": 10, "animal_id": 4, "medication_id": 7}
                ]
            }"#,
        );
        let migrator = DependentMigrator::new(&snapshot, &FieldDefaults::default());

        let reports = migrator.migrate_all(&store, &mut mapping).await.unwrap();
        let prescriptions = &reports[2];

        assert_eq!(prescriptions.inserted, 1);
        assert_eq!(prescriptions.errors.len(), 1);
        assert!(prescriptions.errors[0].identity.contains("legacy_id=9"));
        assert!(!mapping.contains(Domain::Prescription, "9"));
    }

    #[tokio::test]
    async fn test_catalog_id_of_wrong_category_is_not_used() {
        let (store, mut mapping) = species_store();
        mapping.put(Domain::Catalog, "1", "CAO").unwrap();
        let snapshot = snapshot(
            r#"{"animals": [{"id": 9, "name": "Rex", "species": "Cão", "status_id": 1}]}"#,
        );
        let migrator = DependentMigrator::new(&snapshot, &FieldDefaults::default());

        let report = migrator
            .migrate_table(&store, &AnimalMapper, &mut mapping)
            .await
            .unwrap();

        assert_eq!(report.inserted, 1);
        assert_eq!(report.optional_unresolved, 1);
        let animals = store.rows(DependentTable::Animals);
        let rex = &animals[0];
        assert_eq!(rex.get_str("species_id"), Some("CAO"));
        assert_eq!(rex.get_str("status_id"), None);
    }

    #[tokio::test]
    async fn test_species_required() {
        let (store, mut mapping) = species_store();
        let snapshot = snapshot(
            r#"{"animals": [{"id": 1, "species": "Papagaio"}, {"id": 2}]}"#,
        );
        let migrator = DependentMigrator::new(&snapshot, &FieldDefaults::default());

        let report = migrator
            .migrate_table(&store, &AnimalMapper, &mut mapping)
            .await
            .unwrap();

        assert_eq!(report.skip_reasons["species not reconciled"], 2);
        assert_eq!(report.migrated(), 0);
    }
}
