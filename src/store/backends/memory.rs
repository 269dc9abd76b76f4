//! In-memory backend.
//!
//! Backs `--dry-run` and the pipeline tests. It enforces the same
//! foreign-key and natural-key rules as the PostgreSQL schema so a run
//! behaves the same on both. A transaction works on a copy of the state
//! that replaces the shared state on commit.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::catalog::CatalogChange;
use crate::error::AppError;
use crate::models::{
    catalog_reference_columns, CatalogEntry, DependentRow, DependentTable, OrphanRef, RefTarget,
    UpsertOutcome,
};
use crate::store::traits::{CatalogExecutor, RecordExecutor, StoreClient, Transaction};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    catalogs: BTreeMap<String, CatalogEntry>,
    tables: BTreeMap<DependentTable, Vec<DependentRow>>,
}

impl MemoryState {
    fn rows(&self, table: DependentTable) -> &[DependentRow] {
        self.tables.get(&table).map(Vec::as_slice).unwrap_or_default()
    }

    fn exists(&self, target: RefTarget, id: &str) -> bool {
        match target {
            RefTarget::Catalog => self.catalogs.contains_key(id),
            RefTarget::Table(table) => self.rows(table).iter().any(|r| r.id() == id),
        }
    }

    /// Describes the first row still referencing catalog entry `id`.
    fn catalog_referrer(&self, id: &str) -> Option<String> {
        if let Some(child) = self
            .catalogs
            .values()
            .find(|e| e.parent_id.as_deref() == Some(id))
        {
            return Some(format!("catalogs({})", child.id));
        }

        catalog_reference_columns().find_map(|(table, column)| {
            self.rows(table)
                .iter()
                .find(|r| r.get_str(column) == Some(id))
                .map(|r| format!("{}.{}", r.identity(), column))
        })
    }

    fn check_parent(&self, entry: &CatalogEntry) -> Result<(), AppError> {
        match &entry.parent_id {
            Some(parent) if !self.catalogs.contains_key(parent) => Err(AppError::Constraint(
                format!("catalogs({}).parent_id references missing entry {}", entry.id, parent),
            )),
            _ => Ok(()),
        }
    }

    fn check_references(&self, row: &DependentRow) -> Result<(), AppError> {
        for reference in row.table.references() {
            match row.fields.get(reference.column) {
                Some(JsonValue::String(id)) => {
                    if !self.exists(reference.target, id) {
                        return Err(AppError::Constraint(format!(
                            "{}.{} references missing row {}",
                            row.identity(),
                            reference.column,
                            id
                        )));
                    }
                }
                None | Some(JsonValue::Null) if reference.required => {
                    return Err(AppError::Constraint(format!(
                        "{}.{} must not be null",
                        row.identity(),
                        reference.column
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn apply(&mut self, change: &CatalogChange) -> Result<(), AppError> {
        match change {
            CatalogChange::Insert(entry) => {
                if self.catalogs.contains_key(&entry.id) {
                    return Err(AppError::Constraint(format!(
                        "duplicate catalog id {}",
                        entry.id
                    )));
                }
                self.check_parent(entry)?;
                self.catalogs.insert(entry.id.clone(), entry.clone());
            }
            CatalogChange::Update(entry) => {
                if !self.catalogs.contains_key(&entry.id) {
                    return Err(AppError::CatalogEntryNotFound(entry.id.clone()));
                }
                self.check_parent(entry)?;
                self.catalogs.insert(entry.id.clone(), entry.clone());
            }
            CatalogChange::Repoint { from, to } => {
                for entry in self.catalogs.values_mut() {
                    if entry.parent_id.as_deref() == Some(from.as_str()) {
                        entry.parent_id = Some(to.clone());
                    }
                }
                for (table, column) in catalog_reference_columns() {
                    if let Some(rows) = self.tables.get_mut(&table) {
                        for row in rows.iter_mut() {
                            if row.get_str(column) == Some(from.as_str()) {
                                row.set(column, Some(to.clone()));
                            }
                        }
                    }
                }
            }
            CatalogChange::Delete(id) => {
                if let Some(referrer) = self.catalog_referrer(id) {
                    return Err(AppError::Constraint(format!(
                        "catalog entry {} is still referenced by {}",
                        id, referrer
                    )));
                }
                self.catalogs.remove(id);
            }
        }
        Ok(())
    }

    fn upsert(&mut self, row: &DependentRow) -> Result<UpsertOutcome, AppError> {
        self.check_references(row)?;

        let key = row.natural_key();
        if let Some(existing) = self.rows(row.table).iter().find(|r| r.natural_key() == key) {
            return Ok(UpsertOutcome::Existing(existing.id().to_string()));
        }

        self.tables.entry(row.table).or_default().push(row.clone());
        Ok(UpsertOutcome::Inserted(row.id().to_string()))
    }

    fn orphans(&self) -> Vec<OrphanRef> {
        let mut orphans = Vec::new();
        for table in DependentTable::all() {
            for reference in table.references() {
                for row in self.rows(*table) {
                    if let Some(id) = row.get_str(reference.column) {
                        if !self.exists(reference.target, id) {
                            orphans.push(OrphanRef {
                                table: table.name().to_string(),
                                record_id: row.id().to_string(),
                                column: reference.column.to_string(),
                                missing_id: id.to_string(),
                            });
                        }
                    }
                }
            }
        }
        orphans
    }
}

fn lock(state: &Mutex<MemoryState>) -> MutexGuard<'_, MemoryState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory store client.
///
/// Clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds catalog entries as found in a pre-existing database, unchecked.
    pub fn seed_catalog(&self, entries: impl IntoIterator<Item = CatalogEntry>) {
        let mut state = lock(&self.state);
        for entry in entries {
            state.catalogs.insert(entry.id.clone(), entry);
        }
    }

    /// Adds a dependent row as found in a pre-existing database, unchecked.
    pub fn seed_row(&self, row: DependentRow) {
        lock(&self.state).tables.entry(row.table).or_default().push(row);
    }

    /// Committed catalog entries, ordered by id.
    pub fn catalog(&self) -> Vec<CatalogEntry> {
        lock(&self.state).catalogs.values().cloned().collect()
    }

    /// Committed rows of a dependent table, in insertion order.
    pub fn rows(&self, table: DependentTable) -> Vec<DependentRow> {
        lock(&self.state).rows(table).to_vec()
    }
}

#[async_trait]
impl StoreClient for MemoryStore {
    type Tx<'a> = MemoryTransaction<'a>;

    async fn begin(&self) -> Result<Self::Tx<'_>, AppError> {
        let working = lock(&self.state).clone();
        Ok(MemoryTransaction {
            store: self,
            working: Mutex::new(working),
            finished: false,
        })
    }
}

/// A transaction over a private copy of the store state.
pub struct MemoryTransaction<'a> {
    store: &'a MemoryStore,
    working: Mutex<MemoryState>,
    finished: bool,
}

#[async_trait]
impl CatalogExecutor for MemoryTransaction<'_> {
    async fn load_catalog(&self) -> Result<Vec<CatalogEntry>, AppError> {
        Ok(lock(&self.working).catalogs.values().cloned().collect())
    }

    async fn apply_catalog_change(&self, change: &CatalogChange) -> Result<(), AppError> {
        lock(&self.working).apply(change)
    }
}

#[async_trait]
impl RecordExecutor for MemoryTransaction<'_> {
    async fn upsert_or_skip(&self, row: &DependentRow) -> Result<UpsertOutcome, AppError> {
        lock(&self.working).upsert(row)
    }

    async fn find_orphans(&self) -> Result<Vec<OrphanRef>, AppError> {
        Ok(lock(&self.working).orphans())
    }
}

#[async_trait]
impl Transaction for MemoryTransaction<'_> {
    async fn commit(mut self) -> Result<(), AppError> {
        self.finished = true;
        let working = std::mem::take(&mut *lock(&self.working));
        *lock(&self.store.state) = working;
        Ok(())
    }

    async fn rollback(mut self) -> Result<(), AppError> {
        self.finished = true;
        Ok(())
    }
}

impl Drop for MemoryTransaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!("MemoryTransaction dropped without commit or rollback - changes discarded");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, category: &str, name: &str, parent: Option<&str>) -> CatalogEntry {
        CatalogEntry {
            id: id.to_string(),
            category: category.to_string(),
            name: name.to_string(),
            parent_id: parent.map(str::to_string),
            shelter_scope: None,
            active: true,
        }
    }

    fn animal(legacy_id: &str, species_id: Option<&str>) -> DependentRow {
        let mut row = DependentRow::new(DependentTable::Animals);
        row.set("legacy_id", Some(legacy_id))
            .set("name", Some("Rex"))
            .set("species_id", species_id);
        row
    }

    #[tokio::test]
    async fn test_commit_publishes_and_rollback_discards() {
        let store = MemoryStore::new();

        let txn = store.begin().await.unwrap();
        txn.apply_catalog_change(&CatalogChange::Insert(entry("1", "species", "Cão", None)))
            .await
            .unwrap();
        txn.rollback().await.unwrap();
        assert!(store.catalog().is_empty());

        let txn = store.begin().await.unwrap();
        txn.apply_catalog_change(&CatalogChange::Insert(entry("1", "species", "Cão", None)))
            .await
            .unwrap();
        txn.commit().await.unwrap();
        assert_eq!(store.catalog().len(), 1);
    }

    #[tokio::test]
    async fn test_upsert_or_skip_by_natural_key() {
        let store = MemoryStore::new();
        store.seed_catalog(vec![entry("1", "species", "Cão", None)]);

        let txn = store.begin().await.unwrap();
        let first = animal("3", Some("1"));
        let inserted = txn.upsert_or_skip(&first).await.unwrap();
        assert_eq!(inserted, UpsertOutcome::Inserted(first.id().to_string()));

        let again = txn.upsert_or_skip(&animal("3", Some("1"))).await.unwrap();
        assert_eq!(again, UpsertOutcome::Existing(first.id().to_string()));
        txn.commit().await.unwrap();

        assert_eq!(store.rows(DependentTable::Animals).len(), 1);
    }

    #[tokio::test]
    async fn test_foreign_keys_are_enforced() {
        let store = MemoryStore::new();
        let txn = store.begin().await.unwrap();

        let missing = txn.upsert_or_skip(&animal("3", Some("404"))).await.unwrap_err();
        assert!(matches!(missing, AppError::Constraint(_)));
        let null = txn.upsert_or_skip(&animal("4", None)).await.unwrap_err();
        assert!(null.is_record_level());

        let orphan_parent = CatalogChange::Insert(entry("2", "breed", "SRD", Some("1")));
        assert!(txn.apply_catalog_change(&orphan_parent).await.is_err());
        txn.rollback().await.unwrap();
    }

    #[tokio::test]
    async fn test_repoint_then_delete() {
        let store = MemoryStore::new();
        store.seed_catalog(vec![
            entry("1", "animal_species", "Cachorro", None),
            entry("2", "species", "Cão", None),
            entry("3", "breed", "Poodle", Some("1")),
        ]);
        store.seed_row(animal("7", Some("1")));

        let txn = store.begin().await.unwrap();
        let delete = CatalogChange::Delete("1".into());
        let err = txn.apply_catalog_change(&delete).await.unwrap_err();
        assert!(matches!(err, AppError::Constraint(_)));

        txn.apply_catalog_change(&CatalogChange::Repoint {
            from: "1".into(),
            to: "2".into(),
        })
        .await
        .unwrap();
        txn.apply_catalog_change(&delete).await.unwrap();
        txn.commit().await.unwrap();

        let catalog = store.catalog();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog[1].parent_id.as_deref(), Some("2"));
        let animals = store.rows(DependentTable::Animals);
        assert_eq!(animals[0].get_str("species_id"), Some("2"));
    }

    #[tokio::test]
    async fn test_find_orphans() {
        let store = MemoryStore::new();
        store.seed_row(animal("7", Some("gone")));

        let txn = store.begin().await.unwrap();
        let orphans = txn.find_orphans().await.unwrap();
        txn.commit().await.unwrap();

        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].table, "animals");
        assert_eq!(orphans[0].column, "species_id");
        assert_eq!(orphans[0].missing_id, "gone");
    }
}
