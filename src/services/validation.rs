//! Integrity checks over the reconciled store.

use serde::Serialize;

use crate::catalog::CatalogIndex;
use crate::error::AppError;
use crate::models::OrphanRef;
use crate::normalize::{RuleSet, RULES};
use crate::store::{CatalogExecutor, RecordExecutor, StoreClient, Transaction};

/// A problem with a single catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    /// Entry ID.
    pub entity_id: String,
    /// Entry name.
    pub entity_name: String,
    /// Description of the issue.
    pub issue: String,
}

/// Entries sharing `(category, fold(name), scope)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateName {
    pub category: String,
    pub name: String,
    pub scope: Option<String>,
    /// Ids, oldest first.
    pub ids: Vec<String>,
}

/// Findings of the integrity validator.
///
/// Orphans and unparented entries are warnings. Invalid parents and
/// duplicate names are regressions and fail the run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IntegrityReport {
    pub orphans: Vec<OrphanRef>,
    pub unparented: Vec<ValidationIssue>,
    pub invalid_parents: Vec<ValidationIssue>,
    pub duplicates: Vec<DuplicateName>,
}

impl IntegrityReport {
    /// Whether the store is free of regressions.
    pub fn passed(&self) -> bool {
        self.invalid_parents.is_empty() && self.duplicates.is_empty()
    }

    pub fn warnings(&self) -> usize {
        self.orphans.len() + self.unparented.len()
    }
}

/// Validates hierarchy and uniqueness invariants.
#[derive(Debug, Clone, Copy)]
pub struct IntegrityValidator<'r> {
    rules: &'r RuleSet,
}

impl Default for IntegrityValidator<'static> {
    fn default() -> Self {
        Self { rules: &RULES }
    }
}

impl<'r> IntegrityValidator<'r> {
    pub fn new(rules: &'r RuleSet) -> Self {
        Self { rules }
    }

    /// Loads the store in one transaction and checks it.
    pub async fn validate<C: StoreClient>(&self, client: &C) -> Result<IntegrityReport, AppError> {
        let txn = client.begin().await?;
        let loaded = async {
            let entries = txn.load_catalog().await?;
            let orphans = txn.find_orphans().await?;
            Ok::<_, AppError>((entries, orphans))
        }
        .await;
        let (entries, orphans) = match loaded {
            Ok(loaded) => {
                txn.commit().await?;
                loaded
            }
            Err(e) => {
                txn.rollback().await?;
                return Err(e);
            }
        };

        let mut report = self.check_catalog(&CatalogIndex::from_entries(entries));
        report.orphans = orphans;

        for orphan in &report.orphans {
            tracing::warn!(
                table = %orphan.table,
                record = %orphan.record_id,
                column = %orphan.column,
                missing = %orphan.missing_id,
                "Dangling reference"
            );
        }
        tracing::info!(
            passed = report.passed(),
            orphans = report.orphans.len(),
            unparented = report.unparented.len(),
            invalid_parents = report.invalid_parents.len(),
            duplicates = report.duplicates.len(),
            "Integrity validation finished"
        );
        Ok(report)
    }

    /// Checks the catalog hierarchy and name uniqueness.
    pub fn check_catalog(&self, index: &CatalogIndex) -> IntegrityReport {
        let mut report = IntegrityReport::default();

        for entry in index.sorted() {
            let Some(parent_category) = self.rules.parent_category(&entry.category) else {
                continue;
            };

            let issue = |issue: String| ValidationIssue {
                entity_id: entry.id.clone(),
                entity_name: entry.name.clone(),
                issue,
            };

            match entry.parent_id.as_deref().map(|id| (id, index.get(id))) {
                None => report
                    .unparented
                    .push(issue(format!("{} has no {} parent", entry.category, parent_category))),
                Some((id, None)) => report
                    .invalid_parents
                    .push(issue(format!("parent {} does not exist", id))),
                Some((id, Some(parent))) if parent.category != parent_category => {
                    report.invalid_parents.push(issue(format!(
                        "parent {} is a {}, expected {}",
                        id, parent.category, parent_category
                    )))
                }
                Some(_) => {}
            }
        }

        for (key, ids) in index.duplicate_keys() {
            let name = ids
                .first()
                .and_then(|id| index.get(id))
                .map(|e| e.name.clone())
                .unwrap_or_else(|| key.name.clone());
            tracing::error!(key = %key, ids = ?ids, "Duplicate catalog name");
            report.duplicates.push(DuplicateName {
                category: key.category.clone(),
                name,
                scope: key.scope.clone(),
                ids: ids.to_vec(),
            });
        }

        for issue in &report.invalid_parents {
            tracing::error!(id = %issue.entity_id, name = %issue.entity_name, issue = %issue.issue, "Invalid hierarchy");
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CatalogEntry, DependentRow, DependentTable};
    use crate::store::backends::memory::MemoryStore;

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

    #[test]
    fn test_clean_catalog_passes() {
        let index = CatalogIndex::from_entries(vec![
            entry("1", "species", "Cão", None),
            entry("2", "breed", "Labrador", Some("1")),
            entry("3", "breed", "Poodle", Some("1")),
            entry("4", "size", "Grande", None),
        ]);

        let report = IntegrityValidator::default().check_catalog(&index);
        assert!(report.passed());
        assert_eq!(report.warnings(), 0);
    }

    #[test]
    fn test_unparented_is_a_warning() {
        let index = CatalogIndex::from_entries(vec![entry("2", "breed", "Beagle", None)]);

        let report = IntegrityValidator::default().check_catalog(&index);
        assert!(report.passed());
        assert_eq!(report.unparented.len(), 1);
        assert_eq!(report.unparented[0].entity_id, "2");
    }

    #[test]
    fn test_flat_rule_set_expects_no_parents() {
        static FLAT: &[crate::normalize::CategoryRule] = &[crate::normalize::CategoryRule {
            category: "breed",
            parent: None,
            synonyms: &[],
        }];
        let rules = RuleSet::new(FLAT, &[]);
        let index = CatalogIndex::from_entries(vec![entry("2", "breed", "Beagle", None)]);

        let report = IntegrityValidator::new(&rules).check_catalog(&index);
        assert!(report.passed());
        assert!(report.unparented.is_empty());
    }

    #[test]
    fn test_breed_under_non_species_is_a_regression() {
        let index = CatalogIndex::from_entries(vec![
            entry("1", "size", "Grande", None),
            entry("2", "breed", "Labrador", Some("1")),
        ]);

        let report = IntegrityValidator::default().check_catalog(&index);
        assert!(!report.passed());
        assert!(report.invalid_parents[0].issue.contains("is a size"));
    }

    #[test]
    fn test_duplicate_names_are_a_regression() {
        let index = CatalogIndex::from_entries(vec![
            entry("1", "status", "Adotado", None),
            entry("2", "status", "ADOTADO ", None),
            entry("3", "status", "Adotado", None),
        ]);

        let report = IntegrityValidator::default().check_catalog(&index);
        assert!(!report.passed());
        assert_eq!(report.duplicates.len(), 1);
        assert_eq!(report.duplicates[0].ids, vec!["1", "2", "3"]);
        assert_eq!(report.duplicates[0].name, "Adotado");
    }

    #[tokio::test]
    async fn test_validate_reports_orphans() {
        let store = MemoryStore::new();
        store.seed_catalog(vec![entry("1", "species", "Cão", None)]);
        let mut animal = DependentRow::new(DependentTable::Animals);
        animal
            .set("legacy_id", Some("3"))
            .set("species_id", Some("1"))
            .set("breed_id", Some("gone"));
        store.seed_row(animal);

        let report = IntegrityValidator::default().validate(&store).await.unwrap();
        assert!(report.passed());
        assert_eq!(report.orphans.len(), 1);
        assert_eq!(report.orphans[0].column, "breed_id");
    }
}
