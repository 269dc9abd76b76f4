//! Extraction of catalog candidates from a legacy snapshot.

use std::collections::HashMap;

use crate::models::{BREED, SPECIES};
use crate::snapshot::{Record, Snapshot};

/// Legacy table holding catalog rows.
pub const LEGACY_CATALOG_TABLE: &str = "catalogs";

/// Legacy table whose rows carry denormalized taxonomy text.
pub const LEGACY_ANIMAL_TABLE: &str = "animals";

/// Flat categories stored as text columns on legacy animal rows.
const ANIMAL_FLAT_COLUMNS: &[&str] = &["size", "status", "color"];

/// A raw `(category, name, parent)` triple as found in the legacy data.
///
/// Values are kept raw; the reconciler normalizes them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogCandidate {
    /// Legacy catalog row id, when the value came from a catalog row.
    pub legacy_key: Option<String>,
    pub category: String,
    pub name: String,
    pub parent_name: Option<String>,
    pub scope: Option<String>,
    pub active: bool,
}

impl CatalogCandidate {
    pub fn new(category: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            legacy_key: None,
            category: category.into(),
            name: name.into(),
            parent_name: None,
            scope: None,
            active: true,
        }
    }

    pub fn with_legacy_key(mut self, key: impl Into<String>) -> Self {
        self.legacy_key = Some(key.into());
        self
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent_name = Some(parent.into());
        self
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }
}

/// Collects candidates from the legacy catalog rows and animal text columns.
pub fn extract_candidates(snapshot: &Snapshot) -> Vec<CatalogCandidate> {
    let mut candidates = from_catalog_rows(snapshot.table(LEGACY_CATALOG_TABLE));
    candidates.extend(from_animal_rows(snapshot.table(LEGACY_ANIMAL_TABLE)));
    candidates
}

fn from_catalog_rows(rows: &[Record]) -> Vec<CatalogCandidate> {
    let names_by_id: HashMap<String, String> = rows
        .iter()
        .filter_map(|row| Some((row.legacy_id()?, row.text("name")?)))
        .collect();

    rows.iter()
        .map(|row| {
            // Parents are referenced by name or by legacy row id
            let parent_name = row.text("parent").or_else(|| {
                row.text("parent_id")
                    .and_then(|id| names_by_id.get(&id).cloned())
            });

            CatalogCandidate {
                legacy_key: row.legacy_id(),
                category: row.text("category").unwrap_or_default(),
                name: row.text("name").unwrap_or_default(),
                parent_name,
                scope: row.text("shelter_id"),
                // An unreadable flag keeps the entry active
                active: row.flag("active").ok().flatten().unwrap_or(true),
            }
        })
        .collect()
}

fn from_animal_rows(rows: &[Record]) -> Vec<CatalogCandidate> {
    let mut candidates = Vec::new();

    for row in rows {
        let species = row.text(SPECIES);
        if let Some(species) = &species {
            candidates.push(CatalogCandidate::new(SPECIES, species.clone()));
        }

        if let Some(breed) = row.text(BREED) {
            let mut candidate = CatalogCandidate::new(BREED, breed);
            candidate.parent_name = species.clone();
            candidates.push(candidate);
        }

        for column in ANIMAL_FLAT_COLUMNS {
            if let Some(value) = row.text(column) {
                candidates.push(CatalogCandidate::new(*column, value));
            }
        }
    }

    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_from_catalog_rows() {
        let snapshot = Snapshot::from_json(
            r#"{"catalogs": [
                {"id": 1, "category": "animal_species", "name": "Cachorro"},
                {"id": 2, "category": "breed_dog", "name": "Labrador", "parent_id": 1, "shelter_id": "s1"},
                {"id": 3, "category": "status", "name": "Adotado", "active": 0}
            ]}"#,
        )
        .unwrap();

        let candidates = extract_candidates(&snapshot);
        assert_eq!(candidates.len(), 3);

        let labrador = &candidates[1];
        assert_eq!(labrador.legacy_key.as_deref(), Some("2"));
        assert_eq!(labrador.parent_name.as_deref(), Some("Cachorro"));
        assert_eq!(labrador.scope.as_deref(), Some("s1"));
        assert!(labrador.active);
        assert!(!candidates[2].active);
    }

    #[test]
    fn test_extract_from_animal_text_columns() {
        let snapshot = Snapshot::from_json(
            r#"{"animals": [
                {"id": 1, "name": "Rex", "species": "Cachorro", "breed": "Poodle", "status": "disponivel"},
                {"id": 2, "name": "Mia", "species_id": 4, "breed": null}
            ]}"#,
        )
        .unwrap();

        let candidates = extract_candidates(&snapshot);
        assert_eq!(
            candidates,
            vec![
                CatalogCandidate::new("species", "Cachorro"),
                CatalogCandidate::new("breed", "Poodle").with_parent("Cachorro"),
                CatalogCandidate::new("status", "disponivel"),
            ]
        );
    }
}
