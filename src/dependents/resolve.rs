//! Foreign-key resolution through the ID mapping.

use std::collections::HashMap;

use crate::mapping::{name_key, Domain, IdMapping};
use crate::normalize::normalize;
use crate::snapshot::Record;

/// Outcome of resolving one reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved(String),
    /// A value was given but maps to nothing.
    Unresolved,
    /// The record carries no value for the reference.
    Absent,
}

impl Resolution {
    pub fn id(&self) -> Option<&str> {
        match self {
            Resolution::Resolved(id) => Some(id),
            _ => None,
        }
    }
}

/// Category of every stored catalog entry, keyed by id.
pub type CatalogCategories = HashMap<String, String>;

/// Resolves legacy references of one record against the run's mapping.
///
/// Counts unresolved optional references so the migrator can report them.
#[derive(Debug)]
pub struct RefResolver<'m> {
    mapping: &'m IdMapping,
    categories: &'m CatalogCategories,
    optional_unresolved: usize,
}

impl<'m> RefResolver<'m> {
    pub fn new(mapping: &'m IdMapping, categories: &'m CatalogCategories) -> Self {
        Self {
            mapping,
            categories,
            optional_unresolved: 0,
        }
    }

    /// Resolves a catalog reference stored as `<field>_id` or as `<field>` text.
    ///
    /// The legacy id wins when it maps to an entry of the field's category;
    /// text is looked up by name key, shelter-local first, then global.
    pub fn catalog(&self, record: &Record, field: &str, scope: Option<&str>) -> Resolution {
        let legacy_id = record.text(&format!("{}_id", field));
        if let Some(id) = legacy_id
            .as_deref()
            .and_then(|key| self.mapping.get(Domain::Catalog, key))
        {
            if self.categories.get(id).is_some_and(|category| category == field) {
                return Resolution::Resolved(id.to_string());
            }
            tracing::debug!(
                legacy_key = ?record.legacy_id(),
                field = %field,
                catalog_id = %id,
                category = ?self.categories.get(id),
                "Legacy catalog id maps outside the field's category"
            );
        }

        let text = record.text(field);
        let by_name = text.as_deref().and_then(|text| self.by_name(field, text, scope));
        match (by_name, legacy_id.is_some() || text.is_some()) {
            (Some(id), _) => Resolution::Resolved(id),
            (None, true) => Resolution::Unresolved,
            (None, false) => Resolution::Absent,
        }
    }

    /// Like [`catalog`](Self::catalog), counting an unresolved value as a warning.
    pub fn optional_catalog(
        &mut self,
        record: &Record,
        field: &str,
        scope: Option<&str>,
    ) -> Option<String> {
        match self.catalog(record, field, scope) {
            Resolution::Resolved(id) => Some(id),
            Resolution::Unresolved => {
                tracing::debug!(
                    legacy_key = ?record.legacy_id(),
                    field = %field,
                    "Optional catalog reference unresolved, storing null"
                );
                self.optional_unresolved += 1;
                None
            }
            Resolution::Absent => None,
        }
    }

    /// Canonical id of a migrated entity referenced by `column`.
    pub fn entity(&self, record: &Record, column: &str, domain: Domain) -> Option<String> {
        let key = record.text(column)?;
        self.mapping.get(domain, &key).map(str::to_string)
    }

    pub fn optional_unresolved(&self) -> usize {
        self.optional_unresolved
    }

    fn by_name(&self, category: &str, text: &str, scope: Option<&str>) -> Option<String> {
        let domain = Domain::for_category(category)?;
        let normalized = normalize(category, text);
        if !normalized.is_determined() {
            return None;
        }

        scope
            .and_then(|scope| {
                self.mapping
                    .get(domain, &name_key(&normalized.name, Some(scope)))
            })
            .or_else(|| self.mapping.get(domain, &name_key(&normalized.name, None)))
            .map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value as JsonValue};

    fn record(value: JsonValue) -> Record {
        match value {
            JsonValue::Object(map) => Record::new(map),
            _ => panic!("expected object"),
        }
    }

    fn categories() -> CatalogCategories {
        [
            ("SIZE-P", "size"),
            ("CAO", "species"),
            ("ADOTADO", "status"),
            ("ADOTADO-S1", "status"),
        ]
        .into_iter()
        .map(|(id, category)| (id.to_string(), category.to_string()))
        .collect()
    }

    fn mapping() -> IdMapping {
        let mut mapping = IdMapping::new();
        mapping.put(Domain::Catalog, "4", "SIZE-P").unwrap();
        mapping.put(Domain::Catalog, "1", "CAO").unwrap();
        mapping.put(Domain::Species, "cão", "CAO").unwrap();
        mapping.put(Domain::Status, "adotado", "ADOTADO").unwrap();
        mapping.put(Domain::Status, "adotado@s1", "ADOTADO-S1").unwrap();
        mapping.put(Domain::Animal, "3", "ANIMAL-3").unwrap();
        mapping
    }

    #[test]
    fn test_catalog_by_legacy_id() {
        let (mapping, categories) = (mapping(), categories());
        let resolver = RefResolver::new(&mapping, &categories);
        let r = record(json!({"size_id": 4, "size": "grande"}));
        assert_eq!(
            resolver.catalog(&r, "size", None),
            Resolution::Resolved("SIZE-P".into())
        );
    }

    #[test]
    fn test_catalog_by_synonym_text() {
        let (mapping, categories) = (mapping(), categories());
        let resolver = RefResolver::new(&mapping, &categories);
        let r = record(json!({"species": " cachorro "}));
        assert_eq!(resolver.catalog(&r, "species", None).id(), Some("CAO"));
    }

    #[test]
    fn test_catalog_prefers_shelter_local_name() {
        let (mapping, categories) = (mapping(), categories());
        let resolver = RefResolver::new(&mapping, &categories);
        let r = record(json!({"status": "Adotado"}));
        assert_eq!(resolver.catalog(&r, "status", Some("s1")).id(), Some("ADOTADO-S1"));
        assert_eq!(resolver.catalog(&r, "status", Some("s2")).id(), Some("ADOTADO"));
    }

    #[test]
    fn test_unresolved_and_absent() {
        let (mapping, categories) = (mapping(), categories());
        let mut resolver = RefResolver::new(&mapping, &categories);
        let r = record(json!({"color": "Tigrado", "size_id": 99}));

        assert_eq!(resolver.catalog(&r, "color", None), Resolution::Unresolved);
        assert_eq!(resolver.catalog(&r, "size", None), Resolution::Unresolved);
        assert_eq!(resolver.catalog(&r, "breed", None), Resolution::Absent);

        assert_eq!(resolver.optional_catalog(&r, "color", None), None);
        assert_eq!(resolver.optional_catalog(&r, "breed", None), None);
        assert_eq!(resolver.optional_unresolved(), 1);
    }

    #[test]
    fn test_entity() {
        let (mapping, categories) = (mapping(), categories());
        let resolver = RefResolver::new(&mapping, &categories);
        let r = record(json!({"animal_id": 3, "medication_id": 7}));
        assert_eq!(
            resolver.entity(&r, "animal_id", Domain::Animal).as_deref(),
            Some("ANIMAL-3")
        );
        assert_eq!(resolver.entity(&r, "medication_id", Domain::Medication), None);
    }

    #[test]
    fn test_catalog_id_of_another_category_is_ignored() {
        let (mapping, categories) = (mapping(), categories());
        let resolver = RefResolver::new(&mapping, &categories);

        let r = record(json!({"status_id": 1}));
        assert_eq!(resolver.catalog(&r, "status", None), Resolution::Unresolved);

        let r = record(json!({"status_id": 1, "status": "adotado"}));
        assert_eq!(resolver.catalog(&r, "status", None).id(), Some("ADOTADO"));
        assert_eq!(
            resolver.catalog(&record(json!({"species_id": 1})), "species", None).id(),
            Some("CAO")
        );
    }
}
