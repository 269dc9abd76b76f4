//! In-memory view of the `catalogs` table for one reconciliation stage.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::models::{compare_ids, CatalogEntry, CatalogKey};

/// Catalog entries indexed by id and by uniqueness key.
///
/// Loaded from the store at the start of a stage and updated explicitly
/// as the reconciler emits changes, so each stage works on the state the
/// previous one committed and nothing is shared implicitly between stages.
/// Duplicate keys are tolerated because legacy data contains them; lookups
/// by key return the oldest entry.
#[derive(Debug, Clone, Default)]
pub struct CatalogIndex {
    entries: HashMap<String, CatalogEntry>,
    by_key: BTreeMap<CatalogKey, Vec<String>>,
}

impl CatalogIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: impl IntoIterator<Item = CatalogEntry>) -> Self {
        let mut index = Self::new();
        for entry in entries {
            index.insert(entry);
        }
        index
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&CatalogEntry> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Oldest entry with exactly this key.
    pub fn find(&self, key: &CatalogKey) -> Option<&CatalogEntry> {
        self.by_key
            .get(key)
            .and_then(|ids| ids.first())
            .and_then(|id| self.entries.get(id))
    }

    /// Entry visible from `key.scope`: the scoped entry, else the global one.
    pub fn resolve(&self, key: &CatalogKey) -> Option<&CatalogEntry> {
        self.find(key).or_else(|| match key.scope {
            Some(_) => self.find(&key.global()),
            None => None,
        })
    }

    /// Oldest shelter-local entry with the key's category and name.
    pub fn find_local(&self, key: &CatalogKey) -> Option<&CatalogEntry> {
        self.by_key
            .iter()
            .filter(|(k, _)| {
                k.scope.is_some() && k.category == key.category && k.name == key.name
            })
            .flat_map(|(_, ids)| ids.iter())
            .filter_map(|id| self.entries.get(id))
            .min_by(|a, b| compare_ids(&a.id, &b.id))
    }

    /// Adds an entry, replacing any entry with the same id.
    pub fn insert(&mut self, entry: CatalogEntry) {
        self.remove(&entry.id);

        let ids = self.by_key.entry(entry.key()).or_default();
        let position = ids
            .binary_search_by(|id| compare_ids(id, &entry.id))
            .unwrap_or_else(|pos| pos);
        ids.insert(position, entry.id.clone());
        self.entries.insert(entry.id.clone(), entry);
    }

    /// Removes an entry by id.
    pub fn remove(&mut self, id: &str) -> Option<CatalogEntry> {
        let entry = self.entries.remove(id)?;
        let key = entry.key();
        if let Some(ids) = self.by_key.get_mut(&key) {
            ids.retain(|existing| existing != id);
            if ids.is_empty() {
                self.by_key.remove(&key);
            }
        }
        Some(entry)
    }

    /// Points every child of `from` at `to`. Returns the number of children moved.
    pub fn repoint_children(&mut self, from: &str, to: &str) -> usize {
        let children: Vec<CatalogEntry> = self
            .entries
            .values()
            .filter(|e| e.parent_id.as_deref() == Some(from))
            .cloned()
            .collect();

        let moved = children.len();
        for mut child in children {
            child.parent_id = Some(to.to_string());
            self.insert(child);
        }
        moved
    }

    /// All entries, oldest first.
    pub fn sorted(&self) -> Vec<&CatalogEntry> {
        let mut entries: Vec<_> = self.entries.values().collect();
        entries.sort_by(|a, b| compare_ids(&a.id, &b.id));
        entries
    }

    /// Entries of one category, oldest first.
    pub fn in_category(&self, category: &str) -> Vec<&CatalogEntry> {
        self.sorted()
            .into_iter()
            .filter(|e| e.category == category)
            .collect()
    }

    /// Distinct categories present.
    pub fn categories(&self) -> BTreeSet<&str> {
        self.entries.values().map(|e| e.category.as_str()).collect()
    }

    /// Keys held by more than one entry, with their ids oldest first.
    pub fn duplicate_keys(&self) -> Vec<(&CatalogKey, &[String])> {
        self.by_key
            .iter()
            .filter(|(_, ids)| ids.len() > 1)
            .map(|(key, ids)| (key, ids.as_slice()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, category: &str, name: &str, scope: Option<&str>) -> CatalogEntry {
        CatalogEntry {
            id: id.to_string(),
            category: category.to_string(),
            name: name.to_string(),
            parent_id: None,
            shelter_scope: scope.map(str::to_string),
            active: true,
        }
    }

    #[test]
    fn test_find_returns_oldest_duplicate() {
        let index = CatalogIndex::from_entries(vec![
            entry("10", "breed", "Labrador", None),
            entry("2", "breed", "labrador", None),
        ]);

        let key = CatalogKey::new("breed", "LABRADOR", None);
        assert_eq!(index.find(&key).unwrap().id, "2");
        assert_eq!(index.duplicate_keys().len(), 1);
    }

    #[test]
    fn test_resolve_falls_back_to_global() {
        let index = CatalogIndex::from_entries(vec![entry("1", "species", "Cão", None)]);

        let scoped = CatalogKey::new("species", "cão", Some("s1"));
        assert_eq!(index.find(&scoped), None);
        assert_eq!(index.resolve(&scoped).unwrap().id, "1");
    }

    #[test]
    fn test_find_local() {
        let index = CatalogIndex::from_entries(vec![
            entry("7", "status", "Adotado", Some("s2")),
            entry("3", "status", "Adotado", Some("s1")),
        ]);
        let key = CatalogKey::new("status", "adotado", None);
        assert_eq!(index.find(&key), None);
        assert_eq!(index.find_local(&key).unwrap().id, "3");
    }

    #[test]
    fn test_insert_rekeys_updated_entry() {
        let mut index = CatalogIndex::from_entries(vec![entry("1", "breed_dog", "Poodle", None)]);

        let mut updated = index.get("1").unwrap().clone();
        updated.category = "breed".to_string();
        index.insert(updated);

        assert_eq!(index.len(), 1);
        assert!(index.find(&CatalogKey::new("breed_dog", "Poodle", None)).is_none());
        assert!(index.find(&CatalogKey::new("breed", "Poodle", None)).is_some());
    }

    #[test]
    fn test_repoint_children() {
        let mut child = entry("5", "breed", "Poodle", None);
        child.parent_id = Some("1".to_string());
        let mut index = CatalogIndex::from_entries(vec![
            entry("1", "species", "Cachorro", None),
            entry("2", "species", "Cão", None),
            child,
        ]);

        assert_eq!(index.repoint_children("1", "2"), 1);
        assert_eq!(index.get("5").unwrap().parent_id.as_deref(), Some("2"));
    }
}
