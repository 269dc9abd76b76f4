//! ID mapping from legacy identifiers to canonical ids.
//!
//! The mapping is built once per run and threaded through every stage, so
//! later stages resolve foreign keys from what earlier stages produced
//! instead of re-deriving it. It is append-only: a key can be mapped once,
//! and re-mapping it to a different id is a [`MappingConflict`].

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::AppError;
use crate::models::DependentTable;
use crate::normalize::fold;

/// Current version of the exported mapping format.
const MAPPING_FORMAT_VERSION: u32 = 1;

/// Namespace of a legacy key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    /// Legacy snapshot catalog ids.
    Catalog,
    /// Store ids of catalog rows merged into a survivor.
    MergedCatalog,
    // Name keys for denormalized text references, see [`name_key`].
    Species,
    Breed,
    Size,
    Status,
    Color,
    // Legacy entity ids.
    Medication,
    Animal,
    Prescription,
    Task,
}

impl Domain {
    pub fn all() -> &'static [Domain] {
        &[
            Domain::Catalog,
            Domain::MergedCatalog,
            Domain::Species,
            Domain::Breed,
            Domain::Size,
            Domain::Status,
            Domain::Color,
            Domain::Medication,
            Domain::Animal,
            Domain::Prescription,
            Domain::Task,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Catalog => "catalog",
            Domain::MergedCatalog => "merged_catalog",
            Domain::Species => "species",
            Domain::Breed => "breed",
            Domain::Size => "size",
            Domain::Status => "status",
            Domain::Color => "color",
            Domain::Medication => "medication",
            Domain::Animal => "animal",
            Domain::Prescription => "prescription",
            Domain::Task => "task",
        }
    }

    /// Name-key domain of a catalog category, if it has one.
    pub fn for_category(category: &str) -> Option<Domain> {
        match category {
            "species" => Some(Domain::Species),
            "breed" => Some(Domain::Breed),
            "size" => Some(Domain::Size),
            "status" => Some(Domain::Status),
            "color" => Some(Domain::Color),
            _ => None,
        }
    }

    /// Domain holding the legacy ids of a dependent table.
    pub fn for_table(table: DependentTable) -> Domain {
        match table {
            DependentTable::Medications => Domain::Medication,
            DependentTable::Animals => Domain::Animal,
            DependentTable::Prescriptions => Domain::Prescription,
            DependentTable::PrescriptionTasks => Domain::Task,
        }
    }
}

impl std::fmt::Display for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Domain::all()
            .iter()
            .find(|d| d.as_str() == s)
            .copied()
            .ok_or_else(|| {
                let valid: Vec<_> = Domain::all().iter().map(Domain::as_str).collect();
                format!("Invalid domain '{}'. Valid values: {}", s, valid.join(", "))
            })
    }
}

/// Key under which a catalog entry is found by its display name.
///
/// Global entries use the folded name; shelter-local ones append `@scope`.
pub fn name_key(name: &str, scope: Option<&str>) -> String {
    match scope {
        Some(scope) => format!("{}@{}", fold(name), scope),
        None => fold(name),
    }
}

/// A `put` that disagrees with an earlier mapping of the same key.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{domain} key '{legacy_key}' already maps to {existing}, refusing {attempted}")]
pub struct MappingConflict {
    pub domain: Domain,
    pub legacy_key: String,
    pub existing: String,
    pub attempted: String,
}

/// Result of a successful [`IdMapping::put`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Added,
    /// The key was already mapped to the same id.
    Unchanged,
}

/// One exported mapping entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingEntry {
    pub domain: Domain,
    pub legacy_key: String,
    pub canonical_id: String,
}

/// On-disk form of the mapping.
#[derive(Debug, Serialize, Deserialize)]
struct MappingFile {
    version: u32,
    exported_at: DateTime<Utc>,
    entries: Vec<MappingEntry>,
}

/// Legacy key → canonical id, per domain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdMapping {
    entries: BTreeMap<Domain, BTreeMap<String, String>>,
}

impl IdMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a mapping.
    ///
    /// Idempotent for an identical id; a different id for an already
    /// mapped key is rejected and leaves the existing mapping in place.
    pub fn put(
        &mut self,
        domain: Domain,
        legacy_key: impl Into<String>,
        canonical_id: impl Into<String>,
    ) -> Result<PutOutcome, MappingConflict> {
        let legacy_key = legacy_key.into();
        let canonical_id = canonical_id.into();
        let keys = self.entries.entry(domain).or_default();

        match keys.get(&legacy_key) {
            Some(existing) if *existing == canonical_id => Ok(PutOutcome::Unchanged),
            Some(existing) => Err(MappingConflict {
                domain,
                legacy_key,
                existing: existing.clone(),
                attempted: canonical_id,
            }),
            None => {
                keys.insert(legacy_key, canonical_id);
                Ok(PutOutcome::Added)
            }
        }
    }

    pub fn get(&self, domain: Domain, legacy_key: &str) -> Option<&str> {
        self.entries
            .get(&domain)
            .and_then(|keys| keys.get(legacy_key))
            .map(String::as_str)
    }

    pub fn contains(&self, domain: Domain, legacy_key: &str) -> bool {
        self.get(domain, legacy_key).is_some()
    }

    /// Number of mappings across all domains.
    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of mappings per domain.
    pub fn counts(&self) -> BTreeMap<Domain, usize> {
        self.entries
            .iter()
            .map(|(domain, keys)| (*domain, keys.len()))
            .collect()
    }

    /// All mappings, ordered by domain then legacy key.
    pub fn entries(&self) -> impl Iterator<Item = MappingEntry> + '_ {
        self.entries.iter().flat_map(|(domain, keys)| {
            keys.iter().map(move |(legacy_key, canonical_id)| MappingEntry {
                domain: *domain,
                legacy_key: legacy_key.clone(),
                canonical_id: canonical_id.clone(),
            })
        })
    }

    /// Serializes the mapping to pretty JSON.
    pub fn to_json(&self) -> Result<String, AppError> {
        let file = MappingFile {
            version: MAPPING_FORMAT_VERSION,
            exported_at: Utc::now(),
            entries: self.entries().collect(),
        };
        Ok(serde_json::to_string_pretty(&file)?)
    }

    /// Parses a mapping exported by [`IdMapping::to_json`].
    pub fn from_json(json: &str) -> Result<Self, AppError> {
        let file: MappingFile = serde_json::from_str(json)?;
        if file.version != MAPPING_FORMAT_VERSION {
            return Err(AppError::Internal(format!(
                "Unsupported mapping format version {}",
                file.version
            )));
        }

        let mut mapping = Self::new();
        for entry in file.entries {
            mapping.put(entry.domain, entry.legacy_key, entry.canonical_id)?;
        }
        Ok(mapping)
    }

    /// Writes the mapping atomically (temp file in the same directory, then rename).
    pub fn save(&self, path: &Path) -> Result<(), AppError> {
        let json = self.to_json()?;
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| AppError::Io(e.error))?;

        tracing::debug!(path = %path.display(), entries = self.len(), "Exported ID mapping");
        Ok(())
    }

    /// Loads a previously exported mapping; a missing file yields an empty one.
    pub fn load(path: &Path) -> Result<Self, AppError> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let json = std::fs::read_to_string(path)?;
        let mapping = Self::from_json(&json)?;
        tracing::debug!(path = %path.display(), entries = mapping.len(), "Loaded ID mapping");
        Ok(mapping)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_is_idempotent_for_same_id() {
        let mut mapping = IdMapping::new();
        assert_eq!(mapping.put(Domain::Animal, "3", "A1"), Ok(PutOutcome::Added));
        assert_eq!(
            mapping.put(Domain::Animal, "3", "A1"),
            Ok(PutOutcome::Unchanged)
        );
        assert_eq!(mapping.get(Domain::Animal, "3"), Some("A1"));
        assert_eq!(mapping.len(), 1);
    }

    #[test]
    fn test_put_conflict_keeps_existing() {
        let mut mapping = IdMapping::new();
        mapping.put(Domain::Medication, "7", "M1").unwrap();

        let conflict = mapping.put(Domain::Medication, "7", "M2").unwrap_err();
        assert_eq!(conflict.existing, "M1");
        assert_eq!(conflict.attempted, "M2");
        assert_eq!(mapping.get(Domain::Medication, "7"), Some("M1"));

        // Other keys are unaffected
        mapping.put(Domain::Medication, "8", "M2").unwrap();
        assert_eq!(mapping.len(), 2);
    }

    #[test]
    fn test_domains_are_independent() {
        let mut mapping = IdMapping::new();
        mapping.put(Domain::Animal, "1", "A").unwrap();
        mapping.put(Domain::Prescription, "1", "P").unwrap();
        assert_eq!(mapping.get(Domain::Animal, "1"), Some("A"));
        assert_eq!(mapping.get(Domain::Prescription, "1"), Some("P"));
        assert_eq!(mapping.get(Domain::Task, "1"), None);
    }

    #[test]
    fn test_name_key() {
        assert_eq!(name_key(" Cão ", None), "cão");
        assert_eq!(name_key("Labrador", Some("s1")), "labrador@s1");
    }

    #[test]
    fn test_domain_from_str() {
        assert_eq!("breed".parse::<Domain>(), Ok(Domain::Breed));
        assert!("dog".parse::<Domain>().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("mapping.json");

        let mut mapping = IdMapping::new();
        mapping.put(Domain::Species, "cão", "S1").unwrap();
        mapping.put(Domain::Catalog, "12", "S1").unwrap();
        mapping.save(&path).unwrap();

        let loaded = IdMapping::load(&path).unwrap();
        assert_eq!(loaded, mapping);
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = IdMapping::load(&dir.path().join("absent.json")).unwrap();
        assert!(loaded.is_empty());
    }
}
