//! Catalog entry model for the canonical taxonomy.

use std::cmp::Ordering;
use std::sync::{Mutex, PoisonError};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use ulid::{Generator, Ulid};

use crate::normalize::fold;

/// Root category of the taxonomy.
pub const SPECIES: &str = "species";

/// Category whose entries hang under a species.
pub const BREED: &str = "breed";

/// A single row of the `catalogs` table.
///
/// Entries are unique by `(category, fold(name), shelter_scope)`. An entry
/// without a scope is global; otherwise it only applies to one shelter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Unique identifier. New entries get a ULID; rows carried over from
    /// the legacy schema may keep their numeric ids.
    pub id: String,
    /// Category identifier (e.g., "species", "breed", "status").
    pub category: String,
    /// Display name with its original casing.
    pub name: String,
    /// Parent entry (a species for breeds).
    pub parent_id: Option<String>,
    /// Owning shelter, or `None` for global entries.
    pub shelter_scope: Option<String>,
    pub active: bool,
}

impl CatalogEntry {
    /// Creates a new active entry with a generated ULID.
    pub fn new(
        category: impl Into<String>,
        name: impl Into<String>,
        parent_id: Option<String>,
        shelter_scope: Option<String>,
    ) -> Self {
        Self {
            id: generate_ulid(),
            category: category.into(),
            name: name.into(),
            parent_id,
            shelter_scope,
            active: true,
        }
    }

    /// The uniqueness key of this entry.
    pub fn key(&self) -> CatalogKey {
        CatalogKey::new(&self.category, &self.name, self.shelter_scope.as_deref())
    }

    pub fn is_global(&self) -> bool {
        self.shelter_scope.is_none()
    }
}

/// Uniqueness key of a catalog entry: category, folded name and scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CatalogKey {
    pub category: String,
    pub name: String,
    pub scope: Option<String>,
}

impl CatalogKey {
    pub fn new(category: &str, name: &str, scope: Option<&str>) -> Self {
        Self {
            category: category.to_string(),
            name: fold(name),
            scope: scope.map(str::to_string),
        }
    }

    /// The same key with the scope removed.
    pub fn global(&self) -> Self {
        Self {
            category: self.category.clone(),
            name: self.name.clone(),
            scope: None,
        }
    }
}

impl std::fmt::Display for CatalogKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.scope {
            Some(scope) => write!(f, "{}/{}@{}", self.category, self.name, scope),
            None => write!(f, "{}/{}", self.category, self.name),
        }
    }
}

static ULIDS: Lazy<Mutex<Generator>> = Lazy::new(|| Mutex::new(Generator::new()));

/// Generates a new ULID string.
///
/// Ids generated within the same millisecond still increase.
pub fn generate_ulid() -> String {
    let mut generator = ULIDS.lock().unwrap_or_else(PoisonError::into_inner);
    generator
        .generate()
        .unwrap_or_else(|_| Ulid::new())
        .to_string()
}

/// Orders ids from oldest to newest.
///
/// Numeric ids (legacy rows) compare numerically and sort before ULIDs,
/// which compare lexicographically (creation order).
pub fn compare_ids(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}
