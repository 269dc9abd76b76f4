//! Domain models for the target schema.

mod catalog;
mod record;

pub use catalog::{compare_ids, generate_ulid, CatalogEntry, CatalogKey, BREED, SPECIES};
pub use record::{
    catalog_reference_columns, DependentRow, DependentTable, OrphanRef, RefTarget, Reference,
    UpsertOutcome,
};
