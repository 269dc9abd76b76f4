//! Catalog reconciliation.
//!
//! Turns the legacy catalog rows and the taxonomy text found on legacy
//! records into a single deduplicated hierarchy in the `catalogs` table.

mod candidates;
mod index;
mod reconciler;

pub use candidates::{extract_candidates, CatalogCandidate, LEGACY_ANIMAL_TABLE, LEGACY_CATALOG_TABLE};
pub use index::CatalogIndex;
pub use reconciler::{
    CatalogChange, CatalogStage, CategoryCounts, Reconciler, RowSource, StageOutcome, StageReport,
    UnresolvedRow,
};
