//! Legacy snapshot loading.
//!
//! A snapshot is a JSON object mapping each legacy table name to its rows:
//! `{"animals": [{"id": 1, ...}], "catalogs": [...]}`. How the export is
//! produced is not this crate's concern.

mod record;

pub use record::{Record, RecordError};

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::AppError;

/// Legacy rows grouped by table name.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct Snapshot {
    tables: BTreeMap<String, Vec<Record>>,
}

impl Snapshot {
    /// Reads a snapshot from a JSON file.
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let snapshot_error = |message: String| AppError::Snapshot {
            path: path.display().to_string(),
            message,
        };

        let json = std::fs::read_to_string(path).map_err(|e| snapshot_error(e.to_string()))?;
        let snapshot = Self::from_json(&json).map_err(|e| snapshot_error(e.to_string()))?;

        tracing::info!(
            path = %path.display(),
            tables = snapshot.tables.len(),
            rows = snapshot.row_count(),
            "Loaded legacy snapshot"
        );
        Ok(snapshot)
    }

    /// Parses a snapshot from JSON text.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Rows of a table; empty if the table is absent.
    pub fn table(&self, name: &str) -> &[Record] {
        self.tables.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    /// Adds rows to a table.
    pub fn insert_table(&mut self, name: impl Into<String>, rows: Vec<Record>) {
        self.tables.entry(name.into()).or_default().extend(rows);
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    /// Total number of rows across all tables.
    pub fn row_count(&self) -> usize {
        self.tables.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_snapshot() {
        let snapshot = Snapshot::from_json(
            r#"{
                "animals": [{"id": 1, "name": "Rex"}, {"id": 2, "name": "Mia"}],
                "catalogs": []
            }"#,
        )
        .unwrap();

        assert_eq!(snapshot.table("animals").len(), 2);
        assert!(snapshot.table("catalogs").is_empty());
        assert!(snapshot.table("missing").is_empty());
        assert_eq!(snapshot.row_count(), 2);
        assert_eq!(
            snapshot.table_names().collect::<Vec<_>>(),
            vec!["animals", "catalogs"]
        );
    }

    #[test]
    fn test_rows_must_be_objects() {
        assert!(Snapshot::from_json(r#"{"animals": [1, 2]}"#).is_err());
    }

    #[test]
    fn test_load_reports_path() {
        let err = Snapshot::load(Path::new("/nonexistent/snapshot.json")).unwrap_err();
        assert!(matches!(err, AppError::Snapshot { ref path, .. } if path.contains("snapshot.json")));
    }
}
