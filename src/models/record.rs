//! Dependent table definitions and row types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use super::catalog::generate_ulid;
use crate::normalize::fold;

/// Tables whose rows depend on catalog entries or on each other.
///
/// Variants are listed in migration order: every table only references
/// tables that come before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependentTable {
    Medications,
    Animals,
    Prescriptions,
    PrescriptionTasks,
}

/// What a foreign-key column points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefTarget {
    Catalog,
    Table(DependentTable),
}

/// A foreign-key column of a dependent table.
#[derive(Debug, Clone, Copy)]
pub struct Reference {
    pub column: &'static str,
    pub target: RefTarget,
    pub required: bool,
}

const fn catalog_ref(column: &'static str, required: bool) -> Reference {
    Reference {
        column,
        target: RefTarget::Catalog,
        required,
    }
}

const fn table_ref(column: &'static str, table: DependentTable) -> Reference {
    Reference {
        column,
        target: RefTarget::Table(table),
        required: true,
    }
}

const ANIMAL_REFS: &[Reference] = &[
    catalog_ref("species_id", true),
    catalog_ref("breed_id", false),
    catalog_ref("size_id", false),
    catalog_ref("status_id", false),
    catalog_ref("color_id", false),
];

const PRESCRIPTION_REFS: &[Reference] = &[
    table_ref("animal_id", DependentTable::Animals),
    table_ref("medication_id", DependentTable::Medications),
];

const TASK_REFS: &[Reference] = &[table_ref("prescription_id", DependentTable::Prescriptions)];

impl DependentTable {
    /// All dependent tables in migration order.
    pub fn all() -> &'static [DependentTable] {
        &[
            DependentTable::Medications,
            DependentTable::Animals,
            DependentTable::Prescriptions,
            DependentTable::PrescriptionTasks,
        ]
    }

    /// Target table name.
    pub fn name(&self) -> &'static str {
        match self {
            DependentTable::Medications => "medications",
            DependentTable::Animals => "animals",
            DependentTable::Prescriptions => "prescriptions",
            DependentTable::PrescriptionTasks => "prescription_tasks",
        }
    }

    /// Columns of the target table, in DDL order.
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            DependentTable::Medications => &["id", "legacy_id", "name", "unit", "notes"],
            DependentTable::Animals => &[
                "id",
                "legacy_id",
                "name",
                "shelter_scope",
                "species_id",
                "breed_id",
                "size_id",
                "status_id",
                "color_id",
                "sex",
                "birth_date",
                "notes",
            ],
            DependentTable::Prescriptions => &[
                "id",
                "legacy_id",
                "animal_id",
                "medication_id",
                "dosage",
                "route",
                "frequency_hours",
                "start_date",
                "end_date",
                "notes",
            ],
            DependentTable::PrescriptionTasks => &[
                "id",
                "legacy_id",
                "prescription_id",
                "scheduled_at",
                "done",
                "done_at",
                "notes",
            ],
        }
    }

    /// Columns forming the natural uniqueness key used for upsert-or-skip.
    pub fn natural_key_columns(&self) -> &'static [&'static str] {
        match self {
            DependentTable::Medications => &["name"],
            DependentTable::Animals | DependentTable::Prescriptions => &["legacy_id"],
            DependentTable::PrescriptionTasks => &["prescription_id", "scheduled_at"],
        }
    }

    /// Foreign-key columns of this table.
    pub fn references(&self) -> &'static [Reference] {
        match self {
            DependentTable::Medications => &[],
            DependentTable::Animals => ANIMAL_REFS,
            DependentTable::Prescriptions => PRESCRIPTION_REFS,
            DependentTable::PrescriptionTasks => TASK_REFS,
        }
    }

    /// Whether natural key values compare case-insensitively.
    pub fn folds_natural_key(&self) -> bool {
        matches!(self, DependentTable::Medications)
    }
}

/// Every `(table, column)` holding a catalog id.
pub fn catalog_reference_columns() -> impl Iterator<Item = (DependentTable, &'static str)> {
    DependentTable::all().iter().flat_map(|table| {
        table
            .references()
            .iter()
            .filter(|r| r.target == RefTarget::Catalog)
            .map(move |r| (*table, r.column))
    })
}

impl std::fmt::Display for DependentTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A row ready to be written to a dependent table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DependentRow {
    pub table: DependentTable,
    /// Column values, `id` included.
    pub fields: Map<String, JsonValue>,
}

impl DependentRow {
    /// Creates a row with a freshly generated id.
    pub fn new(table: DependentTable) -> Self {
        let mut fields = Map::new();
        fields.insert("id".to_string(), JsonValue::String(generate_ulid()));
        Self { table, fields }
    }

    /// Sets a column. `None` stores SQL NULL.
    pub fn set<T: Into<JsonValue>>(&mut self, column: &str, value: Option<T>) -> &mut Self {
        let value = value.map(Into::into).unwrap_or(JsonValue::Null);
        self.fields.insert(column.to_string(), value);
        self
    }

    pub fn id(&self) -> &str {
        self.get_str("id").unwrap_or_default()
    }

    pub fn get_str(&self, column: &str) -> Option<&str> {
        self.fields.get(column).and_then(JsonValue::as_str)
    }

    /// Natural key values rendered as strings.
    pub fn natural_key(&self) -> Vec<String> {
        self.table
            .natural_key_columns()
            .iter()
            .map(|column| {
                let rendered = match self.fields.get(*column) {
                    Some(JsonValue::String(s)) => s.clone(),
                    Some(JsonValue::Null) | None => String::new(),
                    Some(other) => other.to_string(),
                };
                if self.table.folds_natural_key() {
                    fold(&rendered)
                } else {
                    rendered
                }
            })
            .collect()
    }

    /// Human-readable identity for logs: `table(key=value, ...)`.
    pub fn identity(&self) -> String {
        let parts: Vec<String> = self
            .table
            .natural_key_columns()
            .iter()
            .zip(self.natural_key())
            .map(|(column, value)| format!("{}={}", column, value))
            .collect();
        format!("{}({})", self.table, parts.join(", "))
    }
}

/// Result of an upsert-or-skip insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// The row was inserted with this id.
    Inserted(String),
    /// A row with the same natural key already existed; this is its id.
    Existing(String),
}

impl UpsertOutcome {
    pub fn id(&self) -> &str {
        match self {
            UpsertOutcome::Inserted(id) | UpsertOutcome::Existing(id) => id,
        }
    }
}

/// A foreign key that does not resolve to an existing row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrphanRef {
    pub table: String,
    pub record_id: String,
    pub column: String,
    pub missing_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_row_has_ulid_id() {
        let row = DependentRow::new(DependentTable::Animals);
        assert_eq!(row.id().len(), 26);
    }

    #[test]
    fn test_medication_natural_key_is_case_insensitive() {
        let mut a = DependentRow::new(DependentTable::Medications);
        a.set("name", Some("Amoxicilina"));
        let mut b = DependentRow::new(DependentTable::Medications);
        b.set("name", Some("AMOXICILINA "));
        assert_eq!(a.natural_key(), b.natural_key());
    }

    #[test]
    fn test_task_identity() {
        let mut row = DependentRow::new(DependentTable::PrescriptionTasks);
        row.set("prescription_id", Some("p1"))
            .set("scheduled_at", Some("2024-01-02T08:00:00"));
        assert_eq!(
            row.identity(),
            "prescription_tasks(prescription_id=p1, scheduled_at=2024-01-02T08:00:00)"
        );
    }

    #[test]
    fn test_references_only_point_backwards() {
        for (position, table) in DependentTable::all().iter().enumerate() {
            for reference in table.references() {
                if let RefTarget::Table(target) = reference.target {
                    let target_pos = DependentTable::all()
                        .iter()
                        .position(|t| *t == target)
                        .unwrap();
                    assert!(target_pos < position, "{} -> {}", table, target);
                }
            }
        }
    }
}
