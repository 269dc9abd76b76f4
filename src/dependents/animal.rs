use super::dates::date_field;
use super::{Mapped, RecordMapper, RefResolver};
use crate::models::{DependentRow, DependentTable, SPECIES};
use crate::snapshot::{Record, RecordError};

/// Optional catalog references of an animal, by legacy field name.
const OPTIONAL_CATALOG_FIELDS: &[&str] = &["breed", "size", "status", "color"];

/// Legacy `animals` → `animals`.
///
/// Species is required; the other taxonomy fields are stored as null when
/// they do not resolve.
pub struct AnimalMapper;

impl RecordMapper for AnimalMapper {
    fn table(&self) -> DependentTable {
        DependentTable::Animals
    }

    fn source_table(&self) -> &'static str {
        "animals"
    }

    fn map(&self, record: &Record, refs: &mut RefResolver<'_>) -> Result<Mapped, RecordError> {
        let legacy_id = record.legacy_id().ok_or(RecordError::MissingId)?;
        let scope = record.text("shelter_id");

        let Some(species_id) = refs.catalog(record, SPECIES, scope.as_deref()).id().map(str::to_string)
        else {
            return Ok(Mapped::Skip("species not reconciled"));
        };

        let mut row = DependentRow::new(self.table());
        row.set("legacy_id", Some(legacy_id))
            .set("name", record.text("name"))
            .set("shelter_scope", scope.clone())
            .set("species_id", Some(species_id));

        for field in OPTIONAL_CATALOG_FIELDS {
            let id = refs.optional_catalog(record, field, scope.as_deref());
            row.set(&format!("{}_id", field), id);
        }

        row.set("sex", record.text("sex"))
            .set("birth_date", date_field(record, "birth_date")?)
            .set("notes", record.text("notes"));
        Ok(Mapped::Row(row))
    }
}
