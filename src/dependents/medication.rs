use super::{Mapped, RecordMapper, RefResolver};
use crate::models::{DependentRow, DependentTable};
use crate::normalize::clean;
use crate::snapshot::{Record, RecordError};

/// Legacy `medications` → `medications`.
///
/// Medications with the same name (case-insensitive) collapse into one row.
pub struct MedicationMapper;

impl RecordMapper for MedicationMapper {
    fn table(&self) -> DependentTable {
        DependentTable::Medications
    }

    fn source_table(&self) -> &'static str {
        "medications"
    }

    fn map(&self, record: &Record, _refs: &mut RefResolver<'_>) -> Result<Mapped, RecordError> {
        let legacy_id = record.legacy_id().ok_or(RecordError::MissingId)?;
        let name = record
            .text("name")
            .map(|name| clean(&name))
            .ok_or(RecordError::MissingField("name"))?;

        let mut row = DependentRow::new(self.table());
        row.set("legacy_id", Some(legacy_id))
            .set("name", Some(name))
            .set("unit", record.text("unit"))
            .set("notes", record.text("notes"));
        Ok(Mapped::Row(row))
    }
}
