use serde_json::Value as JsonValue;

use super::dates::date_field;
use super::{Mapped, RecordMapper, RefResolver};
use crate::config::FieldDefaults;
use crate::mapping::Domain;
use crate::models::{DependentRow, DependentTable};
use crate::snapshot::{Record, RecordError};

/// Legacy `prescriptions` → `prescriptions`.
///
/// Both the animal and the medication must already be migrated. Missing
/// dosage and route fall back to the configured defaults.
pub struct PrescriptionMapper {
    defaults: FieldDefaults,
}

impl PrescriptionMapper {
    pub fn new(defaults: FieldDefaults) -> Self {
        Self { defaults }
    }
}

impl RecordMapper for PrescriptionMapper {
    fn table(&self) -> DependentTable {
        DependentTable::Prescriptions
    }

    fn source_table(&self) -> &'static str {
        "prescriptions"
    }

    fn map(&self, record: &Record, refs: &mut RefResolver<'_>) -> Result<Mapped, RecordError> {
        let legacy_id = record.legacy_id().ok_or(RecordError::MissingId)?;

        let Some(animal_id) = refs.entity(record, "animal_id", Domain::Animal) else {
            return Ok(Mapped::Skip("no animal mapping"));
        };
        let Some(medication_id) = refs.entity(record, "medication_id", Domain::Medication) else {
            return Ok(Mapped::Skip("medication not migrated"));
        };

        let dosage = record
            .text("dosage")
            .unwrap_or_else(|| self.defaults.dosage.clone());
        let route = record
            .text("route")
            .unwrap_or_else(|| self.defaults.route.clone());

        let mut row = DependentRow::new(self.table());
        row.set("legacy_id", Some(legacy_id))
            .set("animal_id", Some(animal_id))
            .set("medication_id", Some(medication_id))
            .set("dosage", Some(dosage))
            .set("route", Some(route))
            .set("frequency_hours", frequency_hours(record)?)
            .set("start_date", date_field(record, "start_date")?)
            .set("end_date", date_field(record, "end_date")?)
            .set("notes", record.text("notes"));
        Ok(Mapped::Row(row))
    }
}

/// Dosing interval in hours, given as a number or numeric text.
fn frequency_hours(record: &Record) -> Result<Option<i64>, RecordError> {
    match record.get_raw("frequency_hours") {
        None | Some(JsonValue::Null) => Ok(None),
        Some(JsonValue::String(s)) if s.trim().is_empty() => Ok(None),
        Some(JsonValue::String(s)) => s.trim().parse().map(Some).map_err(|_| invalid_frequency(s)),
        Some(value) => value
            .as_i64()
            .map(Some)
            .ok_or_else(|| invalid_frequency(value)),
    }
}

fn invalid_frequency(value: impl std::fmt::Display) -> RecordError {
    RecordError::InvalidField {
        field: "frequency_hours".to_string(),
        message: format!("'{}' is not a whole number of hours", value),
    }
}
