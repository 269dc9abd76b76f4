use super::dates::datetime_field;
use super::{Mapped, RecordMapper, RefResolver};
use crate::mapping::Domain;
use crate::models::{DependentRow, DependentTable};
use crate::snapshot::{Record, RecordError};

/// Legacy `prescription_tasks` → `prescription_tasks`.
pub struct TaskMapper;

impl RecordMapper for TaskMapper {
    fn table(&self) -> DependentTable {
        DependentTable::PrescriptionTasks
    }

    fn source_table(&self) -> &'static str {
        "prescription_tasks"
    }

    fn map(&self, record: &Record, refs: &mut RefResolver<'_>) -> Result<Mapped, RecordError> {
        let legacy_id = record.legacy_id().ok_or(RecordError::MissingId)?;

        let Some(prescription_id) = refs.entity(record, "prescription_id", Domain::Prescription)
        else {
            return Ok(Mapped::Skip("prescription not migrated"));
        };

        let scheduled_at =
            datetime_field(record, "scheduled_at")?.ok_or(RecordError::MissingField("scheduled_at"))?;

        let mut row = DependentRow::new(self.table());
        row.set("legacy_id", Some(legacy_id))
            .set("prescription_id", Some(prescription_id))
            .set("scheduled_at", Some(scheduled_at))
            .set("done", Some(record.flag("done")?.unwrap_or(false)))
            .set("done_at", datetime_field(record, "done_at")?)
            .set("notes", record.text("notes"));
        Ok(Mapped::Row(row))
    }
}
