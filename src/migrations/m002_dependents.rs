//! Dependent tables.

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::error::AppError;
use crate::migrations::Migration;
use crate::store::SqlExecutor;

/// Medications, animals, prescriptions and prescription tasks.
///
/// The unique indexes are the natural keys the migrator upserts on.
pub struct M002Dependents;

impl Migration for M002Dependents {
    fn id(&self) -> &'static str {
        "m002_dependents"
    }

    fn version(&self) -> u32 {
        2
    }

    fn description(&self) -> &'static str {
        "Medication, animal, prescription and task tables"
    }

    fn up<'a>(&'a self, ctx: &'a (dyn SqlExecutor + Sync)) -> BoxFuture<'a, Result<(), AppError>> {
        async move {
            ctx.execute_sql(
                r#"
                CREATE TABLE IF NOT EXISTS medications (
                    id TEXT PRIMARY KEY,
                    legacy_id TEXT,
                    name TEXT NOT NULL,
                    unit TEXT,
                    notes TEXT
                );

                CREATE UNIQUE INDEX IF NOT EXISTS medications_name_idx
                ON medications (lower(name));
                "#,
            )
            .await?;

            ctx.execute_sql(
                r#"
                CREATE TABLE IF NOT EXISTS animals (
                    id TEXT PRIMARY KEY,
                    legacy_id TEXT NOT NULL UNIQUE,
                    name TEXT,
                    shelter_scope TEXT,
                    species_id TEXT NOT NULL REFERENCES catalogs (id),
                    breed_id TEXT REFERENCES catalogs (id),
                    size_id TEXT REFERENCES catalogs (id),
                    status_id TEXT REFERENCES catalogs (id),
                    color_id TEXT REFERENCES catalogs (id),
                    sex TEXT,
                    birth_date DATE,
                    notes TEXT
                );
                "#,
            )
            .await?;

            ctx.execute_sql(
                r#"
                CREATE TABLE IF NOT EXISTS prescriptions (
                    id TEXT PRIMARY KEY,
                    legacy_id TEXT NOT NULL UNIQUE,
                    animal_id TEXT NOT NULL REFERENCES animals (id),
                    medication_id TEXT NOT NULL REFERENCES medications (id),
                    dosage TEXT NOT NULL,
                    route TEXT NOT NULL,
                    frequency_hours BIGINT,
                    start_date DATE,
                    end_date DATE,
                    notes TEXT
                );

                CREATE TABLE IF NOT EXISTS prescription_tasks (
                    id TEXT PRIMARY KEY,
                    legacy_id TEXT,
                    prescription_id TEXT NOT NULL REFERENCES prescriptions (id),
                    scheduled_at TIMESTAMP NOT NULL,
                    done BOOLEAN NOT NULL,
                    done_at TIMESTAMP,
                    notes TEXT,
                    UNIQUE (prescription_id, scheduled_at)
                );
                "#,
            )
            .await
        }
        .boxed()
    }
}
