//! Catalog table.

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::error::AppError;
use crate::migrations::Migration;
use crate::store::SqlExecutor;

/// Unified `catalogs` table.
///
/// Name uniqueness is enforced by the reconciler and checked by the
/// validator, not by an index: stores migrated from older schemas may
/// still hold duplicates that the first run has to merge.
pub struct M001Catalogs;

impl Migration for M001Catalogs {
    fn id(&self) -> &'static str {
        "m001_catalogs"
    }

    fn version(&self) -> u32 {
        1
    }

    fn description(&self) -> &'static str {
        "Catalogs table with parent hierarchy"
    }

    fn up<'a>(&'a self, ctx: &'a (dyn SqlExecutor + Sync)) -> BoxFuture<'a, Result<(), AppError>> {
        async move {
            ctx.execute_sql(
                r#"
                CREATE TABLE IF NOT EXISTS catalogs (
                    id TEXT PRIMARY KEY,
                    category TEXT NOT NULL,
                    name TEXT NOT NULL,
                    parent_id TEXT REFERENCES catalogs (id),
                    shelter_scope TEXT,
                    active BOOLEAN NOT NULL
                );

                CREATE INDEX IF NOT EXISTS catalogs_name_key_idx
                ON catalogs (category, lower(name), coalesce(shelter_scope, ''));

                CREATE INDEX IF NOT EXISTS catalogs_parent_idx
                ON catalogs (parent_id);
                "#,
            )
            .await
        }
        .boxed()
    }
}
