//! Migration runner with version tracking.

use futures::TryStreamExt;

use crate::error::AppError;
use crate::migrations::create_register;
use crate::store::{SqlExecutor, StoreClient, Transaction};

/// Result of running migrations.
#[derive(Debug, Clone)]
pub struct MigrationResult {
    /// Schema version before migrations ran.
    pub previous_version: u32,
    /// Schema version after migrations ran.
    pub current_version: u32,
    /// Ids of the migrations that were applied.
    pub applied: Vec<String>,
}

/// Applies all pending migrations.
///
/// The version is recorded after each migration commits, so a failure
/// leaves the earlier ones tracked.
pub async fn run_migrations<C>(client: &C) -> Result<MigrationResult, AppError>
where
    C: StoreClient + 'static,
    for<'a> C::Tx<'a>: SqlExecutor + 'static,
{
    ensure_schema_version_table(client).await?;

    let previous_version = get_schema_version(client).await?;
    let register = create_register();

    let applied = register
        .run_pending(client, previous_version, |version, id| {
            update_schema_version(client, version, id)
        })
        .await?;

    let current_version = get_schema_version(client).await?;
    Ok(MigrationResult {
        previous_version,
        current_version,
        applied,
    })
}

const CREATE_SCHEMA_VERSION_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    id INTEGER PRIMARY KEY DEFAULT 1 CHECK (id = 1),
    version INTEGER NOT NULL DEFAULT 0,
    applied_migrations TEXT[] NOT NULL DEFAULT '{}',
    last_applied_at TIMESTAMPTZ DEFAULT NOW()
);
INSERT INTO schema_version (id, version) VALUES (1, 0) ON CONFLICT (id) DO NOTHING;
"#;

async fn ensure_schema_version_table<C>(client: &C) -> Result<(), AppError>
where
    C: StoreClient,
    for<'a> C::Tx<'a>: SqlExecutor,
{
    let txn = client.begin().await?;
    txn.execute_sql(CREATE_SCHEMA_VERSION_TABLE).await?;
    txn.commit().await?;
    Ok(())
}

/// Current schema version, 0 for a fresh database.
pub async fn get_schema_version<C>(client: &C) -> Result<u32, AppError>
where
    C: StoreClient,
    for<'a> C::Tx<'a>: SqlExecutor,
{
    let txn = client.begin().await?;
    let rows: Vec<_> = txn
        .query_sql("SELECT version FROM schema_version WHERE id = 1")
        .await?
        .try_collect()
        .await?;
    txn.commit().await?;

    Ok(rows
        .first()
        .and_then(|r| r.get::<i64>("version").ok())
        .unwrap_or(0) as u32)
}

async fn update_schema_version<C>(client: &C, version: u32, migration_id: &str) -> Result<(), AppError>
where
    C: StoreClient,
    for<'a> C::Tx<'a>: SqlExecutor,
{
    let txn = client.begin().await?;
    let sql = format!(
        "UPDATE schema_version SET version = {}, applied_migrations = array_append(applied_migrations, '{}'), last_applied_at = NOW() WHERE id = 1",
        version, migration_id
    );
    txn.execute_sql(&sql).await?;
    txn.commit().await?;
    Ok(())
}
