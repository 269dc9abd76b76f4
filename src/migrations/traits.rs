//! Migration traits and registry.

use futures::future::BoxFuture;

use crate::error::AppError;
use crate::store::{SqlExecutor, StoreClient, Transaction as _};

/// A single schema migration.
///
/// Uses BoxFuture to avoid `'static` requirements from `#[async_trait]`.
pub trait Migration: Send + Sync {
    fn id(&self) -> &'static str;
    fn version(&self) -> u32;
    fn description(&self) -> &'static str;
    fn up<'a>(&'a self, ctx: &'a (dyn SqlExecutor + Sync)) -> BoxFuture<'a, Result<(), AppError>>;
}

/// Ordered set of migrations.
pub struct Register {
    migrations: Vec<Box<dyn Migration>>,
}

impl Register {
    pub fn new() -> Self {
        Self {
            migrations: Vec::new(),
        }
    }

    pub fn register(mut self, migration: impl Migration + 'static) -> Self {
        self.migrations.push(Box::new(migration));
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Migration> {
        self.migrations.iter().map(|m| m.as_ref())
    }

    /// Highest version known to this register.
    pub fn latest_version(&self) -> u32 {
        self.migrations.iter().map(|m| m.version()).max().unwrap_or(0)
    }

    /// Runs every migration above `current_version`, each in its own
    /// transaction, calling `on_applied` after each commit.
    ///
    /// Returns the ids of the applied migrations.
    pub async fn run_pending<C, F, Fut>(
        &self,
        client: &C,
        current_version: u32,
        mut on_applied: F,
    ) -> Result<Vec<String>, AppError>
    where
        C: StoreClient + 'static,
        for<'a> C::Tx<'a>: SqlExecutor + 'static,
        F: FnMut(u32, &'static str) -> Fut,
        Fut: std::future::Future<Output = Result<(), AppError>>,
    {
        let mut applied = vec![];

        for migration in &self.migrations {
            if migration.version() <= current_version {
                continue;
            }

            tracing::info!(
                id = migration.id(),
                version = migration.version(),
                "Applying migration: {}",
                migration.description()
            );

            let txn = client.begin().await?;
            match migration.up(&txn).await {
                Ok(()) => txn.commit().await?,
                Err(e) => {
                    tracing::error!(id = migration.id(), error = %e, "Migration failed");
                    txn.rollback().await?;
                    return Err(e);
                }
            }

            on_applied(migration.version(), migration.id()).await?;
            applied.push(migration.id().to_string());
        }

        Ok(applied)
    }
}

impl Default for Register {
    fn default() -> Self {
        Self::new()
    }
}
