//! Core traits for store abstraction.
//!
//! This module defines the trait hierarchy that backends must implement:
//!
//! - [`CatalogExecutor`] - Reads and mutates the `catalogs` table
//! - [`RecordExecutor`] - Writes and checks dependent tables
//! - [`SqlExecutor`] - Optional, for backends that support SQL (schema migrations)
//! - [`Transaction`] - Transaction lifecycle management
//! - [`StoreClient`] - Connection management and transaction creation

use async_trait::async_trait;

use crate::catalog::CatalogChange;
use crate::error::AppError;
use crate::models::{CatalogEntry, DependentRow, OrphanRef, UpsertOutcome};
use crate::store::row::RowStream;

/// Reads and mutates catalog entries.
#[async_trait]
pub trait CatalogExecutor: Send + Sync {
    /// Loads every catalog entry.
    async fn load_catalog(&self) -> Result<Vec<CatalogEntry>, AppError>;

    /// Applies a single reconciler change.
    ///
    /// [`CatalogChange::Repoint`] rewrites child parents and every catalog
    /// reference held by dependent tables.
    async fn apply_catalog_change(&self, change: &CatalogChange) -> Result<(), AppError>;
}

/// Writes and checks rows of dependent tables.
#[async_trait]
pub trait RecordExecutor: Send + Sync {
    /// Inserts `row` unless a row with the same natural key exists.
    ///
    /// A failure only undoes this row's write; the surrounding transaction
    /// stays usable so the caller can record the error and continue.
    async fn upsert_or_skip(&self, row: &DependentRow) -> Result<UpsertOutcome, AppError>;

    /// Lists foreign keys of dependent rows that do not resolve.
    async fn find_orphans(&self) -> Result<Vec<OrphanRef>, AppError>;
}

/// Executes SQL against the database.
///
/// Only backends that speak SQL implement it. It is used for DDL and
/// schema version tracking.
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    /// Executes a SQL statement without returning results.
    async fn execute_sql(&self, sql: &str) -> Result<(), AppError>;

    /// Executes a SQL query and returns a stream of result rows.
    async fn query_sql(&self, sql: &str) -> Result<RowStream<'_>, AppError>;
}

/// Transaction lifecycle management.
#[async_trait]
pub trait Transaction: Send + Sync {
    /// Commits the transaction, making all changes permanent.
    ///
    /// Consumes the transaction - it cannot be used after commit.
    async fn commit(self) -> Result<(), AppError>;

    /// Rolls back the transaction, discarding all changes.
    ///
    /// Consumes the transaction - it cannot be used after rollback.
    async fn rollback(self) -> Result<(), AppError>;
}

/// A store client that can begin transactions.
///
/// All reads and writes go through a transaction; every pipeline stage
/// opens exactly one.
///
/// # Example
///
/// ```ignore
/// let txn = client.begin().await?;
/// for change in &outcome.changes {
///     txn.apply_catalog_change(change).await?;
/// }
/// txn.commit().await?;
/// ```
#[async_trait]
pub trait StoreClient: Send + Sync {
    /// The transaction type returned by this client.
    type Tx<'a>: Transaction + CatalogExecutor + RecordExecutor
    where
        Self: 'a;

    /// Begins a new transaction.
    async fn begin(&self) -> Result<Self::Tx<'_>, AppError>;
}
