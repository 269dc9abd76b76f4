//! Store abstraction for the target database.
//!
//! The reconciler and the dependent migrator never talk to a database
//! directly. They produce changes and rows that a [`StoreClient`]
//! transaction applies, so the same pipeline runs against PostgreSQL or
//! the in-memory backend used by `--dry-run` and the tests.
//!
//! # Usage
//!
//! ```ignore
//! use shelter_reconcile::store::backends::postgres::PostgresClient;
//! use shelter_reconcile::store::{CatalogExecutor, StoreClient, Transaction};
//!
//! let client = PostgresClient::connect(uri, timeout).await?;
//! let txn = client.begin().await?;
//! let entries = txn.load_catalog().await?;
//! txn.commit().await?;
//! ```

mod row;
mod traits;

pub mod backends;

pub use row::{Row, RowStream};
pub use traits::{CatalogExecutor, RecordExecutor, SqlExecutor, StoreClient, Transaction};
