//! Backend implementations of the store traits.
//!
//! Each backend implements the core traits from [`crate::store`]:
//!
//! - [`CatalogExecutor`](crate::store::CatalogExecutor) - Required
//! - [`RecordExecutor`](crate::store::RecordExecutor) - Required
//! - [`Transaction`](crate::store::Transaction) - Required
//! - [`StoreClient`](crate::store::StoreClient) - Required
//! - [`SqlExecutor`](crate::store::SqlExecutor) - Optional
//!
//! # Available Backends
//!
//! | Backend | Module | SQL |
//! |---------|--------|-----|
//! | PostgreSQL | [`postgres`] | yes |
//! | In-memory | [`memory`] | no |

pub mod memory;
pub mod postgres;
