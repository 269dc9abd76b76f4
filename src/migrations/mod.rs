//! Schema migrations for the PostgreSQL store, with version tracking.
//!
//! Migrations are:
//! - **Idempotent**: `IF NOT EXISTS` everywhere, safe to retry
//! - **Forward-only**: no rollback support, add a compensating migration instead
//! - **Version-tracked**: the schema version lives in the `schema_version` table

mod m001_catalogs;
mod m002_dependents;
mod runner;
mod traits;

pub use m001_catalogs::M001Catalogs;
pub use m002_dependents::M002Dependents;
pub use runner::{get_schema_version, run_migrations, MigrationResult};
pub use traits::{Migration, Register};

/// All migrations in version order.
pub fn create_register() -> Register {
    Register::new()
        .register(M001Catalogs)
        .register(M002Dependents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_versions_are_strictly_increasing() {
        let versions: Vec<u32> = create_register().iter().map(|m| m.version()).collect();
        assert_eq!(versions, vec![1, 2]);
    }
}
