//! Mapping command handler.

use std::path::Path;

use color_eyre::eyre::{bail, Result};

use crate::mapping::{Domain, IdMapping};

use super::App;

impl App {
    /// Print mapping entries, optionally filtered by domain and key.
    pub fn run_mapping(&self, path: &Path, domain: Option<Domain>, key: Option<&str>) -> Result<()> {
        if !path.exists() {
            bail!("Mapping file not found: {}", path.display());
        }
        let mapping = IdMapping::load(path)?;

        let mut shown = 0;
        for entry in mapping.entries() {
            if domain.is_some_and(|d| d != entry.domain) {
                continue;
            }
            if key.is_some_and(|k| k != entry.legacy_key) {
                continue;
            }
            println!("{}\t{}\t{}", entry.domain, entry.legacy_key, entry.canonical_id);
            shown += 1;
        }

        tracing::info!(shown, total = mapping.len(), "Listed mapping entries");
        Ok(())
    }
}
