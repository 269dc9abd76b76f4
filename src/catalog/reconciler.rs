//! Catalog reconciliation: deduplication, legacy category merges and upserts.
//!
//! A stage runs in three steps over the [`CatalogIndex`] loaded for it:
//!
//! 1. **Settle existing rows.** Stored rows are grouped by normalized
//!    category and name across scopes. In each scope the oldest row already
//!    in the canonical category survives; legacy rows merge into the
//!    survivor visible from their scope, a global legacy row promoting it
//!    to global. Merging transfers parent and active flag, re-points
//!    children and dependents, deletes the row and maps its id to the
//!    survivor. A survivor still under a legacy category or spelling is
//!    rewritten in place, keeping its id.
//! 2. **Apply candidates.** Snapshot candidates are grouped by normalized
//!    key; within a group the last non-empty parent wins. Each group reuses
//!    the visible entry (scoped, then global, then a local one promoted to
//!    global) or inserts a new one.
//! 3. **Register names.** Every surviving entry of a mapped category is
//!    recorded under its name key so text references resolve later.
//!
//! Re-running a stage over its own output finds only canonical rows and
//! matching parents and emits no changes.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use super::candidates::CatalogCandidate;
use super::index::CatalogIndex;
use crate::mapping::{name_key, Domain, IdMapping, MappingConflict};
use crate::models::{compare_ids, CatalogEntry, CatalogKey, BREED, SPECIES};
use crate::normalize::{normalize_with, Normalized, RuleSet, RULES};

/// Reconciliation stages, in the order they must run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogStage {
    Species,
    Breed,
    /// Every other category (size, status, color, ...).
    Flat,
}

impl CatalogStage {
    pub fn all() -> &'static [CatalogStage] {
        &[CatalogStage::Species, CatalogStage::Breed, CatalogStage::Flat]
    }

    pub fn name(&self) -> &'static str {
        match self {
            CatalogStage::Species => "species",
            CatalogStage::Breed => "breed",
            CatalogStage::Flat => "flat",
        }
    }

    /// Whether rows of this (normalized) category belong to the stage.
    ///
    /// Blank categories belong to the flat stage, which reports them.
    pub fn owns(&self, category: &str) -> bool {
        match self {
            CatalogStage::Species => category == SPECIES,
            CatalogStage::Breed => category == BREED,
            CatalogStage::Flat => category != SPECIES && category != BREED,
        }
    }
}

impl std::fmt::Display for CatalogStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A mutation of the `catalogs` table, applied in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogChange {
    Insert(CatalogEntry),
    /// Replace the stored row with this id.
    Update(CatalogEntry),
    /// Rewrite every reference to `from` (child parents, dependent rows) to `to`.
    Repoint { from: String, to: String },
    Delete(String),
}

/// Per-category counters of a stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CategoryCounts {
    pub inserted: usize,
    pub reused: usize,
    pub updated: usize,
    pub merged: usize,
    pub recategorized: usize,
    /// Entries left without a parent in a category that expects one.
    pub unparented: usize,
    pub unresolved: usize,
}

impl CategoryCounts {
    pub fn add(&mut self, other: &CategoryCounts) {
        self.inserted += other.inserted;
        self.reused += other.reused;
        self.updated += other.updated;
        self.merged += other.merged;
        self.recategorized += other.recategorized;
        self.unparented += other.unparented;
        self.unresolved += other.unresolved;
    }

    /// Whether anything was written.
    pub fn has_changes(&self) -> bool {
        self.inserted + self.updated + self.merged + self.recategorized > 0
    }
}

/// Where an unresolved row came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RowSource {
    Store,
    Snapshot,
}

/// A row whose target category or name could not be determined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnresolvedRow {
    pub source: RowSource,
    /// Store id or legacy key.
    pub key: Option<String>,
    pub category: String,
    pub name: String,
    pub reason: String,
}

/// Outcome of one stage.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StageReport {
    pub stage: String,
    pub categories: BTreeMap<String, CategoryCounts>,
    pub unresolved: Vec<UnresolvedRow>,
    pub conflicts: Vec<MappingConflict>,
}

impl StageReport {
    /// Counters summed over all categories.
    pub fn totals(&self) -> CategoryCounts {
        let mut totals = CategoryCounts::default();
        for counts in self.categories.values() {
            totals.add(counts);
        }
        totals
    }

    fn counts(&mut self, category: &str) -> &mut CategoryCounts {
        self.categories.entry(category.to_string()).or_default()
    }
}

/// Changes to persist plus the stage report.
#[derive(Debug, Clone)]
pub struct StageOutcome {
    pub changes: Vec<CatalogChange>,
    pub report: StageReport,
}

/// Reconciles catalog rows according to a [`RuleSet`].
#[derive(Debug, Clone, Copy)]
pub struct Reconciler<'r> {
    rules: &'r RuleSet,
}

impl Default for Reconciler<'static> {
    fn default() -> Self {
        Self { rules: &RULES }
    }
}

impl<'r> Reconciler<'r> {
    pub fn new(rules: &'r RuleSet) -> Self {
        Self { rules }
    }

    /// Runs one stage over `index`, updating it and `mapping` in place.
    pub fn reconcile(
        &self,
        stage: CatalogStage,
        index: &mut CatalogIndex,
        candidates: &[CatalogCandidate],
        mapping: &mut IdMapping,
    ) -> StageOutcome {
        let mut pass = Pass {
            rules: self.rules,
            stage,
            index,
            mapping,
            changes: Vec::new(),
            report: StageReport {
                stage: stage.name().to_string(),
                ..StageReport::default()
            },
        };

        pass.settle_existing();
        pass.apply_candidates(candidates);
        pass.register_names();

        StageOutcome {
            changes: pass.changes,
            report: pass.report,
        }
    }
}

/// Candidates sharing a normalized key.
struct CandidateGroup {
    key: CatalogKey,
    name: String,
    parent_name: Option<String>,
    legacy_keys: Vec<String>,
    active: bool,
}

/// The row a name group collapses into, next to its stored state.
struct Survivor {
    entry: CatalogEntry,
    before: CatalogEntry,
}

struct Pass<'a, 'r> {
    rules: &'r RuleSet,
    stage: CatalogStage,
    index: &'a mut CatalogIndex,
    mapping: &'a mut IdMapping,
    changes: Vec<CatalogChange>,
    report: StageReport,
}

impl Pass<'_, '_> {
    fn normalize(&self, category: &str, name: &str) -> Normalized {
        normalize_with(self.rules, category, name)
    }

    // -------------------------------------------------------------------------
    // Step 1: stored rows
    // -------------------------------------------------------------------------

    fn settle_existing(&mut self) {
        let rows: Vec<CatalogEntry> = self.index.sorted().into_iter().cloned().collect();
        let mut groups: BTreeMap<CatalogKey, Vec<CatalogEntry>> = BTreeMap::new();

        for row in rows {
            let normalized = self.normalize(&row.category, &row.name);
            if !self.stage.owns(&normalized.category) {
                continue;
            }
            if !normalized.is_determined() {
                self.flag(UnresolvedRow {
                    source: RowSource::Store,
                    key: Some(row.id.clone()),
                    category: row.category.clone(),
                    name: row.name.clone(),
                    reason: undetermined_reason(&normalized).to_string(),
                });
                continue;
            }

            let key = CatalogKey::new(&normalized.category, &normalized.name, None);
            groups.entry(key).or_default().push(row);
        }

        for (key, rows) in groups {
            self.settle_name(&key, rows);
        }
    }

    /// Collapses the stored rows sharing one normalized name.
    ///
    /// `rows` is ordered oldest first. The oldest row already in the target
    /// category survives in each scope and absorbs its same-scope
    /// duplicates. A legacy row merges into the survivor visible from its
    /// scope (same scope, then global); a global legacy row with only
    /// shelter-local survivors merges into the oldest one and promotes it
    /// to global. A legacy row with nothing to merge into becomes the
    /// survivor of its scope.
    fn settle_name(&mut self, key: &CatalogKey, rows: Vec<CatalogEntry>) {
        let mut survivors: BTreeMap<Option<String>, Survivor> = BTreeMap::new();
        for row in rows.iter().filter(|row| row.category == key.category) {
            if !survivors.contains_key(&row.shelter_scope) {
                let survivor = self.survivor(row.clone());
                survivors.insert(row.shelter_scope.clone(), survivor);
            }
        }

        for row in rows {
            if survivors.values().any(|s| s.entry.id == row.id) {
                continue;
            }

            let destination = if row.category == key.category {
                Some(row.shelter_scope.clone())
            } else {
                visible_survivor(&survivors, &row.shelter_scope)
            };
            let Some(scope) = destination else {
                let survivor = self.survivor(row);
                survivors.insert(survivor.entry.shelter_scope.clone(), survivor);
                continue;
            };
            let Some(mut survivor) = survivors.remove(&scope) else {
                continue;
            };

            // Last writer wins on the parent
            let implied = self.normalize(&row.category, &row.name).implied_parent;
            let parent = row.parent_id.clone().or_else(|| {
                self.resolve_parent(
                    &key.category,
                    implied.as_deref(),
                    row.shelter_scope.as_deref(),
                )
            });
            if let Some(parent) = parent.filter(|p| *p != survivor.entry.id) {
                survivor.entry.parent_id = Some(parent);
            }
            survivor.entry.active |= row.active;
            if row.shelter_scope.is_none() {
                survivor.entry.shelter_scope = None;
            }

            self.absorb(&key.category, &row, &survivor.entry.id);
            survivors.insert(survivor.entry.shelter_scope.clone(), survivor);
        }

        for survivor in survivors.into_values() {
            self.commit_survivor(survivor);
        }
    }

    /// Starts a survivor from a stored row, normalized and with its implied
    /// parent filled in.
    fn survivor(&self, row: CatalogEntry) -> Survivor {
        let before = row.clone();
        let mut entry = row;

        let normalized = self.normalize(&entry.category, &entry.name);
        entry.category = normalized.category;
        entry.name = normalized.name;
        if entry.parent_id.is_none() {
            entry.parent_id = self.resolve_parent(
                &entry.category,
                normalized.implied_parent.as_deref(),
                entry.shelter_scope.as_deref(),
            );
        }
        Survivor { entry, before }
    }

    /// Writes a survivor back when it differs from its stored row.
    fn commit_survivor(&mut self, survivor: Survivor) {
        let Survivor { entry, before } = survivor;
        if entry == before {
            return;
        }

        let counts = self.report.counts(&entry.category);
        if before.category != entry.category {
            counts.recategorized += 1;
        } else {
            counts.updated += 1;
        }

        tracing::debug!(
            id = %entry.id,
            from = %format!("{}/{}", before.category, before.name),
            to = %format!("{}/{}", entry.category, entry.name),
            scope = ?entry.shelter_scope,
            "Rewrote catalog entry in place"
        );
        self.index.insert(entry.clone());
        self.changes.push(CatalogChange::Update(entry));
    }

    /// Merges `duplicate` away into the entry `survivor_id`.
    fn absorb(&mut self, category: &str, duplicate: &CatalogEntry, survivor_id: &str) {
        self.index.repoint_children(&duplicate.id, survivor_id);
        self.index.remove(&duplicate.id);

        self.changes.push(CatalogChange::Repoint {
            from: duplicate.id.clone(),
            to: survivor_id.to_string(),
        });
        self.changes
            .push(CatalogChange::Delete(duplicate.id.clone()));
        self.record(Domain::MergedCatalog, &duplicate.id, survivor_id);
        self.report.counts(category).merged += 1;

        tracing::debug!(
            merged = %duplicate.id,
            into = %survivor_id,
            category = %duplicate.category,
            name = %duplicate.name,
            "Merged duplicate catalog entry"
        );
    }

    // -------------------------------------------------------------------------
    // Step 2: snapshot candidates
    // -------------------------------------------------------------------------

    fn apply_candidates(&mut self, candidates: &[CatalogCandidate]) {
        for group in self.group_candidates(candidates) {
            self.apply_group(group);
        }
    }

    /// Groups candidates owned by this stage, in first-seen order.
    ///
    /// Parents referenced by candidates of child categories are added as
    /// global candidates of their own so the hierarchy can be linked.
    fn group_candidates(&mut self, candidates: &[CatalogCandidate]) -> Vec<CandidateGroup> {
        let derived: Vec<CatalogCandidate> = candidates
            .iter()
            .filter_map(|candidate| {
                let normalized = self.normalize(&candidate.category, &candidate.name);
                let parent_category = self.rules.parent_category(&normalized.category)?;
                if !self.stage.owns(parent_category) {
                    return None;
                }
                let parent = candidate
                    .parent_name
                    .clone()
                    .or(normalized.implied_parent)?;
                Some(CatalogCandidate::new(parent_category, parent))
            })
            .collect();

        let mut groups: Vec<CandidateGroup> = Vec::new();
        let mut positions: HashMap<CatalogKey, usize> = HashMap::new();

        for candidate in candidates.iter().chain(derived.iter()) {
            let normalized = self.normalize(&candidate.category, &candidate.name);
            if !self.stage.owns(&normalized.category) {
                continue;
            }
            if !normalized.is_determined() {
                self.flag(UnresolvedRow {
                    source: RowSource::Snapshot,
                    key: candidate.legacy_key.clone(),
                    category: candidate.category.clone(),
                    name: candidate.name.clone(),
                    reason: undetermined_reason(&normalized).to_string(),
                });
                continue;
            }

            let key = CatalogKey::new(
                &normalized.category,
                &normalized.name,
                candidate.scope.as_deref(),
            );
            let position = *positions.entry(key.clone()).or_insert_with(|| {
                groups.push(CandidateGroup {
                    key,
                    name: normalized.name.clone(),
                    parent_name: None,
                    legacy_keys: Vec::new(),
                    active: false,
                });
                groups.len() - 1
            });

            let group = &mut groups[position];
            if let Some(parent) = candidate.parent_name.clone().or(normalized.implied_parent) {
                group.parent_name = Some(parent);
            }
            if let Some(legacy_key) = &candidate.legacy_key {
                group.legacy_keys.push(legacy_key.clone());
            }
            group.active |= candidate.active;
        }

        groups
    }

    fn apply_group(&mut self, group: CandidateGroup) {
        let key = &group.key;
        let parent_id = self.resolve_parent(
            &key.category,
            group.parent_name.as_deref(),
            key.scope.as_deref(),
        );

        let existing = self
            .index
            .resolve(key)
            .or_else(|| match key.scope {
                None => self.index.find_local(key),
                Some(_) => None,
            })
            .cloned();

        let id = match existing {
            Some(mut entry) => {
                let before = entry.clone();

                // A global candidate promotes a shelter-local entry
                if key.scope.is_none() {
                    entry.shelter_scope = None;
                }
                if let Some(parent_id) = parent_id.filter(|p| *p != entry.id) {
                    entry.parent_id = Some(parent_id);
                }

                if entry != before {
                    self.report.counts(&key.category).updated += 1;
                    self.index.insert(entry.clone());
                    self.changes.push(CatalogChange::Update(entry.clone()));
                } else {
                    self.report.counts(&key.category).reused += 1;
                }
                entry.id
            }
            None => {
                let mut entry =
                    CatalogEntry::new(&key.category, &group.name, parent_id, key.scope.clone());
                entry.active = group.active;

                tracing::debug!(
                    id = %entry.id,
                    category = %entry.category,
                    name = %entry.name,
                    "Inserting catalog entry"
                );
                self.report.counts(&key.category).inserted += 1;
                self.index.insert(entry.clone());
                let id = entry.id.clone();
                self.changes.push(CatalogChange::Insert(entry));
                id
            }
        };

        for legacy_key in &group.legacy_keys {
            self.record(Domain::Catalog, legacy_key, &id);
        }
    }

    // -------------------------------------------------------------------------
    // Step 3: name registration
    // -------------------------------------------------------------------------

    fn register_names(&mut self) {
        let entries: Vec<CatalogEntry> = self
            .index
            .sorted()
            .into_iter()
            .filter(|e| self.stage.owns(&e.category) && !e.category.is_empty())
            .cloned()
            .collect();

        for entry in entries {
            if self.rules.parent_category(&entry.category).is_some() && entry.parent_id.is_none() {
                self.report.counts(&entry.category).unparented += 1;
            }
            if let Some(domain) = Domain::for_category(&entry.category) {
                let key = name_key(&entry.name, entry.shelter_scope.as_deref());
                self.record(domain, &key, &entry.id);
            }
        }
    }

    // -------------------------------------------------------------------------
    // Helpers
    // -------------------------------------------------------------------------

    /// Id of the parent entry named `parent_name`, visible from `scope`.
    fn resolve_parent(
        &self,
        category: &str,
        parent_name: Option<&str>,
        scope: Option<&str>,
    ) -> Option<String> {
        let parent_category = self.rules.parent_category(category)?;
        let parent_name = parent_name?;
        let normalized = self.normalize(parent_category, parent_name);
        if !normalized.is_determined() {
            return None;
        }

        let key = CatalogKey::new(parent_category, &normalized.name, scope);
        match self.index.resolve(&key) {
            Some(parent) => Some(parent.id.clone()),
            None => {
                tracing::warn!(
                    category = %category,
                    parent = %parent_name,
                    "Parent not found, leaving entry unparented"
                );
                None
            }
        }
    }

    fn record(&mut self, domain: Domain, legacy_key: &str, canonical_id: &str) {
        if let Err(conflict) = self.mapping.put(domain, legacy_key, canonical_id) {
            tracing::warn!(error = %conflict, "ID mapping conflict");
            self.report.conflicts.push(conflict);
        }
    }

    fn flag(&mut self, row: UnresolvedRow) {
        tracing::warn!(
            source = ?row.source,
            key = ?row.key,
            category = %row.category,
            name = %row.name,
            reason = %row.reason,
            "Catalog row left untouched"
        );
        let category = if row.category.is_empty() {
            "(blank)".to_string()
        } else {
            row.category.clone()
        };
        self.report.counts(&category).unresolved += 1;
        self.report.unresolved.push(row);
    }
}

/// Scope of the survivor a legacy row in `scope` merges into.
fn visible_survivor(
    survivors: &BTreeMap<Option<String>, Survivor>,
    scope: &Option<String>,
) -> Option<Option<String>> {
    if scope.is_some() && survivors.contains_key(scope) {
        return Some(scope.clone());
    }
    if survivors.contains_key(&None) {
        return Some(None);
    }
    match scope {
        Some(_) => None,
        None => survivors
            .iter()
            .min_by(|a, b| compare_ids(&a.1.entry.id, &b.1.entry.id))
            .map(|(scope, _)| scope.clone()),
    }
}

fn undetermined_reason(normalized: &Normalized) -> &'static str {
    if normalized.category.is_empty() {
        "target category cannot be determined"
    } else {
        "name is blank"
    }
}
