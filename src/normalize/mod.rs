//! Value normalization for legacy taxonomy values.
//!
//! [`normalize`] maps a raw `(category, name)` pair to its canonical form:
//! legacy category prefixes are stripped, known synonyms are replaced by
//! their canonical spelling, and unknown values pass through trimmed but
//! otherwise untouched. It never fails; blank input comes back as an
//! undetermined value that callers report instead of storing.

mod rules;

pub use rules::{CategoryRule, MergeRule, RuleSet, RULES};

use crate::models::{BREED, SPECIES};

/// Legacy prefix stripped from flat categories (`animal_size` → `size`).
const ANIMAL_PREFIX: &str = "animal_";

/// Legacy prefix of per-species breed categories (`breed_dog`).
const BREED_PREFIX: &str = "breed_";

/// A canonical `(category, name)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    /// Canonical category identifier, empty when undetermined.
    pub category: String,
    /// Canonical display name, empty when undetermined.
    pub name: String,
    /// Parent name implied by a legacy category such as `breed_cat`.
    pub implied_parent: Option<String>,
    /// Whether the raw category was a legacy one that had to be mapped.
    pub from_legacy_category: bool,
}

impl Normalized {
    /// Whether both category and name could be determined.
    pub fn is_determined(&self) -> bool {
        !self.category.is_empty() && !self.name.is_empty()
    }
}

/// Trims and collapses internal whitespace, keeping the original casing.
pub fn clean(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Comparison key: cleaned and lower-cased.
pub fn fold(value: &str) -> String {
    clean(value).to_lowercase()
}

/// Maps a raw category identifier to its canonical category.
///
/// Returns the canonical category, the implied parent name (if any) and
/// whether a legacy mapping was applied.
pub fn canonical_category(raw_category: &str) -> (String, Option<String>, bool) {
    canonical_category_with(&RULES, raw_category)
}

fn canonical_category_with(rules: &RuleSet, raw_category: &str) -> (String, Option<String>, bool) {
    let category = fold(raw_category);

    if let Some(rule) = rules.merge_rule(&category) {
        return (
            rule.target.to_string(),
            rule.implied_parent.map(str::to_string),
            true,
        );
    }

    if let Some(species) = category.strip_prefix(BREED_PREFIX) {
        let parent = (!species.is_empty()).then(|| canonical_name_with(rules, SPECIES, species));
        return (BREED.to_string(), parent, true);
    }

    if let Some(stripped) = category.strip_prefix(ANIMAL_PREFIX) {
        if !stripped.is_empty() {
            return (stripped.to_string(), None, true);
        }
    }

    (category, None, false)
}

/// Canonical spelling of a value within an already canonical category.
pub fn canonical_name(category: &str, raw_name: &str) -> String {
    canonical_name_with(&RULES, category, raw_name)
}

fn canonical_name_with(rules: &RuleSet, category: &str, raw_name: &str) -> String {
    rules
        .canonical_name(category, raw_name)
        .map(str::to_string)
        .unwrap_or_else(|| clean(raw_name))
}

/// Normalizes a raw `(category, name)` pair with the built-in rules.
pub fn normalize(raw_category: &str, raw_name: &str) -> Normalized {
    normalize_with(&RULES, raw_category, raw_name)
}

/// Normalizes a raw `(category, name)` pair with an explicit rule set.
pub fn normalize_with(rules: &RuleSet, raw_category: &str, raw_name: &str) -> Normalized {
    let (category, implied_parent, from_legacy_category) =
        canonical_category_with(rules, raw_category);
    let name = canonical_name_with(rules, &category, raw_name);

    Normalized {
        category,
        name,
        implied_parent,
        from_legacy_category,
    }
}
