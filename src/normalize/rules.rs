//! Declarative synonym and merge rules.
//!
//! Every special case of the legacy naming schemes lives in these tables.
//! The normalizer and the reconciler only consult them.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use super::fold;
use crate::models::{BREED, SPECIES};

/// Canonical categories and the synonyms accepted for their values.
#[derive(Debug, Clone)]
pub struct CategoryRule {
    pub category: &'static str,
    /// Category the entries of this one hang under, if any.
    pub parent: Option<&'static str>,
    /// `(canonical name, aliases)`; aliases are matched on folded text.
    pub synonyms: &'static [(&'static str, &'static [&'static str])],
}

/// How a legacy category folds into a canonical one.
#[derive(Debug, Clone)]
pub struct MergeRule {
    pub legacy: &'static str,
    pub target: &'static str,
    /// Parent name implied by the legacy category (e.g. `breed_dog` → Cão).
    pub implied_parent: Option<&'static str>,
}

const CATEGORY_RULES: &[CategoryRule] = &[
    CategoryRule {
        category: SPECIES,
        parent: None,
        synonyms: &[
            ("Cão", &["cão", "cao", "cachorro", "cachorra", "dog", "canino"]),
            ("Gato", &["gato", "gata", "cat", "felino"]),
        ],
    },
    CategoryRule {
        category: BREED,
        parent: Some(SPECIES),
        synonyms: &[(
            "SRD",
            &["srd", "sem raça definida", "sem raca definida", "vira-lata", "vira lata", "mixed"],
        )],
    },
    CategoryRule {
        category: "size",
        parent: None,
        synonyms: &[
            ("Pequeno", &["pequeno", "p", "small"]),
            ("Médio", &["médio", "medio", "m", "medium"]),
            ("Grande", &["grande", "g", "large"]),
        ],
    },
    CategoryRule {
        category: "status",
        parent: None,
        synonyms: &[
            ("Disponível", &["disponível", "disponivel", "available"]),
            ("Adotado", &["adotado", "adotada", "adopted"]),
            ("Em tratamento", &["em tratamento", "tratamento", "under treatment"]),
            ("Falecido", &["falecido", "falecida", "óbito", "obito", "deceased"]),
        ],
    },
    CategoryRule {
        category: "color",
        parent: None,
        synonyms: &[
            ("Preto", &["preto", "preta", "black"]),
            ("Branco", &["branco", "branca", "white"]),
            ("Caramelo", &["caramelo", "caramel"]),
        ],
    },
];

const MERGE_RULES: &[MergeRule] = &[
    MergeRule {
        legacy: "animal_species",
        target: SPECIES,
        implied_parent: None,
    },
    MergeRule {
        legacy: "animal_size",
        target: "size",
        implied_parent: None,
    },
    MergeRule {
        legacy: "animal_status",
        target: "status",
        implied_parent: None,
    },
    MergeRule {
        legacy: "animal_color",
        target: "color",
        implied_parent: None,
    },
    MergeRule {
        legacy: "breed_dog",
        target: BREED,
        implied_parent: Some("Cão"),
    },
    MergeRule {
        legacy: "breed_cat",
        target: BREED,
        implied_parent: Some("Gato"),
    },
];

/// The built-in rule set.
pub static RULES: Lazy<RuleSet> = Lazy::new(RuleSet::builtin);

/// Lookup tables built from the static rules.
#[derive(Debug)]
pub struct RuleSet {
    categories: HashMap<&'static str, &'static CategoryRule>,
    merges: HashMap<&'static str, &'static MergeRule>,
    synonyms: HashMap<&'static str, HashMap<String, &'static str>>,
}

impl RuleSet {
    /// Rules for the shelter catalogs, as held by [`RULES`].
    pub fn builtin() -> Self {
        Self::new(CATEGORY_RULES, MERGE_RULES)
    }

    pub fn new(categories: &'static [CategoryRule], merges: &'static [MergeRule]) -> Self {
        let mut synonyms: HashMap<&'static str, HashMap<String, &'static str>> = HashMap::new();
        for rule in categories {
            let table = synonyms.entry(rule.category).or_default();
            for (canonical, aliases) in rule.synonyms {
                table.insert(fold(canonical), *canonical);
                for alias in *aliases {
                    table.insert(fold(alias), *canonical);
                }
            }
        }

        Self {
            categories: categories.iter().map(|r| (r.category, r)).collect(),
            merges: merges.iter().map(|r| (r.legacy, r)).collect(),
            synonyms,
        }
    }

    pub fn category(&self, category: &str) -> Option<&'static CategoryRule> {
        self.categories.get(category).copied()
    }

    pub fn merge_rule(&self, legacy: &str) -> Option<&'static MergeRule> {
        self.merges.get(legacy).copied()
    }

    /// Category the entries of `category` hang under.
    pub fn parent_category(&self, category: &str) -> Option<&'static str> {
        self.category(category).and_then(|r| r.parent)
    }

    /// Canonical spelling of a value, if it is a known synonym.
    pub fn canonical_name(&self, category: &str, name: &str) -> Option<&'static str> {
        self.synonyms
            .get(category)
            .and_then(|table| table.get(&fold(name)))
            .copied()
    }
}
