//! # Text Index
//!
//! Small inverted index over catalog product text, used by the in-process
//! keyword backend.
//!
//! Both documents and queries go through [`UnitNormalizer`] before
//! tokenization, then a number directly followed by a canonical unit is
//! indexed as one term ("500 a"). Term weights are integers:
//!
//! | Term | Weight |
//! |------|--------|
//! | number + unit | 3 |
//! | bare number | 2 |
//! | word | 1 |
//!
//! A term found in the product name counts double.

use crate::normalize::UnitNormalizer;
use crate::ProductId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

const UNIT_TOKENS: [&str; 9] = ["a", "mm", "l/minute", "phase", "v", "kw", "m", "kg", "hz"];

const STOPWORDS: [&str; 18] = [
    "a", "an", "and", "at", "by", "for", "i", "in", "is", "me", "need", "of", "on", "or", "the",
    "to", "want", "with",
];

const WEIGHT_COMPOUND: u64 = 3;
const WEIGHT_NUMBER: u64 = 2;
const WEIGHT_WORD: u64 = 1;
const NAME_FACTOR: u64 = 2;

/// One keyword hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextMatch {
    pub id: ProductId,
    pub name: String,
    /// Raw integer relevance; only meaningful relative to other hits of the
    /// same query.
    pub relevance: u64,
}

#[derive(Debug, Clone)]
struct IndexedDoc {
    id: ProductId,
    name: String,
    category: String,
}

/// Inverted index: term -> canonical product id -> weight.
#[derive(Debug, Clone, Default)]
pub struct TextIndex {
    docs: BTreeMap<ProductId, IndexedDoc>,
    postings: BTreeMap<String, BTreeMap<ProductId, u64>>,
}

fn is_number(token: &str) -> bool {
    token.chars().next().is_some_and(|c| c.is_ascii_digit())
}

/// Split normalized text into weighted terms.
#[must_use]
pub fn tokenize(text: &str) -> Vec<(String, u64)> {
    let raw: Vec<String> = text
        .split_whitespace()
        .map(|t| {
            t.trim_matches(|c: char| !(c.is_alphanumeric() || c == '%' || c == '/'))
                .to_lowercase()
        })
        .filter(|t| !t.is_empty())
        .collect();

    let mut terms = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        let token = &raw[i];
        if is_number(token) {
            if let Some(unit) = raw.get(i.saturating_add(1)) {
                if UNIT_TOKENS.contains(&unit.as_str()) {
                    terms.push((format!("{token} {unit}"), WEIGHT_COMPOUND));
                    i = i.saturating_add(2);
                    continue;
                }
            }
            terms.push((token.clone(), WEIGHT_NUMBER));
        } else if !STOPWORDS.contains(&token.as_str()) {
            terms.push((token.clone(), WEIGHT_WORD));
        }
        i = i.saturating_add(1);
    }
    terms
}

impl TextIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Index one product. `fields` is any additional text (description,
    /// attribute values). Re-adding an id replaces nothing; callers index
    /// each product once.
    pub fn add(
        &mut self,
        normalizer: &UnitNormalizer,
        id: &ProductId,
        name: &str,
        category: &str,
        fields: &[&str],
    ) {
        let key = id.canonical();
        self.docs.insert(
            key.clone(),
            IndexedDoc {
                id: id.clone(),
                name: name.to_string(),
                category: category.to_string(),
            },
        );

        let name_terms: BTreeSet<String> = tokenize(&normalizer.normalize(name))
            .into_iter()
            .map(|(term, _)| term)
            .collect();

        let mut text = name.to_string();
        for field in fields {
            text.push(' ');
            text.push_str(field);
        }

        for (term, weight) in tokenize(&normalizer.normalize(&text)) {
            let weight = if name_terms.contains(&term) {
                weight.saturating_mul(NAME_FACTOR)
            } else {
                weight
            };
            let slot = self
                .postings
                .entry(term)
                .or_default()
                .entry(key.clone())
                .or_insert(0);
            *slot = (*slot).saturating_add(weight);
        }
    }

    /// Score every product in `category` against an already-normalized
    /// query. Products matching no term are left out.
    #[must_use]
    pub fn search(&self, category: &str, query: &str, limit: usize) -> Vec<TextMatch> {
        let terms: BTreeSet<String> = tokenize(query).into_iter().map(|(t, _)| t).collect();

        let mut relevance: BTreeMap<&ProductId, u64> = BTreeMap::new();
        for term in &terms {
            let Some(docs) = self.postings.get(term) else {
                continue;
            };
            for (doc, weight) in docs {
                let in_category = self
                    .docs
                    .get(doc)
                    .is_some_and(|d| d.category == category);
                if in_category {
                    let slot = relevance.entry(doc).or_insert(0);
                    *slot = (*slot).saturating_add(*weight);
                }
            }
        }

        let mut matches: Vec<TextMatch> = relevance
            .into_iter()
            .filter_map(|(key, relevance)| {
                self.docs.get(key).map(|doc| TextMatch {
                    id: doc.id.clone(),
                    name: doc.name.clone(),
                    relevance,
                })
            })
            .collect();
        matches.sort_by(|a, b| {
            b.relevance
                .cmp(&a.relevance)
                .then_with(|| a.name.cmp(&b.name))
                .then_with(|| a.id.canonical().cmp(&b.id.canonical()))
        });
        matches.truncate(limit);
        matches
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

// =============================================================================
// TESTS
// =============================================================================
