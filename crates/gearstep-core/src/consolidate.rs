//! # Consolidation Merge
//!
//! Pure merge step of the result consolidator: takes whatever the
//! strategies returned (successes, failures, timeouts) and produces one
//! deduplicated, ranked candidate list.
//!
//! ## Ordering
//!
//! 1. Combined score, descending
//! 2. Exact-match edge priority, ascending (products with one come first)
//! 3. Name, ascending
//! 4. Canonical id, ascending
//!
//! Results are processed in [`StrategyKind`] order regardless of the order
//! they arrive in, so the output depends only on their content.

use crate::primitives::{MAX_STRATEGY_HITS, Score, Weight};
use crate::{ProductId, ProductRef, StrategyKind};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// STRATEGY OUTPUT
// =============================================================================

/// One candidate as reported by a single strategy, already normalized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyHit {
    pub id: ProductId,
    pub name: String,
    pub category: String,
    pub score: Score,
    /// Explicit edge priority (exact match only).
    pub priority: Option<u32>,
    /// Short justification (rerank only).
    pub rationale: Option<String>,
}

impl StrategyHit {
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        category: impl Into<String>,
        score: Score,
    ) -> Self {
        Self {
            id: ProductId::new(id),
            name: name.into(),
            category: category.into(),
            score,
            priority: None,
            rationale: None,
        }
    }

    #[must_use]
    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = Some(priority);
        self
    }

    #[must_use]
    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = Some(rationale.into());
        self
    }
}

/// Output of one strategy call. A failed call carries no hits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyResult {
    pub strategy: StrategyKind,
    pub hits: Vec<StrategyHit>,
    pub latency_ms: u64,
    pub error: Option<String>,
}

impl StrategyResult {
    #[must_use]
    pub fn ok(strategy: StrategyKind, hits: Vec<StrategyHit>, latency_ms: u64) -> Self {
        Self {
            strategy,
            hits,
            latency_ms,
            error: None,
        }
    }

    #[must_use]
    pub fn failed(strategy: StrategyKind, error: impl Into<String>, latency_ms: u64) -> Self {
        Self {
            strategy,
            hits: Vec::new(),
            latency_ms,
            error: Some(error.into()),
        }
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

// =============================================================================
// POLICY
// =============================================================================

/// Weights and limits for one merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsolidationPolicy {
    /// Weight per strategy. A strategy without an entry counts with weight 1.
    pub weights: BTreeMap<StrategyKind, Weight>,
    pub max_results: usize,
    /// Use the exact-match result as the compatible set for other strategies.
    pub compatibility_gate: bool,
}

impl ConsolidationPolicy {
    #[must_use]
    pub fn new(max_results: usize) -> Self {
        Self {
            weights: BTreeMap::new(),
            max_results,
            compatibility_gate: false,
        }
    }

    #[must_use]
    pub fn with_weight(mut self, strategy: StrategyKind, weight: Weight) -> Self {
        self.weights.insert(strategy, weight);
        self
    }

    #[must_use]
    pub fn gated(mut self, gate: bool) -> Self {
        self.compatibility_gate = gate;
        self
    }

    #[must_use]
    pub fn weight(&self, strategy: StrategyKind) -> Weight {
        self.weights.get(&strategy).copied().unwrap_or(Weight::UNIT)
    }
}

impl Default for ConsolidationPolicy {
    fn default() -> Self {
        Self::new(crate::primitives::DEFAULT_MAX_RESULTS)
    }
}

/// Ranked candidates plus whether a compatibility filter took effect.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeOutcome {
    pub products: Vec<ProductRef>,
    pub compatibility_applied: bool,
}

// =============================================================================
// MERGE
// =============================================================================

struct Accumulated {
    product: ProductRef,
    source_weight: Weight,
}

/// Merge strategy results into one ranked, deduplicated list.
///
/// Failed results are ignored. If the compatibility gate is on but no
/// exact-match result succeeded, nothing is filtered.
#[must_use]
pub fn consolidate(results: &[StrategyResult], policy: &ConsolidationPolicy) -> MergeOutcome {
    let mut ordered: Vec<&StrategyResult> = results.iter().filter(|r| r.is_ok()).collect();
    ordered.sort_by_key(|r| r.strategy);

    let allowed: Option<BTreeSet<ProductId>> = if policy.compatibility_gate {
        ordered
            .iter()
            .find(|r| r.strategy == StrategyKind::ExactMatch)
            .map(|r| r.hits.iter().map(|h| h.id.canonical()).collect())
    } else {
        None
    };

    let mut merged: BTreeMap<ProductId, Accumulated> = BTreeMap::new();

    for result in ordered {
        let weight = policy.weight(result.strategy);
        let mut seen = BTreeSet::new();

        for hit in result.hits.iter().take(MAX_STRATEGY_HITS) {
            let key = hit.id.canonical();
            if !seen.insert(key.clone()) {
                continue;
            }
            if let Some(allowed) = &allowed {
                if result.strategy != StrategyKind::ExactMatch && !allowed.contains(&key) {
                    continue;
                }
            }

            let acc = match merged.entry(key) {
                Entry::Vacant(slot) => slot.insert(Accumulated {
                    product: ProductRef::new(hit.id.0.clone(), hit.name.clone(), hit.category.clone()),
                    source_weight: weight,
                }),
                Entry::Occupied(slot) => {
                    let acc = slot.into_mut();
                    if weight > acc.source_weight {
                        acc.product.id = hit.id.clone();
                        acc.product.name = hit.name.clone();
                        acc.product.category = hit.category.clone();
                        acc.source_weight = weight;
                    }
                    acc
                }
            };

            acc.product.scores.insert(result.strategy, hit.score);
            acc.product.combined = acc.product.combined.saturating_add(weight.apply(hit.score));

            if result.strategy == StrategyKind::ExactMatch {
                if let Some(priority) = hit.priority {
                    acc.product.priority = Some(acc.product.priority.map_or(priority, |p| p.min(priority)));
                }
            }
            if result.strategy == StrategyKind::Rerank && hit.rationale.is_some() {
                acc.product.rationale = hit.rationale.clone();
            }
        }
    }

    let mut products: Vec<ProductRef> = merged.into_values().map(|acc| acc.product).collect();
    products.sort_by(rank);
    products.truncate(policy.max_results);

    MergeOutcome {
        products,
        compatibility_applied: allowed.is_some(),
    }
}

fn rank(a: &ProductRef, b: &ProductRef) -> Ordering {
    b.combined
        .cmp(&a.combined)
        .then_with(|| match (a.priority, b.priority) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.name.cmp(&b.name))
        .then_with(|| a.key().cmp(&b.key()))
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::CombinedScore;

    fn exact(id: &str, priority: u32) -> StrategyHit {
        StrategyHit::new(id, id, "Feeder", Score::FULL).with_priority(priority)
    }

    fn keyword(id: &str, millionths: u32) -> StrategyHit {
        StrategyHit::new(id, id, "Feeder", Score::from_millionths(millionths))
    }

    fn scenario_policy() -> ConsolidationPolicy {
        ConsolidationPolicy::new(20)
            .with_weight(StrategyKind::ExactMatch, Weight::UNIT)
            .with_weight(StrategyKind::Keyword, Weight::from_percent(50))
    }

    fn ids(outcome: &MergeOutcome) -> Vec<&str> {
        outcome.products.iter().map(|p| p.id.as_str()).collect()
    }

    #[test]
    fn weighted_sum_ranks_overlap_first() {
        let results = vec![
            StrategyResult::ok(StrategyKind::ExactMatch, vec![exact("A", 1), exact("B", 2)], 3),
            StrategyResult::ok(
                StrategyKind::Keyword,
                vec![keyword("B", 900_000), keyword("C", 500_000)],
                5,
            ),
        ];
        let outcome = consolidate(&results, &scenario_policy());
        assert_eq!(ids(&outcome), vec!["B", "A", "C"]);
        assert_eq!(outcome.products[0].combined, CombinedScore(1_450_000));
        assert_eq!(outcome.products[1].combined, CombinedScore(1_000_000));
        assert_eq!(outcome.products[2].combined, CombinedScore(250_000));
        assert_eq!(outcome.products[0].scores.len(), 2);
        assert!(!outcome.compatibility_applied);
    }

    #[test]
    fn arrival_order_does_not_matter() {
        let exact_result =
            StrategyResult::ok(StrategyKind::ExactMatch, vec![exact("A", 1), exact("B", 2)], 3);
        let keyword_result = StrategyResult::ok(
            StrategyKind::Keyword,
            vec![keyword("B", 900_000), keyword("C", 500_000)],
            5,
        );
        let forward = consolidate(&[exact_result.clone(), keyword_result.clone()], &scenario_policy());
        let reverse = consolidate(&[keyword_result, exact_result], &scenario_policy());
        assert_eq!(forward, reverse);
    }

    #[test]
    fn duplicates_across_spelling_merge_once() {
        let results = vec![
            StrategyResult::ok(StrategyKind::ExactMatch, vec![exact("0445 100", 1)], 1),
            StrategyResult::ok(
                StrategyKind::Keyword,
                vec![keyword("0445100", 800_000), keyword("0445100", 700_000)],
                1,
            ),
        ];
        let outcome = consolidate(&results, &scenario_policy());
        assert_eq!(outcome.products.len(), 1);
        assert_eq!(
            outcome.products[0].scores.get(&StrategyKind::Keyword),
            Some(&Score::from_millionths(800_000))
        );
    }

    #[test]
    fn metadata_comes_from_heaviest_contributor() {
        let policy = ConsolidationPolicy::new(10)
            .with_weight(StrategyKind::ExactMatch, Weight::from_percent(50))
            .with_weight(StrategyKind::Semantic, Weight::from_percent(200));
        let results = vec![
            StrategyResult::ok(
                StrategyKind::ExactMatch,
                vec![StrategyHit::new("p1", "graph name", "Torch", Score::FULL)],
                1,
            ),
            StrategyResult::ok(
                StrategyKind::Semantic,
                vec![StrategyHit::new("P1", "vector name", "Torch", Score::from_percent(40))],
                1,
            ),
        ];
        let outcome = consolidate(&results, &policy);
        assert_eq!(outcome.products[0].name, "vector name");
        assert_eq!(outcome.products[0].id.as_str(), "P1");
    }

    #[test]
    fn failures_contribute_nothing() {
        let results = vec![
            StrategyResult::failed(StrategyKind::Semantic, "timeout", 500),
            StrategyResult::failed(StrategyKind::Rerank, "503", 20),
        ];
        let outcome = consolidate(&results, &ConsolidationPolicy::default());
        assert!(outcome.products.is_empty());
    }

    #[test]
    fn gate_filters_other_strategies_to_exact_set() {
        let results = vec![
            StrategyResult::ok(StrategyKind::ExactMatch, vec![exact("A", 1)], 1),
            StrategyResult::ok(StrategyKind::Keyword, vec![keyword("A", 500_000), keyword("Z", 999_000)], 1),
        ];
        let outcome = consolidate(&results, &scenario_policy().gated(true));
        assert_eq!(ids(&outcome), vec!["A"]);
        assert!(outcome.compatibility_applied);
    }

    #[test]
    fn gate_with_empty_exact_result_filters_everything() {
        let results = vec![
            StrategyResult::ok(StrategyKind::ExactMatch, Vec::new(), 1),
            StrategyResult::ok(StrategyKind::Keyword, vec![keyword("Z", 999_000)], 1),
        ];
        let outcome = consolidate(&results, &scenario_policy().gated(true));
        assert!(outcome.products.is_empty());
        assert!(outcome.compatibility_applied);
    }

    #[test]
    fn gate_degrades_open_without_exact_result() {
        let results = vec![
            StrategyResult::failed(StrategyKind::ExactMatch, "graph down", 1),
            StrategyResult::ok(StrategyKind::Keyword, vec![keyword("Z", 999_000)], 1),
        ];
        let outcome = consolidate(&results, &scenario_policy().gated(true));
        assert_eq!(ids(&outcome), vec!["Z"]);
        assert!(!outcome.compatibility_applied);
    }

    #[test]
    fn ties_break_on_priority_then_name() {
        let results = vec![
            StrategyResult::ok(
                StrategyKind::ExactMatch,
                vec![exact("zeta", 1), exact("alpha", 2)],
                1,
            ),
            StrategyResult::ok(StrategyKind::Keyword, vec![keyword("beta", 1_000_000)], 1),
        ];
        let policy = ConsolidationPolicy::new(10)
            .with_weight(StrategyKind::ExactMatch, Weight::UNIT)
            .with_weight(StrategyKind::Keyword, Weight::UNIT);
        let outcome = consolidate(&results, &policy);
        assert_eq!(ids(&outcome), vec!["zeta", "alpha", "beta"]);
    }

    #[test]
    fn rerank_rationale_is_kept_and_output_truncated() {
        let results = vec![StrategyResult::ok(
            StrategyKind::Rerank,
            vec![
                StrategyHit::new("r1", "R1", "Torch", Score::from_percent(90)).with_rationale("fits 500 A"),
                StrategyHit::new("r2", "R2", "Torch", Score::from_percent(80)),
            ],
            1,
        )];
        let outcome = consolidate(&results, &ConsolidationPolicy::new(1));
        assert_eq!(outcome.products.len(), 1);
        assert_eq!(outcome.products[0].rationale.as_deref(), Some("fits 500 A"));
    }
}
