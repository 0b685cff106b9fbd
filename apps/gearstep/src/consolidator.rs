//! # Result Consolidator
//!
//! Runs every enabled strategy concurrently, bounds each by its own timeout
//! and the whole call by an overall deadline, then hands the collected
//! results to the deterministic merge in `gearstep_core::consolidate`.
//!
//! A strategy that fails, times out or panics contributes an empty result
//! with its error recorded. Nothing here ever fails the caller.

use crate::search::{SearchContext, SearchStrategy};
use gearstep_core::{
    ConsolidationPolicy, ProductRef, StrategyKind, StrategyResult, Weight, consolidate,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{info, warn};

// =============================================================================
// TYPES
// =============================================================================

/// One registered strategy and how to run it.
#[derive(Clone)]
pub struct StrategySlot {
    pub strategy: Arc<dyn SearchStrategy>,
    pub weight: Weight,
    pub timeout: Duration,
    pub limit: usize,
}

/// Outcome of one strategy within a consolidation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyReport {
    pub strategy: StrategyKind,
    pub hits: usize,
    pub latency_ms: u64,
    pub error: Option<String>,
}

impl From<&StrategyResult> for StrategyReport {
    fn from(result: &StrategyResult) -> Self {
        Self {
            strategy: result.strategy,
            hits: result.hits.len(),
            latency_ms: result.latency_ms,
            error: result.error.clone(),
        }
    }
}

/// Result of [`ResultConsolidator::execute`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Consolidation {
    pub products: Vec<ProductRef>,
    /// One report per enabled strategy, in canonical strategy order.
    pub reports: Vec<StrategyReport>,
    pub compatibility_applied: bool,
}

// =============================================================================
// CONSOLIDATOR
// =============================================================================

pub struct ResultConsolidator {
    slots: Vec<StrategySlot>,
    overall_timeout: Duration,
    max_results: usize,
}

impl ResultConsolidator {
    pub fn new(overall_timeout: Duration, max_results: usize) -> Self {
        Self {
            slots: Vec::new(),
            overall_timeout,
            max_results: max_results.max(1),
        }
    }

    /// Register a strategy. A later slot of the same kind replaces the earlier one.
    #[must_use]
    pub fn with_strategy(mut self, slot: StrategySlot) -> Self {
        let kind = slot.strategy.kind();
        self.slots.retain(|s| s.strategy.kind() != kind);
        self.slots.push(slot);
        self
    }

    pub fn kinds(&self) -> Vec<StrategyKind> {
        let mut kinds: Vec<_> = self.slots.iter().map(|s| s.strategy.kind()).collect();
        kinds.sort();
        kinds
    }

    fn policy(&self, context: &SearchContext) -> ConsolidationPolicy {
        let max_results = context
            .stage
            .search
            .limit
            .map_or(self.max_results, |limit| limit.clamp(1, self.max_results));
        self.slots
            .iter()
            .fold(ConsolidationPolicy::new(max_results), |policy, slot| {
                policy.with_weight(slot.strategy.kind(), slot.weight)
            })
            .gated(context.compatibility_requested())
    }

    /// Run all strategies for one stage search and merge the results.
    pub async fn execute(&self, context: &SearchContext) -> Consolidation {
        let started = Instant::now();
        let shared = Arc::new(context.clone());
        let mut tasks = JoinSet::new();

        for slot in &self.slots {
            let strategy = Arc::clone(&slot.strategy);
            let context = Arc::clone(&shared);
            let per_strategy = slot.timeout;
            let limit = slot.limit;
            tasks.spawn(async move {
                let kind = strategy.kind();
                let begun = Instant::now();
                match tokio::time::timeout(per_strategy, strategy.search(&context, limit)).await {
                    Ok(result) => result,
                    Err(_) => {
                        let latency = begun.elapsed().as_millis() as u64;
                        warn!(strategy = %kind, timeout_ms = per_strategy.as_millis() as u64, "strategy timed out");
                        StrategyResult::failed(kind, "timed out", latency)
                    }
                }
            });
        }

        let deadline = tokio::time::Instant::now() + self.overall_timeout;
        let mut results: BTreeMap<StrategyKind, StrategyResult> = BTreeMap::new();
        let mut overall_expired = false;

        loop {
            match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(Ok(result))) => {
                    results.insert(result.strategy, result);
                }
                Ok(Some(Err(e))) => {
                    warn!(error = %e, "strategy task failed");
                }
                Ok(None) => break,
                Err(_) => {
                    overall_expired = true;
                    tasks.abort_all();
                    break;
                }
            }
        }

        let elapsed = started.elapsed().as_millis() as u64;
        for kind in self.kinds() {
            results.entry(kind).or_insert_with(|| {
                let reason = if overall_expired {
                    "overall timeout"
                } else {
                    "strategy task failed"
                };
                warn!(strategy = %kind, reason, "strategy contributed nothing");
                StrategyResult::failed(kind, reason, elapsed)
            });
        }

        let results: Vec<StrategyResult> = results.into_values().collect();
        let policy = self.policy(context);
        let outcome = consolidate(&results, &policy);
        let reports: Vec<StrategyReport> = results.iter().map(StrategyReport::from).collect();

        info!(
            stage = %context.stage.id,
            candidates = outcome.products.len(),
            failed = reports.iter().filter(|r| r.error.is_some()).count(),
            gated = outcome.compatibility_applied,
            elapsed_ms = elapsed,
            "consolidated"
        );

        Consolidation {
            products: outcome.products,
            reports,
            compatibility_applied: outcome.compatibility_applied,
        }
    }
}
