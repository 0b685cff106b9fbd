//! # Search Strategies
//!
//! One generic search path: every stage is searched through the same
//! [`SearchStrategy`] implementations, parameterized by the stage's
//! [`SearchSpec`](gearstep_core::SearchSpec).

pub mod backend;
pub mod exact;
pub mod keyword;
pub mod rerank;
pub mod semantic;

pub use backend::BackendError;
pub use exact::ExactMatchStrategy;
pub use keyword::KeywordStrategy;
pub use rerank::RerankStrategy;
pub use semantic::SemanticStrategy;

use async_trait::async_trait;
use gearstep_core::{ProductId, ProductRef, Stage, StageId, StrategyHit, StrategyKind, StrategyResult};
use std::collections::BTreeMap;
use std::time::Instant;

// =============================================================================
// SEARCH CONTEXT
// =============================================================================

/// Everything a strategy knows about the stage being searched.
#[derive(Debug, Clone)]
pub struct SearchContext {
    pub stage: Stage,
    /// Free text as typed; may be empty.
    pub text: String,
    /// Structured constraints accumulated for the session.
    pub constraints: BTreeMap<String, String>,
    /// Prior selections in ordinal order.
    pub selected: Vec<(StageId, ProductRef)>,
}

impl SearchContext {
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            text: String::new(),
            constraints: BTreeMap::new(),
            selected: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    #[must_use]
    pub fn with_constraints(mut self, constraints: BTreeMap<String, String>) -> Self {
        self.constraints = constraints;
        self
    }

    #[must_use]
    pub fn with_selected(mut self, selected: Vec<(StageId, ProductRef)>) -> Self {
        self.selected = selected;
        self
    }

    /// Products to traverse from. Empty when the stage has no compatibility
    /// filter, which makes exact match list the whole category.
    pub fn sources(&self) -> Vec<ProductId> {
        if !self.stage.is_compatibility_gated() {
            return Vec::new();
        }
        let excluded = &self.stage.search.exclude_reachable_from;
        self.selected
            .iter()
            .filter(|(stage, _)| !excluded.contains(stage))
            .map(|(_, product)| product.id.clone())
            .collect()
    }

    /// Selections whose compatible products are excluded from the results.
    pub fn exclusion_sources(&self) -> Vec<ProductId> {
        let excluded = &self.stage.search.exclude_reachable_from;
        self.selected
            .iter()
            .filter(|(stage, _)| excluded.contains(stage))
            .map(|(_, product)| product.id.clone())
            .collect()
    }

    /// Whether the compatibility gate applies to this search.
    pub fn compatibility_requested(&self) -> bool {
        self.stage.is_compatibility_gated() && !self.sources().is_empty()
    }

    /// Free text with the constraint values appended.
    pub fn query_text(&self) -> String {
        let mut parts: Vec<&str> = Vec::new();
        let text = self.text.trim();
        if !text.is_empty() {
            parts.push(text);
        }
        parts.extend(
            self.constraints
                .values()
                .map(|v| v.trim())
                .filter(|v| !v.is_empty()),
        );
        parts.join(" ")
    }
}

// =============================================================================
// STRATEGY TRAIT
// =============================================================================

/// One retrieval method.
///
/// Implementors only provide [`SearchStrategy::fetch`]; [`SearchStrategy::search`]
/// turns its outcome into a [`StrategyResult`] so a failure never escapes.
#[async_trait]
pub trait SearchStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    async fn fetch(
        &self,
        context: &SearchContext,
        limit: usize,
    ) -> Result<Vec<StrategyHit>, BackendError>;

    async fn search(&self, context: &SearchContext, limit: usize) -> StrategyResult {
        let started = Instant::now();
        let outcome = self.fetch(context, limit).await;
        let latency_ms = started.elapsed().as_millis() as u64;
        match outcome {
            Ok(hits) => StrategyResult::ok(self.kind(), hits, latency_ms),
            Err(e) => {
                tracing::warn!(strategy = %self.kind(), error = %e, "strategy failed");
                StrategyResult::failed(self.kind(), e.to_string(), latency_ms)
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
