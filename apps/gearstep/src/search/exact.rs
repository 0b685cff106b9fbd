//! Structural matches from the compatibility graph.

use super::backend::{BackendError, CompatibilitySource};
use super::{SearchContext, SearchStrategy};
use async_trait::async_trait;
use gearstep_core::{GraphQuery, Score, StrategyHit, StrategyKind};
use std::sync::Arc;

/// Every match scores full; its edge priority rides along for tie-breaks.
pub struct ExactMatchStrategy {
    source: Arc<dyn CompatibilitySource>,
}

impl ExactMatchStrategy {
    pub fn new(source: Arc<dyn CompatibilitySource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl SearchStrategy for ExactMatchStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::ExactMatch
    }

    async fn fetch(
        &self,
        context: &SearchContext,
        limit: usize,
    ) -> Result<Vec<StrategyHit>, BackendError> {
        let spec = &context.stage.search;
        let query = GraphQuery::new(spec.category.clone())
            .from_sources(context.sources())
            .relationship(spec.relationship.clone())
            .excluding(context.exclusion_sources());

        let matches = self.source.compatible(&query, limit).await?;
        Ok(matches
            .into_iter()
            .map(|m| {
                StrategyHit::new(m.id.as_str(), m.name, m.category, Score::FULL)
                    .with_priority(m.priority)
            })
            .collect())
    }
}
