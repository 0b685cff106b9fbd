//! Full-text search over unit-normalized text.

use super::backend::{BackendError, FullTextIndex};
use super::{SearchContext, SearchStrategy};
use async_trait::async_trait;
use gearstep_core::{Score, StrategyHit, StrategyKind, UnitNormalizer};
use std::sync::Arc;

/// Scores are relevance relative to the best hit of the same query.
pub struct KeywordStrategy {
    index: Arc<dyn FullTextIndex>,
    normalizer: Arc<UnitNormalizer>,
    min_score: Score,
}

impl KeywordStrategy {
    pub fn new(
        index: Arc<dyn FullTextIndex>,
        normalizer: Arc<UnitNormalizer>,
        min_score_percent: u8,
    ) -> Self {
        Self {
            index,
            normalizer,
            min_score: Score::from_percent(min_score_percent),
        }
    }
}

#[async_trait]
impl SearchStrategy for KeywordStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Keyword
    }

    async fn fetch(
        &self,
        context: &SearchContext,
        limit: usize,
    ) -> Result<Vec<StrategyHit>, BackendError> {
        let query = self.normalizer.normalize(&context.query_text());
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let category = &context.stage.search.category;
        let matches = self.index.search(category, &query, limit).await?;
        let top = matches.iter().map(|m| m.relevance).max().unwrap_or(0);

        Ok(matches
            .into_iter()
            .filter_map(|m| {
                let score = Score::ratio(m.relevance, top);
                (score >= self.min_score)
                    .then(|| StrategyHit::new(m.id.as_str(), m.name, category.as_str(), score))
            })
            .collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::search::backend::CatalogTextIndex;
    use gearstep_core::{ProductId, Stage, TextIndex};

    fn strategy(min_score_percent: u8) -> KeywordStrategy {
        let normalizer = Arc::new(UnitNormalizer::new().expect("normalizer rules compile"));
        let mut index = TextIndex::new();
        index.add(
            &normalizer,
            &ProductId::new("T-500"),
            "Torch 500",
            "Torch",
            &["water cooled MIG torch, 500 Amps, 4 meters"],
        );
        index.add(
            &normalizer,
            &ProductId::new("T-300"),
            "Torch 300",
            "Torch",
            &["gas cooled MIG torch, 300 Amps"],
        );
        KeywordStrategy::new(
            Arc::new(CatalogTextIndex::new(Arc::new(index))),
            normalizer,
            min_score_percent,
        )
    }

    #[tokio::test]
    async fn unit_variants_hit_the_same_product() {
        let strategy = strategy(0);
        let context = SearchContext::new(Stage::new("torch", 2, "Torch")).with_text("500 Ampères");
        let result = strategy.search(&context, 10).await;
        assert!(result.is_ok());
        assert_eq!(result.hits.first().map(|h| h.id.as_str()), Some("T-500"));
        assert_eq!(result.hits.first().map(|h| h.score), Some(Score::FULL));
    }

    #[tokio::test]
    async fn cutoff_drops_weak_hits() {
        let strategy = strategy(90);
        let context =
            SearchContext::new(Stage::new("torch", 2, "Torch")).with_text("water cooled 500 A");
        let result = strategy.search(&context, 10).await;
        assert_eq!(result.hits.len(), 1);
    }

    #[tokio::test]
    async fn empty_query_returns_nothing() {
        let strategy = strategy(0);
        let context = SearchContext::new(Stage::new("torch", 2, "Torch"));
        let result = strategy.search(&context, 10).await;
        assert!(result.is_ok());
        assert!(result.hits.is_empty());
    }
}
