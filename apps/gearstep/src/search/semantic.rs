//! Vector similarity search with a bounded query-embedding cache.

use super::backend::{BackendError, Embedder, VectorIndex};
use super::{SearchContext, SearchStrategy};
use async_trait::async_trait;
use gearstep_core::cache::{CacheStats, LruCache, query_key};
use gearstep_core::{Score, StrategyHit, StrategyKind};
use std::sync::Arc;
use tokio::sync::Mutex;

pub struct SemanticStrategy {
    embedder: Arc<dyn Embedder>,
    vectors: Arc<dyn VectorIndex>,
    cache: Mutex<LruCache<String, Vec<f32>>>,
    min_similarity: Score,
}

impl SemanticStrategy {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        vectors: Arc<dyn VectorIndex>,
        cache_size: usize,
        min_similarity_percent: u8,
    ) -> Self {
        Self {
            embedder,
            vectors,
            cache: Mutex::new(LruCache::new(cache_size)),
            min_similarity: Score::from_percent(min_similarity_percent),
        }
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.lock().await.stats()
    }

    /// Embed once per distinct query text. The lock is released while the
    /// embedder runs; two concurrent misses may both call it.
    async fn embedding(&self, text: &str) -> Result<Vec<f32>, BackendError> {
        let key = query_key(text);
        if let Some(hit) = self.cache.lock().await.get(&key) {
            return Ok(hit);
        }
        let embedding = self.embedder.embed(text).await?;
        self.cache.lock().await.insert(key, embedding.clone());
        Ok(embedding)
    }
}

#[async_trait]
impl SearchStrategy for SemanticStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Semantic
    }

    async fn fetch(
        &self,
        context: &SearchContext,
        limit: usize,
    ) -> Result<Vec<StrategyHit>, BackendError> {
        let text = context.query_text();
        if text.is_empty() {
            return Ok(Vec::new());
        }

        let embedding = self.embedding(&text).await?;
        let category = &context.stage.search.category;
        let hits = self.vectors.nearest(category, &embedding, limit).await?;

        Ok(hits
            .into_iter()
            .filter(|hit| hit.similarity >= self.min_similarity && &hit.category == category)
            .map(|hit| StrategyHit::new(hit.id.as_str(), hit.name, hit.category, hit.similarity))
            .collect())
    }
}
