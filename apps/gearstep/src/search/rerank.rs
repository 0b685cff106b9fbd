//! # Rerank
//!
//! Retrieve a candidate pool with other strategies, then let the reranker
//! score it. With `runs > 1` the reranker is called that many times
//! concurrently and only candidates a large enough share of the successful
//! runs agree on survive.

use super::backend::{BackendError, RerankCandidate, RerankVerdict, Reranker};
use super::{SearchContext, SearchStrategy};
use async_trait::async_trait;
use gearstep_core::{ProductId, Score, StrategyHit, StrategyKind};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::task::JoinSet;

/// Consensus settings for repeated scoring runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Consensus {
    pub runs: u32,
    pub agreement_percent: u8,
}

impl Default for Consensus {
    fn default() -> Self {
        Self {
            runs: 1,
            agreement_percent: 51,
        }
    }
}

pub struct RerankStrategy {
    retrievers: Vec<Arc<dyn SearchStrategy>>,
    reranker: Arc<dyn Reranker>,
    pool_size: usize,
    consensus: Consensus,
    min_score: u8,
}

impl RerankStrategy {
    pub fn new(
        retrievers: Vec<Arc<dyn SearchStrategy>>,
        reranker: Arc<dyn Reranker>,
        pool_size: usize,
        consensus: Consensus,
        min_score_percent: u8,
    ) -> Self {
        Self {
            retrievers,
            reranker,
            pool_size: pool_size.max(1),
            consensus,
            min_score: min_score_percent.min(100),
        }
    }

    /// Union of the retrievers' hits, first occurrence wins, in retriever order.
    async fn pool(&self, context: &SearchContext) -> Vec<RerankCandidate> {
        let mut seen = BTreeSet::new();
        let mut pool = Vec::new();
        for retriever in &self.retrievers {
            let result = retriever.search(context, self.pool_size).await;
            for hit in result.hits {
                if seen.insert(hit.id.canonical()) {
                    pool.push(RerankCandidate {
                        id: hit.id,
                        name: hit.name,
                        category: hit.category,
                    });
                }
            }
        }
        pool
    }

    async fn score_runs(
        &self,
        query: &str,
        pool: &[RerankCandidate],
        limit: usize,
    ) -> Result<Vec<Vec<RerankVerdict>>, BackendError> {
        let runs = self.consensus.runs.max(1);
        let mut tasks = JoinSet::new();
        for _ in 0..runs {
            let reranker = Arc::clone(&self.reranker);
            let query = query.to_string();
            let pool = pool.to_vec();
            tasks.spawn(async move { reranker.rerank(&query, &pool, limit).await });
        }

        let mut successful = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(verdicts)) => successful.push(verdicts),
                Ok(Err(e)) => tracing::warn!(error = %e, "rerank run failed"),
                Err(e) => tracing::warn!(error = %e, "rerank run panicked"),
            }
        }

        if successful.is_empty() {
            return Err(BackendError::AllRunsFailed(runs));
        }
        Ok(successful)
    }
}

/// One candidate's votes across runs.
#[derive(Debug, Default)]
struct Tally {
    appearances: u64,
    total: u64,
    /// Best score seen and its justification.
    best: Option<(u8, String)>,
}

/// Merge successful runs into one verdict list.
///
/// An item survives when `appearances * 100 >= agreement * runs`; its score
/// is the integer mean over the runs it appeared in. Ids outside `pool` and
/// repeats within one run are ignored.
fn agree(
    runs: &[Vec<RerankVerdict>],
    pool: &[RerankCandidate],
    agreement_percent: u8,
) -> Vec<(ProductId, u8, String)> {
    let known: BTreeMap<ProductId, &RerankCandidate> =
        pool.iter().map(|c| (c.id.canonical(), c)).collect();
    let mut tallies: BTreeMap<ProductId, Tally> = BTreeMap::new();

    for run in runs {
        let mut counted = BTreeSet::new();
        for verdict in run {
            let key = verdict.id.canonical();
            if !known.contains_key(&key) || !counted.insert(key.clone()) {
                continue;
            }
            let tally = tallies.entry(key).or_default();
            tally.appearances = tally.appearances.saturating_add(1);
            tally.total = tally.total.saturating_add(u64::from(verdict.score));
            let better = match &tally.best {
                None => true,
                Some((score, text)) => {
                    verdict.score > *score
                        || (verdict.score == *score && verdict.justification < *text)
                }
            };
            if better {
                tally.best = Some((verdict.score, verdict.justification.clone()));
            }
        }
    }

    let successful = runs.len() as u64;
    let threshold = u64::from(agreement_percent).saturating_mul(successful);

    tallies
        .into_iter()
        .filter(|(_, tally)| tally.appearances.saturating_mul(100) >= threshold)
        .filter_map(|(key, tally)| {
            let candidate = known.get(&key)?;
            let mean = tally.total / tally.appearances.max(1);
            let justification = tally.best.map(|(_, text)| text).unwrap_or_default();
            Some((candidate.id.clone(), mean.min(100) as u8, justification))
        })
        .collect()
}

#[async_trait]
impl SearchStrategy for RerankStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Rerank
    }

    async fn fetch(
        &self,
        context: &SearchContext,
        limit: usize,
    ) -> Result<Vec<StrategyHit>, BackendError> {
        let pool = self.pool(context).await;
        if pool.is_empty() {
            return Ok(Vec::new());
        }

        let query = context.query_text();
        let runs = self.score_runs(&query, &pool, limit).await?;
        let agreed = agree(&runs, &pool, self.consensus.agreement_percent);

        let names: BTreeMap<ProductId, &RerankCandidate> =
            pool.iter().map(|c| (c.id.canonical(), c)).collect();

        let mut hits: Vec<StrategyHit> = agreed
            .into_iter()
            .filter(|(_, score, _)| *score >= self.min_score)
            .filter_map(|(id, score, justification)| {
                let candidate = names.get(&id.canonical())?;
                let hit = StrategyHit::new(
                    id.as_str(),
                    candidate.name.clone(),
                    candidate.category.clone(),
                    Score::from_percent(score),
                );
                Some(if justification.is_empty() {
                    hit
                } else {
                    hit.with_rationale(justification)
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| a.name.cmp(&b.name))
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(limit);
        Ok(hits)
    }
}

// =============================================================================
// TESTS
// =============================================================================
