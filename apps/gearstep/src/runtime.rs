//! # Runtime
//!
//! A loaded config wired to live strategies. The server keeps one behind an
//! `Arc` and swaps it wholesale on reload.

use crate::config::{AppConfig, LoadedConfig, RerankRetrieval};
use crate::consolidator::{ResultConsolidator, StrategySlot};
use crate::error::AppError;
use crate::flow::ConfigurationFlow;
use crate::search::backend::{
    CatalogGraphSource, CatalogTextIndex, HttpEmbedder, HttpReranker, HttpVectorIndex,
};
use crate::search::rerank::Consensus;
use crate::search::{
    ExactMatchStrategy, KeywordStrategy, RerankStrategy, SearchStrategy, SemanticStrategy,
};
use gearstep_core::{
    ApplicabilityTable, Catalog, ConfigFingerprint, StageRegistry, StrategyKind, UnitNormalizer,
    Weight,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub struct Runtime {
    pub config: AppConfig,
    pub registry: StageRegistry,
    pub applicability: ApplicabilityTable,
    pub catalog: Catalog,
    pub fingerprint: ConfigFingerprint,
    pub normalizer: Arc<UnitNormalizer>,
    pub consolidator: ResultConsolidator,
}

impl Runtime {
    /// Load and wire everything from a `gearstep.json` path.
    pub fn load(path: &Path) -> Result<Self, AppError> {
        Self::build(LoadedConfig::load(path)?)
    }

    /// Wire the configured strategies onto a loaded config.
    pub fn build(loaded: LoadedConfig) -> Result<Self, AppError> {
        let normalizer = Arc::new(UnitNormalizer::new()?);
        let consolidator = wire_strategies(&loaded, &normalizer)?;
        info!(
            stages = loaded.registry.len(),
            products = loaded.catalog.products.len(),
            strategies = ?consolidator.kinds(),
            fingerprint = %loaded.fingerprint,
            "runtime ready"
        );
        Ok(Self::with_consolidator(loaded, normalizer, consolidator))
    }

    /// Use an explicit consolidator instead of the configured strategies.
    pub fn with_consolidator(
        loaded: LoadedConfig,
        normalizer: Arc<UnitNormalizer>,
        consolidator: ResultConsolidator,
    ) -> Self {
        Self {
            config: loaded.app,
            registry: loaded.registry,
            applicability: loaded.applicability,
            catalog: loaded.catalog,
            fingerprint: loaded.fingerprint,
            normalizer,
            consolidator,
        }
    }

    pub fn flow(&self) -> ConfigurationFlow<'_> {
        ConfigurationFlow::new(&self.registry, &self.applicability, &self.consolidator)
    }
}

fn slot(
    strategy: Arc<dyn SearchStrategy>,
    settings: &crate::config::StrategySettings,
) -> StrategySlot {
    StrategySlot {
        strategy,
        weight: Weight::from_percent(settings.weight_percent),
        timeout: Duration::from_millis(settings.timeout_ms),
        limit: settings.limit,
    }
}

fn wire_strategies(
    loaded: &LoadedConfig,
    normalizer: &Arc<UnitNormalizer>,
) -> Result<ResultConsolidator, AppError> {
    let app = &loaded.app;
    let search = &app.search;
    let backends = &app.backends;
    let request_timeout = Duration::from_millis(backends.request_timeout_ms);

    let graph = Arc::new(loaded.catalog.build_graph());
    let index = Arc::new(loaded.catalog.build_index(normalizer));

    let exact_settings = search.strategy(StrategyKind::ExactMatch);
    let keyword_settings = search.strategy(StrategyKind::Keyword);
    let semantic_settings = search.strategy(StrategyKind::Semantic);
    let rerank_settings = search.strategy(StrategyKind::Rerank);

    let exact: Arc<dyn SearchStrategy> =
        Arc::new(ExactMatchStrategy::new(Arc::new(CatalogGraphSource::new(graph))));
    let keyword: Arc<dyn SearchStrategy> = Arc::new(KeywordStrategy::new(
        Arc::new(CatalogTextIndex::new(index)),
        Arc::clone(normalizer),
        keyword_settings.min_score_percent,
    ));
    let semantic: Option<Arc<dyn SearchStrategy>> =
        match (&backends.embedder_url, &backends.vector_url) {
            (Some(embedder), Some(vectors)) => {
                let strategy: Arc<dyn SearchStrategy> = Arc::new(SemanticStrategy::new(
                    Arc::new(HttpEmbedder::new(embedder.clone(), request_timeout)?),
                    Arc::new(HttpVectorIndex::new(vectors.clone(), request_timeout)?),
                    search.embedding_cache_size,
                    semantic_settings.min_score_percent,
                ));
                Some(strategy)
            }
            _ => None,
        };

    let mut consolidator = ResultConsolidator::new(
        Duration::from_millis(search.overall_timeout_ms),
        search.max_results,
    );
    if exact_settings.enabled {
        consolidator = consolidator.with_strategy(slot(Arc::clone(&exact), &exact_settings));
    }
    if keyword_settings.enabled {
        consolidator = consolidator.with_strategy(slot(Arc::clone(&keyword), &keyword_settings));
    }
    if let Some(semantic) = semantic.as_ref().filter(|_| semantic_settings.enabled) {
        consolidator = consolidator.with_strategy(slot(Arc::clone(semantic), &semantic_settings));
    }

    if rerank_settings.enabled {
        if let Some(url) = &backends.reranker_url {
            let retrievers: Vec<Arc<dyn SearchStrategy>> = match search.rerank.retrieval {
                RerankRetrieval::Exact => vec![exact],
                RerankRetrieval::Keyword => vec![keyword],
                RerankRetrieval::Semantic => semantic.into_iter().collect(),
                RerankRetrieval::Combined => [Some(exact), Some(keyword), semantic]
                    .into_iter()
                    .flatten()
                    .collect(),
            };
            let rerank = RerankStrategy::new(
                retrievers,
                Arc::new(HttpReranker::new(url.clone(), request_timeout)?),
                search.rerank.pool_size,
                Consensus {
                    runs: search.rerank.runs,
                    agreement_percent: search.rerank.agreement_percent,
                },
                rerank_settings.min_score_percent,
            );
            consolidator = consolidator.with_strategy(slot(Arc::new(rerank), &rerank_settings));
        }
    }

    Ok(consolidator)
}
