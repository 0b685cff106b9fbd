//! # Configuration
//!
//! `gearstep.json` settings plus the load sequence that turns them, the
//! stage config and the catalog into one validated [`LoadedConfig`].
//!
//! Every check happens here, before a server accepts its first request. A
//! running process only ever swaps one fully validated config for another.

use crate::error::AppError;
use gearstep_core::{
    ApplicabilityTable, Catalog, ConfigError, ConfigFingerprint, StageConfig, StageRegistry,
    StrategyKind,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

// =============================================================================
// SETTINGS
// =============================================================================

/// Per-strategy knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategySettings {
    pub enabled: bool,
    /// Relative weight, in percent (100 = 1.0).
    pub weight_percent: u32,
    pub timeout_ms: u64,
    /// Maximum hits requested from the backend.
    pub limit: usize,
    /// Cutoff: keyword relative to the top hit, semantic on similarity,
    /// rerank on the 0-100 score.
    #[serde(alias = "min_similarity_percent")]
    pub min_score_percent: u8,
}

impl Default for StrategySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            weight_percent: 100,
            timeout_ms: 1_000,
            limit: 50,
            min_score_percent: 0,
        }
    }
}

impl StrategySettings {
    /// Built-in defaults when a strategy is not mentioned at all.
    #[must_use]
    pub fn default_for(kind: StrategyKind) -> Self {
        match kind {
            StrategyKind::ExactMatch => Self {
                timeout_ms: 500,
                ..Self::default()
            },
            StrategyKind::Keyword => Self {
                weight_percent: 50,
                timeout_ms: 500,
                min_score_percent: 20,
                ..Self::default()
            },
            StrategyKind::Semantic => Self {
                enabled: false,
                weight_percent: 70,
                timeout_ms: 1_500,
                min_score_percent: 50,
                ..Self::default()
            },
            StrategyKind::Rerank => Self {
                enabled: false,
                weight_percent: 120,
                timeout_ms: 3_000,
                limit: 10,
                ..Self::default()
            },
        }
    }
}

/// Which candidates the reranker scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RerankRetrieval {
    Exact,
    Keyword,
    Semantic,
    /// Exact, keyword and semantic, deduplicated.
    #[default]
    Combined,
}

/// Rerank-specific settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankSettings {
    pub retrieval: RerankRetrieval,
    /// Candidate pool size fetched from each retriever.
    pub pool_size: usize,
    /// Independent scoring runs; 1 disables consensus.
    pub runs: u32,
    /// Share of successful runs an item must appear in to survive.
    pub agreement_percent: u8,
}

impl Default for RerankSettings {
    fn default() -> Self {
        Self {
            retrieval: RerankRetrieval::Combined,
            pool_size: 30,
            runs: 1,
            agreement_percent: 51,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub overall_timeout_ms: u64,
    pub max_results: usize,
    pub embedding_cache_size: usize,
    pub strategies: BTreeMap<StrategyKind, StrategySettings>,
    pub rerank: RerankSettings,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            overall_timeout_ms: 4_000,
            max_results: gearstep_core::primitives::DEFAULT_MAX_RESULTS,
            embedding_cache_size: gearstep_core::cache::DEFAULT_CACHE_SIZE,
            strategies: StrategyKind::ALL
                .iter()
                .map(|&kind| (kind, StrategySettings::default_for(kind)))
                .collect(),
            rerank: RerankSettings::default(),
        }
    }
}

impl SearchSettings {
    /// Effective settings for one strategy.
    #[must_use]
    pub fn strategy(&self, kind: StrategyKind) -> StrategySettings {
        self.strategies
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| StrategySettings::default_for(kind))
    }
}

/// External HTTP services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendSettings {
    pub embedder_url: Option<String>,
    pub vector_url: Option<String>,
    pub reranker_url: Option<String>,
    pub request_timeout_ms: u64,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            embedder_url: None,
            vector_url: None,
            reranker_url: None,
            request_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: String,
    pub rate_limit_per_second: u32,
    /// Sessions not saved for this long are dropped.
    pub session_idle_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            rate_limit_per_second: 50,
            session_idle_secs: 3_600,
        }
    }
}

// =============================================================================
// APP CONFIG
// =============================================================================

/// Contents of `gearstep.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Relative paths are resolved against the config file's directory.
    pub stages_path: PathBuf,
    pub catalog_path: PathBuf,
    #[serde(default)]
    pub search: SearchSettings,
    #[serde(default)]
    pub backends: BackendSettings,
    #[serde(default)]
    pub server: ServerSettings,
}

impl AppConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Read from disk and resolve relative paths.
    pub fn from_file(path: &Path) -> Result<Self, AppError> {
        let json = read(path)?;
        let mut config = Self::from_json(&json)?;
        if let Some(base) = path.parent() {
            config.stages_path = resolve(base, &config.stages_path);
            config.catalog_path = resolve(base, &config.catalog_path);
        }
        Ok(config)
    }

    /// Settings-level checks that do not need the stage config.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let search = &self.search;
        if search.max_results == 0 {
            return Err(ConfigError::Invalid("search.max_results must be at least 1".into()));
        }
        if search.overall_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "search.overall_timeout_ms must be at least 1".into(),
            ));
        }

        for kind in StrategyKind::ALL {
            let settings = search.strategy(kind);
            if settings.enabled && settings.timeout_ms == 0 {
                return Err(ConfigError::Invalid(format!("{kind}: timeout_ms must be at least 1")));
            }
            if settings.min_score_percent > 100 {
                return Err(ConfigError::Invalid(format!(
                    "{kind}: min_score_percent must be within 0..=100"
                )));
            }
        }

        if search.strategy(StrategyKind::Semantic).enabled
            && (self.backends.embedder_url.is_none() || self.backends.vector_url.is_none())
        {
            return Err(ConfigError::Invalid(
                "semantic strategy requires backends.embedder_url and backends.vector_url".into(),
            ));
        }

        if search.strategy(StrategyKind::Rerank).enabled {
            if self.backends.reranker_url.is_none() {
                return Err(ConfigError::Invalid(
                    "rerank strategy requires backends.reranker_url".into(),
                ));
            }
            if search.rerank.retrieval == RerankRetrieval::Semantic
                && (self.backends.embedder_url.is_none() || self.backends.vector_url.is_none())
            {
                return Err(ConfigError::Invalid(
                    "rerank retrieval 'semantic' requires the semantic backends".into(),
                ));
            }
        }

        let rerank = &search.rerank;
        if rerank.runs == 0 {
            return Err(ConfigError::Invalid("search.rerank.runs must be at least 1".into()));
        }
        if !(1..=100).contains(&rerank.agreement_percent) {
            return Err(ConfigError::Invalid(
                "search.rerank.agreement_percent must be within 1..=100".into(),
            ));
        }

        if self.server.rate_limit_per_second == 0 {
            return Err(ConfigError::Invalid(
                "server.rate_limit_per_second must be at least 1".into(),
            ));
        }
        if self.server.session_idle_secs == 0 {
            return Err(ConfigError::Invalid(
                "server.session_idle_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn read(path: &Path) -> Result<String, AppError> {
    std::fs::read_to_string(path).map_err(|source| AppError::Read {
        path: path.to_path_buf(),
        source,
    })
}

// =============================================================================
// LOADED CONFIG
// =============================================================================

/// Everything loaded and cross-validated at startup or on reload.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub app: AppConfig,
    pub registry: StageRegistry,
    pub applicability: ApplicabilityTable,
    pub catalog: Catalog,
    pub fingerprint: ConfigFingerprint,
}

impl LoadedConfig {
    /// Load `gearstep.json` and the files it points to.
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let app = AppConfig::from_file(path)?;
        let stages = StageConfig::from_json(&read(&app.stages_path)?)?;
        let catalog = Catalog::from_json(&read(&app.catalog_path)?)?;
        Ok(Self::from_parts(app, stages, catalog)?)
    }

    /// Validate and assemble already-parsed parts.
    pub fn from_parts(
        app: AppConfig,
        stages: StageConfig,
        catalog: Catalog,
    ) -> Result<Self, ConfigError> {
        app.validate()?;
        let fingerprint = stages.fingerprint()?;
        let (registry, mut applicability) = stages.into_parts()?;
        catalog.validate()?;
        catalog.check_stages(&registry)?;
        catalog.declare_capabilities(&registry, &mut applicability)?;

        Ok(Self {
            app,
            registry,
            applicability,
            catalog,
            fingerprint,
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================
