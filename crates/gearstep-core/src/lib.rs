//! # gearstep-core
//!
//! Deterministic decision engine for the gearstep configuration dialogue.
//!
//! The crate answers two questions for every turn of a configuration session:
//!
//! 1. **Which stage comes next?** ([`sequencer`], [`applicability`],
//!    [`ledger`], [`autoskip`])
//! 2. **Which candidates does that stage offer?** ([`consolidate`], fed by
//!    the strategy results the app layer gathers concurrently)
//!
//! ## Design Principles
//!
//! - All collections are `BTreeMap`/`BTreeSet` for deterministic ordering
//! - Scores and weights are fixed-point integers (millionths), never floats
//! - No I/O, no async, no clocks: identical inputs give identical outputs
//! - Signals (unregistered stages, failed strategies) are values, not panics

pub mod applicability;
pub mod autoskip;
pub mod cache;
pub mod catalog;
pub mod consolidate;
pub mod formats;
pub mod graph;
pub mod index;
pub mod ledger;
pub mod normalize;
pub mod primitives;
pub mod sequencer;
pub mod session;
pub mod stage;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub use applicability::{Applicability, ApplicabilityMap, ApplicabilityTable, CapabilityMap};
pub use autoskip::{AutoSkipEngine, ParentAttribution, SkipDecision, SkipReason};
pub use catalog::{Catalog, CatalogEdge, CatalogProduct};
pub use consolidate::{
    ConsolidationPolicy, MergeOutcome, StrategyHit, StrategyResult, consolidate,
};
pub use formats::{ConfigFingerprint, SessionRecord};
pub use graph::{CompatibilityGraph, GraphMatch, GraphQuery};
pub use index::{TextIndex, TextMatch};
pub use ledger::{LedgerEntry, LedgerSnapshot, SelectionLedger, SnapshotEntry};
pub use normalize::UnitNormalizer;
pub use primitives::{CombinedScore, Score, Weight};
pub use sequencer::{SequencerSignal, StateSequencer, Step, Transition};
pub use session::{SessionState, StagePointer};
pub use stage::{SearchSpec, Stage, StageConfig, StageRegistry};

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Stable identifier of a stage, as written in the stage config.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StageId(pub String);

impl StageId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Product identifier as reported by a backend.
///
/// Backends disagree on spacing and case of article numbers, so equality
/// across backends goes through [`ProductId::canonical`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub String);

impl ProductId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Canonical form: whitespace removed, ASCII upper-cased.
    #[must_use]
    pub fn canonical(&self) -> ProductId {
        ProductId(
            self.0
                .chars()
                .filter(|c| !c.is_whitespace())
                .map(|c| c.to_ascii_uppercase())
                .collect(),
        )
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// STRATEGY KIND
// =============================================================================

/// The retrieval methods a consolidation can combine.
///
/// The declaration order is the canonical processing order during
/// consolidation, which keeps merged output independent of task completion
/// order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    ExactMatch,
    Keyword,
    Semantic,
    Rerank,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 4] = [
        StrategyKind::ExactMatch,
        StrategyKind::Keyword,
        StrategyKind::Semantic,
        StrategyKind::Rerank,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ExactMatch => "exact_match",
            Self::Keyword => "keyword",
            Self::Semantic => "semantic",
            Self::Rerank => "rerank",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// PRODUCT REFERENCE
// =============================================================================

/// A candidate or selected product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRef {
    pub id: ProductId,
    pub name: String,
    pub category: String,
    /// Normalized score per contributing strategy.
    pub scores: BTreeMap<StrategyKind, Score>,
    /// Weighted sum of `scores`, filled in by consolidation.
    pub combined: CombinedScore,
    /// Explicit edge priority from the exact-match strategy (lower is better).
    pub priority: Option<u32>,
    /// Short justification from the rerank strategy.
    pub rationale: Option<String>,
}

impl ProductRef {
    /// Create a bare product reference with no scores attached.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            id: ProductId::new(id),
            name: name.into(),
            category: category.into(),
            scores: BTreeMap::new(),
            combined: CombinedScore::ZERO,
            priority: None,
            rationale: None,
        }
    }

    /// Canonical id used for deduplication.
    #[must_use]
    pub fn key(&self) -> ProductId {
        self.id.canonical()
    }
}

// =============================================================================
// ERRORS
// =============================================================================

/// Stage, applicability or catalog configuration that cannot be used.
///
/// Always raised at load time; a running session never sees one.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("stage config is empty")]
    NoStages,

    #[error("duplicate stage id '{0}'")]
    DuplicateStage(StageId),

    #[error("stage '{stage}' has ordinal {ordinal}, which does not exceed the previous ordinal {previous}")]
    OrdinalNotIncreasing {
        stage: StageId,
        ordinal: u32,
        previous: u32,
    },

    #[error("stage '{stage}' depends on unknown stage '{dependency}'")]
    UnknownDependency { stage: StageId, dependency: StageId },

    #[error("stage '{stage}' depends on '{dependency}', which does not come earlier")]
    DependencyNotEarlier { stage: StageId, dependency: StageId },

    #[error("stage '{stage}' excludes selections of unknown stage '{excluded}'")]
    UnknownExclusion { stage: StageId, excluded: StageId },

    #[error("applicability override for root '{root}' names unknown stage '{stage}'")]
    UnknownApplicabilityStage { root: ProductId, stage: StageId },

    #[error("duplicate product id '{0}' in catalog")]
    DuplicateProduct(ProductId),

    #[error("compatibility edge references unknown product '{0}'")]
    UnknownProduct(ProductId),

    #[error("stage '{stage}' searches category '{category}', which has no catalog products")]
    UnknownCategory { stage: StageId, category: String },

    #[error("invalid setting: {0}")]
    Invalid(String),

    #[error("parse error: {0}")]
    Parse(String),
}

/// Errors raised by the core crate.
#[derive(Debug, thiserror::Error)]
pub enum GearstepError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("snapshot error: {0}")]
    Snapshot(String),

    #[error("unit normalizer failed to build: {0}")]
    Normalizer(#[from] regex::Error),

    #[error("stage '{stage}' accepts at most one product, got {count}")]
    TooManySelections { stage: StageId, count: usize },
}

/// Result alias for core operations.
pub type Result<T> = std::result::Result<T, GearstepError>;

// =============================================================================
// TESTS
// =============================================================================
