//! # Stage Registry
//!
//! The ordered list of decision points a configuration session walks
//! through, loaded once from the stage config and immutable afterwards.
//!
//! Validation happens here, at load time:
//! - stage ids are unique
//! - ordinals strictly increase in declaration order
//! - a dependency names a stage with a smaller ordinal
//! - exclusion lists and applicability overrides name registered stages

use crate::applicability::{ApplicabilityTable, CapabilityMap};
use crate::formats::ConfigFingerprint;
use crate::{ConfigError, ProductId, StageId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

fn default_true() -> bool {
    true
}

/// Per-stage search record: what to look for and how to gate it.
///
/// One of these replaces what would otherwise be a dedicated search routine
/// per product category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchSpec {
    /// Catalog category the stage offers.
    pub category: String,

    /// Compatibility relationship to follow from prior selections.
    /// `None` follows every relationship.
    #[serde(default)]
    pub relationship: Option<String>,

    /// Restrict candidates to products compatible with prior selections.
    #[serde(default)]
    pub compatibility_filter: bool,

    /// Stages whose selections' compatible products are excluded.
    #[serde(default)]
    pub exclude_reachable_from: Vec<StageId>,

    /// Optional per-stage cap on consolidated candidates.
    #[serde(default)]
    pub limit: Option<usize>,
}

impl SearchSpec {
    #[must_use]
    pub fn new(category: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            relationship: None,
            compatibility_filter: false,
            exclude_reachable_from: Vec::new(),
            limit: None,
        }
    }

    #[must_use]
    pub fn compatible(mut self) -> Self {
        self.compatibility_filter = true;
        self
    }
}

/// One decision point in the configuration sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    pub id: StageId,
    pub name: String,
    pub ordinal: u32,

    /// A mandatory stage cannot be skipped by the user.
    #[serde(default)]
    pub mandatory: bool,

    #[serde(default)]
    pub multi_select: bool,

    /// Parent stage that must hold at least one selection.
    #[serde(default)]
    pub depends_on: Option<StageId>,

    /// Allow single-candidate auto-advance after a user action.
    #[serde(default = "default_true")]
    pub auto_advance: bool,

    pub search: SearchSpec,
}

impl Stage {
    /// Create an optional, single-select stage with default search settings.
    #[must_use]
    pub fn new(id: impl Into<String>, ordinal: u32, category: impl Into<String>) -> Self {
        let id = StageId::new(id);
        Self {
            name: id.0.clone(),
            id,
            ordinal,
            mandatory: false,
            multi_select: false,
            depends_on: None,
            auto_advance: true,
            search: SearchSpec::new(category),
        }
    }

    #[must_use]
    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    #[must_use]
    pub fn multi(mut self) -> Self {
        self.multi_select = true;
        self
    }

    #[must_use]
    pub fn depends_on(mut self, parent: impl Into<String>) -> Self {
        self.depends_on = Some(StageId::new(parent));
        self
    }

    #[must_use]
    pub fn compatible(mut self) -> Self {
        self.search.compatibility_filter = true;
        self
    }

    #[must_use]
    pub fn is_dependency_gated(&self) -> bool {
        self.depends_on.is_some()
    }

    #[must_use]
    pub fn is_compatibility_gated(&self) -> bool {
        self.search.compatibility_filter
    }

    /// Whether a selection of `count` products is valid for this stage.
    #[must_use]
    pub fn accepts(&self, count: usize) -> bool {
        match (self.multi_select, self.mandatory) {
            (false, true) => count == 1,
            (false, false) => count <= 1,
            (true, true) => count >= 1,
            (true, false) => true,
        }
    }
}

// =============================================================================
// STAGE CONFIG (on-disk shape)
// =============================================================================

/// The stage config file: ordered stage descriptors plus per-root
/// applicability overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageConfig {
    pub stages: Vec<Stage>,

    /// Root product id -> stage id -> applicability.
    #[serde(default)]
    pub applicability: BTreeMap<ProductId, CapabilityMap>,
}

impl StageConfig {
    /// Parse a stage config from JSON. Validation is done by [`StageConfig::into_parts`].
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Fingerprint of the canonical JSON form of this config.
    pub fn fingerprint(&self) -> Result<ConfigFingerprint, ConfigError> {
        let canonical = serde_json::to_vec(self).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Ok(ConfigFingerprint::of(&canonical))
    }

    /// Validate and split into the registry and the applicability table.
    pub fn into_parts(self) -> Result<(StageRegistry, ApplicabilityTable), ConfigError> {
        let registry = StageRegistry::new(self.stages)?;

        for (root, capabilities) in &self.applicability {
            for stage in capabilities.keys() {
                if registry.get(stage).is_none() {
                    return Err(ConfigError::UnknownApplicabilityStage {
                        root: root.clone(),
                        stage: stage.clone(),
                    });
                }
            }
        }

        Ok((registry, ApplicabilityTable::new(self.applicability)))
    }
}

// =============================================================================
// STAGE REGISTRY
// =============================================================================

/// Immutable, validated, ordinal-ordered list of stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageRegistry {
    stages: Vec<Stage>,
    index: BTreeMap<StageId, usize>,
}

impl StageRegistry {
    /// Validate and build a registry. Stages must be listed in ordinal order.
    pub fn new(stages: Vec<Stage>) -> Result<Self, ConfigError> {
        if stages.is_empty() {
            return Err(ConfigError::NoStages);
        }

        let mut index = BTreeMap::new();
        let mut previous: Option<u32> = None;

        for (position, stage) in stages.iter().enumerate() {
            if index.insert(stage.id.clone(), position).is_some() {
                return Err(ConfigError::DuplicateStage(stage.id.clone()));
            }

            if let Some(prev) = previous {
                if stage.ordinal <= prev {
                    return Err(ConfigError::OrdinalNotIncreasing {
                        stage: stage.id.clone(),
                        ordinal: stage.ordinal,
                        previous: prev,
                    });
                }
            }
            previous = Some(stage.ordinal);
        }

        for stage in &stages {
            if let Some(dependency) = &stage.depends_on {
                let Some(&dep_pos) = index.get(dependency) else {
                    return Err(ConfigError::UnknownDependency {
                        stage: stage.id.clone(),
                        dependency: dependency.clone(),
                    });
                };
                if stages[dep_pos].ordinal >= stage.ordinal {
                    return Err(ConfigError::DependencyNotEarlier {
                        stage: stage.id.clone(),
                        dependency: dependency.clone(),
                    });
                }
            }

            for excluded in &stage.search.exclude_reachable_from {
                if !index.contains_key(excluded) {
                    return Err(ConfigError::UnknownExclusion {
                        stage: stage.id.clone(),
                        excluded: excluded.clone(),
                    });
                }
            }
        }

        Ok(Self { stages, index })
    }

    /// The first stage; its selection is the root selection.
    #[must_use]
    pub fn root(&self) -> &Stage {
        &self.stages[0]
    }

    #[must_use]
    pub fn is_root(&self, id: &StageId) -> bool {
        self.root().id == *id
    }

    #[must_use]
    pub fn get(&self, id: &StageId) -> Option<&Stage> {
        self.index.get(id).map(|&pos| &self.stages[pos])
    }

    /// Position of a stage in ordinal order.
    #[must_use]
    pub fn position(&self, id: &StageId) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// All stages in ordinal order.
    #[must_use]
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Stages strictly after `id`, in ordinal order.
    #[must_use]
    pub fn after(&self, id: &StageId) -> Option<&[Stage]> {
        let pos = self.position(id)?;
        Some(&self.stages[pos.saturating_add(1)..])
    }

    /// Stages strictly before `id`, in ordinal order.
    #[must_use]
    pub fn before(&self, id: &StageId) -> Option<&[Stage]> {
        let pos = self.position(id)?;
        Some(&self.stages[..pos])
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

// =============================================================================
// TESTS
// =============================================================================
