//! # Applicability
//!
//! Whether a stage is relevant for the product chosen at the root stage.
//!
//! A root product declares a capability map (stage id -> applicability).
//! Unknown keys resolve to [`Applicability::Yes`]: when nothing is known
//! about a capability, the stage is shown.

use crate::stage::{Stage, StageRegistry};
use crate::{ProductId, StageId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Relevance of a stage for the current root selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Applicability {
    Yes,
    No,
    /// The root product already provides this capability built-in.
    IntegratedAlternative,
}

impl Applicability {
    /// Only `Yes` stages are ever presented.
    #[must_use]
    pub fn is_applicable(self) -> bool {
        matches!(self, Self::Yes)
    }
}

/// Declared capabilities of one root product.
pub type CapabilityMap = BTreeMap<StageId, Applicability>;

/// Resolve one stage against a capability map. Missing keys default to `Yes`.
#[must_use]
pub fn resolve(stage: &Stage, capabilities: &CapabilityMap) -> Applicability {
    capabilities
        .get(&stage.id)
        .copied()
        .unwrap_or(Applicability::Yes)
}

// =============================================================================
// RESOLVED MAP (per session)
// =============================================================================

/// Applicability of every stage, resolved once per root selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicabilityMap(BTreeMap<StageId, Applicability>);

impl ApplicabilityMap {
    /// Every stage applicable. Used before a root product is chosen.
    #[must_use]
    pub fn permissive() -> Self {
        Self::default()
    }

    /// Resolve every registered stage. The root stage is always applicable.
    #[must_use]
    pub fn resolve_all(registry: &StageRegistry, capabilities: &CapabilityMap) -> Self {
        let resolved = registry
            .stages()
            .iter()
            .map(|stage| {
                let value = if registry.is_root(&stage.id) {
                    Applicability::Yes
                } else {
                    resolve(stage, capabilities)
                };
                (stage.id.clone(), value)
            })
            .collect();
        Self(resolved)
    }

    /// Build directly from explicit values (stages not listed are `Yes`).
    #[must_use]
    pub fn from_values(values: impl IntoIterator<Item = (StageId, Applicability)>) -> Self {
        Self(values.into_iter().collect())
    }

    #[must_use]
    pub fn get(&self, stage: &StageId) -> Applicability {
        self.0.get(stage).copied().unwrap_or(Applicability::Yes)
    }

    #[must_use]
    pub fn is_applicable(&self, stage: &StageId) -> bool {
        self.get(stage).is_applicable()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&StageId, Applicability)> {
        self.0.iter().map(|(k, v)| (k, *v))
    }
}

// =============================================================================
// APPLICABILITY TABLE (load-once)
// =============================================================================

/// Capability maps per root product, keyed by canonical product id.
///
/// Combines catalog-declared capabilities with the stage config's explicit
/// overrides; overrides win on conflict.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplicabilityTable {
    overrides: BTreeMap<ProductId, CapabilityMap>,
    declared: BTreeMap<ProductId, CapabilityMap>,
}

impl ApplicabilityTable {
    #[must_use]
    pub fn new(overrides: BTreeMap<ProductId, CapabilityMap>) -> Self {
        Self {
            overrides: overrides
                .into_iter()
                .map(|(id, caps)| (id.canonical(), caps))
                .collect(),
            declared: BTreeMap::new(),
        }
    }

    /// Register capabilities a catalog product declares for itself.
    pub fn declare(&mut self, product: &ProductId, capabilities: CapabilityMap) {
        if capabilities.is_empty() {
            return;
        }
        self.declared
            .entry(product.canonical())
            .or_default()
            .extend(capabilities);
    }

    /// Effective capability map for a root product.
    #[must_use]
    pub fn capabilities_for(&self, root: &ProductId) -> CapabilityMap {
        let key = root.canonical();
        let mut merged = self.declared.get(&key).cloned().unwrap_or_default();
        if let Some(overrides) = self.overrides.get(&key) {
            merged.extend(overrides.iter().map(|(k, v)| (k.clone(), *v)));
        }
        merged
    }

    /// Resolve the full per-session map for a root product.
    #[must_use]
    pub fn resolve_for(&self, registry: &StageRegistry, root: &ProductId) -> ApplicabilityMap {
        ApplicabilityMap::resolve_all(registry, &self.capabilities_for(root))
    }
}

// =============================================================================
// TESTS
// =============================================================================
