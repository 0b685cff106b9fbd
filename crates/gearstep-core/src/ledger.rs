//! # Selection Ledger
//!
//! Per-session record of what happened at each stage.
//!
//! Each stage is in exactly one of three states: never decided
//! ([`LedgerEntry::Unselected`]), explicitly passed over
//! ([`LedgerEntry::Skipped`]), or decided with a list of products
//! ([`LedgerEntry::Selected`]). An empty `Selected` list is a valid outcome
//! for an optional multi-select stage and is distinct from `Skipped`.

use crate::applicability::ApplicabilityMap;
use crate::stage::{Stage, StageRegistry};
use crate::{GearstepError, ProductRef, StageId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Outcome of one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEntry {
    Unselected,
    Skipped,
    Selected(Vec<ProductRef>),
}

static UNSELECTED: LedgerEntry = LedgerEntry::Unselected;

impl LedgerEntry {
    /// A dependency on this stage is satisfied: at least one product selected.
    #[must_use]
    pub fn is_satisfied(&self) -> bool {
        matches!(self, Self::Selected(products) if !products.is_empty())
    }

    /// The stage has been decided one way or the other.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        !matches!(self, Self::Unselected)
    }

    #[must_use]
    pub fn products(&self) -> &[ProductRef] {
        match self {
            Self::Selected(products) => products,
            Self::Unselected | Self::Skipped => &[],
        }
    }
}

/// External view of a stage outcome: never `Unselected`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SnapshotEntry {
    Selected(Vec<ProductRef>),
    Skipped,
}

/// Every applicable stage mapped to its external outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LedgerSnapshot(pub BTreeMap<StageId, SnapshotEntry>);

impl LedgerSnapshot {
    #[must_use]
    pub fn get(&self, stage: &StageId) -> Option<&SnapshotEntry> {
        self.0.get(stage)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// =============================================================================
// LEDGER
// =============================================================================

/// Three-valued per-stage record. Stages never written are `Unselected`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionLedger {
    entries: BTreeMap<StageId, LedgerEntry>,
}

impl SelectionLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn entry(&self, stage: &StageId) -> &LedgerEntry {
        self.entries.get(stage).unwrap_or(&UNSELECTED)
    }

    #[must_use]
    pub fn is_satisfied(&self, stage: &StageId) -> bool {
        self.entry(stage).is_satisfied()
    }

    /// Record a selection. A single-select stage holds at most one product.
    pub fn select(&mut self, stage: &Stage, products: Vec<ProductRef>) -> Result<(), GearstepError> {
        if !stage.multi_select && products.len() > 1 {
            return Err(GearstepError::TooManySelections {
                stage: stage.id.clone(),
                count: products.len(),
            });
        }
        self.entries
            .insert(stage.id.clone(), LedgerEntry::Selected(products));
        Ok(())
    }

    /// Record an explicit skip.
    pub fn skip(&mut self, stage: &StageId) {
        self.entries.insert(stage.clone(), LedgerEntry::Skipped);
    }

    /// Reset every stage after `stage` to `Unselected`.
    ///
    /// Used when an earlier decision changes and later ones may no longer hold.
    pub fn clear_after(&mut self, registry: &StageRegistry, stage: &StageId) {
        let Some(later) = registry.after(stage) else {
            return;
        };
        for later_stage in later {
            self.entries.remove(&later_stage.id);
        }
    }

    /// All selected products in ordinal order, tagged with their stage.
    #[must_use]
    pub fn selected_products(&self, registry: &StageRegistry) -> Vec<(StageId, ProductRef)> {
        registry
            .stages()
            .iter()
            .flat_map(|stage| {
                self.entry(&stage.id)
                    .products()
                    .iter()
                    .map(|p| (stage.id.clone(), p.clone()))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// External three-valued picture.
    ///
    /// Includes every stage whose applicability is `Yes`; anything not
    /// selected reads as `Skipped`, however far the session got.
    #[must_use]
    pub fn snapshot(
        &self,
        registry: &StageRegistry,
        applicability: &ApplicabilityMap,
    ) -> LedgerSnapshot {
        let entries = registry
            .stages()
            .iter()
            .filter(|stage| applicability.is_applicable(&stage.id))
            .map(|stage| {
                let entry = match self.entry(&stage.id) {
                    LedgerEntry::Selected(products) => SnapshotEntry::Selected(products.clone()),
                    LedgerEntry::Skipped | LedgerEntry::Unselected => SnapshotEntry::Skipped,
                };
                (stage.id.clone(), entry)
            })
            .collect();
        LedgerSnapshot(entries)
    }

    /// Number of stages with a recorded outcome.
    #[must_use]
    pub fn resolved_count(&self) -> usize {
        self.entries.values().filter(|e| e.is_resolved()).count()
    }
}

// =============================================================================
// TESTS
// =============================================================================
