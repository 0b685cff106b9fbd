//! # Session State
//!
//! Everything one configuration session carries between requests.
//!
//! The state is a plain value: the app's flow driver works on an owned copy
//! and hands the whole thing back to the store, so a transition is either
//! committed completely or not at all.

use crate::applicability::ApplicabilityMap;
use crate::ledger::{LedgerSnapshot, SelectionLedger};
use crate::stage::StageRegistry;
use crate::{ProductRef, StageId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Where the session currently stands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StagePointer {
    At(StageId),
    Finalized,
}

/// Per-session dialogue state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    /// Product chosen at the root stage, once there is one.
    pub root: Option<ProductRef>,
    /// Resolved from `root`; permissive until the root is chosen.
    pub applicability: ApplicabilityMap,
    pub ledger: SelectionLedger,
    pub pointer: StagePointer,
    /// Candidates currently presented at the pointer stage.
    pub candidates: Vec<ProductRef>,
    /// Accumulated structured constraints from parameter extraction.
    pub constraints: BTreeMap<String, String>,
    /// User-visible notices produced by the last transition.
    pub notices: Vec<String>,
}

impl SessionState {
    /// Fresh session positioned at the root stage.
    #[must_use]
    pub fn new(registry: &StageRegistry) -> Self {
        Self {
            root: None,
            applicability: ApplicabilityMap::permissive(),
            ledger: SelectionLedger::new(),
            pointer: StagePointer::At(registry.root().id.clone()),
            candidates: Vec::new(),
            constraints: BTreeMap::new(),
            notices: Vec::new(),
        }
    }

    #[must_use]
    pub fn current_stage(&self) -> Option<&StageId> {
        match &self.pointer {
            StagePointer::At(id) => Some(id),
            StagePointer::Finalized => None,
        }
    }

    #[must_use]
    pub fn is_finalized(&self) -> bool {
        matches!(self.pointer, StagePointer::Finalized)
    }

    /// Merge newly extracted constraints; later values win.
    pub fn merge_constraints(&mut self, constraints: BTreeMap<String, String>) {
        self.constraints.extend(constraints);
    }

    #[must_use]
    pub fn snapshot(&self, registry: &StageRegistry) -> LedgerSnapshot {
        self.ledger.snapshot(registry, &self.applicability)
    }
}

// =============================================================================
// TESTS
// =============================================================================
