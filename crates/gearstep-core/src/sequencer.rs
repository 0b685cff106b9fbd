//! # State Sequencer
//!
//! Computes the next and previous applicable stage of a session.
//!
//! A stage is *reachable* when its resolved applicability is `Yes` and, if it
//! depends on a parent stage, that parent holds at least one selection.
//! Reachability is evaluated fresh on every call against the applicability
//! map passed in; nothing is cached per session.

use crate::applicability::ApplicabilityMap;
use crate::ledger::SelectionLedger;
use crate::stage::{Stage, StageRegistry};
use crate::StageId;

/// Where the dialogue goes next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Stage(StageId),
    /// No applicable stage remains.
    Finalize,
}

impl Step {
    #[must_use]
    pub fn stage(&self) -> Option<&StageId> {
        match self {
            Self::Stage(id) => Some(id),
            Self::Finalize => None,
        }
    }
}

/// Recoverable condition observed while sequencing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequencerSignal {
    /// The current stage is not in the registry; the caller was sent to
    /// [`Step::Finalize`].
    StageNotRegistered(StageId),
}

/// A sequencing result plus an optional signal for the caller to log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition<T> {
    pub target: T,
    pub signal: Option<SequencerSignal>,
}

impl<T> Transition<T> {
    fn clean(target: T) -> Self {
        Self {
            target,
            signal: None,
        }
    }
}

/// Stateless navigator over a [`StageRegistry`].
#[derive(Debug, Clone, Copy)]
pub struct StateSequencer<'a> {
    registry: &'a StageRegistry,
}

impl<'a> StateSequencer<'a> {
    #[must_use]
    pub fn new(registry: &'a StageRegistry) -> Self {
        Self { registry }
    }

    /// Whether `stage` may be presented under the given ledger and applicability.
    #[must_use]
    pub fn is_reachable(
        &self,
        stage: &Stage,
        ledger: &SelectionLedger,
        applicability: &ApplicabilityMap,
    ) -> bool {
        if !applicability.is_applicable(&stage.id) {
            return false;
        }
        match &stage.depends_on {
            Some(parent) => ledger.is_satisfied(parent),
            None => true,
        }
    }

    /// First reachable stage strictly after `current`.
    #[must_use]
    pub fn get_next(
        &self,
        current: &StageId,
        ledger: &SelectionLedger,
        applicability: &ApplicabilityMap,
    ) -> Transition<Step> {
        let Some(later) = self.registry.after(current) else {
            return Transition {
                target: Step::Finalize,
                signal: Some(SequencerSignal::StageNotRegistered(current.clone())),
            };
        };

        let next = later
            .iter()
            .find(|stage| self.is_reachable(stage, ledger, applicability))
            .map_or(Step::Finalize, |stage| Step::Stage(stage.id.clone()));

        Transition::clean(next)
    }

    /// Last reachable stage strictly before `current`.
    ///
    /// The root stage is always reachable, so `None` only comes back when
    /// `current` is the root itself or is not registered.
    #[must_use]
    pub fn get_previous(
        &self,
        current: &StageId,
        ledger: &SelectionLedger,
        applicability: &ApplicabilityMap,
    ) -> Transition<Option<StageId>> {
        let Some(earlier) = self.registry.before(current) else {
            return Transition {
                target: None,
                signal: Some(SequencerSignal::StageNotRegistered(current.clone())),
            };
        };

        let previous = earlier
            .iter()
            .rev()
            .find(|stage| self.is_reachable(stage, ledger, applicability))
            .map(|stage| stage.id.clone());

        Transition::clean(previous)
    }

    /// Every stage a walk from the root would present, assuming each visited
    /// stage ends up satisfied.
    ///
    /// Used for previews; a real session may skip more once searches run.
    #[must_use]
    pub fn plan(&self, applicability: &ApplicabilityMap) -> Vec<StageId> {
        let root = self.registry.root().id.clone();
        let mut visited = vec![root.clone()];

        let mut current = root;
        while let Step::Stage(next) = self.get_next_assuming(&current, &visited, applicability) {
            visited.push(next.clone());
            current = next;
        }
        visited
    }

    fn get_next_assuming(
        &self,
        current: &StageId,
        visited: &[StageId],
        applicability: &ApplicabilityMap,
    ) -> Step {
        let Some(later) = self.registry.after(current) else {
            return Step::Finalize;
        };
        later
            .iter()
            .find(|stage| {
                applicability.is_applicable(&stage.id)
                    && stage
                        .depends_on
                        .as_ref()
                        .is_none_or(|parent| visited.contains(parent))
            })
            .map_or(Step::Finalize, |stage| Step::Stage(stage.id.clone()))
    }
}

// =============================================================================
// TESTS
// =============================================================================
