//! # Auto-Skip Policy
//!
//! Four independent checks that decide whether a stage is passed over
//! without asking the user:
//!
//! | Check | Runs | Fires when | Visible |
//! |-------|------|------------|---------|
//! | A | before search, dependency-gated stages | parent unselected or empty | no |
//! | B | after search, dependency-gated stages | zero candidates | no |
//! | C | after search, compatibility-gated stages | zero candidates | yes |
//! | D | after a user selection, next stage | exactly one candidate | no |
//!
//! A dependency-gated stage is always judged by B, never by C. The engine
//! only returns decisions; callers write the ledger.

use crate::ledger::SelectionLedger;
use crate::stage::Stage;
use serde::{Deserialize, Serialize};

/// Why a stage was (or was not) skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    None,
    /// Stage A: parent stage has no selection.
    DependencyUnsatisfied,
    /// Stage B: nothing fits the parent selection.
    EmptyAfterDependency,
    /// Stage C: nothing is compatible with prior selections.
    NoCompatibleCandidates,
    /// Stage D: exactly one candidate, taken automatically.
    SingleCandidate,
}

/// Whether the skip should be credited to the parent stage's selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParentAttribution {
    NotApplicable,
    Off,
    /// Decided when the next stage is evaluated.
    Deferred,
    Forced,
}

/// Outcome of one auto-skip check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipDecision {
    pub should_skip: bool,
    pub reason: SkipReason,
    pub user_message: Option<String>,
    pub attribution: ParentAttribution,
}

impl SkipDecision {
    /// The stage is presented normally.
    #[must_use]
    pub fn proceed() -> Self {
        Self {
            should_skip: false,
            reason: SkipReason::None,
            user_message: None,
            attribution: ParentAttribution::NotApplicable,
        }
    }

    fn skip(reason: SkipReason, attribution: ParentAttribution) -> Self {
        Self {
            should_skip: true,
            reason,
            user_message: None,
            attribution,
        }
    }

    #[must_use]
    pub fn force_parent_attribution(&self) -> bool {
        matches!(self.attribution, ParentAttribution::Forced)
    }
}

/// Stateless evaluator for the four checks.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoSkipEngine;

impl AutoSkipEngine {
    /// Stage A: pre-search dependency gate.
    ///
    /// Skips silently when the parent entry is unselected, skipped, or an
    /// empty selection. Stages without a dependency always proceed.
    #[must_use]
    pub fn stage_a(&self, stage: &Stage, ledger: &SelectionLedger) -> SkipDecision {
        match &stage.depends_on {
            Some(parent) if !ledger.is_satisfied(parent) => {
                SkipDecision::skip(SkipReason::DependencyUnsatisfied, ParentAttribution::Deferred)
            }
            _ => SkipDecision::proceed(),
        }
    }

    /// Stage B: empty search on a dependency-gated stage.
    #[must_use]
    pub fn stage_b(&self, stage: &Stage, candidates: usize) -> SkipDecision {
        if stage.is_dependency_gated() && candidates == 0 {
            return SkipDecision::skip(SkipReason::EmptyAfterDependency, ParentAttribution::Forced);
        }
        SkipDecision::proceed()
    }

    /// Stage C: empty search on a compatibility-gated stage.
    ///
    /// Fires only when a compatibility filter was actually applied. On a
    /// dependency-gated stage the decision is Stage B's.
    #[must_use]
    pub fn stage_c(&self, stage: &Stage, candidates: usize, compatibility_applied: bool) -> SkipDecision {
        if stage.is_dependency_gated() {
            return self.stage_b(stage, candidates);
        }
        if compatibility_applied && candidates == 0 {
            return SkipDecision {
                should_skip: true,
                reason: SkipReason::NoCompatibleCandidates,
                user_message: Some(format!("No compatible {} found, continuing.", stage.name)),
                attribution: ParentAttribution::Off,
            };
        }
        SkipDecision::proceed()
    }

    /// Stage B and C combined, B first.
    #[must_use]
    pub fn post_search(&self, stage: &Stage, candidates: usize, compatibility_applied: bool) -> SkipDecision {
        let b = self.stage_b(stage, candidates);
        if b.should_skip {
            return b;
        }
        self.stage_c(stage, candidates, compatibility_applied)
    }

    /// Stage D: single-candidate auto-advance.
    ///
    /// Only fires right after a user action and only if the stage allows it.
    #[must_use]
    pub fn stage_d(&self, stage: &Stage, candidates: usize, after_user_action: bool) -> SkipDecision {
        if after_user_action && stage.auto_advance && candidates == 1 {
            return SkipDecision::skip(SkipReason::SingleCandidate, ParentAttribution::NotApplicable);
        }
        SkipDecision::proceed()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::{ProductRef, StageId};

    fn conditional() -> Stage {
        Stage::new("conditional", 3, "Conditional").depends_on("accessory")
    }

    #[test]
    fn stage_a_skips_silently_when_parent_skipped() {
        let mut ledger = SelectionLedger::new();
        ledger.skip(&StageId::new("accessory"));
        let decision = AutoSkipEngine.stage_a(&conditional(), &ledger);
        assert!(decision.should_skip);
        assert_eq!(decision.user_message, None);
        assert_eq!(decision.reason, SkipReason::DependencyUnsatisfied);
        assert_eq!(decision.attribution, ParentAttribution::Deferred);
        assert!(!decision.force_parent_attribution());
    }

    #[test]
    fn stage_a_proceeds_when_parent_selected() {
        let mut ledger = SelectionLedger::new();
        let parent = Stage::new("accessory", 2, "Accessory");
        ledger
            .select(&parent, vec![ProductRef::new("a", "A", "Accessory")])
            .unwrap();
        assert!(!AutoSkipEngine.stage_a(&conditional(), &ledger).should_skip);
    }

    #[test]
    fn stage_a_ignores_independent_stages() {
        let stage = Stage::new("cooler", 1, "Cooler");
        assert_eq!(
            AutoSkipEngine.stage_a(&stage, &SelectionLedger::new()),
            SkipDecision::proceed()
        );
    }

    #[test]
    fn stage_b_forces_parent_attribution() {
        let decision = AutoSkipEngine.stage_b(&conditional(), 0);
        assert!(decision.should_skip);
        assert!(decision.force_parent_attribution());
        assert_eq!(decision.user_message, None);
        assert!(!AutoSkipEngine.stage_b(&conditional(), 2).should_skip);
    }

    #[test]
    fn stage_c_emits_message_for_compatibility_gate() {
        let stage = Stage::new("cooler", 1, "Cooler").compatible();
        let decision = AutoSkipEngine.stage_c(&stage, 0, true);
        assert!(decision.should_skip);
        assert!(decision.user_message.is_some());
        assert!(!decision.force_parent_attribution());
    }

    #[test]
    fn stage_c_requires_applied_filter() {
        let stage = Stage::new("cooler", 1, "Cooler").compatible();
        assert!(!AutoSkipEngine.stage_c(&stage, 0, false).should_skip);
    }

    #[test]
    fn dependency_gated_stage_never_shows_compatibility_message() {
        let stage = conditional().compatible();
        let decision = AutoSkipEngine.post_search(&stage, 0, true);
        assert_eq!(decision.reason, SkipReason::EmptyAfterDependency);
        assert_eq!(decision.user_message, None);
        assert_eq!(AutoSkipEngine.stage_c(&stage, 0, true), decision);
    }

    #[test]
    fn stage_d_requires_user_action_and_single_candidate() {
        let stage = Stage::new("torch", 4, "Torch");
        assert!(AutoSkipEngine.stage_d(&stage, 1, true).should_skip);
        assert!(!AutoSkipEngine.stage_d(&stage, 1, false).should_skip);
        assert!(!AutoSkipEngine.stage_d(&stage, 2, true).should_skip);

        let mut manual = stage;
        manual.auto_advance = false;
        assert!(!AutoSkipEngine.stage_d(&manual, 1, true).should_skip);
    }
}
