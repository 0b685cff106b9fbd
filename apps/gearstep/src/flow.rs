//! # Configuration Flow
//!
//! Drives one session through the stage sequence:
//!
//! ```text
//! user action -> ledger write -> get_next -> Stage A -> search -> B/C -> D -> present
//!                                    ^                                  |
//!                                    +------------ skipped -------------+
//! ```
//!
//! Every operation takes the session state by value and returns the new
//! state. The caller commits it only when the operation succeeds, so a
//! failed or cancelled turn leaves the stored session untouched.

use crate::consolidator::{Consolidation, ResultConsolidator, StrategyReport};
use crate::search::SearchContext;
use gearstep_core::{
    ApplicabilityTable, AutoSkipEngine, GearstepError, LedgerEntry, ParentAttribution, ProductId,
    ProductRef, SequencerSignal, SessionState, SkipReason, Stage, StageId, StagePointer,
    StageRegistry, StateSequencer, Step,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

// =============================================================================
// ERRORS
// =============================================================================

/// A user action the current session state cannot accept.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error("session is finalized")]
    Finalized,

    #[error("stage '{got}' is not the current stage")]
    NotCurrentStage { got: StageId },

    #[error("unknown stage '{0}'")]
    UnknownStage(StageId),

    #[error("product '{0}' was not offered at this stage")]
    NotOffered(ProductId),

    #[error("stage '{stage}' does not accept a selection of {count} products")]
    InvalidSelectionCount { stage: StageId, count: usize },

    #[error("stage '{0}' is mandatory and cannot be skipped")]
    MandatoryStage(StageId),

    #[error("already at the first stage")]
    AtFirstStage,

    #[error(transparent)]
    Core(#[from] GearstepError),
}

// =============================================================================
// TYPES
// =============================================================================

/// Free text plus extracted constraints sent with a request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchRequest {
    pub text: String,
    pub constraints: BTreeMap<String, String>,
}

impl SearchRequest {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            constraints: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionAction {
    Skipped,
    AutoSelected,
}

/// A stage the flow decided on without asking the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDecision {
    pub stage: StageId,
    pub action: DecisionAction,
    pub reason: SkipReason,
    pub attribution: ParentAttribution,
    pub message: Option<String>,
}

/// What the caller shows after a turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlowOutcome {
    pub pointer: StagePointer,
    pub candidates: Vec<ProductRef>,
    pub notices: Vec<String>,
    pub decisions: Vec<StageDecision>,
    /// Strategy reports of the search that produced `candidates`.
    pub reports: Vec<StrategyReport>,
}

/// New session state plus the outcome to present.
#[derive(Debug, Clone)]
pub struct Turn {
    pub state: SessionState,
    pub outcome: FlowOutcome,
}

impl Turn {
    fn new(state: SessionState, decisions: Vec<StageDecision>, reports: Vec<StrategyReport>) -> Self {
        let outcome = FlowOutcome {
            pointer: state.pointer.clone(),
            candidates: state.candidates.clone(),
            notices: state.notices.clone(),
            decisions,
            reports,
        };
        Self { state, outcome }
    }
}

// =============================================================================
// FLOW
// =============================================================================

pub struct ConfigurationFlow<'a> {
    registry: &'a StageRegistry,
    applicability: &'a ApplicabilityTable,
    consolidator: &'a ResultConsolidator,
    engine: AutoSkipEngine,
}

impl<'a> ConfigurationFlow<'a> {
    pub fn new(
        registry: &'a StageRegistry,
        applicability: &'a ApplicabilityTable,
        consolidator: &'a ResultConsolidator,
    ) -> Self {
        Self {
            registry,
            applicability,
            consolidator,
            engine: AutoSkipEngine,
        }
    }

    /// Open a session and present the root stage.
    pub async fn start(&self, request: SearchRequest) -> Turn {
        let mut state = SessionState::new(self.registry);
        state.merge_constraints(request.constraints);
        let root = self.registry.root();
        let consolidation = self.search_stage(&state, root, &request.text).await;
        state.candidates = consolidation.products;
        Turn::new(state, Vec::new(), consolidation.reports)
    }

    /// Refine the current stage's candidates. Never auto-skips.
    pub async fn search(
        &self,
        mut state: SessionState,
        stage: Option<&StageId>,
        request: SearchRequest,
    ) -> Result<Turn, FlowError> {
        let current = self.current(&state, stage)?;
        state.merge_constraints(request.constraints);
        state.notices.clear();
        let consolidation = self.search_stage(&state, current, &request.text).await;
        state.candidates = consolidation.products;
        Ok(Turn::new(state, Vec::new(), consolidation.reports))
    }

    /// Record a user selection at the current stage and advance.
    pub async fn select(
        &self,
        mut state: SessionState,
        stage: &StageId,
        ids: &[ProductId],
    ) -> Result<Turn, FlowError> {
        let current = self.current(&state, Some(stage))?;

        let mut seen = BTreeSet::new();
        let mut products = Vec::with_capacity(ids.len());
        for id in ids {
            let key = id.canonical();
            if !seen.insert(key.clone()) {
                continue;
            }
            let offered = state
                .candidates
                .iter()
                .find(|c| c.key() == key)
                .ok_or_else(|| FlowError::NotOffered(id.clone()))?;
            products.push(offered.clone());
        }

        if (products.is_empty() && !current.multi_select) || !current.accepts(products.len()) {
            return Err(FlowError::InvalidSelectionCount {
                stage: current.id.clone(),
                count: products.len(),
            });
        }

        let unchanged = matches!(
            state.ledger.entry(&current.id),
            LedgerEntry::Selected(previous) if same_products(previous, &products)
        );
        if !unchanged {
            state.ledger.clear_after(self.registry, &current.id);
        }

        if self.registry.is_root(&current.id) {
            if let Some(root) = products.first() {
                state.applicability = self.applicability.resolve_for(self.registry, &root.id);
                state.root = Some(root.clone());
            }
        }

        debug!(stage = %current.id, count = products.len(), changed = !unchanged, "selection recorded");
        state.ledger.select(current, products)?;
        state.notices.clear();
        Ok(self.advance(state, &current.id, true).await)
    }

    /// Record a user skip at the current stage and advance.
    pub async fn skip(&self, mut state: SessionState, stage: &StageId) -> Result<Turn, FlowError> {
        let current = self.current(&state, Some(stage))?;
        if current.mandatory {
            return Err(FlowError::MandatoryStage(current.id.clone()));
        }
        if !matches!(state.ledger.entry(&current.id), LedgerEntry::Skipped) {
            state.ledger.clear_after(self.registry, &current.id);
        }
        state.ledger.skip(&current.id);
        state.notices.clear();
        debug!(stage = %current.id, "stage skipped by user");
        Ok(self.advance(state, &current.id, false).await)
    }

    /// Move to the previous reachable stage and present it again.
    ///
    /// From a finalized session this returns to the last reachable stage.
    /// Earlier decisions are kept until the user changes one.
    pub async fn back(&self, mut state: SessionState) -> Result<Turn, FlowError> {
        let sequencer = StateSequencer::new(self.registry);
        let target = match &state.pointer {
            StagePointer::Finalized => self
                .registry
                .stages()
                .iter()
                .rev()
                .find(|s| sequencer.is_reachable(s, &state.ledger, &state.applicability))
                .map(|s| s.id.clone()),
            StagePointer::At(current) => {
                let transition = sequencer.get_previous(current, &state.ledger, &state.applicability);
                log_signal(transition.signal.as_ref());
                transition.target
            }
        };
        let target = target.ok_or(FlowError::AtFirstStage)?;
        let stage = self
            .registry
            .get(&target)
            .ok_or_else(|| FlowError::UnknownStage(target.clone()))?;

        state.notices.clear();
        let consolidation = self.search_stage(&state, stage, "").await;
        state.pointer = StagePointer::At(target);
        state.candidates = consolidation.products;
        Ok(Turn::new(state, Vec::new(), consolidation.reports))
    }

    // =========================================================================
    // INTERNALS
    // =========================================================================

    /// Resolve the stage a request targets; it must be the current one.
    fn current(&self, state: &SessionState, requested: Option<&StageId>) -> Result<&'a Stage, FlowError> {
        let current = state.current_stage().ok_or(FlowError::Finalized)?;
        if let Some(requested) = requested {
            if requested != current {
                if self.registry.get(requested).is_none() {
                    return Err(FlowError::UnknownStage(requested.clone()));
                }
                return Err(FlowError::NotCurrentStage {
                    got: requested.clone(),
                });
            }
        }
        self.registry
            .get(current)
            .ok_or_else(|| FlowError::UnknownStage(current.clone()))
    }

    /// Walk forward from `from` until a stage needs the user or the
    /// sequence ends.
    ///
    /// Single-candidate auto-advance applies only to the first stage
    /// searched after a user selection.
    async fn advance(&self, mut state: SessionState, from: &StageId, after_selection: bool) -> Turn {
        let sequencer = StateSequencer::new(self.registry);
        let mut decisions = Vec::new();
        let mut after_selection = after_selection;
        let mut current = from.clone();

        loop {
            let transition = sequencer.get_next(&current, &state.ledger, &state.applicability);
            log_signal(transition.signal.as_ref());

            let next = match transition.target {
                Step::Stage(next) => next,
                Step::Finalize => {
                    self.gate_passed_over(&mut state, &current, None, &mut decisions);
                    break;
                }
            };
            self.gate_passed_over(&mut state, &current, Some(&next), &mut decisions);
            let Some(stage) = self.registry.get(&next) else {
                break;
            };

            let consolidation = self.search_stage(&state, stage, "").await;
            let count = consolidation.products.len();

            let empty = self
                .engine
                .post_search(stage, count, consolidation.compatibility_applied);
            if empty.should_skip {
                state.ledger.skip(&stage.id);
                if let Some(message) = &empty.user_message {
                    state.notices.push(message.clone());
                }
                decisions.push(decision(stage, DecisionAction::Skipped, empty));
                current = next;
                continue;
            }

            let single = self.engine.stage_d(stage, count, after_selection);
            after_selection = false;
            if single.should_skip {
                if let Some(product) = consolidation.products.first() {
                    if state.ledger.select(stage, vec![product.clone()]).is_ok() {
                        decisions.push(decision(stage, DecisionAction::AutoSelected, single));
                        current = next;
                        continue;
                    }
                }
            }

            debug!(stage = %stage.id, candidates = count, "presenting stage");
            state.pointer = StagePointer::At(next);
            state.candidates = consolidation.products;
            return Turn::new(state, decisions, consolidation.reports);
        }

        debug!(resolved = state.ledger.resolved_count(), "session finalized");
        state.pointer = StagePointer::Finalized;
        state.candidates.clear();
        Turn::new(state, decisions, Vec::new())
    }

    /// Record the dependency skips for applicable stages the sequencer
    /// stepped over between `from` and `until` (or the end of the sequence).
    fn gate_passed_over(
        &self,
        state: &mut SessionState,
        from: &StageId,
        until: Option<&StageId>,
        decisions: &mut Vec<StageDecision>,
    ) {
        let Some(later) = self.registry.after(from) else {
            return;
        };
        for stage in later.iter().take_while(|s| Some(&s.id) != until) {
            if !state.applicability.is_applicable(&stage.id) {
                continue;
            }
            let gate = self.engine.stage_a(stage, &state.ledger);
            if gate.should_skip {
                state.ledger.skip(&stage.id);
                decisions.push(decision(stage, DecisionAction::Skipped, gate));
            }
        }
    }

    async fn search_stage(&self, state: &SessionState, stage: &Stage, text: &str) -> Consolidation {
        let earlier: BTreeSet<&StageId> = self
            .registry
            .before(&stage.id)
            .map(|stages| stages.iter().map(|s| &s.id).collect())
            .unwrap_or_default();
        let selected = state
            .ledger
            .selected_products(self.registry)
            .into_iter()
            .filter(|(id, _)| earlier.contains(id))
            .collect();

        let context = SearchContext::new(stage.clone())
            .with_text(text)
            .with_constraints(state.constraints.clone())
            .with_selected(selected);
        self.consolidator.execute(&context).await
    }
}

fn decision(stage: &Stage, action: DecisionAction, skip: gearstep_core::SkipDecision) -> StageDecision {
    debug!(stage = %stage.id, ?action, reason = ?skip.reason, "stage decided automatically");
    StageDecision {
        stage: stage.id.clone(),
        action,
        reason: skip.reason,
        attribution: skip.attribution,
        message: skip.user_message,
    }
}

fn same_products(a: &[ProductRef], b: &[ProductRef]) -> bool {
    let keys = |products: &[ProductRef]| products.iter().map(ProductRef::key).collect::<BTreeSet<_>>();
    keys(a) == keys(b)
}

fn log_signal(signal: Option<&SequencerSignal>) {
    if let Some(SequencerSignal::StageNotRegistered(stage)) = signal {
        warn!(stage = %stage, "stage not registered, finalizing");
    }
}
