//! Request and response bodies for the HTTP API.

use crate::consolidator::StrategyReport;
use crate::flow::{FlowOutcome, SearchRequest, StageDecision};
use gearstep_core::{LedgerSnapshot, ProductId, ProductRef, Stage, StageId, StagePointer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub fingerprint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagesResponse {
    pub stages: Vec<Stage>,
}

/// Body of `POST /sessions` and `POST /sessions/{id}/search`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchBody {
    pub text: String,
    pub constraints: BTreeMap<String, String>,
    /// Optional guard: the stage the client believes is current.
    pub stage: Option<StageId>,
}

impl SearchBody {
    pub fn request(&self) -> SearchRequest {
        SearchRequest {
            text: self.text.clone(),
            constraints: self.constraints.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectBody {
    pub stage: StageId,
    pub products: Vec<ProductId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkipBody {
    pub stage: StageId,
}

/// The state a client renders after any turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionView {
    pub session_id: String,
    /// `None` once finalized.
    pub stage: Option<StageId>,
    pub finalized: bool,
    pub candidates: Vec<ProductRef>,
    pub notices: Vec<String>,
    #[serde(default)]
    pub decisions: Vec<StageDecision>,
    #[serde(default)]
    pub reports: Vec<StrategyReport>,
}

impl SessionView {
    pub fn from_outcome(session_id: &str, outcome: FlowOutcome) -> Self {
        let (stage, finalized) = match outcome.pointer {
            StagePointer::At(stage) => (Some(stage), false),
            StagePointer::Finalized => (None, true),
        };
        Self {
            session_id: session_id.to_string(),
            stage,
            finalized,
            candidates: outcome.candidates,
            notices: outcome.notices,
            decisions: outcome.decisions,
            reports: outcome.reports,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotResponse {
    pub session_id: String,
    pub finalized: bool,
    pub snapshot: LedgerSnapshot,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportResponse {
    pub session_id: String,
    /// Base64 of the binary session record.
    pub record: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportBody {
    pub record: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReloadResponse {
    pub reloaded: bool,
    pub fingerprint: String,
    pub stages: usize,
    pub products: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
