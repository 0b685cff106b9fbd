//! Shared fixtures for the app integration tests.

#![allow(dead_code, clippy::unwrap_used, clippy::panic)]

use async_trait::async_trait;
use gearstep::consolidator::{ResultConsolidator, StrategySlot};
use gearstep::search::{BackendError, SearchContext, SearchStrategy};
use gearstep_core::{Score, StrategyHit, StrategyKind, Weight};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub const GEARSTEP_JSON: &str = include_str!("../../../../config/gearstep.json");
pub const STAGES_JSON: &str = include_str!("../../../../config/stages.json");
pub const CATALOG_JSON: &str = include_str!("../../../../config/catalog.json");

/// Write the sample config set into `dir` and return the gearstep.json path.
pub fn write_sample_config(dir: &Path) -> PathBuf {
    std::fs::write(dir.join("stages.json"), STAGES_JSON).unwrap();
    std::fs::write(dir.join("catalog.json"), CATALOG_JSON).unwrap();
    let path = dir.join("gearstep.json");
    std::fs::write(&path, GEARSTEP_JSON).unwrap();
    path
}

// =============================================================================
// STUB STRATEGY
// =============================================================================

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    Answer,
    Fail,
    Panic,
    Sleep(Duration),
}

/// Answers from a fixed category -> hits table and counts its calls.
pub struct StubStrategy {
    kind: StrategyKind,
    hits: BTreeMap<String, Vec<StrategyHit>>,
    behavior: Behavior,
    pub calls: AtomicUsize,
}

impl StubStrategy {
    pub fn new(kind: StrategyKind) -> Self {
        Self {
            kind,
            hits: BTreeMap::new(),
            behavior: Behavior::Answer,
            calls: AtomicUsize::new(0),
        }
    }

    /// Exact-style hits: full score with ascending priority.
    pub fn category(mut self, category: &str, ids: &[&str]) -> Self {
        let hits = ids
            .iter()
            .enumerate()
            .map(|(i, id)| {
                StrategyHit::new(*id, format!("Product {id}"), category, Score::FULL)
                    .with_priority(i as u32)
            })
            .collect();
        self.hits.insert(category.to_string(), hits);
        self
    }

    pub fn scored(mut self, category: &str, hits: &[(&str, u8)]) -> Self {
        let hits = hits
            .iter()
            .map(|(id, percent)| {
                StrategyHit::new(*id, format!("Product {id}"), category, Score::from_percent(*percent))
            })
            .collect();
        self.hits.insert(category.to_string(), hits);
        self
    }

    pub fn behave(mut self, behavior: Behavior) -> Self {
        self.behavior = behavior;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SearchStrategy for StubStrategy {
    fn kind(&self) -> StrategyKind {
        self.kind
    }

    async fn fetch(
        &self,
        context: &SearchContext,
        limit: usize,
    ) -> Result<Vec<StrategyHit>, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            Behavior::Answer => {}
            Behavior::Fail => return Err(BackendError::Malformed("stub failure".into())),
            Behavior::Panic => panic!("stub strategy panicked"),
            Behavior::Sleep(duration) => tokio::time::sleep(duration).await,
        }
        let mut hits = self
            .hits
            .get(&context.stage.search.category)
            .cloned()
            .unwrap_or_default();
        hits.truncate(limit);
        Ok(hits)
    }
}

pub fn slot(strategy: Arc<StubStrategy>, weight_percent: u32, timeout: Duration) -> StrategySlot {
    StrategySlot {
        strategy,
        weight: Weight::from_percent(weight_percent),
        timeout,
        limit: 50,
    }
}

/// Consolidator over the given stubs with generous timeouts.
pub fn consolidator(strategies: &[(Arc<StubStrategy>, u32)]) -> ResultConsolidator {
    strategies.iter().fold(
        ResultConsolidator::new(Duration::from_secs(5), 20),
        |consolidator, (strategy, weight)| {
            consolidator.with_strategy(slot(Arc::clone(strategy), *weight, Duration::from_secs(2)))
        },
    )
}
