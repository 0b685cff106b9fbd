//! Integration tests for concurrent strategy execution and merging.

#![allow(clippy::unwrap_used, clippy::panic)]

mod common;

use common::{Behavior, StubStrategy, consolidator, slot};
use gearstep::consolidator::ResultConsolidator;
use gearstep::search::SearchContext;
use gearstep_core::{ProductRef, Stage, StageId, StrategyKind};
use std::sync::Arc;
use std::time::Duration;

fn torch_context() -> SearchContext {
    SearchContext::new(Stage::new("torch", 3, "Torch"))
}

fn ids(products: &[ProductRef]) -> Vec<&str> {
    products.iter().map(|p| p.id.as_str()).collect()
}

// =============================================================================
// MERGE
// =============================================================================

#[tokio::test]
async fn product_found_by_two_strategies_ranks_first_once() {
    let exact = Arc::new(StubStrategy::new(StrategyKind::ExactMatch).category("Torch", &["A", "B"]));
    let keyword = Arc::new(
        StubStrategy::new(StrategyKind::Keyword).scored("Torch", &[("B", 90), ("C", 50)]),
    );
    let consolidator = consolidator(&[(exact, 100), (keyword, 50)]);

    let result = consolidator.execute(&torch_context()).await;

    assert_eq!(ids(&result.products), vec!["B", "A", "C"]);
    assert_eq!(result.products[0].scores.len(), 2);
    assert!(!result.compatibility_applied);
    assert_eq!(result.reports.len(), 2);
    assert!(result.reports.iter().all(|r| r.error.is_none()));
}

#[tokio::test]
async fn reports_follow_canonical_strategy_order() {
    let keyword = Arc::new(StubStrategy::new(StrategyKind::Keyword));
    let exact = Arc::new(StubStrategy::new(StrategyKind::ExactMatch));
    let consolidator = consolidator(&[(keyword, 50), (exact, 100)]);

    let result = consolidator.execute(&torch_context()).await;
    let kinds: Vec<StrategyKind> = result.reports.iter().map(|r| r.strategy).collect();
    assert_eq!(kinds, vec![StrategyKind::ExactMatch, StrategyKind::Keyword]);
    assert_eq!(consolidator.kinds(), kinds);
}

#[tokio::test]
async fn stage_limit_caps_results() {
    let keyword = Arc::new(StubStrategy::new(StrategyKind::Keyword).scored(
        "Torch",
        &[("T1", 90), ("T2", 80), ("T3", 70), ("T4", 60)],
    ));
    let consolidator = consolidator(&[(keyword, 100)]);
    let mut stage = Stage::new("torch", 3, "Torch");
    stage.search.limit = Some(2);

    let result = consolidator.execute(&SearchContext::new(stage)).await;
    assert_eq!(ids(&result.products), vec!["T1", "T2"]);
}

// =============================================================================
// COMPATIBILITY GATE
// =============================================================================

#[tokio::test]
async fn gate_applies_once_an_earlier_selection_exists() {
    let exact = Arc::new(StubStrategy::new(StrategyKind::ExactMatch).category("Torch", &["T1"]));
    let keyword = Arc::new(
        StubStrategy::new(StrategyKind::Keyword).scored("Torch", &[("T1", 60), ("T9", 95)]),
    );
    let consolidator = consolidator(&[(exact, 100), (keyword, 50)]);
    let stage = Stage::new("torch", 3, "Torch").compatible();

    let ungated = consolidator.execute(&SearchContext::new(stage.clone())).await;
    assert!(!ungated.compatibility_applied);
    assert_eq!(ungated.products.len(), 2);

    let context = SearchContext::new(stage).with_selected(vec![(
        StageId::new("feeder"),
        ProductRef::new("FD-4R", "Feeder 4R", "Feeder"),
    )]);
    let gated = consolidator.execute(&context).await;
    assert!(gated.compatibility_applied);
    assert_eq!(ids(&gated.products), vec!["T1"]);
}

#[tokio::test]
async fn failed_exact_strategy_leaves_results_ungated() {
    let exact = Arc::new(StubStrategy::new(StrategyKind::ExactMatch).behave(Behavior::Fail));
    let keyword = Arc::new(StubStrategy::new(StrategyKind::Keyword).scored("Torch", &[("T9", 95)]));
    let consolidator = consolidator(&[(exact, 100), (keyword, 50)]);
    let context = SearchContext::new(Stage::new("torch", 3, "Torch").compatible()).with_selected(
        vec![(StageId::new("feeder"), ProductRef::new("FD-4R", "Feeder 4R", "Feeder"))],
    );

    let result = consolidator.execute(&context).await;
    assert!(!result.compatibility_applied);
    assert_eq!(ids(&result.products), vec!["T9"]);
    assert!(result.reports[0].error.is_some());
}

// =============================================================================
// FAILURE ISOLATION
// =============================================================================

#[tokio::test]
async fn panicking_strategy_is_reported_not_propagated() {
    let exact = Arc::new(StubStrategy::new(StrategyKind::ExactMatch).behave(Behavior::Panic));
    let keyword = Arc::new(StubStrategy::new(StrategyKind::Keyword).scored("Torch", &[("T1", 70)]));
    let consolidator = consolidator(&[(exact, 100), (keyword, 50)]);

    let result = consolidator.execute(&torch_context()).await;
    assert_eq!(ids(&result.products), vec!["T1"]);
    assert_eq!(result.reports[0].strategy, StrategyKind::ExactMatch);
    assert_eq!(result.reports[0].error.as_deref(), Some("strategy task failed"));
    assert_eq!(result.reports[0].hits, 0);
}

#[tokio::test(start_paused = true)]
async fn slow_strategy_hits_its_own_timeout() {
    let exact = Arc::new(
        StubStrategy::new(StrategyKind::ExactMatch)
            .category("Torch", &["T1"])
            .behave(Behavior::Sleep(Duration::from_secs(3))),
    );
    let keyword = Arc::new(StubStrategy::new(StrategyKind::Keyword).scored("Torch", &[("T2", 70)]));
    let consolidator = ResultConsolidator::new(Duration::from_secs(10), 20)
        .with_strategy(slot(Arc::clone(&exact), 100, Duration::from_millis(200)))
        .with_strategy(slot(keyword, 50, Duration::from_secs(2)));

    let result = consolidator.execute(&torch_context()).await;
    assert_eq!(ids(&result.products), vec!["T2"]);
    assert_eq!(result.reports[0].error.as_deref(), Some("timed out"));
    assert_eq!(exact.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn overall_deadline_abandons_outstanding_strategies() {
    let keyword = Arc::new(
        StubStrategy::new(StrategyKind::Keyword)
            .scored("Torch", &[("T2", 70)])
            .behave(Behavior::Sleep(Duration::from_secs(30))),
    );
    let exact = Arc::new(StubStrategy::new(StrategyKind::ExactMatch).category("Torch", &["T1"]));
    let consolidator = ResultConsolidator::new(Duration::from_secs(1), 20)
        .with_strategy(slot(exact, 100, Duration::from_secs(60)))
        .with_strategy(slot(keyword, 50, Duration::from_secs(60)));

    let result = consolidator.execute(&torch_context()).await;
    assert_eq!(ids(&result.products), vec!["T1"]);
    assert_eq!(result.reports[1].strategy, StrategyKind::Keyword);
    assert_eq!(result.reports[1].error.as_deref(), Some("overall timeout"));
    assert!(result.reports[0].error.is_none());
}

#[tokio::test]
async fn no_strategies_means_no_candidates() {
    let consolidator = ResultConsolidator::new(Duration::from_secs(1), 20);
    let result = consolidator.execute(&torch_context()).await;
    assert!(result.products.is_empty());
    assert!(result.reports.is_empty());
}
