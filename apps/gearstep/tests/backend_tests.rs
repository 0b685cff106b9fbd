//! HTTP backend clients and the strategies built on them, against wiremock.

#![allow(clippy::unwrap_used, clippy::panic)]

mod common;

use common::{GEARSTEP_JSON, StubStrategy, write_sample_config};
use gearstep::search::backend::{
    Embedder, HttpEmbedder, HttpReranker, HttpVectorIndex, RerankCandidate, Reranker, VectorIndex,
};
use gearstep::runtime::Runtime;
use gearstep::search::rerank::Consensus;
use gearstep::search::{
    BackendError, RerankStrategy, SearchContext, SearchStrategy, SemanticStrategy,
};
use gearstep_core::{ProductId, Score, Stage, StrategyKind};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TIMEOUT: Duration = Duration::from_secs(2);

fn cooler_context(text: &str) -> SearchContext {
    SearchContext::new(Stage::new("cooler", 2, "Cooler")).with_text(text)
}

// =============================================================================
// EMBEDDER
// =============================================================================

#[tokio::test]
async fn embedder_posts_text_and_reads_vector() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embed"))
        .and(body_json(json!({ "text": "water cooler" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embedding": [0.25, 0.5, 0.75]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let embedder = HttpEmbedder::new(format!("{}/embed", server.uri()), TIMEOUT).unwrap();
    let embedding = embedder.embed("water cooler").await.unwrap();
    assert_eq!(embedding, vec![0.25, 0.5, 0.75]);
}

#[tokio::test]
async fn embedder_rejects_empty_vector() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "embedding": [] })))
        .mount(&server)
        .await;

    let embedder = HttpEmbedder::new(format!("{}/embed", server.uri()), TIMEOUT).unwrap();
    let result = embedder.embed("anything").await;
    assert!(matches!(result, Err(BackendError::Malformed(_))));
}

#[tokio::test]
async fn server_error_carries_status_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embed"))
        .respond_with(ResponseTemplate::new(503).set_body_string("model loading"))
        .mount(&server)
        .await;

    let embedder = HttpEmbedder::new(format!("{}/embed", server.uri()), TIMEOUT).unwrap();
    match embedder.embed("anything").await {
        Err(BackendError::Status { status, body }) => {
            assert_eq!(status, 503);
            assert_eq!(body, "model loading");
        }
        other => panic!("expected status error, got {other:?}"),
    }
}

#[tokio::test]
async fn unreachable_backend_is_an_http_error() {
    // Nothing listens on the discard port.
    let embedder = HttpEmbedder::new("http://127.0.0.1:9/embed", Duration::from_millis(500)).unwrap();
    let result = embedder.embed("anything").await;
    assert!(matches!(result, Err(BackendError::Http(_))));
}

// =============================================================================
// VECTOR INDEX
// =============================================================================

#[tokio::test]
async fn vector_similarities_are_clamped() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/nearest"))
        .and(body_json(json!({
            "category": "Cooler",
            "embedding": [0.5, 0.5],
            "limit": 5
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "matches": [
                { "id": "CL-1800", "name": "CoolMidi 1800", "category": "Cooler", "similarity": 1.4 },
                { "id": "CL-900", "name": "CoolMini 900", "category": "Cooler", "similarity": 0.5 },
                { "id": "CL-000", "name": "Broken", "category": "Cooler", "similarity": -0.2 }
            ]
        })))
        .mount(&server)
        .await;

    let vectors = HttpVectorIndex::new(format!("{}/nearest", server.uri()), TIMEOUT).unwrap();
    let hits = vectors.nearest("Cooler", &[0.5, 0.5], 5).await.unwrap();

    assert_eq!(hits.len(), 3);
    assert_eq!(hits[0].id, ProductId::new("CL-1800"));
    assert_eq!(hits[0].similarity, Score::FULL);
    assert_eq!(hits[1].similarity, Score::from_percent(50));
    assert_eq!(hits[2].similarity, Score::ZERO);
}

#[tokio::test]
async fn vector_response_without_matches_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/nearest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "hits": [] })))
        .mount(&server)
        .await;

    let vectors = HttpVectorIndex::new(format!("{}/nearest", server.uri()), TIMEOUT).unwrap();
    let result = vectors.nearest("Cooler", &[0.1], 5).await;
    assert!(matches!(result, Err(BackendError::Malformed(_))));
}

// =============================================================================
// RERANKER
// =============================================================================

#[tokio::test]
async fn reranker_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rerank"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [
                { "id": "T-505W", "score": 92, "justification": "water cooled, 500 A" },
                { "id": "T-305G", "score": 40 }
            ]
        })))
        .mount(&server)
        .await;

    let reranker = HttpReranker::new(format!("{}/rerank", server.uri()), TIMEOUT).unwrap();
    let candidates = vec![
        RerankCandidate {
            id: ProductId::new("T-505W"),
            name: "Torch 505W".into(),
            category: "Torch".into(),
        },
        RerankCandidate {
            id: ProductId::new("T-305G"),
            name: "Torch 305G".into(),
            category: "Torch".into(),
        },
    ];
    let verdicts = reranker.rerank("500 A", &candidates, 10).await.unwrap();

    assert_eq!(verdicts.len(), 2);
    assert_eq!(verdicts[0].score, 92);
    assert_eq!(verdicts[0].justification, "water cooled, 500 A");
    assert!(verdicts[1].justification.is_empty());
}

#[tokio::test]
async fn reranker_rejects_out_of_range_scores() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rerank"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{ "id": "T-505W", "score": 140 }]
        })))
        .mount(&server)
        .await;

    let reranker = HttpReranker::new(format!("{}/rerank", server.uri()), TIMEOUT).unwrap();
    let result = reranker.rerank("500 A", &[], 10).await;
    assert!(matches!(result, Err(BackendError::Malformed(_))));
}

// =============================================================================
// SEMANTIC STRATEGY
// =============================================================================

#[tokio::test]
async fn semantic_strategy_embeds_once_per_query() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "embedding": [0.5, 0.5] })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/nearest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "matches": [
                { "id": "CL-1800", "name": "CoolMidi 1800", "category": "Cooler", "similarity": 0.91 },
                { "id": "CL-900", "name": "CoolMini 900", "category": "Cooler", "similarity": 0.30 },
                { "id": "T-505W", "name": "Torch 505W", "category": "Torch", "similarity": 0.95 }
            ]
        })))
        .expect(2)
        .mount(&server)
        .await;

    let strategy = SemanticStrategy::new(
        Arc::new(HttpEmbedder::new(format!("{}/embed", server.uri()), TIMEOUT).unwrap()),
        Arc::new(HttpVectorIndex::new(format!("{}/nearest", server.uri()), TIMEOUT).unwrap()),
        16,
        50,
    );

    let first = strategy.search(&cooler_context("water cooler"), 10).await;
    let second = strategy.search(&cooler_context("  Water Cooler "), 10).await;

    for result in [&first, &second] {
        assert!(result.error.is_none());
        assert_eq!(result.strategy, StrategyKind::Semantic);
        let ids: Vec<&str> = result.hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["CL-1800"]);
    }
    assert_eq!(strategy.cache_stats().await.hits, 1);
}

#[tokio::test]
async fn semantic_strategy_failure_is_recorded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embed"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let strategy = SemanticStrategy::new(
        Arc::new(HttpEmbedder::new(format!("{}/embed", server.uri()), TIMEOUT).unwrap()),
        Arc::new(HttpVectorIndex::new(format!("{}/nearest", server.uri()), TIMEOUT).unwrap()),
        16,
        50,
    );
    let result = strategy.search(&cooler_context("water cooler"), 10).await;
    assert!(result.hits.is_empty());
    assert!(result.error.unwrap().contains("500"));
}

// =============================================================================
// RERANK STRATEGY
// =============================================================================

fn torch_pool() -> Arc<StubStrategy> {
    Arc::new(
        StubStrategy::new(StrategyKind::Keyword)
            .scored("Torch", &[("T-1", 90), ("T-2", 80), ("T-3", 70)]),
    )
}

fn torch_context() -> SearchContext {
    SearchContext::new(Stage::new("torch", 3, "Torch")).with_text("water cooled 500 A")
}

#[tokio::test]
async fn rerank_keeps_items_most_runs_agree_on() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rerank"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [
                { "id": "T-1", "score": 90, "justification": "best fit" },
                { "id": "T-2", "score": 80 }
            ]
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rerank"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [
                { "id": "T-1", "score": 70, "justification": "fits" },
                { "id": "T-3", "score": 60 }
            ]
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rerank"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [
                { "id": "T-1", "score": 80 },
                { "id": "T-2", "score": 70 },
                { "id": "UNKNOWN", "score": 99 }
            ]
        })))
        .mount(&server)
        .await;

    let retriever: Arc<dyn SearchStrategy> = torch_pool();
    let strategy = RerankStrategy::new(
        vec![retriever],
        Arc::new(HttpReranker::new(format!("{}/rerank", server.uri()), TIMEOUT).unwrap()),
        30,
        Consensus {
            runs: 3,
            agreement_percent: 60,
        },
        0,
    );

    let result = strategy.search(&torch_context(), 10).await;
    assert!(result.error.is_none());
    let scored: Vec<(&str, Score)> = result.hits.iter().map(|h| (h.id.as_str(), h.score)).collect();
    assert_eq!(
        scored,
        vec![("T-1", Score::from_percent(80)), ("T-2", Score::from_percent(75))]
    );
    assert_eq!(result.hits[0].rationale.as_deref(), Some("best fit"));
}

#[tokio::test]
async fn rerank_fails_only_when_every_run_fails() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rerank"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let retriever: Arc<dyn SearchStrategy> = torch_pool();
    let strategy = RerankStrategy::new(
        vec![retriever],
        Arc::new(HttpReranker::new(format!("{}/rerank", server.uri()), TIMEOUT).unwrap()),
        30,
        Consensus {
            runs: 2,
            agreement_percent: 51,
        },
        0,
    );

    let result = strategy.search(&torch_context(), 10).await;
    assert!(result.hits.is_empty());
    assert_eq!(result.error.as_deref(), Some("all 2 rerank runs failed"));
}

// =============================================================================
// RUNTIME WIRING
// =============================================================================

#[tokio::test]
async fn configured_backends_are_wired_into_the_runtime() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_sample_config(dir.path());
    let config = GEARSTEP_JSON
        .replace(r#""semantic": { "enabled": false"#, r#""semantic": { "enabled": true"#)
        .replace(r#""rerank": { "enabled": false"#, r#""rerank": { "enabled": true"#)
        .replace(r#""embedder_url": null"#, r#""embedder_url": "http://127.0.0.1:9/embed""#)
        .replace(r#""vector_url": null"#, r#""vector_url": "http://127.0.0.1:9/nearest""#)
        .replace(r#""reranker_url": null"#, r#""reranker_url": "http://127.0.0.1:9/rerank""#);
    std::fs::write(&path, config).unwrap();

    let runtime = Runtime::load(&path).unwrap();
    assert_eq!(
        runtime.consolidator.kinds(),
        vec![
            StrategyKind::ExactMatch,
            StrategyKind::Keyword,
            StrategyKind::Semantic,
            StrategyKind::Rerank,
        ]
    );
}
