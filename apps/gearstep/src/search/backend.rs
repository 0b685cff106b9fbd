//! # Backends
//!
//! The services the strategies consume, behind async traits:
//!
//! ```text
//! ExactMatch  -> CompatibilitySource   (in-process catalog graph)
//! Keyword     -> FullTextIndex         (in-process inverted index)
//! Semantic    -> Embedder + VectorIndex (HTTP JSON)
//! Rerank      -> Reranker               (HTTP JSON)
//! ```
//!
//! HTTP adapters are the only place floats enter the process; they are
//! converted to fixed-point [`Score`]s before anything else sees them.

use async_trait::async_trait;
use gearstep_core::{
    CompatibilityGraph, GraphMatch, GraphQuery, ProductId, Score, TextIndex, TextMatch,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

// =============================================================================
// ERROR TYPE
// =============================================================================

/// Failure of one backend call. Always recovered into a failed strategy
/// result; never reaches the user.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed backend response: {0}")]
    Malformed(String),

    #[error("backend not configured: {0}")]
    NotConfigured(&'static str),

    #[error("all {0} rerank runs failed")]
    AllRunsFailed(u32),
}

// =============================================================================
// TRAITS
// =============================================================================

/// Read-only compatibility traversal.
#[async_trait]
pub trait CompatibilitySource: Send + Sync {
    async fn compatible(
        &self,
        query: &GraphQuery,
        limit: usize,
    ) -> Result<Vec<GraphMatch>, BackendError>;
}

/// Free-text search scoped to a category. `query` is already normalized.
#[async_trait]
pub trait FullTextIndex: Send + Sync {
    async fn search(
        &self,
        category: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<TextMatch>, BackendError>;
}

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, BackendError>;
}

/// One nearest-neighbor hit, similarity already clamped to `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorHit {
    pub id: ProductId,
    pub name: String,
    pub category: String,
    pub similarity: Score,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn nearest(
        &self,
        category: &str,
        embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<VectorHit>, BackendError>;
}

/// A candidate handed to the reranker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RerankCandidate {
    pub id: ProductId,
    pub name: String,
    pub category: String,
}

/// The reranker's verdict on one candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RerankVerdict {
    pub id: ProductId,
    /// 0-100.
    pub score: u8,
    #[serde(default)]
    pub justification: String,
}

#[async_trait]
pub trait Reranker: Send + Sync {
    async fn rerank(
        &self,
        query: &str,
        candidates: &[RerankCandidate],
        limit: usize,
    ) -> Result<Vec<RerankVerdict>, BackendError>;
}

// =============================================================================
// IN-PROCESS ADAPTERS
// =============================================================================

/// [`CompatibilitySource`] over the catalog graph.
#[derive(Debug, Clone)]
pub struct CatalogGraphSource {
    graph: Arc<CompatibilityGraph>,
}

impl CatalogGraphSource {
    pub fn new(graph: Arc<CompatibilityGraph>) -> Self {
        Self { graph }
    }
}

#[async_trait]
impl CompatibilitySource for CatalogGraphSource {
    async fn compatible(
        &self,
        query: &GraphQuery,
        limit: usize,
    ) -> Result<Vec<GraphMatch>, BackendError> {
        Ok(self.graph.query(query, limit))
    }
}

/// [`FullTextIndex`] over the catalog inverted index.
#[derive(Debug, Clone)]
pub struct CatalogTextIndex {
    index: Arc<TextIndex>,
}

impl CatalogTextIndex {
    pub fn new(index: Arc<TextIndex>) -> Self {
        Self { index }
    }
}

#[async_trait]
impl FullTextIndex for CatalogTextIndex {
    async fn search(
        &self,
        category: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<TextMatch>, BackendError> {
        Ok(self.index.search(category, query, limit))
    }
}

// =============================================================================
// HTTP ADAPTERS
// =============================================================================

fn http_client(timeout: Duration) -> Result<reqwest::Client, BackendError> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

async fn post_json<Req, Resp>(
    client: &reqwest::Client,
    url: &str,
    body: &Req,
) -> Result<Resp, BackendError>
where
    Req: Serialize + Sync,
    Resp: for<'de> Deserialize<'de>,
{
    let response = client.post(url).json(body).send().await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(BackendError::Status {
            status: status.as_u16(),
            body,
        });
    }
    response
        .json::<Resp>()
        .await
        .map_err(|e| BackendError::Malformed(e.to_string()))
}

/// Clamp a backend similarity into a fixed-point score.
#[allow(clippy::float_arithmetic)]
fn similarity_to_score(similarity: f32) -> Score {
    if !similarity.is_finite() {
        return Score::ZERO;
    }
    let clamped = similarity.clamp(0.0, 1.0);
    Score::from_millionths((clamped * 1_000_000.0).round() as u32)
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

/// `POST {url}` with `{"text"}`, expects `{"embedding": [..]}`.
#[derive(Debug, Clone)]
pub struct HttpEmbedder {
    url: String,
    client: reqwest::Client,
}

impl HttpEmbedder {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, BackendError> {
        Ok(Self {
            url: url.into(),
            client: http_client(timeout)?,
        })
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, BackendError> {
        let response: EmbedResponse =
            post_json(&self.client, &self.url, &EmbedRequest { text }).await?;
        if response.embedding.is_empty() {
            return Err(BackendError::Malformed("empty embedding".into()));
        }
        Ok(response.embedding)
    }
}

#[derive(Debug, Serialize)]
struct NearestRequest<'a> {
    category: &'a str,
    embedding: &'a [f32],
    limit: usize,
}

#[derive(Debug, Deserialize)]
struct NearestMatch {
    id: ProductId,
    name: String,
    category: String,
    similarity: f32,
}

#[derive(Debug, Deserialize)]
struct NearestResponse {
    matches: Vec<NearestMatch>,
}

/// `POST {url}` with `{"category", "embedding", "limit"}`, expects
/// `{"matches": [{"id", "name", "category", "similarity"}]}`.
#[derive(Debug, Clone)]
pub struct HttpVectorIndex {
    url: String,
    client: reqwest::Client,
}

impl HttpVectorIndex {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, BackendError> {
        Ok(Self {
            url: url.into(),
            client: http_client(timeout)?,
        })
    }
}

#[async_trait]
impl VectorIndex for HttpVectorIndex {
    async fn nearest(
        &self,
        category: &str,
        embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<VectorHit>, BackendError> {
        let request = NearestRequest {
            category,
            embedding,
            limit,
        };
        let response: NearestResponse = post_json(&self.client, &self.url, &request).await?;
        Ok(response
            .matches
            .into_iter()
            .map(|m| VectorHit {
                id: m.id,
                name: m.name,
                category: m.category,
                similarity: similarity_to_score(m.similarity),
            })
            .collect())
    }
}

#[derive(Debug, Serialize)]
struct RerankRequest<'a> {
    query: &'a str,
    candidates: &'a [RerankCandidate],
    limit: usize,
}

#[derive(Debug, Deserialize)]
struct RerankResponse {
    results: Vec<RerankVerdict>,
}

/// `POST {url}` with `{"query", "candidates", "limit"}`, expects
/// `{"results": [{"id", "score", "justification"}]}`.
#[derive(Debug, Clone)]
pub struct HttpReranker {
    url: String,
    client: reqwest::Client,
}

impl HttpReranker {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, BackendError> {
        Ok(Self {
            url: url.into(),
            client: http_client(timeout)?,
        })
    }
}

#[async_trait]
impl Reranker for HttpReranker {
    async fn rerank(
        &self,
        query: &str,
        candidates: &[RerankCandidate],
        limit: usize,
    ) -> Result<Vec<RerankVerdict>, BackendError> {
        let request = RerankRequest {
            query,
            candidates,
            limit,
        };
        let response: RerankResponse = post_json(&self.client, &self.url, &request).await?;
        if let Some(bad) = response.results.iter().find(|v| v.score > 100) {
            return Err(BackendError::Malformed(format!(
                "score {} for '{}' exceeds 100",
                bad.score, bad.id
            )));
        }
        Ok(response.results)
    }
}

// =============================================================================
// TESTS
// =============================================================================
