//! HTTP handlers.
//!
//! Every session-mutating handler follows the same shape: take the session
//! lock, load the record under the running config, run the flow on an owned
//! copy of the state and save the whole record only if the flow succeeded.

use super::types::{
    ErrorResponse, ExportResponse, HealthResponse, ImportBody, ReloadResponse, SearchBody,
    SelectBody, SessionView, SkipBody, SnapshotResponse, StagesResponse,
};
use crate::error::AppError;
use crate::flow::{FlowError, Turn};
use crate::runtime::Runtime;
use crate::session::{SessionError, SessionStore};
use axum::Json;
use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use gearstep_core::formats::{decode_record, encode_record};
use gearstep_core::{GearstepError, SessionRecord};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

// =============================================================================
// STATE
// =============================================================================

/// Shared across all handlers.
pub struct AppState {
    runtime: RwLock<Arc<Runtime>>,
    pub store: Arc<dyn SessionStore>,
    /// Source of `/admin/reload`; `None` disables reloading.
    pub config_path: Option<PathBuf>,
    limiter: DefaultDirectRateLimiter,
}

impl AppState {
    pub fn new(
        runtime: Runtime,
        store: Arc<dyn SessionStore>,
        config_path: Option<PathBuf>,
    ) -> Arc<Self> {
        let per_second = NonZeroU32::new(runtime.config.server.rate_limit_per_second)
            .unwrap_or(NonZeroU32::MIN);
        Arc::new(Self {
            runtime: RwLock::new(Arc::new(runtime)),
            store,
            config_path,
            limiter: RateLimiter::direct(Quota::per_second(per_second)),
        })
    }

    /// The runtime in effect right now. A reload does not affect a request
    /// already holding one.
    pub async fn runtime(&self) -> Arc<Runtime> {
        Arc::clone(&*self.runtime.read().await)
    }
}

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Flow(#[from] FlowError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("reload failed: {0}")]
    Reload(AppError),

    #[error("{0}")]
    BadRequest(String),

    #[error("rate limit exceeded")]
    RateLimited,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Flow(FlowError::Finalized | FlowError::NotCurrentStage { .. })
            | Self::Flow(FlowError::AtFirstStage) => StatusCode::CONFLICT,
            Self::Flow(FlowError::Core(GearstepError::Snapshot(_))) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Flow(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Session(SessionError::NotFound(_)) => StatusCode::NOT_FOUND,
            Self::Session(SessionError::FingerprintMismatch { .. }) => StatusCode::CONFLICT,
            Self::Session(SessionError::Codec(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Reload(AppError::Config(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Reload(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(error = %self, "request failed");
        }
        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Global request quota.
pub async fn rate_limit(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    if state.limiter.check().is_err() {
        return ApiError::RateLimited.into_response();
    }
    next.run(request).await
}

// =============================================================================
// HELPERS
// =============================================================================

async fn commit(
    state: &AppState,
    runtime: &Runtime,
    id: &str,
    turn: Turn,
) -> ApiResult<SessionView> {
    let record = SessionRecord {
        session_id: id.to_string(),
        fingerprint: runtime.fingerprint,
        state: turn.state,
    };
    state.store.save(&record).await?;
    Ok(SessionView::from_outcome(id, turn.outcome))
}

fn view(record: SessionRecord) -> SessionView {
    let stage = record.state.current_stage().cloned();
    SessionView {
        finalized: record.state.is_finalized(),
        session_id: record.session_id,
        stage,
        candidates: record.state.candidates,
        notices: record.state.notices,
        decisions: Vec::new(),
        reports: Vec::new(),
    }
}

// =============================================================================
// READ-ONLY
// =============================================================================

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let runtime = state.runtime().await;
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        fingerprint: runtime.fingerprint.to_string(),
    })
}

pub async fn stages(State(state): State<Arc<AppState>>) -> Json<StagesResponse> {
    let runtime = state.runtime().await;
    Json(StagesResponse {
        stages: runtime.registry.stages().to_vec(),
    })
}

pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<SessionView>> {
    let record = state.store.load(&id).await?;
    Ok(Json(view(record)))
}

pub async fn snapshot(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<SnapshotResponse>> {
    let runtime = state.runtime().await;
    let record = state.store.load_checked(&id, runtime.fingerprint).await?;
    Ok(Json(SnapshotResponse {
        finalized: record.state.is_finalized(),
        snapshot: record.state.snapshot(&runtime.registry),
        session_id: record.session_id,
    }))
}

pub async fn export_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<ExportResponse>> {
    let record = state.store.load(&id).await?;
    let bytes = encode_record(&record).map_err(SessionError::from)?;
    Ok(Json(ExportResponse {
        session_id: id,
        record: BASE64.encode(bytes),
    }))
}

// =============================================================================
// SESSION TURNS
// =============================================================================

pub async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SearchBody>,
) -> ApiResult<(StatusCode, Json<SessionView>)> {
    let runtime = state.runtime().await;
    let id = state.store.next_id().await;
    let _guard = state.store.lock(&id).await;
    let turn = runtime.flow().start(body.request()).await;
    let view = commit(&state, &runtime, &id, turn).await?;
    info!(session = %id, "session created");
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn search(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<SearchBody>,
) -> ApiResult<Json<SessionView>> {
    let runtime = state.runtime().await;
    let _guard = state.store.lock(&id).await;
    let record = state.store.load_checked(&id, runtime.fingerprint).await?;
    let turn = runtime
        .flow()
        .search(record.state, body.stage.as_ref(), body.request())
        .await?;
    Ok(Json(commit(&state, &runtime, &id, turn).await?))
}

pub async fn select(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<SelectBody>,
) -> ApiResult<Json<SessionView>> {
    let runtime = state.runtime().await;
    let _guard = state.store.lock(&id).await;
    let record = state.store.load_checked(&id, runtime.fingerprint).await?;
    let turn = runtime
        .flow()
        .select(record.state, &body.stage, &body.products)
        .await?;
    Ok(Json(commit(&state, &runtime, &id, turn).await?))
}

pub async fn skip(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<SkipBody>,
) -> ApiResult<Json<SessionView>> {
    let runtime = state.runtime().await;
    let _guard = state.store.lock(&id).await;
    let record = state.store.load_checked(&id, runtime.fingerprint).await?;
    let turn = runtime.flow().skip(record.state, &body.stage).await?;
    Ok(Json(commit(&state, &runtime, &id, turn).await?))
}

pub async fn back(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<SessionView>> {
    let runtime = state.runtime().await;
    let _guard = state.store.lock(&id).await;
    let record = state.store.load_checked(&id, runtime.fingerprint).await?;
    let turn = runtime.flow().back(record.state).await?;
    Ok(Json(commit(&state, &runtime, &id, turn).await?))
}

/// Restore an exported record under its own id, replacing any session with
/// that id.
pub async fn import_session(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ImportBody>,
) -> ApiResult<(StatusCode, Json<SessionView>)> {
    let bytes = BASE64
        .decode(body.record.trim())
        .map_err(|e| ApiError::BadRequest(format!("record is not base64: {e}")))?;
    let record = decode_record(&bytes).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let runtime = state.runtime().await;
    if record.fingerprint != runtime.fingerprint {
        return Err(SessionError::FingerprintMismatch {
            session: record.session_id,
            stored: record.fingerprint,
            current: runtime.fingerprint,
        }
        .into());
    }

    let _guard = state.store.lock(&record.session_id).await;
    state.store.save(&record).await?;
    info!(session = %record.session_id, "session imported");
    Ok((StatusCode::CREATED, Json(view(record))))
}

// =============================================================================
// ADMIN
// =============================================================================

/// Swap in a freshly loaded config. On failure the running config stays.
pub async fn reload(State(state): State<Arc<AppState>>) -> ApiResult<Json<ReloadResponse>> {
    let Some(path) = state.config_path.clone() else {
        return Err(ApiError::BadRequest("no config path to reload from".into()));
    };

    let loaded = tokio::task::spawn_blocking(move || Runtime::load(&path))
        .await
        .map_err(|e| ApiError::Reload(AppError::Invalid(format!("reload task failed: {e}"))))?;
    let runtime = match loaded {
        Ok(runtime) => runtime,
        Err(e) => {
            warn!(error = %e, "config reload rejected, keeping current config");
            return Err(ApiError::Reload(e));
        }
    };

    let response = ReloadResponse {
        reloaded: true,
        fingerprint: runtime.fingerprint.to_string(),
        stages: runtime.registry.len(),
        products: runtime.catalog.products.len(),
    };
    *state.runtime.write().await = Arc::new(runtime);
    info!(fingerprint = %response.fingerprint, "config reloaded");
    Ok(Json(response))
}
