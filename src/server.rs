//! HTTP API for the game frontend.
//!
//! A thin axum layer over [`LabService`]: handlers extract and deserialize
//! the request, call one service operation, and serialize the result.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (version, dropped telemetry count) |
//! | `GET`  | `/api/agent/{id}` | Advisor script |
//! | `POST` | `/api/rag/run` | Run the retrieval test rig |
//! | `POST` | `/api/eval/run` | Run the evaluation simulator |
//! | `POST` | `/api/station/whiteboard` | Release verdict |
//! | `GET`  | `/api/artifacts/rag`, `/api/artifacts/eval` | Recent runs (`?limit=`) |
//! | `GET`  | `/api/artifacts/rag/{id}`, `/api/artifacts/eval/{id}` | One run |
//! | `POST` | `/api/telemetry/event` | Ingest one event or a batch |
//! | `GET`  | `/api/telemetry/summary` | Windowed summary (`?scenarioId=&window=`) |
//! | `GET`  | `/api/telemetry/timeseries` | Bucketed series (`?metric=&scenarioId=&window=`) |
//! | `POST` | `/api/reset` | Wipe all state (only when `server.allow_reset`) |
//!
//! When `server.base_path` is set the same routes are also served under
//! that prefix.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "invalid request: topK must be > 0 (got 0)" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `internal` (500).

use axum::{
    body::Bytes,
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::advisors::InteractionResponse;
use crate::config::Config;
use crate::error::LabError;
use crate::models::{EvalRun, EvalRunSummary, RagRun, RagRunSummary};
use crate::service::{
    EvalRunRequest, EvalRunResponse, IngestResponse, LabService, RagRunRequest, RagRunResponse,
    ResetResponse,
};
use crate::telemetry::aggregate::{TelemetryPoint, TelemetrySummary};
use crate::verdict::{VerdictRequest, VerdictResponse};

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<LabService>,
}

/// Starts the HTTP server on `[server].bind`. Runs until the process is
/// terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let service = LabService::open(config).await?;
    let state = AppState {
        service: Arc::new(service),
    };
    let app = build_router(config, state)?;

    let bind_addr = config.server.bind.clone();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, base_path = %config.server.base_path, "lab API listening");
    axum::serve(listener, app).await?;

    Ok(())
}

fn cors_layer(origins: &[String]) -> anyhow::Result<CorsLayer> {
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::from(Any)
    } else {
        let values = origins
            .iter()
            .map(|o| {
                HeaderValue::from_str(o)
                    .map_err(|e| anyhow::anyhow!("invalid allowed origin '{}': {}", o, e))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        AllowOrigin::list(values)
    };

    Ok(CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any))
}

/// Build the full router for a service. Separate from [`run_server`] so
/// tests can serve it on their own listener.
pub fn build_router(config: &Config, state: AppState) -> anyhow::Result<Router> {
    let mut api = Router::new()
        .route("/health", get(handle_health))
        .route("/api/agent/{id}", get(handle_agent))
        .route("/api/rag/run", post(handle_rag_run))
        .route("/api/eval/run", post(handle_eval_run))
        .route("/api/station/whiteboard", post(handle_whiteboard))
        .route("/api/artifacts/rag", get(handle_list_rag))
        .route("/api/artifacts/rag/{id}", get(handle_get_rag))
        .route("/api/artifacts/eval", get(handle_list_eval))
        .route("/api/artifacts/eval/{id}", get(handle_get_eval))
        .route("/api/telemetry/event", post(handle_telemetry_event))
        .route("/api/telemetry/summary", get(handle_telemetry_summary))
        .route("/api/telemetry/timeseries", get(handle_telemetry_timeseries));

    if config.server.allow_reset {
        api = api.route("/api/reset", post(handle_reset));
    }

    let base_path = config.server.base_path.as_str();
    let app = if base_path.is_empty() {
        api
    } else {
        api.clone().nest(base_path, api)
    };

    Ok(app
        .layer(cors_layer(&config.server.allowed_origins)?)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

impl From<LabError> for AppError {
    fn from(err: LabError) -> Self {
        let status = match &err {
            LabError::Validation(_) => StatusCode::BAD_REQUEST,
            LabError::NotFound(_) => StatusCode::NOT_FOUND,
            LabError::Storage(e) => {
                error!(error = %format!("{:#}", e), "storage failure");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        AppError {
            status,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        bad_request(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        bad_request(rejection.body_text())
    }
}

type ApiResult<T> = Result<Json<T>, AppError>;

// ============ GET /health ============

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: String,
    version: String,
    /// Telemetry events lost to write failures since startup.
    telemetry_dropped: u64,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        telemetry_dropped: state.service.sink().dropped_count(),
    })
}

// ============ Advisors, retrieval, eval, verdict ============

async fn handle_agent(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<InteractionResponse> {
    Ok(Json(state.service.advisor(&id)?))
}

async fn handle_rag_run(
    State(state): State<AppState>,
    payload: Result<Json<RagRunRequest>, JsonRejection>,
) -> ApiResult<RagRunResponse> {
    let Json(req) = payload?;
    Ok(Json(state.service.run_retrieval(&req).await?))
}

async fn handle_eval_run(
    State(state): State<AppState>,
    payload: Result<Json<EvalRunRequest>, JsonRejection>,
) -> ApiResult<EvalRunResponse> {
    let Json(req) = payload?;
    Ok(Json(state.service.run_eval(&req).await?))
}

async fn handle_whiteboard(
    State(state): State<AppState>,
    payload: Result<Json<VerdictRequest>, JsonRejection>,
) -> ApiResult<VerdictResponse> {
    let Json(req) = payload?;
    Ok(Json(state.service.evaluate_verdict(&req)))
}

// ============ Artifacts ============

#[derive(Deserialize)]
struct LimitParams {
    limit: Option<i64>,
}

async fn handle_list_rag(
    State(state): State<AppState>,
    params: Result<Query<LimitParams>, QueryRejection>,
) -> ApiResult<Vec<RagRunSummary>> {
    let Query(params) = params?;
    Ok(Json(state.service.list_rag_runs(params.limit).await?))
}

async fn handle_list_eval(
    State(state): State<AppState>,
    params: Result<Query<LimitParams>, QueryRejection>,
) -> ApiResult<Vec<EvalRunSummary>> {
    let Query(params) = params?;
    Ok(Json(state.service.list_eval_runs(params.limit).await?))
}

async fn handle_get_rag(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<RagRun> {
    Ok(Json(state.service.get_rag_run(&id).await?))
}

async fn handle_get_eval(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<EvalRun> {
    Ok(Json(state.service.get_eval_run(&id).await?))
}

// ============ Telemetry ============

async fn handle_telemetry_event(
    State(state): State<AppState>,
    payload: Result<Json<serde_json::Value>, JsonRejection>,
) -> ApiResult<IngestResponse> {
    let Json(payload) = payload?;
    Ok(Json(state.service.ingest_telemetry(payload).await?))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryParams {
    scenario_id: Option<String>,
    window: Option<String>,
}

async fn handle_telemetry_summary(
    State(state): State<AppState>,
    params: Result<Query<SummaryParams>, QueryRejection>,
) -> ApiResult<TelemetrySummary> {
    let Query(params) = params?;
    let summary = state
        .service
        .telemetry_summary(params.scenario_id.as_deref(), params.window.as_deref())
        .await?;
    Ok(Json(summary))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TimeseriesParams {
    metric: String,
    scenario_id: Option<String>,
    window: Option<String>,
}

async fn handle_telemetry_timeseries(
    State(state): State<AppState>,
    params: Result<Query<TimeseriesParams>, QueryRejection>,
) -> ApiResult<Vec<TelemetryPoint>> {
    let Query(params) = params?;
    let points = state
        .service
        .telemetry_timeseries(
            &params.metric,
            params.scenario_id.as_deref(),
            params.window.as_deref(),
        )
        .await?;
    Ok(Json(points))
}

// ============ POST /api/reset ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResetRequest {
    #[serde(default = "default_wipe", alias = "wipe_db")]
    wipe_db: bool,
}

fn default_wipe() -> bool {
    true
}

/// An empty body means "wipe".
async fn handle_reset(State(state): State<AppState>, body: Bytes) -> ApiResult<ResetResponse> {
    let wipe = if body.iter().all(u8::is_ascii_whitespace) {
        true
    } else {
        serde_json::from_slice::<ResetRequest>(&body)
            .map_err(|e| bad_request(format!("invalid reset body: {}", e)))?
            .wipe_db
    };
    Ok(Json(state.service.reset(wipe).await?))
}
