//! HTTP surface over [`InterviewService`].
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/upload/{doc_type}` | Raw file bytes as the body; `doc_type` is `resume` or `jd` |
//! | `POST` | `/interview/generate` | `{role, company?, num_questions?}` → `{questions}` |
//! | `POST` | `/evaluation/score` | `{role, company?, question, answer}` → score result |
//! | `GET`  | `/analytics/history?limit=N` | Most recent attempts → `{items}` |
//! | `GET`  | `/analytics/summary` | `{attempt_count, average_score}` |
//! | `GET`  | `/health` | Status, version, indexed chunk count |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "validation", "message": "validation error: role must not be empty" } }
//! ```
//!
//! `code` is [`Error::kind`]: `validation` and `template` map to 400,
//! `parse` to 422, `provider` to 502, `storage` to 500.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so a browser UI on
//! another port can call the API.

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::config::Config;
use crate::error::Error;
use crate::models::{HistoryItem, Question};
use crate::service::{InterviewService, DEFAULT_HISTORY_LIMIT, DEFAULT_QUESTION_COUNT};

/// Largest accepted upload body.
const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

type AppState = Arc<InterviewService>;

/// Build the router. Split out from [`run_server`] so tests can serve it
/// on an ephemeral port.
pub fn router(service: Arc<InterviewService>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/upload/{doc_type}", post(handle_upload))
        .route("/interview/generate", post(handle_generate))
        .route("/evaluation/score", post(handle_score))
        .route("/analytics/history", get(handle_history))
        .route("/analytics/summary", get(handle_summary))
        .route("/health", get(handle_health))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(cors)
        .with_state(service)
}

/// Build the service from `config` and serve until the process exits.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let service = Arc::new(InterviewService::from_config(config).await?);
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(addr = %listener.local_addr()?, "listening");
    axum::serve(listener, router(service)).await?;
    Ok(())
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

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        let status = match &err {
            Error::Validation(_) | Error::Template(_) => StatusCode::BAD_REQUEST,
            Error::Parse(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::Provider(_) => StatusCode::BAD_GATEWAY,
            Error::Storage(_) | Error::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            warn!(code = err.kind(), error = %err, "request failed");
        }
        AppError {
            status,
            code: err.kind().to_string(),
            message: err.to_string(),
        }
    }
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

// ============ POST /upload/{doc_type} ============

async fn handle_upload(
    State(service): State<AppState>,
    Path(doc_type): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let receipt = service.upload(&doc_type, &body).await?;
    Ok(Json(receipt))
}

// ============ POST /interview/generate ============

#[derive(Deserialize)]
struct GenerateRequest {
    role: String,
    #[serde(default)]
    company: Option<String>,
    #[serde(default = "default_num_questions")]
    num_questions: usize,
}

fn default_num_questions() -> usize {
    DEFAULT_QUESTION_COUNT
}

#[derive(Serialize)]
struct GenerateResponse {
    questions: Vec<Question>,
}

async fn handle_generate(
    State(service): State<AppState>,
    Json(req): Json<GenerateRequest>,
) -> Result<Json<GenerateResponse>, AppError> {
    let questions = service
        .generate_questions(&req.role, req.company.as_deref(), req.num_questions)
        .await?;
    Ok(Json(GenerateResponse { questions }))
}

// ============ POST /evaluation/score ============

#[derive(Deserialize)]
struct ScoreRequest {
    role: String,
    #[serde(default)]
    company: Option<String>,
    question: String,
    answer: String,
}

async fn handle_score(
    State(service): State<AppState>,
    Json(req): Json<ScoreRequest>,
) -> Result<impl IntoResponse, AppError> {
    let result = service
        .score_answer(&req.role, req.company.as_deref(), &req.question, &req.answer)
        .await?;
    Ok(Json(result))
}

// ============ GET /analytics/* ============

#[derive(Deserialize)]
struct HistoryParams {
    limit: Option<usize>,
}

#[derive(Serialize)]
struct HistoryResponse {
    items: Vec<HistoryItem>,
}

async fn handle_history(
    State(service): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<HistoryResponse>, AppError> {
    let items = service
        .history(params.limit.unwrap_or(DEFAULT_HISTORY_LIMIT))
        .await?;
    Ok(Json(HistoryResponse { items }))
}

async fn handle_summary(State(service): State<AppState>) -> Result<impl IntoResponse, AppError> {
    Ok(Json(service.summary().await?))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    chunks: usize,
}

async fn handle_health(State(service): State<AppState>) -> Result<Json<HealthResponse>, AppError> {
    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        chunks: service.chunk_count().await?,
    }))
}
