//! HTTP surface for the verification workflow.
//!
//! Responses are `{ok: true, data}` or `{ok: false, error: {code, message}}`.
//! Status codes: 200 success, 201 created, 400 invalid, 404 not found,
//! 409 run conflict, 500 internal.
//!
//! The workflow instance sits behind a `tokio::sync::Mutex`: jobs in one
//! workflow run serially by contract, so the queue never needs finer
//! locking. When a ledger path is configured, the ledger is rewritten after
//! every state transition.

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Path as AxumPath, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::error;

use explainmd_verify::{
    compute_verification_job_hash, compute_verification_reproducibility_hash, replay_command,
    write_verification_ledger, EnqueueOptions, ReproducibilityContract, VerificationJob,
    VerificationRunner, VerificationTarget, VerificationWorkflow, WorkflowError,
};

pub struct ApiState {
    pub workflow: Mutex<VerificationWorkflow>,
    pub runner: Arc<dyn VerificationRunner>,
    pub ledger_path: Option<PathBuf>,
}

pub type SharedState = Arc<ApiState>;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
    }
}

impl From<WorkflowError> for ApiError {
    fn from(err: WorkflowError) -> Self {
        match &err {
            WorkflowError::UnknownJob(_) => Self::not_found(err.to_string()),
            WorkflowError::Conflict { .. } => {
                Self::new(StatusCode::CONFLICT, "conflict", err.to_string())
            }
            WorkflowError::DuplicateJob(_) | WorkflowError::Core(_) => {
                Self::new(StatusCode::BAD_REQUEST, "invalid", err.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "ok": false,
            "error": { "code": self.code, "message": self.message },
        });
        (self.status, Json(body)).into_response()
    }
}

fn ok_response(status: StatusCode, data: serde_json::Value) -> Response {
    (status, Json(json!({ "ok": true, "data": data }))).into_response()
}

/// A job plus its derived hashes, as returned by every endpoint.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct JobView {
    #[serde(flatten)]
    job: VerificationJob,
    job_hash: String,
    reproducibility_hash: String,
    replay_command: String,
}

impl JobView {
    fn from_job(job: VerificationJob) -> Self {
        let job_hash = compute_verification_job_hash(&job);
        let reproducibility_hash =
            compute_verification_reproducibility_hash(&job.reproducibility);
        let replay_command = replay_command(&job.reproducibility);
        Self {
            job,
            job_hash,
            reproducibility_hash,
            replay_command,
        }
    }
}

async fn persist_if_configured(state: &ApiState, workflow: &VerificationWorkflow) {
    if let Some(path) = &state.ledger_path {
        if let Err(e) = write_verification_ledger(path, &workflow.to_ledger()) {
            error!("ledger persistence failed: {e}");
        }
    }
}

async fn health_handler() -> Response {
    (StatusCode::OK, Json(json!({ "status": "ok" }))).into_response()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobsQuery {
    leaf_id: Option<String>,
}

async fn list_jobs_handler(
    State(state): State<SharedState>,
    Query(query): Query<JobsQuery>,
) -> Result<Response, ApiError> {
    let workflow = state.workflow.lock().await;
    let jobs = match &query.leaf_id {
        Some(leaf_id) => workflow.list_jobs_for_leaf(leaf_id),
        None => workflow.list_jobs(),
    };
    let views: Vec<JobView> = jobs.into_iter().map(JobView::from_job).collect();
    Ok(ok_response(
        StatusCode::OK,
        serde_json::to_value(views).map_err(|e| ApiError::internal(e.to_string()))?,
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnqueueBody {
    target: VerificationTarget,
    reproducibility: ReproducibilityContract,
    #[serde(default)]
    job_id: Option<String>,
    #[serde(default)]
    timeout_ms: Option<u64>,
}

async fn enqueue_handler(
    State(state): State<SharedState>,
    Json(body): Json<EnqueueBody>,
) -> Result<Response, ApiError> {
    let mut workflow = state.workflow.lock().await;
    let job = workflow.enqueue(
        body.target,
        body.reproducibility,
        EnqueueOptions {
            job_id: body.job_id,
            timeout_ms: body.timeout_ms,
        },
    )?;
    persist_if_configured(&state, &workflow).await;
    Ok(ok_response(
        StatusCode::CREATED,
        serde_json::to_value(JobView::from_job(job))
            .map_err(|e| ApiError::internal(e.to_string()))?,
    ))
}

async fn get_job_handler(
    State(state): State<SharedState>,
    AxumPath(id): AxumPath<String>,
) -> Result<Response, ApiError> {
    let workflow = state.workflow.lock().await;
    let job = workflow
        .get_job(&id)
        .ok_or_else(|| ApiError::not_found(format!("unknown job id: {id}")))?;
    Ok(ok_response(
        StatusCode::OK,
        serde_json::to_value(JobView::from_job(job))
            .map_err(|e| ApiError::internal(e.to_string()))?,
    ))
}

async fn run_job_handler(
    State(state): State<SharedState>,
    AxumPath(id): AxumPath<String>,
) -> Result<Response, ApiError> {
    let mut workflow = state.workflow.lock().await;
    let job = workflow.run_job(&id, state.runner.as_ref()).await?;
    persist_if_configured(&state, &workflow).await;
    Ok(ok_response(
        StatusCode::OK,
        serde_json::to_value(JobView::from_job(job))
            .map_err(|e| ApiError::internal(e.to_string()))?,
    ))
}

async fn run_next_handler(State(state): State<SharedState>) -> Result<Response, ApiError> {
    let mut workflow = state.workflow.lock().await;
    let job = workflow.run_next_queued_job(state.runner.as_ref()).await?;
    persist_if_configured(&state, &workflow).await;
    let data = match job {
        Some(job) => serde_json::to_value(JobView::from_job(job))
            .map_err(|e| ApiError::internal(e.to_string()))?,
        None => serde_json::Value::Null,
    };
    Ok(ok_response(StatusCode::OK, data))
}

/// Build the router over a shared state.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route(
            "/api/verification/jobs",
            get(list_jobs_handler).post(enqueue_handler),
        )
        .route("/api/verification/jobs/{id}", get(get_job_handler))
        .route("/api/verification/jobs/{id}/run", post(run_job_handler))
        .route("/api/verification/run-next", post(run_next_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any))
        .with_state(state)
}
