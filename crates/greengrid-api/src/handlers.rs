//! REST API handlers for jobs.
//!
//! Each handler reads/writes via `JobStore`, hands new work to the
//! scheduler, and returns JSON responses.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::Utc;
use serde::Deserialize;
use tracing::{error, info};

use greengrid_state::{Job, MAX_ENERGY_USAGE, Priority, valid_energy_usage};

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
pub(crate) struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    pub(crate) fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

pub(crate) fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

// ── Jobs ───────────────────────────────────────────────────────

/// Job submission body.
#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    pub name: String,
    /// Defaults to the configured default region.
    #[serde(default)]
    pub region: Option<String>,
    pub energy_usage: f64,
    pub priority: Priority,
}

/// Paging parameters for `GET /api/jobs`.
#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub skip: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

/// POST /api/jobs
pub async fn create_job(
    State(state): State<ApiState>,
    Json(req): Json<CreateJobRequest>,
) -> impl IntoResponse {
    let region = req
        .region
        .unwrap_or_else(|| state.config.regions.default_region.clone());
    if !state.config.regions.catalog.contains(&region) {
        return error_response(
            &format!("unknown region: {region}"),
            StatusCode::BAD_REQUEST,
        )
        .into_response();
    }
    if !valid_energy_usage(req.energy_usage) {
        return error_response(
            &format!("energy_usage must be positive and at most {MAX_ENERGY_USAGE}"),
            StatusCode::BAD_REQUEST,
        )
        .into_response();
    }

    let job = Job::new(req.name, region, req.energy_usage, req.priority);
    if let Err(e) = state.store.create_job(&job) {
        return error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response();
    }
    info!(job_id = %job.id, region = %job.requested_region, priority = ?job.priority, "job submitted");

    // The job is durable; a restart re-queues it if this fails.
    if let Err(e) = state.scheduler.submit(&job.id).await {
        error!(job_id = %job.id, error = %e, "failed to queue job for dispatch");
    }

    (StatusCode::CREATED, ApiResponse::ok(job)).into_response()
}

/// GET /api/jobs
pub async fn list_jobs(
    State(state): State<ApiState>,
    Query(params): Query<ListParams>,
) -> impl IntoResponse {
    match state.store.list_jobs(params.skip, params.limit) {
        Ok(jobs) => ApiResponse::ok(jobs).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// GET /api/jobs/:id
pub async fn get_job(State(state): State<ApiState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.store.get_job(&id) {
        Ok(Some(job)) => ApiResponse::ok(job).into_response(),
        Ok(None) => error_response("job not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// DELETE /api/jobs/:id
pub async fn delete_job(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.store.delete_job(&id) {
        Ok(true) => {
            state.scheduler.cancel(&id).await;
            info!(job_id = %id, "job deleted");
            ApiResponse::ok("deleted").into_response()
        }
        Ok(false) => error_response("job not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// PUT /api/jobs/:id/stop
pub async fn stop_job(State(state): State<ApiState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.store.stop_job(&id, Utc::now()) {
        Ok(Some(job)) => {
            state.scheduler.cancel(&id).await;
            ApiResponse::ok(job).into_response()
        }
        Ok(None) => error_response("job not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}
