//! Operator views and re-drive.

use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;

use super::ApiState;
use crate::api::error::{ApiError, ApiResult};
use crate::pipeline::{self, JobFilter, JobId, JobRecord, JobStatus, RedriveTarget, Trigger};

/// Query parameters for job listing.
#[derive(Debug, Deserialize, Default)]
pub struct JobQueryParams {
    /// Filter by status, e.g. `FAILED`
    pub status: Option<String>,
    /// Maximum results (default 20)
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct RedriveRequest {
    pub to: RedriveTarget,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/jobs", get(list_jobs))
        .route("/jobs/:id", get(get_job))
        .route("/jobs/:id/redrive", post(redrive_job))
        .with_state(state)
}

/// GET /jobs - List job records, most recently updated first.
async fn list_jobs(
    State(state): State<ApiState>,
    Query(params): Query<JobQueryParams>,
) -> ApiResult<Json<Vec<JobRecord>>> {
    let mut filter = JobFilter::default().with_limit(params.limit.unwrap_or(20));
    if let Some(status) = params.status.as_deref().filter(|s| !s.is_empty()) {
        let status: JobStatus = status.parse().map_err(ApiError::bad_request)?;
        filter = filter.with_status(status);
    }

    Ok(Json(state.store.list(&filter).await?))
}

/// GET /jobs/:id - Get a single job record.
async fn get_job(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<Json<JobRecord>> {
    let job_id = JobId::new(id);
    let record = state
        .store
        .get(&job_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Job {} not found", job_id)))?;

    Ok(Json(record))
}

/// POST /jobs/:id/redrive - Reset a FAILED job to `pending` or `transcribed`.
async fn redrive_job(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(request): Json<RedriveRequest>,
) -> ApiResult<Json<JobRecord>> {
    let job_id = JobId::new(id);
    let record = pipeline::redrive(state.store.as_ref(), &job_id, request.to).await?;

    if let Some(trigger) = Trigger::for_record(&record) {
        state.dispatcher.submit(trigger);
    }

    Ok(Json(record))
}
