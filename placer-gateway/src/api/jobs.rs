//! Job API Handlers
//!
//! HTTP endpoints for submission, status queries and result retrieval.

use axum::{Json, extract::State, http::HeaderMap};
use placer_client::{AccessPoint, JobStatusRecord, SpooledFile, SubmitResponse};
use placer_core::dto::jobs::{StatusQuery, SubmitRequest, TransferRequest};

use crate::api::AppState;
use crate::api::error::ApiResult;

/// POST /api/jobs/submit
/// Queue a job description
pub async fn submit_jobs(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SubmitRequest>,
) -> ApiResult<Json<SubmitResponse>> {
    let endpoint = state.endpoint(&headers)?;
    tracing::info!(
        "Submitting {} unit(s) of {} (spool: {})",
        req.description.queue_count(),
        req.description.executable().unwrap_or_default(),
        req.spool
    );

    let response = state
        .access_point
        .submit(&endpoint, &req.description, req.spool)
        .await?;

    Ok(Json(response))
}

/// POST /api/jobs/status
/// Raw status of the given units
pub async fn query_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<StatusQuery>,
) -> ApiResult<Json<Vec<JobStatusRecord>>> {
    let endpoint = state.endpoint(&headers)?;
    tracing::debug!("Status query for {} unit(s)", req.ids.len());

    let records = state.access_point.query_status(&endpoint, &req.ids).await?;
    Ok(Json(records))
}

/// POST /api/jobs/retrieve
/// Spooled artifacts of the completed units among the given ones
pub async fn retrieve_results(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<TransferRequest>,
) -> ApiResult<Json<Vec<SpooledFile>>> {
    let endpoint = state.endpoint(&headers)?;

    let files = state.access_point.spooled_files(&endpoint, &req.ids).await?;
    state.access_point.release(&req.ids).await;
    tracing::info!(
        "Sending {} file(s) for {} unit(s)",
        files.len(),
        req.ids.len()
    );
    Ok(Json(files))
}
