use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use common::storage::{
    scope::resolve_active_context,
    types::{
        ingestion_task::{IngestionRequest, IngestionTask},
        usage::UsageCounter,
    },
};
use ingestion_pipeline::undo_run;
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{api_state::ApiState, error::ApiError, middleware_auth::CallerIdentity};

#[derive(Debug, Deserialize)]
pub struct IngestLectureRequest {
    pub lecture_title: String,
    pub lecture_text: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub branch_id: Option<String>,
}

fn lecture_request(input: &IngestLectureRequest, caller: &CallerIdentity) -> IngestionRequest {
    IngestionRequest {
        tenant_id: caller.tenant_id.clone(),
        user_id: caller.user_id.clone(),
        source_id: format!("lecture:{}", common::utils::ids::slugify(&input.lecture_title)),
        source_label: input.lecture_title.clone(),
        domain: input.domain.clone(),
        text: input.lecture_text.clone(),
        branch_id: input.branch_id.clone(),
    }
}

/// Synchronous lecture ingestion: the response carries the run's results.
pub async fn ingest_lecture(
    State(state): State<ApiState>,
    Extension(caller): Extension<CallerIdentity>,
    Json(input): Json<IngestLectureRequest>,
) -> Result<Response, ApiError> {
    if input.lecture_text.trim().is_empty() {
        return Err(ApiError::ValidationError(
            "lecture_text must not be empty".into(),
        ));
    }
    if input.lecture_title.trim().is_empty() {
        return Err(ApiError::ValidationError(
            "lecture_title must not be empty".into(),
        ));
    }

    let request = lecture_request(&input, &caller);
    let ctx = resolve_active_context(&state.db, &caller.tenant_id, &caller.user_id)
        .await
        .map_err(ApiError::from)?
        .with_overrides(None, input.branch_id.as_deref());

    UsageCounter::increment(&state.db, &caller.tenant_id, &caller.user_id, "ingest")
        .await
        .map_err(ApiError::from)?;

    let outcome = state
        .pipeline
        .ingest(&ctx, &request, &CancellationToken::new())
        .await
        .map_err(ApiError::from)?;

    info!(run_id = %outcome.run_id, status = ?outcome.status, "lecture ingested");
    Ok((
        StatusCode::OK,
        Json(json!({
            "lecture_id": outcome.lecture_id,
            "nodes_created": outcome.nodes_created,
            "nodes_updated": outcome.nodes_updated,
            "links_created": outcome.links_created,
            "segments": outcome.segments,
            "run_id": outcome.run_id,
            "counts": outcome.counts,
            "errors": outcome.errors,
        })),
    )
        .into_response())
}

/// Queue-backed variant for large sources. A full queue is a fast, typed
/// failure rather than unbounded buffering.
pub async fn enqueue_lecture(
    State(state): State<ApiState>,
    Extension(caller): Extension<CallerIdentity>,
    Json(input): Json<IngestLectureRequest>,
) -> Result<Response, ApiError> {
    if input.lecture_text.trim().is_empty() {
        return Err(ApiError::ValidationError(
            "lecture_text must not be empty".into(),
        ));
    }

    let request = lecture_request(&input, &caller);
    let task = IngestionTask::enqueue(
        request,
        state.config.ingestion_queue_capacity,
        &state.db,
    )
    .await
    .map_err(ApiError::from)?;

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "task_id": task.id, "status": "queued" })),
    )
        .into_response())
}

/// Undo a run within the caller's active branch; everything is archived,
/// nothing deleted.
pub async fn undo_ingestion_run(
    State(state): State<ApiState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(run_id): Path<String>,
) -> Result<Response, ApiError> {
    let ctx = resolve_active_context(&state.db, &caller.tenant_id, &caller.user_id)
        .await
        .map_err(ApiError::from)?;

    let summary = undo_run(&state.db, &ctx, &run_id)
        .await
        .map_err(ApiError::from)?;

    Ok(Json(json!({ "run_id": run_id, "undone": summary })).into_response())
}
