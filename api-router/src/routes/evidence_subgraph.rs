use axum::{
    extract::State,
    response::{IntoResponse, Response},
    Extension, Json,
};
use common::storage::{scope::resolve_active_context, types::relationship::IncludeProposed};
use retrieval_pipeline::subgraph::get_evidence_subgraph;
use serde::Deserialize;
use serde_json::json;

use crate::{api_state::ApiState, error::ApiError, middleware_auth::CallerIdentity};

#[derive(Debug, Deserialize)]
pub struct EvidenceSubgraphRequest {
    #[serde(default)]
    pub graph_id: Option<String>,
    #[serde(default)]
    pub branch_id: Option<String>,
    pub claim_ids: Vec<String>,
    #[serde(default)]
    pub limit_nodes: Option<usize>,
    #[serde(default)]
    pub limit_edges: Option<usize>,
    #[serde(default)]
    pub include_proposed: Option<String>,
}

pub async fn evidence_subgraph(
    State(state): State<ApiState>,
    Extension(caller): Extension<CallerIdentity>,
    Json(input): Json<EvidenceSubgraphRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let ctx = resolve_active_context(&state.db, &caller.tenant_id, &caller.user_id)
        .await
        .map_err(ApiError::from)?
        .with_overrides(input.graph_id.as_deref(), input.branch_id.as_deref());

    let subgraph = get_evidence_subgraph(
        &state.db,
        &ctx,
        &input.claim_ids,
        input.limit_nodes,
        input.limit_edges,
        IncludeProposed::parse(input.include_proposed.as_deref()),
        state.config.proposed_edge_threshold,
    )
    .await
    .map_err(ApiError::from)?;

    Ok(Json(json!({
        "concepts": subgraph.concepts,
        "edges": subgraph.edges,
    })))
}
