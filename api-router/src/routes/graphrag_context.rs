use axum::{extract::State, response::IntoResponse, Extension, Json};
use common::{
    storage::{scope::resolve_active_context, types::claim::EvidenceStrictness},
    utils::ids::short_sha256,
};
use retrieval_pipeline::engine::{retrieve_context, ContextBundle, GraphRagParams};
use serde::Deserialize;
use serde_json::json;

use crate::{api_state::ApiState, error::ApiError, middleware_auth::CallerIdentity};

#[derive(Debug, Deserialize)]
pub struct GraphRagContextRequest {
    pub message: String,
    #[serde(default)]
    pub graph_id: Option<String>,
    #[serde(default)]
    pub branch_id: Option<String>,
    #[serde(default)]
    pub evidence_strictness: Option<String>,
    #[serde(default)]
    pub recency_days: Option<i64>,
    #[serde(default)]
    pub include_proposed_edges: Option<String>,
}

pub async fn graphrag_context(
    State(state): State<ApiState>,
    Extension(caller): Extension<CallerIdentity>,
    Json(input): Json<GraphRagContextRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if input.message.trim().is_empty() {
        return Err(ApiError::ValidationError("message must not be empty".into()));
    }

    let ctx = resolve_active_context(&state.db, &caller.tenant_id, &caller.user_id)
        .await
        .map_err(ApiError::from)?
        .with_overrides(input.graph_id.as_deref(), input.branch_id.as_deref());

    let strictness = EvidenceStrictness::parse(input.evidence_strictness.as_deref());
    let cache_key = format!(
        "{}:{}:{}:{}",
        ctx.graph_id,
        ctx.branch_id,
        short_sha256(&input.message, 8),
        strictness.as_str(),
    );
    if let Some(cached) = state.context_cache.get(&cache_key) {
        return Ok(Json(cached));
    }

    let params = GraphRagParams {
        strictness,
        include_proposed: common::storage::types::relationship::IncludeProposed::parse(
            input.include_proposed_edges.as_deref(),
        ),
        proposed_threshold: state.config.proposed_edge_threshold,
        ..GraphRagParams::default()
    };

    let bundle = retrieve_context(&state.db, &ctx, &state.embedder, &input.message, &params)
        .await
        .map_err(ApiError::from)?;

    let citations: Vec<serde_json::Value> = bundle
        .claims
        .iter()
        .map(|claim| {
            json!({
                "claim_id": claim.claim_id,
                "source_id": claim.source_id,
                "chunk_id": claim.chunk_id,
            })
        })
        .collect();

    let response = json!({
        "context_text": render_context_text(&bundle),
        "debug": bundle.debug,
        "citations": citations,
    });
    state.context_cache.insert(cache_key, response.clone());
    Ok(Json(response))
}

/// Flatten a bundle into prompt-ready text: community summaries, then
/// claims with confidence and source, then concept sketches and edges.
pub fn render_context_text(bundle: &ContextBundle) -> String {
    let mut out = String::new();

    if !bundle.communities.is_empty() {
        out.push_str("## Topic areas\n");
        for community in &bundle.communities {
            out.push_str(&format!(
                "- {}: {}\n",
                community.name,
                community.summary.as_deref().unwrap_or("")
            ));
        }
    }

    if bundle.claims.is_empty() {
        out.push_str("\nNo supporting evidence was found in the knowledge graph.\n");
    } else {
        out.push_str("\n## Evidence\n");
        for claim in &bundle.claims {
            out.push_str(&format!(
                "- [{:.2}] {} (source: {})\n",
                claim.confidence, claim.text, claim.source_id
            ));
        }
    }

    if !bundle.concepts.is_empty() {
        out.push_str("\n## Concepts\n");
        for concept in &bundle.concepts {
            out.push_str(&format!(
                "- {}: {}\n",
                concept.name,
                concept.description.as_deref().unwrap_or("")
            ));
        }
    }

    if !bundle.edges.is_empty() {
        out.push_str("\n## Relationships\n");
        for edge in &bundle.edges {
            out.push_str(&format!(
                "- {} -[{}]-> {}\n",
                edge.source_id, edge.predicate, edge.target_id
            ));
        }
    }

    out
}
