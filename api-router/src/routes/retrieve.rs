use axum::{extract::State, response::IntoResponse, Extension, Json};
use common::storage::{
    scope::resolve_active_context,
    types::{concept::Concept, quote::Quote},
};
use retrieval_pipeline::plans::{run_plan, DetailLevel, Intent, PlanOptions, PlanServices};
use serde::Deserialize;
use serde_json::json;

use crate::{api_state::ApiState, error::ApiError, middleware_auth::CallerIdentity};

#[derive(Debug, Deserialize)]
pub struct RetrieveRequest {
    pub message: String,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub intent: Option<String>,
    #[serde(default)]
    pub graph_id: Option<String>,
    #[serde(default)]
    pub branch_id: Option<String>,
    #[serde(default)]
    pub detail_level: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub limit_claims: Option<usize>,
    #[serde(default)]
    pub limit_entities: Option<usize>,
    #[serde(default)]
    pub limit_sources: Option<usize>,
    #[serde(default)]
    pub since_days: Option<i64>,
    /// Accepted for refresh-style queries; hours, normalized to seconds.
    #[serde(default)]
    pub max_age_hours: Option<serde_json::Value>,
    #[serde(default)]
    pub focus_concept_id: Option<String>,
    #[serde(default)]
    pub focus_quote_id: Option<String>,
    #[serde(default)]
    pub focus_page_url: Option<String>,
}

/// `max_age_hours` arrives untyped from older clients; only a JSON number
/// is accepted, and it becomes integer seconds.
pub fn normalize_max_age_hours(value: &serde_json::Value) -> Result<i64, ApiError> {
    match value.as_i64().or_else(|| value.as_f64().map(|f| f as i64)) {
        Some(hours) if hours >= 0 => Ok(hours.saturating_mul(3600)),
        _ => Err(ApiError::ValidationError(
            "max_age_hours must be a non-negative number".to_string(),
        )),
    }
}

pub async fn retrieve(
    State(state): State<ApiState>,
    Extension(caller): Extension<CallerIdentity>,
    Json(input): Json<RetrieveRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if input.message.trim().is_empty() {
        return Err(ApiError::ValidationError("message must not be empty".into()));
    }
    if let Some(mode) = input.mode.as_deref() {
        if mode != "graphrag" {
            return Err(ApiError::ValidationError(format!(
                "unsupported mode '{mode}'"
            )));
        }
    }
    let max_age_seconds = input
        .max_age_hours
        .as_ref()
        .map(normalize_max_age_hours)
        .transpose()?;

    let ctx = resolve_active_context(&state.db, &caller.tenant_id, &caller.user_id)
        .await
        .map_err(ApiError::from)?
        .with_overrides(input.graph_id.as_deref(), input.branch_id.as_deref());

    // Focus hints sharpen the query text before anchoring.
    let mut query_text = input.message.clone();
    if let Some(concept_id) = &input.focus_concept_id {
        if let Some(concept) = Concept::get_by_id(&state.db, &ctx, concept_id)
            .await
            .map_err(ApiError::from)?
        {
            query_text = format!("{} {query_text}", concept.name);
        }
    }
    if let Some(quote_id) = &input.focus_quote_id {
        if let Some(quote) = Quote::get_scoped(&state.db, &ctx, quote_id)
            .await
            .map_err(ApiError::from)?
        {
            query_text = format!("{query_text} \"{}\"", quote.text);
        }
    }
    if let Some(url) = &input.focus_page_url {
        query_text = format!("{query_text} ({url})");
    }

    let query_embedding = state.embedder.embed_query(&query_text).await;
    let services = PlanServices {
        db: &state.db,
        ctx: &ctx,
        router: Some(&state.router),
        embedder: Some(&state.embedder),
        query_embedding,
        include_proposed: Default::default(),
        proposed_threshold: state.config.proposed_edge_threshold,
    };

    let intent = Intent::parse(input.intent.as_deref());
    let options = PlanOptions {
        limit: input.limit.unwrap_or(5),
        detail_level: DetailLevel::parse(input.detail_level.as_deref()),
        since_days: input
            .since_days
            .or(max_age_seconds.map(|s| s / 86_400))
            .unwrap_or(30),
    };

    let mut result = run_plan(&services, &query_text, intent, &options)
        .await
        .map_err(ApiError::from)?;

    // Callers may lower the detail-level caps, never raise them.
    if let Some(n) = input.limit_claims {
        result.context.claims.truncate(n);
        if let Some(top_claims) = &mut result.context.top_claims {
            top_claims.truncate(n);
        }
    }
    if let Some(n) = input.limit_entities {
        result.context.focus_entities.truncate(n);
    }
    if let Some(n) = input.limit_sources {
        if let Some(top_sources) = &mut result.context.top_sources {
            top_sources.truncate(n);
        }
    }

    Ok(Json(json!({
        "intent": result.intent,
        "trace": result.trace,
        "context": result.context,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_age_hours_normalization() {
        assert_eq!(normalize_max_age_hours(&json!(2)).expect("ok"), 7200);
        assert_eq!(normalize_max_age_hours(&json!(0)).expect("ok"), 0);
        assert_eq!(normalize_max_age_hours(&json!(1.5)).expect("ok"), 3600);
        assert!(normalize_max_age_hours(&json!("24")).is_err());
        assert!(normalize_max_age_hours(&json!(-1)).is_err());
        assert!(normalize_max_age_hours(&json!(null)).is_err());
    }
}
