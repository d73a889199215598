//! DEFINITION_OVERVIEW: two focus communities, their claims, an evidence
//! subgraph, top chunks, and follow-up suggestions.

use common::error::AppError;

use crate::views::ClaimView;

use super::{
    empty_result,
    helpers::{self, PlanServices},
    Intent, PlanContext, RetrievalResult, Suggestion, TraceStep,
};

pub async fn run(services: &PlanServices<'_>, query: &str) -> Result<RetrievalResult, AppError> {
    let mut trace: Vec<TraceStep> = Vec::new();

    trace.push(TraceStep::new(
        "semantic_search_communities",
        serde_json::json!({"k": 2}),
    ));
    let communities = helpers::focus_communities(services, services.query_vec(), 2).await?;
    if let Some(step) = trace.last_mut() {
        step.counts = serde_json::json!({"communities": communities.len()});
    }

    if communities.is_empty() {
        return Ok(empty_result(
            Intent::DefinitionOverview,
            trace,
            "No results found",
        ));
    }

    trace.push(TraceStep::new(
        "retrieve_claims_for_communities",
        serde_json::json!({"limit_per": 15}),
    ));
    let claims = helpers::claims_for_communities(services, &communities, 15).await?;
    if let Some(step) = trace.last_mut() {
        step.counts = serde_json::json!({"claims": claims.len()});
    }

    if claims.is_empty() {
        return Ok(empty_result(
            Intent::DefinitionOverview,
            trace,
            "No results found",
        ));
    }

    trace.push(TraceStep::new(
        "build_evidence_subgraph",
        serde_json::json!({"max_concepts": 30}),
    ));
    let subgraph = helpers::build_subgraph(services, &claims, 30, 30).await?;
    if let Some(step) = trace.last_mut() {
        step.counts = serde_json::json!({
            "concepts": subgraph.concepts.len(),
            "edges": subgraph.edges.len(),
        });
    }

    trace.push(TraceStep::new("fetch_chunks", serde_json::json!({"limit": 10})));
    let chunks = helpers::fetch_chunks(services, &claims, 10).await?;
    if let Some(step) = trace.last_mut() {
        step.counts = serde_json::json!({"chunks": chunks.len()});
    }

    let focus_entities = subgraph.concepts.iter().take(10).cloned().collect();

    let suggestions = vec![
        Suggestion {
            label: "Timeline".into(),
            query: format!("Timeline of {query}"),
            intent: Intent::Timeline.as_str().into(),
        },
        Suggestion {
            label: "Causal Chain".into(),
            query: format!("What caused {query}?"),
            intent: Intent::CausalChain.as_str().into(),
        },
        Suggestion {
            label: "Explore Next".into(),
            query: format!("Related topics to {query}"),
            intent: Intent::ExploreNext.as_str().into(),
        },
    ];

    Ok(RetrievalResult {
        intent: Intent::DefinitionOverview.as_str().to_owned(),
        trace,
        context: PlanContext {
            focus_entities,
            focus_communities: helpers::community_views(&communities),
            claims: claims
                .iter()
                .take(20)
                .map(|c| ClaimView::from_claim(c, None))
                .collect(),
            chunks: Some(chunks),
            subgraph,
            suggestions,
            ..PlanContext::default()
        },
    })
}
