//! COMPARE: extract the two targets (LLM → regex → semantic), retrieve
//! per-target communities/claims/subgraphs, and report overlaps and
//! differences between the two concept sets.

use common::error::AppError;

use crate::views::ClaimView;

use super::{
    empty_result,
    helpers::{self, PlanServices},
    CompareDifferences, CompareOutcome, CompareOverlaps, Intent, PlanContext, RetrievalResult,
    TraceStep,
};

pub async fn run(services: &PlanServices<'_>, query: &str) -> Result<RetrievalResult, AppError> {
    let mut trace: Vec<TraceStep> = Vec::new();

    trace.push(TraceStep::new("identify_targets", serde_json::json!({})));
    let (targets, method) = helpers::identify_compare_targets(services, query).await?;
    if let Some(step) = trace.last_mut() {
        step.params = serde_json::json!({"method": method});
        step.counts = serde_json::json!({"targets": targets.len()});
    }

    if targets.len() < 2 {
        return Ok(empty_result(
            Intent::Compare,
            trace,
            "Could not identify two targets for comparison",
        ));
    }
    let (target_a, target_b) = (targets[0].clone(), targets[1].clone());

    trace.push(TraceStep::new(
        "retrieve_communities_per_target",
        serde_json::json!({"k": 2}),
    ));
    let vec_a = services.embed_or_query_vec(&target_a).await;
    let vec_b = services.embed_or_query_vec(&target_b).await;
    let communities_a = helpers::focus_communities(services, vec_a.as_deref(), 2).await?;
    let communities_b = helpers::focus_communities(services, vec_b.as_deref(), 2).await?;
    if let Some(step) = trace.last_mut() {
        step.counts = serde_json::json!({
            "communities_a": communities_a.len(),
            "communities_b": communities_b.len(),
        });
    }

    trace.push(TraceStep::new("retrieve_claims", serde_json::json!({"limit_per": 20})));
    let claims_a = helpers::claims_for_communities(services, &communities_a, 20).await?;
    let claims_b = helpers::claims_for_communities(services, &communities_b, 20).await?;
    let mut all_claims = claims_a.clone();
    for claim in &claims_b {
        if !all_claims.iter().any(|c| c.id == claim.id) {
            all_claims.push(claim.clone());
        }
    }
    if let Some(step) = trace.last_mut() {
        step.counts = serde_json::json!({"claims": all_claims.len()});
    }

    trace.push(TraceStep::new("build_subgraphs", serde_json::json!({})));
    let subgraph_a = helpers::build_subgraph(services, &claims_a, 30, 25).await?;
    let subgraph_b = helpers::build_subgraph(services, &claims_b, 30, 25).await?;

    let ids_b: Vec<&str> = subgraph_b.concepts.iter().map(|c| c.node_id.as_str()).collect();
    let ids_a: Vec<&str> = subgraph_a.concepts.iter().map(|c| c.node_id.as_str()).collect();

    let shared_concepts: Vec<_> = subgraph_a
        .concepts
        .iter()
        .filter(|c| ids_b.contains(&c.node_id.as_str()))
        .cloned()
        .collect();
    let unique_to_a: Vec<_> = subgraph_a
        .concepts
        .iter()
        .filter(|c| !ids_b.contains(&c.node_id.as_str()))
        .cloned()
        .collect();
    let unique_to_b: Vec<_> = subgraph_b
        .concepts
        .iter()
        .filter(|c| !ids_a.contains(&c.node_id.as_str()))
        .cloned()
        .collect();
    let shared_communities: Vec<_> = communities_a
        .iter()
        .filter(|a| {
            communities_b
                .iter()
                .any(|b| b.community.id == a.community.id)
        })
        .cloned()
        .collect();
    if let Some(step) = trace.last_mut() {
        step.counts = serde_json::json!({
            "concepts_a": subgraph_a.concepts.len(),
            "concepts_b": subgraph_b.concepts.len(),
            "shared_concepts": shared_concepts.len(),
        });
    }

    trace.push(TraceStep::new("fetch_chunks", serde_json::json!({})));
    let chunks = helpers::fetch_chunks(services, &all_claims, 20).await?;
    if let Some(step) = trace.last_mut() {
        step.counts = serde_json::json!({"chunks": chunks.len()});
    }

    // Merge the two subgraphs for the response body, A first.
    let mut merged = subgraph_a.clone();
    for concept in &subgraph_b.concepts {
        if !merged.concepts.iter().any(|c| c.node_id == concept.node_id) {
            merged.concepts.push(concept.clone());
        }
    }
    for edge in &subgraph_b.edges {
        if !merged.edges.contains(edge) {
            merged.edges.push(edge.clone());
        }
    }

    let compare = CompareOutcome {
        target_a,
        target_b,
        method: method.to_owned(),
        overlaps: CompareOverlaps {
            shared_concepts,
            shared_communities: helpers::community_views(&shared_communities),
        },
        differences: CompareDifferences {
            unique_to_a,
            unique_to_b,
        },
    };

    let mut focus_communities = helpers::community_views(&communities_a);
    for view in helpers::community_views(&communities_b) {
        if !focus_communities
            .iter()
            .any(|c| c.community_id == view.community_id)
        {
            focus_communities.push(view);
        }
    }

    Ok(RetrievalResult {
        intent: Intent::Compare.as_str().to_owned(),
        trace,
        context: PlanContext {
            focus_entities: merged.concepts.iter().take(15).cloned().collect(),
            focus_communities,
            claims: all_claims
                .iter()
                .take(20)
                .map(|c| ClaimView::from_claim(c, None))
                .collect(),
            chunks: Some(chunks),
            subgraph: merged,
            compare: Some(compare),
            ..PlanContext::default()
        },
    })
}
