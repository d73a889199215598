//! CAUSAL_CHAIN: communities → claims → anchor concepts → pairwise
//! shortest paths, each path edge annotated with its supporting claims.

use common::error::AppError;

use crate::{
    engine::detect_anchors,
    paths::{shortest_path_edges, DEFAULT_MAX_HOPS},
    views::{ClaimView, EdgeView},
};

use super::{
    empty_result,
    helpers::{self, PlanServices},
    Intent, PlanContext, RetrievalResult, TraceStep,
};

const MAX_PAIR_QUERIES: usize = 10;

pub async fn run(services: &PlanServices<'_>, query: &str) -> Result<RetrievalResult, AppError> {
    let mut trace: Vec<TraceStep> = Vec::new();

    trace.push(TraceStep::new("retrieve_communities", serde_json::json!({"k": 3})));
    let communities = helpers::focus_communities(services, services.query_vec(), 3).await?;
    if let Some(step) = trace.last_mut() {
        step.counts = serde_json::json!({"communities": communities.len()});
    }
    if communities.is_empty() {
        return Ok(empty_result(Intent::CausalChain, trace, "No results found"));
    }

    trace.push(TraceStep::new("retrieve_claims", serde_json::json!({"limit_per": 30})));
    let claims = helpers::claims_for_communities(services, &communities, 30).await?;
    if let Some(step) = trace.last_mut() {
        step.counts = serde_json::json!({"claims": claims.len()});
    }
    if claims.is_empty() {
        return Ok(empty_result(Intent::CausalChain, trace, "No results found"));
    }

    trace.push(TraceStep::new(
        "build_evidence_subgraph",
        serde_json::json!({"max_concepts": 50}),
    ));
    let subgraph = helpers::build_subgraph(services, &claims, 50, 50).await?;
    if let Some(step) = trace.last_mut() {
        step.counts = serde_json::json!({
            "concepts": subgraph.concepts.len(),
            "edges": subgraph.edges.len(),
        });
    }

    trace.push(TraceStep::new("extract_causal_paths", serde_json::json!({})));
    let anchors = detect_anchors(services.db, services.ctx, query, services.query_vec()).await?;

    let mut chain_edges: Vec<EdgeView> = Vec::new();
    let mut queries = 0usize;
    'outer: for i in 0..anchors.anchor_ids.len() {
        for j in (i + 1)..anchors.anchor_ids.len() {
            if queries >= MAX_PAIR_QUERIES {
                break 'outer;
            }
            queries += 1;
            let found = shortest_path_edges(
                services.db,
                services.ctx,
                &anchors.anchor_ids[i],
                &anchors.anchor_ids[j],
                DEFAULT_MAX_HOPS,
                services.include_proposed,
                services.proposed_threshold,
            )
            .await?;
            for edge in found {
                let view = EdgeView {
                    source_id: edge.source_id,
                    target_id: edge.target_id,
                    predicate: edge.predicate,
                };
                if !chain_edges.contains(&view) {
                    chain_edges.push(view);
                }
            }
        }
    }
    if let Some(step) = trace.last_mut() {
        step.counts = serde_json::json!({
            "anchors": anchors.anchor_ids.len(),
            "path_edges": chain_edges.len(),
            "path_queries": queries,
        });
    }

    // Claims supporting the chain: those mentioning both endpoints of some
    // path edge, falling back to single-endpoint mentions.
    let chain_claims: Vec<ClaimView> = claims
        .iter()
        .filter(|claim| {
            chain_edges.iter().any(|edge| {
                claim.mentioned_concept_ids.contains(&edge.source_id)
                    || claim.mentioned_concept_ids.contains(&edge.target_id)
            })
        })
        .take(20)
        .map(|c| ClaimView::from_claim(c, None))
        .collect();
    let claims_view = if chain_claims.is_empty() {
        claims
            .iter()
            .take(20)
            .map(|c| ClaimView::from_claim(c, None))
            .collect()
    } else {
        chain_claims
    };

    trace.push(TraceStep::new("fetch_chunks", serde_json::json!({})));
    let chunks = helpers::fetch_chunks(services, &claims, 15).await?;
    if let Some(step) = trace.last_mut() {
        step.counts = serde_json::json!({"chunks": chunks.len()});
    }

    // The chain edges lead the edge list so they survive preview capping.
    let mut merged_subgraph = subgraph;
    let mut edges = chain_edges;
    for edge in &merged_subgraph.edges {
        if !edges.contains(edge) {
            edges.push(edge.clone());
        }
    }
    merged_subgraph.edges = edges;

    Ok(RetrievalResult {
        intent: Intent::CausalChain.as_str().to_owned(),
        trace,
        context: PlanContext {
            focus_entities: merged_subgraph.concepts.iter().take(15).cloned().collect(),
            focus_communities: helpers::community_views(&communities),
            claims: claims_view,
            chunks: Some(chunks),
            subgraph: merged_subgraph,
            ..PlanContext::default()
        },
    })
}
