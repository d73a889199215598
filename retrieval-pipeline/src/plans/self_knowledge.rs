//! SELF_KNOWLEDGE: the user's own concepts matching the query, their
//! edges and mentioning claims; falls back to semantic claim search when
//! no concepts match.

use common::{
    error::AppError,
    storage::types::relationship::ConceptRelationship,
};

use crate::{
    community_index::semantic_search_concepts,
    views::{ClaimView, ConceptView, EdgeView},
};

use super::{
    empty_result,
    helpers::{self, PlanServices},
    Intent, PlanContext, RetrievalResult, Subgraph, Suggestion, TraceStep,
};

pub async fn run(
    services: &PlanServices<'_>,
    _query: &str,
    limit: usize,
) -> Result<RetrievalResult, AppError> {
    let mut trace: Vec<TraceStep> = Vec::new();

    trace.push(TraceStep::new(
        "semantic_search_concepts",
        serde_json::json!({"limit": limit}),
    ));
    let hits =
        semantic_search_concepts(services.db, services.ctx, services.query_vec(), limit.max(1))
            .await?;
    if let Some(step) = trace.last_mut() {
        step.counts = serde_json::json!({"concepts": hits.len()});
    }

    if hits.is_empty() {
        // Fallback: semantically relevant claims instead of owned concepts.
        trace.push(TraceStep::new(
            "fallback_semantic_claims",
            serde_json::json!({"limit": 10}),
        ));
        let claims = helpers::top_claims_by_embedding(services, 10).await?;
        if let Some(step) = trace.last_mut() {
            step.counts = serde_json::json!({"claims": claims.len()});
        }
        if claims.is_empty() {
            return Ok(empty_result(Intent::SelfKnowledge, trace, "No results found"));
        }

        let subgraph = helpers::build_subgraph(services, &claims, claims.len(), 10).await?;
        let chunks = helpers::fetch_chunks(services, &claims, claims.len()).await?;
        return Ok(RetrievalResult {
            intent: Intent::SelfKnowledge.as_str().to_owned(),
            trace,
            context: PlanContext {
                focus_entities: subgraph.concepts.iter().take(10).cloned().collect(),
                claims: claims.iter().map(|c| ClaimView::from_claim(c, None)).collect(),
                chunks: Some(chunks),
                subgraph,
                warnings: vec![
                    "No direct concepts found; showing semantically relevant notes.".to_owned(),
                ],
                ..PlanContext::default()
            },
        });
    }

    let node_ids: Vec<String> = hits.iter().map(|h| h.concept.id.clone()).collect();

    trace.push(TraceStep::new(
        "get_subgraph_for_nodes",
        serde_json::json!({"node_ids": node_ids}),
    ));
    let touching = ConceptRelationship::edges_touching(
        services.db,
        services.ctx,
        &node_ids,
        services.include_proposed,
        services.proposed_threshold,
    )
    .await?;

    let mut concepts: Vec<ConceptView> = hits
        .iter()
        .map(|h| ConceptView::from_concept(&h.concept, Some(400)))
        .collect();
    let mut edges: Vec<EdgeView> = Vec::new();
    let mut extra_ids: Vec<String> = Vec::new();
    for edge in touching.iter().take(50) {
        edges.push(EdgeView::from_relationship(edge));
        for endpoint in [&edge.in_, &edge.out] {
            if !concepts.iter().any(|c| &c.node_id == endpoint)
                && !extra_ids.contains(endpoint)
            {
                extra_ids.push(endpoint.clone());
            }
        }
    }
    let extra =
        common::storage::types::concept::Concept::get_many(services.db, services.ctx, &extra_ids)
            .await?;
    concepts.extend(extra.iter().map(|c| ConceptView::from_concept(c, Some(400))));
    if let Some(step) = trace.last_mut() {
        step.counts = serde_json::json!({"concepts": concepts.len(), "edges": edges.len()});
    }

    trace.push(TraceStep::new(
        "retrieve_claims_for_concepts",
        serde_json::json!({"limit": 30}),
    ));
    let all_concept_ids: Vec<String> = concepts.iter().map(|c| c.node_id.clone()).collect();
    let members = vec![("self".to_owned(), all_concept_ids)];
    let buckets = common::storage::types::claim::Claim::for_communities(
        services.db,
        services.ctx,
        &members,
        common::storage::types::claim::EvidenceStrictness::Low,
        30,
    )
    .await?;
    let mut claims: Vec<common::storage::types::claim::Claim> =
        buckets.get("self").cloned().unwrap_or_default();

    // Blend in semantically similar claims the mention join missed.
    for claim in helpers::top_claims_by_embedding(services, 10).await? {
        if !claims.iter().any(|c| c.id == claim.id) {
            claims.push(claim);
        }
    }
    if let Some(step) = trace.last_mut() {
        step.counts = serde_json::json!({"claims": claims.len()});
    }

    trace.push(TraceStep::new("fetch_chunks", serde_json::json!({})));
    let chunks = helpers::fetch_chunks(services, &claims, claims.len()).await?;
    if let Some(step) = trace.last_mut() {
        step.counts = serde_json::json!({"chunks": chunks.len()});
    }

    let first_name = hits
        .first()
        .map(|h| h.concept.name.clone())
        .unwrap_or_default();

    Ok(RetrievalResult {
        intent: Intent::SelfKnowledge.as_str().to_owned(),
        trace,
        context: PlanContext {
            focus_entities: concepts.iter().take(15).cloned().collect(),
            claims: claims
                .iter()
                .take(30)
                .map(|c| ClaimView::from_claim(c, None))
                .collect(),
            chunks: Some(chunks.into_iter().take(15).collect()),
            subgraph: Subgraph { concepts, edges },
            suggestions: vec![
                Suggestion {
                    label: "Explore Connections".into(),
                    query: format!("How is {first_name} connected to other things?"),
                    intent: Intent::WhoNetwork.as_str().into(),
                },
                Suggestion {
                    label: "Detailed Timeline".into(),
                    query: format!("Timeline of {first_name}"),
                    intent: Intent::Timeline.as_str().into(),
                },
            ],
            ..PlanContext::default()
        },
    })
}
