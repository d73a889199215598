//! WHO_NETWORK: ego network of the best-matching concept — its 1-hop
//! neighbors with relationship metadata, plus claims from nearby
//! communities.

use common::{
    error::AppError,
    storage::types::{
        concept::Concept,
        relationship::{ConceptRelationship, IncludeProposed, RelationshipStatus},
    },
};

use crate::{
    community_index::semantic_search_concepts,
    views::{ClaimView, ConceptView},
};

use super::{
    empty_result,
    helpers::{self, PlanServices},
    Intent, NetworkEdge, PlanContext, RetrievalResult, TraceStep,
};

fn status_label(status: RelationshipStatus) -> &'static str {
    match status {
        RelationshipStatus::Proposed => "PROPOSED",
        RelationshipStatus::Accepted => "ACCEPTED",
        RelationshipStatus::Rejected => "REJECTED",
    }
}

pub async fn run(services: &PlanServices<'_>, query: &str) -> Result<RetrievalResult, AppError> {
    let mut trace: Vec<TraceStep> = Vec::new();

    trace.push(TraceStep::new(
        "semantic_search_concepts",
        serde_json::json!({"limit": 3}),
    ));
    let hits = semantic_search_concepts(services.db, services.ctx, services.query_vec(), 3).await?;
    if let Some(step) = trace.last_mut() {
        step.counts = serde_json::json!({"concepts": hits.len()});
    }
    let Some(ego) = hits.first().map(|h| h.concept.clone()) else {
        return Ok(empty_result(Intent::WhoNetwork, trace, "No results found"));
    };

    trace.push(TraceStep::new("get_neighbors", serde_json::json!({"status": "all"})));
    let edges = ConceptRelationship::edges_touching(
        services.db,
        services.ctx,
        &[ego.id.clone()],
        IncludeProposed::All,
        services.proposed_threshold,
    )
    .await?;

    let mut neighbor_ids: Vec<String> = Vec::new();
    for edge in &edges {
        let other = if edge.in_ == ego.id { &edge.out } else { &edge.in_ };
        if !neighbor_ids.contains(other) {
            neighbor_ids.push(other.clone());
        }
    }
    let neighbors = Concept::get_many(services.db, services.ctx, &neighbor_ids).await?;
    if let Some(step) = trace.last_mut() {
        step.counts = serde_json::json!({"neighbors": neighbors.len()});
    }

    trace.push(TraceStep::new("retrieve_claims", serde_json::json!({})));
    let communities = helpers::focus_communities(services, services.query_vec(), 3).await?;
    let claims = helpers::claims_for_communities(services, &communities, 20).await?;
    if let Some(step) = trace.last_mut() {
        step.counts = serde_json::json!({"claims": claims.len()});
    }

    trace.push(TraceStep::new("build_evidence_subgraph", serde_json::json!({})));
    let subgraph = helpers::build_subgraph(services, &claims, 30, 40).await?;
    if let Some(step) = trace.last_mut() {
        step.counts = serde_json::json!({
            "concepts": subgraph.concepts.len(),
            "edges": subgraph.edges.len(),
        });
    }

    trace.push(TraceStep::new("fetch_chunks", serde_json::json!({})));
    let chunks = helpers::fetch_chunks(services, &claims, 15).await?;
    if let Some(step) = trace.last_mut() {
        step.counts = serde_json::json!({"chunks": chunks.len()});
    }

    let network_edges: Vec<NetworkEdge> = edges
        .iter()
        .take(20)
        .map(|edge| {
            let is_outgoing = edge.in_ == ego.id;
            let other = if is_outgoing { &edge.out } else { &edge.in_ };
            NetworkEdge {
                source_id: ego.id.clone(),
                target_id: other.clone(),
                predicate: edge.metadata.predicate.clone(),
                is_outgoing,
                status: status_label(edge.metadata.status).to_owned(),
                confidence: edge.metadata.confidence,
            }
        })
        .collect();

    let mut focus_entities = vec![ConceptView::from_concept(&ego, Some(400))];
    focus_entities.extend(
        neighbors
            .iter()
            .take(15)
            .map(|n| ConceptView::from_concept(n, Some(400))),
    );

    Ok(RetrievalResult {
        intent: Intent::WhoNetwork.as_str().to_owned(),
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
            network_edges: Some(network_edges),
            ..PlanContext::default()
        },
    })
}
