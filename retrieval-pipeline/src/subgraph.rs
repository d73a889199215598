//! Standalone evidence subgraph: the concepts a set of claims mention,
//! their 1-hop neighborhood, and the edges among the collected set.

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        scope::ActiveContext,
        types::{
            claim::Claim,
            concept::Concept,
            relationship::{ConceptRelationship, IncludeProposed},
        },
    },
};
use serde::{Deserialize, Serialize};

use crate::views::{ConceptView, EdgeView};

pub const DEFAULT_MAX_CONCEPTS: usize = 10;
pub const DEFAULT_MAX_EDGES: usize = 15;
pub const HARD_MAX_CONCEPTS: usize = 50;
pub const HARD_MAX_EDGES: usize = 80;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EvidenceSubgraph {
    pub concepts: Vec<ConceptView>,
    pub edges: Vec<EdgeView>,
}

/// Build the evidence subgraph for `claim_ids`. Caller-provided limits are
/// honored exactly but clamped to the hard maxima; absent limits use the
/// defaults. Output order is deterministic: mention order for claim
/// concepts, id order for neighbors and edges.
pub async fn get_evidence_subgraph(
    db: &SurrealDbClient,
    ctx: &ActiveContext,
    claim_ids: &[String],
    limit_nodes: Option<usize>,
    limit_edges: Option<usize>,
    policy: IncludeProposed,
    threshold: f32,
) -> Result<EvidenceSubgraph, AppError> {
    let max_concepts = limit_nodes
        .unwrap_or(DEFAULT_MAX_CONCEPTS)
        .min(HARD_MAX_CONCEPTS);
    let max_edges = limit_edges.unwrap_or(DEFAULT_MAX_EDGES).min(HARD_MAX_EDGES);

    if claim_ids.is_empty() || max_concepts == 0 {
        return Ok(EvidenceSubgraph::default());
    }

    let claims = Claim::get_many(db, ctx, claim_ids).await?;

    // Mentioned concepts in claim order, then mention order, deduped.
    let mut mentioned_ids: Vec<String> = Vec::new();
    for claim in &claims {
        for concept_id in &claim.mentioned_concept_ids {
            if !mentioned_ids.contains(concept_id) {
                mentioned_ids.push(concept_id.clone());
            }
        }
    }

    let mentioned = Concept::get_many(db, ctx, &mentioned_ids).await?;
    let mut collected: Vec<Concept> = mentioned.into_iter().take(max_concepts).collect();
    let mut collected_ids: Vec<String> = collected.iter().map(|c| c.id.clone()).collect();

    // 1-hop neighbors, id-ordered, until the node budget is spent.
    if collected.len() < max_concepts && !collected_ids.is_empty() {
        let surrounding =
            ConceptRelationship::edges_touching(db, ctx, &collected_ids, policy, threshold)
                .await?;
        let mut neighbor_ids: Vec<String> = Vec::new();
        for edge in &surrounding {
            for node in [&edge.in_, &edge.out] {
                if !collected_ids.contains(node) && !neighbor_ids.contains(node) {
                    neighbor_ids.push(node.clone());
                }
            }
        }
        neighbor_ids.sort();
        let neighbors = Concept::get_many(db, ctx, &neighbor_ids).await?;
        for neighbor in neighbors {
            if collected.len() >= max_concepts {
                break;
            }
            collected_ids.push(neighbor.id.clone());
            collected.push(neighbor);
        }
    }

    // Edges entirely inside the collected set.
    let mut edges: Vec<EdgeView> =
        ConceptRelationship::edges_among(db, ctx, &collected_ids, policy, threshold)
            .await?
            .iter()
            .map(EdgeView::from_relationship)
            .collect();
    edges.truncate(max_edges);

    Ok(EvidenceSubgraph {
        concepts: collected
            .iter()
            .map(|c| ConceptView::from_concept(c, Some(400)))
            .collect(),
        edges,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::storage::scope::resolve_active_context;
    use common::storage::types::claim::ClaimDraft;
    use common::storage::types::concept::ConceptDraft;
    use common::storage::types::relationship::{RelationshipDraft, RelationshipStatus};

    async fn scoped_db() -> (SurrealDbClient, ActiveContext) {
        let db = SurrealDbClient::memory("test_ns", &uuid::Uuid::new_v4().to_string())
            .await
            .expect("Failed to start in-memory surrealdb");
        db.ensure_initialized().await.expect("init");
        let ctx = resolve_active_context(&db, "tenant-a", "user-1")
            .await
            .expect("resolve");
        (db, ctx)
    }

    async fn seed_concept(db: &SurrealDbClient, ctx: &ActiveContext, name: &str) -> String {
        Concept::upsert(
            db,
            ctx,
            ConceptDraft {
                name: name.to_owned(),
                description: name.to_owned(),
                ..ConceptDraft::default()
            },
        )
        .await
        .expect("seed")
        .concept
        .id
    }

    async fn seed_graph(
        db: &SurrealDbClient,
        ctx: &ActiveContext,
    ) -> (Vec<String>, Vec<String>) {
        let mut concept_ids = Vec::new();
        for name in ["C0", "C1", "C2", "C3", "C4", "C5"] {
            concept_ids.push(seed_concept(db, ctx, name).await);
        }
        for pair in concept_ids.windows(2) {
            ConceptRelationship::upsert(
                db,
                ctx,
                &pair[0],
                &pair[1],
                RelationshipDraft {
                    predicate: "RELATED_TO".into(),
                    confidence: 0.95,
                    method: "llm".into(),
                    source_id: None,
                    chunk_id: None,
                    claim_id: None,
                    rationale: None,
                    ingestion_run_id: None,
                },
                RelationshipStatus::Accepted,
            )
            .await
            .expect("edge");
        }

        let mut claim_ids = Vec::new();
        for (text, mentions) in [
            ("claim a", vec![0usize, 1]),
            ("claim b", vec![1, 2]),
            ("claim c", vec![3]),
        ] {
            let claim = Claim::upsert(
                db,
                ctx,
                ClaimDraft {
                    text: text.into(),
                    confidence: 0.9,
                    method: "llm".into(),
                    source_id: "src".into(),
                    mentioned_concept_ids: mentions
                        .into_iter()
                        .map(|i| concept_ids[i].clone())
                        .collect(),
                    ..ClaimDraft::default()
                },
            )
            .await
            .expect("claim");
            claim_ids.push(claim.id);
        }
        (concept_ids, claim_ids)
    }

    #[tokio::test]
    async fn test_caps_are_respected_exactly() {
        let (db, ctx) = scoped_db().await;
        let (_, claim_ids) = seed_graph(&db, &ctx).await;

        let subgraph = get_evidence_subgraph(
            &db,
            &ctx,
            &claim_ids,
            Some(3),
            Some(4),
            IncludeProposed::Auto,
            0.6,
        )
        .await
        .expect("subgraph");

        assert!(subgraph.concepts.len() <= 3);
        assert!(subgraph.edges.len() <= 4);
    }

    #[tokio::test]
    async fn test_repeat_calls_yield_identical_order() {
        let (db, ctx) = scoped_db().await;
        let (_, claim_ids) = seed_graph(&db, &ctx).await;

        let first = get_evidence_subgraph(
            &db,
            &ctx,
            &claim_ids,
            Some(5),
            Some(10),
            IncludeProposed::Auto,
            0.6,
        )
        .await
        .expect("subgraph");
        let second = get_evidence_subgraph(
            &db,
            &ctx,
            &claim_ids,
            Some(5),
            Some(10),
            IncludeProposed::Auto,
            0.6,
        )
        .await
        .expect("subgraph");

        let first_ids: Vec<&str> = first.concepts.iter().map(|c| c.node_id.as_str()).collect();
        let second_ids: Vec<&str> = second.concepts.iter().map(|c| c.node_id.as_str()).collect();
        assert_eq!(first_ids, second_ids);
        assert_eq!(first.edges, second.edges);
    }

    #[tokio::test]
    async fn test_limits_clamped_to_hard_maxima() {
        let (db, ctx) = scoped_db().await;
        let (_, claim_ids) = seed_graph(&db, &ctx).await;

        // asking for more than the hard max must not fail, just clamp
        let subgraph = get_evidence_subgraph(
            &db,
            &ctx,
            &claim_ids,
            Some(10_000),
            Some(10_000),
            IncludeProposed::Auto,
            0.6,
        )
        .await
        .expect("subgraph");
        assert!(subgraph.concepts.len() <= HARD_MAX_CONCEPTS);
        assert!(subgraph.edges.len() <= HARD_MAX_EDGES);
    }

    #[tokio::test]
    async fn test_empty_claims_yield_empty_subgraph() {
        let (db, ctx) = scoped_db().await;
        let subgraph = get_evidence_subgraph(
            &db,
            &ctx,
            &[],
            None,
            None,
            IncludeProposed::Auto,
            0.6,
        )
        .await
        .expect("subgraph");
        assert!(subgraph.concepts.is_empty());
        assert!(subgraph.edges.is_empty());
    }
}
