//! Whole-graph overview: the best-connected concepts plus every isolated
//! one. Isolated nodes always appear; losing them on sparse graphs is a
//! regression, not an optimization.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        scope::ActiveContext,
        types::{
            concept::Concept,
            relationship::{ConceptRelationship, IncludeProposed},
        },
    },
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverviewNode {
    pub concept: Concept,
    pub degree: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphOverview {
    pub connected: Vec<OverviewNode>,
    pub isolated: Vec<Concept>,
    pub edges: Vec<ConceptRelationship>,
}

/// Two disjoint sets under the active branch: top-degree connected
/// concepts (degree desc, node id asc) and all isolated concepts.
pub async fn get_graph_overview(
    db: &SurrealDbClient,
    ctx: &ActiveContext,
    limit_nodes: usize,
    limit_edges: usize,
    include_proposed: IncludeProposed,
    threshold: f32,
) -> Result<GraphOverview, AppError> {
    let concepts = Concept::list_all(db, ctx).await?;
    let edges =
        ConceptRelationship::list_for_branch(db, ctx, include_proposed, threshold).await?;

    let mut degree: HashMap<&str, usize> = HashMap::new();
    for edge in &edges {
        *degree.entry(edge.in_.as_str()).or_insert(0) += 1;
        *degree.entry(edge.out.as_str()).or_insert(0) += 1;
    }

    let mut connected: Vec<OverviewNode> = Vec::new();
    let mut isolated: Vec<Concept> = Vec::new();
    for concept in concepts {
        match degree.get(concept.id.as_str()).copied().unwrap_or(0) {
            0 => isolated.push(concept),
            d => connected.push(OverviewNode { concept, degree: d }),
        }
    }

    connected.sort_by(|a, b| {
        b.degree
            .cmp(&a.degree)
            .then_with(|| a.concept.id.cmp(&b.concept.id))
    });
    connected.truncate(limit_nodes);
    isolated.sort_by(|a, b| a.id.cmp(&b.id));

    let mut capped_edges = edges;
    capped_edges.truncate(limit_edges);

    Ok(GraphOverview {
        connected,
        isolated,
        edges: capped_edges,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::scope::resolve_active_context;
    use crate::storage::types::concept::ConceptDraft;
    use crate::storage::types::relationship::{RelationshipDraft, RelationshipStatus};

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

    async fn seed(db: &SurrealDbClient, ctx: &ActiveContext, name: &str) -> String {
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

    #[tokio::test]
    async fn test_isolated_nodes_always_appear() {
        let (db, ctx) = scoped_db().await;
        let hub = seed(&db, &ctx, "Hub").await;
        let spoke = seed(&db, &ctx, "Spoke").await;
        let loner = seed(&db, &ctx, "Loner").await;

        ConceptRelationship::upsert(
            &db,
            &ctx,
            &hub,
            &spoke,
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

        let overview = get_graph_overview(&db, &ctx, 10, 10, IncludeProposed::Auto, 0.6)
            .await
            .expect("overview");

        assert_eq!(overview.connected.len(), 2);
        assert_eq!(overview.isolated.len(), 1);
        assert_eq!(overview.isolated[0].id, loner);

        // tiny node budget still keeps the isolated set intact
        let tight = get_graph_overview(&db, &ctx, 1, 10, IncludeProposed::Auto, 0.6)
            .await
            .expect("overview");
        assert_eq!(tight.connected.len(), 1);
        assert_eq!(tight.isolated.len(), 1, "isolated nodes are never dropped");
    }

    #[tokio::test]
    async fn test_connected_ordering_is_deterministic() {
        let (db, ctx) = scoped_db().await;
        let a = seed(&db, &ctx, "A").await;
        let b = seed(&db, &ctx, "B").await;
        let c = seed(&db, &ctx, "C").await;

        for dst in [&b, &c] {
            ConceptRelationship::upsert(
                &db,
                &ctx,
                &a,
                dst,
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

        let first = get_graph_overview(&db, &ctx, 10, 10, IncludeProposed::Auto, 0.6)
            .await
            .expect("overview");
        let second = get_graph_overview(&db, &ctx, 10, 10, IncludeProposed::Auto, 0.6)
            .await
            .expect("overview");

        let order = |o: &GraphOverview| {
            o.connected
                .iter()
                .map(|n| (n.concept.id.clone(), n.degree))
                .collect::<Vec<_>>()
        };
        assert_eq!(order(&first), order(&second));
        assert_eq!(first.connected[0].concept.id, a, "highest degree first");
    }
}
