//! Shortest paths between concepts within branch scope.
//!
//! Frontier-at-a-time BFS: each hop is one batched edge query, neighbors
//! are validated against the concept table so merged or archived nodes
//! never appear on a path.

use std::collections::{HashMap, HashSet};

use common::{
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

pub const DEFAULT_MAX_HOPS: usize = 4;

/// One directed edge on a found path, as stored.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PathEdge {
    pub source_id: String,
    pub target_id: String,
    pub predicate: String,
}

/// Unique directed edges of one shortest path from `src` to `dst`
/// (undirected traversal, directed reporting). `[]` when the endpoints
/// coincide or no path exists within `max_hops`.
pub async fn shortest_path_edges(
    db: &SurrealDbClient,
    ctx: &ActiveContext,
    src: &str,
    dst: &str,
    max_hops: usize,
    policy: IncludeProposed,
    threshold: f32,
) -> Result<Vec<PathEdge>, AppError> {
    if src == dst {
        return Ok(Vec::new());
    }

    // parent: node -> (previous node, edge used to arrive)
    let mut parent: HashMap<String, (String, PathEdge)> = HashMap::new();
    let mut visited: HashSet<String> = HashSet::from([src.to_owned()]);
    let mut frontier: Vec<String> = vec![src.to_owned()];

    for _hop in 0..max_hops {
        if frontier.is_empty() {
            break;
        }
        let edges =
            ConceptRelationship::edges_touching(db, ctx, &frontier, policy, threshold).await?;

        // Candidate neighbors, deduped, then validated so merged/archived
        // concepts drop out of the walk.
        let mut candidates: Vec<String> = Vec::new();
        for edge in &edges {
            for node in [&edge.in_, &edge.out] {
                if !visited.contains(node) && !candidates.contains(node) {
                    candidates.push(node.clone());
                }
            }
        }
        let valid: HashSet<String> = Concept::get_many(db, ctx, &candidates)
            .await?
            .into_iter()
            .map(|c| c.id)
            .collect();

        let mut next_frontier: Vec<String> = Vec::new();
        // Edges are already id-ordered, which makes the chosen path stable.
        for edge in &edges {
            let path_edge = PathEdge {
                source_id: edge.in_.clone(),
                target_id: edge.out.clone(),
                predicate: edge.metadata.predicate.clone(),
            };
            let hops = [(&edge.in_, &edge.out), (&edge.out, &edge.in_)];
            for (from, to) in hops {
                if !visited.contains(from.as_str()) || visited.contains(to.as_str()) {
                    continue;
                }
                if !frontier.contains(from) {
                    continue;
                }
                if to != dst && !valid.contains(to.as_str()) {
                    continue;
                }
                visited.insert(to.clone());
                parent.insert(to.clone(), (from.clone(), path_edge.clone()));
                next_frontier.push(to.clone());

                if to == dst {
                    return Ok(reconstruct(&parent, src, dst));
                }
            }
        }
        frontier = next_frontier;
    }

    Ok(Vec::new())
}

fn reconstruct(
    parent: &HashMap<String, (String, PathEdge)>,
    src: &str,
    dst: &str,
) -> Vec<PathEdge> {
    let mut edges: Vec<PathEdge> = Vec::new();
    let mut cursor = dst.to_owned();
    while cursor != src {
        let Some((prev, edge)) = parent.get(&cursor) else {
            return Vec::new();
        };
        if !edges.contains(edge) {
            edges.push(edge.clone());
        }
        cursor = prev.clone();
    }
    edges.reverse();
    edges
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::storage::scope::resolve_active_context;
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

    async fn link(db: &SurrealDbClient, ctx: &ActiveContext, a: &str, b: &str) {
        ConceptRelationship::upsert(
            db,
            ctx,
            a,
            b,
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
        .expect("link");
    }

    #[tokio::test]
    async fn test_two_hop_path() {
        let (db, ctx) = scoped_db().await;
        let a = seed_concept(&db, &ctx, "A").await;
        let b = seed_concept(&db, &ctx, "B").await;
        let c = seed_concept(&db, &ctx, "C").await;
        link(&db, &ctx, &a, &b).await;
        link(&db, &ctx, &b, &c).await;

        let path = shortest_path_edges(
            &db,
            &ctx,
            &a,
            &c,
            DEFAULT_MAX_HOPS,
            IncludeProposed::Auto,
            0.6,
        )
        .await
        .expect("path");

        assert_eq!(path.len(), 2);
        assert_eq!(path[0].source_id, a);
        assert_eq!(path[0].target_id, b);
        assert_eq!(path[1].target_id, c);
    }

    #[tokio::test]
    async fn test_hop_budget_and_same_endpoints() {
        let (db, ctx) = scoped_db().await;
        let mut ids = Vec::new();
        for name in ["N0", "N1", "N2", "N3", "N4", "N5"] {
            ids.push(seed_concept(&db, &ctx, name).await);
        }
        for pair in ids.windows(2) {
            link(&db, &ctx, &pair[0], &pair[1]).await;
        }

        // 5 hops needed, budget 4
        let too_far = shortest_path_edges(
            &db,
            &ctx,
            &ids[0],
            &ids[5],
            DEFAULT_MAX_HOPS,
            IncludeProposed::Auto,
            0.6,
        )
        .await
        .expect("path");
        assert!(too_far.is_empty());

        let within = shortest_path_edges(
            &db,
            &ctx,
            &ids[0],
            &ids[4],
            DEFAULT_MAX_HOPS,
            IncludeProposed::Auto,
            0.6,
        )
        .await
        .expect("path");
        assert_eq!(within.len(), 4);

        let same = shortest_path_edges(
            &db,
            &ctx,
            &ids[0],
            &ids[0],
            DEFAULT_MAX_HOPS,
            IncludeProposed::Auto,
            0.6,
        )
        .await
        .expect("path");
        assert!(same.is_empty());
    }

    #[tokio::test]
    async fn test_merged_nodes_break_paths() {
        let (db, ctx) = scoped_db().await;
        let a = seed_concept(&db, &ctx, "A").await;
        let hub = seed_concept(&db, &ctx, "Hub").await;
        let c = seed_concept(&db, &ctx, "C").await;
        link(&db, &ctx, &a, &hub).await;
        link(&db, &ctx, &hub, &c).await;

        Concept::mark_merged(&db, &ctx, &hub).await.expect("merge");

        let path = shortest_path_edges(
            &db,
            &ctx,
            &a,
            &c,
            DEFAULT_MAX_HOPS,
            IncludeProposed::Auto,
            0.6,
        )
        .await
        .expect("path");
        assert!(path.is_empty(), "paths must not route through merged nodes");
    }

    #[tokio::test]
    async fn test_invisible_edges_are_skipped() {
        let (db, ctx) = scoped_db().await;
        let a = seed_concept(&db, &ctx, "A").await;
        let b = seed_concept(&db, &ctx, "B").await;

        ConceptRelationship::upsert(
            &db,
            &ctx,
            &a,
            &b,
            RelationshipDraft {
                predicate: "CAUSES".into(),
                confidence: 0.3,
                method: "llm".into(),
                source_id: None,
                chunk_id: None,
                claim_id: None,
                rationale: None,
                ingestion_run_id: None,
            },
            RelationshipStatus::Proposed,
        )
        .await
        .expect("low-confidence edge");

        let hidden = shortest_path_edges(&db, &ctx, &a, &b, 4, IncludeProposed::Auto, 0.6)
            .await
            .expect("path");
        assert!(hidden.is_empty());

        let shown = shortest_path_edges(&db, &ctx, &a, &b, 4, IncludeProposed::All, 0.6)
            .await
            .expect("path");
        assert_eq!(shown.len(), 1);
    }
}
