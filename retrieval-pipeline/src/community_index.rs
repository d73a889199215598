//! Semantic search over community summaries and concept embeddings.
//!
//! The candidate pools are small enough to score in-process: load every
//! record with a non-null embedding, cosine-score against the query
//! vector, order by score descending with id as the deterministic tie.

use std::cmp::Ordering;

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        scope::ActiveContext,
        types::{community::Community, concept::Concept},
    },
    utils::embedding::cosine_similarity,
};

#[derive(Debug, Clone)]
pub struct ScoredCommunity {
    pub community: Community,
    pub score: f32,
}

#[derive(Debug, Clone)]
pub struct ScoredConcept {
    pub concept: Concept,
    pub score: f32,
}

/// Top-k communities by summary-embedding similarity. A missing query
/// vector yields an empty result rather than an error.
pub async fn semantic_search_communities(
    db: &SurrealDbClient,
    ctx: &ActiveContext,
    query_embedding: Option<&[f32]>,
    k: usize,
) -> Result<Vec<ScoredCommunity>, AppError> {
    let Some(query) = query_embedding else {
        return Ok(Vec::new());
    };
    let pool = Community::list_with_embeddings(db, ctx).await?;

    let mut scored: Vec<ScoredCommunity> = pool
        .into_iter()
        .map(|community| {
            let score = community
                .summary_embedding
                .as_deref()
                .map(|e| cosine_similarity(query, e))
                .unwrap_or(0.0);
            ScoredCommunity { community, score }
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.community.id.cmp(&b.community.id))
    });
    scored.truncate(k);
    Ok(scored)
}

/// Top-`limit` concepts by embedding similarity, same contract.
pub async fn semantic_search_concepts(
    db: &SurrealDbClient,
    ctx: &ActiveContext,
    query_embedding: Option<&[f32]>,
    limit: usize,
) -> Result<Vec<ScoredConcept>, AppError> {
    let Some(query) = query_embedding else {
        return Ok(Vec::new());
    };
    let pool = Concept::list_all(db, ctx).await?;

    let mut scored: Vec<ScoredConcept> = pool
        .into_iter()
        .filter(|concept| concept.embedding.is_some())
        .map(|concept| {
            let score = concept
                .embedding
                .as_deref()
                .map(|e| cosine_similarity(query, e))
                .unwrap_or(0.0);
            ScoredConcept { concept, score }
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.concept.id.cmp(&b.concept.id))
    });
    scored.truncate(limit);
    Ok(scored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::storage::scope::resolve_active_context;
    use common::storage::types::concept::ConceptDraft;

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

    #[tokio::test]
    async fn test_community_search_orders_and_breaks_ties_by_id() {
        let (db, ctx) = scoped_db().await;

        for (id, embedding) in [
            ("comm-far", vec![0.0, 1.0, 0.0]),
            ("comm-b", vec![1.0, 0.0, 0.0]),
            ("comm-a", vec![1.0, 0.0, 0.0]),
        ] {
            let community = Community::new(
                &ctx,
                id.into(),
                format!("name {id}"),
                "summary".into(),
                Some(embedding),
                None,
            );
            Community::upsert(&db, &ctx, community).await.expect("seed");
        }
        // one without embedding never enters the pool
        let no_vec = Community::new(&ctx, "comm-null".into(), "x".into(), "y".into(), None, None);
        Community::upsert(&db, &ctx, no_vec).await.expect("seed");

        let results =
            semantic_search_communities(&db, &ctx, Some(&[1.0, 0.0, 0.0]), 3)
                .await
                .expect("search");
        let ids: Vec<&str> = results.iter().map(|r| r.community.id.as_str()).collect();
        assert_eq!(ids, vec!["comm-a", "comm-b", "comm-far"]);
    }

    #[tokio::test]
    async fn test_missing_query_vector_degrades_to_empty() {
        let (db, ctx) = scoped_db().await;
        let results = semantic_search_communities(&db, &ctx, None, 5)
            .await
            .expect("search");
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_concept_search_skips_vectorless() {
        let (db, ctx) = scoped_db().await;

        Concept::upsert(
            &db,
            &ctx,
            ConceptDraft {
                name: "With Vector".into(),
                description: "x".into(),
                embedding: Some(vec![1.0, 0.0, 0.0]),
                ..ConceptDraft::default()
            },
        )
        .await
        .expect("seed");
        Concept::upsert(
            &db,
            &ctx,
            ConceptDraft {
                name: "Without Vector".into(),
                description: "x".into(),
                ..ConceptDraft::default()
            },
        )
        .await
        .expect("seed");

        let results = semantic_search_concepts(&db, &ctx, Some(&[1.0, 0.0, 0.0]), 10)
            .await
            .expect("search");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].concept.name, "With Vector");
    }
}
