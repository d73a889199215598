use crate::{
    error::AppError,
    storage::{db::SurrealDbClient, scope::ActiveContext},
    stored_object,
};

stored_object!(Community, "community", {
    graph_id: String,
    name: String,
    summary: String,
    summary_embedding: Option<Vec<f32>>,
    build_version: Option<String>,
    member_concept_ids: Vec<String>,
    on_branches: Vec<String>
});

impl Community {
    pub fn new(
        ctx: &ActiveContext,
        community_id: String,
        name: String,
        summary: String,
        summary_embedding: Option<Vec<f32>>,
        build_version: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: community_id,
            created_at: now,
            updated_at: now,
            graph_id: ctx.graph_id.clone(),
            name,
            summary,
            summary_embedding,
            build_version,
            member_concept_ids: Vec::new(),
            on_branches: vec![ctx.branch_id.clone()],
        }
    }

    /// Create or refresh a community by id; summaries and embeddings are
    /// replaced wholesale on rebuild, membership is kept.
    pub async fn upsert(db: &SurrealDbClient, ctx: &ActiveContext, community: Self) -> Result<Self, AppError> {
        if let Some(mut existing) = db.get_item::<Self>(&community.id).await? {
            existing.name = community.name;
            existing.summary = community.summary;
            existing.summary_embedding = community.summary_embedding;
            existing.build_version = community.build_version;
            if !existing.on_branches.contains(&ctx.branch_id) {
                existing.on_branches.push(ctx.branch_id.clone());
            }
            existing.updated_at = Utc::now();
            let updated: Option<Self> = db
                .client
                .query("UPDATE type::thing('community', $id) CONTENT $content RETURN AFTER")
                .bind(("id", existing.id.clone()))
                .bind(("content", existing))
                .await?
                .take(0)?;
            return updated
                .ok_or_else(|| AppError::InternalError("community update returned nothing".into()));
        }
        db.store_item(community.clone()).await?;
        Ok(community)
    }

    /// Replace the member set for this community.
    pub async fn set_memberships(
        db: &SurrealDbClient,
        ctx: &ActiveContext,
        community_id: &str,
        member_concept_ids: Vec<String>,
    ) -> Result<(), AppError> {
        db.client
            .query(
                "UPDATE type::thing('community', $id) \
                 SET member_concept_ids = $members, updated_at = time::now() \
                 WHERE graph_id = $graph_id",
            )
            .bind(("id", community_id.to_owned()))
            .bind(("members", member_concept_ids))
            .bind(("graph_id", ctx.graph_id.clone()))
            .await?
            .check()?;
        Ok(())
    }

    pub async fn get_scoped(
        db: &SurrealDbClient,
        ctx: &ActiveContext,
        community_id: &str,
    ) -> Result<Option<Self>, AppError> {
        let community: Option<Self> = db.get_item(community_id).await?;
        Ok(community
            .filter(|c| c.graph_id == ctx.graph_id && c.on_branches.contains(&ctx.branch_id)))
    }

    /// Every branch-visible community carrying a summary embedding; the
    /// candidate pool for semantic community search.
    pub async fn list_with_embeddings(
        db: &SurrealDbClient,
        ctx: &ActiveContext,
    ) -> Result<Vec<Self>, AppError> {
        let mut response = db
            .client
            .query(
                "SELECT * FROM community \
                 WHERE graph_id = $graph_id AND $branch_id IN on_branches \
                   AND summary_embedding != NONE ORDER BY id ASC",
            )
            .bind(("graph_id", ctx.graph_id.clone()))
            .bind(("branch_id", ctx.branch_id.clone()))
            .await?;
        Ok(response.take(0)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::scope::resolve_active_context;

    #[tokio::test]
    async fn test_upsert_replaces_summary_but_keeps_membership() {
        let db = SurrealDbClient::memory("test_ns", &uuid::Uuid::new_v4().to_string())
            .await
            .expect("Failed to start in-memory surrealdb");
        let ctx = resolve_active_context(&db, "tenant-a", "user-1")
            .await
            .expect("resolve");

        let community = Community::new(
            &ctx,
            "comm-1".into(),
            "Optimization".into(),
            "methods for minimizing loss".into(),
            Some(vec![1.0, 0.0]),
            Some("v1".into()),
        );
        Community::upsert(&db, &ctx, community).await.expect("create");
        Community::set_memberships(&db, &ctx, "comm-1", vec!["c1".into(), "c2".into()])
            .await
            .expect("set members");

        let rebuilt = Community::new(
            &ctx,
            "comm-1".into(),
            "Optimization".into(),
            "rewritten summary".into(),
            Some(vec![0.0, 1.0]),
            Some("v2".into()),
        );
        let updated = Community::upsert(&db, &ctx, rebuilt).await.expect("update");

        assert_eq!(updated.summary, "rewritten summary");
        assert_eq!(updated.build_version.as_deref(), Some("v2"));
        assert_eq!(updated.member_concept_ids, vec!["c1".to_owned(), "c2".to_owned()]);

        let pool = Community::list_with_embeddings(&db, &ctx).await.expect("pool");
        assert_eq!(pool.len(), 1);
    }
}
