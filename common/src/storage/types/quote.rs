use crate::{
    error::AppError,
    storage::{db::SurrealDbClient, scope::ActiveContext},
    stored_object,
};
use uuid::Uuid;

stored_object!(Quote, "quote", {
    graph_id: String,
    text: String,
    anchor: serde_json::Value,
    user_note: Option<String>,
    tags: Vec<String>,
    source_id: String,
    on_branches: Vec<String>
});

impl Quote {
    /// Capture a user-anchored span; the strongest evidence unit.
    pub fn new(
        ctx: &ActiveContext,
        text: String,
        anchor: serde_json::Value,
        user_note: Option<String>,
        tags: Vec<String>,
        source_id: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            graph_id: ctx.graph_id.clone(),
            text,
            anchor,
            user_note,
            tags,
            source_id,
            on_branches: vec![ctx.branch_id.clone()],
        }
    }

    pub async fn get_scoped(
        db: &SurrealDbClient,
        ctx: &ActiveContext,
        quote_id: &str,
    ) -> Result<Option<Self>, AppError> {
        let quote: Option<Self> = db.get_item(quote_id).await?;
        Ok(quote
            .filter(|q| q.graph_id == ctx.graph_id && q.on_branches.contains(&ctx.branch_id)))
    }

    pub async fn list_for_source(
        db: &SurrealDbClient,
        ctx: &ActiveContext,
        source_id: &str,
    ) -> Result<Vec<Self>, AppError> {
        let mut response = db
            .client
            .query(
                "SELECT * FROM quote \
                 WHERE graph_id = $graph_id AND $branch_id IN on_branches \
                   AND source_id = $source_id ORDER BY created_at ASC, id ASC",
            )
            .bind(("graph_id", ctx.graph_id.clone()))
            .bind(("branch_id", ctx.branch_id.clone()))
            .bind(("source_id", source_id.to_owned()))
            .await?;
        Ok(response.take(0)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::scope::resolve_active_context;
    use serde_json::json;

    #[tokio::test]
    async fn test_quote_capture_and_branch_scope() {
        let db = SurrealDbClient::memory("test_ns", &uuid::Uuid::new_v4().to_string())
            .await
            .expect("Failed to start in-memory surrealdb");
        let ctx = resolve_active_context(&db, "tenant-a", "user-1")
            .await
            .expect("resolve");

        let quote = Quote::new(
            &ctx,
            "the map is not the territory".into(),
            json!({"page": 12, "offset": 40}),
            Some("key idea".into()),
            vec!["semantics".into()],
            "book-1".into(),
        );
        db.store_item(quote.clone()).await.expect("store quote");

        let found = Quote::get_scoped(&db, &ctx, &quote.id).await.expect("get");
        assert!(found.is_some());

        let foreign = ctx.clone().with_overrides(None, Some("experiment"));
        assert!(Quote::get_scoped(&db, &foreign, &quote.id)
            .await
            .expect("get")
            .is_none());

        let listed = Quote::list_for_source(&db, &ctx, "book-1").await.expect("list");
        assert_eq!(listed.len(), 1);
    }
}
