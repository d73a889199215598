use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

stored_object!(GraphSpace, "graph_space", {
    tenant_id: String,
    name: String,
    refresh_defaults: Option<serde_json::Value>
});

impl GraphSpace {
    pub fn new(graph_id: String, tenant_id: String, name: String) -> Self {
        let now = Utc::now();
        Self {
            id: graph_id,
            created_at: now,
            updated_at: now,
            tenant_id,
            name,
            refresh_defaults: None,
        }
    }

    /// Fetch the workspace root, asserting tenant ownership. A graph that
    /// exists under another tenant is reported as absent, not as forbidden,
    /// so ids never leak across tenants.
    pub async fn get_for_tenant(
        graph_id: &str,
        tenant_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Option<Self>, AppError> {
        let space: Option<Self> = db.get_item(graph_id).await?;
        Ok(space.filter(|s| s.tenant_id == tenant_id))
    }
}

/// A named branch within a graph. `main` always exists.
pub mod branch {
    use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

    stored_object!(Branch, "branch", {
        graph_id: String,
        branch_id: String,
        forked_from: Option<String>
    });

    impl Branch {
        pub fn record_key(graph_id: &str, branch_id: &str) -> String {
            format!("{graph_id}:{branch_id}")
        }

        pub fn new(graph_id: String, branch_id: String, forked_from: Option<String>) -> Self {
            let now = Utc::now();
            Self {
                id: Self::record_key(&graph_id, &branch_id),
                created_at: now,
                updated_at: now,
                graph_id,
                branch_id,
                forked_from,
            }
        }

        pub async fn exists(
            graph_id: &str,
            branch_id: &str,
            db: &SurrealDbClient,
        ) -> Result<bool, AppError> {
            let found: Option<Self> = db.get_item(&Self::record_key(graph_id, branch_id)).await?;
            Ok(found.is_some())
        }

        pub async fn list_for_graph(
            graph_id: &str,
            db: &SurrealDbClient,
        ) -> Result<Vec<Self>, AppError> {
            let mut response = db
                .client
                .query("SELECT * FROM branch WHERE graph_id = $graph_id ORDER BY branch_id")
                .bind(("graph_id", graph_id.to_owned()))
                .await?;
            Ok(response.take(0)?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::branch::Branch;
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_graph_space_tenant_filter() {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("Failed to start in-memory surrealdb");

        let space = GraphSpace::new("g1".into(), "tenant-a".into(), "workspace".into());
        db.store_item(space).await.expect("store space");

        let owned = GraphSpace::get_for_tenant("g1", "tenant-a", &db)
            .await
            .expect("query");
        assert!(owned.is_some());

        let foreign = GraphSpace::get_for_tenant("g1", "tenant-b", &db)
            .await
            .expect("query");
        assert!(foreign.is_none(), "other tenants must not see the graph");
    }

    #[tokio::test]
    async fn test_branch_listing_is_ordered() {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("Failed to start in-memory surrealdb");

        for name in ["main", "experiment", "archive"] {
            db.store_item(Branch::new("g1".into(), name.into(), None))
                .await
                .expect("store branch");
        }
        db.store_item(Branch::new("g2".into(), "main".into(), None))
            .await
            .expect("store foreign branch");

        let branches = Branch::list_for_graph("g1", &db).await.expect("list");
        let names: Vec<_> = branches.iter().map(|b| b.branch_id.as_str()).collect();
        assert_eq!(names, vec!["archive", "experiment", "main"]);
    }
}
