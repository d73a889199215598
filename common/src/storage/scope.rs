use tracing::warn;

use crate::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::graph_space::{branch::Branch, GraphSpace},
    },
    utils::ids::graph_id_for,
};

pub const MAIN_BRANCH: &str = "main";

/// The `(graph_id, branch_id)` every read and write is implicitly scoped by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveContext {
    pub tenant_id: String,
    pub user_id: String,
    pub graph_id: String,
    pub branch_id: String,
}

/// Resolve the caller's active context, lazily creating the workspace root
/// and its `main` branch on first use. A missing tenant is fatal here; the
/// HTTP boundary turns it into a 403.
pub async fn resolve_active_context(
    db: &SurrealDbClient,
    tenant_id: &str,
    user_id: &str,
) -> Result<ActiveContext, AppError> {
    if tenant_id.trim().is_empty() {
        return Err(AppError::Auth("missing tenant context".into()));
    }
    if user_id.trim().is_empty() {
        return Err(AppError::Auth("missing user context".into()));
    }

    let graph_id = graph_id_for(tenant_id, user_id);

    if db.get_item::<GraphSpace>(&graph_id).await?.is_none() {
        let space = GraphSpace::new(
            graph_id.clone(),
            tenant_id.to_owned(),
            format!("workspace:{user_id}"),
        );
        // A concurrent resolver may have won the race; the existing record
        // is equivalent, so the violation is ignored.
        if let Err(err) = db.store_item(space).await {
            if !SurrealDbClient::is_unique_index_violation(&err) {
                return Err(AppError::Database(err));
            }
        }
    }

    if !Branch::exists(&graph_id, MAIN_BRANCH, db).await? {
        let main = Branch::new(graph_id.clone(), MAIN_BRANCH.to_owned(), None);
        if let Err(err) = db.store_item(main).await {
            if !SurrealDbClient::is_unique_index_violation(&err) {
                return Err(AppError::Database(err));
            }
        }
    }

    Ok(ActiveContext {
        tenant_id: tenant_id.to_owned(),
        user_id: user_id.to_owned(),
        graph_id,
        branch_id: MAIN_BRANCH.to_owned(),
    })
}

impl ActiveContext {
    /// Apply request-supplied overrides. An explicit value that disagrees
    /// with the resolved context wins, with a warning.
    pub fn with_overrides(
        mut self,
        explicit_graph_id: Option<&str>,
        explicit_branch_id: Option<&str>,
    ) -> Self {
        if let Some(graph_id) = explicit_graph_id {
            if !graph_id.is_empty() && graph_id != self.graph_id {
                warn!(
                    resolved = %self.graph_id,
                    explicit = %graph_id,
                    "explicit graph_id overrides resolved context"
                );
                self.graph_id = graph_id.to_owned();
            }
        }
        if let Some(branch_id) = explicit_branch_id {
            if !branch_id.is_empty() && branch_id != self.branch_id {
                warn!(
                    resolved = %self.branch_id,
                    explicit = %branch_id,
                    "explicit branch_id overrides resolved context"
                );
                self.branch_id = branch_id.to_owned();
            }
        }
        self
    }
}

/// Fork a branch: new branch record plus membership copy. Every scoped
/// entity on the parent branch gains the new branch id in `on_branches`,
/// bounded by `max_nodes` per table to keep forks cheap on large graphs.
pub async fn fork_branch(
    db: &SurrealDbClient,
    ctx: &ActiveContext,
    new_branch_id: &str,
    max_nodes: usize,
) -> Result<(), AppError> {
    if new_branch_id.trim().is_empty() {
        return Err(AppError::Validation("branch id must not be empty".into()));
    }
    if Branch::exists(&ctx.graph_id, new_branch_id, db).await? {
        return Err(AppError::Conflict {
            existing_id: Branch::record_key(&ctx.graph_id, new_branch_id),
        });
    }

    let branch = Branch::new(
        ctx.graph_id.clone(),
        new_branch_id.to_owned(),
        Some(ctx.branch_id.clone()),
    );
    db.store_item(branch).await?;

    for table in ["concept", "claim", "source_chunk", "community", "quote"] {
        db.client
            .query(format!(
                "UPDATE (SELECT VALUE id FROM {table} \
                 WHERE graph_id = $graph_id AND $parent IN on_branches LIMIT $max) \
                 SET on_branches += $child"
            ))
            .bind(("graph_id", ctx.graph_id.clone()))
            .bind(("parent", ctx.branch_id.clone()))
            .bind(("child", new_branch_id.to_owned()))
            .bind(("max", max_nodes))
            .await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    async fn test_db() -> SurrealDbClient {
        SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("Failed to start in-memory surrealdb")
    }

    #[tokio::test]
    async fn test_missing_tenant_is_fatal() {
        let db = test_db().await;
        let err = resolve_active_context(&db, "", "user-1")
            .await
            .expect_err("blank tenant must fail");
        assert!(matches!(err, AppError::Auth(_)));
    }

    #[tokio::test]
    async fn test_resolution_is_lazy_and_stable() {
        let db = test_db().await;

        let first = resolve_active_context(&db, "tenant-a", "user-1")
            .await
            .expect("resolve");
        let second = resolve_active_context(&db, "tenant-a", "user-1")
            .await
            .expect("resolve again");

        assert_eq!(first, second);
        assert_eq!(first.branch_id, MAIN_BRANCH);

        let space: Option<GraphSpace> = db.get_item(&first.graph_id).await.expect("fetch space");
        assert_eq!(space.expect("space created").tenant_id, "tenant-a");
        assert!(Branch::exists(&first.graph_id, MAIN_BRANCH, &db)
            .await
            .expect("branch lookup"));
    }

    #[tokio::test]
    async fn test_explicit_branch_wins() {
        let db = test_db().await;
        let ctx = resolve_active_context(&db, "tenant-a", "user-1")
            .await
            .expect("resolve");

        let overridden = ctx.clone().with_overrides(None, Some("experiment"));
        assert_eq!(overridden.branch_id, "experiment");
        assert_eq!(overridden.graph_id, ctx.graph_id);

        let untouched = ctx.clone().with_overrides(None, None);
        assert_eq!(untouched, ctx);
    }

    #[tokio::test]
    async fn test_fork_rejects_duplicates() {
        let db = test_db().await;
        let ctx = resolve_active_context(&db, "tenant-a", "user-1")
            .await
            .expect("resolve");

        fork_branch(&db, &ctx, "experiment", 1000)
            .await
            .expect("first fork");
        let err = fork_branch(&db, &ctx, "experiment", 1000)
            .await
            .expect_err("second fork of same name must fail");
        assert!(matches!(err, AppError::Conflict { .. }));
    }
}
