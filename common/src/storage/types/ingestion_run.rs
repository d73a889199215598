use crate::{
    error::AppError,
    storage::{db::SurrealDbClient, scope::ActiveContext},
    stored_object,
};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Running,
    Completed,
    Partial,
    Failed,
}

stored_object!(IngestionRun, "ingestion_run", {
    graph_id: String,
    source_type: String,
    source_label: String,
    status: RunStatus,
    #[serde(serialize_with = "serialize_option_datetime", deserialize_with = "deserialize_option_datetime", default)]
    completed_at: Option<DateTime<Utc>>,
    summary_counts: serde_json::Value,
    errors: Vec<String>,
    #[serde(serialize_with = "serialize_option_datetime", deserialize_with = "deserialize_option_datetime", default)]
    undone_at: Option<DateTime<Utc>>
});

impl IngestionRun {
    pub async fn start(
        db: &SurrealDbClient,
        ctx: &ActiveContext,
        source_type: &str,
        source_label: &str,
    ) -> Result<Self, AppError> {
        let now = Utc::now();
        let run = Self {
            id: format!("RUN_{}", Uuid::new_v4()),
            created_at: now,
            updated_at: now,
            graph_id: ctx.graph_id.clone(),
            source_type: source_type.to_owned(),
            source_label: source_label.to_owned(),
            status: RunStatus::Running,
            completed_at: None,
            summary_counts: serde_json::json!({}),
            errors: Vec::new(),
            undone_at: None,
        };
        db.store_item(run.clone()).await?;
        Ok(run)
    }

    /// Close the run. Status falls out of the error mix: clean end is
    /// `Completed`, nothing-created-with-errors is `Failed`, otherwise
    /// `Partial`.
    pub async fn finish(
        db: &SurrealDbClient,
        run_id: &str,
        created_anything: bool,
        errors: Vec<String>,
        summary_counts: serde_json::Value,
    ) -> Result<RunStatus, AppError> {
        let status = if errors.is_empty() {
            RunStatus::Completed
        } else if created_anything {
            RunStatus::Partial
        } else {
            RunStatus::Failed
        };
        Self::close(db, run_id, status, errors, summary_counts).await?;
        Ok(status)
    }

    pub async fn mark_failed(
        db: &SurrealDbClient,
        run_id: &str,
        errors: Vec<String>,
    ) -> Result<(), AppError> {
        Self::close(db, run_id, RunStatus::Failed, errors, serde_json::json!({})).await
    }

    async fn close(
        db: &SurrealDbClient,
        run_id: &str,
        status: RunStatus,
        errors: Vec<String>,
        summary_counts: serde_json::Value,
    ) -> Result<(), AppError> {
        db.client
            .query(
                "UPDATE type::thing('ingestion_run', $id) SET \
                 status = $status, \
                 errors = $errors, \
                 summary_counts = $summary_counts, \
                 completed_at = time::now(), \
                 updated_at = time::now()",
            )
            .bind(("id", run_id.to_owned()))
            .bind(("status", status))
            .bind(("errors", errors))
            .bind(("summary_counts", summary_counts))
            .await?
            .check()?;
        Ok(())
    }

    pub async fn get_scoped(
        db: &SurrealDbClient,
        ctx: &ActiveContext,
        run_id: &str,
    ) -> Result<Option<Self>, AppError> {
        let run: Option<Self> = db.get_item(run_id).await?;
        Ok(run.filter(|r| r.graph_id == ctx.graph_id))
    }

    pub async fn mark_undone(db: &SurrealDbClient, run_id: &str) -> Result<(), AppError> {
        db.client
            .query(
                "UPDATE type::thing('ingestion_run', $id) \
                 SET undone_at = time::now(), updated_at = time::now()",
            )
            .bind(("id", run_id.to_owned()))
            .await?
            .check()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::scope::resolve_active_context;

    #[tokio::test]
    async fn test_run_status_from_error_mix() {
        let db = SurrealDbClient::memory("test_ns", &uuid::Uuid::new_v4().to_string())
            .await
            .expect("Failed to start in-memory surrealdb");
        let ctx = resolve_active_context(&db, "tenant-a", "user-1")
            .await
            .expect("resolve");

        let run = IngestionRun::start(&db, &ctx, "lecture", "Lecture 1")
            .await
            .expect("start");
        let status = IngestionRun::finish(&db, &run.id, true, Vec::new(), serde_json::json!({"nodes": 2}))
            .await
            .expect("finish");
        assert_eq!(status, RunStatus::Completed);

        let run2 = IngestionRun::start(&db, &ctx, "lecture", "Lecture 2")
            .await
            .expect("start");
        let status2 = IngestionRun::finish(
            &db,
            &run2.id,
            true,
            vec!["chunk 3 failed".into()],
            serde_json::json!({}),
        )
        .await
        .expect("finish");
        assert_eq!(status2, RunStatus::Partial);

        let run3 = IngestionRun::start(&db, &ctx, "lecture", "Lecture 3")
            .await
            .expect("start");
        let status3 = IngestionRun::finish(
            &db,
            &run3.id,
            false,
            vec!["everything failed".into()],
            serde_json::json!({}),
        )
        .await
        .expect("finish");
        assert_eq!(status3, RunStatus::Failed);

        let stored = IngestionRun::get_scoped(&db, &ctx, &run2.id)
            .await
            .expect("get")
            .expect("exists");
        assert_eq!(stored.status, RunStatus::Partial);
        assert!(stored.completed_at.is_some());
        assert_eq!(stored.errors.len(), 1);
    }
}
