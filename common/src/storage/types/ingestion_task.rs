#![allow(clippy::module_name_repetitions)]
use surrealdb::opt::PatchOp;
use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

/// Payload of a queued background ingestion. This is the only `Task` in
/// the core; scheduler-style tasks are a different concern and do not
/// exist here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IngestionRequest {
    pub tenant_id: String,
    pub user_id: String,
    pub source_id: String,
    pub source_label: String,
    pub domain: Option<String>,
    pub text: String,
    pub branch_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum IngestionTaskStatus {
    Created,
    InProgress {
        attempts: u32,
        last_attempt: DateTime<Utc>,
    },
    Completed,
    Error(String),
    Cancelled,
}

stored_object!(IngestionTask, "ingestion_task", {
    content: IngestionRequest,
    status: IngestionTaskStatus,
    user_id: String
});

pub const MAX_ATTEMPTS: u32 = 3;

impl IngestionTask {
    pub fn new(content: IngestionRequest) -> Self {
        let now = Utc::now();
        let user_id = content.user_id.clone();
        Self {
            id: Uuid::new_v4().to_string(),
            content,
            status: IngestionTaskStatus::Created,
            created_at: now,
            updated_at: now,
            user_id,
        }
    }

    /// Enqueue with backpressure: a full queue fails fast instead of
    /// accepting unbounded work.
    pub async fn enqueue(
        content: IngestionRequest,
        capacity: usize,
        db: &SurrealDbClient,
    ) -> Result<Self, AppError> {
        let pending = Self::pending_count(db).await?;
        if pending >= capacity {
            return Err(AppError::QueueFull(pending));
        }
        let task = Self::new(content);
        db.store_item(task.clone()).await?;
        Ok(task)
    }

    pub async fn pending_count(db: &SurrealDbClient) -> Result<usize, AppError> {
        #[derive(Deserialize)]
        struct Row {
            total: usize,
        }
        let mut response = db
            .client
            .query(
                "SELECT count() AS total FROM ingestion_task \
                 WHERE status = 'Created' OR status.InProgress != NONE \
                 GROUP ALL",
            )
            .await?;
        let row: Option<Row> = response.take(0)?;
        Ok(row.map(|r| r.total).unwrap_or(0))
    }

    pub async fn update_status(
        id: &str,
        status: IngestionTaskStatus,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        let _task: Option<Self> = db
            .update((Self::table_name(), id))
            .patch(PatchOp::replace("/status", status))
            .patch(PatchOp::replace(
                "/updated_at",
                surrealdb::sql::Datetime::default(),
            ))
            .await?;

        Ok(())
    }

    /// Claim the oldest ready task, moving it to `InProgress`. Serial
    /// workers only; the claim is a read-then-write, not a lease.
    pub async fn claim_next_ready(db: &SurrealDbClient) -> Result<Option<Self>, AppError> {
        let mut response = db
            .client
            .query(
                "SELECT * FROM ingestion_task \
                 WHERE status = 'Created' \
                    OR (status.InProgress != NONE AND status.InProgress.attempts < $max_attempts) \
                 ORDER BY created_at ASC LIMIT 1",
            )
            .bind(("max_attempts", MAX_ATTEMPTS))
            .await?;
        let task: Option<Self> = response.take(0)?;

        let Some(task) = task else {
            return Ok(None);
        };

        let attempts = match &task.status {
            IngestionTaskStatus::InProgress { attempts, .. } => attempts + 1,
            _ => 1,
        };
        Self::update_status(
            &task.id,
            IngestionTaskStatus::InProgress {
                attempts,
                last_attempt: Utc::now(),
            },
            db,
        )
        .await?;

        let mut claimed = task;
        claimed.status = IngestionTaskStatus::InProgress {
            attempts,
            last_attempt: Utc::now(),
        };
        Ok(Some(claimed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(label: &str) -> IngestionRequest {
        IngestionRequest {
            tenant_id: "tenant-a".into(),
            user_id: "user-1".into(),
            source_id: format!("src-{label}"),
            source_label: label.to_owned(),
            domain: None,
            text: "lecture text".into(),
            branch_id: None,
        }
    }

    async fn test_db() -> SurrealDbClient {
        SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("Failed to start in-memory surrealdb")
    }

    #[tokio::test]
    async fn test_enqueue_claims_in_fifo_order() {
        let db = test_db().await;

        IngestionTask::enqueue(request("first"), 10, &db)
            .await
            .expect("enqueue first");
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        IngestionTask::enqueue(request("second"), 10, &db)
            .await
            .expect("enqueue second");

        let claimed = IngestionTask::claim_next_ready(&db)
            .await
            .expect("claim")
            .expect("task available");
        assert_eq!(claimed.content.source_label, "first");
        assert!(matches!(
            claimed.status,
            IngestionTaskStatus::InProgress { attempts: 1, .. }
        ));
    }

    #[tokio::test]
    async fn test_full_queue_fails_fast() {
        let db = test_db().await;

        IngestionTask::enqueue(request("a"), 1, &db)
            .await
            .expect("first fits");
        let err = IngestionTask::enqueue(request("b"), 1, &db)
            .await
            .expect_err("queue is full");
        assert!(matches!(err, AppError::QueueFull(1)));
    }

    #[tokio::test]
    async fn test_completed_tasks_are_not_reclaimed() {
        let db = test_db().await;

        let task = IngestionTask::enqueue(request("only"), 10, &db)
            .await
            .expect("enqueue");
        IngestionTask::update_status(&task.id, IngestionTaskStatus::Completed, &db)
            .await
            .expect("complete");

        let next = IngestionTask::claim_next_ready(&db).await.expect("claim");
        assert!(next.is_none());
    }
}
