#![allow(clippy::missing_docs_in_private_items, clippy::result_large_err)]

//! Ingestion: source text → chunks → LLM extraction → graph upserts,
//! under a run id that makes every write attributable and undoable.

pub mod chunking;
pub mod claims;
pub mod extraction;
pub mod pipeline;
pub mod segments;

use std::sync::Arc;

use common::storage::{db::SurrealDbClient, types::ingestion_task::IngestionTask};
pub use pipeline::{undo_run, IngestionOutcome, IngestionPipeline};
use tokio::time::{sleep, Duration};
use tracing::{error, info};
use uuid::Uuid;

/// Background worker: claim the next ready task, process it, repeat.
/// One worker per process keeps the graph session serial.
pub async fn run_worker_loop(
    db: Arc<SurrealDbClient>,
    ingestion_pipeline: Arc<IngestionPipeline>,
) -> Result<(), Box<dyn std::error::Error>> {
    let worker_id = format!("ingestion-worker-{}", Uuid::new_v4());
    let idle_backoff = Duration::from_millis(500);

    loop {
        match IngestionTask::claim_next_ready(&db).await {
            Ok(Some(task)) => {
                let task_id = task.id.clone();
                info!(%worker_id, %task_id, "claimed ingestion task");
                if let Err(err) = ingestion_pipeline.process_task(task).await {
                    error!(%worker_id, %task_id, error = %err, "ingestion task failed");
                }
            }
            Ok(None) => {
                sleep(idle_backoff).await;
            }
            Err(err) => {
                error!(%worker_id, error = %err, "failed to claim ingestion task");
                sleep(Duration::from_secs(1)).await;
            }
        }
    }
}
