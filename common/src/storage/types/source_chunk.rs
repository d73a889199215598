use crate::{
    error::AppError,
    storage::{db::SurrealDbClient, scope::ActiveContext},
    stored_object,
    utils::ids::short_sha256,
};

stored_object!(SourceChunk, "source_chunk", {
    graph_id: String,
    source_id: String,
    chunk_index: i64,
    text: String,
    metadata: Option<serde_json::Value>,
    ingestion_run_id: Option<String>,
    on_branches: Vec<String>
});

impl SourceChunk {
    /// Deterministic chunk id so re-ingesting a source reuses its chunks.
    pub fn id_for(graph_id: &str, source_id: &str, chunk_index: i64) -> String {
        format!(
            "CH_{}",
            short_sha256(&format!("{graph_id}{source_id}{chunk_index}"), 16)
        )
    }

    pub fn new(
        ctx: &ActiveContext,
        source_id: String,
        chunk_index: i64,
        text: String,
        metadata: Option<serde_json::Value>,
        run_id: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Self::id_for(&ctx.graph_id, &source_id, chunk_index),
            created_at: now,
            updated_at: now,
            graph_id: ctx.graph_id.clone(),
            source_id,
            chunk_index,
            text,
            metadata,
            ingestion_run_id: run_id,
            on_branches: vec![ctx.branch_id.clone()],
        }
    }

    pub async fn upsert(db: &SurrealDbClient, ctx: &ActiveContext, chunk: Self) -> Result<Self, AppError> {
        if let Some(mut existing) = db.get_item::<Self>(&chunk.id).await? {
            if !existing.on_branches.contains(&ctx.branch_id) {
                existing.on_branches.push(ctx.branch_id.clone());
                existing.updated_at = Utc::now();
                let updated: Option<Self> = db
                    .client
                    .query("UPDATE type::thing('source_chunk', $id) CONTENT $content RETURN AFTER")
                    .bind(("id", existing.id.clone()))
                    .bind(("content", existing.clone()))
                    .await?
                    .take(0)?;
                return updated.ok_or_else(|| {
                    AppError::InternalError("chunk update returned nothing".into())
                });
            }
            return Ok(existing);
        }
        db.store_item(chunk.clone()).await?;
        Ok(chunk)
    }

    pub async fn get_many(
        db: &SurrealDbClient,
        ctx: &ActiveContext,
        chunk_ids: &[String],
    ) -> Result<Vec<Self>, AppError> {
        if chunk_ids.is_empty() {
            return Ok(Vec::new());
        }
        let things: Vec<surrealdb::RecordId> = chunk_ids
            .iter()
            .map(|id| surrealdb::RecordId::from_table_key(Self::table_name(), id))
            .collect();
        let mut response = db
            .client
            .query(
                "SELECT * FROM source_chunk \
                 WHERE graph_id = $graph_id AND $branch_id IN on_branches AND id IN $things \
                 ORDER BY source_id ASC, chunk_index ASC",
            )
            .bind(("graph_id", ctx.graph_id.clone()))
            .bind(("branch_id", ctx.branch_id.clone()))
            .bind(("things", things))
            .await?;
        Ok(response.take(0)?)
    }

    pub async fn for_source(
        db: &SurrealDbClient,
        ctx: &ActiveContext,
        source_id: &str,
    ) -> Result<Vec<Self>, AppError> {
        let mut response = db
            .client
            .query(
                "SELECT * FROM source_chunk \
                 WHERE graph_id = $graph_id AND $branch_id IN on_branches AND source_id = $source_id \
                 ORDER BY chunk_index ASC",
            )
            .bind(("graph_id", ctx.graph_id.clone()))
            .bind(("branch_id", ctx.branch_id.clone()))
            .bind(("source_id", source_id.to_owned()))
            .await?;
        Ok(response.take(0)?)
    }

    pub async fn retract_branch_by_run(
        db: &SurrealDbClient,
        ctx: &ActiveContext,
        run_id: &str,
    ) -> Result<usize, AppError> {
        let mut response = db
            .client
            .query(
                "SELECT * FROM source_chunk \
                 WHERE graph_id = $graph_id AND $branch_id IN on_branches \
                   AND ingestion_run_id = $run_id ORDER BY id ASC",
            )
            .bind(("graph_id", ctx.graph_id.clone()))
            .bind(("branch_id", ctx.branch_id.clone()))
            .bind(("run_id", run_id.to_owned()))
            .await?;
        let chunks: Vec<Self> = response.take(0)?;
        let count = chunks.len();
        for chunk in &chunks {
            db.client
                .query(
                    "UPDATE type::thing('source_chunk', $id) \
                     SET on_branches -= $branch_id, updated_at = time::now()",
                )
                .bind(("id", chunk.id.clone()))
                .bind(("branch_id", ctx.branch_id.clone()))
                .await?
                .check()?;
        }
        Ok(count)
    }
}
