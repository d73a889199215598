use crate::{
    error::AppError,
    storage::{db::SurrealDbClient, scope::ActiveContext},
    stored_object,
    utils::ids::{content_hash, short_sha256},
};

/// A run-tagged mention edge from an artifact to a concept.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArtifactMention {
    pub concept_id: String,
    pub run_id: Option<String>,
}

stored_object!(Artifact, "artifact", {
    graph_id: String,
    source_id: String,
    content_hash: String,
    title: Option<String>,
    kind: Option<String>,
    mentions: Vec<ArtifactMention>,
    ingestion_run_id: Option<String>,
    on_branches: Vec<String>
});

impl Artifact {
    /// Identity is `(graph_id, source_id, content_hash)`; identical
    /// normalized text always lands on the same record.
    pub fn id_for(graph_id: &str, source_id: &str, hash: &str) -> String {
        format!("ART_{}", short_sha256(&format!("{graph_id}{source_id}{hash}"), 16))
    }

    pub fn new(
        ctx: &ActiveContext,
        source_id: String,
        text: &str,
        title: Option<String>,
        kind: Option<String>,
        run_id: Option<String>,
    ) -> Self {
        let hash = content_hash(text);
        let now = Utc::now();
        Self {
            id: Self::id_for(&ctx.graph_id, &source_id, &hash),
            created_at: now,
            updated_at: now,
            graph_id: ctx.graph_id.clone(),
            source_id,
            content_hash: hash,
            title,
            kind,
            mentions: Vec::new(),
            ingestion_run_id: run_id,
            on_branches: vec![ctx.branch_id.clone()],
        }
    }

    pub async fn upsert(db: &SurrealDbClient, ctx: &ActiveContext, artifact: Self) -> Result<Self, AppError> {
        if let Some(mut existing) = db.get_item::<Self>(&artifact.id).await? {
            if !existing.on_branches.contains(&ctx.branch_id) {
                existing.on_branches.push(ctx.branch_id.clone());
            }
            if existing.title.is_none() {
                existing.title = artifact.title;
            }
            existing.updated_at = Utc::now();
            let updated: Option<Self> = db
                .client
                .query("UPDATE type::thing('artifact', $id) CONTENT $content RETURN AFTER")
                .bind(("id", existing.id.clone()))
                .bind(("content", existing))
                .await?
                .take(0)?;
            return updated
                .ok_or_else(|| AppError::InternalError("artifact update returned nothing".into()));
        }
        db.store_item(artifact.clone()).await?;
        Ok(artifact)
    }

    /// Idempotently record that this artifact mentions the given concepts.
    pub async fn add_mentions(
        db: &SurrealDbClient,
        ctx: &ActiveContext,
        artifact_id: &str,
        concept_ids: &[String],
        run_id: Option<&str>,
    ) -> Result<(), AppError> {
        let mut artifact: Self = db
            .get_item(artifact_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("artifact {artifact_id}")))?;
        if artifact.graph_id != ctx.graph_id {
            return Err(AppError::NotFound(format!("artifact {artifact_id}")));
        }

        let mut changed = false;
        for concept_id in concept_ids {
            if !artifact.mentions.iter().any(|m| &m.concept_id == concept_id) {
                artifact.mentions.push(ArtifactMention {
                    concept_id: concept_id.clone(),
                    run_id: run_id.map(str::to_owned),
                });
                changed = true;
            }
        }
        if changed {
            artifact.updated_at = Utc::now();
            db.client
                .query("UPDATE type::thing('artifact', $id) CONTENT $content")
                .bind(("id", artifact.id.clone()))
                .bind(("content", artifact))
                .await?
                .check()?;
        }
        Ok(())
    }
    /// Captions (titles, else source ids) of artifacts mentioning each of
    /// the given concepts, capped per concept. Used to decorate concepts in
    /// context bundles.
    pub async fn captions_for_concepts(
        db: &SurrealDbClient,
        ctx: &ActiveContext,
        concept_ids: &[String],
        per_concept: usize,
    ) -> Result<std::collections::BTreeMap<String, Vec<String>>, AppError> {
        let mut captions: std::collections::BTreeMap<String, Vec<String>> =
            std::collections::BTreeMap::new();
        if concept_ids.is_empty() {
            return Ok(captions);
        }
        let mut response = db
            .client
            .query(
                "SELECT * FROM artifact \
                 WHERE graph_id = $graph_id AND $branch_id IN on_branches \
                 ORDER BY id ASC",
            )
            .bind(("graph_id", ctx.graph_id.clone()))
            .bind(("branch_id", ctx.branch_id.clone()))
            .await?;
        let artifacts: Vec<Self> = response.take(0)?;

        for artifact in &artifacts {
            let caption = artifact
                .title
                .clone()
                .unwrap_or_else(|| artifact.source_id.clone());
            for mention in &artifact.mentions {
                if !concept_ids.contains(&mention.concept_id) {
                    continue;
                }
                let entry = captions.entry(mention.concept_id.clone()).or_default();
                if entry.len() < per_concept && !entry.contains(&caption) {
                    entry.push(caption.clone());
                }
            }
        }
        Ok(captions)
    }
}
