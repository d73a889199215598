//! The ingestion orchestrator: chunk → extract → upsert concepts →
//! relationships → parallel claim extraction → serial writes → optional
//! segmentation → run bookkeeping. Per-item failures accumulate on the
//! run; only cancellation and a dead store abort the whole run.

use std::{collections::BTreeMap, sync::Arc, time::Instant};

use common::{
    error::AppError,
    llm::ModelRouter,
    storage::{
        db::SurrealDbClient,
        scope::{resolve_active_context, ActiveContext},
        types::{
            artifact::Artifact,
            claim::{Claim, ClaimDraft},
            concept::{Concept, ConceptDraft},
            ingestion_run::{IngestionRun, RunStatus},
            ingestion_task::{IngestionRequest, IngestionTask, IngestionTaskStatus, MAX_ATTEMPTS},
            relationship::{initial_status, ConceptRelationship, RelationshipDraft},
            source_chunk::SourceChunk,
        },
    },
    utils::{config::AppConfig, embedding::EmbeddingProvider},
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    chunking::{chunk_text, ChunkPiece, DEFAULT_MAX_CHARS, DEFAULT_OVERLAP},
    claims::{extract_for_chunks, ChunkClaims},
    extraction::{extract_concepts, ExtractionResult, MIN_LINK_CONFIDENCE},
    segments::{segment_source, Segment},
};

pub struct IngestionPipeline {
    db: Arc<SurrealDbClient>,
    router: Arc<ModelRouter>,
    embedder: Arc<EmbeddingProvider>,
    #[allow(dead_code)]
    config: AppConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestionOutcome {
    pub run_id: String,
    pub lecture_id: String,
    pub status: RunStatus,
    pub nodes_created: Vec<String>,
    pub nodes_updated: Vec<String>,
    pub links_created: usize,
    pub claim_ids: Vec<String>,
    pub segments: Vec<Segment>,
    pub counts: serde_json::Value,
    pub errors: Vec<String>,
}

impl IngestionPipeline {
    pub fn new(
        db: Arc<SurrealDbClient>,
        router: Arc<ModelRouter>,
        embedder: Arc<EmbeddingProvider>,
        config: AppConfig,
    ) -> Self {
        Self {
            db,
            router,
            embedder,
            config,
        }
    }

    #[tracing::instrument(skip_all, fields(task_id = %task.id, user_id = %task.user_id))]
    pub async fn process_task(&self, task: IngestionTask) -> Result<(), AppError> {
        let attempts = match &task.status {
            IngestionTaskStatus::InProgress { attempts, .. } => *attempts,
            _ => 1,
        };

        let ctx = resolve_active_context(
            &self.db,
            &task.content.tenant_id,
            &task.content.user_id,
        )
        .await?
        .with_overrides(None, task.content.branch_id.as_deref());

        match self
            .ingest(&ctx, &task.content, &CancellationToken::new())
            .await
        {
            Ok(outcome) => {
                info!(run_id = %outcome.run_id, status = ?outcome.status, "ingestion task finished");
                IngestionTask::update_status(&task.id, IngestionTaskStatus::Completed, &self.db)
                    .await?;
                Ok(())
            }
            Err(err) => {
                if attempts >= MAX_ATTEMPTS {
                    IngestionTask::update_status(
                        &task.id,
                        IngestionTaskStatus::Error(format!("Max attempts reached: {err}")),
                        &self.db,
                    )
                    .await?;
                }
                Err(AppError::Processing(err.to_string()))
            }
        }
    }

    /// Run one ingestion under a fresh run id. Cancellation between stages
    /// marks the run FAILED and performs no partial cleanup; undo-by-run
    /// remains available to the operator.
    pub async fn ingest(
        &self,
        ctx: &ActiveContext,
        request: &IngestionRequest,
        cancel: &CancellationToken,
    ) -> Result<IngestionOutcome, AppError> {
        let started = Instant::now();
        let run = IngestionRun::start(&self.db, ctx, "lecture", &request.source_label).await?;
        let run_id = run.id.clone();
        let mut errors: Vec<String> = Vec::new();

        let check_cancel = |stage: &str| -> Result<(), AppError> {
            if cancel.is_cancelled() {
                Err(AppError::Cancelled(format!("cancelled during {stage}")))
            } else {
                Ok(())
            }
        };

        let result = async {
            // Artifact identity first, so re-ingestion lands on the same
            // record.
            let artifact = Artifact::upsert(
                &self.db,
                ctx,
                Artifact::new(
                    ctx,
                    request.source_id.clone(),
                    &request.text,
                    Some(request.source_label.clone()),
                    Some("lecture".to_owned()),
                    Some(run_id.clone()),
                ),
            )
            .await?;

            // Chunk and persist the windows serially.
            check_cancel("chunking")?;
            let pieces = chunk_text(&request.text, DEFAULT_MAX_CHARS, DEFAULT_OVERLAP);
            let mut chunk_ids: BTreeMap<i64, String> = BTreeMap::new();
            for piece in &pieces {
                let chunk = SourceChunk::new(
                    ctx,
                    request.source_id.clone(),
                    piece.index,
                    piece.text.clone(),
                    None,
                    Some(run_id.clone()),
                );
                let stored = SourceChunk::upsert(&self.db, ctx, chunk).await?;
                chunk_ids.insert(piece.index, stored.id);
            }

            // One extraction call over the whole source.
            check_cancel("extraction")?;
            let known = Concept::list_all(&self.db, ctx)
                .await?
                .into_iter()
                .map(|c| c.name)
                .collect::<Vec<_>>();
            let extraction = extract_concepts(
                &self.router,
                &request.text,
                request.domain.as_deref(),
                &known,
            )
            .await?;

            check_cancel("concept upserts")?;
            let (created, updated, name_to_id, concept_errors) = self
                .upsert_concepts(ctx, &extraction, &run_id, &request.source_label)
                .await?;
            errors.extend(concept_errors);

            // Links only after every node resolved.
            let (links_created, link_errors) = apply_links(
                &self.db,
                ctx,
                &extraction,
                &name_to_id,
                &run_id,
                &request.source_id,
            )
            .await?;
            errors.extend(link_errors);

            // Parallel claim extraction, serial writes in chunk order.
            check_cancel("claim extraction")?;
            let concept_names: Vec<String> = name_to_id.keys().cloned().collect();
            let (chunk_claims, claim_errors) = extract_for_chunks(
                &self.router,
                &self.embedder,
                &pieces,
                &concept_names,
                cancel,
            )
            .await;
            errors.extend(claim_errors);

            check_cancel("claim writes")?;
            let (claim_ids, write_errors) = write_chunk_claims(
                &self.db,
                ctx,
                &chunk_claims,
                &chunk_ids,
                &name_to_id,
                &request.source_id,
                &run_id,
            )
            .await?;
            errors.extend(write_errors);

            // Artifact mentions, idempotent and run-tagged.
            let mentioned: Vec<String> = name_to_id.values().cloned().collect();
            Artifact::add_mentions(&self.db, ctx, &artifact.id, &mentioned, Some(&run_id))
                .await?;

            // Segmentation pass; its failure costs segments only.
            check_cancel("segmentation")?;
            let segments = match segment_source(&self.router, &request.text, &concept_names).await
            {
                Ok(segments) => segments,
                Err(err) => {
                    warn!(error = %err, "segmentation pass failed");
                    errors.push(format!("segmentation: {err}"));
                    Vec::new()
                }
            };

            Ok::<_, AppError>((artifact.id, created, updated, links_created, claim_ids, segments))
        }
        .await;

        match result {
            Ok((lecture_id, created, updated, links_created, claim_ids, segments)) => {
                let counts = serde_json::json!({
                    "nodes_created": created.len(),
                    "nodes_updated": updated.len(),
                    "links_created": links_created,
                    "claims": claim_ids.len(),
                    "segments": segments.len(),
                    "elapsed_ms": started.elapsed().as_millis() as u64,
                });
                let created_anything =
                    !created.is_empty() || !updated.is_empty() || !claim_ids.is_empty();
                let status = IngestionRun::finish(
                    &self.db,
                    &run_id,
                    created_anything,
                    errors.clone(),
                    counts.clone(),
                )
                .await?;
                Ok(IngestionOutcome {
                    run_id,
                    lecture_id,
                    status,
                    nodes_created: created,
                    nodes_updated: updated,
                    links_created,
                    claim_ids,
                    segments,
                    counts,
                    errors,
                })
            }
            Err(err) => {
                let mut all_errors = errors;
                all_errors.push(err.to_string());
                IngestionRun::mark_failed(&self.db, &run_id, all_errors).await?;
                Err(err)
            }
        }
    }

    async fn upsert_concepts(
        &self,
        ctx: &ActiveContext,
        extraction: &ExtractionResult,
        run_id: &str,
        source_label: &str,
    ) -> Result<(Vec<String>, Vec<String>, BTreeMap<String, String>, Vec<String>), AppError> {
        let mut created = Vec::new();
        let mut updated = Vec::new();
        let mut name_to_id = BTreeMap::new();
        let mut errors = Vec::new();

        // Creation order follows the model's output order.
        for node in &extraction.nodes {
            let embedding_input = format!("name: {}, description: {}", node.name, node.description);
            let embedding = self.embedder.try_embed(&embedding_input).await;
            let draft = ConceptDraft {
                name: node.name.clone(),
                domain: node.domain.clone(),
                concept_type: node.node_type.clone(),
                description: node.description.clone(),
                tags: node.tags.clone(),
                aliases: node.aliases.clone(),
                source_label: Some(source_label.to_owned()),
                run_id: Some(run_id.to_owned()),
                embedding,
            };
            match Concept::upsert(&self.db, ctx, draft).await {
                Ok(outcome) => {
                    if outcome.created {
                        created.push(outcome.concept.id.clone());
                    } else {
                        updated.push(outcome.concept.id.clone());
                    }
                    name_to_id.insert(node.name.clone(), outcome.concept.id);
                }
                Err(err) => errors.push(format!("concept '{}': {err}", node.name)),
            }
        }

        Ok((created, updated, name_to_id, errors))
    }
}

/// Create relationships from extracted links. Links under the confidence
/// floor are dropped; unresolved endpoints are per-item errors; the
/// auto-accept rule decides the initial status.
pub async fn apply_links(
    db: &SurrealDbClient,
    ctx: &ActiveContext,
    extraction: &ExtractionResult,
    name_to_id: &BTreeMap<String, String>,
    run_id: &str,
    source_id: &str,
) -> Result<(usize, Vec<String>), AppError> {
    let mut created = 0usize;
    let mut errors = Vec::new();

    for link in &extraction.links {
        if link.confidence < MIN_LINK_CONFIDENCE {
            continue;
        }
        let (Some(src), Some(dst)) = (name_to_id.get(&link.source), name_to_id.get(&link.target))
        else {
            errors.push(format!(
                "link {} -[{}]-> {}: unresolved endpoint",
                link.source, link.predicate, link.target
            ));
            continue;
        };
        if src == dst {
            continue;
        }
        let status = initial_status(link.confidence, &link.predicate);
        match ConceptRelationship::upsert(
            db,
            ctx,
            src,
            dst,
            RelationshipDraft {
                predicate: link.predicate.clone(),
                confidence: link.confidence,
                method: "llm".to_owned(),
                source_id: Some(source_id.to_owned()),
                chunk_id: None,
                claim_id: None,
                rationale: link.rationale.clone(),
                ingestion_run_id: Some(run_id.to_owned()),
            },
            status,
        )
        .await
        {
            Ok(_) => created += 1,
            Err(err) => errors.push(format!(
                "link {} -[{}]-> {}: {err}",
                link.source, link.predicate, link.target
            )),
        }
    }

    Ok((created, errors))
}

/// Serial write phase for extracted claims, in ascending chunk order.
pub async fn write_chunk_claims(
    db: &SurrealDbClient,
    ctx: &ActiveContext,
    chunk_claims: &[ChunkClaims],
    chunk_ids: &BTreeMap<i64, String>,
    name_to_id: &BTreeMap<String, String>,
    source_id: &str,
    run_id: &str,
) -> Result<(Vec<String>, Vec<String>), AppError> {
    let mut claim_ids = Vec::new();
    let mut errors = Vec::new();

    for bucket in chunk_claims {
        let chunk_id = chunk_ids.get(&bucket.chunk_index).cloned();
        for (claim, embedding) in &bucket.claims {
            let mentioned: Vec<String> = claim
                .mentioned_concepts
                .iter()
                .filter_map(|name| name_to_id.get(name).cloned())
                .collect();
            let draft = ClaimDraft {
                text: claim.text.clone(),
                confidence: claim.confidence,
                method: "llm".to_owned(),
                source_id: source_id.to_owned(),
                source_span: None,
                chunk_id: chunk_id.clone(),
                embedding: embedding.clone(),
                mentioned_concept_ids: mentioned,
                run_id: Some(run_id.to_owned()),
            };
            match Claim::upsert(db, ctx, draft).await {
                Ok(stored) => {
                    if !claim_ids.contains(&stored.id) {
                        claim_ids.push(stored.id);
                    }
                }
                Err(err) => errors.push(format!(
                    "claim (chunk {}): {err}",
                    bucket.chunk_index
                )),
            }
        }
    }

    Ok((claim_ids, errors))
}

/// Undo a run inside the current branch: archive created concepts, retract
/// claims and chunks from the branch, reject the run's edges, stamp the
/// run. Nothing is deleted.
pub async fn undo_run(
    db: &SurrealDbClient,
    ctx: &ActiveContext,
    run_id: &str,
) -> Result<serde_json::Value, AppError> {
    let run = IngestionRun::get_scoped(db, ctx, run_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("ingestion run {run_id}")))?;

    let concepts = Concept::archive_created_by_run(db, ctx, &run.id).await?;
    let claims = Claim::retract_branch_by_run(db, ctx, &run.id).await?;
    let chunks = SourceChunk::retract_branch_by_run(db, ctx, &run.id).await?;
    let edges = ConceptRelationship::reject_by_run(db, ctx, &run.id).await?;
    IngestionRun::mark_undone(db, &run.id).await?;

    info!(run_id = %run.id, concepts, claims, chunks, edges, "ingestion run undone");
    Ok(serde_json::json!({
        "concepts_archived": concepts,
        "claims_retracted": claims,
        "chunks_retracted": chunks,
        "edges_rejected": edges,
    }))
}
