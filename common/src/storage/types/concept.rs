#![allow(clippy::missing_docs_in_private_items)]
use std::collections::BTreeSet;

use crate::{
    error::AppError,
    storage::{db::SurrealDbClient, scope::ActiveContext},
    stored_object,
    utils::ids::{normalize_text, slugify},
};
use uuid::Uuid;

stored_object!(Concept, "concept", {
    graph_id: String,
    name: String,
    domain: Option<String>,
    concept_type: Option<String>,
    description: String,
    tags: Vec<String>,
    aliases: Vec<String>,
    url_slug: String,
    lecture_sources: Vec<String>,
    created_by: Option<String>,
    last_updated_by: Option<String>,
    created_by_run_id: Option<String>,
    last_updated_by_run_id: Option<String>,
    mastery_level: i64,
    is_merged: bool,
    archived: bool,
    on_branches: Vec<String>,
    embedding: Option<Vec<f32>>
});

/// Incoming attributes for a concept upsert; ingestion and user actions
/// both funnel through this.
#[derive(Debug, Clone, Default)]
pub struct ConceptDraft {
    pub name: String,
    pub domain: Option<String>,
    pub concept_type: Option<String>,
    pub description: String,
    pub tags: Vec<String>,
    pub aliases: Vec<String>,
    pub source_label: Option<String>,
    pub run_id: Option<String>,
    pub embedding: Option<Vec<f32>>,
}

/// Outcome of an upsert: the stored concept plus whether it was created.
#[derive(Debug, Clone)]
pub struct ConceptUpsert {
    pub concept: Concept,
    pub created: bool,
}

const READ_FILTER: &str = "graph_id = $graph_id \
    AND $branch_id IN on_branches \
    AND is_merged = false \
    AND archived = false";

impl Concept {
    fn from_draft(ctx: &ActiveContext, draft: &ConceptDraft) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            graph_id: ctx.graph_id.clone(),
            name: draft.name.clone(),
            domain: draft.domain.clone(),
            concept_type: draft.concept_type.clone(),
            description: draft.description.clone(),
            tags: draft.tags.clone(),
            aliases: draft.aliases.clone(),
            url_slug: slugify(&draft.name),
            lecture_sources: draft.source_label.iter().cloned().collect(),
            created_by: draft.source_label.clone(),
            last_updated_by: draft.source_label.clone(),
            created_by_run_id: draft.run_id.clone(),
            last_updated_by_run_id: draft.run_id.clone(),
            mastery_level: 0,
            is_merged: false,
            archived: false,
            on_branches: vec![ctx.branch_id.clone()],
            embedding: draft.embedding.clone(),
        }
    }

    /// Find a concept by exact name or normalized alias within the active
    /// branch.
    pub async fn get_by_name(
        db: &SurrealDbClient,
        ctx: &ActiveContext,
        name: &str,
        include_archived: bool,
    ) -> Result<Option<Self>, AppError> {
        let filter = if include_archived {
            "graph_id = $graph_id AND $branch_id IN on_branches AND is_merged = false"
        } else {
            READ_FILTER
        };
        let sql = format!(
            "SELECT * FROM concept WHERE {filter} \
             AND (name = $name \
                  OR string::lowercase(string::trim(name)) = $normalized \
                  OR $normalized IN array::map(aliases, |$a| string::lowercase(string::trim($a)))) \
             ORDER BY id ASC LIMIT 1"
        );
        let mut response = db
            .client
            .query(sql)
            .bind(("graph_id", ctx.graph_id.clone()))
            .bind(("branch_id", ctx.branch_id.clone()))
            .bind(("name", name.to_owned()))
            .bind(("normalized", normalize_text(name)))
            .await?;
        Ok(response.take(0)?)
    }

    pub async fn get_by_id(
        db: &SurrealDbClient,
        ctx: &ActiveContext,
        node_id: &str,
    ) -> Result<Option<Self>, AppError> {
        let concept: Option<Self> = db.get_item(node_id).await?;
        Ok(concept.filter(|c| {
            c.graph_id == ctx.graph_id
                && c.on_branches.contains(&ctx.branch_id)
                && !c.is_merged
                && !c.archived
        }))
    }

    pub async fn get_by_slug(
        db: &SurrealDbClient,
        ctx: &ActiveContext,
        slug: &str,
    ) -> Result<Option<Self>, AppError> {
        let sql = format!(
            "SELECT * FROM concept WHERE {READ_FILTER} AND url_slug = $slug ORDER BY id ASC LIMIT 1"
        );
        let mut response = db
            .client
            .query(sql)
            .bind(("graph_id", ctx.graph_id.clone()))
            .bind(("branch_id", ctx.branch_id.clone()))
            .bind(("slug", slug.to_owned()))
            .await?;
        Ok(response.take(0)?)
    }

    /// Fetch several concepts by id, returned in the requested order.
    pub async fn get_many(
        db: &SurrealDbClient,
        ctx: &ActiveContext,
        node_ids: &[String],
    ) -> Result<Vec<Self>, AppError> {
        if node_ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT * FROM concept WHERE {READ_FILTER} AND id IN $things ORDER BY id ASC"
        );
        let things: Vec<surrealdb::RecordId> = node_ids
            .iter()
            .map(|id| surrealdb::RecordId::from_table_key(Self::table_name(), id))
            .collect();
        let mut response = db
            .client
            .query(sql)
            .bind(("graph_id", ctx.graph_id.clone()))
            .bind(("branch_id", ctx.branch_id.clone()))
            .bind(("things", things))
            .await?;
        let fetched: Vec<Self> = response.take(0)?;

        let mut ordered = Vec::with_capacity(fetched.len());
        for id in node_ids {
            if let Some(concept) = fetched.iter().find(|c| &c.id == id) {
                if !ordered.iter().any(|c: &Self| c.id == concept.id) {
                    ordered.push(concept.clone());
                }
            }
        }
        Ok(ordered)
    }

    pub async fn list_all(
        db: &SurrealDbClient,
        ctx: &ActiveContext,
    ) -> Result<Vec<Self>, AppError> {
        let sql = format!("SELECT * FROM concept WHERE {READ_FILTER} ORDER BY id ASC");
        let mut response = db
            .client
            .query(sql)
            .bind(("graph_id", ctx.graph_id.clone()))
            .bind(("branch_id", ctx.branch_id.clone()))
            .await?;
        Ok(response.take(0)?)
    }

    /// Upsert by `(graph_id, name)`. A fresh name creates the full record;
    /// a match selectively extends it: the description is only overwritten
    /// by a longer one, tags and aliases are set-unioned, lecture sources
    /// accumulate, and `created_by_run_id` is preserved while
    /// `last_updated_by_run_id` moves forward.
    pub async fn upsert(
        db: &SurrealDbClient,
        ctx: &ActiveContext,
        draft: ConceptDraft,
    ) -> Result<ConceptUpsert, AppError> {
        if draft.name.trim().is_empty() {
            return Err(AppError::Validation("concept name must not be empty".into()));
        }

        if let Some(existing) = Self::get_by_name(db, ctx, &draft.name, true).await? {
            let updated = Self::apply_update(db, ctx, existing, &draft).await?;
            return Ok(ConceptUpsert {
                concept: updated,
                created: false,
            });
        }

        let mut candidate = Self::from_draft(ctx, &draft);
        // Slugs are unique per graph; collisions get a short id suffix.
        if Self::get_by_slug(db, ctx, &candidate.url_slug).await?.is_some() {
            let suffix: String = candidate.id.chars().take(4).collect();
            candidate.url_slug = format!("{}-{}", candidate.url_slug, suffix);
        }
        match db.store_item(candidate.clone()).await {
            Ok(_) => Ok(ConceptUpsert {
                concept: candidate,
                created: true,
            }),
            Err(err) if SurrealDbClient::is_unique_index_violation(&err) => {
                // Lost a create race; fall back to the update path against
                // the record that won.
                let existing = Self::get_by_name(db, ctx, &draft.name, true)
                    .await?
                    .ok_or_else(|| AppError::Conflict {
                        existing_id: draft.name.clone(),
                    })?;
                let updated = Self::apply_update(db, ctx, existing, &draft).await?;
                Ok(ConceptUpsert {
                    concept: updated,
                    created: false,
                })
            }
            Err(err) => Err(AppError::Database(err)),
        }
    }

    async fn apply_update(
        db: &SurrealDbClient,
        ctx: &ActiveContext,
        mut existing: Self,
        draft: &ConceptDraft,
    ) -> Result<Self, AppError> {
        if draft.description.len() > existing.description.len() {
            existing.description = draft.description.clone();
        }
        existing.tags = union_sorted(&existing.tags, &draft.tags);
        existing.aliases = union_sorted(&existing.aliases, &draft.aliases);
        if let Some(source) = &draft.source_label {
            if !existing.lecture_sources.contains(source) {
                existing.lecture_sources.push(source.clone());
            }
            existing.last_updated_by = Some(source.clone());
        }
        if existing.domain.is_none() {
            existing.domain = draft.domain.clone();
        }
        if existing.concept_type.is_none() {
            existing.concept_type = draft.concept_type.clone();
        }
        if draft.embedding.is_some() {
            existing.embedding = draft.embedding.clone();
        }
        existing.last_updated_by_run_id = draft.run_id.clone();
        if !existing.on_branches.contains(&ctx.branch_id) {
            existing.on_branches.push(ctx.branch_id.clone());
        }
        existing.updated_at = Utc::now();

        let updated: Option<Self> = db
            .client
            .query("UPDATE type::thing('concept', $id) CONTENT $content RETURN AFTER")
            .bind(("id", existing.id.clone()))
            .bind(("content", existing.clone()))
            .await?
            .take(0)?;

        updated.ok_or_else(|| AppError::InternalError("concept update returned nothing".into()))
    }

    /// Soft delete within the current branch view.
    pub async fn archive(
        db: &SurrealDbClient,
        ctx: &ActiveContext,
        node_id: &str,
    ) -> Result<(), AppError> {
        db.client
            .query(
                "UPDATE type::thing('concept', $id) \
                 SET archived = true, updated_at = time::now() \
                 WHERE graph_id = $graph_id AND $branch_id IN on_branches",
            )
            .bind(("id", node_id.to_owned()))
            .bind(("graph_id", ctx.graph_id.clone()))
            .bind(("branch_id", ctx.branch_id.clone()))
            .await?
            .check()?;
        Ok(())
    }

    /// Merge one concept into a survivor: live edges are re-pointed, then
    /// the source is hidden from every reader.
    pub async fn merge_into(
        db: &SurrealDbClient,
        ctx: &ActiveContext,
        source_id: &str,
        target_id: &str,
    ) -> Result<usize, AppError> {
        use crate::storage::types::relationship::ConceptRelationship;

        if source_id == target_id {
            return Err(AppError::Validation(
                "cannot merge a concept into itself".into(),
            ));
        }
        let moved = ConceptRelationship::redirect_edges(db, ctx, source_id, target_id).await?;
        Self::mark_merged(db, ctx, source_id).await?;
        Ok(moved)
    }

    /// Hide `source_id` behind `target_id`. Edge redirection is the
    /// relationship module's job; this only flips the merge flag so readers
    /// stop seeing the source.
    pub async fn mark_merged(
        db: &SurrealDbClient,
        ctx: &ActiveContext,
        source_id: &str,
    ) -> Result<(), AppError> {
        db.client
            .query(
                "UPDATE type::thing('concept', $id) \
                 SET is_merged = true, updated_at = time::now() \
                 WHERE graph_id = $graph_id",
            )
            .bind(("id", source_id.to_owned()))
            .bind(("graph_id", ctx.graph_id.clone()))
            .await?
            .check()?;
        Ok(())
    }

    pub async fn set_mastery(
        db: &SurrealDbClient,
        ctx: &ActiveContext,
        node_id: &str,
        level: i64,
    ) -> Result<i64, AppError> {
        let clamped = level.clamp(0, 100);
        db.client
            .query(
                "UPDATE type::thing('concept', $id) \
                 SET mastery_level = $level, updated_at = time::now() \
                 WHERE graph_id = $graph_id AND $branch_id IN on_branches",
            )
            .bind(("id", node_id.to_owned()))
            .bind(("level", clamped))
            .bind(("graph_id", ctx.graph_id.clone()))
            .bind(("branch_id", ctx.branch_id.clone()))
            .await?
            .check()?;
        Ok(clamped)
    }

    /// Undo support: archive every concept a run created, within scope.
    /// Concepts the run merely updated are left alone.
    pub async fn archive_created_by_run(
        db: &SurrealDbClient,
        ctx: &ActiveContext,
        run_id: &str,
    ) -> Result<usize, AppError> {
        let sql = format!(
            "SELECT * FROM concept WHERE {READ_FILTER} AND created_by_run_id = $run_id ORDER BY id ASC"
        );
        let mut response = db
            .client
            .query(sql)
            .bind(("graph_id", ctx.graph_id.clone()))
            .bind(("branch_id", ctx.branch_id.clone()))
            .bind(("run_id", run_id.to_owned()))
            .await?;
        let concepts: Vec<Self> = response.take(0)?;
        let count = concepts.len();
        for concept in &concepts {
            Self::archive(db, ctx, &concept.id).await?;
        }
        Ok(count)
    }

    pub async fn get_mastery(
        db: &SurrealDbClient,
        ctx: &ActiveContext,
        node_id: &str,
    ) -> Result<i64, AppError> {
        Ok(Self::get_by_id(db, ctx, node_id)
            .await?
            .map(|c| c.mastery_level)
            .unwrap_or(0))
    }
}

fn union_sorted(a: &[String], b: &[String]) -> Vec<String> {
    let set: BTreeSet<String> = a.iter().chain(b.iter()).cloned().collect();
    set.into_iter().collect()
}
