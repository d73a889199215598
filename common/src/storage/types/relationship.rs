#![allow(clippy::missing_docs_in_private_items)]
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::AppError,
    storage::{db::SurrealDbClient, scope::ActiveContext, types::concept::Concept, types::StoredObject},
};

/// Predicates that may be auto-accepted at ingestion time.
pub const AUTO_ACCEPT_PREDICATES: [&str; 3] = ["DEPENDS_ON", "PREREQUISITE_FOR", "RELATED_TO"];
pub const AUTO_ACCEPT_CONFIDENCE: f32 = 0.9;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipStatus {
    Proposed,
    Accepted,
    Rejected,
}

/// Reader policy for proposed edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IncludeProposed {
    #[default]
    Auto,
    All,
    None,
}

impl IncludeProposed {
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(str::trim).map(str::to_lowercase).as_deref() {
            Some("all") => Self::All,
            Some("none") => Self::None,
            _ => Self::Auto,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RelationshipMetadata {
    pub graph_id: String,
    pub predicate: String,
    pub status: RelationshipStatus,
    pub confidence: f32,
    pub method: String,
    pub source_id: Option<String>,
    pub chunk_id: Option<String>,
    pub claim_id: Option<String>,
    pub rationale: Option<String>,
    pub ingestion_run_id: Option<String>,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub supersedes_rel_type: Option<String>,
    pub on_branches: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ConceptRelationship {
    #[serde(deserialize_with = "deserialize_edge_id")]
    pub id: String,
    #[serde(rename = "in", deserialize_with = "deserialize_edge_id")]
    pub in_: String,
    #[serde(deserialize_with = "deserialize_edge_id")]
    pub out: String,
    pub metadata: RelationshipMetadata,
}

fn deserialize_edge_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::{self, Visitor};
    use std::fmt;
    use surrealdb::sql::Thing;

    struct EdgeIdVisitor;

    impl<'de> Visitor<'de> for EdgeIdVisitor {
        type Value = String;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a string or a Thing")
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
            Ok(value.to_string())
        }

        fn visit_string<E: de::Error>(self, value: String) -> Result<Self::Value, E> {
            Ok(value)
        }

        fn visit_map<A>(self, map: A) -> Result<Self::Value, A::Error>
        where
            A: de::MapAccess<'de>,
        {
            let thing = Thing::deserialize(de::value::MapAccessDeserializer::new(map))?;
            Ok(thing.id.to_raw())
        }
    }

    deserializer.deserialize_any(EdgeIdVisitor)
}

/// Attributes for a new edge; status is decided by the auto-accept rule
/// unless the caller pins one.
#[derive(Debug, Clone)]
pub struct RelationshipDraft {
    pub predicate: String,
    pub confidence: f32,
    pub method: String,
    pub source_id: Option<String>,
    pub chunk_id: Option<String>,
    pub claim_id: Option<String>,
    pub rationale: Option<String>,
    pub ingestion_run_id: Option<String>,
}

/// Auto-accept rule applied to LLM-created edges at ingestion.
pub fn initial_status(confidence: f32, predicate: &str) -> RelationshipStatus {
    if confidence >= AUTO_ACCEPT_CONFIDENCE && AUTO_ACCEPT_PREDICATES.contains(&predicate) {
        RelationshipStatus::Accepted
    } else {
        RelationshipStatus::Proposed
    }
}

impl ConceptRelationship {
    pub fn table_name() -> &'static str {
        "related_to"
    }

    /// Visibility of this edge to a normal reader under the given policy.
    pub fn is_visible(&self, policy: IncludeProposed, threshold: f32) -> bool {
        match self.metadata.status {
            RelationshipStatus::Accepted => true,
            RelationshipStatus::Rejected => false,
            RelationshipStatus::Proposed => match policy {
                IncludeProposed::All => true,
                IncludeProposed::None => false,
                IncludeProposed::Auto => self.metadata.confidence >= threshold,
            },
        }
    }

    /// Idempotently create an edge for `(src, dst, predicate)`. An existing
    /// non-rejected edge for the triple is reused: the current branch is
    /// added to its membership and it is returned unchanged otherwise.
    pub async fn upsert(
        db: &SurrealDbClient,
        ctx: &ActiveContext,
        src: &str,
        dst: &str,
        draft: RelationshipDraft,
        status: RelationshipStatus,
    ) -> Result<Self, AppError> {
        if let Some(mut existing) =
            Self::find_triple(db, ctx, src, dst, &draft.predicate).await?
        {
            if existing.metadata.status != RelationshipStatus::Rejected {
                if !existing.metadata.on_branches.contains(&ctx.branch_id) {
                    existing.metadata.on_branches.push(ctx.branch_id.clone());
                    Self::write_metadata(db, &existing).await?;
                }
                return Ok(existing);
            }
        }

        let edge = Self {
            id: Uuid::new_v4().to_string(),
            in_: src.to_owned(),
            out: dst.to_owned(),
            metadata: RelationshipMetadata {
                graph_id: ctx.graph_id.clone(),
                predicate: draft.predicate,
                status,
                confidence: draft.confidence,
                method: draft.method,
                source_id: draft.source_id,
                chunk_id: draft.chunk_id,
                claim_id: draft.claim_id,
                rationale: draft.rationale,
                ingestion_run_id: draft.ingestion_run_id,
                reviewed_by: None,
                reviewed_at: None,
                supersedes_rel_type: None,
                on_branches: vec![ctx.branch_id.clone()],
            },
        };
        edge.store(db).await?;
        Ok(edge)
    }

    async fn store(&self, db: &SurrealDbClient) -> Result<(), AppError> {
        const MAX_ATTEMPTS: usize = 3;
        const INITIAL_BACKOFF_MS: u64 = 50;
        const MAX_BACKOFF_MS: u64 = 800;

        let mut backoff_ms = INITIAL_BACKOFF_MS;

        for attempt in 0..MAX_ATTEMPTS {
            let result = db
                .client
                .query(
                    r#"BEGIN TRANSACTION;
                    LET $in_node = type::thing('concept', $in_id);
                    LET $out_node = type::thing('concept', $out_id);
                    LET $relation = type::thing('related_to', $rel_id);
                    DELETE type::thing('related_to', $rel_id);
                    RELATE $in_node->$relation->$out_node SET metadata = $metadata;
                    COMMIT TRANSACTION;"#,
                )
                .bind(("rel_id", self.id.clone()))
                .bind(("in_id", self.in_.clone()))
                .bind(("out_id", self.out.clone()))
                .bind(("metadata", self.metadata.clone()))
                .await
                .and_then(|response| response.check().map(|_| ()));

            match result {
                Ok(()) => return Ok(()),
                Err(err) => {
                    if SurrealDbClient::is_retryable_conflict(&err) && attempt + 1 < MAX_ATTEMPTS {
                        tracing::warn!(
                            attempt = attempt + 1,
                            "transient conflict while storing relationship; retrying"
                        );
                        tokio::time::sleep(std::time::Duration::from_millis(backoff_ms)).await;
                        backoff_ms = (backoff_ms * 2).min(MAX_BACKOFF_MS);
                        continue;
                    }
                    return Err(AppError::Database(err));
                }
            }
        }

        Err(AppError::InternalError(
            "failed to store relationship after retries".to_string(),
        ))
    }

    async fn write_metadata(db: &SurrealDbClient, edge: &Self) -> Result<(), AppError> {
        db.client
            .query("UPDATE type::thing('related_to', $id) SET metadata = $metadata")
            .bind(("id", edge.id.clone()))
            .bind(("metadata", edge.metadata.clone()))
            .await?
            .check()?;
        Ok(())
    }

    pub async fn find_triple(
        db: &SurrealDbClient,
        ctx: &ActiveContext,
        src: &str,
        dst: &str,
        predicate: &str,
    ) -> Result<Option<Self>, AppError> {
        let mut response = db
            .client
            .query(
                "SELECT * FROM related_to \
                 WHERE metadata.graph_id = $graph_id \
                   AND in = type::thing('concept', $src) \
                   AND out = type::thing('concept', $dst) \
                   AND metadata.predicate = $predicate \
                 ORDER BY id ASC",
            )
            .bind(("graph_id", ctx.graph_id.clone()))
            .bind(("src", src.to_owned()))
            .bind(("dst", dst.to_owned()))
            .bind(("predicate", predicate.to_owned()))
            .await?;
        let edges: Vec<Self> = response.take(0)?;
        // Prefer a live edge over a rejected remnant of the same triple.
        Ok(edges
            .iter()
            .find(|e| e.metadata.status != RelationshipStatus::Rejected)
            .or_else(|| edges.first())
            .cloned())
    }

    async fn transition(
        db: &SurrealDbClient,
        ctx: &ActiveContext,
        src: &str,
        dst: &str,
        predicate: &str,
        status: RelationshipStatus,
        reviewed_by: &str,
    ) -> Result<Self, AppError> {
        let mut edge = Self::find_triple(db, ctx, src, dst, predicate)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("relationship {src} -[{predicate}]-> {dst}"))
            })?;

        // Idempotent: re-reviewing to the same status refreshes nothing.
        if edge.metadata.status != status {
            edge.metadata.status = status;
            edge.metadata.reviewed_by = Some(reviewed_by.to_owned());
            edge.metadata.reviewed_at = Some(Utc::now());
            Self::write_metadata(db, &edge).await?;
        }
        Ok(edge)
    }

    pub async fn accept(
        db: &SurrealDbClient,
        ctx: &ActiveContext,
        src: &str,
        dst: &str,
        predicate: &str,
        reviewed_by: &str,
    ) -> Result<Self, AppError> {
        Self::transition(db, ctx, src, dst, predicate, RelationshipStatus::Accepted, reviewed_by)
            .await
    }

    pub async fn reject(
        db: &SurrealDbClient,
        ctx: &ActiveContext,
        src: &str,
        dst: &str,
        predicate: &str,
        reviewed_by: &str,
    ) -> Result<Self, AppError> {
        Self::transition(db, ctx, src, dst, predicate, RelationshipStatus::Rejected, reviewed_by)
            .await
    }

    /// Batched review. Per-triple failures are collected, never
    /// short-circuiting the batch.
    pub async fn review_batch(
        db: &SurrealDbClient,
        ctx: &ActiveContext,
        triples: &[(String, String, String)],
        status: RelationshipStatus,
        reviewed_by: &str,
    ) -> Result<(usize, Vec<String>), AppError> {
        let mut reviewed = 0usize;
        let mut errors = Vec::new();
        for (src, dst, predicate) in triples {
            match Self::transition(db, ctx, src, dst, predicate, status, reviewed_by).await {
                Ok(_) => reviewed += 1,
                Err(err) => errors.push(format!("{src} -[{predicate}]-> {dst}: {err}")),
            }
        }
        Ok((reviewed, errors))
    }

    /// Edit = reject the old predicate and create an accepted replacement
    /// that back-points at it.
    pub async fn edit_predicate(
        db: &SurrealDbClient,
        ctx: &ActiveContext,
        src: &str,
        dst: &str,
        old_predicate: &str,
        new_predicate: &str,
        reviewed_by: &str,
    ) -> Result<Self, AppError> {
        let old = Self::reject(db, ctx, src, dst, old_predicate, reviewed_by).await?;

        let mut replacement = Self {
            id: Uuid::new_v4().to_string(),
            in_: src.to_owned(),
            out: dst.to_owned(),
            metadata: RelationshipMetadata {
                predicate: new_predicate.to_owned(),
                status: RelationshipStatus::Accepted,
                method: "human".to_owned(),
                reviewed_by: Some(reviewed_by.to_owned()),
                reviewed_at: Some(Utc::now()),
                supersedes_rel_type: Some(old_predicate.to_owned()),
                ..old.metadata.clone()
            },
        };
        if !replacement.metadata.on_branches.contains(&ctx.branch_id) {
            replacement.metadata.on_branches.push(ctx.branch_id.clone());
        }
        replacement.store(db).await?;
        Ok(replacement)
    }

    /// All edges in the active branch; visibility filtering happens on the
    /// fetched set so the policy logic lives in one place.
    pub async fn list_for_branch(
        db: &SurrealDbClient,
        ctx: &ActiveContext,
        policy: IncludeProposed,
        threshold: f32,
    ) -> Result<Vec<Self>, AppError> {
        let mut response = db
            .client
            .query(
                "SELECT * FROM related_to \
                 WHERE metadata.graph_id = $graph_id \
                   AND $branch_id IN metadata.on_branches \
                 ORDER BY id ASC",
            )
            .bind(("graph_id", ctx.graph_id.clone()))
            .bind(("branch_id", ctx.branch_id.clone()))
            .await?;
        let edges: Vec<Self> = response.take(0)?;
        Ok(edges
            .into_iter()
            .filter(|e| e.is_visible(policy, threshold))
            .collect())
    }

    /// Edges with at least one endpoint in `node_ids`.
    pub async fn edges_touching(
        db: &SurrealDbClient,
        ctx: &ActiveContext,
        node_ids: &[String],
        policy: IncludeProposed,
        threshold: f32,
    ) -> Result<Vec<Self>, AppError> {
        if node_ids.is_empty() {
            return Ok(Vec::new());
        }
        let things: Vec<surrealdb::RecordId> = node_ids
            .iter()
            .map(|id| surrealdb::RecordId::from_table_key(Concept::table_name(), id))
            .collect();
        let mut response = db
            .client
            .query(
                "SELECT * FROM related_to \
                 WHERE metadata.graph_id = $graph_id \
                   AND $branch_id IN metadata.on_branches \
                   AND (in IN $things OR out IN $things) \
                 ORDER BY id ASC",
            )
            .bind(("graph_id", ctx.graph_id.clone()))
            .bind(("branch_id", ctx.branch_id.clone()))
            .bind(("things", things))
            .await?;
        let edges: Vec<Self> = response.take(0)?;
        Ok(edges
            .into_iter()
            .filter(|e| e.is_visible(policy, threshold))
            .collect())
    }

    /// Edges whose both endpoints are in `node_ids`.
    pub async fn edges_among(
        db: &SurrealDbClient,
        ctx: &ActiveContext,
        node_ids: &[String],
        policy: IncludeProposed,
        threshold: f32,
    ) -> Result<Vec<Self>, AppError> {
        let touching = Self::edges_touching(db, ctx, node_ids, policy, threshold).await?;
        Ok(touching
            .into_iter()
            .filter(|e| node_ids.contains(&e.in_) && node_ids.contains(&e.out))
            .collect())
    }

    /// Re-point every live edge of a merged concept at its survivor,
    /// skipping would-be self loops and already-present triples.
    pub async fn redirect_edges(
        db: &SurrealDbClient,
        ctx: &ActiveContext,
        from_node: &str,
        to_node: &str,
    ) -> Result<usize, AppError> {
        let edges =
            Self::edges_touching(db, ctx, &[from_node.to_owned()], IncludeProposed::All, 0.0)
                .await?;
        let mut moved = 0usize;
        for edge in edges {
            let (new_in, new_out) = if edge.in_ == from_node {
                (to_node.to_owned(), edge.out.clone())
            } else {
                (edge.in_.clone(), to_node.to_owned())
            };
            if new_in == new_out {
                continue;
            }
            if Self::find_triple(db, ctx, &new_in, &new_out, &edge.metadata.predicate)
                .await?
                .map(|e| e.metadata.status != RelationshipStatus::Rejected)
                .unwrap_or(false)
            {
                continue;
            }
            let replacement = Self {
                id: Uuid::new_v4().to_string(),
                in_: new_in,
                out: new_out,
                metadata: edge.metadata.clone(),
            };
            replacement.store(db).await?;
            db.client
                .query("DELETE type::thing('related_to', $id)")
                .bind(("id", edge.id.clone()))
                .await?
                .check()?;
            moved += 1;
        }
        Ok(moved)
    }

    /// Archive (not delete) all edges created by a run, within the branch.
    pub async fn reject_by_run(
        db: &SurrealDbClient,
        ctx: &ActiveContext,
        run_id: &str,
    ) -> Result<usize, AppError> {
        let mut response = db
            .client
            .query(
                "SELECT * FROM related_to \
                 WHERE metadata.graph_id = $graph_id \
                   AND $branch_id IN metadata.on_branches \
                   AND metadata.ingestion_run_id = $run_id \
                 ORDER BY id ASC",
            )
            .bind(("graph_id", ctx.graph_id.clone()))
            .bind(("branch_id", ctx.branch_id.clone()))
            .bind(("run_id", run_id.to_owned()))
            .await?;
        let edges: Vec<Self> = response.take(0)?;
        let count = edges.len();
        for mut edge in edges {
            if edge.metadata.status != RelationshipStatus::Rejected {
                edge.metadata.status = RelationshipStatus::Rejected;
                edge.metadata.reviewed_by = Some("undo".to_owned());
                edge.metadata.reviewed_at = Some(Utc::now());
                Self::write_metadata(db, &edge).await?;
            }
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::scope::resolve_active_context;
    use crate::storage::types::concept::{Concept, ConceptDraft};

    async fn scoped_db() -> (SurrealDbClient, ActiveContext) {
        let db = SurrealDbClient::memory("test_ns", &uuid::Uuid::new_v4().to_string())
            .await
            .expect("Failed to start in-memory surrealdb");
        db.ensure_initialized().await.expect("init");
        let ctx = resolve_active_context(&db, "tenant-a", "user-1")
            .await
            .expect("resolve");
        (db, ctx)
    }

    async fn seed_concept(db: &SurrealDbClient, ctx: &ActiveContext, name: &str) -> String {
        Concept::upsert(
            db,
            ctx,
            ConceptDraft {
                name: name.to_owned(),
                description: format!("about {name}"),
                ..ConceptDraft::default()
            },
        )
        .await
        .expect("seed concept")
        .concept
        .id
    }

    fn draft(predicate: &str, confidence: f32) -> RelationshipDraft {
        RelationshipDraft {
            predicate: predicate.to_owned(),
            confidence,
            method: "llm".to_owned(),
            source_id: Some("lecture-1".to_owned()),
            chunk_id: None,
            claim_id: None,
            rationale: None,
            ingestion_run_id: Some("run-1".to_owned()),
        }
    }

    #[test]
    fn test_auto_accept_rule() {
        assert_eq!(initial_status(0.95, "RELATED_TO"), RelationshipStatus::Accepted);
        assert_eq!(initial_status(0.95, "CAUSES"), RelationshipStatus::Proposed);
        assert_eq!(initial_status(0.8, "RELATED_TO"), RelationshipStatus::Proposed);
    }

    #[test]
    fn test_visibility_policy() {
        let edge = ConceptRelationship {
            id: "e".into(),
            in_: "a".into(),
            out: "b".into(),
            metadata: RelationshipMetadata {
                graph_id: "g".into(),
                predicate: "RELATED_TO".into(),
                status: RelationshipStatus::Proposed,
                confidence: 0.8,
                method: "llm".into(),
                source_id: None,
                chunk_id: None,
                claim_id: None,
                rationale: None,
                ingestion_run_id: None,
                reviewed_by: None,
                reviewed_at: None,
                supersedes_rel_type: None,
                on_branches: vec!["main".into()],
            },
        };
        assert!(edge.is_visible(IncludeProposed::Auto, 0.6));
        assert!(!edge.is_visible(IncludeProposed::Auto, 0.9));
        assert!(edge.is_visible(IncludeProposed::All, 0.9));
        assert!(!edge.is_visible(IncludeProposed::None, 0.0));

        let mut rejected = edge.clone();
        rejected.metadata.status = RelationshipStatus::Rejected;
        assert!(!rejected.is_visible(IncludeProposed::All, 0.0));
    }

    #[tokio::test]
    async fn test_lifecycle_accept_then_edit() {
        let (db, ctx) = scoped_db().await;
        let a = seed_concept(&db, &ctx, "Backpropagation").await;
        let b = seed_concept(&db, &ctx, "Gradient Descent").await;

        let edge = ConceptRelationship::upsert(
            &db,
            &ctx,
            &a,
            &b,
            draft("RELATED_TO", 0.8),
            initial_status(0.8, "RELATED_TO"),
        )
        .await
        .expect("create edge");
        assert_eq!(edge.metadata.status, RelationshipStatus::Proposed);

        // visible in auto (0.8 >= 0.6) and all, hidden in none
        let auto = ConceptRelationship::list_for_branch(&db, &ctx, IncludeProposed::Auto, 0.6)
            .await
            .expect("list auto");
        assert_eq!(auto.len(), 1);
        let none = ConceptRelationship::list_for_branch(&db, &ctx, IncludeProposed::None, 0.6)
            .await
            .expect("list none");
        assert!(none.is_empty());
        let all = ConceptRelationship::list_for_branch(&db, &ctx, IncludeProposed::All, 0.6)
            .await
            .expect("list all");
        assert_eq!(all.len(), 1);

        let accepted = ConceptRelationship::accept(&db, &ctx, &a, &b, "RELATED_TO", "reviewer")
            .await
            .expect("accept");
        assert_eq!(accepted.metadata.status, RelationshipStatus::Accepted);
        assert!(accepted.metadata.reviewed_at.is_some());

        // accepted edges show up under every policy
        let none_after = ConceptRelationship::list_for_branch(&db, &ctx, IncludeProposed::None, 0.6)
            .await
            .expect("list none after accept");
        assert_eq!(none_after.len(), 1);

        let edited = ConceptRelationship::edit_predicate(
            &db,
            &ctx,
            &a,
            &b,
            "RELATED_TO",
            "PREREQUISITE_FOR",
            "reviewer",
        )
        .await
        .expect("edit");
        assert_eq!(edited.metadata.predicate, "PREREQUISITE_FOR");
        assert_eq!(
            edited.metadata.supersedes_rel_type.as_deref(),
            Some("RELATED_TO")
        );

        let old = ConceptRelationship::find_triple(&db, &ctx, &a, &b, "RELATED_TO")
            .await
            .expect("find old")
            .expect("old edge still stored");
        assert_eq!(old.metadata.status, RelationshipStatus::Rejected);

        // rejected edges never surface to readers
        let visible = ConceptRelationship::list_for_branch(&db, &ctx, IncludeProposed::All, 0.0)
            .await
            .expect("list visible");
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].metadata.predicate, "PREREQUISITE_FOR");
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let (db, ctx) = scoped_db().await;
        let a = seed_concept(&db, &ctx, "A").await;
        let b = seed_concept(&db, &ctx, "B").await;

        let first = ConceptRelationship::upsert(
            &db,
            &ctx,
            &a,
            &b,
            draft("DEPENDS_ON", 0.95),
            initial_status(0.95, "DEPENDS_ON"),
        )
        .await
        .expect("first");
        let second = ConceptRelationship::upsert(
            &db,
            &ctx,
            &a,
            &b,
            draft("DEPENDS_ON", 0.95),
            initial_status(0.95, "DEPENDS_ON"),
        )
        .await
        .expect("second");

        assert_eq!(first.id, second.id);
        let all = ConceptRelationship::list_for_branch(&db, &ctx, IncludeProposed::All, 0.0)
            .await
            .expect("list");
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn test_review_batch_collects_errors() {
        let (db, ctx) = scoped_db().await;
        let a = seed_concept(&db, &ctx, "A").await;
        let b = seed_concept(&db, &ctx, "B").await;

        ConceptRelationship::upsert(
            &db,
            &ctx,
            &a,
            &b,
            draft("CAUSES", 0.7),
            RelationshipStatus::Proposed,
        )
        .await
        .expect("edge");

        let triples = vec![
            (a.clone(), b.clone(), "CAUSES".to_owned()),
            (a.clone(), b.clone(), "MISSING".to_owned()),
        ];
        let (reviewed, errors) = ConceptRelationship::review_batch(
            &db,
            &ctx,
            &triples,
            RelationshipStatus::Accepted,
            "reviewer",
        )
        .await
        .expect("batch");
        assert_eq!(reviewed, 1);
        assert_eq!(errors.len(), 1);
    }

    #[tokio::test]
    async fn test_redirect_edges_for_merge() {
        let (db, ctx) = scoped_db().await;
        let merged = seed_concept(&db, &ctx, "Old Name").await;
        let survivor = seed_concept(&db, &ctx, "New Name").await;
        let other = seed_concept(&db, &ctx, "Neighbor").await;

        ConceptRelationship::upsert(
            &db,
            &ctx,
            &merged,
            &other,
            draft("RELATED_TO", 0.95),
            RelationshipStatus::Accepted,
        )
        .await
        .expect("edge");

        let moved = ConceptRelationship::redirect_edges(&db, &ctx, &merged, &survivor)
            .await
            .expect("redirect");
        assert_eq!(moved, 1);

        let touching =
            ConceptRelationship::edges_touching(&db, &ctx, &[survivor.clone()], IncludeProposed::All, 0.0)
                .await
                .expect("touching");
        assert_eq!(touching.len(), 1);
        assert_eq!(touching[0].in_, survivor);
    }
}
