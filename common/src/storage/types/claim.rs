#![allow(clippy::missing_docs_in_private_items)]
use std::collections::BTreeMap;

use crate::{
    error::AppError,
    storage::{db::SurrealDbClient, scope::ActiveContext},
    stored_object,
    utils::ids::claim_id_for,
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClaimStatus {
    Proposed,
    Verified,
    Rejected,
}

/// Evidence filter over claim status and confidence; the recall/precision
/// dial of the retrieval path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvidenceStrictness {
    High,
    #[default]
    Medium,
    Low,
}

impl EvidenceStrictness {
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(str::trim).map(str::to_lowercase).as_deref() {
            Some("high") => Self::High,
            Some("low") => Self::Low,
            _ => Self::Medium,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    pub fn admits(&self, status: ClaimStatus, confidence: f32) -> bool {
        match self {
            Self::High => status == ClaimStatus::Verified,
            Self::Medium => {
                status == ClaimStatus::Verified
                    || (status == ClaimStatus::Proposed && confidence >= 0.7)
            }
            Self::Low => true,
        }
    }
}

stored_object!(Claim, "claim", {
    graph_id: String,
    text: String,
    confidence: f32,
    method: String,
    source_id: String,
    source_span: Option<String>,
    chunk_id: Option<String>,
    embedding: Option<Vec<f32>>,
    status: ClaimStatus,
    evidence_ids: Vec<String>,
    mentioned_concept_ids: Vec<String>,
    ingestion_run_id: Option<String>,
    on_branches: Vec<String>
});

#[derive(Debug, Clone, Default)]
pub struct ClaimDraft {
    pub text: String,
    pub confidence: f32,
    pub method: String,
    pub source_id: String,
    pub source_span: Option<String>,
    pub chunk_id: Option<String>,
    pub embedding: Option<Vec<f32>>,
    pub mentioned_concept_ids: Vec<String>,
    pub run_id: Option<String>,
}

const READ_FILTER: &str = "graph_id = $graph_id AND $branch_id IN on_branches";

impl Claim {
    /// Deterministic id for this draft within the graph.
    pub fn id_for(ctx: &ActiveContext, draft: &ClaimDraft) -> String {
        claim_id_for(&ctx.graph_id, &draft.source_id, &draft.text)
    }

    /// Upsert keyed by the deterministic claim id. The supporting chunk id
    /// is always folded into `evidence_ids`; re-ingestion unions mentions
    /// and evidence instead of duplicating the claim.
    pub async fn upsert(
        db: &SurrealDbClient,
        ctx: &ActiveContext,
        draft: ClaimDraft,
    ) -> Result<Self, AppError> {
        let id = Self::id_for(ctx, &draft);

        let mut evidence_ids: Vec<String> = Vec::new();
        if let Some(chunk_id) = &draft.chunk_id {
            evidence_ids.push(chunk_id.clone());
        }

        if let Some(mut existing) = db.get_item::<Self>(&id).await? {
            if !existing.on_branches.contains(&ctx.branch_id) {
                existing.on_branches.push(ctx.branch_id.clone());
            }
            for concept_id in &draft.mentioned_concept_ids {
                if !existing.mentioned_concept_ids.contains(concept_id) {
                    existing.mentioned_concept_ids.push(concept_id.clone());
                }
            }
            for evidence in &evidence_ids {
                if !existing.evidence_ids.contains(evidence) {
                    existing.evidence_ids.push(evidence.clone());
                }
            }
            if existing.embedding.is_none() {
                existing.embedding = draft.embedding.clone();
            }
            existing.updated_at = Utc::now();
            let updated: Option<Self> = db
                .client
                .query("UPDATE type::thing('claim', $id) CONTENT $content RETURN AFTER")
                .bind(("id", id.clone()))
                .bind(("content", existing))
                .await?
                .take(0)?;
            return updated
                .ok_or_else(|| AppError::InternalError("claim update returned nothing".into()));
        }

        let now = Utc::now();
        let claim = Self {
            id,
            created_at: now,
            updated_at: now,
            graph_id: ctx.graph_id.clone(),
            text: draft.text,
            confidence: draft.confidence,
            method: draft.method,
            source_id: draft.source_id,
            source_span: draft.source_span,
            chunk_id: draft.chunk_id,
            embedding: draft.embedding,
            status: ClaimStatus::Proposed,
            evidence_ids,
            mentioned_concept_ids: draft.mentioned_concept_ids,
            ingestion_run_id: draft.run_id,
            on_branches: vec![ctx.branch_id.clone()],
        };
        db.store_item(claim.clone()).await?;
        Ok(claim)
    }

    pub async fn get_scoped(
        db: &SurrealDbClient,
        ctx: &ActiveContext,
        claim_id: &str,
    ) -> Result<Option<Self>, AppError> {
        let claim: Option<Self> = db.get_item(claim_id).await?;
        Ok(claim
            .filter(|c| c.graph_id == ctx.graph_id && c.on_branches.contains(&ctx.branch_id)))
    }

    pub async fn get_many(
        db: &SurrealDbClient,
        ctx: &ActiveContext,
        claim_ids: &[String],
    ) -> Result<Vec<Self>, AppError> {
        if claim_ids.is_empty() {
            return Ok(Vec::new());
        }
        let things: Vec<surrealdb::RecordId> = claim_ids
            .iter()
            .map(|id| surrealdb::RecordId::from_table_key(Self::table_name(), id))
            .collect();
        let sql = format!("SELECT * FROM claim WHERE {READ_FILTER} AND id IN $things ORDER BY id ASC");
        let mut response = db
            .client
            .query(sql)
            .bind(("graph_id", ctx.graph_id.clone()))
            .bind(("branch_id", ctx.branch_id.clone()))
            .bind(("things", things))
            .await?;
        Ok(response.take(0)?)
    }

    /// Candidate claims for a set of communities in one batched query:
    /// every claim mentioning any member concept of any of the communities,
    /// grouped per community afterwards. Ordering inside each bucket is
    /// confidence desc with claim id as the deterministic tiebreak.
    pub async fn for_communities(
        db: &SurrealDbClient,
        ctx: &ActiveContext,
        community_members: &[(String, Vec<String>)],
        strictness: EvidenceStrictness,
        limit_per_community: usize,
    ) -> Result<BTreeMap<String, Vec<Self>>, AppError> {
        let mut buckets: BTreeMap<String, Vec<Self>> = BTreeMap::new();
        if community_members.is_empty() {
            return Ok(buckets);
        }

        let all_member_ids: Vec<String> = community_members
            .iter()
            .flat_map(|(_, members)| members.iter().cloned())
            .collect();
        if all_member_ids.is_empty() {
            return Ok(buckets);
        }

        let sql = format!(
            "SELECT * FROM claim WHERE {READ_FILTER} \
             AND mentioned_concept_ids CONTAINSANY $member_ids \
             ORDER BY id ASC"
        );
        let mut response = db
            .client
            .query(sql)
            .bind(("graph_id", ctx.graph_id.clone()))
            .bind(("branch_id", ctx.branch_id.clone()))
            .bind(("member_ids", all_member_ids))
            .await?;
        let mut claims: Vec<Self> = response.take(0)?;
        claims.retain(|c| strictness.admits(c.status, c.confidence));

        for (community_id, members) in community_members {
            let mut bucket: Vec<Self> = claims
                .iter()
                .filter(|c| c.mentioned_concept_ids.iter().any(|m| members.contains(m)))
                .cloned()
                .collect();
            bucket.sort_by(|a, b| {
                b.confidence
                    .partial_cmp(&a.confidence)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.id.cmp(&b.id))
            });
            bucket.truncate(limit_per_community);
            buckets.insert(community_id.clone(), bucket);
        }

        Ok(buckets)
    }

    /// All branch-visible claims carrying an embedding.
    pub async fn list_with_embeddings(
        db: &SurrealDbClient,
        ctx: &ActiveContext,
    ) -> Result<Vec<Self>, AppError> {
        let sql =
            format!("SELECT * FROM claim WHERE {READ_FILTER} AND embedding != NONE ORDER BY id ASC");
        let mut response = db
            .client
            .query(sql)
            .bind(("graph_id", ctx.graph_id.clone()))
            .bind(("branch_id", ctx.branch_id.clone()))
            .await?;
        Ok(response.take(0)?)
    }

    /// Claims touched at or after `since`, for change feeds.
    pub async fn list_updated_since(
        db: &SurrealDbClient,
        ctx: &ActiveContext,
        since: DateTime<Utc>,
    ) -> Result<Vec<Self>, AppError> {
        let sql = format!(
            "SELECT * FROM claim WHERE {READ_FILTER} AND updated_at >= $since ORDER BY id ASC"
        );
        let mut response = db
            .client
            .query(sql)
            .bind(("graph_id", ctx.graph_id.clone()))
            .bind(("branch_id", ctx.branch_id.clone()))
            .bind(("since", surrealdb::sql::Datetime::from(since)))
            .await?;
        Ok(response.take(0)?)
    }

    pub async fn set_status(
        db: &SurrealDbClient,
        ctx: &ActiveContext,
        claim_id: &str,
        status: ClaimStatus,
    ) -> Result<(), AppError> {
        db.client
            .query(
                "UPDATE type::thing('claim', $id) \
                 SET status = $status, updated_at = time::now() \
                 WHERE graph_id = $graph_id AND $branch_id IN on_branches",
            )
            .bind(("id", claim_id.to_owned()))
            .bind(("status", status))
            .bind(("graph_id", ctx.graph_id.clone()))
            .bind(("branch_id", ctx.branch_id.clone()))
            .await?
            .check()?;
        Ok(())
    }

    /// Attach a quote as evidence: id joins `evidence_ids`, deduped.
    pub async fn add_quote_evidence(
        db: &SurrealDbClient,
        ctx: &ActiveContext,
        claim_id: &str,
        quote_id: &str,
    ) -> Result<(), AppError> {
        let claim = Self::get_scoped(db, ctx, claim_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("claim {claim_id}")))?;
        if claim.evidence_ids.iter().any(|e| e == quote_id) {
            return Ok(());
        }
        db.client
            .query(
                "UPDATE type::thing('claim', $id) \
                 SET evidence_ids += $quote_id, updated_at = time::now()",
            )
            .bind(("id", claim_id.to_owned()))
            .bind(("quote_id", quote_id.to_owned()))
            .await?
            .check()?;
        Ok(())
    }

    /// Undo support: pull the active branch out of every claim the run
    /// produced. The records stay for other branches and audit.
    pub async fn retract_branch_by_run(
        db: &SurrealDbClient,
        ctx: &ActiveContext,
        run_id: &str,
    ) -> Result<usize, AppError> {
        let sql = format!(
            "SELECT * FROM claim WHERE {READ_FILTER} AND ingestion_run_id = $run_id ORDER BY id ASC"
        );
        let mut response = db
            .client
            .query(sql)
            .bind(("graph_id", ctx.graph_id.clone()))
            .bind(("branch_id", ctx.branch_id.clone()))
            .bind(("run_id", run_id.to_owned()))
            .await?;
        let claims: Vec<Self> = response.take(0)?;
        let count = claims.len();
        for claim in &claims {
            db.client
                .query(
                    "UPDATE type::thing('claim', $id) \
                     SET on_branches -= $branch_id, updated_at = time::now()",
                )
                .bind(("id", claim.id.clone()))
                .bind(("branch_id", ctx.branch_id.clone()))
                .await?
                .check()?;
        }
        Ok(count)
    }
}
