//! Intent-dispatched retrieval plans.
//!
//! A thin dispatcher selects one of nine plans by intent tag. Every plan
//! records a trace of steps with parameter and count snapshots; the trace
//! is part of the result. Responses are shaped per detail level after the
//! plan runs, so the caps live in exactly one place.

mod causal_chain;
mod compare;
mod definition_overview;
mod evidence_check;
mod explore_next;
pub mod helpers;
mod self_knowledge;
mod timeline;
mod what_changed;
mod who_network;

use common::error::AppError;
use serde::{Deserialize, Serialize};

use crate::views::{ChunkView, ClaimView, CommunityView, ConceptView, EdgeView};

pub use helpers::PlanServices;

pub const SUMMARY_FOCUS_ENTITIES: usize = 5;
pub const SUMMARY_TOP_CLAIMS: usize = 5;
pub const SUMMARY_TOP_SOURCES: usize = 3;
pub const SUMMARY_PREVIEW_EDGES: usize = 10;
pub const SUMMARY_TRACE_STEPS: usize = 10;
pub const SUMMARY_CLAIM_TEXT_CHARS: usize = 200;
pub const META_CLAIM_IDS: usize = 20;
pub const META_COMMUNITY_IDS: usize = 10;
pub const FULL_CLAIMS: usize = 20;
pub const FULL_SUBGRAPH_EDGES: usize = 50;
pub const FULL_CHUNKS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Intent {
    DefinitionOverview,
    Timeline,
    CausalChain,
    Compare,
    WhoNetwork,
    EvidenceCheck,
    ExploreNext,
    WhatChanged,
    SelfKnowledge,
}

impl Intent {
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some("TIMELINE") => Self::Timeline,
            Some("CAUSAL_CHAIN") => Self::CausalChain,
            Some("COMPARE") => Self::Compare,
            Some("WHO_NETWORK") => Self::WhoNetwork,
            Some("EVIDENCE_CHECK") => Self::EvidenceCheck,
            Some("EXPLORE_NEXT") => Self::ExploreNext,
            Some("WHAT_CHANGED") => Self::WhatChanged,
            Some("SELF_KNOWLEDGE") => Self::SelfKnowledge,
            _ => Self::DefinitionOverview,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DefinitionOverview => "DEFINITION_OVERVIEW",
            Self::Timeline => "TIMELINE",
            Self::CausalChain => "CAUSAL_CHAIN",
            Self::Compare => "COMPARE",
            Self::WhoNetwork => "WHO_NETWORK",
            Self::EvidenceCheck => "EVIDENCE_CHECK",
            Self::ExploreNext => "EXPLORE_NEXT",
            Self::WhatChanged => "WHAT_CHANGED",
            Self::SelfKnowledge => "SELF_KNOWLEDGE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DetailLevel {
    #[default]
    Summary,
    Full,
}

impl DetailLevel {
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(str::trim).map(str::to_lowercase).as_deref() {
            Some("full") => Self::Full,
            _ => Self::Summary,
        }
    }
}

/// One recorded plan step: what ran, with which parameters, what came back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceStep {
    pub step: String,
    pub params: serde_json::Value,
    pub counts: serde_json::Value,
}

impl TraceStep {
    pub fn new(step: &str, params: serde_json::Value) -> Self {
        Self {
            step: step.to_owned(),
            params,
            counts: serde_json::json!({}),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Suggestion {
    pub label: String,
    pub query: String,
    pub intent: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Subgraph {
    pub concepts: Vec<ConceptView>,
    pub edges: Vec<EdgeView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubgraphPreview {
    pub concepts: Vec<ConceptView>,
    pub edges: Vec<EdgeView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineItem {
    pub date: String,
    pub claim_id: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_id: Option<String>,
    pub source_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkEdge {
    pub source_id: String,
    pub target_id: String,
    pub predicate: String,
    pub is_outgoing: bool,
    pub status: String,
    pub confidence: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceBreakdown {
    pub supporting: Vec<ClaimView>,
    pub conflicting: Vec<ClaimView>,
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeDeltas {
    pub new_claims: Vec<ClaimView>,
    pub updated_claims: Vec<ClaimView>,
    pub new_concepts: Vec<ConceptView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompareOverlaps {
    pub shared_concepts: Vec<ConceptView>,
    pub shared_communities: Vec<CommunityView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompareDifferences {
    pub unique_to_a: Vec<ConceptView>,
    pub unique_to_b: Vec<ConceptView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompareOutcome {
    pub target_a: String,
    pub target_b: String,
    pub method: String,
    pub overlaps: CompareOverlaps,
    pub differences: CompareDifferences,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalMeta {
    pub communities: usize,
    pub claims: usize,
    pub concepts: usize,
    pub edges: usize,
    #[serde(rename = "claimIds")]
    pub claim_ids: Vec<String>,
    #[serde(rename = "communityIds")]
    pub community_ids: Vec<String>,
    #[serde(rename = "topClaims")]
    pub top_claims: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanContext {
    pub focus_entities: Vec<ConceptView>,
    pub focus_communities: Vec<CommunityView>,
    pub claims: Vec<ClaimView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_claims: Option<Vec<ClaimView>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_sources: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunks: Option<Vec<ChunkView>>,
    pub subgraph: Subgraph,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subgraph_preview: Option<SubgraphPreview>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeline_items: Option<Vec<TimelineItem>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_edges: Option<Vec<NetworkEdge>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence: Option<EvidenceBreakdown>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deltas: Option<ChangeDeltas>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compare: Option<CompareOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retrieval_meta: Option<RetrievalMeta>,
    pub suggestions: Vec<Suggestion>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub intent: String,
    pub trace: Vec<TraceStep>,
    pub context: PlanContext,
}

/// Everything a plan invocation can be tuned with.
#[derive(Debug, Clone)]
pub struct PlanOptions {
    pub limit: usize,
    pub detail_level: DetailLevel,
    pub since_days: i64,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            limit: 5,
            detail_level: DetailLevel::Summary,
            since_days: 30,
        }
    }
}

/// Shared empty-result shape: no data, a warning, the trace so far.
pub(crate) fn empty_result(intent: Intent, trace: Vec<TraceStep>, warning: &str) -> RetrievalResult {
    RetrievalResult {
        intent: intent.as_str().to_owned(),
        trace,
        context: PlanContext {
            warnings: vec![warning.to_owned()],
            ..PlanContext::default()
        },
    }
}

/// Dispatch a query to its plan, then shape the result for the requested
/// detail level.
pub async fn run_plan(
    services: &PlanServices<'_>,
    query: &str,
    intent: Intent,
    options: &PlanOptions,
) -> Result<RetrievalResult, AppError> {
    let mut result = match intent {
        Intent::DefinitionOverview => definition_overview::run(services, query).await?,
        Intent::Timeline => timeline::run(services, query).await?,
        Intent::CausalChain => causal_chain::run(services, query).await?,
        Intent::Compare => compare::run(services, query).await?,
        Intent::WhoNetwork => who_network::run(services, query).await?,
        Intent::EvidenceCheck => evidence_check::run(services, query).await?,
        Intent::ExploreNext => explore_next::run(services, query).await?,
        Intent::WhatChanged => what_changed::run(services, query, options.since_days).await?,
        Intent::SelfKnowledge => self_knowledge::run(services, query, options.limit).await?,
    };
    apply_detail_level(&mut result, options.detail_level);
    Ok(result)
}

/// Enforce the response-detail contract. Summary strips bulk (chunks,
/// summaries, full claim texts) and adds `retrieval_meta` with full-length
/// id lists; full keeps bodies under the larger caps.
pub fn apply_detail_level(result: &mut RetrievalResult, detail: DetailLevel) {
    let context = &mut result.context;

    let meta = RetrievalMeta {
        communities: context.focus_communities.len(),
        claims: context.claims.len(),
        concepts: context.subgraph.concepts.len(),
        edges: context.subgraph.edges.len(),
        claim_ids: context
            .claims
            .iter()
            .take(META_CLAIM_IDS)
            .map(|c| c.claim_id.clone())
            .collect(),
        community_ids: context
            .focus_communities
            .iter()
            .take(META_COMMUNITY_IDS)
            .map(|c| c.community_id.clone())
            .collect(),
        top_claims: context
            .claims
            .iter()
            .take(SUMMARY_TOP_CLAIMS)
            .map(|c| c.claim_id.clone())
            .collect(),
    };
    context.retrieval_meta = Some(meta);

    match detail {
        DetailLevel::Summary => {
            context.focus_entities.truncate(SUMMARY_FOCUS_ENTITIES);
            for entity in &mut context.focus_entities {
                entity.description = None;
                entity.tags.clear();
                entity.resource_captions.clear();
            }
            for community in &mut context.focus_communities {
                community.summary = None;
            }

            let mut top_claims: Vec<ClaimView> = context
                .claims
                .iter()
                .take(SUMMARY_TOP_CLAIMS)
                .cloned()
                .collect();
            for claim in &mut top_claims {
                claim.text = crate::views::truncate_chars(&claim.text, SUMMARY_CLAIM_TEXT_CHARS);
            }
            let mut top_sources: Vec<String> = Vec::new();
            for claim in &context.claims {
                if !top_sources.contains(&claim.source_id) {
                    top_sources.push(claim.source_id.clone());
                }
                if top_sources.len() >= SUMMARY_TOP_SOURCES {
                    break;
                }
            }
            context.top_claims = Some(top_claims);
            context.top_sources = Some(top_sources);
            context.claims.clear();
            context.chunks = None;

            let preview = SubgraphPreview {
                concepts: context
                    .subgraph
                    .concepts
                    .iter()
                    .take(SUMMARY_FOCUS_ENTITIES)
                    .map(|c| ConceptView {
                        description: None,
                        tags: Vec::new(),
                        resource_captions: Vec::new(),
                        ..c.clone()
                    })
                    .collect(),
                edges: context
                    .subgraph
                    .edges
                    .iter()
                    .take(SUMMARY_PREVIEW_EDGES)
                    .cloned()
                    .collect(),
            };
            context.subgraph = Subgraph::default();
            context.subgraph_preview = Some(preview);

            result.trace.truncate(SUMMARY_TRACE_STEPS);
        }
        DetailLevel::Full => {
            context.claims.truncate(FULL_CLAIMS);
            context.subgraph.edges.truncate(FULL_SUBGRAPH_EDGES);
            if let Some(chunks) = &mut context.chunks {
                chunks.truncate(FULL_CHUNKS);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::storage::db::SurrealDbClient;
    use common::storage::scope::{resolve_active_context, ActiveContext};
    use common::storage::types::claim::{Claim, ClaimDraft};
    use common::storage::types::community::Community;
    use common::storage::types::concept::{Concept, ConceptDraft};
    use common::storage::types::relationship::IncludeProposed;

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

    fn services<'a>(
        db: &'a SurrealDbClient,
        ctx: &'a ActiveContext,
        query_embedding: Option<Vec<f32>>,
    ) -> PlanServices<'a> {
        PlanServices {
            db,
            ctx,
            router: None,
            embedder: None,
            query_embedding,
            include_proposed: IncludeProposed::Auto,
            proposed_threshold: 0.6,
        }
    }

    /// Populate communities, concepts and claims wide enough to exceed
    /// every summary cap.
    async fn seed_populated(db: &SurrealDbClient, ctx: &ActiveContext) {
        let mut concept_ids = Vec::new();
        for i in 0..15 {
            let id = Concept::upsert(
                db,
                ctx,
                ConceptDraft {
                    name: format!("Concept {i:02}"),
                    description: format!("description {i}"),
                    embedding: Some(vec![1.0, 0.0, i as f32 * 0.01]),
                    ..ConceptDraft::default()
                },
            )
            .await
            .expect("concept")
            .concept
            .id;
            concept_ids.push(id);
        }

        for i in 0..10 {
            let mut community = Community::new(
                ctx,
                format!("comm-{i:02}"),
                format!("Community {i}"),
                format!("summary of community {i}"),
                Some(vec![1.0, 0.0, i as f32 * 0.02]),
                None,
            );
            community.member_concept_ids = concept_ids.clone();
            Community::upsert(db, ctx, community).await.expect("community");
        }

        for i in 0..20 {
            Claim::upsert(
                db,
                ctx,
                ClaimDraft {
                    text: format!("claim number {i:02} about machine learning"),
                    confidence: 0.5 + (i as f32) * 0.02,
                    method: "llm".into(),
                    source_id: format!("source-{}", i % 6),
                    chunk_id: Some(format!("chunk-{i}")),
                    embedding: Some(vec![1.0, 0.0, i as f32 * 0.03]),
                    mentioned_concept_ids: vec![
                        concept_ids[i % concept_ids.len()].clone(),
                        concept_ids[(i + 1) % concept_ids.len()].clone(),
                    ],
                    ..ClaimDraft::default()
                },
            )
            .await
            .expect("claim");
        }
    }

    #[tokio::test]
    async fn test_empty_store_definition_overview_summary() {
        let (db, ctx) = scoped_db().await;
        let svc = services(&db, &ctx, Some(vec![1.0, 0.0, 0.0]));

        let result = run_plan(
            &svc,
            "What is machine learning?",
            Intent::DefinitionOverview,
            &PlanOptions::default(),
        )
        .await
        .expect("plan");

        assert_eq!(result.intent, "DEFINITION_OVERVIEW");
        assert!(result.context.focus_entities.is_empty());
        assert!(result
            .context
            .warnings
            .contains(&"No results found".to_owned()));
        assert!(result.trace.len() <= SUMMARY_TRACE_STEPS);
        assert!(result.context.retrieval_meta.is_some());
    }

    #[tokio::test]
    async fn test_summary_caps_on_populated_store() {
        let (db, ctx) = scoped_db().await;
        seed_populated(&db, &ctx).await;
        let svc = services(&db, &ctx, Some(vec![1.0, 0.0, 0.0]));

        let result = run_plan(
            &svc,
            "What is machine learning?",
            Intent::DefinitionOverview,
            &PlanOptions::default(),
        )
        .await
        .expect("plan");

        let context = &result.context;
        assert!(context.focus_entities.len() <= SUMMARY_FOCUS_ENTITIES);
        assert!(context.focus_entities.iter().all(|e| e.description.is_none()));
        let top_claims = context.top_claims.as_ref().expect("top_claims");
        assert!(top_claims.len() <= SUMMARY_TOP_CLAIMS);
        assert!(top_claims
            .iter()
            .all(|c| c.text.chars().count() <= SUMMARY_CLAIM_TEXT_CHARS + 1));
        let top_sources = context.top_sources.as_ref().expect("top_sources");
        assert!(top_sources.len() <= SUMMARY_TOP_SOURCES);
        let preview = context.subgraph_preview.as_ref().expect("preview");
        assert!(preview.edges.len() <= SUMMARY_PREVIEW_EDGES);
        assert!(context.chunks.is_none(), "summary carries no chunks");
        assert!(context
            .focus_communities
            .iter()
            .all(|c| c.summary.is_none()));
        assert!(result.trace.len() <= SUMMARY_TRACE_STEPS);

        let meta = context.retrieval_meta.as_ref().expect("meta");
        assert!(meta.claim_ids.len() <= META_CLAIM_IDS);
        assert!(meta.community_ids.len() <= META_COMMUNITY_IDS);

        let serialized = serde_json::to_string(&result).expect("serialize");
        assert!(serialized.len() < 100_000, "summary payload stays small");
    }

    #[tokio::test]
    async fn test_full_detail_caps() {
        let (db, ctx) = scoped_db().await;
        seed_populated(&db, &ctx).await;
        let svc = services(&db, &ctx, Some(vec![1.0, 0.0, 0.0]));

        let result = run_plan(
            &svc,
            "What is machine learning?",
            Intent::DefinitionOverview,
            &PlanOptions {
                detail_level: DetailLevel::Full,
                ..PlanOptions::default()
            },
        )
        .await
        .expect("plan");

        let context = &result.context;
        assert!(context.claims.len() <= FULL_CLAIMS);
        assert!(context.subgraph.edges.len() <= FULL_SUBGRAPH_EDGES);
        if let Some(chunks) = &context.chunks {
            assert!(chunks.len() <= FULL_CHUNKS);
        }
        // full mode preserves community summaries
        assert!(context.focus_communities.iter().any(|c| c.summary.is_some()));
    }

    #[tokio::test]
    async fn test_plan_runs_are_deterministic() {
        let (db, ctx) = scoped_db().await;
        seed_populated(&db, &ctx).await;
        let svc = services(&db, &ctx, Some(vec![1.0, 0.0, 0.0]));

        let ids = |result: &RetrievalResult| {
            let meta = result.context.retrieval_meta.clone().expect("meta");
            (meta.claim_ids, meta.community_ids)
        };

        let first = run_plan(&svc, "ml", Intent::DefinitionOverview, &PlanOptions::default())
            .await
            .expect("first");
        let second = run_plan(&svc, "ml", Intent::DefinitionOverview, &PlanOptions::default())
            .await
            .expect("second");
        assert_eq!(ids(&first), ids(&second));
    }

    #[test]
    fn test_intent_parse_defaults() {
        assert_eq!(Intent::parse(None), Intent::DefinitionOverview);
        assert_eq!(Intent::parse(Some("TIMELINE")), Intent::Timeline);
        assert_eq!(Intent::parse(Some("bogus")), Intent::DefinitionOverview);
    }
}
