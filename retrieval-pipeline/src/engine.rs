//! Community-anchored GraphRAG retrieval.
//!
//! question → communities → candidate claims → relevance scoring → MMR →
//! path-based evidence subgraph → context bundle. Every degradation path
//! (no vector, no communities, no claims) produces a structured bundle,
//! never an error.

use std::collections::{BTreeMap, HashMap};

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        scope::ActiveContext,
        types::{
            artifact::Artifact,
            claim::{Claim, ClaimStatus, EvidenceStrictness},
            concept::Concept,
            relationship::{ConceptRelationship, IncludeProposed},
        },
    },
    utils::embedding::{cosine_similarity, EmbeddingProvider},
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    community_index::{semantic_search_communities, semantic_search_concepts},
    mmr::{self, MmrCandidate},
    paths::{shortest_path_edges, PathEdge, DEFAULT_MAX_HOPS},
    views::{ClaimView, CommunityView, ConceptView, EdgeView},
};

pub const DEFAULT_COMMUNITY_K: usize = 5;
pub const DEFAULT_CLAIMS_PER_COMMUNITY: usize = 12;
pub const MAX_SELECTED_CLAIMS: usize = 40;
pub const MAX_PATH_QUERIES: usize = 10;
pub const MAX_SUBGRAPH_EDGES: usize = 80;
pub const MAX_SUBGRAPH_CONCEPTS: usize = 25;
const TOP_MENTIONED_CANDIDATES: usize = 30;
const ANCHOR_SEARCH_LIMIT: usize = 10;
const TWO_ENTITY_SCORE_FLOOR: f32 = 0.35;
const COMMUNITY_SUMMARY_CHARS: usize = 1200;
const CONCEPT_DESCRIPTION_CHARS: usize = 400;
const RESOURCE_CAPTIONS_PER_CONCEPT: usize = 2;

#[derive(Debug, Clone)]
pub struct GraphRagParams {
    pub community_k: usize,
    pub claims_per_community: usize,
    pub strictness: EvidenceStrictness,
    pub include_proposed: IncludeProposed,
    pub proposed_threshold: f32,
    pub lambda: f32,
}

impl Default for GraphRagParams {
    fn default() -> Self {
        Self {
            community_k: DEFAULT_COMMUNITY_K,
            claims_per_community: DEFAULT_CLAIMS_PER_COMMUNITY,
            strictness: EvidenceStrictness::default(),
            include_proposed: IncludeProposed::default(),
            proposed_threshold: 0.6,
            lambda: mmr::DEFAULT_LAMBDA,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrievalDebug {
    pub anchor_ids: Vec<String>,
    pub selected_claim_ids: Vec<String>,
    pub community_ids: Vec<String>,
    pub candidate_count: usize,
    pub path_queries: usize,
    pub strictness: String,
    pub question_vector_present: bool,
    pub is_two_entity: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextBundle {
    pub communities: Vec<CommunityView>,
    pub claims: Vec<ClaimView>,
    pub concepts: Vec<ConceptView>,
    pub edges: Vec<EdgeView>,
    pub has_evidence: bool,
    pub warnings: Vec<String>,
    pub debug: RetrievalDebug,
}

#[derive(Debug, Clone, Default)]
pub struct AnchorDetection {
    pub anchor_ids: Vec<String>,
    pub is_two_entity: bool,
}

/// Embed the question, then run the vector-injected variant. Embedding
/// failure degrades to the vector-less path.
pub async fn retrieve_context(
    db: &SurrealDbClient,
    ctx: &ActiveContext,
    embedder: &EmbeddingProvider,
    question: &str,
    params: &GraphRagParams,
) -> Result<ContextBundle, AppError> {
    let question_vector = embedder.embed_query(question).await;
    retrieve_context_with_embedding(db, ctx, question, question_vector, params).await
}

/// The engine proper, with the question vector supplied by the caller.
pub async fn retrieve_context_with_embedding(
    db: &SurrealDbClient,
    ctx: &ActiveContext,
    question: &str,
    question_vector: Option<Vec<f32>>,
    params: &GraphRagParams,
) -> Result<ContextBundle, AppError> {
    let q_vec = question_vector.as_deref();

    // Anchor detection over concept semantic search.
    let anchors = detect_anchors(db, ctx, question, q_vec).await?;

    // Community retrieval.
    let communities =
        semantic_search_communities(db, ctx, q_vec, params.community_k).await?;
    let community_ids: Vec<String> =
        communities.iter().map(|c| c.community.id.clone()).collect();

    // Candidate claims, one batched fetch across all communities.
    let members: Vec<(String, Vec<String>)> = communities
        .iter()
        .map(|c| (c.community.id.clone(), c.community.member_concept_ids.clone()))
        .collect();
    let buckets = Claim::for_communities(
        db,
        ctx,
        &members,
        params.strictness,
        params.claims_per_community,
    )
    .await?;

    // Flatten in community-rank order, deduping by claim id.
    let mut candidates: Vec<Claim> = Vec::new();
    for community_id in &community_ids {
        if let Some(bucket) = buckets.get(community_id) {
            for claim in bucket {
                if !candidates.iter().any(|c| c.id == claim.id) {
                    candidates.push(claim.clone());
                }
            }
        }
    }

    let mut debug = RetrievalDebug {
        anchor_ids: anchors.anchor_ids.clone(),
        community_ids: community_ids.clone(),
        candidate_count: candidates.len(),
        strictness: params.strictness.as_str().to_owned(),
        question_vector_present: q_vec.is_some(),
        is_two_entity: anchors.is_two_entity,
        ..RetrievalDebug::default()
    };

    // No-evidence exit: structured bundle, not an error.
    if candidates.is_empty() {
        let communities_view: Vec<CommunityView> = communities
            .iter()
            .map(|c| CommunityView::from_community(&c.community, Some(COMMUNITY_SUMMARY_CHARS)))
            .collect();
        let bundle = ContextBundle {
            communities: communities_view,
            has_evidence: false,
            warnings: vec!["no_claims_found".to_owned()],
            debug,
            ..ContextBundle::default()
        };
        emit_telemetry(ctx, question, &bundle);
        return Ok(bundle);
    }

    // Relevance scoring.
    let scores: Vec<f32> = candidates
        .iter()
        .map(|claim| relevance_score(claim, q_vec, &anchors))
        .collect();

    // Diversity selection.
    let target = params
        .community_k
        .saturating_mul(params.claims_per_community)
        .min(MAX_SELECTED_CLAIMS);
    let pool: Vec<MmrCandidate> = candidates
        .iter()
        .zip(scores.iter())
        .map(|(claim, &relevance)| MmrCandidate {
            relevance,
            embedding: claim.embedding.clone(),
        })
        .collect();
    let selected_indices = mmr::select(&pool, target, params.lambda);
    let selected: Vec<&Claim> = selected_indices
        .iter()
        .filter_map(|&i| candidates.get(i))
        .collect();
    debug.selected_claim_ids = selected.iter().map(|c| c.id.clone()).collect();

    // Evidence subgraph around anchors and heavily-mentioned concepts.
    let (concept_views, edges, path_queries) =
        build_evidence_subgraph(db, ctx, &anchors, &selected, params).await?;
    debug.path_queries = path_queries;

    // Assembly.
    let name_by_id: HashMap<String, String> = concept_views
        .iter()
        .map(|c| (c.node_id.clone(), c.name.clone()))
        .collect();
    let claims_view: Vec<ClaimView> = selected
        .iter()
        .map(|claim| {
            let mut view = ClaimView::from_claim(claim, None);
            view.mentioned_concepts = claim
                .mentioned_concept_ids
                .iter()
                .map(|id| name_by_id.get(id).cloned().unwrap_or_else(|| id.clone()))
                .collect();
            view
        })
        .collect();

    let has_evidence = selected.len() >= 3
        || selected.iter().any(|c| c.status == ClaimStatus::Verified);

    let bundle = ContextBundle {
        communities: communities
            .iter()
            .map(|c| CommunityView::from_community(&c.community, Some(COMMUNITY_SUMMARY_CHARS)))
            .collect(),
        claims: claims_view,
        concepts: concept_views,
        edges,
        has_evidence,
        warnings: Vec::new(),
        debug,
    };
    emit_telemetry(ctx, question, &bundle);
    Ok(bundle)
}

fn emit_telemetry(ctx: &ActiveContext, question: &str, bundle: &ContextBundle) {
    info!(
        graph_id = %ctx.graph_id,
        branch_id = %ctx.branch_id,
        question = %question,
        communities = bundle.communities.len(),
        claims = bundle.claims.len(),
        concepts = bundle.concepts.len(),
        edges = bundle.edges.len(),
        has_evidence = bundle.has_evidence,
        community_ids = ?bundle.debug.community_ids,
        claim_ids = ?bundle.debug.selected_claim_ids,
        "graphrag retrieval"
    );
}

/// `0.75·sim(question, claim) + 0.25·confidence`, plus a capped boost when
/// a two-entity question's anchors appear among the claim's mentions.
fn relevance_score(claim: &Claim, q_vec: Option<&[f32]>, anchors: &AnchorDetection) -> f32 {
    let sim_q = match (q_vec, claim.embedding.as_deref()) {
        (Some(q), Some(e)) => cosine_similarity(q, e),
        _ => 0.0,
    };
    let base = 0.75 * sim_q + 0.25 * claim.confidence;
    let boost = if anchors.is_two_entity {
        let hits = anchors
            .anchor_ids
            .iter()
            .filter(|a| claim.mentioned_concept_ids.contains(a))
            .count();
        (0.10 * hits as f32).min(0.20)
    } else {
        0.0
    };
    base + boost
}

/// Resolve anchor concepts for the question: quoted substrings matched
/// against the top concept hits, else the top hits themselves.
pub async fn detect_anchors(
    db: &SurrealDbClient,
    ctx: &ActiveContext,
    question: &str,
    q_vec: Option<&[f32]>,
) -> Result<AnchorDetection, AppError> {
    let top = semantic_search_concepts(db, ctx, q_vec, ANCHOR_SEARCH_LIMIT).await?;
    let is_two_entity = top
        .iter()
        .filter(|hit| hit.score > TWO_ENTITY_SCORE_FLOOR)
        .count()
        >= 2;

    let mut anchor_ids: Vec<String> = Vec::new();
    for quote in quoted_substrings(question) {
        let needle = quote.to_lowercase();
        if let Some(hit) = top
            .iter()
            .find(|hit| hit.concept.name.to_lowercase().contains(&needle))
        {
            if !anchor_ids.contains(&hit.concept.id) {
                anchor_ids.push(hit.concept.id.clone());
            }
        }
    }

    if anchor_ids.is_empty() {
        let take = if is_two_entity { 2 } else { 3 };
        anchor_ids = top
            .iter()
            .take(take)
            .map(|hit| hit.concept.id.clone())
            .collect();
    }

    Ok(AnchorDetection {
        anchor_ids,
        is_two_entity,
    })
}

fn quoted_substrings(question: &str) -> Vec<String> {
    #[allow(clippy::unwrap_used)]
    let pattern = Regex::new(r#""([^"]+)"|'([^']+)'"#).unwrap();
    pattern
        .captures_iter(question)
        .filter_map(|caps| {
            caps.get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str().trim().to_owned())
        })
        .filter(|s| !s.is_empty())
        .collect()
}

/// Anchor-pair and anchor-to-candidate shortest paths, aggregated with the
/// most-mentioned concepts, capped and hydrated.
async fn build_evidence_subgraph(
    db: &SurrealDbClient,
    ctx: &ActiveContext,
    anchors: &AnchorDetection,
    selected: &[&Claim],
    params: &GraphRagParams,
) -> Result<(Vec<ConceptView>, Vec<EdgeView>, usize), AppError> {
    // Mention frequency across selected claims; count desc, id asc.
    let mut mention_counts: BTreeMap<String, usize> = BTreeMap::new();
    for claim in selected {
        for concept_id in &claim.mentioned_concept_ids {
            *mention_counts.entry(concept_id.clone()).or_insert(0) += 1;
        }
    }
    let mut by_frequency: Vec<(String, usize)> = mention_counts.into_iter().collect();
    by_frequency.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    let top_mentioned: Vec<String> = by_frequency
        .iter()
        .take(TOP_MENTIONED_CANDIDATES)
        .map(|(id, _)| id.clone())
        .collect();

    let anchor_ids: Vec<String> = if anchors.anchor_ids.is_empty() {
        let take = if anchors.is_two_entity { 2 } else { 3 };
        top_mentioned.iter().take(take).cloned().collect()
    } else {
        anchors.anchor_ids.clone()
    };

    let mut path_edges: Vec<PathEdge> = Vec::new();
    let mut path_queries = 0usize;

    // Anchor pairs first.
    'pairs: for i in 0..anchor_ids.len() {
        for j in (i + 1)..anchor_ids.len() {
            if path_queries >= MAX_PATH_QUERIES {
                break 'pairs;
            }
            path_queries += 1;
            let found = shortest_path_edges(
                db,
                ctx,
                &anchor_ids[i],
                &anchor_ids[j],
                DEFAULT_MAX_HOPS,
                params.include_proposed,
                params.proposed_threshold,
            )
            .await?;
            for edge in found {
                if !path_edges.contains(&edge) {
                    path_edges.push(edge);
                }
            }
        }
    }

    // Then anchors toward the strongest candidate concepts.
    'candidates: for candidate in top_mentioned.iter().take(5) {
        for anchor in &anchor_ids {
            if path_queries >= MAX_PATH_QUERIES {
                break 'candidates;
            }
            if anchor == candidate {
                continue;
            }
            path_queries += 1;
            let found = shortest_path_edges(
                db,
                ctx,
                anchor,
                candidate,
                DEFAULT_MAX_HOPS,
                params.include_proposed,
                params.proposed_threshold,
            )
            .await?;
            for edge in found {
                if !path_edges.contains(&edge) {
                    path_edges.push(edge);
                }
            }
        }
    }

    // Aggregate node set: anchors, path endpoints, top mentioned.
    let mut node_ids: Vec<String> = Vec::new();
    let mut push_unique = |id: &String, out: &mut Vec<String>| {
        if !out.contains(id) {
            out.push(id.clone());
        }
    };
    for id in &anchor_ids {
        push_unique(id, &mut node_ids);
    }
    for edge in &path_edges {
        push_unique(&edge.source_id, &mut node_ids);
        push_unique(&edge.target_id, &mut node_ids);
    }
    for id in &top_mentioned {
        push_unique(id, &mut node_ids);
    }
    node_ids.truncate(MAX_SUBGRAPH_CONCEPTS);

    let concepts = Concept::get_many(db, ctx, &node_ids).await?;
    let present_ids: Vec<String> = concepts.iter().map(|c| c.id.clone()).collect();

    // Edges: shortest-path edges first, then any other edges among the set.
    let mut edges: Vec<EdgeView> = path_edges
        .iter()
        .filter(|e| present_ids.contains(&e.source_id) && present_ids.contains(&e.target_id))
        .map(|e| EdgeView {
            source_id: e.source_id.clone(),
            target_id: e.target_id.clone(),
            predicate: e.predicate.clone(),
        })
        .collect();
    let among = ConceptRelationship::edges_among(
        db,
        ctx,
        &present_ids,
        params.include_proposed,
        params.proposed_threshold,
    )
    .await?;
    for edge in &among {
        let view = EdgeView::from_relationship(edge);
        if !edges.contains(&view) {
            edges.push(view);
        }
    }
    edges.truncate(MAX_SUBGRAPH_EDGES);

    let captions = Artifact::captions_for_concepts(
        db,
        ctx,
        &present_ids,
        RESOURCE_CAPTIONS_PER_CONCEPT,
    )
    .await?;
    let views: Vec<ConceptView> = concepts
        .iter()
        .map(|concept| {
            let mut view = ConceptView::from_concept(concept, Some(CONCEPT_DESCRIPTION_CHARS));
            if let Some(found) = captions.get(&concept.id) {
                view.resource_captions = found.clone();
            }
            view
        })
        .collect();

    Ok((views, edges, path_queries))
}
