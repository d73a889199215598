//! Shared machinery for the retrieval plans: the service handle each plan
//! receives, community/claim fetch helpers, and compare-target extraction.

use std::cmp::Ordering;

use common::{
    error::AppError,
    llm::{CompletionOptions, ModelRouter, TaskType},
    storage::{
        db::SurrealDbClient,
        scope::ActiveContext,
        types::{
            claim::{Claim, EvidenceStrictness},
            relationship::IncludeProposed,
            source_chunk::SourceChunk,
        },
    },
    utils::embedding::{cosine_similarity, EmbeddingProvider},
};
use regex::Regex;
use tracing::debug;

use crate::{
    community_index::{semantic_search_communities, ScoredCommunity},
    subgraph::get_evidence_subgraph,
    views::{ChunkView, CommunityView},
};

use super::Subgraph;

const COMPARE_TARGET_MIN_CONFIDENCE: f32 = 0.65;

/// Handle passed into every plan: store access, active scope, optional LLM
/// and embedder, and the pre-computed query embedding.
pub struct PlanServices<'a> {
    pub db: &'a SurrealDbClient,
    pub ctx: &'a ActiveContext,
    pub router: Option<&'a ModelRouter>,
    pub embedder: Option<&'a EmbeddingProvider>,
    pub query_embedding: Option<Vec<f32>>,
    pub include_proposed: IncludeProposed,
    pub proposed_threshold: f32,
}

impl PlanServices<'_> {
    pub fn query_vec(&self) -> Option<&[f32]> {
        self.query_embedding.as_deref()
    }

    /// Embed an arbitrary sub-query (compare targets), falling back to the
    /// main query vector when no embedder is wired.
    pub async fn embed_or_query_vec(&self, text: &str) -> Option<Vec<f32>> {
        match self.embedder {
            Some(embedder) => embedder.embed_query(text).await,
            None => self.query_embedding.clone(),
        }
    }
}

pub async fn focus_communities(
    services: &PlanServices<'_>,
    query_vec: Option<&[f32]>,
    k: usize,
) -> Result<Vec<ScoredCommunity>, AppError> {
    semantic_search_communities(services.db, services.ctx, query_vec, k).await
}

pub fn community_views(communities: &[ScoredCommunity]) -> Vec<CommunityView> {
    communities
        .iter()
        .map(|c| CommunityView::from_community(&c.community, Some(1200)))
        .collect()
}

/// Claims for the given communities, flattened in community-rank order,
/// deduped by id. Plans read low-strictness by default; the GraphRAG
/// engine owns the strictness dial.
pub async fn claims_for_communities(
    services: &PlanServices<'_>,
    communities: &[ScoredCommunity],
    limit_per: usize,
) -> Result<Vec<Claim>, AppError> {
    let members: Vec<(String, Vec<String>)> = communities
        .iter()
        .map(|c| (c.community.id.clone(), c.community.member_concept_ids.clone()))
        .collect();
    let buckets = Claim::for_communities(
        services.db,
        services.ctx,
        &members,
        EvidenceStrictness::Low,
        limit_per,
    )
    .await?;

    let mut flattened: Vec<Claim> = Vec::new();
    for community in communities {
        if let Some(bucket) = buckets.get(&community.community.id) {
            for claim in bucket {
                if !flattened.iter().any(|c| c.id == claim.id) {
                    flattened.push(claim.clone());
                }
            }
        }
    }
    Ok(flattened)
}

/// Top claims by query-embedding similarity, score desc with id tiebreak.
pub async fn top_claims_by_embedding(
    services: &PlanServices<'_>,
    limit: usize,
) -> Result<Vec<Claim>, AppError> {
    let Some(query) = services.query_vec() else {
        return Ok(Vec::new());
    };
    let pool = Claim::list_with_embeddings(services.db, services.ctx).await?;
    let mut scored: Vec<(f32, Claim)> = pool
        .into_iter()
        .map(|claim| {
            let score = claim
                .embedding
                .as_deref()
                .map(|e| cosine_similarity(query, e))
                .unwrap_or(0.0);
            (score, claim)
        })
        .collect();
    scored.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.1.id.cmp(&b.1.id))
    });
    Ok(scored.into_iter().take(limit).map(|(_, c)| c).collect())
}

pub async fn fetch_chunks(
    services: &PlanServices<'_>,
    claims: &[Claim],
    take: usize,
) -> Result<Vec<ChunkView>, AppError> {
    let chunk_ids: Vec<String> = claims
        .iter()
        .take(take)
        .filter_map(|c| c.chunk_id.clone())
        .collect();
    let chunks = SourceChunk::get_many(services.db, services.ctx, &chunk_ids).await?;
    Ok(chunks
        .iter()
        .map(|chunk| ChunkView {
            chunk_id: chunk.id.clone(),
            source_id: chunk.source_id.clone(),
            chunk_index: chunk.chunk_index,
            text: chunk.text.clone(),
        })
        .collect())
}

pub async fn build_subgraph(
    services: &PlanServices<'_>,
    claims: &[Claim],
    take: usize,
    max_concepts: usize,
) -> Result<Subgraph, AppError> {
    let claim_ids: Vec<String> = claims.iter().take(take).map(|c| c.id.clone()).collect();
    let evidence = get_evidence_subgraph(
        services.db,
        services.ctx,
        &claim_ids,
        Some(max_concepts),
        Some(super::FULL_SUBGRAPH_EDGES),
        services.include_proposed,
        services.proposed_threshold,
    )
    .await?;
    Ok(Subgraph {
        concepts: evidence.concepts,
        edges: evidence.edges,
    })
}

fn clean_compare_target(value: &str) -> String {
    let trimmed = value
        .trim()
        .trim_matches(|c: char| "\"'`".contains(c))
        .trim_matches(|c: char| " \t\n\r.,;:!?".contains(c));
    trimmed.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn dedupe_targets(raw: &[&str]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut seen: Vec<String> = Vec::new();
    for candidate in raw {
        let cleaned = clean_compare_target(candidate);
        if cleaned.is_empty() {
            continue;
        }
        let key = cleaned.to_lowercase();
        if seen.contains(&key) {
            continue;
        }
        seen.push(key);
        out.push(cleaned);
        if out.len() >= 2 {
            break;
        }
    }
    out
}

async fn extract_compare_targets_llm(
    router: Option<&ModelRouter>,
    query: &str,
) -> Vec<String> {
    let Some(router) = router else {
        return Vec::new();
    };

    let schema = serde_json::json!({
        "type": "object",
        "properties": {
            "target_a": {"type": ["string", "null"]},
            "target_b": {"type": ["string", "null"]},
            "is_compare": {"type": "boolean"},
            "confidence": {"type": "number"}
        },
        "required": ["target_a", "target_b", "is_compare", "confidence"],
        "additionalProperties": false
    });
    let system = "Extract the two entities/topics being compared in the query. \
        If the query is not a comparison request, set is_compare=false and the targets to null. \
        Do not invent entities. Keep targets concise and normalized.";

    let raw = match router
        .completion_json_schema(
            TaskType::Extract,
            system,
            serde_json::json!({"query": query}).to_string(),
            "compare_targets",
            schema,
            CompletionOptions {
                temperature: Some(0.0),
                max_tokens: Some(120),
                ..CompletionOptions::default()
            },
        )
        .await
    {
        Ok(raw) => raw,
        Err(err) => {
            debug!(error = %err, "compare target extraction via LLM failed");
            return Vec::new();
        }
    };

    let Some(parsed) = json_salvage_parse(&raw) else {
        return Vec::new();
    };
    if parsed.get("is_compare").and_then(|v| v.as_bool()) == Some(false) {
        return Vec::new();
    }
    let confidence = parsed
        .get("confidence")
        .and_then(|v| v.as_f64())
        .unwrap_or(0.0) as f32;
    if confidence < COMPARE_TARGET_MIN_CONFIDENCE {
        return Vec::new();
    }
    let a = parsed.get("target_a").and_then(|v| v.as_str()).unwrap_or("");
    let b = parsed.get("target_b").and_then(|v| v.as_str()).unwrap_or("");
    dedupe_targets(&[a, b])
}

fn json_salvage_parse(raw: &str) -> Option<serde_json::Value> {
    serde_json::from_str(raw)
        .ok()
        .or_else(|| json_salvage::salvage_objects(raw).into_iter().next())
}

pub fn extract_compare_targets_regex(query: &str) -> Vec<String> {
    let patterns = [
        r"(?i)(.+?)\s+(?:vs\.?|versus)\s+(.+)",
        r"(?i)\bcompare\s+(.+?)\s+(?:and|to|with)\s+(.+)",
        r"(?i)\bdifference\s+between\s+(.+?)\s+and\s+(.+)",
    ];
    for pattern in patterns {
        #[allow(clippy::unwrap_used)]
        let re = Regex::new(pattern).unwrap();
        if let Some(caps) = re.captures(query.trim()) {
            let a = caps.get(1).map(|m| m.as_str()).unwrap_or("");
            let b = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            let targets = dedupe_targets(&[a, b]);
            if targets.len() >= 2 {
                return targets;
            }
        }
    }
    Vec::new()
}

/// LLM → regex → semantic-hit ladder for compare targets. Returns the
/// targets plus the method that produced them.
pub async fn identify_compare_targets(
    services: &PlanServices<'_>,
    query: &str,
) -> Result<(Vec<String>, &'static str), AppError> {
    let llm_targets = extract_compare_targets_llm(services.router, query).await;
    if llm_targets.len() >= 2 {
        return Ok((llm_targets, "llm"));
    }

    let regex_targets = extract_compare_targets_regex(query);
    if regex_targets.len() >= 2 {
        return Ok((regex_targets, "regex"));
    }

    let hits = crate::community_index::semantic_search_concepts(
        services.db,
        services.ctx,
        services.query_vec(),
        2,
    )
    .await?;
    let names: Vec<&str> = hits.iter().map(|h| h.concept.name.as_str()).collect();
    Ok((dedupe_targets(&names), "semantic"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regex_compare_patterns() {
        assert_eq!(
            extract_compare_targets_regex("transformers vs RNNs"),
            vec!["transformers".to_owned(), "RNNs".to_owned()]
        );
        assert_eq!(
            extract_compare_targets_regex("Compare gradient descent and Newton's method"),
            vec!["gradient descent".to_owned(), "Newton's method".to_owned()]
        );
        assert_eq!(
            extract_compare_targets_regex("what is the difference between TCP and UDP?"),
            vec!["TCP".to_owned(), "UDP".to_owned()]
        );
        assert!(extract_compare_targets_regex("what is entropy?").is_empty());
    }

    #[test]
    fn test_target_cleaning_and_dedupe() {
        assert_eq!(
            dedupe_targets(&["  \"Entropy\"  ", "entropy", "Enthalpy"]),
            vec!["Entropy".to_owned(), "Enthalpy".to_owned()]
        );
        assert!(dedupe_targets(&["", "   "]).is_empty());
    }
}
