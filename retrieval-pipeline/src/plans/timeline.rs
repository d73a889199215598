//! TIMELINE: claims across three communities with timestamps pulled from
//! chunk metadata, else a year found in the chunk text, else "unknown".
//! Items sort ascending with unknowns last.

use std::collections::HashMap;

use common::error::AppError;
use regex::Regex;

use crate::views::{ChunkView, ClaimView};

use super::{
    empty_result,
    helpers::{self, PlanServices},
    Intent, PlanContext, RetrievalResult, Suggestion, TimelineItem, TraceStep,
};

pub async fn run(services: &PlanServices<'_>, query: &str) -> Result<RetrievalResult, AppError> {
    let mut trace: Vec<TraceStep> = Vec::new();

    trace.push(TraceStep::new("retrieve_communities", serde_json::json!({"k": 3})));
    let communities = helpers::focus_communities(services, services.query_vec(), 3).await?;
    if let Some(step) = trace.last_mut() {
        step.counts = serde_json::json!({"communities": communities.len()});
    }
    if communities.is_empty() {
        return Ok(empty_result(Intent::Timeline, trace, "No results found"));
    }

    trace.push(TraceStep::new("retrieve_claims", serde_json::json!({"limit_per": 20})));
    let claims = helpers::claims_for_communities(services, &communities, 20).await?;
    if let Some(step) = trace.last_mut() {
        step.counts = serde_json::json!({"claims": claims.len()});
    }
    if claims.is_empty() {
        return Ok(empty_result(Intent::Timeline, trace, "No results found"));
    }

    trace.push(TraceStep::new("fetch_chunks", serde_json::json!({})));
    let chunks = helpers::fetch_chunks(services, &claims, claims.len()).await?;
    if let Some(step) = trace.last_mut() {
        step.counts = serde_json::json!({"chunks": chunks.len()});
    }

    trace.push(TraceStep::new("extract_timestamps", serde_json::json!({})));
    let chunk_map: HashMap<&str, &ChunkView> =
        chunks.iter().map(|c| (c.chunk_id.as_str(), c)).collect();
    let raw_chunks =
        common::storage::types::source_chunk::SourceChunk::get_many(
            services.db,
            services.ctx,
            &chunks.iter().map(|c| c.chunk_id.clone()).collect::<Vec<_>>(),
        )
        .await?;
    let metadata_map: HashMap<&str, &serde_json::Value> = raw_chunks
        .iter()
        .filter_map(|c| c.metadata.as_ref().map(|m| (c.id.as_str(), m)))
        .collect();

    let mut timeline_items: Vec<TimelineItem> = claims
        .iter()
        .map(|claim| {
            let chunk_id = claim.chunk_id.as_deref();
            let date = chunk_id
                .and_then(|id| extract_date(metadata_map.get(id).copied(), chunk_map.get(id).map(|c| c.text.as_str())))
                .unwrap_or_else(|| "unknown".to_owned());
            TimelineItem {
                date,
                claim_id: claim.id.clone(),
                text: claim.text.clone(),
                chunk_id: claim.chunk_id.clone(),
                source_id: claim.source_id.clone(),
            }
        })
        .collect();
    timeline_items.sort_by(|a, b| {
        let key = |item: &TimelineItem| {
            if item.date == "unknown" {
                "9999".to_owned()
            } else {
                item.date.clone()
            }
        };
        key(a).cmp(&key(b)).then_with(|| a.claim_id.cmp(&b.claim_id))
    });
    if let Some(step) = trace.last_mut() {
        step.counts = serde_json::json!({"timeline_items": timeline_items.len()});
    }

    trace.push(TraceStep::new(
        "build_evidence_subgraph",
        serde_json::json!({"max_concepts": 25}),
    ));
    let subgraph = helpers::build_subgraph(services, &claims, 25, 25).await?;
    if let Some(step) = trace.last_mut() {
        step.counts = serde_json::json!({
            "concepts": subgraph.concepts.len(),
            "edges": subgraph.edges.len(),
        });
    }

    timeline_items.truncate(30);

    Ok(RetrievalResult {
        intent: Intent::Timeline.as_str().to_owned(),
        trace,
        context: PlanContext {
            focus_entities: subgraph.concepts.iter().take(15).cloned().collect(),
            focus_communities: helpers::community_views(&communities),
            claims: claims
                .iter()
                .take(20)
                .map(|c| ClaimView::from_claim(c, None))
                .collect(),
            chunks: Some(chunks.into_iter().take(20).collect()),
            subgraph,
            timeline_items: Some(timeline_items),
            suggestions: vec![
                Suggestion {
                    label: "Causal Chain".into(),
                    query: format!("What caused {query}?"),
                    intent: Intent::CausalChain.as_str().into(),
                },
                Suggestion {
                    label: "Who Network".into(),
                    query: format!("Who was involved in {query}?"),
                    intent: Intent::WhoNetwork.as_str().into(),
                },
            ],
            ..PlanContext::default()
        },
    })
}

/// metadata.published_at/date/timestamp wins; otherwise the first
/// 19xx/20xx year in the chunk text.
fn extract_date(metadata: Option<&serde_json::Value>, text: Option<&str>) -> Option<String> {
    if let Some(metadata) = metadata {
        for key in ["published_at", "date", "timestamp"] {
            if let Some(found) = metadata.get(key).and_then(|v| v.as_str()) {
                if !found.is_empty() {
                    return Some(found.to_owned());
                }
            }
        }
    }
    let text = text?;
    #[allow(clippy::unwrap_used)]
    let year = Regex::new(r"\b(19|20)\d{2}\b").unwrap();
    year.find(text).map(|m| m.as_str().to_owned())
}
