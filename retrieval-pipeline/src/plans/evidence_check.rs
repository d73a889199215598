//! EVIDENCE_CHECK: top claims by query similarity, split into supporting
//! and conflicting by a naive negation heuristic, with a source-diversity
//! count.

use common::error::AppError;

use crate::views::ClaimView;

use super::{
    empty_result,
    helpers::{self, PlanServices},
    EvidenceBreakdown, Intent, PlanContext, RetrievalResult, TraceStep,
};

const NEGATION_WORDS: [&str; 9] = [
    "not", "no", "never", "none", "cannot", "doesn't", "don't", "isn't", "wasn't",
];

fn has_negation(text: &str) -> bool {
    let lower = text.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .collect();
    NEGATION_WORDS.iter().any(|n| words.contains(n))
}

pub async fn run(services: &PlanServices<'_>, _query: &str) -> Result<RetrievalResult, AppError> {
    let mut trace: Vec<TraceStep> = Vec::new();

    trace.push(TraceStep::new(
        "retrieve_claims_by_embedding",
        serde_json::json!({"limit": 25}),
    ));
    let claims = helpers::top_claims_by_embedding(services, 25).await?;
    if let Some(step) = trace.last_mut() {
        step.counts = serde_json::json!({"claims": claims.len()});
    }
    if claims.is_empty() {
        return Ok(empty_result(Intent::EvidenceCheck, trace, "No results found"));
    }

    trace.push(TraceStep::new("fetch_chunks", serde_json::json!({})));
    let chunks = helpers::fetch_chunks(services, &claims, claims.len()).await?;
    if let Some(step) = trace.last_mut() {
        step.counts = serde_json::json!({"chunks": chunks.len()});
    }

    trace.push(TraceStep::new("compute_source_diversity", serde_json::json!({})));
    let mut sources: Vec<String> = Vec::new();
    for claim in &claims {
        if !sources.contains(&claim.source_id) {
            sources.push(claim.source_id.clone());
        }
    }
    if let Some(step) = trace.last_mut() {
        step.counts = serde_json::json!({"unique_sources": sources.len()});
    }

    trace.push(TraceStep::new("classify_claims", serde_json::json!({})));
    let mut supporting: Vec<ClaimView> = Vec::new();
    let mut conflicting: Vec<ClaimView> = Vec::new();
    for claim in &claims {
        let view = ClaimView::from_claim(claim, None);
        if has_negation(&claim.text) {
            conflicting.push(view);
        } else {
            supporting.push(view);
        }
    }
    if let Some(step) = trace.last_mut() {
        step.counts = serde_json::json!({
            "supporting": supporting.len(),
            "conflicting": conflicting.len(),
        });
    }

    trace.push(TraceStep::new("build_evidence_subgraph", serde_json::json!({})));
    let subgraph = helpers::build_subgraph(services, &claims, 30, 30).await?;
    if let Some(step) = trace.last_mut() {
        step.counts = serde_json::json!({
            "concepts": subgraph.concepts.len(),
            "edges": subgraph.edges.len(),
        });
    }

    supporting.truncate(15);
    conflicting.truncate(10);
    sources.truncate(10);

    Ok(RetrievalResult {
        intent: Intent::EvidenceCheck.as_str().to_owned(),
        trace,
        context: PlanContext {
            focus_entities: subgraph.concepts.iter().take(15).cloned().collect(),
            claims: claims
                .iter()
                .take(25)
                .map(|c| ClaimView::from_claim(c, None))
                .collect(),
            chunks: Some(chunks),
            subgraph,
            evidence: Some(EvidenceBreakdown {
                supporting,
                conflicting,
                sources,
            }),
            ..PlanContext::default()
        },
    })
}
