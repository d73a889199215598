//! WHAT_CHANGED: claims touched within the window, split into new vs
//! updated, with their evidence subgraph.

use chrono::{Duration, Utc};
use common::{error::AppError, storage::types::claim::Claim};

use crate::views::ClaimView;

use super::{
    empty_result,
    helpers::{self, PlanServices},
    ChangeDeltas, Intent, PlanContext, RetrievalResult, TraceStep,
};

pub async fn run(
    services: &PlanServices<'_>,
    _query: &str,
    since_days: i64,
) -> Result<RetrievalResult, AppError> {
    let mut trace: Vec<TraceStep> = Vec::new();
    let cutoff = Utc::now() - Duration::days(since_days.max(0));

    trace.push(TraceStep::new(
        "query_recent_claims",
        serde_json::json!({"since_days": since_days}),
    ));
    let mut claims = Claim::list_updated_since(services.db, services.ctx, cutoff).await?;
    claims.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
    claims.truncate(50);
    if let Some(step) = trace.last_mut() {
        step.counts = serde_json::json!({"claims": claims.len()});
    }

    if claims.is_empty() {
        return Ok(empty_result(
            Intent::WhatChanged,
            trace,
            &format!("No claims updated in last {since_days} days"),
        ));
    }

    trace.push(TraceStep::new("retrieve_chunks_and_concepts", serde_json::json!({})));
    let chunks = helpers::fetch_chunks(services, &claims, claims.len()).await?;
    let subgraph = helpers::build_subgraph(services, &claims, claims.len(), 30).await?;
    if let Some(step) = trace.last_mut() {
        step.counts = serde_json::json!({
            "chunks": chunks.len(),
            "concepts": subgraph.concepts.len(),
        });
    }

    trace.push(TraceStep::new("classify_changes", serde_json::json!({})));
    let mut new_claims: Vec<ClaimView> = Vec::new();
    let mut updated_claims: Vec<ClaimView> = Vec::new();
    for claim in &claims {
        let view = ClaimView::from_claim(claim, None);
        if claim.created_at >= cutoff {
            new_claims.push(view);
        } else {
            updated_claims.push(view);
        }
    }
    if let Some(step) = trace.last_mut() {
        step.counts = serde_json::json!({
            "new_claims": new_claims.len(),
            "updated_claims": updated_claims.len(),
        });
    }

    new_claims.truncate(15);
    updated_claims.truncate(15);

    Ok(RetrievalResult {
        intent: Intent::WhatChanged.as_str().to_owned(),
        trace,
        context: PlanContext {
            focus_entities: subgraph.concepts.iter().take(15).cloned().collect(),
            claims: claims
                .iter()
                .take(30)
                .map(|c| ClaimView::from_claim(c, None))
                .collect(),
            chunks: Some(chunks.into_iter().take(20).collect()),
            subgraph,
            deltas: Some(ChangeDeltas {
                new_claims,
                updated_claims,
                new_concepts: Vec::new(),
            }),
            ..PlanContext::default()
        },
    })
}
