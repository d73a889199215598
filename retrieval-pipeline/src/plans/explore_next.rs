//! EXPLORE_NEXT: run DEFINITION_OVERVIEW, re-rank its concepts by
//! degree·novelty, and emit follow-up query suggestions.

use std::collections::HashMap;

use common::error::AppError;

use crate::views::{ConceptView, EdgeView};

use super::{
    definition_overview,
    helpers::PlanServices,
    Intent, PlanContext, RetrievalResult, Suggestion, TraceStep,
};

pub async fn run(services: &PlanServices<'_>, query: &str) -> Result<RetrievalResult, AppError> {
    let mut trace: Vec<TraceStep> = Vec::new();

    trace.push(TraceStep::new("run_definition_overview", serde_json::json!({})));
    let overview = definition_overview::run(services, query).await?;
    if let Some(step) = trace.last_mut() {
        step.counts = serde_json::json!({
            "concepts": overview.context.focus_entities.len(),
            "claims": overview.context.claims.len(),
        });
    }

    let subgraph = overview.context.subgraph.clone();

    trace.push(TraceStep::new("rank_next_nodes", serde_json::json!({})));
    let ranked = rank_for_exploration(&subgraph.concepts, &subgraph.edges, query);
    if let Some(step) = trace.last_mut() {
        step.counts = serde_json::json!({"ranked_concepts": ranked.len()});
    }

    trace.push(TraceStep::new("generate_suggestions", serde_json::json!({})));
    let suggestions: Vec<Suggestion> = ranked
        .iter()
        .take(5)
        .map(|concept| Suggestion {
            label: format!("Explore {}", concept.name),
            query: format!("What is {}?", concept.name),
            intent: Intent::DefinitionOverview.as_str().into(),
        })
        .collect();
    if let Some(step) = trace.last_mut() {
        step.counts = serde_json::json!({"suggestions": suggestions.len()});
    }

    Ok(RetrievalResult {
        intent: Intent::ExploreNext.as_str().to_owned(),
        trace,
        context: PlanContext {
            focus_entities: ranked.into_iter().take(15).collect(),
            focus_communities: overview.context.focus_communities,
            claims: overview.context.claims.into_iter().take(15).collect(),
            chunks: overview
                .context
                .chunks
                .map(|chunks| chunks.into_iter().take(10).collect()),
            subgraph,
            suggestions,
            ..PlanContext::default()
        },
    })
}

/// degree × novelty, where novelty penalizes concepts already named in the
/// query. Ties break by node id.
fn rank_for_exploration(
    concepts: &[ConceptView],
    edges: &[EdgeView],
    query: &str,
) -> Vec<ConceptView> {
    let mut degree: HashMap<&str, usize> = HashMap::new();
    for edge in edges {
        *degree.entry(edge.source_id.as_str()).or_insert(0) += 1;
        *degree.entry(edge.target_id.as_str()).or_insert(0) += 1;
    }
    let query_lower = query.to_lowercase();

    let mut ranked: Vec<(f64, &ConceptView)> = concepts
        .iter()
        .map(|concept| {
            let d = degree.get(concept.node_id.as_str()).copied().unwrap_or(0) as f64;
            let novelty = if query_lower.contains(&concept.name.to_lowercase()) {
                0.25
            } else {
                1.0
            };
            ((d + 1.0) * novelty, concept)
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.1.node_id.cmp(&b.1.node_id))
    });
    ranked.into_iter().map(|(_, c)| c.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn concept(id: &str, name: &str) -> ConceptView {
        ConceptView {
            node_id: id.into(),
            name: name.into(),
            domain: None,
            concept_type: None,
            description: None,
            tags: Vec::new(),
            resource_captions: Vec::new(),
        }
    }

    #[test]
    fn test_degree_and_novelty_ranking() {
        let concepts = vec![
            concept("a", "Entropy"),
            concept("b", "Cross Entropy"),
            concept("c", "KL Divergence"),
        ];
        let edges = vec![
            EdgeView {
                source_id: "b".into(),
                target_id: "c".into(),
                predicate: "RELATED_TO".into(),
            },
            EdgeView {
                source_id: "b".into(),
                target_id: "a".into(),
                predicate: "RELATED_TO".into(),
            },
        ];

        let ranked = rank_for_exploration(&concepts, &edges, "what is entropy?");
        // "Entropy" is penalized for already appearing in the query; the
        // highest-degree novel concept leads.
        assert_eq!(ranked[0].node_id, "b");
        assert_eq!(ranked.last().map(|c| c.node_id.as_str()), Some("a"));
    }
}
