//! LLM concept/relationship extraction: one structured call per source
//! returning `{nodes, links, structure?}`, with balanced-object salvage
//! when the model's JSON does not parse.

use common::{
    error::AppError,
    llm::{CompletionOptions, ModelRouter, TaskType},
};
use serde::Deserialize;
use tracing::warn;

/// Links below this confidence are dropped before they reach the store.
pub const MIN_LINK_CONFIDENCE: f32 = 0.5;

pub const EXTRACTION_SYSTEM_MESSAGE: &str = "You are a knowledge-graph extraction engine. \
Given source material, extract the concepts it teaches and the relationships between them. \
Return JSON with `nodes` (name, domain, type, description, tags, aliases) and `links` \
(source, target, predicate, confidence, rationale). Use concept names as link endpoints. \
Prefer predicates DEPENDS_ON, PREREQUISITE_FOR, RELATED_TO, CAUSES, PART_OF. \
Do not invent concepts that are not in the material.";

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ExtractedNode {
    pub name: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default, rename = "type")]
    pub node_type: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ExtractedLink {
    pub source: String,
    pub target: String,
    #[serde(alias = "type")]
    pub predicate: String,
    #[serde(default = "default_confidence")]
    pub confidence: f32,
    #[serde(default)]
    pub rationale: Option<String>,
}

fn default_confidence() -> f32 {
    0.5
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExtractionResult {
    #[serde(default)]
    pub nodes: Vec<ExtractedNode>,
    #[serde(default)]
    pub links: Vec<ExtractedLink>,
    #[serde(default)]
    pub structure: Option<serde_json::Value>,
}

pub fn extraction_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "nodes": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "name": {"type": "string"},
                        "domain": {"type": ["string", "null"]},
                        "type": {"type": ["string", "null"]},
                        "description": {"type": "string"},
                        "tags": {"type": "array", "items": {"type": "string"}},
                        "aliases": {"type": "array", "items": {"type": "string"}}
                    },
                    "required": ["name", "domain", "type", "description", "tags", "aliases"],
                    "additionalProperties": false
                }
            },
            "links": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "source": {"type": "string"},
                        "target": {"type": "string"},
                        "predicate": {"type": "string"},
                        "confidence": {"type": "number"},
                        "rationale": {"type": ["string", "null"]}
                    },
                    "required": ["source", "target", "predicate", "confidence", "rationale"],
                    "additionalProperties": false
                }
            }
        },
        "required": ["nodes", "links"],
        "additionalProperties": false
    })
}

/// Parse the model output. Invalid JSON falls back to salvaging balanced
/// objects: the first salvaged object shaped like a result wins, else
/// node-shaped objects are collected individually.
pub fn parse_extraction(raw: &str) -> Result<ExtractionResult, AppError> {
    if let Ok(result) = serde_json::from_str::<ExtractionResult>(raw) {
        if !result.nodes.is_empty() || !result.links.is_empty() {
            return Ok(result);
        }
    }

    let salvaged = json_salvage::salvage_objects(raw);
    for object in &salvaged {
        if object.get("nodes").is_some() || object.get("links").is_some() {
            if let Ok(result) = serde_json::from_value::<ExtractionResult>(object.clone()) {
                if !result.nodes.is_empty() || !result.links.is_empty() {
                    warn!("extraction JSON was invalid, recovered result object");
                    return Ok(result);
                }
            }
        }
    }

    // Last resort: individual node-shaped objects scattered in the text.
    let nodes: Vec<ExtractedNode> = salvaged
        .iter()
        .filter(|o| o.get("name").is_some())
        .filter_map(|o| serde_json::from_value(o.clone()).ok())
        .collect();
    if !nodes.is_empty() {
        warn!(count = nodes.len(), "recovered loose node objects from extraction output");
        return Ok(ExtractionResult {
            nodes,
            links: Vec::new(),
            structure: None,
        });
    }

    Err(AppError::LLMParsing(
        "no extractable nodes or links in model output".into(),
    ))
}

/// One extraction call over the full source text.
pub async fn extract_concepts(
    router: &ModelRouter,
    text: &str,
    domain: Option<&str>,
    known_concepts: &[String],
) -> Result<ExtractionResult, AppError> {
    let user_message = serde_json::json!({
        "domain": domain,
        "known_concepts": known_concepts,
        "text": text,
    })
    .to_string();

    let raw = router
        .completion_json_schema(
            TaskType::Extract,
            EXTRACTION_SYSTEM_MESSAGE,
            user_message,
            "graph_extraction",
            extraction_schema(),
            CompletionOptions {
                temperature: Some(0.0),
                ..CompletionOptions::default()
            },
        )
        .await?;

    parse_extraction(&raw)
}
