//! Optional second pass for lectures and videos: segment the source into
//! ordered sections with covered concepts and analogies. Tolerant to
//! truncated output: the partial-JSON parser recovers well-formed segment
//! objects before giving up.

use common::{
    error::AppError,
    llm::{CompletionOptions, ModelRouter, TaskType},
};
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const SEGMENT_SYSTEM_MESSAGE: &str = "Segment the source into ordered sections. Return JSON: \
{\"segments\": [{\"title\", \"order\", \"summary\", \"covered_concepts\", \"analogies\"}]}. \
covered_concepts must use names from the supplied concept list.";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Segment {
    pub title: String,
    #[serde(default)]
    pub order: i64,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub covered_concepts: Vec<String>,
    #[serde(default)]
    pub analogies: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SegmentEnvelope {
    #[serde(default)]
    segments: Vec<Segment>,
}

fn segment_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "segments": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "title": {"type": "string"},
                        "order": {"type": "integer"},
                        "summary": {"type": "string"},
                        "covered_concepts": {"type": "array", "items": {"type": "string"}},
                        "analogies": {"type": "array", "items": {"type": "string"}}
                    },
                    "required": ["title", "order", "summary", "covered_concepts", "analogies"],
                    "additionalProperties": false
                }
            }
        },
        "required": ["segments"],
        "additionalProperties": false
    })
}

/// Parse segments from model output, recovering from truncation. Segments
/// come back ordered by their `order` field with title as tiebreak.
pub fn parse_segments(raw: &str) -> Vec<Segment> {
    let mut segments: Vec<Segment> = if let Ok(envelope) =
        serde_json::from_str::<SegmentEnvelope>(raw)
    {
        envelope.segments
    } else if let Some(recovered) = json_salvage::parse_partial(raw) {
        serde_json::from_value::<SegmentEnvelope>(recovered)
            .map(|e| e.segments)
            .unwrap_or_default()
    } else {
        Vec::new()
    };

    if segments.is_empty() {
        // Truncation mangled the envelope; fish for loose segment objects.
        segments = json_salvage::salvage_objects(raw)
            .into_iter()
            .filter(|o| o.get("title").is_some())
            .filter_map(|o| serde_json::from_value(o).ok())
            .collect();
        if !segments.is_empty() {
            warn!(count = segments.len(), "recovered segments from truncated output");
        }
    }

    segments.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.title.cmp(&b.title)));
    segments
}

pub async fn segment_source(
    router: &ModelRouter,
    text: &str,
    concept_names: &[String],
) -> Result<Vec<Segment>, AppError> {
    let user_message = serde_json::json!({
        "concepts": concept_names,
        "text": text,
    })
    .to_string();

    let raw = router
        .completion_json_schema(
            TaskType::Extract,
            SEGMENT_SYSTEM_MESSAGE,
            user_message,
            "source_segments",
            segment_schema(),
            CompletionOptions {
                temperature: Some(0.0),
                ..CompletionOptions::default()
            },
        )
        .await?;

    Ok(parse_segments(&raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ordered_segments() {
        let raw = r#"{"segments": [
            {"title": "Wrap up", "order": 2, "summary": "", "covered_concepts": [], "analogies": []},
            {"title": "Intro", "order": 1, "summary": "", "covered_concepts": ["Entropy"], "analogies": ["coin flips"]}
        ]}"#;
        let segments = parse_segments(raw);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].title, "Intro");
        assert_eq!(segments[0].covered_concepts, vec!["Entropy".to_owned()]);
    }

    #[test]
    fn test_parse_truncated_segments() {
        let raw = r#"{"segments": [
            {"title": "Intro", "order": 1, "summary": "s", "covered_concepts": [], "analogies": []},
            {"title": "Middle", "order": 2, "summary": "cut of"#;
        let segments = parse_segments(raw);
        assert!(!segments.is_empty(), "truncated output must still yield the complete segments");
        assert_eq!(segments[0].title, "Intro");
    }

    #[test]
    fn test_parse_hopeless_output() {
        assert!(parse_segments("no segments at all").is_empty());
    }
}
