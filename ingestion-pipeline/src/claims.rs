//! Chunk-level claim extraction: a bounded worker pool calls the LLM and
//! the embedder per chunk concurrently, results are joined and re-sorted
//! by chunk index before the single-threaded write phase.

use common::{
    error::AppError,
    llm::{CompletionOptions, ModelRouter, TaskType},
    utils::embedding::EmbeddingProvider,
};
use futures::{stream, StreamExt};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::chunking::ChunkPiece;

pub const CLAIM_WORKERS: usize = 5;

pub const CLAIM_SYSTEM_MESSAGE: &str = "You extract atomic, source-cited claims from a text chunk. \
Each claim is one verifiable assertion, grounded in the chunk, mentioning concepts from the \
supplied list where applicable. Return JSON: {\"claims\": [{\"text\", \"confidence\", \
\"mentioned_concepts\"}]}. Do not include claims the chunk does not state.";

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ExtractedClaim {
    pub text: String,
    #[serde(default = "default_confidence")]
    pub confidence: f32,
    #[serde(default)]
    pub mentioned_concepts: Vec<String>,
}

fn default_confidence() -> f32 {
    0.5
}

#[derive(Debug, Default, Deserialize)]
struct ClaimEnvelope {
    #[serde(default)]
    claims: Vec<ExtractedClaim>,
}

/// One chunk's worth of extracted claims, carrying the index the write
/// phase sorts by.
#[derive(Debug, Clone)]
pub struct ChunkClaims {
    pub chunk_index: i64,
    pub claims: Vec<(ExtractedClaim, Option<Vec<f32>>)>,
}

pub fn claim_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "claims": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "text": {"type": "string"},
                        "confidence": {"type": "number"},
                        "mentioned_concepts": {"type": "array", "items": {"type": "string"}}
                    },
                    "required": ["text", "confidence", "mentioned_concepts"],
                    "additionalProperties": false
                }
            }
        },
        "required": ["claims"],
        "additionalProperties": false
    })
}

/// Parse a claim response, salvaging loose claim objects on bad JSON.
pub fn parse_chunk_claims(raw: &str) -> Vec<ExtractedClaim> {
    if let Ok(envelope) = serde_json::from_str::<ClaimEnvelope>(raw) {
        if !envelope.claims.is_empty() {
            return envelope.claims;
        }
    }
    for object in json_salvage::salvage_objects(raw) {
        if object.get("claims").is_some() {
            if let Ok(envelope) = serde_json::from_value::<ClaimEnvelope>(object) {
                if !envelope.claims.is_empty() {
                    return envelope.claims;
                }
            }
        }
    }
    json_salvage::salvage_objects(raw)
        .into_iter()
        .filter(|o| o.get("text").is_some())
        .filter_map(|o| serde_json::from_value(o).ok())
        .collect()
}

async fn extract_one_chunk(
    router: &ModelRouter,
    embedder: &EmbeddingProvider,
    chunk: &ChunkPiece,
    concept_names: &[String],
) -> Result<ChunkClaims, AppError> {
    let user_message = serde_json::json!({
        "concepts": concept_names,
        "chunk": chunk.text,
    })
    .to_string();

    let raw = router
        .completion_json_schema(
            TaskType::Extract,
            CLAIM_SYSTEM_MESSAGE,
            user_message,
            "chunk_claims",
            claim_schema(),
            CompletionOptions {
                temperature: Some(0.0),
                ..CompletionOptions::default()
            },
        )
        .await?;
    let extracted = parse_chunk_claims(&raw);

    let mut claims = Vec::with_capacity(extracted.len());
    for claim in extracted {
        // Embedding failure degrades to a vector-less claim.
        let embedding = embedder.try_embed(&claim.text).await;
        claims.push((claim, embedding));
    }

    debug!(chunk_index = chunk.index, count = claims.len(), "extracted chunk claims");
    Ok(ChunkClaims {
        chunk_index: chunk.index,
        claims,
    })
}

/// Fan out over chunks with at most `CLAIM_WORKERS` in flight. Per-chunk
/// failures land in the error list; the join point re-sorts by chunk index
/// so writes are deterministic regardless of completion order.
pub async fn extract_for_chunks(
    router: &ModelRouter,
    embedder: &EmbeddingProvider,
    chunks: &[ChunkPiece],
    concept_names: &[String],
    cancel: &CancellationToken,
) -> (Vec<ChunkClaims>, Vec<String>) {
    let results: Vec<Result<ChunkClaims, (i64, AppError)>> = stream::iter(chunks.iter())
        .map(|chunk| async move {
            if cancel.is_cancelled() {
                return Err((
                    chunk.index,
                    AppError::Cancelled("ingestion cancelled".into()),
                ));
            }
            extract_one_chunk(router, embedder, chunk, concept_names)
                .await
                .map_err(|e| (chunk.index, e))
        })
        .buffer_unordered(CLAIM_WORKERS)
        .collect()
        .await;

    let mut ok: Vec<ChunkClaims> = Vec::new();
    let mut errors: Vec<String> = Vec::new();
    for result in results {
        match result {
            Ok(chunk_claims) => ok.push(chunk_claims),
            Err((index, err)) => errors.push(format!("chunk {index}: {err}")),
        }
    }
    ok.sort_by_key(|c| c.chunk_index);
    (ok, errors)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_clean_envelope() {
        let raw = r#"{"claims": [
            {"text": "Water boils at 100C at sea level.", "confidence": 0.9,
             "mentioned_concepts": ["Boiling Point"]}
        ]}"#;
        let claims = parse_chunk_claims(raw);
        assert_eq!(claims.len(), 1);
        assert_eq!(claims[0].mentioned_concepts, vec!["Boiling Point".to_owned()]);
    }

    #[test]
    fn test_parse_salvages_loose_claims() {
        let raw = r#"broken [ {"text": "claim one", "confidence": 0.8, "mentioned_concepts": []} , {"text": "claim two""#;
        let claims = parse_chunk_claims(raw);
        assert_eq!(claims.len(), 1, "only the well-formed claim survives");
        assert_eq!(claims[0].text, "claim one");
    }

    #[test]
    fn test_parse_garbage_is_empty() {
        assert!(parse_chunk_claims("nothing here").is_empty());
    }
}
