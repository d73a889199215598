//! Wire-shaped views of graph entities. Internally everything is typed
//! records and ids; these are the JSON projections context bundles and
//! plan responses are assembled from.

use common::storage::types::{
    claim::{Claim, ClaimStatus},
    community::Community,
    concept::Concept,
    relationship::ConceptRelationship,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConceptView {
    pub node_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concept_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resource_captions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EdgeView {
    pub source_id: String,
    pub target_id: String,
    pub predicate: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClaimView {
    pub claim_id: String,
    pub text: String,
    pub confidence: f32,
    pub status: ClaimStatus,
    pub source_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mentioned_concepts: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommunityView {
    pub community_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkView {
    pub chunk_id: String,
    pub source_id: String,
    pub chunk_index: i64,
    pub text: String,
}

/// Truncate on a char boundary, appending an ellipsis when cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_owned();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push('…');
    out
}

impl ConceptView {
    pub fn from_concept(concept: &Concept, description_limit: Option<usize>) -> Self {
        Self {
            node_id: concept.id.clone(),
            name: concept.name.clone(),
            domain: concept.domain.clone(),
            concept_type: concept.concept_type.clone(),
            description: match description_limit {
                Some(limit) => Some(truncate_chars(&concept.description, limit)),
                None => Some(concept.description.clone()),
            },
            tags: concept.tags.clone(),
            resource_captions: Vec::new(),
        }
    }

    /// Bare name-and-id projection for summary payloads.
    pub fn slim(concept: &Concept) -> Self {
        Self {
            node_id: concept.id.clone(),
            name: concept.name.clone(),
            domain: None,
            concept_type: None,
            description: None,
            tags: Vec::new(),
            resource_captions: Vec::new(),
        }
    }
}

impl EdgeView {
    pub fn from_relationship(edge: &ConceptRelationship) -> Self {
        Self {
            source_id: edge.in_.clone(),
            target_id: edge.out.clone(),
            predicate: edge.metadata.predicate.clone(),
        }
    }
}

impl ClaimView {
    pub fn from_claim(claim: &Claim, text_limit: Option<usize>) -> Self {
        Self {
            claim_id: claim.id.clone(),
            text: match text_limit {
                Some(limit) => truncate_chars(&claim.text, limit),
                None => claim.text.clone(),
            },
            confidence: claim.confidence,
            status: claim.status,
            source_id: claim.source_id.clone(),
            chunk_id: claim.chunk_id.clone(),
            mentioned_concepts: claim.mentioned_concept_ids.clone(),
            evidence_ids: claim.evidence_ids.clone(),
        }
    }
}

impl CommunityView {
    pub fn from_community(community: &Community, summary_limit: Option<usize>) -> Self {
        Self {
            community_id: community.id.clone(),
            name: community.name.clone(),
            summary: summary_limit.map(|limit| truncate_chars(&community.summary, limit)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("abcdef", 3), "abc…");
        // multi-byte safety
        assert_eq!(truncate_chars("äöü", 2), "äö…");
    }
}
