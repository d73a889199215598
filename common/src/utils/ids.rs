use sha2::{Digest, Sha256};

/// Hex digest of the input, truncated to `len` characters.
pub fn short_sha256(input: &str, len: usize) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let hex = format!("{digest:x}");
    hex.chars().take(len).collect()
}

/// Deterministic graph id for a `(tenant_id, user_id)` pair, so repeated
/// context resolution lands on the same workspace.
pub fn graph_id_for(tenant_id: &str, user_id: &str) -> String {
    format!("GS_{}", short_sha256(&format!("{tenant_id}:{user_id}"), 16))
}

/// Lowercase and collapse runs of whitespace to single spaces.
pub fn normalize_text(text: &str) -> String {
    text.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Deterministic claim id: same normalized text from the same source in the
/// same graph always produces the same id.
pub fn claim_id_for(graph_id: &str, source_id: &str, text: &str) -> String {
    let normalized = normalize_text(text);
    format!(
        "CLAIM_{}",
        short_sha256(&format!("{graph_id}{source_id}{normalized}"), 16)
    )
}

/// Stable content hash over whitespace-normalized lowercase text.
pub fn content_hash(text: &str) -> String {
    let normalized = normalize_text(text);
    let digest = Sha256::digest(normalized.as_bytes());
    format!("{digest:x}")
}

/// Wikipedia-style URL slug from a concept name.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_dash = true;
    for ch in name.chars() {
        if ch.is_alphanumeric() {
            slug.extend(ch.to_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    slug.trim_end_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_id_is_stable_under_whitespace_and_case() {
        let a = claim_id_for("g1", "s1", "Rust  is\nmemory safe");
        let b = claim_id_for("g1", "s1", "rust is memory safe");
        assert_eq!(a, b);
        assert!(a.starts_with("CLAIM_"));
        assert_eq!(a.len(), "CLAIM_".len() + 16);
    }

    #[test]
    fn test_claim_id_differs_across_sources_and_graphs() {
        let base = claim_id_for("g1", "s1", "same text");
        assert_ne!(base, claim_id_for("g1", "s2", "same text"));
        assert_ne!(base, claim_id_for("g2", "s1", "same text"));
    }

    #[test]
    fn test_content_hash_normalizes() {
        assert_eq!(content_hash("Hello   World"), content_hash("hello world"));
        assert_ne!(content_hash("hello world"), content_hash("hello worlds"));
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Graph Theory (Basics)"), "graph-theory-basics");
        assert_eq!(slugify("  A&B  "), "a-b");
    }

    #[test]
    fn test_graph_id_deterministic() {
        assert_eq!(graph_id_for("t", "u"), graph_id_for("t", "u"));
        assert_ne!(graph_id_for("t", "u"), graph_id_for("t2", "u"));
    }
}
