use std::{sync::Arc, time::Duration};

use async_openai::types::CreateEmbeddingRequestArgs;
use tracing::warn;

use crate::{
    error::AppError,
    utils::{cache::TtlCache, config::AppConfig, ids::normalize_text},
};

/// Wrapper around the embedding endpoint. Dimension is fixed per deploy;
/// repeated query embeddings are served from a bounded TTL cache keyed by
/// normalized text.
pub struct EmbeddingProvider {
    client: Arc<async_openai::Client<async_openai::config::OpenAIConfig>>,
    model: String,
    dimensions: u32,
    query_cache: TtlCache<Vec<f32>>,
}

impl EmbeddingProvider {
    pub fn new(
        client: Arc<async_openai::Client<async_openai::config::OpenAIConfig>>,
        config: &AppConfig,
    ) -> Self {
        Self {
            client,
            model: config.embedding_model.clone(),
            dimensions: config.embedding_dimensions,
            query_cache: TtlCache::new(256, Duration::from_secs(config.cache_ttl_seconds)),
        }
    }

    pub fn dimensions(&self) -> u32 {
        self.dimensions
    }

    pub async fn embed(&self, input: &str) -> Result<Vec<f32>, AppError> {
        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .dimensions(self.dimensions)
            .input([input])
            .build()?;

        let response = self.client.embeddings().create(request).await?;

        let embedding: Vec<f32> = response
            .data
            .first()
            .ok_or_else(|| AppError::LLMParsing("No embedding data received".into()))?
            .embedding
            .clone();

        Ok(embedding)
    }

    /// Embedding failures never block a request: log and continue without a
    /// vector.
    pub async fn try_embed(&self, input: &str) -> Option<Vec<f32>> {
        match self.embed(input).await {
            Ok(vector) => Some(vector),
            Err(err) => {
                warn!(error = %err, "embedding unavailable, continuing without vector");
                None
            }
        }
    }

    /// Cached variant for query-side embeddings, keyed by normalized text.
    pub async fn embed_query(&self, input: &str) -> Option<Vec<f32>> {
        let key = normalize_text(input);
        if let Some(hit) = self.query_cache.get(&key) {
            return Some(hit);
        }
        let vector = self.try_embed(input).await?;
        self.query_cache.insert(key, vector.clone());
        Some(vector)
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl EmbeddingProvider {
    /// Pre-load a query vector so tests exercise the cached path without a
    /// provider round trip.
    pub fn prime_query_cache(&self, text: &str, vector: Vec<f32>) {
        self.query_cache.insert(normalize_text(text), vector);
    }
}

/// Cosine similarity; zero when either vector is empty, zero-normed, or the
/// dimensions disagree.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a <= 0.0 || norm_b <= 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
