use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    pub openai_api_key: String,
    pub surrealdb_address: String,
    pub surrealdb_username: String,
    pub surrealdb_password: String,
    pub surrealdb_namespace: String,
    pub surrealdb_database: String,
    pub http_port: u16,
    #[serde(default = "default_base_url")]
    pub openai_base_url: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_embedding_dimensions")]
    pub embedding_dimensions: u32,
    #[serde(default = "default_extract_model")]
    pub extract_model: String,
    #[serde(default = "default_synthesis_model")]
    pub synthesis_model: String,
    #[serde(default = "default_chat_fast_model")]
    pub chat_fast_model: String,
    #[serde(default = "default_voice_model")]
    pub voice_model: String,
    #[serde(default = "default_cache_ttl_seconds")]
    pub cache_ttl_seconds: u64,
    #[serde(default = "default_proposed_edge_threshold")]
    pub proposed_edge_threshold: f32,
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
    #[serde(default = "default_llm_timeout_seconds")]
    pub llm_timeout_seconds: u64,
    #[serde(default = "default_ingestion_queue_capacity")]
    pub ingestion_queue_capacity: usize,
    #[serde(default = "default_ingestion_concurrency")]
    pub ingestion_concurrency: usize,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_embedding_dimensions() -> u32 {
    1536
}

fn default_extract_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_synthesis_model() -> String {
    "gpt-4o".to_string()
}

fn default_chat_fast_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_voice_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_cache_ttl_seconds() -> u64 {
    300
}

fn default_proposed_edge_threshold() -> f32 {
    0.6
}

fn default_request_timeout_seconds() -> u64 {
    30
}

fn default_llm_timeout_seconds() -> u64 {
    60
}

fn default_ingestion_queue_capacity() -> usize {
    64
}

fn default_ingestion_concurrency() -> usize {
    5
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::default())
        .build()?;

    config.try_deserialize()
}

#[cfg(any(test, feature = "test-utils"))]
impl AppConfig {
    pub fn for_tests() -> Self {
        Self {
            openai_api_key: "test-key".to_string(),
            surrealdb_address: "mem://".to_string(),
            surrealdb_username: String::new(),
            surrealdb_password: String::new(),
            surrealdb_namespace: "test".to_string(),
            surrealdb_database: "test".to_string(),
            http_port: 0,
            // Unroutable on purpose: tests must never reach a provider.
            openai_base_url: "http://127.0.0.1:9".to_string(),
            embedding_model: default_embedding_model(),
            embedding_dimensions: 3,
            extract_model: default_extract_model(),
            synthesis_model: default_synthesis_model(),
            chat_fast_model: default_chat_fast_model(),
            voice_model: default_voice_model(),
            cache_ttl_seconds: 300,
            proposed_edge_threshold: 0.6,
            request_timeout_seconds: 30,
            llm_timeout_seconds: 60,
            ingestion_queue_capacity: 8,
            ingestion_concurrency: 5,
        }
    }
}
