use std::{sync::Arc, time::Duration};

use common::{
    llm::ModelRouter,
    storage::db::SurrealDbClient,
    utils::{cache::TtlCache, config::AppConfig, embedding::EmbeddingProvider},
};
use ingestion_pipeline::IngestionPipeline;

#[derive(Clone)]
pub struct ApiState {
    pub db: Arc<SurrealDbClient>,
    pub config: AppConfig,
    pub router: Arc<ModelRouter>,
    pub embedder: Arc<EmbeddingProvider>,
    pub pipeline: Arc<IngestionPipeline>,
    /// 5-minute response cache for /graphrag-context.
    pub context_cache: Arc<TtlCache<serde_json::Value>>,
}

impl ApiState {
    pub async fn new(config: &AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let db = Arc::new(
            SurrealDbClient::new(
                &config.surrealdb_address,
                &config.surrealdb_username,
                &config.surrealdb_password,
                &config.surrealdb_namespace,
                &config.surrealdb_database,
            )
            .await?,
        );
        db.ensure_initialized().await?;

        let openai_config = async_openai::config::OpenAIConfig::new()
            .with_api_key(config.openai_api_key.clone())
            .with_api_base(config.openai_base_url.clone());
        let openai_client = Arc::new(async_openai::Client::with_config(openai_config));

        Ok(Self::with_services(
            db,
            config,
            Arc::new(ModelRouter::new(openai_client.clone(), config)),
            Arc::new(EmbeddingProvider::new(openai_client, config)),
        ))
    }

    pub fn with_services(
        db: Arc<SurrealDbClient>,
        config: &AppConfig,
        router: Arc<ModelRouter>,
        embedder: Arc<EmbeddingProvider>,
    ) -> Self {
        let pipeline = Arc::new(IngestionPipeline::new(
            Arc::clone(&db),
            Arc::clone(&router),
            Arc::clone(&embedder),
            config.clone(),
        ));
        Self {
            db,
            config: config.clone(),
            router,
            embedder,
            pipeline,
            context_cache: Arc::new(TtlCache::new(
                128,
                Duration::from_secs(config.cache_ttl_seconds),
            )),
        }
    }
}
