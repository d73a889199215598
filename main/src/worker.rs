//! Background ingestion worker binary: claims queued ingestion tasks and
//! runs them through the pipeline.

use std::sync::Arc;

use anyhow::Context;
use common::{
    llm::ModelRouter,
    storage::db::SurrealDbClient,
    utils::{config::get_config, embedding::EmbeddingProvider},
};
use ingestion_pipeline::{run_worker_loop, IngestionPipeline};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = get_config().context("failed to load configuration")?;

    let db = Arc::new(
        SurrealDbClient::new(
            &config.surrealdb_address,
            &config.surrealdb_username,
            &config.surrealdb_password,
            &config.surrealdb_namespace,
            &config.surrealdb_database,
        )
        .await
        .context("failed to connect to graph database")?,
    );
    db.ensure_initialized()
        .await
        .map_err(|e| anyhow::anyhow!("failed to initialize schema: {e}"))?;

    let openai_config = async_openai::config::OpenAIConfig::new()
        .with_api_key(config.openai_api_key.clone())
        .with_api_base(config.openai_base_url.clone());
    let openai_client = Arc::new(async_openai::Client::with_config(openai_config));

    let pipeline = Arc::new(IngestionPipeline::new(
        Arc::clone(&db),
        Arc::new(ModelRouter::new(Arc::clone(&openai_client), &config)),
        Arc::new(EmbeddingProvider::new(openai_client, &config)),
        config,
    ));

    info!("ingestion worker starting");
    run_worker_loop(db, pipeline)
        .await
        .map_err(|e| anyhow::anyhow!("worker loop failed: {e}"))?;
    Ok(())
}
