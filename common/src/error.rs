use async_openai::error::OpenAIError;
use thiserror::Error;
use tokio::task::JoinError;

// Core internal errors
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] surrealdb::Error),
    #[error("OpenAI error: {0}")]
    OpenAI(#[from] OpenAIError),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Already exists: {existing_id}")]
    Conflict { existing_id: String },
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Authorization error: {0}")]
    Auth(String),
    #[error("LLM parsing error: {0}")]
    LLMParsing(String),
    #[error("Task join error: {0}")]
    Join(#[from] JoinError),
    #[error("IoError: {0}")]
    Io(#[from] std::io::Error),
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
    #[error("Ingestion processing error: {0}")]
    Processing(String),
    #[error("Operation cancelled: {0}")]
    Cancelled(String),
    #[error("Ingestion queue is full ({0} pending)")]
    QueueFull(usize),
    #[error("Internal service error: {0}")]
    InternalError(String),
}

impl AppError {
    /// True when the error came from the graph database itself being
    /// unreachable or failing, as opposed to an absent record.
    pub fn is_provider_failure(&self) -> bool {
        matches!(self, Self::Database(_) | Self::OpenAI(_))
    }
}
