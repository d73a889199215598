pub mod stream;

use std::{sync::Arc, time::Duration};

use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
    ChatCompletionRequestUserMessage, CreateChatCompletionRequestArgs, ResponseFormat,
    ResponseFormatJsonSchema,
};
use futures::StreamExt;
use json_salvage::toolcalls::{AssembledToolCall, ToolCallAssembler, ToolCallFragment};
use tokio::time::timeout;

use crate::{error::AppError, llm::stream::StreamFrame, utils::config::AppConfig};

/// Task families partitioning model choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskType {
    Extract,
    Synthesis,
    Voice,
    ChatFast,
}

#[derive(Debug, Clone, Default)]
pub struct CompletionOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub response_format: Option<ResponseFormat>,
}

/// Narrow front door to the LLM. Callers name a task type, not a model;
/// per-call timeouts are enforced here and there is no automatic retry.
pub struct ModelRouter {
    client: Arc<async_openai::Client<async_openai::config::OpenAIConfig>>,
    extract_model: String,
    synthesis_model: String,
    voice_model: String,
    chat_fast_model: String,
    call_timeout: Duration,
}

impl ModelRouter {
    pub fn new(
        client: Arc<async_openai::Client<async_openai::config::OpenAIConfig>>,
        config: &AppConfig,
    ) -> Self {
        Self {
            client,
            extract_model: config.extract_model.clone(),
            synthesis_model: config.synthesis_model.clone(),
            voice_model: config.voice_model.clone(),
            chat_fast_model: config.chat_fast_model.clone(),
            call_timeout: Duration::from_secs(config.llm_timeout_seconds),
        }
    }

    pub fn model_for(&self, task: TaskType) -> &str {
        match task {
            TaskType::Extract => &self.extract_model,
            TaskType::Synthesis => &self.synthesis_model,
            TaskType::Voice => &self.voice_model,
            TaskType::ChatFast => &self.chat_fast_model,
        }
    }

    pub async fn completion(
        &self,
        task: TaskType,
        messages: Vec<ChatCompletionRequestMessage>,
        options: CompletionOptions,
    ) -> Result<String, AppError> {
        let mut builder = CreateChatCompletionRequestArgs::default();
        builder.model(self.model_for(task)).messages(messages);
        if let Some(temperature) = options.temperature {
            builder.temperature(temperature);
        }
        if let Some(max_tokens) = options.max_tokens {
            builder.max_tokens(max_tokens);
        }
        if let Some(response_format) = options.response_format {
            builder.response_format(response_format);
        }
        let request = builder.build()?;

        let response = timeout(self.call_timeout, self.client.chat().create(request))
            .await
            .map_err(|_| AppError::Cancelled("LLM call timed out".into()))??;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.as_ref())
            .ok_or(AppError::LLMParsing("No content found in LLM response".into()))?;

        Ok(content.clone())
    }

    /// Stream a chat completion as typed frames pushed to `on_frame`.
    /// Content deltas become `Chunk` frames; tool-call fragments are
    /// accumulated per index and returned assembled once the stream ends,
    /// ready for the caller to execute and re-stream with tool results.
    /// Provider errors surface as an `Error` frame before the call fails.
    pub async fn stream_completion<F>(
        &self,
        task: TaskType,
        messages: Vec<ChatCompletionRequestMessage>,
        options: CompletionOptions,
        mut on_frame: F,
    ) -> Result<Vec<AssembledToolCall>, AppError>
    where
        F: FnMut(StreamFrame),
    {
        let mut builder = CreateChatCompletionRequestArgs::default();
        builder
            .model(self.model_for(task))
            .messages(messages)
            .stream(true);
        if let Some(temperature) = options.temperature {
            builder.temperature(temperature);
        }
        if let Some(max_tokens) = options.max_tokens {
            builder.max_tokens(max_tokens);
        }
        let request = builder.build()?;

        let mut response_stream = self.client.chat().create_stream(request).await?;
        let mut assembler = ToolCallAssembler::new();

        while let Some(next) = response_stream.next().await {
            match next {
                Ok(chunk) => {
                    for choice in &chunk.choices {
                        if let Some(delta) = &choice.delta.content {
                            if !delta.is_empty() {
                                on_frame(StreamFrame::Chunk {
                                    delta: delta.clone(),
                                });
                            }
                        }
                        if let Some(tool_calls) = &choice.delta.tool_calls {
                            for tool_call in tool_calls {
                                assembler.push(ToolCallFragment {
                                    index: tool_call.index as usize,
                                    id: tool_call.id.clone(),
                                    name: tool_call
                                        .function
                                        .as_ref()
                                        .and_then(|f| f.name.clone()),
                                    arguments: tool_call
                                        .function
                                        .as_ref()
                                        .and_then(|f| f.arguments.clone()),
                                });
                            }
                        }
                    }
                }
                Err(err) => {
                    on_frame(StreamFrame::Error {
                        category: "ExternalProviderFailure".to_owned(),
                        hint: err.to_string(),
                    });
                    return Err(AppError::OpenAI(err));
                }
            }
        }

        on_frame(StreamFrame::Done);
        Ok(assembler.finish())
    }

    /// System+user convenience with a strict JSON schema response format.
    pub async fn completion_json_schema(
        &self,
        task: TaskType,
        system_message: &str,
        user_message: String,
        schema_name: &str,
        schema: serde_json::Value,
        options: CompletionOptions,
    ) -> Result<String, AppError> {
        let response_format = ResponseFormat::JsonSchema {
            json_schema: ResponseFormatJsonSchema {
                description: None,
                name: schema_name.into(),
                schema: Some(schema),
                strict: Some(true),
            },
        };
        self.completion(
            task,
            vec![
                ChatCompletionRequestSystemMessage::from(system_message).into(),
                ChatCompletionRequestUserMessage::from(user_message).into(),
            ],
            CompletionOptions {
                response_format: Some(response_format),
                ..options
            },
        )
        .await
    }
}
