//! Chat completion provider
//!
//! The generators talk to a language model through [`ChatClient`]. The built-in client speaks
//! the OpenAI-compatible `/chat/completions` protocol, which covers hosted and local servers.

use crate::config::ProviderConfig;
use crate::error::PipelineError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Chat message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// Chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

/// Completion options
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Ask for a JSON object response
    pub json_object: bool,
}

/// Completion response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub content: String,
    pub model: String,
    pub finish_reason: Option<String>,
}

/// Chat completion capability
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        options: CompletionOptions,
    ) -> Result<CompletionResponse, PipelineError>;

    fn model_name(&self) -> &str;
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    model: String,
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatMessage,
    finish_reason: Option<String>,
}

const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

pub(crate) fn build_http_client() -> Result<Client, PipelineError> {
    Client::builder()
        .connect_timeout(HTTP_CONNECT_TIMEOUT)
        .timeout(HTTP_REQUEST_TIMEOUT)
        .build()
        .map_err(|e| PipelineError::Provider(format!("Failed to create HTTP client: {}", e)))
}

pub(crate) fn map_http_error(error: reqwest::Error) -> PipelineError {
    if error.is_timeout() {
        PipelineError::Provider(format!("Request timeout: {}", error))
    } else if error.is_connect() {
        PipelineError::Provider(format!("Connection error: {}", error))
    } else {
        PipelineError::Provider(format!("HTTP error: {}", error))
    }
}

pub(crate) fn map_status(status: StatusCode, body: &str) -> PipelineError {
    match status.as_u16() {
        401 | 403 => PipelineError::Provider(format!("Authentication failed: {}", body)),
        429 => PipelineError::Provider(format!("Rate limit exceeded: {}", body)),
        404 => PipelineError::Provider(format!("Model or endpoint not found: {}", body)),
        _ => PipelineError::Provider(format!("Request failed with status {}: {}", status, body)),
    }
}

/// OpenAI-compatible chat completion client
pub struct OpenAiCompatibleClient {
    client: Client,
    model: String,
    api_key: Option<String>,
    base_url: String,
    temperature: Option<f32>,
}

impl OpenAiCompatibleClient {
    pub fn new(
        model: impl Into<String>,
        api_key: Option<String>,
        base_url: impl Into<String>,
    ) -> Result<Self, PipelineError> {
        Ok(Self {
            client: build_http_client()?,
            model: model.into(),
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            temperature: None,
        })
    }

    /// Build from config, reading the key from the configured environment variable.
    pub fn from_config(config: &ProviderConfig) -> Result<Self, PipelineError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty());
        let mut client = Self::new(config.model.clone(), api_key, config.base_url.clone())?;
        client.temperature = config.temperature;
        Ok(client)
    }
}

#[async_trait]
impl ChatClient for OpenAiCompatibleClient {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        options: CompletionOptions,
    ) -> Result<CompletionResponse, PipelineError> {
        let request = ChatCompletionRequest {
            model: &self.model,
            messages: &messages,
            temperature: options.temperature.or(self.temperature),
            max_tokens: options.max_tokens,
            response_format: options.json_object.then_some(ResponseFormat {
                kind: "json_object",
            }),
        };

        let url = format!("{}/chat/completions", self.base_url);
        let mut builder = self.client.post(&url).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder.send().await.map_err(map_http_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(map_status(status, &body));
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::Provider(format!("Failed to parse response: {}", e)))?;
        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| PipelineError::Provider("No choices in response".to_string()))?;

        debug!(model = %completion.model, finish = ?choice.finish_reason, "Completion received");
        Ok(CompletionResponse {
            content: choice.message.content,
            model: completion.model,
            finish_reason: choice.finish_reason,
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
