//! REST client for the Gemini API

use super::context::ConversationMessage;
use super::wire::{Content, ErrorResponse, GenerateContentRequest, GenerateContentResponse, GenerationConfig};
use crate::{AgentError, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Thin `generateContent` client shared by chat, transcription and speech.
///
/// Cloning is cheap; clones share the connection pool.
#[derive(Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AgentError::ConnectionError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            api_key: api_key.into(),
            base_url: DEFAULT_API_BASE.to_string(),
        })
    }

    /// Point the client at another API root
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Call `models/{model}:generateContent`
    pub async fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse> {
        let url = format!("{}/models/{}:generateContent", self.base_url, model);
        debug!("POST {} ({} contents)", url, request.contents.len());

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| AgentError::ConnectionError(format!("Request to {} failed: {}", model, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let error = api_error(status.as_u16(), &body);
            warn!("Gemini API returned {}: {}", status, error);
            return Err(error);
        }

        response
            .json::<GenerateContentResponse>()
            .await
            .map_err(|e| AgentError::ProtocolError(format!("Invalid generateContent response: {}", e)))
    }
}

/// Build an [`AgentError::ApiError`] from a non-success response.
///
/// The API status name (e.g. `RESOURCE_EXHAUSTED`) is kept in the message so
/// rate limiting can be recognised whatever the HTTP code.
pub fn api_error(status: u16, body: &str) -> AgentError {
    let message = match serde_json::from_str::<ErrorResponse>(body) {
        Ok(parsed) => match parsed.error.status {
            Some(name) => format!("{}: {}", name, parsed.error.message),
            None => parsed.error.message,
        },
        Err(_) if body.trim().is_empty() => "empty response body".to_string(),
        Err(_) => body.trim().to_string(),
    };

    AgentError::ApiError { status, message }
}

/// Something that can answer a conversation
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Produce the model's reply to `history`, whose last message is the user's
    async fn generate(&self, system: Option<&str>, history: &[ConversationMessage]) -> Result<String>;
}

/// [`ChatBackend`] backed by a Gemini model
pub struct GeminiChatClient {
    client: GeminiClient,
    model: String,
    temperature: Option<f32>,
}

impl GeminiChatClient {
    pub fn new(client: GeminiClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            temperature: None,
        }
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_request(&self, system: Option<&str>, history: &[ConversationMessage]) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: history
                .iter()
                .map(|message| Content::text(Some(message.role.as_str()), message.content.clone()))
                .collect(),
            system_instruction: system.map(|text| Content::text(None, text)),
            generation_config: self.temperature.map(|temperature| GenerationConfig {
                temperature: Some(temperature),
                ..Default::default()
            }),
        }
    }
}

#[async_trait]
impl ChatBackend for GeminiChatClient {
    async fn generate(&self, system: Option<&str>, history: &[ConversationMessage]) -> Result<String> {
        let request = self.build_request(system, history);
        let response = self.client.generate_content(&self.model, &request).await?;
        Ok(response.text().unwrap_or_default())
    }
}
