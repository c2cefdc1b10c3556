use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::external::error::ExternalError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    pub base_url: String,
    pub api_key: String,
    pub summary_model: String,
    pub haiku_model: String,
    pub timeout_secs: u64,
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            base_url: "https://models.github.ai/inference".to_string(),
            api_key: String::new(),
            summary_model: "gpt-4o-mini".to_string(),
            haiku_model: "openai/gpt-4.1".to_string(),
            timeout_secs: 120,
        }
    }
}

/// Settings for the image tools, which talk to the OpenAI API directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    pub base_url: String,
    pub api_key: String,
    pub vision_model: String,
    pub image_model: String,
    pub imgbb_api_key: Option<String>,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            vision_model: "gpt-4o-mini".to_string(),
            image_model: "gpt-image-1".to_string(),
            imgbb_api_key: None,
        }
    }
}

/// Join a base URL and an API path, validating the result.
pub fn join_endpoint(base_url: &str, path: &str) -> Result<String, ExternalError> {
    let joined = format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    Url::parse(&joined)
        .map_err(|e| ExternalError::ConfigError(format!("Invalid URL '{}': {}", joined, e)))?;
    Ok(joined)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user_parts(parts: Vec<ContentPart>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Parts(parts),
        }
    }

    /// Plain text of the message; image parts are skipped.
    pub fn text(&self) -> String {
        match &self.content {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// Optional sampling knobs; unset values are left to the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Sampling {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// Body of a chat completions call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(flatten)]
    pub sampling: Sampling,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            sampling: Sampling::default(),
        }
    }

    pub fn with_sampling(mut self, sampling: Sampling) -> Self {
        self.sampling = sampling;
        self
    }

    /// Text of the last user message, or an empty string.
    pub fn user_text(&self) -> String {
        self.messages
            .iter()
            .rev()
            .find(|message| message.role == Role::User)
            .map(ChatMessage::text)
            .unwrap_or_default()
    }
}

/// Body of an image generations call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageRequest {
    pub model: String,
    pub prompt: String,
    pub size: String,
    pub n: u32,
}

/// One item of an image generations response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeneratedImage {
    Url(String),
    Base64(String),
    Empty,
}

#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Run a single chat completion and return the trimmed reply.
    async fn complete(&self, request: &ChatRequest) -> Result<String, ExternalError>;
}

#[async_trait]
pub trait ImageClient: Send + Sync {
    async fn generate_images(
        &self,
        request: &ImageRequest,
    ) -> Result<Vec<GeneratedImage>, ExternalError>;

    /// Fetch the bytes of an image the provider returned by URL.
    async fn download(&self, url: &str) -> Result<Vec<u8>, ExternalError>;
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    url: Option<String>,
    b64_json: Option<String>,
}

/// Client for OpenAI-compatible chat completions and image generations.
pub struct OpenAiClient {
    base_url: String,
    api_key: String,
    timeout: Duration,
    client: Client,
}

impl OpenAiClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            timeout,
            client: Client::new(),
        }
    }

    pub fn from_llm_config(config: &LLMConfig) -> Self {
        Self::new(
            config.base_url.clone(),
            config.api_key.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn from_image_config(config: &ImageConfig, timeout: Duration) -> Self {
        Self::new(config.base_url.clone(), config.api_key.clone(), timeout)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        let builder = builder.timeout(self.timeout);
        if self.api_key.is_empty() {
            builder
        } else {
            builder.bearer_auth(&self.api_key)
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, ExternalError> {
        let response = self
            .authorized(builder)
            .send()
            .await
            .map_err(|e| ExternalError::ConnectionError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExternalError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl ChatClient for OpenAiClient {
    async fn complete(&self, request: &ChatRequest) -> Result<String, ExternalError> {
        let endpoint = join_endpoint(&self.base_url, "chat/completions")?;
        tracing::debug!(model = %request.model, %endpoint, "Requesting chat completion");

        let response = self.send(self.client.post(&endpoint).json(request)).await?;
        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| ExternalError::InvalidResponse(e.to_string()))?;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .ok_or_else(|| ExternalError::InvalidResponse("no content in choices".to_string()))
    }
}

#[async_trait]
impl ImageClient for OpenAiClient {
    async fn generate_images(
        &self,
        request: &ImageRequest,
    ) -> Result<Vec<GeneratedImage>, ExternalError> {
        let endpoint = join_endpoint(&self.base_url, "images/generations")?;
        tracing::debug!(model = %request.model, size = %request.size, n = request.n, "Requesting images");

        let response = self.send(self.client.post(&endpoint).json(request)).await?;
        let body: ImageResponse = response
            .json()
            .await
            .map_err(|e| ExternalError::InvalidResponse(e.to_string()))?;

        Ok(body
            .data
            .into_iter()
            .map(|item| match (item.url, item.b64_json) {
                (Some(url), _) if !url.is_empty() => GeneratedImage::Url(url),
                (_, Some(data)) if !data.is_empty() => GeneratedImage::Base64(data),
                _ => GeneratedImage::Empty,
            })
            .collect())
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, ExternalError> {
        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| ExternalError::ConnectionError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExternalError::ApiError {
                status: status.as_u16(),
                body: format!("download of {} failed", url),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ExternalError::ConnectionError(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}
