use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde_json::Value;

use crate::external::error::ExternalError;
use crate::external::llm::ImageConfig;

const IMGBB_UPLOAD_URL: &str = "https://api.imgbb.com/1/upload";

/// A place generated images can be published to.
#[async_trait]
pub trait ImageHost: Send + Sync {
    /// Upload an image and return its public URL.
    async fn upload(&self, file_name: &str, bytes: Vec<u8>) -> Result<String, ExternalError>;
}

pub struct ImgBbClient {
    api_key: String,
    endpoint: String,
    client: Client,
}

impl ImgBbClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_endpoint(api_key, IMGBB_UPLOAD_URL)
    }

    /// Build from config, failing when no ImgBB key is configured.
    pub fn from_config(config: &ImageConfig) -> Result<Self, ExternalError> {
        config
            .imgbb_api_key
            .as_deref()
            .map(|key| Self::new(key))
            .ok_or_else(|| {
                ExternalError::ConfigError(
                    "IMGBB_API_KEY not set. Please set it as an environment variable.".to_string(),
                )
            })
    }

    pub fn with_endpoint(api_key: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            endpoint: endpoint.into(),
            client: Client::new(),
        }
    }
}

#[async_trait]
impl ImageHost for ImgBbClient {
    async fn upload(&self, file_name: &str, bytes: Vec<u8>) -> Result<String, ExternalError> {
        let form = Form::new()
            .text("key", self.api_key.clone())
            .part("image", Part::bytes(bytes).file_name(file_name.to_string()));

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
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

        let body: Value = response
            .json()
            .await
            .map_err(|e| ExternalError::InvalidResponse(e.to_string()))?;

        if body.get("success").and_then(Value::as_bool) != Some(true) {
            return Err(ExternalError::UploadError(format!(
                "ImgBB upload failed: {}",
                body
            )));
        }

        body.pointer("/data/url")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ExternalError::InvalidResponse("ImgBB response has no data.url".to_string()))
    }
}
