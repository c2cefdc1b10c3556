use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

use crate::external::{ImageConfig, LLMConfig};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    pub max_source_chars: usize,
    pub fetch_timeout_secs: u64,
    pub log_level: String,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            max_source_chars: 12_000,
            fetch_timeout_secs: 10,
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub llm: LLMConfig,
    pub images: ImageConfig,
    pub processing: ProcessingConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let llm_defaults = LLMConfig::default();
        let llm = LLMConfig {
            base_url: env::var("LLM_BASE_URL").unwrap_or(llm_defaults.base_url),
            api_key: env::var("MY_API_KEY").unwrap_or_default(),
            summary_model: env::var("SUMMARY_MODEL").unwrap_or(llm_defaults.summary_model),
            haiku_model: env::var("HAIKU_MODEL").unwrap_or(llm_defaults.haiku_model),
            timeout_secs: parse_or("LLM_TIMEOUT_SECS", llm_defaults.timeout_secs),
        };

        let image_defaults = ImageConfig::default();
        let images = ImageConfig {
            base_url: env::var("OPENAI_BASE_URL").unwrap_or(image_defaults.base_url),
            api_key: env::var("OPENAI_API_KEY").unwrap_or_default(),
            vision_model: env::var("VISION_MODEL").unwrap_or(image_defaults.vision_model),
            image_model: env::var("IMAGE_MODEL").unwrap_or(image_defaults.image_model),
            imgbb_api_key: env::var("IMGBB_API_KEY")
                .ok()
                .filter(|key| !key.trim().is_empty()),
        };

        let processing_defaults = ProcessingConfig::default();
        let processing = ProcessingConfig {
            max_source_chars: parse_or("MAX_SOURCE_CHARS", processing_defaults.max_source_chars),
            fetch_timeout_secs: parse_or(
                "FETCH_TIMEOUT_SECS",
                processing_defaults.fetch_timeout_secs,
            ),
            log_level: env::var("LOG_LEVEL").unwrap_or(processing_defaults.log_level),
        };

        Ok(Self {
            llm,
            images,
            processing,
        })
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}
