use anyhow::{anyhow, Context, Result};
use base64::Engine;
use chrono::{Local, Utc};
use clap::ValueEnum;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::external::{
    ChatClient, ChatMessage, ChatRequest, ContentPart, ExternalError, GeneratedImage, ImageClient,
    ImageHost, ImageRequest, ImageUrl, Sampling,
};

pub const DESCRIBE_SYSTEM_PROMPT: &str = "You are a helpful assistant that describes images.";
const DESCRIBE_MAX_TOKENS: u32 = 50;
pub const MAX_BATCH: u32 = 10;

/// Output sizes the image API accepts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ImageSize {
    #[default]
    #[value(name = "1024x1024")]
    Square,
    #[value(name = "1024x1536")]
    Portrait,
    #[value(name = "1536x1024")]
    Landscape,
    #[value(name = "auto")]
    Auto,
}

impl ImageSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageSize::Square => "1024x1024",
            ImageSize::Portrait => "1024x1536",
            ImageSize::Landscape => "1536x1024",
            ImageSize::Auto => "auto",
        }
    }
}

/// Aspect ratio presets, each mapped onto a supported size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum AspectRatio {
    #[default]
    #[value(name = "1:1")]
    Square,
    #[value(name = "2:3")]
    Portrait,
    #[value(name = "3:2")]
    Landscape,
    #[value(name = "auto")]
    Auto,
    #[value(name = "16:9")]
    Widescreen,
    #[value(name = "4:3")]
    Standard,
    #[value(name = "3:4")]
    StandardPortrait,
}

impl AspectRatio {
    pub fn size(&self) -> ImageSize {
        match self {
            AspectRatio::Square => ImageSize::Square,
            AspectRatio::Portrait | AspectRatio::StandardPortrait => ImageSize::Portrait,
            AspectRatio::Landscape | AspectRatio::Widescreen | AspectRatio::Standard => {
                ImageSize::Landscape
            }
            AspectRatio::Auto => ImageSize::Auto,
        }
    }
}

/// Fold the negative prompt into the main one.
pub fn compose_prompt(prompt: &str, negative_prompt: Option<&str>) -> String {
    match negative_prompt.filter(|n| !n.trim().is_empty()) {
        Some(negative) => format!("{}. Avoid: {}", prompt, negative),
        None => prompt.to_string(),
    }
}

pub fn generated_file_name(index: usize) -> String {
    format!(
        "gen_{}_{}_{}.png",
        index,
        Local::now().format("%Y%m%d_%H%M%S"),
        Utc::now().timestamp_millis()
    )
}

#[derive(Debug, Clone)]
pub struct Reimagined {
    pub description: String,
    pub output: PathBuf,
}

#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub prompt: String,
    pub negative_prompt: Option<String>,
    pub aspect_ratio: AspectRatio,
    pub count: u32,
}

#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    pub hosted_urls: Vec<String>,
    pub local_files: Vec<PathBuf>,
}

pub struct ImagePipeline {
    chat: Arc<dyn ChatClient>,
    images: Arc<dyn ImageClient>,
    vision_model: String,
    image_model: String,
}

impl ImagePipeline {
    pub fn new(
        chat: Arc<dyn ChatClient>,
        images: Arc<dyn ImageClient>,
        vision_model: impl Into<String>,
        image_model: impl Into<String>,
    ) -> Self {
        Self {
            chat,
            images,
            vision_model: vision_model.into(),
            image_model: image_model.into(),
        }
    }

    /// One-sentence-ish description of an image from a vision model.
    pub async fn describe(&self, image: &[u8]) -> Result<String, ExternalError> {
        let data_url = format!(
            "data:image/jpeg;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(image)
        );
        let request = ChatRequest::new(
            self.vision_model.clone(),
            vec![
                ChatMessage::system(DESCRIBE_SYSTEM_PROMPT),
                ChatMessage::user_parts(vec![
                    ContentPart::Text {
                        text: "Describe this image.".to_string(),
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl { url: data_url },
                    },
                ]),
            ],
        )
        .with_sampling(Sampling {
            max_tokens: Some(DESCRIBE_MAX_TOKENS),
            ..Sampling::default()
        });

        Ok(self.chat.complete(&request).await?.trim().to_string())
    }

    async fn image_bytes(&self, image: GeneratedImage) -> Result<Option<Vec<u8>>> {
        match image {
            GeneratedImage::Url(url) => Ok(Some(self.images.download(&url).await?)),
            GeneratedImage::Base64(data) => {
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(data.as_bytes())
                    .context("Image payload is not valid base64")?;
                Ok(Some(bytes))
            }
            GeneratedImage::Empty => Ok(None),
        }
    }

    /// Describe `input`, then generate a fresh image from that description into `output`.
    pub async fn reimagine(
        &self,
        input: &Path,
        size: ImageSize,
        output: &Path,
    ) -> Result<Reimagined> {
        let image = tokio::fs::read(input)
            .await
            .with_context(|| format!("Cannot read image '{}'", input.display()))?;

        tracing::info!("Describing image");
        let description = self.describe(&image).await?;
        tracing::info!(size = size.as_str(), "Generating image from description");

        let generated = self
            .images
            .generate_images(&ImageRequest {
                model: self.image_model.clone(),
                prompt: description.clone(),
                size: size.as_str().to_string(),
                n: 1,
            })
            .await?;

        let first = generated
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("Image API returned no images"))?;
        let bytes = self
            .image_bytes(first)
            .await?
            .ok_or_else(|| anyhow!("Image API returned neither a URL nor image data"))?;

        tokio::fs::write(output, bytes)
            .await
            .with_context(|| format!("Cannot write '{}'", output.display()))?;

        Ok(Reimagined {
            description,
            output: output.to_owned(),
        })
    }

    /// Generate a batch of images, save each locally and publish it to `host`.
    pub async fn imagine(
        &self,
        host: &dyn ImageHost,
        request: &BatchRequest,
        out_dir: &Path,
    ) -> Result<BatchResult> {
        let count = request.count.clamp(1, MAX_BATCH);
        if count != request.count {
            tracing::warn!(requested = request.count, count, "Image count clamped");
        }

        let generated = self
            .images
            .generate_images(&ImageRequest {
                model: self.image_model.clone(),
                prompt: compose_prompt(&request.prompt, request.negative_prompt.as_deref()),
                size: request.aspect_ratio.size().as_str().to_string(),
                n: count,
            })
            .await?;

        let mut result = BatchResult::default();
        for (i, image) in generated.into_iter().enumerate() {
            let Some(bytes) = self.image_bytes(image).await? else {
                tracing::warn!(index = i, "Skipping image with no payload");
                continue;
            };

            let file_name = generated_file_name(i);
            let path = out_dir.join(&file_name);
            tokio::fs::write(&path, &bytes)
                .await
                .with_context(|| format!("Cannot write '{}'", path.display()))?;
            result.local_files.push(path.clone());

            let hosted = host.upload(&file_name, bytes).await?;
            tracing::info!(file = %path.display(), url = %hosted, "Uploaded image");
            result.hosted_urls.push(hosted);
        }

        Ok(result)
    }
}
