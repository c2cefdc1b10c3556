use std::sync::Arc;

use crate::external::{ChatClient, ChatMessage, ChatRequest, Sampling};

pub const HAIKU_SYSTEM_PROMPT: &str = "You are a creative haiku poet focused on SEO and rich language. \
     Write a traditional 5-7-5 syllable haiku about the given topic. \
     Use diverse, vivid synonyms and expressive, search-engine-friendly language. \
     Avoid repetition. Focus on nature, emotion, and imagery. \
     Respond only with the haiku, no explanations.";

const HAIKU_MAX_TOKENS: u32 = 60;

/// Sampling settings for one variation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Preset {
    pub temperature: f32,
    pub top_p: f32,
    pub presence_penalty: f32,
    pub frequency_penalty: f32,
}

pub const PRESETS: [Preset; 3] = [
    Preset {
        temperature: 0.7,
        top_p: 0.9,
        presence_penalty: 0.3,
        frequency_penalty: 0.3,
    },
    Preset {
        temperature: 0.9,
        top_p: 1.0,
        presence_penalty: 0.7,
        frequency_penalty: 0.5,
    },
    Preset {
        temperature: 0.6,
        top_p: 0.8,
        presence_penalty: 0.2,
        frequency_penalty: 0.6,
    },
];

impl Preset {
    fn sampling(&self) -> Sampling {
        Sampling {
            temperature: Some(self.temperature),
            top_p: Some(self.top_p),
            presence_penalty: Some(self.presence_penalty),
            frequency_penalty: Some(self.frequency_penalty),
            max_tokens: Some(HAIKU_MAX_TOKENS),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HaikuVariation {
    /// 1-based position of the preset.
    pub index: usize,
    pub preset: Preset,
    pub outcome: Result<String, String>,
}

pub struct HaikuGenerator {
    client: Arc<dyn ChatClient>,
    model: String,
}

impl HaikuGenerator {
    pub fn new(client: Arc<dyn ChatClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    pub fn request_for(&self, topic: &str, preset: &Preset) -> ChatRequest {
        ChatRequest::new(
            self.model.clone(),
            vec![
                ChatMessage::system(HAIKU_SYSTEM_PROMPT),
                ChatMessage::user(format!(
                    "Write a creative, SEO-rich haiku about {} using vivid synonyms and beautiful imagery.",
                    topic
                )),
            ],
        )
        .with_sampling(preset.sampling())
    }

    /// One haiku per preset; a failed variation does not stop the others.
    pub async fn variations(&self, topic: &str) -> Vec<HaikuVariation> {
        let mut variations = Vec::with_capacity(PRESETS.len());

        for (i, preset) in PRESETS.iter().enumerate() {
            let request = self.request_for(topic, preset);
            let outcome = match self.client.complete(&request).await {
                Ok(text) => Ok(text.trim().to_string()),
                Err(e) => {
                    tracing::error!(variation = i + 1, error = %e, "Error generating haiku");
                    Err(e.to_string())
                }
            };
            variations.push(HaikuVariation {
                index: i + 1,
                preset: *preset,
                outcome,
            });
        }

        variations
    }
}
