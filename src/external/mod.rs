pub mod error;
pub mod imgbb;
pub mod llm;

pub use error::ExternalError;
pub use imgbb::{ImageHost, ImgBbClient};
pub use llm::{
    ChatClient, ChatMessage, ChatRequest, ContentPart, GeneratedImage, ImageClient, ImageConfig,
    ImageRequest, ImageUrl, LLMConfig, OpenAiClient, Sampling,
};
