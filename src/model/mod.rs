mod openai;

pub use openai::OpenAiClient;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::conversation::{Message, Role};

/// Text sent alongside an uploaded image so the model skips unrelated pictures.
pub const IMAGE_HINT: &str =
    "Analyze the attached image. If it is not related to radiology or health, ignore it.";

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API request failed with status {status}: {body}")]
    Api { status: u16, body: String },
}

/// A chat-completion backend. The server holds one behind an `Arc`.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Runs one completion. `Ok(None)` means the API answered without text.
    async fn complete(&self, request: &CompletionRequest) -> Result<Option<String>, ModelError>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: ChatContent,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ChatContent {
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
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ChatMessage {
    /// The synthetic user turn pointing the model at an uploaded image.
    pub fn image_reference(url: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: ChatContent::Parts(vec![
                ContentPart::Text {
                    text: IMAGE_HINT.to_string(),
                },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: url.into(),
                        detail: Some("high".to_string()),
                    },
                },
            ]),
        }
    }
}

impl From<Message> for ChatMessage {
    fn from(message: Message) -> Self {
        Self {
            role: message.role,
            content: ChatContent::Text(message.content),
        }
    }
}
