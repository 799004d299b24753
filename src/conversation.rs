//! Conversation turns shared by the chat client and the analysis endpoint.
//!
//! The `conversation` form field carries a JSON array of `{role, content}`
//! objects. Decoding is strict: anything that is not an array of well-formed
//! turns is rejected with a [`ConversationError`] instead of being passed on.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Data URI preview on the client, or the served URL once uploaded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            image: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            image: None,
        }
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    /// The `{role, content}` form sent over the wire.
    pub fn without_image(&self) -> Self {
        Self {
            role: self.role,
            content: self.content.clone(),
            image: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConversationError {
    #[error("conversation is not valid JSON: {0}")]
    Json(#[source] serde_json::Error),

    #[error("conversation must be a JSON array, got {0}")]
    NotArray(&'static str),

    #[error("conversation entry {index} is invalid: {source}")]
    Entry {
        index: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Returns the most recent `size` entries, or all of them when there are fewer.
pub fn window<T>(items: &[T], size: usize) -> &[T] {
    &items[items.len().saturating_sub(size)..]
}

/// Decodes the `conversation` form field. Blank input is an empty conversation.
pub fn decode_conversation(raw: &str) -> Result<Vec<Message>, ConversationError> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }

    let value: Value = serde_json::from_str(raw).map_err(ConversationError::Json)?;
    let entries = match value {
        Value::Array(entries) => entries,
        other => return Err(ConversationError::NotArray(kind_of(&other))),
    };

    entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| {
            serde_json::from_value(entry).map_err(|source| ConversationError::Entry { index, source })
        })
        .collect()
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
