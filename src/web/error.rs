use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use log::error;
use serde_json::json;
use thiserror::Error;

use crate::conversation::ConversationError;
use crate::model::ModelError;
use crate::web::models::ErrorEnvelope;

/// Anything that can end an analyze request early. All of it is reported as a 500.
#[derive(Debug, Error)]
pub enum AnalyzeError {
    #[error("failed to parse form: {0}")]
    Form(String),

    #[error("invalid conversation: {0}")]
    Conversation(#[from] ConversationError),

    #[error("failed to store upload: {0}")]
    Storage(#[from] std::io::Error),

    #[error("model request failed: {0}")]
    Upstream(#[from] ModelError),
}

impl AnalyzeError {
    pub fn kind(&self) -> &'static str {
        match self {
            AnalyzeError::Form(_) => "form",
            AnalyzeError::Conversation(_) => "conversation",
            AnalyzeError::Storage(_) => "storage",
            AnalyzeError::Upstream(_) => "upstream",
        }
    }
}

impl ResponseError for AnalyzeError {
    fn status_code(&self) -> StatusCode {
        StatusCode::INTERNAL_SERVER_ERROR
    }

    fn error_response(&self) -> HttpResponse {
        error!("Error in analyze handler: {}", self);
        HttpResponse::build(self.status_code()).json(ErrorEnvelope {
            error: "Internal Server Error".to_string(),
            details: json!({
                "kind": self.kind(),
                "message": self.to_string(),
            }),
        })
    }
}
