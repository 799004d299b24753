use actix_multipart::form::tempfile::TempFile;
use actix_multipart::form::text::Text;
use actix_multipart::form::MultipartForm;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Multipart body of `POST /api/analyze`.
#[derive(MultipartForm)]
pub struct AnalyzeForm {
    pub message: Option<Text<String>>,
    /// JSON array of the last few `{role, content}` turns.
    pub conversation: Option<Text<String>>,
    pub image: Option<TempFile>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeResponse {
    pub result: String,
    #[serde(default)]
    pub image_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error: String,
    pub details: Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusMessage {
    pub message: String,
}
