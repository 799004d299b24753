use async_trait::async_trait;
use log::{debug, info};
use reqwest::Client;
use serde_json::Value;

use super::{CompletionBackend, CompletionRequest, ModelError};

// A wrapper for an OpenAI-compatible chat completions API
pub struct OpenAiClient {
    base_url: String,
    api_key: String,
    client: Client,
}

impl OpenAiClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        info!("Using chat completions API at: {}", base_url);

        Self {
            base_url,
            api_key: api_key.into(),
            client: Client::new(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl CompletionBackend for OpenAiClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<Option<String>, ModelError> {
        info!(
            "Sending {} message(s) to {} with max_tokens: {}",
            request.messages.len(),
            request.model,
            request.max_tokens
        );

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await?;
            return Err(ModelError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let response_json: Value = response.json().await?;
        debug!("Response JSON: {}", response_json);

        let content = extract_content(&response_json);
        match &content {
            Some(text) => info!("Response length: {} characters", text.len()),
            None => info!("Response carried no message content"),
        }
        Ok(content)
    }
}

/// Pulls `choices[0].message.content` out of a completion response.
fn extract_content(response: &Value) -> Option<String> {
    response
        .get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(|content| content.as_str())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn endpoint_strips_trailing_slash() {
        let client = OpenAiClient::new("https://api.openai.com/v1/", "test-key");
        assert_eq!(client.endpoint(), "https://api.openai.com/v1/chat/completions");
        assert_eq!(client.api_key, "test-key");
    }

    #[test]
    fn extracts_first_choice_content() {
        let response = json!({
            "choices": [
                {"message": {"role": "assistant", "content": "No acute findings."}},
                {"message": {"role": "assistant", "content": "ignored"}}
            ]
        });
        assert_eq!(extract_content(&response).as_deref(), Some("No acute findings."));
    }

    #[test]
    fn missing_content_is_none() {
        assert_eq!(extract_content(&json!({"choices": []})), None);
        assert_eq!(
            extract_content(&json!({"choices": [{"message": {"content": null}}]})),
            None
        );
        assert_eq!(extract_content(&json!({})), None);
    }
}
