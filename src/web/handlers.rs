use actix_multipart::form::MultipartForm;
use actix_web::http::header;
use actix_web::{web, HttpRequest, HttpResponse, Responder};
use log::{debug, error, info};
use serde_json::json;
use tera::Context;
use uuid::Uuid;

use crate::client::QUICK_PROMPTS;
use crate::config::Config;
use crate::conversation::{self, decode_conversation, Message};
use crate::model::{ChatMessage, CompletionRequest};
use crate::storage::public_url;
use crate::web::error::AnalyzeError;
use crate::web::models::{AnalyzeForm, AnalyzeResponse, StatusMessage};
use crate::AppState;

/// Returned as `result` when the model answers without any text.
pub const NO_RESULT: &str = "No response from the model.";

// Index page handler
pub async fn index(data: web::Data<AppState>) -> impl Responder {
    let mut context = Context::new();
    context.insert("title", "ProfDux Radiology");
    context.insert("quick_prompts", &QUICK_PROMPTS);
    match data.tera.render("index.html", &context) {
        Ok(html) => HttpResponse::Ok().content_type("text/html").body(html),
        Err(e) => {
            error!("Template error: {}", e);
            HttpResponse::InternalServerError().body("Template error")
        }
    }
}

// Health check endpoint
pub async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}

pub async fn method_not_allowed(req: HttpRequest) -> impl Responder {
    info!("Invalid request method: {} {}", req.method(), req.path());
    HttpResponse::MethodNotAllowed().json(StatusMessage {
        message: "Method Not Allowed".to_string(),
    })
}

// Image/text analysis endpoint
pub async fn analyze(
    req: HttpRequest,
    data: web::Data<AppState>,
    form: Result<MultipartForm<AnalyzeForm>, actix_web::Error>,
) -> Result<HttpResponse, AnalyzeError> {
    let request_id = Uuid::new_v4();
    let MultipartForm(form) = form.map_err(|e| AnalyzeError::Form(e.to_string()))?;
    let message = form.message.map(|text| text.into_inner()).unwrap_or_default();

    info!(
        "Analyze request {}: message {:?}, image attached: {}",
        request_id,
        message,
        form.image.is_some()
    );

    let mut conversation = match form.conversation {
        Some(raw) => decode_conversation(&raw.into_inner())?,
        None => Vec::new(),
    };
    if conversation.is_empty() && !message.trim().is_empty() {
        conversation.push(Message::user(message));
    }

    let mut messages: Vec<ChatMessage> = conversation.into_iter().map(ChatMessage::from).collect();
    let mut image_url = None;

    if let Some(image) = form.image.filter(|image| image.size > 0) {
        let uploads = data.uploads.clone();
        let original_name = image.file_name;
        let temp = image.file;
        let stored = web::block(move || uploads.relocate(temp, original_name.as_deref()))
            .await
            .map_err(|e| std::io::Error::other(e.to_string()))??;

        let url = public_url(
            &request_scheme(&req, &data.config),
            &request_host(&req, &data.config),
            &stored.file_name,
        );
        info!("Request {}: image uploaded to {}", request_id, url);

        messages.push(ChatMessage::image_reference(url.clone()));
        image_url = Some(url);
    }

    let request = CompletionRequest {
        model: data.config.model.clone(),
        messages: conversation::window(&messages, data.config.context_window).to_vec(),
        max_tokens: data.config.max_tokens,
    };
    debug!("Request {}: upstream payload {:?}", request_id, request);

    let reply = data.model.complete(&request).await?;
    let result = reply
        .filter(|text| !text.trim().is_empty())
        .unwrap_or_else(|| NO_RESULT.to_string());

    info!("Request {}: answered with {} characters", request_id, result.len());
    Ok(HttpResponse::Ok().json(AnalyzeResponse { result, image_url }))
}

/// First `X-Forwarded-Proto` value, or the configured default scheme.
fn request_scheme(req: &HttpRequest, config: &Config) -> String {
    req.headers()
        .get("x-forwarded-proto")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|scheme| !scheme.is_empty())
        .unwrap_or(config.default_scheme.as_str())
        .to_string()
}

fn request_host(req: &HttpRequest, config: &Config) -> String {
    if let Some(host) = &config.public_host {
        return host.clone();
    }
    req.headers()
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .filter(|host| !host.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| req.connection_info().host().to_string())
}
