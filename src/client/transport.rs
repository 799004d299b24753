use std::path::Path;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use log::{debug, info};
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use thiserror::Error;

use crate::conversation::Message;
use crate::web::models::AnalyzeResponse;

pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8080/api/analyze";

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server answered {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to encode conversation: {0}")]
    Encode(#[from] serde_json::Error),
}

/// An image picked by the user, held in memory until it is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl Attachment {
    pub fn new(file_name: impl Into<String>, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());
        let content_type = image_mime(path).to_string();
        Ok(Self {
            file_name,
            content_type,
            bytes,
        })
    }

    /// Inline `data:` URI used as the local preview.
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.content_type, BASE64.encode(&self.bytes))
    }
}

fn image_mime(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        _ => "application/octet-stream",
    }
}

/// What the client sends for one submission.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzeRequest {
    pub message: String,
    pub conversation: Vec<Message>,
    pub image: Option<Attachment>,
}

#[async_trait]
pub trait AnalyzeTransport: Send + Sync {
    async fn analyze(&self, request: AnalyzeRequest) -> Result<AnalyzeResponse, TransportError>;
}

/// Posts submissions to the analysis endpoint as multipart forms.
pub struct HttpTransport {
    endpoint: String,
    client: Client,
}

impl HttpTransport {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            client: Client::new(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new(DEFAULT_ENDPOINT)
    }
}

fn build_form(request: AnalyzeRequest) -> Result<Form, TransportError> {
    let conversation = serde_json::to_string(&request.conversation)?;
    let mut form = Form::new()
        .text("message", request.message)
        .text("conversation", conversation);

    if let Some(image) = request.image {
        let part = Part::bytes(image.bytes)
            .file_name(image.file_name)
            .mime_str(&image.content_type)?;
        form = form.part("image", part);
    }
    Ok(form)
}

#[async_trait]
impl AnalyzeTransport for HttpTransport {
    async fn analyze(&self, request: AnalyzeRequest) -> Result<AnalyzeResponse, TransportError> {
        info!(
            "Posting {} turn(s) to {} (image: {})",
            request.conversation.len(),
            self.endpoint,
            request.image.is_some()
        );

        let form = build_form(request)?;
        let response = self.client.post(&self.endpoint).multipart(form).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await?;
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let reply: AnalyzeResponse = response.json().await?;
        debug!("Analyze reply: {:?}", reply);
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use actix_web::dev::ServerHandle;
    use actix_web::{web, App, HttpResponse, HttpServer};
    use serde_json::json;
    use tera::Tera;

    use super::*;
    use crate::client::{ChatSession, WELCOME};
    use crate::config::Config;
    use crate::model::{ChatContent, CompletionBackend, CompletionRequest, ContentPart, ModelError};
    use crate::storage::UploadStore;
    use crate::web::routes;
    use crate::AppState;

    #[test]
    fn data_uri_encodes_bytes() {
        let attachment = Attachment::new("x.png", "image/png", b"abc".to_vec());
        assert_eq!(attachment.data_uri(), "data:image/png;base64,YWJj");
    }

    #[test]
    fn mime_follows_extension() {
        assert_eq!(image_mime(Path::new("scan.PNG")), "image/png");
        assert_eq!(image_mime(Path::new("scan.jpeg")), "image/jpeg");
        assert_eq!(image_mime(Path::new("scan.webp")), "image/webp");
        assert_eq!(image_mime(Path::new("scan")), "application/octet-stream");
    }

    #[tokio::test]
    async fn attachment_from_path_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chest.jpg");
        std::fs::write(&path, b"jpeg").unwrap();

        let attachment = Attachment::from_path(&path).await.unwrap();
        assert_eq!(attachment.file_name, "chest.jpg");
        assert_eq!(attachment.content_type, "image/jpeg");
        assert_eq!(attachment.bytes, b"jpeg");
    }

    #[test]
    fn form_rejects_invalid_mime() {
        let request = AnalyzeRequest {
            message: "hi".to_string(),
            conversation: vec![Message::user("hi")],
            image: Some(Attachment::new("x", "not a mime", vec![1])),
        };
        assert!(matches!(build_form(request), Err(TransportError::Http(_))));
    }

    #[test]
    fn default_endpoint() {
        assert_eq!(HttpTransport::default().endpoint(), DEFAULT_ENDPOINT);
    }

    const FINDINGS: &str = "Findings: no acute abnormality.";

    #[derive(Default)]
    struct RecordingModel {
        seen: Mutex<Vec<CompletionRequest>>,
    }

    #[async_trait]
    impl CompletionBackend for RecordingModel {
        async fn complete(&self, request: &CompletionRequest) -> Result<Option<String>, ModelError> {
            self.seen.lock().unwrap().push(request.clone());
            Ok(Some(FINDINGS.to_string()))
        }
    }

    async fn error_envelope() -> HttpResponse {
        HttpResponse::InternalServerError().json(json!({
            "error": "Internal Server Error",
            "details": {"kind": "upstream", "message": "quota exceeded"}
        }))
    }

    async fn reply_without_result() -> HttpResponse {
        HttpResponse::Ok().json(json!({"imageUrl": null}))
    }

    async fn reply_not_json() -> HttpResponse {
        HttpResponse::Ok().content_type("text/plain").body("definitely not json")
    }

    async fn reply_with_result() -> HttpResponse {
        HttpResponse::Ok().json(json!({
            "result": "All clear.",
            "imageUrl": "http://radiology.test/uploads/upload-1.png"
        }))
    }

    /// Runs the real routes plus a few fixed replies on an ephemeral port.
    async fn start_server(upload_dir: &Path, model: Arc<RecordingModel>) -> (String, ServerHandle) {
        let config = Config {
            upload_dir: upload_dir.to_path_buf(),
            api_key: "test-key".to_string(),
            ..Config::default()
        };
        let uploads = UploadStore::new(upload_dir);
        uploads.ensure_dirs().unwrap();
        let state = web::Data::new(AppState {
            tera: Tera::default(),
            model,
            uploads,
            config: config.clone(),
        });

        let server = HttpServer::new(move || {
            let config = config.clone();
            App::new()
                .app_data(state.clone())
                .route("/fixed/envelope", web::post().to(error_envelope))
                .route("/fixed/no-result", web::post().to(reply_without_result))
                .route("/fixed/not-json", web::post().to(reply_not_json))
                .route("/fixed/ok", web::post().to(reply_with_result))
                .configure(move |cfg| routes::configure(cfg, &config))
        })
        .workers(1)
        .disable_signals()
        .bind(("127.0.0.1", 0))
        .unwrap();

        let addr = server.addrs()[0];
        let server = server.run();
        let handle = server.handle();
        actix_web::rt::spawn(server);
        (format!("http://{}", addr), handle)
    }

    fn text_request() -> AnalyzeRequest {
        AnalyzeRequest {
            message: "What is your diagnosis?".to_string(),
            conversation: vec![Message::user("What is your diagnosis?")],
            image: None,
        }
    }

    fn png() -> Attachment {
        Attachment::new("x.png", "image/png", b"\x89PNG fake body".to_vec())
    }

    #[actix_web::test]
    async fn server_error_becomes_status_error() {
        let dir = tempfile::tempdir().unwrap();
        let (base, handle) = start_server(dir.path(), Arc::default()).await;

        let transport = HttpTransport::new(format!("{}/fixed/envelope", base));
        match transport.analyze(text_request()).await {
            Err(TransportError::Status { status, body }) => {
                assert_eq!(status, 500);
                assert!(body.contains("quota exceeded"));
            }
            other => panic!("expected a status error, got {:?}", other),
        }

        handle.stop(true).await;
    }

    #[actix_web::test]
    async fn reply_without_result_or_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let (base, handle) = start_server(dir.path(), Arc::default()).await;

        for path in ["/fixed/no-result", "/fixed/not-json"] {
            let transport = HttpTransport::new(format!("{}{}", base, path));
            match transport.analyze(text_request()).await {
                Err(TransportError::Http(err)) => assert!(err.is_decode(), "{}: {}", path, err),
                other => panic!("{}: expected a decode error, got {:?}", path, other),
            }
        }

        handle.stop(true).await;
    }

    #[actix_web::test]
    async fn successful_reply_is_decoded() {
        let dir = tempfile::tempdir().unwrap();
        let (base, handle) = start_server(dir.path(), Arc::default()).await;

        let transport = HttpTransport::new(format!("{}/fixed/ok", base));
        let reply = transport.analyze(text_request()).await.unwrap();
        assert_eq!(reply.result, "All clear.");
        assert_eq!(
            reply.image_url.as_deref(),
            Some("http://radiology.test/uploads/upload-1.png")
        );

        handle.stop(true).await;
    }

    #[actix_web::test]
    async fn form_round_trips_through_the_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let model = Arc::new(RecordingModel::default());
        let (base, handle) = start_server(dir.path(), model.clone()).await;

        let transport = HttpTransport::new(format!("{}/api/analyze", base));
        let reply = transport
            .analyze(AnalyzeRequest {
                message: "Analyze this image".to_string(),
                conversation: vec![Message::assistant(WELCOME), Message::user("Analyze this image")],
                image: Some(png()),
            })
            .await
            .unwrap();

        assert_eq!(reply.result, FINDINGS);
        let url = reply.image_url.expect("image url");
        let prefix = format!("{}/uploads/upload-", base);
        assert!(url.starts_with(&prefix) && url.ends_with(".png"), "{}", url);

        let file_name = url.rsplit('/').next().unwrap();
        assert_eq!(std::fs::read(dir.path().join(file_name)).unwrap(), png().bytes);

        let seen = model.seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].messages.len(), 2);
        assert_eq!(seen[0].messages[0].content, ChatContent::Text("Analyze this image".to_string()));
        match &seen[0].messages[1].content {
            ChatContent::Parts(parts) => assert!(parts.iter().any(|part| matches!(
                part,
                ContentPart::ImageUrl { image_url } if image_url.url == url
            ))),
            other => panic!("expected image parts, got {:?}", other),
        }

        handle.stop(true).await;
    }

    #[actix_web::test]
    async fn session_settles_with_the_served_image() {
        let dir = tempfile::tempdir().unwrap();
        let (base, handle) = start_server(dir.path(), Arc::default()).await;

        let transport = HttpTransport::new(format!("{}/api/analyze", base));
        let mut session = ChatSession::default();
        session.attach(png());

        assert!(session.submit(&transport, "Analyze this image").await);

        let turns = session.turns();
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[2].message.content, FINDINGS);
        let image = turns[1].message.image.as_deref().unwrap();
        assert!(image.starts_with(&format!("{}/uploads/", base)), "{}", image);
        assert!(session.attachment().is_none());

        handle.stop(true).await;
    }
}
