//! Chat client state.
//!
//! A [`ChatSession`] owns the transcript and the composer (text input and
//! attached image). Every submission appends a user turn followed by a
//! [`Lifecycle::Pending`] placeholder; the placeholder is later settled in
//! place as either [`Lifecycle::Fulfilled`] or [`Lifecycle::Failed`]. Only one
//! submission may be pending at a time.
//!
//! Only the last [`SessionOptions::window`] turns are sent as context. Older
//! turns stay visible but the model never sees them.

mod transport;

pub use transport::{
    AnalyzeRequest, AnalyzeTransport, Attachment, HttpTransport, TransportError, DEFAULT_ENDPOINT,
};

use std::time::Duration;

use log::{debug, warn};

use crate::conversation::{self, Message, Role};
use crate::web::models::AnalyzeResponse;

pub const WELCOME: &str =
    "Welcome to ProfDux Radiology! Upload an image or type a question about radiology and health.";
pub const PLACEHOLDER: &str = "loading...";
pub const NEEDS_IMAGE_REPLY: &str = "Please attach a radiology image to proceed with the analysis.";
pub const ERROR_REPLY: &str = "Error processing request.";

pub const QUICK_PROMPTS: [&str; 3] = [
    "Analyze this image",
    "Create a radiology report",
    "What is your diagnosis?",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Pending,
    Fulfilled,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub message: Message,
    pub lifecycle: Lifecycle,
}

impl Turn {
    fn fulfilled(message: Message) -> Self {
        Self {
            message,
            lifecycle: Lifecycle::Fulfilled,
        }
    }

    fn placeholder() -> Self {
        Self {
            message: Message::assistant(PLACEHOLDER),
            lifecycle: Lifecycle::Pending,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.lifecycle == Lifecycle::Pending
    }
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Turns sent as context, counting the new user turn.
    pub window: usize,
    /// Delay before answering a quick prompt that has no image.
    pub prompt_delay: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            window: 2,
            prompt_delay: Duration::from_secs(1),
        }
    }
}

/// What the caller has to do after [`ChatSession::begin`].
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    Send(AnalyzeRequest),
    /// A quick prompt without an image: wait, then call
    /// [`ChatSession::resolve_missing_image`].
    AwaitImage,
}

#[derive(Debug, Clone)]
pub struct ChatSession {
    turns: Vec<Turn>,
    input: String,
    attachment: Option<Attachment>,
    loading: bool,
    options: SessionOptions,
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new(SessionOptions::default())
    }
}

impl ChatSession {
    pub fn new(options: SessionOptions) -> Self {
        Self {
            turns: vec![Turn::fulfilled(Message::assistant(WELCOME))],
            input: String::new(),
            attachment: None,
            loading: false,
            options,
        }
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.input = text.into();
    }

    pub fn attachment(&self) -> Option<&Attachment> {
        self.attachment.as_ref()
    }

    pub fn attach(&mut self, attachment: Attachment) {
        self.attachment = Some(attachment);
    }

    pub fn preview(&self) -> Option<String> {
        self.attachment.as_ref().map(Attachment::data_uri)
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Whether the send control is enabled.
    pub fn can_send(&self) -> bool {
        !self.loading
    }

    /// Appends the user turn and the placeholder, and returns the work to do.
    ///
    /// Returns `None`, leaving the session untouched, when a call is already
    /// pending or when there is neither text nor an image to send.
    pub fn begin(&mut self, text: &str, predefined: bool) -> Option<Dispatch> {
        if self.loading {
            debug!("submission ignored while a request is pending");
            return None;
        }
        if text.trim().is_empty() && self.attachment.is_none() {
            return None;
        }

        self.loading = true;
        let mut user = Message::user(text);
        user.image = self.preview();
        self.turns.push(Turn::fulfilled(user));

        let context = conversation::window(&self.turns, self.options.window)
            .iter()
            .map(|turn| turn.message.without_image())
            .collect();
        self.turns.push(Turn::placeholder());

        if predefined && self.attachment.is_none() {
            return Some(Dispatch::AwaitImage);
        }

        Some(Dispatch::Send(AnalyzeRequest {
            message: text.to_string(),
            conversation: context,
            image: self.attachment.clone(),
        }))
    }

    /// Settles the pending placeholder with the outcome of the network call.
    /// Without a pending placeholder nothing changes, the composer included.
    pub fn resolve(&mut self, outcome: Result<AnalyzeResponse, TransportError>) {
        let settled = match outcome {
            Ok(reply) => {
                let settled = self.settle(Message::assistant(reply.result), Lifecycle::Fulfilled);
                if settled {
                    if let Some(url) = reply.image_url {
                        self.replace_preview(url);
                    }
                }
                settled
            }
            Err(err) => {
                warn!("analyze request failed: {}", err);
                self.settle(Message::assistant(ERROR_REPLY), Lifecycle::Failed)
            }
        };
        if settled {
            self.reset_composer();
        }
    }

    /// Settles the placeholder of a quick prompt that was sent without an image.
    pub fn resolve_missing_image(&mut self) {
        if self.settle(Message::assistant(NEEDS_IMAGE_REPLY), Lifecycle::Fulfilled) {
            self.reset_composer();
        }
    }

    /// Sends `text` with the current attachment. Returns whether anything was sent.
    pub async fn submit<T>(&mut self, transport: &T, text: &str) -> bool
    where
        T: AnalyzeTransport + ?Sized,
    {
        self.run(transport, text, false).await
    }

    /// Sends one of the predefined prompts. Without an attachment the network
    /// is skipped and the session asks for an image after a short delay.
    pub async fn select_quick_prompt<T>(&mut self, transport: &T, label: &str) -> bool
    where
        T: AnalyzeTransport + ?Sized,
    {
        self.run(transport, label, true).await
    }

    async fn run<T>(&mut self, transport: &T, text: &str, predefined: bool) -> bool
    where
        T: AnalyzeTransport + ?Sized,
    {
        match self.begin(text, predefined) {
            None => false,
            Some(Dispatch::AwaitImage) => {
                tokio::time::sleep(self.options.prompt_delay).await;
                self.resolve_missing_image();
                true
            }
            Some(Dispatch::Send(request)) => {
                let outcome = transport.analyze(request).await;
                self.resolve(outcome);
                true
            }
        }
    }

    fn settle(&mut self, message: Message, lifecycle: Lifecycle) -> bool {
        match self.turns.last_mut() {
            Some(turn) if turn.is_pending() => {
                *turn = Turn { message, lifecycle };
                true
            }
            _ => {
                warn!("no pending placeholder to settle");
                false
            }
        }
    }

    /// Points the user turn before the settled reply at the served image.
    fn replace_preview(&mut self, url: String) {
        let Some(index) = self.turns.len().checked_sub(2) else {
            return;
        };
        let turn = &mut self.turns[index];
        if turn.message.role == Role::User && turn.message.image.is_some() {
            turn.message.image = Some(url);
        }
    }

    fn reset_composer(&mut self) {
        self.input.clear();
        self.attachment = None;
        self.loading = false;
    }
}
