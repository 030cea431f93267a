//! Answering backend boundary.
//!
//! The session talks to the backend only through [`AnsweringBackend`]. The
//! HTTP implementation posts JSON to `/api/chat` and a multipart form to
//! `/api/chat/image`.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Deserializer, Serialize};

use docuchat_core::config::BackendConfig;
use docuchat_core::{Role, SourceRef};

use crate::error::ChatError;

pub const CHAT_PATH: &str = "/api/chat";
pub const CHAT_IMAGE_PATH: &str = "/api/chat/image";

// =============================================================================
// Wire types
// =============================================================================

/// Role as the backend spells it: assistant turns are `"ai"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HistoryRole {
    #[serde(rename = "user")]
    User,
    #[serde(rename = "ai")]
    Assistant,
}

impl From<Role> for HistoryRole {
    fn from(role: Role) -> Self {
        match role {
            Role::User => HistoryRole::User,
            Role::Assistant => HistoryRole::Assistant,
        }
    }
}

/// One prior turn sent along with a question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: HistoryRole,
    pub content: String,
}

/// Body of `POST /api/chat`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub project_id: i64,
    pub question: String,
    pub history: Vec<HistoryEntry>,
    pub language: String,
    pub prompt_template: String,
}

/// Response of `POST /api/chat`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ChatAnswer {
    pub answer: String,
    #[serde(default, deserialize_with = "lenient_sources")]
    pub sources: Vec<SourceRef>,
    #[serde(default)]
    pub followups: Option<Vec<String>>,
}

/// An image chosen for an image-grounded question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl ImageUpload {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }

    /// MIME type guessed from the file extension.
    pub fn mime_type(&self) -> String {
        mime_guess::from_path(&self.file_name)
            .first_or_octet_stream()
            .to_string()
    }
}

/// Fields of the `POST /api/chat/image` multipart form.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageChatRequest {
    pub project_id: i64,
    pub image: ImageUpload,
    pub language: String,
    pub prompt_template: String,
    pub history: Vec<HistoryEntry>,
}

/// Response of `POST /api/chat/image`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ImageAnswer {
    pub answer: String,
    #[serde(default)]
    pub ocr_text: Option<String>,
    #[serde(default, deserialize_with = "lenient_sources")]
    pub sources: Vec<SourceRef>,
    /// Where the backend stored its copy of the image.
    #[serde(default)]
    pub image_url: Option<String>,
}

/// Sources arrive either as `{name, page}` objects or as bare chunk labels.
#[derive(Deserialize)]
#[serde(untagged)]
enum WireSource {
    Named {
        name: String,
        #[serde(default)]
        page: Option<u32>,
    },
    Index(i64),
    Label(String),
}

impl From<WireSource> for SourceRef {
    fn from(source: WireSource) -> Self {
        match source {
            WireSource::Named { name, page } => SourceRef {
                document_name: name,
                page_number: page,
            },
            WireSource::Index(index) => SourceRef {
                document_name: format!("chunk {}", index),
                page_number: None,
            },
            WireSource::Label(label) => SourceRef {
                document_name: label,
                page_number: None,
            },
        }
    }
}

fn lenient_sources<'de, D>(deserializer: D) -> Result<Vec<SourceRef>, D::Error>
where
    D: Deserializer<'de>,
{
    let wire: Option<Vec<WireSource>> = Option::deserialize(deserializer)?;
    Ok(wire
        .unwrap_or_default()
        .into_iter()
        .map(SourceRef::from)
        .collect())
}

// =============================================================================
// Backend trait
// =============================================================================

/// The external answering engine.
#[async_trait]
pub trait AnsweringBackend: Send + Sync {
    /// Answer a text question.
    async fn ask(&self, request: &ChatRequest) -> Result<ChatAnswer, ChatError>;

    /// Answer a question grounded on an image.
    async fn ask_image(&self, request: &ImageChatRequest) -> Result<ImageAnswer, ChatError>;
}

/// [`AnsweringBackend`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    http: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    /// Build a client honoring the configured request timeout.
    pub fn new(config: &BackendConfig) -> Result<Self, ChatError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            http: builder.build()?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl AnsweringBackend for HttpBackend {
    async fn ask(&self, request: &ChatRequest) -> Result<ChatAnswer, ChatError> {
        tracing::debug!(
            project_id = request.project_id,
            history_len = request.history.len(),
            "POST {}",
            CHAT_PATH
        );
        let answer = self
            .http
            .post(self.endpoint(CHAT_PATH))
            .json(request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(answer)
    }

    async fn ask_image(&self, request: &ImageChatRequest) -> Result<ImageAnswer, ChatError> {
        tracing::debug!(
            project_id = request.project_id,
            image = %request.image.file_name,
            bytes = request.image.bytes.len(),
            "POST {}",
            CHAT_IMAGE_PATH
        );
        let history = serde_json::to_string(&request.history)
            .map_err(|e| ChatError::Transport(format!("history encoding failed: {}", e)))?;
        let image = Part::bytes(request.image.bytes.clone())
            .file_name(request.image.file_name.clone())
            .mime_str(&request.image.mime_type())?;
        let form = Form::new()
            .text("project_id", request.project_id.to_string())
            .part("image", image)
            .text("language", request.language.clone())
            .text("prompt_template", request.prompt_template.clone())
            .text("history", history);

        let answer = self
            .http
            .post(self.endpoint(CHAT_IMAGE_PATH))
            .multipart(form)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(answer)
    }
}
