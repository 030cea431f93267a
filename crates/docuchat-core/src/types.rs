use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Enums
// =============================================================================

/// Author of a conversation message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// Where an upload item came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Local file selection or drag-and-drop.
    LocalFile,
    /// A URL typed by the user.
    Url,
    /// A document picked through a cloud provider.
    CloudProvider,
}

/// Lifecycle status of one upload item.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    Pending,
    Uploading,
    Completed,
    Error,
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadStatus::Pending => write!(f, "pending"),
            UploadStatus::Uploading => write!(f, "uploading"),
            UploadStatus::Completed => write!(f, "completed"),
            UploadStatus::Error => write!(f, "error"),
        }
    }
}

impl UploadStatus {
    /// Returns whether a transition from `self` to `target` is valid.
    ///
    /// Only `Pending -> Uploading -> {Completed, Error}` is allowed.
    pub fn can_transition_to(&self, target: &UploadStatus) -> bool {
        matches!(
            (self, target),
            (UploadStatus::Pending, UploadStatus::Uploading)
                | (UploadStatus::Uploading, UploadStatus::Completed)
                | (UploadStatus::Uploading, UploadStatus::Error)
        )
    }

    /// Completed and Error are terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadStatus::Completed | UploadStatus::Error)
    }
}

/// What the voice controller is doing right now.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceMode {
    #[default]
    Idle,
    /// Speech capture (speech-to-text) is running.
    Listening,
    /// Speech playback (text-to-speech) is running.
    Speaking,
}

impl fmt::Display for VoiceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VoiceMode::Idle => write!(f, "idle"),
            VoiceMode::Listening => write!(f, "listening"),
            VoiceMode::Speaking => write!(f, "speaking"),
        }
    }
}

/// A platform speech facility.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    SpeechCapture,
    SpeechPlayback,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::SpeechCapture => write!(f, "speech capture"),
            Capability::SpeechPlayback => write!(f, "speech playback"),
        }
    }
}

// =============================================================================
// Newtype Wrappers - Identity
// =============================================================================

/// Sequence number of a message, unique and increasing within a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque identifier of an upload item.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UploadId(pub Uuid);

impl UploadId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// First eight hex characters, enough to address an item from a prompt.
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl Default for UploadId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Domain Structs
// =============================================================================

/// A document passage cited by an answer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub document_name: String,
    pub page_number: Option<u32>,
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.page_number {
            Some(page) => write!(f, "{} (p.{})", self.document_name, page),
            None => write!(f, "{}", self.document_name),
        }
    }
}

/// One entry of the conversation log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub sources: Vec<SourceRef>,
    /// Suggested next questions. Assistant messages only.
    pub followups: Option<Vec<String>>,
    /// Reference to the image a user message was grounded on.
    pub attached_image: Option<String>,
    /// Text extracted from an image. Assistant messages only.
    pub ocr_text: Option<String>,
}

impl Message {
    pub fn user(id: MessageId, content: impl Into<String>) -> Self {
        Self {
            id,
            role: Role::User,
            content: content.into(),
            timestamp: Utc::now(),
            sources: Vec::new(),
            followups: None,
            attached_image: None,
            ocr_text: None,
        }
    }

    pub fn assistant(id: MessageId, content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            ..Self::user(id, content)
        }
    }

    pub fn with_sources(mut self, sources: Vec<SourceRef>) -> Self {
        self.sources = sources;
        self
    }

    pub fn with_followups(mut self, followups: Vec<String>) -> Self {
        self.followups = Some(followups);
        self
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.attached_image = Some(image.into());
        self
    }

    pub fn with_ocr_text(mut self, ocr_text: Option<String>) -> Self {
        self.ocr_text = ocr_text;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_status_transitions() {
        assert!(UploadStatus::Pending.can_transition_to(&UploadStatus::Uploading));
        assert!(UploadStatus::Uploading.can_transition_to(&UploadStatus::Completed));
        assert!(UploadStatus::Uploading.can_transition_to(&UploadStatus::Error));

        assert!(!UploadStatus::Pending.can_transition_to(&UploadStatus::Completed));
        assert!(!UploadStatus::Pending.can_transition_to(&UploadStatus::Error));
        assert!(!UploadStatus::Completed.can_transition_to(&UploadStatus::Uploading));
        assert!(!UploadStatus::Error.can_transition_to(&UploadStatus::Uploading));
        assert!(!UploadStatus::Uploading.can_transition_to(&UploadStatus::Uploading));
    }

    #[test]
    fn test_upload_status_terminal() {
        assert!(!UploadStatus::Pending.is_terminal());
        assert!(!UploadStatus::Uploading.is_terminal());
        assert!(UploadStatus::Completed.is_terminal());
        assert!(UploadStatus::Error.is_terminal());
    }

    #[test]
    fn test_display_impls() {
        assert_eq!(Role::User.to_string(), "user");
        assert_eq!(Role::Assistant.to_string(), "assistant");
        assert_eq!(UploadStatus::Uploading.to_string(), "uploading");
        assert_eq!(VoiceMode::Speaking.to_string(), "speaking");
        assert_eq!(Capability::SpeechCapture.to_string(), "speech capture");
        assert_eq!(MessageId(42).to_string(), "42");
    }

    #[test]
    fn test_source_ref_display() {
        let with_page = SourceRef {
            document_name: "Handbook.pdf".to_string(),
            page_number: Some(3),
        };
        assert_eq!(with_page.to_string(), "Handbook.pdf (p.3)");

        let without_page = SourceRef {
            document_name: "Contract.docx".to_string(),
            page_number: None,
        };
        assert_eq!(without_page.to_string(), "Contract.docx");
    }

    #[test]
    fn test_message_builders() {
        let msg = Message::assistant(MessageId(2), "answer")
            .with_sources(vec![SourceRef {
                document_name: "a.pdf".to_string(),
                page_number: None,
            }])
            .with_followups(vec!["next?".to_string()])
            .with_ocr_text(Some("scanned".to_string()));

        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(msg.sources.len(), 1);
        assert_eq!(msg.followups.as_deref(), Some(&["next?".to_string()][..]));
        assert_eq!(msg.ocr_text.as_deref(), Some("scanned"));
        assert!(msg.attached_image.is_none());
    }

    #[test]
    fn test_user_message_defaults() {
        let msg = Message::user(MessageId(1), "hello").with_image("chart.png");
        assert_eq!(msg.role, Role::User);
        assert!(msg.sources.is_empty());
        assert!(msg.followups.is_none());
        assert_eq!(msg.attached_image.as_deref(), Some("chart.png"));
    }

    #[test]
    fn test_upload_id_unique_and_short() {
        let a = UploadId::new();
        let b = UploadId::new();
        assert_ne!(a, b);
        assert_eq!(a.short().len(), 8);
        assert!(a.to_string().starts_with(&a.short()));
    }

    #[test]
    fn test_voice_mode_default_idle() {
        assert_eq!(VoiceMode::default(), VoiceMode::Idle);
    }

    #[test]
    fn test_role_serde_snake_case() {
        assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), "\"assistant\"");
        assert_eq!(
            serde_json::to_string(&SourceKind::CloudProvider).unwrap(),
            "\"cloud_provider\""
        );
    }
}
