//! Error types for the conversation layer.

use docuchat_core::{Capability, VoiceMode};

/// Errors from the chat session, answering backend and voice controller.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("question cannot be empty")]
    EmptyQuestion,
    #[error("no image attached")]
    MissingImage,
    #[error("a submission is already in flight")]
    SubmissionInFlight,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("backend request timed out")]
    Timeout,
    #[error("{0} is not available on this host")]
    UnsupportedCapability(Capability),
    #[error("voice is busy: {0}")]
    VoiceBusy(VoiceMode),
    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),
}

impl ChatError {
    /// Local rejections: the request never left the session and nothing
    /// changed. Callers treat these as no-ops rather than faults.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            ChatError::EmptyQuestion | ChatError::MissingImage | ChatError::SubmissionInFlight
        )
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ChatError::Timeout
        } else {
            ChatError::Transport(err.to_string())
        }
    }
}
