//! Conversation layer for docuchat.
//!
//! Owns the message log and question/answer cycle, the incremental answer
//! reveal, the single-flight voice controller and the prompt template, and
//! talks to the answering backend over HTTP.

pub mod backend;
pub mod error;
pub mod language;
pub mod prompt;
pub mod session;
pub mod streaming;
pub mod voice;

use std::sync::Arc;

use tokio::task::JoinHandle;

use docuchat_core::EventBus;

pub use backend::{
    AnsweringBackend, ChatAnswer, ChatRequest, HistoryEntry, HistoryRole, HttpBackend,
    ImageAnswer, ImageChatRequest, ImageUpload,
};
pub use error::ChatError;
pub use language::{detect_language, SharedLanguage, DEFAULT_LANGUAGE};
pub use prompt::{default_template, PromptTemplateStore};
pub use session::{ConversationSession, SessionSnapshot, TurnOutcome, STARTER_QUESTIONS};
pub use streaming::{RevealFrame, RevealStream, StreamingController};
pub use voice::{
    CaptureEvent, ListenToggle, PlaybackEvent, SpeakToggle, SpeechCapability, UnavailableSpeech,
    VoiceController, VoiceState,
};

/// Connect the session and the voice controller through the event bus.
///
/// Appended messages interrupt playback, and captured transcripts become the
/// session's pending input. The listeners run until the bus closes or either
/// side is dropped.
pub fn link_voice_and_session(
    session: &Arc<ConversationSession>,
    voice: &Arc<VoiceController>,
    events: &EventBus,
) -> Vec<JoinHandle<()>> {
    vec![
        voice.watch_log(events.subscribe()),
        session.watch_transcripts(events.subscribe()),
    ]
}
