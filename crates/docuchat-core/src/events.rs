use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::types::{MessageId, Role, UploadId, UploadStatus, VoiceMode};

/// Capacity of the broadcast channel. Slow subscribers lag rather than block
/// publishers.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Everything the session layer announces to interested components.
///
/// Events are consumed by:
/// - The voice controller (stops playback when the log changes)
/// - The conversation session (receives captured transcripts)
/// - The view layer (re-renders on progress)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum SessionEvent {
    // =========================================================================
    // Conversation Events
    // =========================================================================
    /// A message was appended to the conversation log.
    MessageAppended { id: MessageId, role: Role },

    /// The visible prefix of an answer being revealed grew.
    RevealProgress {
        visible_chars: usize,
        total_chars: usize,
    },

    /// A question or image submission failed at the transport level.
    TurnFailed { reason: String },

    // =========================================================================
    // Voice Events
    // =========================================================================
    /// Speech capture produced a final transcript.
    TranscriptCaptured { text: String },

    /// The voice controller changed mode.
    VoiceChanged {
        mode: VoiceMode,
        active_message_id: Option<MessageId>,
    },

    // =========================================================================
    // Upload Events
    // =========================================================================
    /// An upload item changed status or progress.
    UploadChanged {
        item_id: UploadId,
        status: UploadStatus,
        progress_percent: u8,
    },

    /// An upload item was removed from the queue.
    UploadRemoved { item_id: UploadId },
}

/// Fan-out channel for [`SessionEvent`]s.
///
/// Cloning the bus shares the underlying channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SessionEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn publish(&self, event: SessionEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("Session event dropped, no subscribers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
