//! Voice input/output controller.
//!
//! Wraps a platform speech facility behind [`SpeechCapability`] and enforces
//! single-flight semantics: the controller is idle, listening or speaking,
//! never two at once. Capture and playback share the audio channel, so
//! starting one while the other runs is rejected with `VoiceBusy`, except
//! that a speak request while speaking toggles playback off.

use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use docuchat_core::config::VoiceConfig;
use docuchat_core::{Capability, EventBus, MessageId, SessionEvent, VoiceMode};

use crate::error::ChatError;
use crate::language::SharedLanguage;

/// Events a capture session reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    /// Partial hypothesis. Never committed.
    Interim(String),
    /// Final transcript.
    Final(String),
    /// Capture ended without a transcript.
    Ended,
    Failed(String),
}

/// Events a playback session reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    Ended,
    Failed(String),
}

/// Platform speech facility.
///
/// Implementations report session progress through the returned channel;
/// dropping the sender counts as the session ending.
#[async_trait]
pub trait SpeechCapability: Send + Sync {
    fn supports(&self, capability: Capability) -> bool;

    async fn start_capture(
        &self,
        language: &str,
    ) -> Result<mpsc::UnboundedReceiver<CaptureEvent>, ChatError>;

    fn stop_capture(&self);

    async fn start_playback(
        &self,
        text: &str,
        language: &str,
    ) -> Result<mpsc::UnboundedReceiver<PlaybackEvent>, ChatError>;

    fn stop_playback(&self);
}

/// Speech facility for hosts that have none.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableSpeech;

#[async_trait]
impl SpeechCapability for UnavailableSpeech {
    fn supports(&self, _capability: Capability) -> bool {
        false
    }

    async fn start_capture(
        &self,
        _language: &str,
    ) -> Result<mpsc::UnboundedReceiver<CaptureEvent>, ChatError> {
        Err(ChatError::UnsupportedCapability(Capability::SpeechCapture))
    }

    fn stop_capture(&self) {}

    async fn start_playback(
        &self,
        _text: &str,
        _language: &str,
    ) -> Result<mpsc::UnboundedReceiver<PlaybackEvent>, ChatError> {
        Err(ChatError::UnsupportedCapability(Capability::SpeechPlayback))
    }

    fn stop_playback(&self) {}
}

/// Observable voice state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VoiceState {
    pub mode: VoiceMode,
    /// Message being read aloud. Only set while speaking.
    pub active_message_id: Option<MessageId>,
}

/// Result of [`VoiceController::start_or_stop_listening`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenToggle {
    Started,
    Stopped,
}

/// Result of [`VoiceController::speak`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeakToggle {
    Started,
    Stopped,
    /// Playback of another message was stopped and this one started.
    Switched,
}

#[derive(Debug, Default)]
struct VoiceInner {
    state: VoiceState,
    /// Bumped on every start and stop so stale platform events are ignored.
    generation: u64,
}

#[derive(Debug)]
struct Shared {
    inner: Mutex<VoiceInner>,
    events: EventBus,
}

impl Shared {
    fn lock(&self) -> std::sync::MutexGuard<'_, VoiceInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn announce(&self, state: VoiceState) {
        tracing::debug!(mode = %state.mode, message = ?state.active_message_id, "Voice state");
        self.events.publish(SessionEvent::VoiceChanged {
            mode: state.mode,
            active_message_id: state.active_message_id,
        });
    }

    /// Return to idle if `generation` is still the current session in `mode`.
    fn finish(&self, generation: u64, mode: VoiceMode) -> bool {
        let state = {
            let mut inner = self.lock();
            if inner.generation != generation || inner.state.mode != mode {
                return false;
            }
            inner.generation += 1;
            inner.state = VoiceState::default();
            inner.state
        };
        self.announce(state);
        true
    }
}

/// Single-flight voice controller.
pub struct VoiceController {
    speech: Arc<dyn SpeechCapability>,
    language: SharedLanguage,
    switch_target_on_speak: bool,
    shared: Arc<Shared>,
}

impl std::fmt::Debug for VoiceController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceController")
            .field("state", &self.state())
            .field("switch_target_on_speak", &self.switch_target_on_speak)
            .finish()
    }
}

impl VoiceController {
    pub fn new(
        speech: Arc<dyn SpeechCapability>,
        language: SharedLanguage,
        events: EventBus,
        config: &VoiceConfig,
    ) -> Self {
        Self {
            speech,
            language,
            switch_target_on_speak: config.switch_target_on_speak,
            shared: Arc::new(Shared {
                inner: Mutex::new(VoiceInner::default()),
                events,
            }),
        }
    }

    pub fn state(&self) -> VoiceState {
        self.shared.lock().state
    }

    /// Toggle speech capture.
    ///
    /// While listening this cancels capture; any transcript not yet final is
    /// discarded. While idle it starts capture in the session language; a
    /// final transcript is published as [`SessionEvent::TranscriptCaptured`].
    pub async fn start_or_stop_listening(&self) -> Result<ListenToggle, ChatError> {
        let generation = {
            let mut inner = self.shared.lock();
            let mode = inner.state.mode;
            match mode {
                VoiceMode::Listening => {
                    inner.generation += 1;
                    inner.state = VoiceState::default();
                    let state = inner.state;
                    drop(inner);
                    self.speech.stop_capture();
                    self.shared.announce(state);
                    tracing::info!("Speech capture cancelled");
                    return Ok(ListenToggle::Stopped);
                }
                VoiceMode::Speaking => return Err(ChatError::VoiceBusy(VoiceMode::Speaking)),
                VoiceMode::Idle => {}
            }
            if !self.speech.supports(Capability::SpeechCapture) {
                return Err(ChatError::UnsupportedCapability(Capability::SpeechCapture));
            }
            inner.generation += 1;
            inner.state = VoiceState {
                mode: VoiceMode::Listening,
                active_message_id: None,
            };
            inner.generation
        };
        self.shared.announce(self.state());

        let language = self.language.get();
        let rx = match self.speech.start_capture(&language).await {
            Ok(rx) => rx,
            Err(e) => {
                tracing::warn!(error = %e, "Speech capture failed to start");
                self.shared.finish(generation, VoiceMode::Listening);
                return Err(e);
            }
        };

        if self.shared.lock().generation != generation {
            // Cancelled while the platform was starting up.
            self.speech.stop_capture();
            return Ok(ListenToggle::Started);
        }

        tracing::info!(language = %language, "Speech capture started");
        tokio::spawn(watch_capture(Arc::clone(&self.shared), generation, rx));
        Ok(ListenToggle::Started)
    }

    /// Read `text` aloud for `message_id`, or stop playback if it is running.
    ///
    /// A request while any message is playing stops playback. Unless
    /// `switch_target_on_speak` is set, the new request is dropped and must be
    /// repeated once idle.
    pub async fn speak(&self, text: &str, message_id: MessageId) -> Result<SpeakToggle, ChatError> {
        let stopped = {
            let mut inner = self.shared.lock();
            let mode = inner.state.mode;
            match mode {
                VoiceMode::Speaking => {
                    let previous = inner.state.active_message_id;
                    inner.generation += 1;
                    inner.state = VoiceState::default();
                    Some(previous)
                }
                VoiceMode::Listening => return Err(ChatError::VoiceBusy(VoiceMode::Listening)),
                VoiceMode::Idle => None,
            }
        };

        let switching = match stopped {
            Some(previous) => {
                self.speech.stop_playback();
                self.shared.announce(VoiceState::default());
                tracing::info!(message = ?previous, "Speech playback stopped");
                if !self.switch_target_on_speak || previous == Some(message_id) {
                    return Ok(SpeakToggle::Stopped);
                }
                true
            }
            None => false,
        };

        if !self.speech.supports(Capability::SpeechPlayback) {
            return Err(ChatError::UnsupportedCapability(Capability::SpeechPlayback));
        }

        let generation = {
            let mut inner = self.shared.lock();
            if inner.state.mode != VoiceMode::Idle {
                return Err(ChatError::VoiceBusy(inner.state.mode));
            }
            inner.generation += 1;
            inner.state = VoiceState {
                mode: VoiceMode::Speaking,
                active_message_id: Some(message_id),
            };
            inner.generation
        };
        self.shared.announce(self.state());

        let language = self.language.get();
        let rx = match self.speech.start_playback(text, &language).await {
            Ok(rx) => rx,
            Err(e) => {
                tracing::warn!(error = %e, "Speech playback failed to start");
                self.shared.finish(generation, VoiceMode::Speaking);
                return Err(e);
            }
        };

        if self.shared.lock().generation != generation {
            // Interrupted while the platform was starting up.
            self.speech.stop_playback();
        } else {
            tracing::info!(message = %message_id, language = %language, "Speech playback started");
            tokio::spawn(watch_playback(Arc::clone(&self.shared), generation, rx));
        }

        Ok(if switching {
            SpeakToggle::Switched
        } else {
            SpeakToggle::Started
        })
    }

    /// Stop playback if any is running. Returns whether something stopped.
    pub fn interrupt_playback(&self) -> bool {
        {
            let mut inner = self.shared.lock();
            if inner.state.mode != VoiceMode::Speaking {
                return false;
            }
            inner.generation += 1;
            inner.state = VoiceState::default();
        }
        self.speech.stop_playback();
        self.shared.announce(VoiceState::default());
        true
    }

    /// Stop playback whenever a message is appended to the log.
    ///
    /// The listener ends when the controller is dropped or the bus closes.
    pub fn watch_log(self: &Arc<Self>, mut rx: broadcast::Receiver<SessionEvent>) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            loop {
                let event = rx.recv().await;
                let Some(controller) = weak.upgrade() else {
                    break;
                };
                match event {
                    Ok(SessionEvent::MessageAppended { id, .. }) => {
                        if controller.interrupt_playback() {
                            tracing::debug!(message = %id, "Playback interrupted by new message");
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        // A missed append must still silence playback.
                        tracing::warn!(missed, "Voice listener lagged behind session events");
                        controller.interrupt_playback();
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

async fn watch_capture(
    shared: Arc<Shared>,
    generation: u64,
    mut rx: mpsc::UnboundedReceiver<CaptureEvent>,
) {
    while let Some(event) = rx.recv().await {
        match event {
            CaptureEvent::Interim(partial) => {
                tracing::trace!(len = partial.len(), "Interim transcript ignored");
            }
            CaptureEvent::Final(text) => {
                if shared.finish(generation, VoiceMode::Listening) {
                    tracing::info!(len = text.len(), "Transcript captured");
                    shared
                        .events
                        .publish(SessionEvent::TranscriptCaptured { text });
                }
                return;
            }
            CaptureEvent::Ended => break,
            CaptureEvent::Failed(reason) => {
                tracing::warn!(reason = %reason, "Speech capture failed");
                break;
            }
        }
    }
    shared.finish(generation, VoiceMode::Listening);
}

async fn watch_playback(
    shared: Arc<Shared>,
    generation: u64,
    mut rx: mpsc::UnboundedReceiver<PlaybackEvent>,
) {
    if let Some(PlaybackEvent::Failed(reason)) = rx.recv().await {
        tracing::warn!(reason = %reason, "Speech playback failed");
    }
    if shared.finish(generation, VoiceMode::Speaking) {
        tracing::debug!("Speech playback finished");
    }
}
