//! Incremental reveal of an already-received answer.
//!
//! The answer is disclosed `step_chars` characters at a time every
//! `interval`. Only the final frame carries the full text; a reveal that is
//! cancelled simply ends without one.

use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::mpsc;

use docuchat_core::config::StreamingConfig;
use docuchat_core::{spawn_ticker, TickControl, TickerHandle};

/// One emission of a reveal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevealFrame {
    /// A strict prefix of the answer.
    Partial(String),
    /// The full answer. Always the last frame of a completed reveal.
    Complete(String),
}

impl RevealFrame {
    pub fn text(&self) -> &str {
        match self {
            RevealFrame::Partial(text) | RevealFrame::Complete(text) => text,
        }
    }
}

/// Receiving end of a reveal.
///
/// Yields `None` once the reveal has completed or been cancelled. A stream
/// that ends without a [`RevealFrame::Complete`] was cancelled.
#[derive(Debug)]
pub struct RevealStream {
    rx: mpsc::UnboundedReceiver<RevealFrame>,
}

impl RevealStream {
    pub async fn next(&mut self) -> Option<RevealFrame> {
        self.rx.recv().await
    }
}

/// Drives at most one reveal at a time.
#[derive(Debug)]
pub struct StreamingController {
    step_chars: usize,
    interval: Duration,
    active: Mutex<Option<TickerHandle>>,
}

impl StreamingController {
    pub fn new(config: &StreamingConfig) -> Self {
        Self {
            step_chars: config.step_chars.max(1),
            interval: config.interval(),
            active: Mutex::new(None),
        }
    }

    /// Start revealing `full_text`, cancelling any reveal in progress.
    pub fn reveal(&self, full_text: impl Into<String>) -> RevealStream {
        let full_text = full_text.into();
        let (tx, rx) = mpsc::unbounded_channel();

        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = active.take() {
            if previous.stop() {
                tracing::debug!("Reveal superseded by a new one");
            }
        }

        let total = full_text.chars().count();
        if total == 0 {
            let _ = tx.send(RevealFrame::Complete(String::new()));
            return RevealStream { rx };
        }

        let step = self.step_chars;
        let handle = spawn_ticker(self.interval, move |tick| {
            let cursor = usize::try_from(tick).unwrap_or(usize::MAX).saturating_mul(step);
            if cursor >= total {
                let _ = tx.send(RevealFrame::Complete(full_text.clone()));
                return TickControl::Stop;
            }
            let end = full_text
                .char_indices()
                .nth(cursor)
                .map(|(offset, _)| offset)
                .unwrap_or(full_text.len());
            match tx.send(RevealFrame::Partial(full_text[..end].to_string())) {
                Ok(()) => TickControl::Continue,
                // Receiver dropped: nobody is watching any more.
                Err(_) => TickControl::Stop,
            }
        });
        *active = Some(handle);

        RevealStream { rx }
    }

    /// Cancel the active reveal. Returns whether one was running.
    pub fn cancel(&self) -> bool {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        match active.take() {
            Some(handle) => handle.stop(),
            None => false,
        }
    }

    pub fn is_revealing(&self) -> bool {
        let active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        active.as_ref().is_some_and(|handle| !handle.is_stopped())
    }
}
