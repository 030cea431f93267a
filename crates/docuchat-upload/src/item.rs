//! One upload's lifecycle: `pending -> uploading -> {completed, error}`.

use serde::Serialize;

use docuchat_core::{SourceKind, UploadId, UploadStatus};

use crate::error::UploadError;

/// A unit of ingestion content tracked through upload progress.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadItem {
    pub id: UploadId,
    pub display_name: String,
    pub size_bytes: Option<u64>,
    pub source_kind: SourceKind,
    pub status: UploadStatus,
    pub progress_percent: u8,
    /// Reason recorded when the item moved to `error`.
    pub error: Option<String>,
    #[serde(skip)]
    progress: f64,
}

impl UploadItem {
    /// A new item waiting to start.
    pub fn pending(
        display_name: impl Into<String>,
        size_bytes: Option<u64>,
        source_kind: SourceKind,
    ) -> Self {
        Self {
            id: UploadId::new(),
            display_name: display_name.into(),
            size_bytes,
            source_kind,
            status: UploadStatus::Pending,
            progress_percent: 0,
            error: None,
            progress: 0.0,
        }
    }

    /// An item whose transfer already finished elsewhere.
    pub fn completed(display_name: impl Into<String>, source_kind: SourceKind) -> Self {
        Self {
            status: UploadStatus::Completed,
            progress_percent: 100,
            progress: 100.0,
            ..Self::pending(display_name, None, source_kind)
        }
    }

    fn transition(&mut self, target: UploadStatus) -> Result<(), UploadError> {
        if !self.status.can_transition_to(&target) {
            return Err(UploadError::InvalidTransition {
                from: self.status,
                to: target,
            });
        }
        tracing::debug!(item = %self.id.short(), "Upload state: {} -> {}", self.status, target);
        self.status = target;
        Ok(())
    }

    /// Move from `pending` to `uploading`.
    pub fn begin(&mut self) -> Result<(), UploadError> {
        self.transition(UploadStatus::Uploading)
    }

    /// Add `increment` percent of progress.
    ///
    /// Reaching 100 clamps to exactly 100 and completes the item. Returns
    /// whether the item completed. Items not uploading are left untouched.
    pub fn advance(&mut self, increment: f64) -> bool {
        if self.status != UploadStatus::Uploading {
            return false;
        }
        self.progress += increment.max(0.0);
        if self.progress >= 100.0 {
            self.progress = 100.0;
            self.progress_percent = 100;
            self.status = UploadStatus::Completed;
            tracing::debug!(item = %self.id.short(), "Upload state: uploading -> completed");
            return true;
        }
        // 100 is reserved for completed items.
        self.progress_percent = (self.progress.round() as u8).min(99);
        false
    }

    /// Move an uploading item to `error`.
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), UploadError> {
        self.transition(UploadStatus::Error)?;
        self.error = Some(reason.into());
        Ok(())
    }
}
