//! Error types for the upload queue.

use docuchat_core::{UploadId, UploadStatus};

/// Errors from admitting, tracking and importing upload items.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("URL cannot be empty")]
    EmptyUrl,
    #[error("upload item not found: {0}")]
    UnknownItem(UploadId),
    #[error("invalid upload transition: {from} -> {to}")]
    InvalidTransition { from: UploadStatus, to: UploadStatus },
    #[error("transport error: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for UploadError {
    fn from(err: reqwest::Error) -> Self {
        UploadError::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_error_display() {
        assert_eq!(UploadError::EmptyUrl.to_string(), "URL cannot be empty");
        let err = UploadError::InvalidTransition {
            from: UploadStatus::Completed,
            to: UploadStatus::Uploading,
        };
        assert_eq!(
            err.to_string(),
            "invalid upload transition: completed -> uploading"
        );
    }
}
