//! Cloud provider import.
//!
//! The provider's picker yields a file id, display name and OAuth token. The
//! backend fetches the file itself; this side only posts the pick to
//! `/api/documents/upload/cloud`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use docuchat_core::config::BackendConfig;

use crate::error::UploadError;

pub const CLOUD_UPLOAD_PATH: &str = "/api/documents/upload/cloud";

/// The only provider the backend accepts.
pub const GOOGLE_PROVIDER: &str = "google";

/// A document chosen in the cloud provider's picker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudPick {
    pub file_id: String,
    pub display_name: String,
    pub auth_token: String,
}

/// Body of `POST /api/documents/upload/cloud`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudImportRequest {
    pub project_id: i64,
    pub provider: String,
    pub file_id: String,
    pub oauth_token: String,
    pub file_name: String,
}

impl CloudImportRequest {
    pub fn google(project_id: i64, pick: CloudPick) -> Self {
        Self {
            project_id,
            provider: GOOGLE_PROVIDER.to_string(),
            file_id: pick.file_id,
            oauth_token: pick.auth_token,
            file_name: pick.display_name,
        }
    }
}

/// Response of the cloud import endpoint. Extra fields are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudImportResponse {
    pub file_name: String,
    #[serde(default)]
    pub status: Option<String>,
}

/// Forwards cloud picks to the backend.
#[async_trait]
pub trait CloudImporter: Send + Sync {
    async fn import(&self, request: &CloudImportRequest)
        -> Result<CloudImportResponse, UploadError>;
}

/// [`CloudImporter`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpCloudImporter {
    http: reqwest::Client,
    base_url: String,
}

impl HttpCloudImporter {
    pub fn new(config: &BackendConfig) -> Result<Self, UploadError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            http: builder.build()?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl CloudImporter for HttpCloudImporter {
    async fn import(
        &self,
        request: &CloudImportRequest,
    ) -> Result<CloudImportResponse, UploadError> {
        tracing::debug!(
            project_id = request.project_id,
            provider = %request.provider,
            file = %request.file_name,
            "POST {}",
            CLOUD_UPLOAD_PATH
        );
        let response = self
            .http
            .post(format!("{}{}", self.base_url, CLOUD_UPLOAD_PATH))
            .json(request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response)
    }
}
