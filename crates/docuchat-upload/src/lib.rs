//! Upload queue for docuchat.
//!
//! Admits local files, URLs and cloud-provider documents and tracks each
//! through its own simulated progress lifecycle.

pub mod cloud;
pub mod error;
pub mod item;
pub mod queue;

pub use cloud::{
    CloudImportRequest, CloudImportResponse, CloudImporter, CloudPick, HttpCloudImporter,
    CLOUD_UPLOAD_PATH,
};
pub use error::UploadError;
pub use item::UploadItem;
pub use queue::{IncrementSource, LocalFile, RandomIncrement, UploadQueue};
