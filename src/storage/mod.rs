//! Storage abstraction layer.
//!
//! Provides a trait-based blob storage abstraction with implementations for:
//! - Local filesystem storage (development)
//! - Azure Blob Storage (production)

mod azure;
mod error;
mod local;
mod traits;

use std::path::PathBuf;
use std::sync::Arc;

pub use azure::AzureBlobStorage;
pub use error::{StorageError, StorageResult};
pub use local::LocalBlobStorage;
pub use traits::{BlobDownload, BlobStorage, ByteStream, DEFAULT_CONTENT_TYPE};

/// Connection string prefix selecting the local filesystem backend.
pub const LOCAL_SCHEME: &str = "file://";

/// Storage configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageConfig {
    /// Local filesystem storage rooted at a directory.
    Local(PathBuf),
    /// Azure Blob Storage connection string.
    Azure(String),
}

impl StorageConfig {
    /// Derive the backend from a connection string.
    ///
    /// `file:///var/lib/contentfiles` selects local storage, anything else is
    /// treated as an Azure storage connection string.
    pub fn from_connection_string(connection_string: &str) -> Self {
        let trimmed = connection_string.trim();
        match trimmed.strip_prefix(LOCAL_SCHEME) {
            Some(path) => StorageConfig::Local(PathBuf::from(path)),
            None => StorageConfig::Azure(trimmed.to_string()),
        }
    }
}

/// Create storage based on configuration.
pub fn create_storage(config: StorageConfig) -> StorageResult<Arc<dyn BlobStorage>> {
    match config {
        StorageConfig::Local(path) => Ok(Arc::new(LocalBlobStorage::new(path))),
        StorageConfig::Azure(connection_string) => Ok(Arc::new(
            AzureBlobStorage::from_connection_string(&connection_string)?,
        )),
    }
}
