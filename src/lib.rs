//! Content file service.
//!
//! A REST facade that stores uploaded files as blobs, addressed by container
//! and file name. It can be used as a standalone binary or embedded in another
//! application through [`routes::content_file_routes`].

pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod service;
pub mod storage;
pub mod validate;

use std::sync::Arc;

pub use config::Config;
pub use error::{ContentFileError, ErrorNumber, ErrorResponse};
pub use service::{ContentFileSummary, ContentFiles, PutOutcome, Upload};
pub use storage::{BlobStorage, StorageConfig};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// File operations over the configured backend
    pub files: ContentFiles,
    /// Configuration
    pub config: Arc<Config>,
}

impl AppState {
    /// Create a new AppState with the given storage and default config.
    pub fn new(storage: Arc<dyn BlobStorage>) -> Self {
        Self::with_config(storage, Config::default())
    }

    /// Create a new AppState with the given storage and config.
    pub fn with_config(storage: Arc<dyn BlobStorage>, config: Config) -> Self {
        Self {
            files: ContentFiles::new(storage),
            config: Arc::new(config),
        }
    }
}
