//! Storage trait definitions.

use std::fmt;
use std::io;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use super::StorageResult;

/// Content type used when an upload does not declare one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// A stream of body chunks flowing into or out of a backend.
pub type ByteStream<'a> = BoxStream<'a, io::Result<Bytes>>;

/// A blob opened for reading.
pub struct BlobDownload {
    /// Content type recorded when the blob was written.
    pub content_type: String,
    /// Size in bytes, when the backend reports it.
    pub content_length: Option<u64>,
    /// Blob contents.
    pub stream: ByteStream<'static>,
}

impl fmt::Debug for BlobDownload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlobDownload")
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Blob storage operations needed by the content file service.
///
/// Container names arrive already lower-cased. Blob names are used verbatim.
#[async_trait]
pub trait BlobStorage: Send + Sync {
    /// Short backend identifier, reported by the health endpoint.
    fn backend_name(&self) -> &'static str;

    /// Check if a container exists.
    async fn container_exists(&self, container: &str) -> StorageResult<bool>;

    /// Create a container if missing and apply its access level.
    ///
    /// The access level is applied on every call, so a pre-existing container
    /// ends up with the requested visibility as well.
    async fn create_container_if_absent(&self, container: &str, public: bool)
    -> StorageResult<()>;

    /// Check if a blob exists in a container.
    async fn blob_exists(&self, container: &str, blob: &str) -> StorageResult<bool>;

    /// Write (or overwrite) a blob from a stream.
    async fn upload_blob<'a>(
        &self,
        container: &str,
        blob: &str,
        data: ByteStream<'a>,
        content_type: &str,
    ) -> StorageResult<()>;

    /// Open a blob for streaming.
    async fn download_blob(&self, container: &str, blob: &str) -> StorageResult<BlobDownload>;

    /// Delete a blob.
    async fn delete_blob(&self, container: &str, blob: &str) -> StorageResult<()>;

    /// List every blob name in a container, flattened and sorted.
    async fn list_blobs(&self, container: &str) -> StorageResult<Vec<String>>;
}
