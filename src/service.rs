//! Content file operations over a blob storage backend.
//!
//! Each operation validates its input, performs the storage calls in a fixed
//! order (container, then blob) and returns a typed outcome. Conversion to
//! HTTP happens in the handlers.

use std::fmt;
use std::io;
use std::sync::Arc;

use bytes::Bytes;
use futures::{StreamExt, stream};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::error::{ContentFileError, ErrorNumber, ErrorResponse};
use crate::storage::{BlobDownload, BlobStorage, ByteStream, StorageError};
use crate::validate::{
    CONTAINER_NAME_PARAM, FILE_DATA_PARAM, FILE_NAME_PARAM, file_too_large, is_public_container,
    validate_default_resource_name, validate_file,
};

/// Listing entry for a stored file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentFileSummary {
    /// Blob name within its container.
    pub name: String,
}

/// Result of a successful put.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// The file did not exist before.
    Created,
    /// An existing file was overwritten.
    Updated,
}

/// An uploaded file, opened for streaming.
///
/// The first non-empty chunk is read eagerly so an empty payload can be
/// rejected before any storage call. The rest stays unread until upload.
pub struct Upload<'a> {
    content_type: String,
    first_chunk: Option<Bytes>,
    rest: ByteStream<'a>,
}

impl<'a> Upload<'a> {
    pub async fn from_stream(
        content_type: impl Into<String>,
        mut body: ByteStream<'a>,
    ) -> io::Result<Self> {
        let mut first_chunk = None;
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            if !chunk.is_empty() {
                first_chunk = Some(chunk);
                break;
            }
        }

        Ok(Self {
            content_type: content_type.into(),
            first_chunk,
            rest: body,
        })
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// True when the payload has no bytes at all.
    pub fn is_empty(&self) -> bool {
        self.first_chunk.is_none()
    }

    /// Reassemble the full payload stream.
    pub fn into_stream(self) -> ByteStream<'a> {
        stream::iter(self.first_chunk.map(Ok))
            .chain(self.rest)
            .boxed()
    }
}

impl fmt::Debug for Upload<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Upload")
            .field("content_type", &self.content_type)
            .field("empty", &self.is_empty())
            .finish_non_exhaustive()
    }
}

/// Validate the container and file names, in that order.
pub fn validate_names(container_name: &str, file_name: &str) -> Result<(), ContentFileError> {
    validate_default_resource_name(Some(container_name), CONTAINER_NAME_PARAM)?;
    validate_default_resource_name(Some(file_name), FILE_NAME_PARAM)?;
    Ok(())
}

/// Log a storage failure with operation context. Other errors pass silently.
fn log_failure(
    operation: &str,
    container_name: &str,
    file_name: Option<&str>,
    err: &ContentFileError,
) {
    if let ContentFileError::Storage(e) = err {
        error!(
            operation,
            container = container_name,
            file = file_name.unwrap_or_default(),
            "Storage failure: {}",
            e
        );
    }
}

/// File operations against one storage backend.
#[derive(Clone)]
pub struct ContentFiles {
    storage: Arc<dyn BlobStorage>,
}

impl ContentFiles {
    pub fn new(storage: Arc<dyn BlobStorage>) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &Arc<dyn BlobStorage> {
        &self.storage
    }

    /// Create or overwrite a file, provisioning its container on first write.
    pub async fn put(
        &self,
        container_name: &str,
        file_name: &str,
        file: Option<Upload<'_>>,
    ) -> Result<PutOutcome, ContentFileError> {
        self.put_inner(container_name, file_name, file)
            .await
            .inspect_err(|e| log_failure("put", container_name, Some(file_name), e))
    }

    async fn put_inner(
        &self,
        container_name: &str,
        file_name: &str,
        file: Option<Upload<'_>>,
    ) -> Result<PutOutcome, ContentFileError> {
        validate_names(container_name, file_name)?;
        let upload = require_file(file)?;

        let container = container_name.to_lowercase();
        self.storage
            .create_container_if_absent(&container, is_public_container(container_name))
            .await?;

        let pre_existing = self.storage.blob_exists(&container, file_name).await?;
        let content_type = upload.content_type().to_string();
        self.storage
            .upload_blob(&container, file_name, upload.into_stream(), &content_type)
            .await
            .map_err(upload_error)?;

        if pre_existing {
            info!(event = "update_item", "Updated {}:{} via put", container_name, file_name);
            Ok(PutOutcome::Updated)
        } else {
            info!(event = "insert_item", "Inserted {}:{}", container_name, file_name);
            Ok(PutOutcome::Created)
        }
    }

    /// Overwrite an existing file.
    pub async fn update(
        &self,
        container_name: &str,
        file_name: &str,
        file: Option<Upload<'_>>,
    ) -> Result<(), ContentFileError> {
        self.update_inner(container_name, file_name, file)
            .await
            .inspect_err(|e| log_failure("update", container_name, Some(file_name), e))
    }

    async fn update_inner(
        &self,
        container_name: &str,
        file_name: &str,
        file: Option<Upload<'_>>,
    ) -> Result<(), ContentFileError> {
        validate_names(container_name, file_name)?;
        let upload = require_file(file)?;

        let container = self
            .existing_container(container_name, file_name, "update_item_not_found")
            .await?;
        self.existing_blob(&container, container_name, file_name, "update_item_not_found")
            .await?;

        let content_type = upload.content_type().to_string();
        self.storage
            .upload_blob(&container, file_name, upload.into_stream(), &content_type)
            .await
            .map_err(upload_error)?;

        info!(event = "update_item", "Updated {}:{} via patch", container_name, file_name);
        Ok(())
    }

    /// Delete an existing file.
    pub async fn delete(
        &self,
        container_name: &str,
        file_name: &str,
    ) -> Result<(), ContentFileError> {
        self.delete_inner(container_name, file_name)
            .await
            .inspect_err(|e| log_failure("delete", container_name, Some(file_name), e))
    }

    async fn delete_inner(
        &self,
        container_name: &str,
        file_name: &str,
    ) -> Result<(), ContentFileError> {
        validate_names(container_name, file_name)?;

        let container = self
            .existing_container(container_name, file_name, "delete_item_not_found")
            .await?;
        self.existing_blob(&container, container_name, file_name, "delete_item_not_found")
            .await?;

        self.storage.delete_blob(&container, file_name).await?;
        info!(event = "delete_item", "Deleted {}:{}", container_name, file_name);
        Ok(())
    }

    /// Open an existing file for streaming.
    pub async fn get(
        &self,
        container_name: &str,
        file_name: &str,
    ) -> Result<BlobDownload, ContentFileError> {
        self.get_inner(container_name, file_name)
            .await
            .inspect_err(|e| log_failure("get", container_name, Some(file_name), e))
    }

    async fn get_inner(
        &self,
        container_name: &str,
        file_name: &str,
    ) -> Result<BlobDownload, ContentFileError> {
        validate_names(container_name, file_name)?;

        let container = self
            .existing_container(container_name, file_name, "get_item_not_found")
            .await?;
        self.existing_blob(&container, container_name, file_name, "get_item_not_found")
            .await?;

        let download = self.storage.download_blob(&container, file_name).await?;
        info!(event = "get_item", "Got {}:{}", container_name, file_name);
        Ok(download)
    }

    /// List every file in a container.
    pub async fn list(
        &self,
        container_name: &str,
    ) -> Result<Vec<ContentFileSummary>, ContentFileError> {
        self.list_inner(container_name)
            .await
            .inspect_err(|e| log_failure("list", container_name, None, e))
    }

    async fn list_inner(
        &self,
        container_name: &str,
    ) -> Result<Vec<ContentFileSummary>, ContentFileError> {
        validate_default_resource_name(Some(container_name), CONTAINER_NAME_PARAM)?;

        let container = container_name.to_lowercase();
        if !self.storage.container_exists(&container).await? {
            warn!(
                event = "get_item_not_found",
                "Could not find containerName: {} for get all", container_name
            );
            return Err(ContentFileError::not_found(CONTAINER_NAME_PARAM, container_name));
        }

        let names = self.storage.list_blobs(&container).await?;
        Ok(names
            .into_iter()
            .map(|name| ContentFileSummary { name })
            .collect())
    }

    /// Resolve the storage key of a container that must already exist.
    async fn existing_container(
        &self,
        container_name: &str,
        file_name: &str,
        event: &'static str,
    ) -> Result<String, ContentFileError> {
        let container = container_name.to_lowercase();
        if !self.storage.container_exists(&container).await? {
            warn!(event, "Could not find containerName: {}:{}", container_name, file_name);
            return Err(ContentFileError::not_found(CONTAINER_NAME_PARAM, container_name));
        }
        Ok(container)
    }

    async fn existing_blob(
        &self,
        container: &str,
        container_name: &str,
        file_name: &str,
        event: &'static str,
    ) -> Result<(), ContentFileError> {
        if !self.storage.blob_exists(container, file_name).await? {
            warn!(event, "Could not find fileName: {}:{}", container_name, file_name);
            return Err(ContentFileError::not_found(FILE_NAME_PARAM, file_name));
        }
        Ok(())
    }
}

/// Map a failed upload, reporting a payload cut off at the size limit as TOOLARGE.
fn upload_error(err: StorageError) -> ContentFileError {
    match err {
        StorageError::Io(e) if e.kind() == io::ErrorKind::FileTooLarge => file_too_large().into(),
        other => other.into(),
    }
}

/// Validate the payload and unwrap it.
fn require_file(file: Option<Upload<'_>>) -> Result<Upload<'_>, ContentFileError> {
    validate_file(file.as_ref())?;
    file.ok_or_else(|| {
        ErrorResponse::for_parameter(ErrorNumber::NotNull, FILE_DATA_PARAM, None).into()
    })
}
