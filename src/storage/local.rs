//! Local filesystem blob storage implementation.
//!
//! Containers and blobs are stored under the SHA-256 of their name, so every
//! valid name maps onto a fixed-length path segment:
//!
//! ```text
//! <base>/<key>/container.json   container name and access level
//! <base>/<key>/blobs/<key>      blob header followed by blob contents
//! <base>/<key>/tmp/             in-flight uploads
//! ```
//!
//! A blob file starts with a 4-byte big-endian length and a JSON header
//! holding the blob name and content type. Contents and properties live in
//! one file, so a single rename replaces both.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::io::ReaderStream;
use tracing::debug;

use super::{BlobDownload, BlobStorage, ByteStream, StorageError, StorageResult};

const CONTAINER_FILE: &str = "container.json";
const BLOBS_DIR: &str = "blobs";
const TMP_DIR: &str = "tmp";

/// Size of the length prefix in front of a blob header.
const HEADER_PREFIX_LEN: u64 = 4;

/// Upper bound for a blob header, guards against reading garbage lengths.
const MAX_HEADER_LEN: u32 = 64 * 1024;

/// Persisted container settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ContainerProperties {
    name: String,
    public_access: bool,
}

/// Header stored in front of every blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BlobHeader {
    name: String,
    content_type: String,
}

/// Local filesystem blob storage.
#[derive(Debug, Clone)]
pub struct LocalBlobStorage {
    /// Base directory for storage.
    base_path: PathBuf,
}

impl LocalBlobStorage {
    /// Create a new local storage instance.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Base directory of this storage.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Whether a container was provisioned with public blob access.
    pub async fn is_public(&self, container: &str) -> StorageResult<bool> {
        let path = self.container_path(container).join(CONTAINER_FILE);
        let raw = fs::read(&path)
            .await
            .map_err(|e| not_found_or_io(e, container))?;
        let props: ContainerProperties = serde_json::from_slice(&raw)
            .map_err(|e| StorageError::Corrupt(format!("container properties: {}", e)))?;
        Ok(props.public_access)
    }

    fn container_path(&self, container: &str) -> PathBuf {
        self.base_path.join(storage_key(container))
    }

    fn blob_path(&self, container: &str, blob: &str) -> PathBuf {
        self.container_path(container)
            .join(BLOBS_DIR)
            .join(storage_key(blob))
    }

    async fn ensure_container(&self, container: &str) -> StorageResult<PathBuf> {
        if !self.container_exists(container).await? {
            return Err(StorageError::NotFound(container.to_string()));
        }
        Ok(self.container_path(container))
    }
}

/// Fixed-length file name for a container or blob name.
fn storage_key(name: &str) -> String {
    hex::encode(Sha256::digest(name.as_bytes()))
}

fn not_found_or_io(e: std::io::Error, name: &str) -> StorageError {
    if e.kind() == std::io::ErrorKind::NotFound {
        StorageError::NotFound(name.to_string())
    } else {
        StorageError::Io(e)
    }
}

/// Serialize a blob header with its length prefix.
fn encode_header(header: &BlobHeader) -> StorageResult<Vec<u8>> {
    let json = serde_json::to_vec(header).map_err(|e| StorageError::Backend(e.to_string()))?;
    let len = u32::try_from(json.len())
        .ok()
        .filter(|len| *len <= MAX_HEADER_LEN)
        .ok_or_else(|| StorageError::Backend("blob header too large".to_string()))?;

    let mut out = Vec::with_capacity(json.len() + HEADER_PREFIX_LEN as usize);
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(&json);
    Ok(out)
}

/// Read the header of an open blob file, leaving the cursor at the contents.
///
/// Returns the header and its size on disk, prefix included.
async fn read_header(file: &mut fs::File) -> StorageResult<(BlobHeader, u64)> {
    let len = file.read_u32().await?;
    if len > MAX_HEADER_LEN {
        return Err(StorageError::Corrupt(format!(
            "blob header length {} exceeds {}",
            len, MAX_HEADER_LEN
        )));
    }

    let mut raw = vec![0u8; len as usize];
    file.read_exact(&mut raw).await?;
    let header = serde_json::from_slice(&raw)
        .map_err(|e| StorageError::Corrupt(format!("blob header: {}", e)))?;
    Ok((header, HEADER_PREFIX_LEN + u64::from(len)))
}

#[async_trait]
impl BlobStorage for LocalBlobStorage {
    fn backend_name(&self) -> &'static str {
        "local"
    }

    async fn container_exists(&self, container: &str) -> StorageResult<bool> {
        let path = self.container_path(container).join(CONTAINER_FILE);
        Ok(fs::try_exists(&path).await?)
    }

    async fn create_container_if_absent(
        &self,
        container: &str,
        public: bool,
    ) -> StorageResult<()> {
        let path = self.container_path(container);
        for dir in [BLOBS_DIR, TMP_DIR] {
            fs::create_dir_all(path.join(dir)).await?;
        }

        let props = serde_json::to_vec(&ContainerProperties {
            name: container.to_string(),
            public_access: public,
        })
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        fs::write(path.join(CONTAINER_FILE), props).await?;

        debug!("Provisioned container {} (public: {})", container, public);
        Ok(())
    }

    async fn blob_exists(&self, container: &str, blob: &str) -> StorageResult<bool> {
        let path = self.blob_path(container, blob);
        Ok(fs::try_exists(&path).await?)
    }

    async fn upload_blob<'a>(
        &self,
        container: &str,
        blob: &str,
        mut data: ByteStream<'a>,
        content_type: &str,
    ) -> StorageResult<()> {
        let container_path = self.ensure_container(container).await?;
        let final_path = self.blob_path(container, blob);
        let header = encode_header(&BlobHeader {
            name: blob.to_string(),
            content_type: content_type.to_string(),
        })?;

        // Dropping the temp path on any early return removes the partial file.
        let temp = tempfile::Builder::new()
            .prefix(".upload-")
            .tempfile_in(container_path.join(TMP_DIR))?;
        let (std_file, temp_path) = temp.into_parts();
        let mut temp_file = fs::File::from_std(std_file);
        temp_file.write_all(&header).await?;

        let mut total_size = 0u64;
        while let Some(chunk) = data.next().await {
            let chunk = chunk?;
            total_size = total_size.saturating_add(chunk.len() as u64);
            temp_file.write_all(&chunk).await?;
        }
        temp_file.flush().await?;
        drop(temp_file);

        temp_path
            .persist(&final_path)
            .map_err(|e| StorageError::Io(e.error))?;

        debug!("Wrote {} bytes to {}/{}", total_size, container, blob);
        Ok(())
    }

    async fn download_blob(&self, container: &str, blob: &str) -> StorageResult<BlobDownload> {
        let path = self.blob_path(container, blob);
        let mut file = fs::File::open(&path)
            .await
            .map_err(|e| not_found_or_io(e, blob))?;
        let file_len = file.metadata().await?.len();
        let (header, header_len) = read_header(&mut file).await?;

        Ok(BlobDownload {
            content_type: header.content_type,
            content_length: Some(file_len.saturating_sub(header_len)),
            stream: ReaderStream::new(file).boxed(),
        })
    }

    async fn delete_blob(&self, container: &str, blob: &str) -> StorageResult<()> {
        let path = self.blob_path(container, blob);
        fs::remove_file(&path)
            .await
            .map_err(|e| not_found_or_io(e, blob))?;

        debug!("Deleted {}/{}", container, blob);
        Ok(())
    }

    async fn list_blobs(&self, container: &str) -> StorageResult<Vec<String>> {
        let blobs_dir = self.ensure_container(container).await?.join(BLOBS_DIR);

        let mut names = vec![];
        let mut read_dir = fs::read_dir(&blobs_dir).await?;
        while let Some(entry) = read_dir.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let mut file = match fs::File::open(entry.path()).await {
                Ok(file) => file,
                // Deleted since the directory was read
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(StorageError::Io(e)),
            };
            let (header, _) = read_header(&mut file).await?;
            names.push(header.name);
        }

        names.sort();
        Ok(names)
    }
}
