//! Azure Blob Storage implementation.
//!
//! Uploads are staged as fixed-size blocks and committed with a block list, so
//! a request body is never held in memory beyond one block. Downloads are
//! streamed as ranged chunks.

use std::fmt;
use std::io;

use async_trait::async_trait;
use azure_core::StatusCode;
use azure_core::error::ErrorKind;
use azure_storage::{CloudLocation, ConnectionString};
use azure_storage_blobs::prelude::*;
use bytes::BytesMut;
use futures::{StreamExt, TryStreamExt, stream};
use tracing::debug;

use super::{BlobDownload, BlobStorage, ByteStream, StorageError, StorageResult};

/// Size of each staged block (4 MiB).
const BLOCK_SIZE: usize = 4 * 1024 * 1024;

/// Size of each ranged read when streaming a blob out (4 MiB).
const DOWNLOAD_CHUNK_SIZE: u64 = 4 * 1024 * 1024;

/// Well-known account of the local storage emulator.
const EMULATOR_ACCOUNT: &str = "devstoreaccount1";

/// Default blob port of the local storage emulator.
const EMULATOR_BLOB_PORT: u16 = 10000;

/// Azure Blob Storage backend.
#[derive(Clone)]
pub struct AzureBlobStorage {
    account_name: String,
    client: BlobServiceClient,
}

impl fmt::Debug for AzureBlobStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureBlobStorage")
            .field("account_name", &self.account_name)
            .finish()
    }
}

impl AzureBlobStorage {
    /// Create a backend from an Azure storage connection string.
    ///
    /// Supports account key and SAS credentials, `UseDevelopmentStorage=true`
    /// and an explicit `BlobEndpoint`, with or without `AccountName`.
    pub fn from_connection_string(connection_string: &str) -> StorageResult<Self> {
        if connection_string.trim().is_empty() {
            return Err(StorageError::Backend(
                "connection string cannot be empty".to_string(),
            ));
        }

        let parsed = ConnectionString::new(connection_string)?;

        if parsed.use_development_storage == Some(true) {
            debug!("Using Azure storage emulator defaults");
            return Ok(Self {
                account_name: EMULATOR_ACCOUNT.to_string(),
                client: ClientBuilder::emulator().blob_service_client(),
            });
        }

        let (account_name, location) =
            resolve_location(parsed.account_name, parsed.blob_endpoint)?;
        let credentials = parsed.storage_credentials()?;
        debug!("Using Azure storage account {}", account_name);

        Ok(Self {
            account_name,
            client: ClientBuilder::with_location(location, credentials).blob_service_client(),
        })
    }

    /// Storage account this backend talks to.
    pub fn account_name(&self) -> &str {
        &self.account_name
    }

    fn container(&self, container: &str) -> ContainerClient {
        self.client.container_client(container)
    }

    fn blob(&self, container: &str, blob: &str) -> BlobClient {
        self.container(container).blob_client(blob)
    }
}

/// Resolve the account name and service location of a connection string.
///
/// Without a `BlobEndpoint` the public cloud endpoint of `AccountName` is
/// used. A loopback endpoint is an emulator. Any other endpoint is used as
/// given, and the account name falls back to the endpoint's first host label.
fn resolve_location(
    account_name: Option<&str>,
    blob_endpoint: Option<&str>,
) -> StorageResult<(String, CloudLocation)> {
    let Some(endpoint) = blob_endpoint else {
        let account = account_name
            .ok_or_else(|| {
                StorageError::Backend(
                    "connection string needs AccountName or BlobEndpoint".to_string(),
                )
            })?
            .to_string();
        let location = CloudLocation::Public {
            account: account.clone(),
        };
        return Ok((account, location));
    };

    let url = azure_core::Url::parse(endpoint)
        .map_err(|e| StorageError::Backend(format!("invalid BlobEndpoint: {}", e)))?;
    let host = url
        .host_str()
        .ok_or_else(|| StorageError::Backend("BlobEndpoint is missing a host".to_string()))?;

    if is_loopback(host) {
        let account = account_name.unwrap_or(EMULATOR_ACCOUNT).to_string();
        let location = CloudLocation::Emulator {
            address: host.to_string(),
            port: url.port().unwrap_or(EMULATOR_BLOB_PORT),
        };
        return Ok((account, location));
    }

    let account = match account_name {
        Some(account) => account.to_string(),
        None => host
            .split('.')
            .next()
            .filter(|label| !label.is_empty())
            .ok_or_else(|| {
                StorageError::Backend(format!("cannot derive account name from {}", host))
            })?
            .to_string(),
    };
    let location = CloudLocation::Custom {
        account: account.clone(),
        uri: endpoint.trim_end_matches('/').to_string(),
    };
    Ok((account, location))
}

fn is_loopback(host: &str) -> bool {
    matches!(host, "localhost" | "127.0.0.1" | "[::1]")
}

/// Check whether an Azure error is an HTTP response with the given status.
fn has_status(err: &azure_core::Error, expected: StatusCode) -> bool {
    matches!(err.kind(), ErrorKind::HttpResponse { status, .. } if *status == expected)
}

fn not_found_or_azure(err: azure_core::Error, name: &str) -> StorageError {
    if has_status(&err, StatusCode::NotFound) {
        StorageError::NotFound(name.to_string())
    } else {
        StorageError::Azure(err)
    }
}

fn block_id(index: usize) -> String {
    format!("block-{:08}", index)
}

fn access_level(public: bool) -> PublicAccess {
    if public {
        PublicAccess::Blob
    } else {
        PublicAccess::None
    }
}

#[async_trait]
impl BlobStorage for AzureBlobStorage {
    fn backend_name(&self) -> &'static str {
        "azure"
    }

    async fn container_exists(&self, container: &str) -> StorageResult<bool> {
        Ok(self.container(container).exists().await?)
    }

    async fn create_container_if_absent(
        &self,
        container: &str,
        public: bool,
    ) -> StorageResult<()> {
        let client = self.container(container);

        match client.create().public_access(access_level(public)).await {
            Ok(_) => debug!("Created container {} (public: {})", container, public),
            Err(e) if has_status(&e, StatusCode::Conflict) => {
                debug!("Container {} already exists", container);
            }
            Err(e) => return Err(StorageError::Azure(e)),
        }

        client.set_acl(access_level(public)).await?;
        Ok(())
    }

    async fn blob_exists(&self, container: &str, blob: &str) -> StorageResult<bool> {
        match self.blob(container, blob).exists().await {
            Ok(exists) => Ok(exists),
            Err(e) if has_status(&e, StatusCode::NotFound) => Ok(false),
            Err(e) => Err(StorageError::Azure(e)),
        }
    }

    async fn upload_blob<'a>(
        &self,
        container: &str,
        blob: &str,
        mut data: ByteStream<'a>,
        content_type: &str,
    ) -> StorageResult<()> {
        let client = self.blob(container, blob);
        let mut buffer = BytesMut::with_capacity(BLOCK_SIZE);
        let mut blocks = Vec::new();
        let mut total_size = 0u64;

        loop {
            let chunk = data.next().await.transpose()?;
            let finished = chunk.is_none();
            if let Some(chunk) = chunk {
                total_size = total_size.saturating_add(chunk.len() as u64);
                buffer.extend_from_slice(&chunk);
            }

            while buffer.len() >= BLOCK_SIZE || (finished && !buffer.is_empty()) {
                let take = buffer.len().min(BLOCK_SIZE);
                let block = buffer.split_to(take).freeze();
                let id = block_id(blocks.len());
                client
                    .put_block(id.clone(), block)
                    .await
                    .map_err(|e| not_found_or_azure(e, container))?;
                blocks.push(BlobBlockType::new_uncommitted(id));
            }

            if finished {
                break;
            }
        }

        let block_count = blocks.len();
        client
            .put_block_list(BlockList { blocks })
            .content_type(content_type.to_string())
            .await
            .map_err(|e| not_found_or_azure(e, container))?;

        debug!(
            "Uploaded {} bytes in {} blocks to {}/{}",
            total_size, block_count, container, blob
        );
        Ok(())
    }

    async fn download_blob(&self, container: &str, blob: &str) -> StorageResult<BlobDownload> {
        let mut pages = self
            .blob(container, blob)
            .get()
            .chunk_size(DOWNLOAD_CHUNK_SIZE)
            .into_stream();

        let first = match pages.next().await {
            Some(page) => page.map_err(|e| not_found_or_azure(e, blob))?,
            None => {
                return Err(StorageError::Backend(format!(
                    "empty download response for {}/{}",
                    container, blob
                )));
            }
        };
        let content_type = first.blob.properties.content_type.clone();

        let body = stream::once(async move { Ok(first) })
            .chain(pages)
            .map_err(io::Error::other)
            .and_then(|page| async move { page.data.collect().await.map_err(io::Error::other) })
            .boxed();

        Ok(BlobDownload {
            content_type,
            content_length: None,
            stream: body,
        })
    }

    async fn delete_blob(&self, container: &str, blob: &str) -> StorageResult<()> {
        self.blob(container, blob)
            .delete()
            .await
            .map_err(|e| not_found_or_azure(e, blob))?;
        debug!("Deleted {}/{}", container, blob);
        Ok(())
    }

    async fn list_blobs(&self, container: &str) -> StorageResult<Vec<String>> {
        let mut pages = self.container(container).list_blobs().into_stream();

        let mut names = Vec::new();
        while let Some(page) = pages
            .try_next()
            .await
            .map_err(|e| not_found_or_azure(e, container))?
        {
            names.extend(page.blobs.blobs().map(|b| b.name.clone()));
        }

        names.sort();
        debug!("Listed {} blobs in {}", names.len(), container);
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACCOUNT_KEY_CONN: &str = "DefaultEndpointsProtocol=https;AccountName=contentfiles;AccountKey=dGVzdGtleQ==;EndpointSuffix=core.windows.net";

    #[test]
    fn test_from_account_key_connection_string() {
        let storage = AzureBlobStorage::from_connection_string(ACCOUNT_KEY_CONN).unwrap();
        assert_eq!(storage.account_name(), "contentfiles");
        assert_eq!(storage.backend_name(), "azure");
    }

    #[test]
    fn test_from_development_storage() {
        let storage =
            AzureBlobStorage::from_connection_string("UseDevelopmentStorage=true").unwrap();
        assert_eq!(storage.account_name(), "devstoreaccount1");
    }

    #[test]
    fn test_empty_connection_string_fails() {
        assert!(AzureBlobStorage::from_connection_string("").is_err());
        assert!(AzureBlobStorage::from_connection_string("   ").is_err());
    }

    #[test]
    fn test_missing_account_name_fails() {
        let result = AzureBlobStorage::from_connection_string("AccountKey=dGVzdGtleQ==");
        assert!(result.is_err());
    }

    #[test]
    fn test_from_sas_connection_string_without_account_name() {
        let storage = AzureBlobStorage::from_connection_string(
            "BlobEndpoint=https://contentfiles.blob.core.windows.net/;\
             SharedAccessSignature=sv=2022-11-02&ss=b&srt=sco&sp=rwdlac\
             &se=2030-01-01T00:00:00Z&spr=https&sig=c2lnbmF0dXJl",
        )
        .unwrap();
        assert_eq!(storage.account_name(), "contentfiles");
    }

    #[test]
    fn test_https_endpoint_is_used_as_given() {
        let (account, location) = resolve_location(
            Some("contentfiles"),
            Some("https://files.example.com/"),
        )
        .unwrap();
        assert_eq!(account, "contentfiles");
        match location {
            CloudLocation::Custom { account, uri } => {
                assert_eq!(account, "contentfiles");
                assert_eq!(uri, "https://files.example.com");
            }
            _ => panic!("expected a custom location"),
        }
    }

    #[test]
    fn test_endpoint_host_supplies_account_name() {
        let (account, location) =
            resolve_location(None, Some("https://acct.blob.core.windows.net")).unwrap();
        assert_eq!(account, "acct");
        assert!(matches!(location, CloudLocation::Custom { .. }));
    }

    #[test]
    fn test_loopback_endpoint_is_emulator() {
        let (account, location) = resolve_location(
            Some("devstoreaccount1"),
            Some("http://127.0.0.1:10000/devstoreaccount1"),
        )
        .unwrap();
        assert_eq!(account, "devstoreaccount1");
        match location {
            CloudLocation::Emulator { address, port } => {
                assert_eq!(address, "127.0.0.1");
                assert_eq!(port, 10000);
            }
            _ => panic!("expected an emulator location"),
        }
    }

    #[test]
    fn test_account_name_without_endpoint_is_public_cloud() {
        let (account, location) = resolve_location(Some("acct"), None).unwrap();
        assert_eq!(account, "acct");
        assert!(matches!(location, CloudLocation::Public { .. }));
        assert!(resolve_location(None, None).is_err());
    }

    #[test]
    fn test_block_ids_have_equal_length() {
        assert_eq!(block_id(0).len(), block_id(12345).len());
        assert_ne!(block_id(1), block_id(2));
    }

    #[test]
    fn test_access_level() {
        assert!(matches!(access_level(true), PublicAccess::Blob));
        assert!(matches!(access_level(false), PublicAccess::None));
    }
}
