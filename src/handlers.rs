use std::io;

use axum::{
    Json,
    body::Body,
    extract::{
        Multipart, Path, State,
        multipart::{MultipartError, MultipartRejection},
    },
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use futures::StreamExt;
use serde::Serialize;
use tracing::{debug, warn};

use crate::AppState;
use crate::error::ContentFileError;
use crate::routes::API_PREFIX;
use crate::service::{ContentFileSummary, PutOutcome, Upload, validate_names};
use crate::storage::DEFAULT_CONTENT_TYPE;
use crate::validate::{FILE_DATA_PARAM, file_too_large, validate_upload_size};

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub storage: &'static str,
}

// ============================================================================
// Helper functions
// ============================================================================

/// Location of a file resource, with both names percent-encoded.
pub fn file_location(container_name: &str, file_name: &str) -> String {
    format!(
        "{}/{}/contentfiles/{}",
        API_PREFIX,
        urlencoding::encode(container_name),
        urlencoding::encode(file_name)
    )
}

fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

fn multipart_io_error(e: MultipartError) -> io::Error {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        io::Error::new(io::ErrorKind::FileTooLarge, e)
    } else {
        io::Error::other(e)
    }
}

/// Open the `fileData` part of a multipart body.
///
/// Only the first part is considered. A missing or malformed body, or a first
/// part with another name, counts as no file. A body or file over the size
/// limit fails with TOOLARGE, and the file stream itself stops with a
/// `FileTooLarge` error once it passes `max_upload_size` bytes.
async fn read_upload(
    multipart: &mut Result<Multipart, MultipartRejection>,
    max_upload_size: u64,
) -> Result<Option<Upload<'_>>, ContentFileError> {
    let multipart = match multipart {
        Ok(multipart) => multipart,
        Err(rejection) => {
            debug!("No multipart body: {}", rejection);
            return Ok(None);
        }
    };

    let field = match multipart.next_field().await {
        Ok(Some(field)) => field,
        Ok(None) => return Ok(None),
        Err(e) if e.status() == StatusCode::PAYLOAD_TOO_LARGE => {
            warn!("Multipart body over the size limit: {}", e);
            return Err(file_too_large().into());
        }
        Err(e) => {
            warn!("Multipart error parsing field: {}", e);
            return Ok(None);
        }
    };

    if field.name() != Some(FILE_DATA_PARAM) {
        warn!(
            "Ignoring multipart field {:?}, expected {}",
            field.name(),
            FILE_DATA_PARAM
        );
        return Ok(None);
    }

    let content_type = field
        .content_type()
        .unwrap_or(DEFAULT_CONTENT_TYPE)
        .to_string();

    let mut received = 0u64;
    let body = field
        .map(move |chunk| -> io::Result<Bytes> {
            let chunk = chunk.map_err(multipart_io_error)?;
            received = received.saturating_add(chunk.len() as u64);
            if received > max_upload_size {
                return Err(io::Error::new(
                    io::ErrorKind::FileTooLarge,
                    format!("upload exceeds {} bytes", max_upload_size),
                ));
            }
            Ok(chunk)
        })
        .boxed();

    match Upload::from_stream(content_type, body).await {
        Ok(upload) => Ok(Some(upload)),
        Err(e) if e.kind() == io::ErrorKind::FileTooLarge => {
            warn!("Upload over the size limit: {}", e);
            Err(file_too_large().into())
        }
        Err(e) => {
            warn!("Failed to read upload data: {}", e);
            Ok(None)
        }
    }
}

/// Checks that must pass before the request body is touched.
fn precheck_upload(
    state: &AppState,
    container_name: &str,
    file_name: &str,
    headers: &HeaderMap,
) -> Result<(), ContentFileError> {
    validate_names(container_name, file_name)?;
    validate_upload_size(declared_length(headers), state.config.max_request_size())?;
    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /health - Health check endpoint
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        storage: state.files.storage().backend_name(),
    })
}

/// PUT /api/v1/{containerName}/contentfiles/{fileName} - Create or replace a file
pub async fn put_file(
    State(state): State<AppState>,
    Path((container_name, file_name)): Path<(String, String)>,
    headers: HeaderMap,
    mut multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ContentFileError> {
    precheck_upload(&state, &container_name, &file_name, &headers)?;

    let upload = read_upload(&mut multipart, state.config.max_upload_size).await?;
    let outcome = state.files.put(&container_name, &file_name, upload).await?;

    Ok(match outcome {
        PutOutcome::Created => (
            StatusCode::CREATED,
            [(header::LOCATION, file_location(&container_name, &file_name))],
        )
            .into_response(),
        PutOutcome::Updated => StatusCode::NO_CONTENT.into_response(),
    })
}

/// PATCH /api/v1/{containerName}/contentfiles/{fileName} - Replace an existing file
pub async fn update_file(
    State(state): State<AppState>,
    Path((container_name, file_name)): Path<(String, String)>,
    headers: HeaderMap,
    mut multipart: Result<Multipart, MultipartRejection>,
) -> Result<StatusCode, ContentFileError> {
    precheck_upload(&state, &container_name, &file_name, &headers)?;

    let upload = read_upload(&mut multipart, state.config.max_upload_size).await?;
    state
        .files
        .update(&container_name, &file_name, upload)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/v1/{containerName}/contentfiles/{fileName} - Delete a file
pub async fn delete_file(
    State(state): State<AppState>,
    Path((container_name, file_name)): Path<(String, String)>,
) -> Result<StatusCode, ContentFileError> {
    state.files.delete(&container_name, &file_name).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/{containerName}/contentfiles/{fileName} - Stream a file
///
/// The blob is streamed straight from storage with its stored content type.
pub async fn get_file(
    State(state): State<AppState>,
    Path((container_name, file_name)): Path<(String, String)>,
) -> Result<Response, ContentFileError> {
    let download = state.files.get(&container_name, &file_name).await?;

    let content_type = HeaderValue::from_str(&download.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_CONTENT_TYPE));

    let mut response = (
        StatusCode::OK,
        [(header::CONTENT_TYPE, content_type)],
        Body::from_stream(download.stream),
    )
        .into_response();
    if let Some(len) = download.content_length {
        response
            .headers_mut()
            .insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    }

    Ok(response)
}

/// GET /api/v1/{containerName}/contentfiles - List files in a container
pub async fn list_files(
    State(state): State<AppState>,
    Path(container_name): Path<String>,
) -> Result<Json<Vec<ContentFileSummary>>, ContentFileError> {
    let files = state.files.list(&container_name).await?;
    Ok(Json(files))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_location() {
        assert_eq!(
            file_location("mycontainer", "a.txt"),
            "/api/v1/mycontainer/contentfiles/a.txt"
        );
    }

    #[test]
    fn test_file_location_encodes_names() {
        assert_eq!(
            file_location("My Container", "dir/a b.txt"),
            "/api/v1/My%20Container/contentfiles/dir%2Fa%20b.txt"
        );
    }

    #[test]
    fn test_declared_length() {
        let mut headers = HeaderMap::new();
        assert_eq!(declared_length(&headers), None);

        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("1234"));
        assert_eq!(declared_length(&headers), Some(1234));

        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("junk"));
        assert_eq!(declared_length(&headers), None);
    }
}
