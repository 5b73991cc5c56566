//! Test utilities and common setup.
#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, header};
use contentfiles::storage::LocalBlobStorage;
use contentfiles::{AppState, Config, routes};
use tempfile::TempDir;

/// Multipart boundary used by every test request.
pub const BOUNDARY: &str = "contentfiles-test-boundary";

/// Create a test app backed by local storage in a temp directory.
///
/// The directory is removed when the returned `TempDir` is dropped, so keep
/// it alive for the duration of the test.
pub fn test_app() -> (Router, TempDir) {
    test_app_with_config(Config::default())
}

/// Create a test app with a custom config.
pub fn test_app_with_config(config: Config) -> (Router, TempDir) {
    let dir = TempDir::new().expect("create temp storage dir");
    let storage = Arc::new(LocalBlobStorage::new(dir.path().to_path_buf()));
    let state = AppState::with_config(storage, config);
    (routes::app(state), dir)
}

/// Build a multipart body with a single part.
pub fn multipart_body(field_name: &str, content_type: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"upload.bin\"\r\n",
            field_name
        )
        .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

/// Build an upload request carrying `data` in the `fileData` part.
pub fn upload_request(method: Method, uri: &str, content_type: &str, data: &[u8]) -> Request<Body> {
    multipart_request(method, uri, multipart_body("fileData", content_type, data))
}

/// Build a multipart request from a prepared body.
pub fn multipart_request(method: Method, uri: &str, body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .method(method)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .header(header::CONTENT_LENGTH, body.len())
        .body(Body::from(body))
        .unwrap()
}

/// Build a multipart request streamed in the given chunks, without a
/// `Content-Length` header.
pub fn chunked_request(method: Method, uri: &str, chunks: Vec<Vec<u8>>) -> Request<Body> {
    let stream = futures::stream::iter(
        chunks
            .into_iter()
            .map(|chunk| Ok::<_, std::io::Error>(bytes::Bytes::from(chunk))),
    );
    Request::builder()
        .uri(uri)
        .method(method)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from_stream(stream))
        .unwrap()
}

/// Build a request without a body.
pub fn empty_request(method: Method, uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .method(method)
        .body(Body::empty())
        .unwrap()
}

/// Collect a response body.
pub async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap()
        .to_vec()
}

/// Collect a response body as JSON.
pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}
