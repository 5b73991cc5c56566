//! Request validation for content file operations.
//!
//! All validation is pure (no side effects). Every function returns `Ok(())`
//! or the `ErrorResponse` that should be sent back as a 400.

use crate::error::{ErrorNumber, ErrorResponse};
use crate::service::Upload;

/// Route parameter naming the container.
pub const CONTAINER_NAME_PARAM: &str = "containerName";

/// Route parameter naming the file.
pub const FILE_NAME_PARAM: &str = "fileName";

/// Multipart field carrying the uploaded file.
pub const FILE_DATA_PARAM: &str = "fileData";

/// Minimum resource name length, in characters.
pub const MIN_NAME_LEN: usize = 1;

/// Maximum resource name length, in characters.
pub const MAX_NAME_LEN: usize = 75;

/// Containers whose name contains this marker get public blob access.
pub const PUBLIC_MARKER: &str = "public";

/// Validate a container or file name.
///
/// Checks, in order: present, not blank, at least `min` and at most `max`
/// characters long.
pub fn validate_resource_name(
    value: Option<&str>,
    parameter_name: &str,
    min: usize,
    max: usize,
) -> Result<(), ErrorResponse> {
    let Some(value) = value else {
        return Err(ErrorResponse::for_parameter(
            ErrorNumber::NotNull,
            parameter_name,
            None,
        ));
    };
    if value.trim().is_empty() {
        return Err(ErrorResponse::for_parameter(
            ErrorNumber::Required,
            parameter_name,
            Some(value),
        ));
    }

    let len = value.chars().count();
    if len < min {
        return Err(ErrorResponse::for_parameter(
            ErrorNumber::TooSmall,
            parameter_name,
            Some(value),
        ));
    }
    if len > max {
        return Err(ErrorResponse::for_parameter(
            ErrorNumber::TooLarge,
            parameter_name,
            Some(value),
        ));
    }
    Ok(())
}

/// Validate a name with the default 1..=75 length bounds.
pub fn validate_default_resource_name(
    value: Option<&str>,
    parameter_name: &str,
) -> Result<(), ErrorResponse> {
    validate_resource_name(value, parameter_name, MIN_NAME_LEN, MAX_NAME_LEN)
}

/// Validate an uploaded file: it must be present and non-empty.
pub fn validate_file(file: Option<&Upload<'_>>) -> Result<(), ErrorResponse> {
    match file {
        None => Err(ErrorResponse::for_parameter(
            ErrorNumber::NotNull,
            FILE_DATA_PARAM,
            None,
        )),
        Some(upload) if upload.is_empty() => Err(ErrorResponse::for_parameter(
            ErrorNumber::TooSmall,
            FILE_DATA_PARAM,
            Some(""),
        )),
        Some(_) => Ok(()),
    }
}

/// Reject a request whose declared body length exceeds the upload limit.
pub fn validate_upload_size(declared_len: Option<u64>, max: u64) -> Result<(), ErrorResponse> {
    match declared_len {
        Some(len) if len > max => Err(ErrorResponse::for_parameter(
            ErrorNumber::TooLarge,
            FILE_DATA_PARAM,
            Some(&len.to_string()),
        )),
        _ => Ok(()),
    }
}

/// Error for a file that grew past the upload limit while streaming.
pub fn file_too_large() -> ErrorResponse {
    ErrorResponse::for_parameter(ErrorNumber::TooLarge, FILE_DATA_PARAM, None)
}

/// Whether a container should be provisioned with public blob access.
pub fn is_public_container(container_name: &str) -> bool {
    container_name.to_lowercase().contains(PUBLIC_MARKER)
}
