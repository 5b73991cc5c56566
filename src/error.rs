use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::storage::StorageError;

/// Stable error numbers reported in every error body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ErrorNumber {
    /// Item already exists.
    Exists = 1,
    /// Parameter is too large/long.
    TooLarge = 2,
    /// Parameter is required.
    Required = 3,
    /// Item with given name is not found.
    NotFound = 4,
    /// Parameter too small.
    TooSmall = 5,
    /// Parameter cannot be null.
    NotNull = 6,
    /// An unexpected error occurred.
    Unknown = 7,
}

impl ErrorNumber {
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Fixed human-readable description for this error number.
    pub fn description(self) -> &'static str {
        match self {
            ErrorNumber::Exists => "The entity already exists",
            ErrorNumber::TooLarge => "The parameter value is too large",
            ErrorNumber::Required => "The parameter is required",
            ErrorNumber::NotFound => "The entity could not be found",
            ErrorNumber::TooSmall => "The parameter value is too small",
            ErrorNumber::NotNull => "The parameter cannot be null",
            ErrorNumber::Unknown => "An unknown error occurred",
        }
    }
}

impl Serialize for ErrorNumber {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

/// Error body returned by every failing request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error_number: ErrorNumber,
    pub parameter_name: Option<String>,
    pub parameter_value: Option<String>,
    pub error_description: &'static str,
}

impl ErrorResponse {
    /// Error that is not tied to a parameter.
    pub fn new(error_number: ErrorNumber) -> Self {
        Self {
            error_number,
            parameter_name: None,
            parameter_value: None,
            error_description: error_number.description(),
        }
    }

    /// Error naming the offending parameter and, if present, its value.
    pub fn for_parameter(
        error_number: ErrorNumber,
        parameter_name: &str,
        parameter_value: Option<&str>,
    ) -> Self {
        Self {
            error_number,
            parameter_name: Some(parameter_name.to_string()),
            parameter_value: parameter_value.map(str::to_string),
            error_description: error_number.description(),
        }
    }

    pub fn unknown() -> Self {
        Self::new(ErrorNumber::Unknown)
    }
}

#[derive(Error, Debug)]
pub enum ContentFileError {
    #[error("Invalid parameter: {}", .0.error_description)]
    Validation(ErrorResponse),

    #[error("Not found: {parameter}={value}")]
    NotFound {
        parameter: &'static str,
        value: String,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl ContentFileError {
    pub fn not_found(parameter: &'static str, value: &str) -> Self {
        ContentFileError::NotFound {
            parameter,
            value: value.to_string(),
        }
    }

    /// HTTP status and body for this error. Storage details never reach the body.
    pub fn to_response_parts(&self) -> (StatusCode, ErrorResponse) {
        match self {
            ContentFileError::Validation(body) => (StatusCode::BAD_REQUEST, body.clone()),
            ContentFileError::NotFound { parameter, value } => (
                StatusCode::NOT_FOUND,
                ErrorResponse::for_parameter(ErrorNumber::NotFound, parameter, Some(value)),
            ),
            ContentFileError::Storage(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, ErrorResponse::unknown())
            }
        }
    }
}

impl From<ErrorResponse> for ContentFileError {
    fn from(body: ErrorResponse) -> Self {
        ContentFileError::Validation(body)
    }
}

impl IntoResponse for ContentFileError {
    fn into_response(self) -> Response {
        let (status, body) = self.to_response_parts();
        (status, Json(body)).into_response()
    }
}
