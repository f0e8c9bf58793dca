use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Malformed detection #{index}: {reason}")]
    MalformedDetection { index: usize, reason: String },

    #[error("Failed to load catalog: {0}")]
    CatalogLoad(String),

    #[error("Detection source error: {0}")]
    Source(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to decode image: {0}")]
    ImageDecode(String),

    #[error("Failed to encode image: {0}")]
    ImageEncode(String),

    #[error("Upload too large: {size} bytes (max: {max} bytes)")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("Missing file in request")]
    MissingFile,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for ScanError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ScanError::MalformedDetection { .. } => (StatusCode::BAD_REQUEST, "MALFORMED_DETECTION"),
            ScanError::CatalogLoad(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CATALOG_ERROR"),
            ScanError::Source(_) => (StatusCode::INTERNAL_SERVER_ERROR, "SOURCE_ERROR"),
            ScanError::InvalidConfig(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR"),
            ScanError::ImageDecode(_) => (StatusCode::BAD_REQUEST, "UNSUPPORTED_IMAGE"),
            ScanError::ImageEncode(_) => (StatusCode::INTERNAL_SERVER_ERROR, "ENCODE_ERROR"),
            ScanError::PayloadTooLarge { .. } => (StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE"),
            ScanError::MissingFile => (StatusCode::BAD_REQUEST, "MISSING_FILE"),
            ScanError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
            ScanError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        let body = Json(ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
        });

        (status, body).into_response()
    }
}
