//! Error types for the driver-ready webhook
//!
//! Provides structured error types for the admission boundary, the storage
//! class watcher and process bootstrap.

use axum::http::StatusCode;
use thiserror::Error;

/// Unified error type for the webhook
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Kubernetes Errors
    // =========================================================================
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Resource not found: {kind}/{name}")]
    ResourceNotFound { kind: String, name: String },

    // =========================================================================
    // Admission Errors
    // =========================================================================
    #[error("unable to decode request: {0}")]
    AdmissionDecode(String),

    #[error("unsupported admission operation, operation must be 'create'")]
    UnsupportedOperation,

    #[error("unable to decode request object, expected v1/Pod: {0}")]
    PodDecode(String),

    #[error("unable to encode patch: {0}")]
    PatchEncode(String),

    #[error("unable to encode response: {0}")]
    ResponseEncode(String),

    // =========================================================================
    // Metrics Errors
    // =========================================================================
    #[error("Metrics registry error: {0}")]
    Metrics(#[from] prometheus::Error),

    // =========================================================================
    // IO Errors
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// HTTP status reported to the API server for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::AdmissionDecode(_) | Error::UnsupportedOperation | Error::PodDecode(_) => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Result type alias for the webhook
pub type Result<T> = std::result::Result<T, Error>;
