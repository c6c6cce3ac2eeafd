use thiserror::Error;

use crate::smugmug::ApiError;

/// Typed per-asset failures enabling retry classification.
///
/// Request-level failures arrive already retried by the API client, so only
/// a body that breaks off mid-transfer is retried here.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("Request for {path} failed: {source}")]
    Api {
        path: String,
        #[source]
        source: ApiError,
    },

    #[error("API returned code {code} for {uri}: {message}")]
    ApiResponse {
        uri: String,
        code: u16,
        message: String,
    },

    #[error("Asset has no {0} link")]
    MissingLink(&'static str),

    #[error("HTTP error {status} downloading {path}")]
    HttpStatus { status: u16, path: String },

    #[error("Transfer of {path} broke off after {bytes_written} bytes: {message}")]
    Body {
        path: String,
        bytes_written: u64,
        message: String,
    },

    #[error("Disk error: {0}")]
    Disk(#[from] std::io::Error),
}

impl DownloadError {
    /// Whether restarting the whole transfer is worth it.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DownloadError::Body { .. })
    }
}
