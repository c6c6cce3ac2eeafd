use thiserror::Error;

use crate::retry::RetryAction;

/// Failure of a single signed request, after retries.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Transport error fetching {url}: {message}")]
    Transport { url: String, message: String },
}

impl ApiError {
    /// Status code reported in synthetic failure envelopes.
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::InvalidUrl { .. } => 400,
            ApiError::Status { status, .. } => *status,
            ApiError::Transport { .. } => 500,
        }
    }

    /// Any status >= 400 and any transport error is retried; 429 waits the
    /// rate-limit cooldown instead of consuming an attempt.
    pub fn retry_action(&self) -> RetryAction {
        match self {
            ApiError::InvalidUrl { .. } => RetryAction::Abort,
            ApiError::Status { status: 429, .. } => RetryAction::RateLimited,
            ApiError::Status { .. } => RetryAction::Retry,
            ApiError::Transport { .. } => RetryAction::Retry,
        }
    }
}

/// Reasons account enumeration gives up. Partial results are discarded.
#[derive(Debug, Error)]
pub enum EnumerationError {
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("Invalid response from {uri} (code {code}): {message}")]
    InvalidResponse {
        uri: String,
        code: u16,
        message: String,
    },

    #[error("Enumeration cancelled")]
    Cancelled,
}
