use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::Semaphore;
use tracing::{debug, warn};
use url::Url;

use super::error::ApiError;
use super::oauth::{Credentials, RequestSigner};
use super::responses::Envelope;
use super::session::{HttpResponse, HttpTransport};
use crate::retry::{self, RetryConfig};

pub const BASE_URL: &str = "https://api.smugmug.com";

/// Request-level knobs: the in-flight cap and the retry envelope.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ApiOptions {
    pub max_in_flight: usize,
    pub retry: RetryConfig,
}

impl Default for ApiOptions {
    fn default() -> Self {
        Self {
            max_in_flight: 10,
            retry: RetryConfig::default(),
        }
    }
}

/// Signed GET client for the SmugMug API.
///
/// All requests issued through one client share its nonce counter and its
/// in-flight cap; callers over the cap wait on the semaphore until a slot
/// frees up. The permit is held for one attempt only, never across a
/// backoff or rate-limit sleep.
pub struct ApiClient {
    transport: Arc<dyn HttpTransport>,
    signer: RequestSigner,
    credentials: Credentials,
    in_flight: Semaphore,
    retry: RetryConfig,
    base_url: String,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        credentials: Credentials,
        options: ApiOptions,
    ) -> Self {
        Self {
            transport,
            signer: RequestSigner::new(),
            credentials,
            in_flight: Semaphore::new(options.max_in_flight.max(1)),
            retry: options.retry,
            base_url: BASE_URL.to_string(),
        }
    }

    #[cfg(test)]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Resolve an API link. Relative URIs (as returned by the API itself)
    /// are joined onto the base URL; absolute http(s) URLs pass through.
    pub fn resolve(&self, uri: &str) -> Result<Url, ApiError> {
        let full = if uri.starts_with('/') {
            format!("{}{}", self.base_url, uri)
        } else {
            uri.to_string()
        };
        let url = Url::parse(&full).map_err(|e| ApiError::InvalidUrl {
            url: uri.to_string(),
            reason: e.to_string(),
        })?;
        match url.scheme() {
            "http" | "https" if url.host_str().is_some() => Ok(url),
            other => Err(ApiError::InvalidUrl {
                url: uri.to_string(),
                reason: format!("unsupported scheme '{other}'"),
            }),
        }
    }

    /// Fetch `uri` and decode its JSON envelope.
    ///
    /// Never fails: invalid URLs, exhausted retries, transport errors and
    /// undecodable bodies all come back as a synthetic non-200 envelope with
    /// an empty payload. Callers must check [`Envelope::is_ok`].
    pub async fn get<T: DeserializeOwned>(&self, uri: &str) -> Envelope<T> {
        let response = match self.get_raw(uri).await {
            Ok(response) => response,
            Err(e) => {
                warn!("API call failed: {}", e);
                return Envelope::failure(e.status_code(), e.to_string());
            }
        };

        let body = match response.collect_body().await {
            Ok(body) => body,
            Err(e) => {
                warn!("Failed reading response body from {}: {}", uri, e);
                return Envelope::failure(500, format!("Error reading response from {uri}: {e}"));
            }
        };

        match serde_json::from_slice::<Envelope<T>>(&body) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("Invalid JSON envelope from {}: {}", uri, e);
                Envelope::failure(500, format!("Invalid response from {uri}: {e}"))
            }
        }
    }

    /// Signed GET returning the undecoded response, for binary bodies.
    ///
    /// Statuses >= 400 and transport errors are retried per the retry
    /// config; 429 waits the rate-limit cooldown without using an attempt.
    pub async fn get_raw(&self, uri: &str) -> Result<HttpResponse, ApiError> {
        let url = self.resolve(uri)?;
        retry::retry_with_backoff(&self.retry, ApiError::retry_action, || self.attempt(&url))
            .await
    }

    async fn attempt(&self, url: &Url) -> Result<HttpResponse, ApiError> {
        let _permit = self
            .in_flight
            .acquire()
            .await
            .map_err(|e| ApiError::Transport {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        // Fresh signature per attempt so a retry never replays a nonce.
        let authorization = self.signer.sign(url, &self.credentials);
        debug!(url = %url, "GET");

        let response = self
            .transport
            .get(
                url.as_str(),
                &[
                    ("Accept", "application/json"),
                    ("Authorization", authorization.as_str()),
                ],
            )
            .await
            .map_err(|e| ApiError::Transport {
                url: url.to_string(),
                message: format!("{e:#}"),
            })?;

        if response.status >= 400 {
            return Err(ApiError::Status {
                status: response.status,
                url: url.to_string(),
            });
        }
        Ok(response)
    }
}
