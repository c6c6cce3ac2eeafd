use std::time::Duration;

use anyhow::Context;
use bytes::Bytes;
use futures_util::stream::{BoxStream, StreamExt};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};

const DEFAULT_USER_AGENT: &str = concat!("smugmug-backup/", env!("CARGO_PKG_VERSION"));

/// Body chunks as they arrive from the network.
pub type BodyStream = BoxStream<'static, anyhow::Result<Bytes>>;

/// Status line plus a lazily-read body.
pub struct HttpResponse {
    pub status: u16,
    pub body: BodyStream,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Drain the whole body into memory. Only used for JSON envelopes;
    /// asset bodies are streamed to disk instead.
    pub async fn collect_body(mut self) -> anyhow::Result<Vec<u8>> {
        let mut buf = Vec::new();
        while let Some(chunk) = self.body.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf)
    }
}

impl std::fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// Minimal async GET transport used by the API client.
///
/// The production implementation is `reqwest::Client`; tests substitute a
/// scripted transport so the retry, pagination and download paths can be
/// exercised without a network.
#[async_trait::async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(&self, url: &str, headers: &[(&str, &str)]) -> anyhow::Result<HttpResponse>;
}

#[async_trait::async_trait]
impl HttpTransport for reqwest::Client {
    async fn get(&self, url: &str, headers: &[(&str, &str)]) -> anyhow::Result<HttpResponse> {
        let mut builder = reqwest::Client::get(self, url);
        for &(k, v) in headers {
            builder = builder.header(k, v);
        }
        let resp = builder.send().await?;
        let status = resp.status().as_u16();
        let body = resp
            .bytes_stream()
            .map(|chunk| chunk.map_err(anyhow::Error::from))
            .boxed();
        Ok(HttpResponse { status, body })
    }
}

/// Build the HTTP client used for both API calls and asset transfers.
///
/// Only the connect phase is bounded: large video bodies may legitimately
/// take a long time to stream.
pub fn build_http_client(connect_timeout: Duration) -> anyhow::Result<reqwest::Client> {
    let mut default_headers = HeaderMap::new();
    default_headers.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));

    reqwest::Client::builder()
        .default_headers(default_headers)
        .connect_timeout(connect_timeout)
        .build()
        .context("Failed to build HTTP client")
}
