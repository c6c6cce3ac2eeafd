use std::path::Path;

use futures_util::StreamExt;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

use super::error::DownloadError;
use crate::retry::{self, RetryAction, RetryConfig};
use crate::smugmug::ApiClient;

/// True when a regular file of exactly `expected` bytes is already at `path`.
///
/// Size is the only check; content hashes are not compared.
pub async fn has_expected_size(path: &Path, expected: u64) -> bool {
    matches!(fs::metadata(path).await, Ok(meta) if meta.is_file() && meta.len() == expected)
}

/// Download `url` into `download_path` through `part_path`.
///
/// Each attempt starts the `.part` file from scratch; it is renamed to the
/// final path only once the whole body is on disk, so an interrupted
/// transfer never leaves a file that could pass the size check. Returns the
/// number of bytes written.
pub async fn download_file(
    client: &ApiClient,
    url: &str,
    download_path: &Path,
    part_path: &Path,
    retry_config: &RetryConfig,
) -> Result<u64, DownloadError> {
    let result = retry::retry_with_backoff(
        retry_config,
        |e: &DownloadError| {
            if e.is_retryable() {
                RetryAction::Retry
            } else {
                RetryAction::Abort
            }
        },
        || async {
            let _ = fs::remove_file(part_path).await;
            attempt_download(client, url, download_path, part_path).await
        },
    )
    .await;

    if result.is_err() {
        let _ = fs::remove_file(part_path).await;
    }
    result
}

async fn attempt_download(
    client: &ApiClient,
    url: &str,
    download_path: &Path,
    part_path: &Path,
) -> Result<u64, DownloadError> {
    let path_str = download_path.display().to_string();
    let response = client
        .get_raw(url)
        .await
        .map_err(|source| DownloadError::Api {
            path: path_str.clone(),
            source,
        })?;

    if !response.is_success() {
        return Err(DownloadError::HttpStatus {
            status: response.status,
            path: path_str,
        });
    }

    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(part_path)
        .await?;

    let mut bytes_written: u64 = 0;
    let mut body = response.body;
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| DownloadError::Body {
            path: path_str.clone(),
            bytes_written,
            message: format!("{e:#}"),
        })?;
        file.write_all(&chunk).await?;
        bytes_written += chunk.len() as u64;
    }
    file.flush().await?;
    drop(file);

    fs::rename(part_path, download_path).await?;
    tracing::debug!(bytes = bytes_written, path = %path_str, "transfer complete");

    Ok(bytes_written)
}
