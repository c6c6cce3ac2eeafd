//! Backup engine: enumerate the account, then download album by album.
//!
//! Albums are processed in listing order and each album's downloads are
//! drained before the next album starts. Within an album, downloads run
//! with bounded concurrency. A stop request prevents new downloads from
//! being dispatched; transfers already running are allowed to finish.

pub mod error;
pub mod file;
pub mod paths;
pub mod times;

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use self::error::DownloadError;
use crate::config::StoreConfig;
use crate::retry::RetryConfig;
use crate::smugmug::responses::{Envelope, ImageMetadataResponse, LargestVideoResponse};
use crate::smugmug::{AccountEnumerator, ApiClient, AssetNode, EnumerationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupPhase {
    Idle,
    Enumerating,
    Downloading,
    Completed,
    Stopped,
    Failed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackupStats {
    pub total: usize,
    pub completed: usize,
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Outcome of `backup`. Per-asset failures do not make a run invalid;
/// they only show up in the log and in `stats.failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct BackupResult {
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip)]
    pub phase: BackupPhase,
    #[serde(skip)]
    pub stats: BackupStats,
}

/// Counters for one run. Workers finish concurrently, so every update is
/// a single atomic increment.
struct BackupRun {
    total: usize,
    completed: AtomicUsize,
    downloaded: AtomicUsize,
    skipped: AtomicUsize,
    failed: AtomicUsize,
}

impl BackupRun {
    fn new(total: usize) -> Self {
        Self {
            total,
            completed: AtomicUsize::new(0),
            downloaded: AtomicUsize::new(0),
            skipped: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
        }
    }

    /// Count one finished asset and return the new completed count.
    fn record(&self, outcome: AssetOutcome) -> usize {
        match outcome {
            AssetOutcome::Downloaded => {
                self.downloaded.fetch_add(1, Ordering::SeqCst);
            }
            AssetOutcome::AlreadyPresent | AssetOutcome::Skipped => {
                self.skipped.fetch_add(1, Ordering::SeqCst);
            }
        }
        self.completed.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn record_failure(&self) -> usize {
        self.failed.fetch_add(1, Ordering::SeqCst);
        self.completed.load(Ordering::SeqCst)
    }

    fn stats(&self) -> BackupStats {
        BackupStats {
            total: self.total,
            completed: self.completed.load(Ordering::SeqCst),
            downloaded: self.downloaded.load(Ordering::SeqCst),
            skipped: self.skipped.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AssetOutcome {
    Downloaded,
    /// Dedup hit: same-sized file already on disk.
    AlreadyPresent,
    /// Nothing to do (unnamed asset, video still processing).
    Skipped,
}

pub struct BackupEngine {
    client: Arc<ApiClient>,
    store: StoreConfig,
    retry: RetryConfig,
    cancel: CancellationToken,
    phase: Mutex<BackupPhase>,
}

impl BackupEngine {
    pub fn new(client: Arc<ApiClient>, store: StoreConfig, retry: RetryConfig) -> Self {
        Self {
            client,
            store,
            retry,
            cancel: CancellationToken::new(),
            phase: Mutex::new(BackupPhase::Idle),
        }
    }

    /// Request a cooperative stop. Fire-and-forget.
    pub fn stop(&self) {
        if !self.cancel.is_cancelled() {
            info!("Backup stop requested");
        }
        self.cancel.cancel();
    }

    pub fn phase(&self) -> BackupPhase {
        *self.phase.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_phase(&self, phase: BackupPhase) {
        debug!(?phase, "backup phase");
        *self.phase.lock().unwrap_or_else(|e| e.into_inner()) = phase;
    }

    /// Run a full backup.
    ///
    /// `on_log` receives user-facing lines (one per initiated download plus
    /// phase changes); `on_progress(total, completed)` is called after every
    /// finished asset with a non-decreasing `completed`.
    pub async fn run<L, P>(&self, on_log: L, on_progress: P) -> BackupResult
    where
        L: Fn(&str) + Sync,
        P: Fn(usize, usize),
    {
        let started = Instant::now();
        self.set_phase(BackupPhase::Enumerating);
        on_log("Starting backup");
        info!(destination = %self.store.destination.display(), "Starting backup");

        let enumerator = AccountEnumerator::new(self.client.clone(), &self.store)
            .with_cancellation(self.cancel.clone());
        let tree = match enumerator.enumerate().await {
            Ok(tree) => tree,
            Err(EnumerationError::Cancelled) => {
                return self.finish(BackupPhase::Stopped, BackupStats::default(), started, &on_log);
            }
            Err(e) => {
                error!("Backup failed: {}", e);
                on_log(&format!("Backup failed: {e}"));
                self.set_phase(BackupPhase::Failed);
                return BackupResult {
                    is_valid: false,
                    content: Some(e.to_string()),
                    phase: BackupPhase::Failed,
                    stats: BackupStats::default(),
                };
            }
        };

        let run = BackupRun::new(tree.asset_count());
        self.set_phase(BackupPhase::Downloading);
        on_log(&format!(
            "Downloading {} assets from {} albums",
            run.total,
            tree.albums.len()
        ));
        on_progress(run.total, 0);

        let concurrency = self.store.concurrent_downloads.max(1);
        for contents in &tree.albums {
            if self.cancel.is_cancelled() {
                break;
            }

            let folder = &contents.album.folder;
            if let Err(e) = tokio::fs::create_dir_all(folder).await {
                error!("Cannot create folder {}: {}", folder.display(), e);
                on_log(&format!("Cannot create folder {}: {e}", folder.display()));
                for _ in &contents.assets {
                    on_progress(run.total, run.record_failure());
                }
                continue;
            }
            debug!(
                "Album {}: {} assets",
                contents.album.url_path,
                contents.assets.len()
            );

            let on_log = &on_log;
            stream::iter(&contents.assets)
                .take_while(|_| std::future::ready(!self.cancel.is_cancelled()))
                .map(|asset| async move { (asset, self.backup_asset(asset, on_log).await) })
                .buffer_unordered(concurrency)
                .for_each(|(asset, result)| {
                    let completed = match result {
                        Ok(outcome) => run.record(outcome),
                        Err(e) => {
                            error!("Download failed: {}: {}", asset.display_name(), e);
                            on_log(&format!("Download failed: {}: {e}", asset.display_name()));
                            run.record_failure()
                        }
                    };
                    on_progress(run.total, completed);
                    std::future::ready(())
                })
                .await;
        }

        let phase = if self.cancel.is_cancelled() {
            BackupPhase::Stopped
        } else {
            BackupPhase::Completed
        };
        self.finish(phase, run.stats(), started, &on_log)
    }

    fn finish<L: Fn(&str)>(
        &self,
        phase: BackupPhase,
        stats: BackupStats,
        started: Instant,
        on_log: &L,
    ) -> BackupResult {
        self.set_phase(phase);
        let summary = format!(
            "{} downloaded, {} skipped, {} failed, {} total",
            stats.downloaded, stats.skipped, stats.failed, stats.total
        );
        info!("── Summary ──");
        info!("  {}", summary);
        info!("  elapsed: {}", format_duration(started.elapsed()));

        let content = match phase {
            BackupPhase::Stopped => format!("Backup stopped: {summary}"),
            _ => format!("Backup completed: {summary}"),
        };
        on_log(&content);
        BackupResult {
            is_valid: true,
            content: Some(content),
            phase,
            stats,
        }
    }

    async fn backup_asset<L: Fn(&str)>(
        &self,
        asset: &AssetNode,
        on_log: &L,
    ) -> Result<AssetOutcome, DownloadError> {
        let name = paths::clean_filename(asset.display_name());
        if name.is_empty() {
            warn!(
                "Skipping asset {} with no usable filename",
                asset.record.image_key
            );
            return Ok(AssetOutcome::Skipped);
        }
        let dest = asset.folder.join(&name);

        let (url, size) = if asset.is_video() {
            if asset.record.processing && !self.store.force_video_download {
                info!("Skipping video {} because it is still processing", name);
                return Ok(AssetOutcome::Skipped);
            }
            self.largest_video(asset).await?
        } else {
            (asset.record.archived_uri.clone(), asset.record.archived_size)
        };

        if file::has_expected_size(&dest, size).await {
            debug!("Already present: {}", dest.display());
            if self.store.use_metadata_times && self.store.force_metadata_times {
                self.restore_times(asset, &dest).await;
            }
            return Ok(AssetOutcome::AlreadyPresent);
        }

        on_log(&dest.display().to_string());
        debug!(size_bytes = size, path = %dest.display(), "downloading");
        let part = paths::part_path(&dest, &asset.record.image_key);
        file::download_file(&self.client, &url, &dest, &part, &self.retry).await?;

        if self.store.use_metadata_times {
            self.restore_times(asset, &dest).await;
        }
        Ok(AssetOutcome::Downloaded)
    }

    /// Resolve the actual download URL and size of a video.
    async fn largest_video(&self, asset: &AssetNode) -> Result<(String, u64), DownloadError> {
        let uri = asset
            .record
            .uris
            .largest_video
            .as_ref()
            .map(|u| u.uri.as_str())
            .filter(|u| !u.is_empty())
            .ok_or(DownloadError::MissingLink("LargestVideo"))?;

        let env: Envelope<LargestVideoResponse> = self.client.get(uri).await;
        if !env.is_ok() {
            return Err(DownloadError::ApiResponse {
                uri: uri.to_string(),
                code: env.code,
                message: env.message,
            });
        }
        let video = env
            .response
            .ok_or_else(|| DownloadError::ApiResponse {
                uri: uri.to_string(),
                code: env.code,
                message: "response body missing".to_string(),
            })?
            .largest_video;
        Ok((video.url, video.size))
    }

    /// Set file times from capture time, upload time or the metadata
    /// endpoint, in that order. Leaves the file alone if none is usable.
    async fn restore_times(&self, asset: &AssetNode, dest: &Path) {
        let record = &asset.record;
        let embedded = [
            record.date_time_original.as_deref(),
            record.date_time_uploaded.as_deref(),
        ]
        .into_iter()
        .flatten()
        .find_map(times::parse_timestamp);

        let created = match embedded {
            Some(created) => Some(created),
            None => self.metadata_timestamp(asset).await,
        };
        let Some(created) = created else {
            debug!("No usable timestamp for {}", dest.display());
            return;
        };

        let path: PathBuf = dest.to_path_buf();
        match tokio::task::spawn_blocking(move || times::set_file_times(&path, created)).await {
            Ok(Ok(())) => debug!("Set times on {} to {}", dest.display(), created),
            Ok(Err(e)) => warn!("Could not set file times on {}: {}", dest.display(), e),
            Err(e) => warn!("File time task failed for {}: {}", dest.display(), e),
        }
    }

    async fn metadata_timestamp(&self, asset: &AssetNode) -> Option<DateTime<Utc>> {
        let uri = asset
            .record
            .uris
            .image_metadata
            .as_ref()
            .map(|u| u.uri.as_str())
            .filter(|u| !u.is_empty())?;

        let env: Envelope<ImageMetadataResponse> = self.client.get(uri).await;
        if !env.is_ok() {
            debug!("Metadata lookup for {} returned {}", uri, env.code);
            return None;
        }
        env.response?
            .date_time_created
            .as_deref()
            .and_then(times::parse_timestamp)
    }
}

/// Create a progress bar with a consistent template.
///
/// Returns `ProgressBar::hidden()` when the user passed `--no-progress-bar` or
/// stdout is not a TTY (e.g. piped output, cron jobs).
pub(crate) fn create_progress_bar(no_progress_bar: bool) -> ProgressBar {
    if no_progress_bar || !std::io::stdout().is_terminal() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(0);
    if let Ok(style) = ProgressStyle::with_template(
        "[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
    ) {
        pb.set_style(style.progress_chars("=> "));
    }
    pb
}

fn format_duration(d: Duration) -> String {
    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let mins = (total_secs % 3600) / 60;
    let secs = total_secs % 60;

    if hours > 0 {
        format!("{}h {:02}m {:02}s", hours, mins, secs)
    } else if mins > 0 {
        format!("{}m {:02}s", mins, secs)
    } else {
        format!("{}s", secs)
    }
}
