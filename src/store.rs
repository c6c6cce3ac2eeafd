//! Local destination statistics: one non-concurrent walk, classified by
//! file extension.

use std::path::Path;

use serde::Serialize;
use walkdir::WalkDir;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "mkv"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct StoreSummary {
    pub folders: usize,
    pub images: usize,
    pub videos: usize,
    /// Bytes in classified files only.
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct StoreAnalysisResult {
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<StoreSummary>,
}

impl StoreAnalysisResult {
    fn invalid(reason: &str) -> Self {
        Self {
            is_valid: false,
            reason: Some(reason.to_string()),
            content: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MediaKind {
    Image,
    Video,
}

fn classify(path: &Path) -> Option<MediaKind> {
    let ext = path.extension()?.to_string_lossy().to_lowercase();
    if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        Some(MediaKind::Image)
    } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        Some(MediaKind::Video)
    } else {
        None
    }
}

/// Count folders (excluding `destination` itself), images and videos below
/// `destination`. Unreadable entries are logged and skipped.
pub fn analyze_store(destination: &Path) -> StoreAnalysisResult {
    if !destination.exists() {
        return StoreAnalysisResult::invalid("Destination folder does not exist");
    }
    if !destination.is_dir() {
        return StoreAnalysisResult::invalid("Destination is not a folder");
    }

    let mut summary = StoreSummary::default();
    for entry in WalkDir::new(destination).min_depth(1) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Skipping unreadable entry: {}", e);
                continue;
            }
        };

        let file_type = entry.file_type();
        if file_type.is_dir() {
            summary.folders += 1;
            continue;
        }
        if !file_type.is_file() {
            continue;
        }

        let Some(kind) = classify(entry.path()) else {
            continue;
        };
        match kind {
            MediaKind::Image => summary.images += 1,
            MediaKind::Video => summary.videos += 1,
        }
        match entry.metadata() {
            Ok(meta) => summary.size += meta.len(),
            Err(e) => tracing::warn!("Cannot stat {}: {}", entry.path().display(), e),
        }
    }

    tracing::debug!(?summary, destination = %destination.display(), "store analyzed");
    StoreAnalysisResult {
        is_valid: true,
        reason: None,
        content: Some(summary),
    }
}
