use std::path::PathBuf;

use serde::Serialize;

use super::responses::AlbumImageRecord;

/// An album with its local destination folder.
#[derive(Debug, Clone, PartialEq)]
pub struct AlbumNode {
    pub url_path: String,
    pub images_uri: String,
    pub folder: PathBuf,
}

/// A remote photo or video plus where it goes locally.
///
/// Built once during enumeration and not modified afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetNode {
    pub record: AlbumImageRecord,
    pub folder: PathBuf,
    /// Rendered filename template; empty when the template was unusable.
    pub built_filename: String,
}

impl AssetNode {
    /// Name used on disk: rendered template, then original filename, then
    /// the image key. Identical for photos and videos.
    pub fn display_name(&self) -> &str {
        if !self.built_filename.is_empty() {
            &self.built_filename
        } else if !self.record.file_name.is_empty() {
            &self.record.file_name
        } else {
            &self.record.image_key
        }
    }

    pub fn is_video(&self) -> bool {
        self.record.is_video
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlbumContents {
    pub album: AlbumNode,
    pub assets: Vec<AssetNode>,
}

/// Fully enumerated account, albums in listing order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccountTree {
    pub albums: Vec<AlbumContents>,
}

impl AccountTree {
    pub fn asset_count(&self) -> usize {
        self.albums.iter().map(|a| a.assets.len()).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct AccountSummary {
    pub albums: usize,
    pub images: usize,
}

/// Outcome of `analyze-account`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct AnalysisResult {
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<AccountSummary>,
}

impl AnalysisResult {
    pub fn invalid() -> Self {
        Self {
            is_valid: false,
            content: None,
        }
    }

    pub fn from_tree(tree: &AccountTree) -> Self {
        Self {
            is_valid: true,
            content: Some(AccountSummary {
                albums: tree.albums.len(),
                images: tree.asset_count(),
            }),
        }
    }
}
