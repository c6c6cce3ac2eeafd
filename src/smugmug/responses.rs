//! Wire types for the SmugMug v2 JSON API.
//!
//! Every response is wrapped in an [`Envelope`]. Optional fields default so
//! that schema drift degrades to "missing value" rather than a decode error.

use serde::{Deserialize, Deserializer};

/// `{Code, Message, Response}` wrapper returned by every API call.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Envelope<T> {
    #[serde(default)]
    pub code: u16,
    #[serde(default, deserialize_with = "nullable")]
    pub message: String,
    pub response: Option<T>,
}

impl<T> Envelope<T> {
    /// Synthetic envelope used when the request never produced a decodable body.
    pub fn failure(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            response: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == 200
    }
}

/// A listing array that may be structurally absent.
///
/// The API omits the item array entirely for an empty album instead of
/// sending `[]`. The two cases are kept apart here so callers decide once.
#[derive(Debug, Clone, PartialEq)]
pub enum Listing<T> {
    Absent,
    Items(Vec<T>),
}

impl<T> Default for Listing<T> {
    fn default() -> Self {
        Listing::Absent
    }
}

impl<T> Listing<T> {
    #[cfg(test)]
    pub fn into_items(self) -> Vec<T> {
        match self {
            Listing::Absent => Vec::new(),
            Listing::Items(items) => items,
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Listing<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Option::<Vec<T>>::deserialize(deserializer)? {
            Some(items) => Listing::Items(items),
            None => Listing::Absent,
        })
    }
}

/// Treat an explicit `null` like a missing field.
fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Pages {
    #[serde(default)]
    pub next_page: Option<String>,
}

/// Next-page link, if any. An empty string ends pagination too.
pub fn next_page(pages: &Option<Pages>) -> Option<String> {
    pages
        .as_ref()
        .and_then(|p| p.next_page.clone())
        .filter(|uri| !uri.is_empty())
}

#[derive(Debug, Default, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct UriRef {
    #[serde(default, deserialize_with = "nullable")]
    pub uri: String,
}

/// `GET /api/v2!authuser`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AuthUserResponse {
    pub user: AuthUser,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AuthUser {
    #[serde(default, deserialize_with = "nullable")]
    pub nick_name: String,
}

/// `GET /api/v2/user/{nickname}`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UserResponse {
    pub user: User,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct User {
    pub uris: UserUris,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UserUris {
    pub user_albums: UriRef,
}

/// One page of `/api/v2/user/{nickname}!albums`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AlbumsPage {
    #[serde(default)]
    pub album: Listing<AlbumRecord>,
    #[serde(default)]
    pub pages: Option<Pages>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct AlbumRecord {
    #[serde(default, deserialize_with = "nullable")]
    pub url_path: String,
    #[serde(default)]
    pub uris: AlbumUris,
}

#[derive(Debug, Default, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct AlbumUris {
    #[serde(default)]
    pub album_images: Option<UriRef>,
}

/// One page of `/api/v2/album/{key}!images`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AlbumImagesPage {
    #[serde(default)]
    pub album_image: Listing<AlbumImageRecord>,
    #[serde(default)]
    pub pages: Option<Pages>,
}

#[derive(Debug, Default, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct AlbumImageRecord {
    #[serde(default, deserialize_with = "nullable")]
    pub file_name: String,
    #[serde(default, deserialize_with = "nullable")]
    pub image_key: String,
    #[serde(default, deserialize_with = "nullable", rename = "ArchivedMD5")]
    pub archived_md5: String,
    #[serde(default, deserialize_with = "nullable")]
    pub archived_size: u64,
    #[serde(default, deserialize_with = "nullable")]
    pub archived_uri: String,
    #[serde(default, deserialize_with = "nullable")]
    pub is_video: bool,
    #[serde(default, deserialize_with = "nullable")]
    pub processing: bool,
    #[serde(default, deserialize_with = "nullable")]
    pub upload_key: String,
    #[serde(default)]
    pub date_time_original: Option<String>,
    #[serde(default)]
    pub date_time_uploaded: Option<String>,
    #[serde(default)]
    pub uris: AlbumImageUris,
}

#[derive(Debug, Default, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct AlbumImageUris {
    #[serde(default)]
    pub image_metadata: Option<UriRef>,
    #[serde(default)]
    pub largest_video: Option<UriRef>,
}

/// `GET /api/v2/image/{key}!largestvideo`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LargestVideoResponse {
    pub largest_video: LargestVideo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LargestVideo {
    #[serde(default, deserialize_with = "nullable")]
    pub size: u64,
    #[serde(default, deserialize_with = "nullable")]
    pub url: String,
}

/// `GET /api/v2/image/{key}!metadata`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ImageMetadataResponse {
    #[serde(default)]
    pub date_time_created: Option<String>,
}
