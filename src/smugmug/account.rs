//! Account walk: authenticated user -> album listing -> per-album images.
//!
//! Every listing is paged by following `Pages.NextPage` until it is absent.
//! Album image fetches run with bounded concurrency but results keep the
//! album listing order. Any non-200 page aborts the whole walk and partial
//! results are dropped.

use std::path::PathBuf;
use std::sync::Arc;

use futures_util::stream::{self, StreamExt, TryStreamExt};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::client::ApiClient;
use super::error::EnumerationError;
use super::responses::{
    next_page, AlbumImagesPage, AlbumRecord, AlbumsPage, AuthUserResponse, Envelope, Listing,
    Pages, UserResponse,
};
use super::types::{AccountTree, AlbumContents, AlbumNode, AnalysisResult, AssetNode};
use crate::config::StoreConfig;
use crate::download::paths;

const AUTH_USER_URI: &str = "/api/v2!authuser";

pub struct AccountEnumerator {
    client: Arc<ApiClient>,
    destination: PathBuf,
    file_name_template: String,
    concurrent_albums: usize,
    cancel: CancellationToken,
}

impl AccountEnumerator {
    pub fn new(client: Arc<ApiClient>, store: &StoreConfig) -> Self {
        Self {
            client,
            destination: store.destination.clone(),
            file_name_template: store.file_name_template.clone(),
            concurrent_albums: store.concurrent_albums.max(1),
            cancel: CancellationToken::new(),
        }
    }

    /// Stop paging as soon as `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Whether the credentials resolve to a user.
    pub async fn test_credentials(&self) -> bool {
        match self.current_user().await {
            Ok(nick) => {
                debug!("Credentials valid for {}", nick);
                true
            }
            Err(e) => {
                warn!("{}", e);
                false
            }
        }
    }

    /// Album and image counts for the account.
    pub async fn analyze(&self) -> AnalysisResult {
        match self.enumerate().await {
            Ok(tree) => AnalysisResult::from_tree(&tree),
            Err(e) => {
                warn!("Account analysis failed: {}", e);
                AnalysisResult::invalid()
            }
        }
    }

    /// Walk the whole account and resolve every asset's destination.
    pub async fn enumerate(&self) -> Result<AccountTree, EnumerationError> {
        let nick = self.current_user().await?;

        let user_uri = format!("/api/v2/user/{nick}");
        let user: UserResponse = payload(&user_uri, self.client.get(&user_uri).await)?;

        let records = self
            .collect_listing(&user.user.uris.user_albums.uri, |page: AlbumsPage| {
                (page.album, page.pages)
            })
            .await?;
        info!("Found {} albums", records.len());

        let albums = stream::iter(records.into_iter().map(|r| self.album_node(r)))
            .map(|album| self.album_contents(album))
            .buffered(self.concurrent_albums)
            .try_collect::<Vec<_>>()
            .await?;

        let tree = AccountTree { albums };
        info!(
            "Enumerated {} assets in {} albums",
            tree.asset_count(),
            tree.albums.len()
        );
        Ok(tree)
    }

    async fn current_user(&self) -> Result<String, EnumerationError> {
        self.check_cancelled()?;
        let env: Envelope<AuthUserResponse> = self.client.get(AUTH_USER_URI).await;
        if !env.is_ok() {
            return Err(EnumerationError::InvalidCredentials(format!(
                "code {}: {}",
                env.code, env.message
            )));
        }
        match env.response.map(|r| r.user.nick_name) {
            Some(nick) if !nick.is_empty() => Ok(nick),
            _ => Err(EnumerationError::InvalidCredentials(
                "authenticated user has no nickname".to_string(),
            )),
        }
    }

    fn album_node(&self, record: AlbumRecord) -> AlbumNode {
        AlbumNode {
            folder: paths::album_folder(&self.destination, &record.url_path),
            images_uri: record
                .uris
                .album_images
                .map(|u| u.uri)
                .unwrap_or_default(),
            url_path: record.url_path,
        }
    }

    async fn album_contents(&self, album: AlbumNode) -> Result<AlbumContents, EnumerationError> {
        if album.images_uri.is_empty() {
            debug!("Album {} has no image listing", album.url_path);
            return Ok(AlbumContents {
                album,
                assets: Vec::new(),
            });
        }

        let records = self
            .collect_listing(&album.images_uri, |page: AlbumImagesPage| {
                (page.album_image, page.pages)
            })
            .await?;
        debug!("Album {}: {} assets", album.url_path, records.len());

        let assets = records
            .into_iter()
            .map(|record| AssetNode {
                built_filename: paths::build_filename(&record, &self.file_name_template),
                folder: album.folder.clone(),
                record,
            })
            .collect();
        Ok(AlbumContents { album, assets })
    }

    /// Follow `NextPage` links from `first_uri`, accumulating items.
    ///
    /// A page whose item array is missing altogether ends the listing.
    async fn collect_listing<P, T, F>(
        &self,
        first_uri: &str,
        split: F,
    ) -> Result<Vec<T>, EnumerationError>
    where
        P: DeserializeOwned,
        F: Fn(P) -> (Listing<T>, Option<Pages>),
    {
        let mut items = Vec::new();
        let mut next = Some(first_uri.to_string());

        while let Some(uri) = next.take() {
            self.check_cancelled()?;
            let page: P = payload(&uri, self.client.get(&uri).await)?;
            let (listing, pages) = split(page);
            match listing {
                Listing::Absent => {
                    debug!("No items at {}", uri);
                    break;
                }
                Listing::Items(batch) => items.extend(batch),
            }
            next = next_page(&pages);
        }

        Ok(items)
    }

    fn check_cancelled(&self) -> Result<(), EnumerationError> {
        if self.cancel.is_cancelled() {
            Err(EnumerationError::Cancelled)
        } else {
            Ok(())
        }
    }
}

fn payload<T>(uri: &str, envelope: Envelope<T>) -> Result<T, EnumerationError> {
    if !envelope.is_ok() {
        return Err(EnumerationError::InvalidResponse {
            uri: uri.to_string(),
            code: envelope.code,
            message: envelope.message,
        });
    }
    envelope
        .response
        .ok_or_else(|| EnumerationError::InvalidResponse {
            uri: uri.to_string(),
            code: envelope.code,
            message: "response body missing".to_string(),
        })
}


#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;

    use super::fixtures::*;
    use super::*;
    use crate::smugmug::client::testing::*;

    fn store(destination: &str) -> StoreConfig {
        StoreConfig {
            destination: PathBuf::from(destination),
            ..Default::default()
        }
    }

    fn enumerator(transport: &Arc<ScriptedTransport>, store: &StoreConfig) -> AccountEnumerator {
        AccountEnumerator::new(Arc::new(client_for(transport)), store)
    }

    #[tokio::test]
    async fn test_analyze_two_albums_three_and_zero_images() {
        let transport = ScriptedTransport::new();
        account(&transport, vec![album("/Family", "a1"), album("/Empty", "a2")]);
        transport.ok(
            "/api/v2/album/a1!images",
            json!({"AlbumImage": [image("k1", "1.jpg", 10), image("k2", "2.jpg", 20), image("k3", "3.jpg", 30)]}),
        );
        // empty album: the item array is missing altogether
        transport.ok("/api/v2/album/a2!images", json!({"Pages": {"Total": 0}}));

        let result = enumerator(&transport, &store("/backup")).analyze().await;
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({"IsValid": true, "Content": {"Albums": 2, "Images": 3}})
        );
    }

    #[tokio::test]
    async fn test_enumerate_attaches_folder_and_filename() {
        let transport = ScriptedTransport::new();
        account(&transport, vec![album("/Family/Trip", "a1")]);
        transport.ok(
            "/api/v2/album/a1!images",
            json!({"AlbumImage": [image("k1", "IMG_1.JPG", 10)]}),
        );

        let mut cfg = store("/backup");
        cfg.file_name_template = "{{ImageKey}}-{{FileName}}".into();
        let tree = enumerator(&transport, &cfg).enumerate().await.unwrap();

        let album = &tree.albums[0];
        assert_eq!(album.album.folder, PathBuf::from("/backup/Family/Trip"));
        let asset = &album.assets[0];
        assert_eq!(asset.folder, PathBuf::from("/backup/Family/Trip"));
        assert_eq!(asset.built_filename, "k1-IMG_1.JPG");
        assert_eq!(asset.display_name(), "k1-IMG_1.JPG");
    }

    #[tokio::test]
    async fn test_bad_template_falls_back_to_file_name() {
        let transport = ScriptedTransport::new();
        account(&transport, vec![album("/A", "a1")]);
        transport.ok(
            "/api/v2/album/a1!images",
            json!({"AlbumImage": [image("k1", "IMG_1.JPG", 10)]}),
        );

        let mut cfg = store("/backup");
        cfg.file_name_template = "{{Caption}}".into();
        let tree = enumerator(&transport, &cfg).enumerate().await.unwrap();
        let asset = &tree.albums[0].assets[0];
        assert_eq!(asset.built_filename, "");
        assert_eq!(asset.display_name(), "IMG_1.JPG");
    }

    #[tokio::test]
    async fn test_follows_next_page_links() {
        let transport = ScriptedTransport::new();
        transport.ok("/api/v2!authuser", json!({"User": {"NickName": "jdoe"}}));
        transport.ok(
            "/api/v2/user/jdoe",
            json!({"User": {"Uris": {"UserAlbums": {"Uri": "/api/v2/user/jdoe!albums"}}}}),
        );
        transport.ok(
            "/api/v2/user/jdoe!albums",
            json!({"Album": [album("/A", "a1")], "Pages": {"NextPage": "/api/v2/user/jdoe!albums?start=2&count=1"}}),
        );
        transport.ok(
            "/api/v2/user/jdoe!albums?start=2&count=1",
            json!({"Album": [album("/B", "a2")], "Pages": {}}),
        );
        transport.ok(
            "/api/v2/album/a1!images",
            json!({"AlbumImage": [image("k1", "1.jpg", 1)], "Pages": {"NextPage": "/api/v2/album/a1!images?start=2&count=1"}}),
        );
        transport.ok(
            "/api/v2/album/a1!images?start=2&count=1",
            json!({"AlbumImage": [image("k2", "2.jpg", 1)], "Pages": {"NextPage": ""}}),
        );
        transport.ok("/api/v2/album/a2!images", json!({"AlbumImage": []}));

        let tree = enumerator(&transport, &store("/backup")).enumerate().await.unwrap();
        let paths: Vec<_> = tree.albums.iter().map(|a| a.album.url_path.as_str()).collect();
        assert_eq!(paths, vec!["/A", "/B"]);
        let keys: Vec<_> = tree.albums[0]
            .assets
            .iter()
            .map(|a| a.record.image_key.as_str())
            .collect();
        assert_eq!(keys, vec!["k1", "k2"]);
        assert!(tree.albums[1].assets.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_albums_keep_listing_order() {
        let transport = ScriptedTransport::new();
        let albums: Vec<_> = (0..6).map(|i| album(&format!("/A{i}"), &format!("a{i}"))).collect();
        account(&transport, albums);
        for i in 0..6 {
            transport.ok(
                &format!("/api/v2/album/a{i}!images"),
                json!({"AlbumImage": [image(&format!("k{i}"), "x.jpg", 1)]}),
            );
        }

        let mut cfg = store("/backup");
        cfg.concurrent_albums = 3;
        let tree = enumerator(&transport, &cfg).enumerate().await.unwrap();
        let paths: Vec<_> = tree.albums.iter().map(|a| a.album.url_path.clone()).collect();
        assert_eq!(paths, (0..6).map(|i| format!("/A{i}")).collect::<Vec<_>>());
        assert_eq!(tree.asset_count(), 6);
    }

    #[tokio::test]
    async fn test_concurrent_albums_bounded_and_ordered_when_finishing_out_of_order() {
        let transport = ScriptedTransport::new();
        let albums: Vec<_> = (0..6).map(|i| album(&format!("/A{i}"), &format!("a{i}"))).collect();
        account(&transport, albums);
        // earlier albums answer last
        for i in 0..6u64 {
            transport.ok_after(
                &format!("/api/v2/album/a{i}!images"),
                Duration::from_millis((6 - i) * 15),
                json!({"AlbumImage": [image(&format!("k{i}"), "x.jpg", 1)]}),
            );
        }

        let mut cfg = store("/backup");
        cfg.concurrent_albums = 3;
        let tree = enumerator(&transport, &cfg).enumerate().await.unwrap();

        let paths: Vec<_> = tree.albums.iter().map(|a| a.album.url_path.clone()).collect();
        assert_eq!(paths, (0..6).map(|i| format!("/A{i}")).collect::<Vec<_>>());
        let keys: Vec<_> = tree
            .albums
            .iter()
            .map(|a| a.assets[0].record.image_key.clone())
            .collect();
        assert_eq!(keys, (0..6).map(|i| format!("k{i}")).collect::<Vec<_>>());
        assert_eq!(transport.max_in_flight(), 3);
    }

    #[tokio::test]
    async fn test_single_album_concurrency_fetches_one_at_a_time() {
        let transport = ScriptedTransport::new();
        let albums: Vec<_> = (0..3).map(|i| album(&format!("/A{i}"), &format!("a{i}"))).collect();
        account(&transport, albums);
        for i in 0..3 {
            transport.ok_after(
                &format!("/api/v2/album/a{i}!images"),
                Duration::from_millis(10),
                json!({"AlbumImage": []}),
            );
        }

        let tree = enumerator(&transport, &store("/backup")).enumerate().await.unwrap();
        assert_eq!(tree.albums.len(), 3);
        assert_eq!(transport.max_in_flight(), 1);
    }

    #[tokio::test]
    async fn test_null_upload_key_does_not_abort_enumeration() {
        let transport = ScriptedTransport::new();
        account(&transport, vec![album("/A", "a1")]);
        let mut img = image("k1", "1.jpg", 10);
        img["UploadKey"] = json!(null);
        img["FileName"] = json!(null);
        transport.ok("/api/v2/album/a1!images", json!({"AlbumImage": [img]}));

        let mut cfg = store("/backup");
        cfg.file_name_template = "{{UploadKey}}{{FileName}}".into();
        let tree = enumerator(&transport, &cfg).enumerate().await.unwrap();
        let asset = &tree.albums[0].assets[0];
        assert_eq!(asset.record.upload_key, "");
        assert_eq!(asset.display_name(), "k1");
    }

    #[tokio::test]
    async fn test_auth_failure_makes_no_further_calls() {
        let transport = ScriptedTransport::new();
        transport.on(
            "/api/v2!authuser",
            Reply::Json(json!({"Code": 401, "Message": "Unauthorized"})),
        );

        let e = enumerator(&transport, &store("/backup"));
        assert!(!e.test_credentials().await);
        assert_eq!(e.analyze().await, AnalysisResult::invalid());
        assert_eq!(transport.call_count("/api/v2/user/jdoe"), 0);
    }

    #[tokio::test]
    async fn test_test_credentials_success() {
        let transport = ScriptedTransport::new();
        transport.ok("/api/v2!authuser", json!({"User": {"NickName": "jdoe"}}));
        assert!(enumerator(&transport, &store("/backup")).test_credentials().await);
    }

    #[tokio::test]
    async fn test_non_200_image_page_discards_everything() {
        let transport = ScriptedTransport::new();
        account(&transport, vec![album("/A", "a1"), album("/B", "a2")]);
        transport.ok(
            "/api/v2/album/a1!images",
            json!({"AlbumImage": [image("k1", "1.jpg", 1)]}),
        );
        transport.on(
            "/api/v2/album/a2!images",
            Reply::Json(json!({"Code": 404, "Message": "Not Found"})),
        );

        let result = enumerator(&transport, &store("/backup")).enumerate().await;
        match result {
            Err(EnumerationError::InvalidResponse { uri, code, .. }) => {
                assert_eq!(uri, "/api/v2/album/a2!images");
                assert_eq!(code, 404);
            }
            other => panic!("expected InvalidResponse, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cancelled_enumeration() {
        let transport = ScriptedTransport::new();
        account(&transport, vec![album("/A", "a1")]);
        let token = CancellationToken::new();
        token.cancel();

        let result = enumerator(&transport, &store("/backup"))
            .with_cancellation(token)
            .enumerate()
            .await;
        assert!(matches!(result, Err(EnumerationError::Cancelled)));
        assert_eq!(transport.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_album_without_images_link_is_empty() {
        let transport = ScriptedTransport::new();
        account(&transport, vec![json!({"UrlPath": "/Folderish"})]);

        let tree = enumerator(&transport, &store("/backup")).enumerate().await.unwrap();
        assert_eq!(tree.albums.len(), 1);
        assert!(tree.albums[0].assets.is_empty());
    }
}
