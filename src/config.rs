use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

use crate::cli::{AnalyzeStoreArgs, ConfigArgs, StoreArgs};
use crate::download::paths::DEFAULT_FILENAME_TEMPLATE;
use crate::smugmug::{ApiOptions, Credentials};

/// Application configuration.
///
/// Deserializes from the camelCase JSON shape the desktop front end saves,
/// so a saved config can be handed over as-is with `--config`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub auth: Credentials,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub api: ApiOptions,
}

/// Where and how assets are written locally.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StoreConfig {
    pub destination: PathBuf,
    #[serde(alias = "fileNames", alias = "file_names")]
    pub file_name_template: String,
    pub use_metadata_times: bool,
    pub force_metadata_times: bool,
    /// Accepted for compatibility with saved configs; nothing reads it.
    pub write_csv: bool,
    pub force_video_download: bool,
    pub concurrent_albums: usize,
    pub concurrent_downloads: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            destination: PathBuf::new(),
            file_name_template: DEFAULT_FILENAME_TEMPLATE.to_string(),
            use_metadata_times: false,
            force_metadata_times: false,
            write_csv: false,
            force_video_download: false,
            concurrent_albums: 1,
            concurrent_downloads: 1,
        }
    }
}

impl StoreConfig {
    /// Store section for `analyze-store`: `--config` first, then
    /// `--destination` on top.
    pub fn load(args: &AnalyzeStoreArgs) -> anyhow::Result<Self> {
        let mut store = match &args.config_file {
            Some(path) => Config::from_json_file(path)?.store,
            None => StoreConfig::default(),
        };
        if let Some(dest) = &args.destination {
            store.destination = PathBuf::from(dest);
        }
        store.normalize();
        Ok(store)
    }

    /// Expand `~/`, restore the default template and clamp concurrency.
    fn normalize(&mut self) {
        if let Some(dest) = self.destination.to_str() {
            self.destination = expand_tilde(dest);
        }
        if self.file_name_template.trim().is_empty() {
            self.file_name_template = DEFAULT_FILENAME_TEMPLATE.to_string();
        }
        self.concurrent_albums = self.concurrent_albums.max(1);
        self.concurrent_downloads = self.concurrent_downloads.max(1);
        if self.write_csv {
            tracing::debug!("writeCsv is set but CSV export is not supported; ignoring");
        }
    }

    fn apply_args(&mut self, args: &StoreArgs) {
        if let Some(dest) = &args.destination {
            self.destination = PathBuf::from(dest);
        }
        if let Some(template) = &args.file_name_template {
            self.file_name_template = template.clone();
        }
        if let Some(n) = args.concurrent_albums {
            self.concurrent_albums = n;
        }
        if let Some(n) = args.concurrent_downloads {
            self.concurrent_downloads = n;
        }
        self.use_metadata_times |= args.use_metadata_times;
        self.force_metadata_times |= args.force_metadata_times;
        self.force_video_download |= args.force_video_download;
    }
}

pub(crate) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

impl Config {
    /// Load `--config` if given, then let explicit flags and environment
    /// variables override it.
    pub fn load(args: &ConfigArgs) -> anyhow::Result<Self> {
        let mut config = match &args.config_file {
            Some(path) => Self::from_json_file(path)?,
            None => Self::default(),
        };

        let auth = &args.auth;
        for (flag, field) in [
            (&auth.api_key, &mut config.auth.api_key),
            (&auth.api_secret, &mut config.auth.api_secret),
            (&auth.user_token, &mut config.auth.user_token),
            (&auth.user_secret, &mut config.auth.user_secret),
        ] {
            if let Some(value) = flag {
                *field = value.clone();
            }
        }

        config.store.apply_args(&args.store);
        config.store.normalize();
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_json(&raw)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_json(raw: &str) -> anyhow::Result<Self> {
        let mut config: Config = serde_json::from_str(raw)?;
        config.store.normalize();
        Ok(config)
    }

    /// Fail early when any of the four OAuth values is missing.
    pub fn require_credentials(&self) -> anyhow::Result<()> {
        let missing: Vec<&str> = [
            ("api key", &self.auth.api_key),
            ("api secret", &self.auth.api_secret),
            ("user token", &self.auth.user_token),
            ("user secret", &self.auth.user_secret),
        ]
        .into_iter()
        .filter(|(_, v)| v.is_empty())
        .map(|(name, _)| name)
        .collect();

        if !missing.is_empty() {
            anyhow::bail!(
                "Missing credentials: {}. Pass them with --config, flags or SMUGMUG_* environment variables",
                missing.join(", ")
            );
        }
        Ok(())
    }

    /// Fail early when no destination folder is configured.
    pub fn require_destination(&self) -> anyhow::Result<()> {
        if self.store.destination.as_os_str().is_empty() {
            anyhow::bail!("No destination folder configured (--destination or store.destination)");
        }
        Ok(())
    }
}
