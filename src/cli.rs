use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::types::LogLevel;

#[derive(Parser, Debug)]
#[command(
    name = "smugmug-backup",
    version,
    about = "Back up a SmugMug account to local storage"
)]
pub struct Cli {
    /// Log level (RUST_LOG takes precedence)
    #[arg(long, value_enum, default_value = "info", global = true)]
    pub log_level: LogLevel,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Check that the credentials resolve to a SmugMug user
    TestCredentials(ConfigArgs),

    /// Count albums and images in the account
    AnalyzeAccount(ConfigArgs),

    /// Count folders, images and videos already in the destination
    AnalyzeStore(AnalyzeStoreArgs),

    /// Download every album into the destination
    Backup(BackupArgs),
}

/// OAuth credentials. Prefer the environment variables over flags:
/// flag values are visible in process listings.
#[derive(Args, Debug, Default)]
pub struct AuthArgs {
    /// API key (consumer key)
    #[arg(long, env = "SMUGMUG_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// API secret (consumer secret)
    #[arg(long, env = "SMUGMUG_API_SECRET", hide_env_values = true)]
    pub api_secret: Option<String>,

    /// User access token
    #[arg(long, env = "SMUGMUG_USER_TOKEN", hide_env_values = true)]
    pub user_token: Option<String>,

    /// User access token secret
    #[arg(long, env = "SMUGMUG_USER_SECRET", hide_env_values = true)]
    pub user_secret: Option<String>,
}

#[derive(Args, Debug, Default)]
pub struct StoreArgs {
    /// Local destination folder
    #[arg(short = 'd', long)]
    pub destination: Option<String>,

    /// Filename template, e.g. "{{FileName}}" or "{{ImageKey}}-{{FileName}}"
    #[arg(long)]
    pub file_name_template: Option<String>,

    /// Set file times from the photo's capture/upload date
    #[arg(long)]
    pub use_metadata_times: bool,

    /// Also fix times on files that were already downloaded
    #[arg(long)]
    pub force_metadata_times: bool,

    /// Download videos even while SmugMug is still processing them
    #[arg(long)]
    pub force_video_download: bool,

    /// Albums fetched in parallel during enumeration
    #[arg(long)]
    pub concurrent_albums: Option<usize>,

    /// Assets downloaded in parallel within an album
    #[arg(long)]
    pub concurrent_downloads: Option<usize>,
}

#[derive(Args, Debug, Default)]
pub struct ConfigArgs {
    /// JSON config file ({auth: {...}, store: {...}}); flags override it
    #[arg(long = "config", value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub auth: AuthArgs,

    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Args, Debug)]
pub struct AnalyzeStoreArgs {
    /// JSON config file; only the store section is read
    #[arg(long = "config", value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Local destination folder
    #[arg(short = 'd', long)]
    pub destination: Option<String>,
}

#[derive(Args, Debug)]
pub struct BackupArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Disable progress bar
    #[arg(long)]
    pub no_progress_bar: bool,
}
