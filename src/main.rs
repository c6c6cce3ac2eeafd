//! smugmug-backup: copy a SmugMug account to local storage.
//!
//! Requests are signed with OAuth 1.0a (HMAC-SHA1) and retried with
//! backoff; 429 responses wait out a cooldown. Albums are walked page by
//! page, then downloaded one album at a time with bounded concurrency,
//! skipping files already on disk with the expected size.

#![warn(clippy::all)]

mod cli;
mod config;
mod download;
pub mod retry;
mod shutdown;
mod smugmug;
mod store;
mod types;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use cli::{AnalyzeStoreArgs, BackupArgs, Command, ConfigArgs};
use config::{Config, StoreConfig};
use download::BackupEngine;
use smugmug::{AccountEnumerator, ApiClient};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

fn build_client(config: &Config) -> anyhow::Result<Arc<ApiClient>> {
    let http = smugmug::build_http_client(CONNECT_TIMEOUT)?;
    let client = ApiClient::new(Arc::new(http), config.auth.clone(), config.api);
    tracing::debug!(
        base_url = client.base_url(),
        max_in_flight = config.api.max_in_flight,
        "API client ready"
    );
    Ok(Arc::new(client))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run_test_credentials(args: ConfigArgs) -> anyhow::Result<bool> {
    let config = Config::load(&args)?;
    config.require_credentials()?;

    let enumerator = AccountEnumerator::new(build_client(&config)?, &config.store);
    let valid = enumerator.test_credentials().await;
    println!("{valid}");
    Ok(valid)
}

async fn run_analyze_account(args: ConfigArgs) -> anyhow::Result<bool> {
    let config = Config::load(&args)?;
    config.require_credentials()?;
    tracing::debug!(?config, "Analyzing account");

    let shutdown_token = shutdown::install_signal_handler()?;
    let enumerator = AccountEnumerator::new(build_client(&config)?, &config.store)
        .with_cancellation(shutdown_token);
    let result = enumerator.analyze().await;
    print_json(&result)?;
    Ok(result.is_valid)
}

async fn run_analyze_store(args: AnalyzeStoreArgs) -> anyhow::Result<bool> {
    let store = StoreConfig::load(&args)?;
    if store.destination.as_os_str().is_empty() {
        anyhow::bail!("No destination folder configured (--destination or store.destination)");
    }

    let destination = store.destination.clone();
    let result = tokio::task::spawn_blocking(move || store::analyze_store(&destination)).await?;
    print_json(&result)?;
    Ok(result.is_valid)
}

async fn run_backup(args: BackupArgs) -> anyhow::Result<bool> {
    let config = Config::load(&args.config)?;
    config.require_credentials()?;
    config.require_destination()?;
    tracing::info!(
        concurrent_albums = config.store.concurrent_albums,
        concurrent_downloads = config.store.concurrent_downloads,
        "Starting smugmug-backup"
    );
    tracing::debug!(?config, "Effective configuration");

    let shutdown_token = shutdown::install_signal_handler()?;
    let engine = BackupEngine::new(build_client(&config)?, config.store.clone(), config.api.retry);

    let pb = download::create_progress_bar(args.no_progress_bar);
    let run = engine.run(
        // indicatif needs `suspend` to coordinate writes with the bar redraw
        |line| pb.suspend(|| tracing::info!("{}", line)),
        |total, completed| {
            pb.set_length(total as u64);
            pb.set_position(completed as u64);
        },
    );
    tokio::pin!(run);
    let result = tokio::select! {
        result = &mut run => result,
        _ = shutdown_token.cancelled() => {
            engine.stop();
            run.await
        }
    };
    pb.finish_and_clear();

    tracing::debug!(phase = ?engine.phase(), stats = ?result.stats, "Backup finished");
    print_json(&result)?;
    Ok(result.is_valid)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    // Logs go to stderr so stdout carries only the result record.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cli.log_level.as_filter())),
        )
        .with_writer(std::io::stderr)
        .init();

    let valid = match cli.command {
        Command::TestCredentials(args) => run_test_credentials(args).await?,
        Command::AnalyzeAccount(args) => run_analyze_account(args).await?,
        Command::AnalyzeStore(args) => run_analyze_store(args).await?,
        Command::Backup(args) => run_backup(args).await?,
    };

    if !valid {
        std::process::exit(1);
    }
    Ok(())
}
