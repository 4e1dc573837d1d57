use camino::Utf8PathBuf;
use chrono::Duration;
use kitsu_infra::net::FetchError;
use kitsu_persistence::StorageError;
use std::fmt;

pub mod download;
pub mod engine;
pub mod frontier;
pub mod parse;
pub mod remote;
pub mod retry;
pub mod trash;

pub use download::{DownloadCounts, DownloadResult, DownloadStatus, SubtitleDownloader};
pub use engine::DefaultSyncEngine;
pub use frontier::SyncFrontier;
pub use remote::{ApiClient, Category, RemoteAccess, ScrapeClient};
pub use retry::RetryQueue;

/// Which remote surface a sync talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessMode {
    /// JSON API with a bearer token.
    Api,
    /// HTML directory listings.
    #[default]
    Scrape,
}

#[derive(Debug, Clone)]
pub struct SyncRequest {
    pub destination: Utf8PathBuf,
    pub mode: AccessMode,
    /// Ignore `skip_older` and revisit the whole catalog.
    pub full: bool,
    /// Visit directories even if their remote timestamp did not change.
    pub ignore_dir_mod_times: bool,
    pub allowed_file_types: Vec<String>,
    pub skip_older: Duration,
    pub api_url: String,
    pub api_key: String,
    /// Scrape-mode seed page.
    pub download_root: String,
    /// Scrape-mode base for relative links.
    pub domain_url: String,
    pub concurrency: usize,
    /// Flush ledgers every N changes instead of only at the end of a directory.
    pub ledger_flush_every: Option<usize>,
    /// Wait out an exhausted quota before API calls instead of only reacting to 429.
    pub respect_remaining: bool,
    /// Move files the API stopped listing into the trash sub-directory.
    pub reconcile_trash: bool,
}

impl SyncRequest {
    pub fn new(destination: impl Into<Utf8PathBuf>, mode: AccessMode) -> Self {
        Self {
            destination: destination.into(),
            mode,
            full: false,
            ignore_dir_mod_times: false,
            allowed_file_types: ["ssa", "ass", "srt", "zip", "rar", "7z"]
                .into_iter()
                .map(String::from)
                .collect(),
            skip_older: Duration::days(30),
            api_url: kitsu_core::KITSUNEKKO_DOMAIN_URL.to_string(),
            api_key: String::new(),
            download_root: format!(
                "{}/dirlist.php?dir=subtitles/japanese/",
                kitsu_core::KITSUNEKKO_DOMAIN_URL
            ),
            domain_url: kitsu_core::KITSUNEKKO_DOMAIN_URL.to_string(),
            concurrency: 8,
            ledger_flush_every: Some(16),
            respect_remaining: true,
            reconcile_trash: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub directories_found: usize,
    pub directories_visited: usize,
    pub directories_skipped: usize,
    pub directories_failed: usize,
    pub pages_visited: usize,
    pub rate_limit_retries: usize,
    pub files_trashed: usize,
    pub downloads: DownloadCounts,
}

impl fmt::Display for SyncSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "visited {} directories ({} skipped, {} failed). saved {} files. failed {} files.",
            self.directories_visited,
            self.directories_skipped,
            self.directories_failed,
            self.downloads.saved(),
            self.downloads.failed()
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("destination directory does not exist: {0}")]
    DestinationNotFound(Utf8PathBuf),
    #[error("invalid remote url {url}: {message}")]
    InvalidUrl { url: String, message: String },
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Storage(StorageError),
}

impl From<StorageError> for SyncError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::DestinationNotFound(path) => SyncError::DestinationNotFound(path),
            other => SyncError::Storage(other),
        }
    }
}

/// Convenience constructor for the default engine.
pub fn default_engine(client: reqwest::Client) -> DefaultSyncEngine {
    DefaultSyncEngine::new(client)
}
