use camino::{Utf8Path, Utf8PathBuf};
use futures::stream::{self, StreamExt};
use kitsu_core::{has_extension, RemoteFileEntry};
use kitsu_infra::net::{DownloadOutcome, FetchError, Fetcher};
use kitsu_persistence::{is_non_empty_file, IgnoreEntry, IgnoreLedger, IgnorePatterns, StorageError};
use reqwest::header::HeaderMap;
use std::fmt;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DownloadStatus {
    AlreadyExists,
    ExplicitlyIgnored,
    BlockedFileType,
    DownloadFailed,
    Saved,
}

impl DownloadStatus {
    pub fn name(&self) -> &'static str {
        match self {
            DownloadStatus::AlreadyExists => "already_exists",
            DownloadStatus::ExplicitlyIgnored => "explicitly_ignored",
            DownloadStatus::BlockedFileType => "blocked_file_type",
            DownloadStatus::DownloadFailed => "download_failed",
            DownloadStatus::Saved => "saved",
        }
    }
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name().replace('_', " "))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DownloadResult {
    pub status: DownloadStatus,
    pub file: RemoteFileEntry,
    pub path: Utf8PathBuf,
    /// HTTP status of a failed download; `None` for transport errors.
    pub status_code: Option<u16>,
}

impl DownloadResult {
    fn skipped(status: DownloadStatus, file: &RemoteFileEntry, path: Utf8PathBuf) -> Self {
        Self {
            status,
            file: file.clone(),
            path,
            status_code: None,
        }
    }

    pub fn is_successful(&self) -> bool {
        matches!(
            self.status,
            DownloadStatus::AlreadyExists | DownloadStatus::Saved
        )
    }
}

impl fmt::Display for DownloadResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.status, self.status_code) {
            (DownloadStatus::DownloadFailed, Some(code)) => {
                write!(f, "{} with status {}: {}", self.status, code, self.file.url)
            }
            _ => write!(f, "{}: {}", self.status, self.file.url),
        }
    }
}

/// Outcome counters of one or more directory batches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadCounts {
    pub already_exists: usize,
    pub explicitly_ignored: usize,
    pub blocked_file_type: usize,
    pub download_failed: usize,
    pub saved: usize,
}

impl DownloadCounts {
    pub fn add(&mut self, status: DownloadStatus) {
        *self.slot(status) += 1;
    }

    fn slot(&mut self, status: DownloadStatus) -> &mut usize {
        match status {
            DownloadStatus::AlreadyExists => &mut self.already_exists,
            DownloadStatus::ExplicitlyIgnored => &mut self.explicitly_ignored,
            DownloadStatus::BlockedFileType => &mut self.blocked_file_type,
            DownloadStatus::DownloadFailed => &mut self.download_failed,
            DownloadStatus::Saved => &mut self.saved,
        }
    }

    pub fn saved(&self) -> usize {
        self.saved
    }

    pub fn failed(&self) -> usize {
        self.download_failed
    }

    pub fn merge(&mut self, other: &DownloadCounts) {
        self.already_exists += other.already_exists;
        self.explicitly_ignored += other.explicitly_ignored;
        self.blocked_file_type += other.blocked_file_type;
        self.download_failed += other.download_failed;
        self.saved += other.saved;
    }

    pub fn from_results(results: &[DownloadResult]) -> Self {
        let mut counts = Self::default();
        for r in results {
            counts.add(r.status);
        }
        counts
    }
}

/// Turns remote file lists into files on disk for one directory at a time.
#[derive(Clone)]
pub struct SubtitleDownloader {
    fetcher: Fetcher,
    allowed_file_types: Vec<String>,
    patterns: IgnorePatterns,
    concurrency: usize,
    headers: HeaderMap,
}

impl SubtitleDownloader {
    pub fn new(
        fetcher: Fetcher,
        allowed_file_types: Vec<String>,
        patterns: IgnorePatterns,
        concurrency: usize,
    ) -> Self {
        Self {
            fetcher,
            allowed_file_types,
            patterns,
            concurrency: concurrency.max(1),
            headers: HeaderMap::new(),
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Decide what to do with one file without touching the network.
    /// `None` means it has to be downloaded.
    ///
    /// Order: blocked type, fresh ledger entry (exists on disk or not),
    /// root ignore patterns, unledgered file already on disk.
    /// A ledger entry older than the remote file is a refresh.
    pub fn decide(
        &self,
        dir: &Utf8Path,
        file: &RemoteFileEntry,
        ledger: &IgnoreLedger,
    ) -> Option<DownloadStatus> {
        if !has_extension(&file.name, &self.allowed_file_types) {
            return Some(DownloadStatus::BlockedFileType);
        }
        let path = dir.join(&file.name);
        if let Some(entry) = ledger.get(&file.name) {
            if entry.last_modified >= file.last_modified {
                return Some(if is_non_empty_file(&path) {
                    DownloadStatus::AlreadyExists
                } else {
                    DownloadStatus::ExplicitlyIgnored
                });
            }
            debug!("remote copy is newer, refreshing {path}");
            return None;
        }
        if self.patterns.is_matching(&path) {
            return Some(DownloadStatus::ExplicitlyIgnored);
        }
        if is_non_empty_file(&path) {
            return Some(DownloadStatus::AlreadyExists);
        }
        None
    }

    async fn fetch_one(&self, file: RemoteFileEntry, path: Utf8PathBuf) -> DownloadResult {
        debug!("downloading file: {}", file.url);
        loop {
            let outcome = self
                .fetcher
                .download_to(&file.url, &path, self.headers.clone())
                .await;
            let (status, status_code) = match outcome {
                Ok(DownloadOutcome::Saved { .. }) => (DownloadStatus::Saved, Some(200)),
                Ok(DownloadOutcome::Failed(code)) => (DownloadStatus::DownloadFailed, Some(code.code())),
                Err(FetchError::RateLimited { rate_limit, .. }) => {
                    rate_limit.sleep().await;
                    continue;
                }
                Err(e) => {
                    warn!("{e}");
                    (DownloadStatus::DownloadFailed, None)
                }
            };
            return DownloadResult {
                status,
                file,
                path,
                status_code,
            };
        }
    }

    /// Download every file of one directory batch and update its ledger.
    ///
    /// Results are reported in completion order. The ledger is committed
    /// once at the end (and midway if batching is enabled).
    pub async fn download_subs(
        &self,
        dir: &Utf8Path,
        files: &[RemoteFileEntry],
        ledger: &mut IgnoreLedger,
    ) -> Result<Vec<DownloadResult>, StorageError> {
        let mut results = Vec::with_capacity(files.len());
        let mut to_fetch = Vec::new();

        for file in files {
            let path = dir.join(&file.name);
            match self.decide(dir, file, ledger) {
                Some(status) => {
                    let result = DownloadResult::skipped(status, file, path);
                    info!("{result}");
                    if status == DownloadStatus::AlreadyExists && !ledger.contains(&file.name) {
                        record(ledger, &result);
                    }
                    results.push(result);
                }
                None => to_fetch.push((file.clone(), path)),
            }
        }

        let mut in_flight = stream::iter(to_fetch)
            .map(|(file, path)| self.fetch_one(file, path))
            .buffer_unordered(self.concurrency);

        while let Some(result) = in_flight.next().await {
            info!("{result}");
            if result.is_successful() {
                // not fetched again even if moved later
                record(ledger, &result);
            }
            ledger.maybe_commit_midway()?;
            results.push(result);
        }

        ledger.commit()?;
        Ok(results)
    }
}

fn record(ledger: &mut IgnoreLedger, result: &DownloadResult) {
    let size_bytes = match std::fs::metadata(&result.path) {
        Ok(meta) => meta.len(),
        Err(_) => result.file.size_bytes.unwrap_or(0),
    };
    ledger.merge(IgnoreEntry {
        name: result.file.name.clone(),
        last_modified: result.file.last_modified,
        size_bytes,
    });
}
