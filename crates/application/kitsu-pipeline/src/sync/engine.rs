use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};
use futures::stream::{self, FuturesUnordered, StreamExt};
use kitsu_core::time::{format_api_time, now_utc};
use kitsu_core::{EntryId, EntryType, RemoteDirectoryEntry, RemoteFileEntry, UPDATED_FILENAME};
use kitsu_infra::net::{FetchError, Fetcher};
use kitsu_persistence::{
    write_atomic, DirectoryMetaStore, IgnoreLedger, IgnorePatterns, MirrorLayout,
    SidecarMetaStore, StorageError,
};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::sanitize::DirPathMatcher;
use crate::sync::download::{DownloadCounts, SubtitleDownloader};
use crate::sync::frontier::SyncFrontier;
use crate::sync::parse::PageListing;
use crate::sync::remote::{ApiClient, Category, RemoteAccess, ScrapeClient};
use crate::sync::retry::RetryQueue;
use crate::sync::trash::move_unlisted_to_trash;
use crate::sync::{SyncError, SyncRequest, SyncSummary};

/// A remote directory together with where it goes on disk.
#[derive(Debug, Clone)]
struct VisitPlan {
    entry: RemoteDirectoryEntry,
    dir: Utf8PathBuf,
    local: Option<RemoteDirectoryEntry>,
}

#[derive(Debug, Clone)]
enum Task {
    Search(Category),
    Visit(VisitPlan),
}

enum TaskOutput {
    Found(Vec<RemoteDirectoryEntry>),
    Visited(VisitReport),
}

#[derive(Debug, Default)]
struct VisitReport {
    counts: DownloadCounts,
    trashed: usize,
}

/// State shared by every task of one sync run.
struct Pass<'a> {
    req: &'a SyncRequest,
    layout: MirrorLayout,
    downloader: SubtitleDownloader,
    matcher: DirPathMatcher,
    store: &'a dyn DirectoryMetaStore,
    cutoff: Option<DateTime<Utc>>,
}

impl Pass<'_> {
    fn plan(&self, entry: RemoteDirectoryEntry) -> VisitPlan {
        match self.matcher.resolve(&entry) {
            Some(found) => VisitPlan {
                local: found.meta.as_ref().map(|m| m.entry.clone()),
                dir: found.path.clone(),
                entry,
            },
            None => VisitPlan {
                dir: self.layout.canonical_dir(&entry),
                local: None,
                entry,
            },
        }
    }

    /// Reserve the plan's directory for this run. An entry whose directory
    /// already belongs to another id, on disk or earlier in this run, moves
    /// to `"<name> [<id>]"`.
    fn reserve_dir(&self, mut plan: VisitPlan, claimed: &mut HashSet<Utf8PathBuf>) -> Option<VisitPlan> {
        let id = plan.entry.entry_id;
        let foreign_on_disk = match (id, self.matcher.entry_id_at(&plan.dir)) {
            (Some(want), Some(have)) => want != have,
            _ => false,
        };
        if foreign_on_disk || claimed.contains(&plan.dir) {
            let alternative = id.map(|id| self.layout.disambiguated_dir(&plan.entry, id));
            match alternative {
                Some(dir) if !claimed.contains(&dir) => {
                    debug!("'{}' is taken, using {dir}", plan.dir);
                    plan.dir = dir;
                    plan.local = None;
                }
                _ => {
                    warn!(
                        "directory {} is already in use; skipping '{}'",
                        plan.dir, plan.entry.name
                    );
                    return None;
                }
            }
        }
        claimed.insert(plan.dir.clone());
        Some(plan)
    }

    fn should_visit(&self, plan: &VisitPlan) -> bool {
        match &plan.local {
            _ if self.req.ignore_dir_mod_times => true,
            None => true,
            Some(local) => plan.entry.last_modified > local.last_modified,
        }
    }

    fn is_recent(&self, time: DateTime<Utc>) -> bool {
        self.cutoff.map_or(true, |cutoff| time >= cutoff)
    }

    /// Download one directory batch, then checkpoint it if nothing failed.
    async fn sync_directory(
        &self,
        plan: &VisitPlan,
        files: &[RemoteFileEntry],
        reconcile_trash: bool,
    ) -> Result<VisitReport, StorageError> {
        let mut ledger =
            IgnoreLedger::open_or_empty(&plan.dir).with_flush_every(self.req.ledger_flush_every);
        let results = self
            .downloader
            .download_subs(&plan.dir, files, &mut ledger)
            .await?;
        let counts = DownloadCounts::from_results(&results);
        info!(
            "in directory '{}': saved {} files. failed {} files.",
            plan.entry.name,
            counts.saved(),
            counts.failed()
        );

        let mut report = VisitReport { counts, trashed: 0 };
        if counts.failed() > 0 {
            return Ok(report);
        }
        std::fs::create_dir_all(&plan.dir)?;
        self.store
            .save(&plan.dir, &plan.entry.merged_with(plan.local.as_ref()))?;
        if reconcile_trash {
            let listed: HashSet<&str> = files.iter().map(|f| f.name.as_str()).collect();
            report.trashed = move_unlisted_to_trash(&plan.dir, &listed)?;
        }
        Ok(report)
    }

    async fn run_task(&self, api: &ApiClient, task: Task) -> (Task, Result<TaskOutput, SyncError>) {
        let result = match &task {
            Task::Search(category) => {
                let after = if self.req.full { None } else { self.cutoff };
                api.search(*category, after)
                    .await
                    .map(TaskOutput::Found)
                    .map_err(SyncError::from)
            }
            Task::Visit(plan) => self.visit_api_dir(api, plan).await.map(TaskOutput::Visited),
        };
        (task, result)
    }

    async fn visit_api_dir(&self, api: &ApiClient, plan: &VisitPlan) -> Result<VisitReport, SyncError> {
        let Some(entry_id) = plan.entry.entry_id else {
            return Ok(VisitReport::default());
        };
        let files = api.list_files(entry_id).await?;
        info!(
            "visited directory '{}'. found {} files.",
            plan.entry.name,
            files.len()
        );
        Ok(self
            .sync_directory(plan, &files, self.req.reconcile_trash)
            .await?)
    }

    /// Crawl one listing page and download the files it lists, grouped by show.
    async fn visit_page(
        &self,
        scrape: &ScrapeClient,
        url: &str,
        listed: Option<&RemoteDirectoryEntry>,
    ) -> Result<(PageListing, VisitReport), FetchError> {
        let page = loop {
            match scrape.crawl_page(url).await {
                Err(FetchError::RateLimited { rate_limit, .. }) => rate_limit.sleep().await,
                other => break other?,
            }
        };
        info!(
            "visited page {url}. found {} directories and {} files.",
            page.dirs.len(),
            page.files.len()
        );

        let mut groups: BTreeMap<&str, Vec<RemoteFileEntry>> = BTreeMap::new();
        for listed_file in &page.files {
            if self.is_recent(listed_file.file.last_modified) {
                groups
                    .entry(listed_file.show_name.as_str())
                    .or_default()
                    .push(listed_file.file.clone());
            }
        }

        let mut report = VisitReport::default();
        for (show, files) in groups {
            let entry = match listed {
                Some(entry) if entry.name == show => entry.clone(),
                _ => {
                    let newest = files
                        .iter()
                        .map(|f| f.last_modified)
                        .max()
                        .unwrap_or_else(now_utc);
                    RemoteDirectoryEntry::new(show, EntryType::Unsorted, newest)
                }
            };
            let plan = self.plan(entry);
            match self.sync_directory(&plan, &files, false).await {
                Ok(visit) => {
                    report.counts.merge(&visit.counts);
                }
                Err(e) => warn!("in directory '{show}': {e}"),
            }
        }
        Ok((page, report))
    }
}

pub struct DefaultSyncEngine {
    fetcher: Fetcher,
    store: Arc<dyn DirectoryMetaStore>,
}

impl DefaultSyncEngine {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            fetcher: Fetcher::new(client),
            store: Arc::new(SidecarMetaStore::new()),
        }
    }

    pub fn with_components(fetcher: Fetcher, store: Arc<dyn DirectoryMetaStore>) -> Self {
        Self { fetcher, store }
    }

    pub fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    /// One complete sync pass. Per-URL and per-file failures are logged and
    /// counted; only a missing destination or a bad remote URL are errors.
    pub async fn run(&self, req: &SyncRequest) -> Result<SyncSummary, SyncError> {
        let layout = MirrorLayout::new(req.destination.clone());
        layout.ensure_exists()?;
        let remote = RemoteAccess::for_request(self.fetcher.clone(), req)?;

        let patterns = IgnorePatterns::load(layout.root()).unwrap_or_else(|e| {
            warn!("{e}; ignoring root patterns");
            IgnorePatterns::empty(layout.root())
        });
        let downloader = SubtitleDownloader::new(
            remote.fetcher().clone(),
            req.allowed_file_types.clone(),
            patterns,
            req.concurrency,
        )
        .with_headers(remote.download_headers());

        let pass = Pass {
            req,
            matcher: DirPathMatcher::scan(&layout, self.store.as_ref())?,
            layout,
            downloader,
            store: self.store.as_ref(),
            cutoff: (!req.full).then(|| now_utc() - req.skip_older),
        };

        let summary = match &remote {
            RemoteAccess::Api(api) => self.run_api(&pass, api).await,
            RemoteAccess::Scrape(scrape) => self.run_scrape(&pass, scrape).await,
        };

        let updated = pass.layout.root().join(UPDATED_FILENAME);
        write_atomic(&updated, format_api_time(&now_utc()).as_bytes())?;
        Ok(summary)
    }

    async fn run_api(&self, pass: &Pass<'_>, api: &ApiClient) -> SyncSummary {
        let mut summary = SyncSummary::default();
        let mut ready: VecDeque<Task> = Category::ALL.into_iter().map(Task::Search).collect();
        let mut parked: RetryQueue<Task> = RetryQueue::new();
        let mut dispatched: HashSet<EntryId> = HashSet::new();
        let mut claimed: HashSet<Utf8PathBuf> = HashSet::new();
        let mut in_flight = FuturesUnordered::new();
        let limit = pass.req.concurrency.max(1);

        loop {
            ready.extend(parked.pop_ready(Instant::now()));
            while in_flight.len() < limit {
                let Some(task) = ready.pop_front() else {
                    break;
                };
                in_flight.push(pass.run_task(api, task));
            }

            let deadline = parked.next_deadline();
            if in_flight.is_empty() {
                match deadline {
                    Some(at) => {
                        sleep_until(at).await;
                        continue;
                    }
                    None => break,
                }
            }

            tokio::select! {
                Some((task, result)) = in_flight.next() => {
                    match result {
                        Ok(TaskOutput::Found(entries)) => {
                            summary.directories_found += entries.len();
                            for entry in entries {
                                if let Some(id) = entry.entry_id {
                                    if !dispatched.insert(id) {
                                        continue;
                                    }
                                }
                                let Some(plan) = pass.reserve_dir(pass.plan(entry), &mut claimed) else {
                                    summary.directories_skipped += 1;
                                    continue;
                                };
                                if pass.should_visit(&plan) {
                                    ready.push_back(Task::Visit(plan));
                                } else {
                                    debug!(
                                        "skipped directory that has been visited recently: '{}'",
                                        plan.entry.name
                                    );
                                    summary.directories_skipped += 1;
                                }
                            }
                        }
                        Ok(TaskOutput::Visited(report)) => {
                            summary.directories_visited += 1;
                            if report.counts.failed() > 0 {
                                summary.directories_failed += 1;
                            }
                            summary.files_trashed += report.trashed;
                            summary.downloads.merge(&report.counts);
                        }
                        Err(SyncError::Fetch(FetchError::RateLimited { rate_limit, .. })) => {
                            info!("Rate limited. Status: {rate_limit}.");
                            parked.push(task, Instant::now() + rate_limit.sleep_duration());
                            summary.rate_limit_retries += 1;
                        }
                        Err(e) => {
                            match &task {
                                Task::Search(category) => warn!("search {category:?} failed: {e}"),
                                Task::Visit(plan) => {
                                    warn!("in directory '{}': {e}", plan.entry.name);
                                    summary.directories_visited += 1;
                                    summary.directories_failed += 1;
                                }
                            }
                        }
                    }
                }
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {}
            }
        }
        summary
    }

    async fn run_scrape(&self, pass: &Pass<'_>, scrape: &ScrapeClient) -> SyncSummary {
        let mut summary = SyncSummary::default();
        let mut frontier = SyncFrontier::new(scrape.root_url().to_string());
        let mut listed: HashMap<String, RemoteDirectoryEntry> = HashMap::new();
        let limit = pass.req.concurrency.max(1);

        while frontier.has_unvisited() {
            let round = frontier.claim();
            let mut pages = stream::iter(round)
                .map(|url| {
                    let entry = listed.get(&url).cloned();
                    async move {
                        let result = pass.visit_page(scrape, &url, entry.as_ref()).await;
                        (url, result)
                    }
                })
                .buffer_unordered(limit);

            let mut discovered = Vec::new();
            while let Some((url, result)) = pages.next().await {
                let (page, report) = match result {
                    Ok(done) => done,
                    Err(e) => {
                        warn!("{e}");
                        continue;
                    }
                };
                summary.pages_visited += 1;
                if !page.files.is_empty() {
                    summary.directories_visited += 1;
                    if report.counts.failed() > 0 {
                        summary.directories_failed += 1;
                    }
                }
                summary.downloads.merge(&report.counts);
                debug!("finished page {url}");

                for dir in page.dirs {
                    summary.directories_found += 1;
                    if !pass.is_recent(dir.entry.last_modified) {
                        summary.directories_skipped += 1;
                        continue;
                    }
                    let plan = pass.plan(dir.entry.clone());
                    if !pass.should_visit(&plan) {
                        debug!(
                            "skipped directory that has been visited recently: '{}'",
                            plan.entry.name
                        );
                        summary.directories_skipped += 1;
                        continue;
                    }
                    discovered.push(dir);
                }
            }
            drop(pages);

            for dir in discovered {
                listed.insert(dir.url.clone(), dir.entry);
                frontier.discover(dir.url);
            }
            frontier.balance();
        }
        summary
    }
}
