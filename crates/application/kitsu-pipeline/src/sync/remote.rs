use chrono::{DateTime, Utc};
use kitsu_core::{ApiDirectory, ApiFile, EntryId, RemoteDirectoryEntry, RemoteFileEntry};
use kitsu_infra::net::{FetchError, Fetcher};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use tracing::{info, warn};

use crate::sync::parse::{parse_listing, PageListing};
use crate::sync::{AccessMode, SyncError, SyncRequest};

/// Top-level catalog split of the search endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Anime,
    Drama,
}

impl Category {
    pub const ALL: [Category; 2] = [Category::Anime, Category::Drama];

    fn is_anime(&self) -> bool {
        matches!(self, Category::Anime)
    }
}

/// JSON API access.
#[derive(Clone)]
pub struct ApiClient {
    fetcher: Fetcher,
    api_url: String,
    api_key: String,
    respect_remaining: bool,
}

impl ApiClient {
    pub fn new(fetcher: Fetcher, api_url: &str, api_key: &str) -> Self {
        Self {
            fetcher,
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            respect_remaining: true,
        }
    }

    pub fn respect_remaining(mut self, respect: bool) -> Self {
        self.respect_remaining = respect;
        self
    }

    pub fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    /// `Authorization` plus whatever the client already sends by default.
    pub fn auth_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if !self.api_key.is_empty() {
            match HeaderValue::from_str(&self.api_key) {
                Ok(value) => {
                    headers.insert(AUTHORIZATION, value);
                }
                Err(_) => warn!("api key is not a valid header value; sending requests without it"),
            }
        }
        headers
    }

    pub fn search_url(&self, category: Category, after: Option<DateTime<Utc>>) -> String {
        let mut url = format!(
            "{}/api/entries/search?anime={}",
            self.api_url,
            category.is_anime()
        );
        if let Some(after) = after {
            url.push_str(&format!("&after={}", after.timestamp()));
        }
        url
    }

    pub fn files_url(&self, entry_id: EntryId) -> String {
        format!("{}/api/entries/{}/files", self.api_url, entry_id)
    }

    async fn before_request(&self) {
        if self.respect_remaining {
            self.fetcher.remote_limit().wait_if_exhausted().await;
        }
    }

    /// Catalog entries of one category, newest first.
    pub async fn search(
        &self,
        category: Category,
        after: Option<DateTime<Utc>>,
    ) -> Result<Vec<RemoteDirectoryEntry>, FetchError> {
        self.before_request().await;
        let url = self.search_url(category, after);
        let raw: Vec<ApiDirectory> = self.fetcher.get_json(&url, self.auth_headers()).await?;

        let mut entries: Vec<RemoteDirectoryEntry> = raw
            .into_iter()
            .filter_map(|dir| {
                let id = dir.id;
                dir.into_entry()
                    .map_err(|e| warn!("skipping entry {id} with bad timestamp: {e}"))
                    .ok()
            })
            .collect();
        entries.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));
        info!("visited root catalog. found {} directories.", entries.len());
        Ok(entries)
    }

    pub async fn list_files(&self, entry_id: EntryId) -> Result<Vec<RemoteFileEntry>, FetchError> {
        self.before_request().await;
        let url = self.files_url(entry_id);
        let raw: Vec<ApiFile> = self.fetcher.get_json(&url, self.auth_headers()).await?;
        Ok(raw
            .into_iter()
            .filter_map(|file| {
                let name = file.name.clone();
                file.into_entry()
                    .map_err(|e| warn!("skipping file {name:?} with bad timestamp: {e}"))
                    .ok()
            })
            .collect())
    }
}

/// HTML listing access.
#[derive(Clone)]
pub struct ScrapeClient {
    fetcher: Fetcher,
    domain_url: String,
    root_url: String,
}

impl ScrapeClient {
    pub fn new(fetcher: Fetcher, domain_url: &str, root_url: &str) -> Self {
        Self {
            fetcher,
            domain_url: domain_url.trim_end_matches('/').to_string(),
            root_url: root_url.to_string(),
        }
    }

    pub fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    pub fn root_url(&self) -> &str {
        &self.root_url
    }

    pub async fn crawl_page(&self, url: &str) -> Result<PageListing, FetchError> {
        let html = self.fetcher.get_text(url).await?;
        Ok(parse_listing(&html, &self.domain_url))
    }
}

/// The two ways of talking to the remote, picked once per sync.
#[derive(Clone)]
pub enum RemoteAccess {
    Api(ApiClient),
    Scrape(ScrapeClient),
}

impl RemoteAccess {
    pub fn for_request(fetcher: Fetcher, req: &SyncRequest) -> Result<Self, SyncError> {
        match req.mode {
            AccessMode::Api => {
                validate_url(&req.api_url)?;
                Ok(RemoteAccess::Api(
                    ApiClient::new(fetcher, &req.api_url, &req.api_key)
                        .respect_remaining(req.respect_remaining),
                ))
            }
            AccessMode::Scrape => {
                validate_url(&req.download_root)?;
                validate_url(&req.domain_url)?;
                Ok(RemoteAccess::Scrape(ScrapeClient::new(
                    fetcher,
                    &req.domain_url,
                    &req.download_root,
                )))
            }
        }
    }

    pub fn fetcher(&self) -> &Fetcher {
        match self {
            RemoteAccess::Api(api) => api.fetcher(),
            RemoteAccess::Scrape(scrape) => scrape.fetcher(),
        }
    }

    /// Extra headers file downloads must carry.
    pub fn download_headers(&self) -> HeaderMap {
        match self {
            RemoteAccess::Api(api) => api.auth_headers(),
            RemoteAccess::Scrape(_) => HeaderMap::new(),
        }
    }
}

fn validate_url(url: &str) -> Result<(), SyncError> {
    reqwest::Url::parse(url)
        .map(|_| ())
        .map_err(|e| SyncError::InvalidUrl {
            url: url.to_string(),
            message: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn client(key: &str) -> ApiClient {
        ApiClient::new(
            Fetcher::new(reqwest::Client::new()),
            "https://kitsunekko.net/",
            key,
        )
    }

    #[test]
    fn search_url_adds_cutoff_only_when_given() {
        let api = client("");
        assert_eq!(
            api.search_url(Category::Drama, None),
            "https://kitsunekko.net/api/entries/search?anime=false"
        );
        let after = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(
            api.search_url(Category::Anime, Some(after)),
            "https://kitsunekko.net/api/entries/search?anime=true&after=1704067200"
        );
        assert_eq!(api.files_url(923), "https://kitsunekko.net/api/entries/923/files");
    }

    #[test]
    fn auth_header_is_sent_only_with_a_key() {
        assert!(client("").auth_headers().is_empty());
        let headers = client("secret").auth_headers();
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "secret");
    }

    #[test]
    fn bad_root_url_is_rejected() {
        let mut req = SyncRequest::new("/tmp/x", AccessMode::Scrape);
        req.download_root = "not a url".into();
        let err = RemoteAccess::for_request(Fetcher::new(reqwest::Client::new()), &req)
            .err()
            .unwrap();
        assert!(matches!(err, SyncError::InvalidUrl { .. }));
    }
}
