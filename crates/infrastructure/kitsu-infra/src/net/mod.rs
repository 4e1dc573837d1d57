mod rate_limit;
mod status;

pub use rate_limit::{RateLimit, RemoteLimitState, RATE_LIMIT_MARGIN};
pub use status::{FetchError, ResponseCode};

use camino::{Utf8Path, Utf8PathBuf};
use futures::StreamExt;
use governor::clock::DefaultClock;
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

const MAX_ATTEMPTS: usize = 3;
const RETRY_PAUSE: Duration = Duration::from_millis(500);
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Browser-like headers; the listing pages reject obvious bots.
pub const DEFAULT_HEADERS: &[(&str, &str)] = &[
    (
        "User-Agent",
        "Mozilla/5.0 (Windows NT 10.0; rv:108.0) Gecko/20100101 Firefox/108.0",
    ),
    (
        "Accept",
        "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
    ),
    ("Accept-Charset", "ISO-8859-1,utf-8;q=0.7,*;q=0.3"),
    ("Accept-Encoding", "none"),
    ("Accept-Language", "en-US,en;q=0.8"),
    ("Connection", "keep-alive"),
];

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>;

#[derive(Debug, Clone)]
pub struct HttpClientSettings {
    pub proxy: Option<String>,
    pub timeout: Duration,
    pub headers: Vec<(String, String)>,
}

impl Default for HttpClientSettings {
    fn default() -> Self {
        Self {
            proxy: None,
            timeout: DEFAULT_TIMEOUT,
            headers: DEFAULT_HEADERS
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

pub fn build_client(settings: &HttpClientSettings) -> reqwest::Result<Client> {
    let mut headers = HeaderMap::new();
    for (name, value) in &settings.headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => warn!("ignoring invalid header {name:?}"),
        }
    }

    let mut builder = Client::builder()
        .default_headers(headers)
        .timeout(settings.timeout);
    if let Some(proxy) = settings.proxy.as_deref().filter(|p| !p.trim().is_empty()) {
        builder = builder.proxy(reqwest::Proxy::all(proxy)?);
    }
    builder.build()
}

pub fn default_http_client() -> reqwest::Result<Client> {
    build_client(&HttpClientSettings::default())
}

/// What happened to one file download that reached the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    Saved { bytes: u64 },
    Failed(ResponseCode),
}

/// Shared HTTP front: request pacing, transport retries and status mapping.
#[derive(Clone)]
pub struct Fetcher {
    client: Client,
    limiter: Option<Arc<DirectLimiter>>,
    remote_limit: RemoteLimitState,
}

impl Fetcher {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            limiter: None,
            remote_limit: RemoteLimitState::new(),
        }
    }

    /// Cap outgoing requests; 0 disables pacing.
    pub fn with_requests_per_second(mut self, requests_per_second: u32) -> Self {
        self.limiter = NonZeroU32::new(requests_per_second)
            .map(|nz| Arc::new(RateLimiter::direct(Quota::per_second(nz))));
        self
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn remote_limit(&self) -> &RemoteLimitState {
        &self.remote_limit
    }

    async fn pace(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }

    /// Send with up to three attempts on transport errors. Any HTTP status is
    /// returned as-is.
    pub async fn send(&self, request: RequestBuilder, url: &str) -> Result<Response, FetchError> {
        let mut last_err = None;
        for attempt in 0..MAX_ATTEMPTS {
            let Some(req) = request.try_clone() else {
                self.pace().await;
                return request
                    .send()
                    .await
                    .map_err(|e| FetchError::connection(url, &e));
            };
            self.pace().await;
            match req.send().await {
                Ok(resp) => {
                    if let Some(rate_limit) = RateLimit::from_headers(resp.headers()) {
                        self.remote_limit.update(rate_limit);
                    }
                    return Ok(resp);
                }
                Err(e) => {
                    debug!("attempt {} for {url} failed: {e}", attempt + 1);
                    last_err = Some(FetchError::connection(url, &e));
                }
            }
            if attempt + 1 < MAX_ATTEMPTS {
                tokio::time::sleep(RETRY_PAUSE).await;
            }
        }
        Err(last_err.unwrap_or(FetchError::Connection {
            url: url.to_string(),
            kind: "RequestError",
        }))
    }

    /// 200 passes through, 429 becomes `RateLimited`, anything else `BadStatus`.
    pub fn check_status(url: &str, resp: Response) -> Result<Response, FetchError> {
        let status = ResponseCode::from(resp.status());
        match status {
            ResponseCode::Successful => Ok(resp),
            ResponseCode::RateLimitExceeded => Err(FetchError::RateLimited {
                url: url.to_string(),
                status,
                rate_limit: RateLimit::from_headers(resp.headers()).unwrap_or_default(),
            }),
            _ => Err(FetchError::BadStatus {
                url: url.to_string(),
                status,
            }),
        }
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        headers: HeaderMap,
    ) -> Result<T, FetchError> {
        let resp = self.send(self.client.get(url).headers(headers), url).await?;
        let resp = Self::check_status(url, resp)?;
        let body = resp
            .bytes()
            .await
            .map_err(|e| FetchError::connection(url, &e))?;
        serde_json::from_slice(&body).map_err(|e| FetchError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })
    }

    pub async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        let resp = self.send(self.client.get(url), url).await?;
        let resp = Self::check_status(url, resp)?;
        resp.text()
            .await
            .map_err(|e| FetchError::connection(url, &e))
    }

    /// Stream a file body to `<target>.part`, then rename it into place.
    ///
    /// A non-200 answer is an `Ok(Failed)` outcome, except 429 which is
    /// returned as `RateLimited` so the caller can schedule a retry.
    pub async fn download_to(
        &self,
        url: &str,
        target: &Utf8Path,
        headers: HeaderMap,
    ) -> Result<DownloadOutcome, FetchError> {
        let part = part_path(target);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| FetchError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        let mut last_err = None;
        for attempt in 0..MAX_ATTEMPTS {
            let resp = self
                .send(self.client.get(url).headers(headers.clone()), url)
                .await?;
            let resp = match Self::check_status(url, resp) {
                Ok(resp) => resp,
                Err(FetchError::BadStatus { status, .. }) => {
                    return Ok(DownloadOutcome::Failed(status))
                }
                Err(e) => return Err(e),
            };

            match write_body(url, resp, &part).await {
                Ok(bytes) => {
                    tokio::fs::rename(&part, target)
                        .await
                        .map_err(|source| FetchError::Io {
                            path: target.to_path_buf(),
                            source,
                        })?;
                    return Ok(DownloadOutcome::Saved { bytes });
                }
                Err(e @ FetchError::Io { .. }) => {
                    let _ = tokio::fs::remove_file(&part).await;
                    return Err(e);
                }
                Err(e) => {
                    debug!("attempt {} for {url} broke off: {e}", attempt + 1);
                    last_err = Some(e);
                }
            }
            if attempt + 1 < MAX_ATTEMPTS {
                tokio::time::sleep(RETRY_PAUSE).await;
            }
        }

        let _ = tokio::fs::remove_file(&part).await;
        Err(last_err.unwrap_or(FetchError::Connection {
            url: url.to_string(),
            kind: "BodyError",
        }))
    }
}

pub fn part_path(target: &Utf8Path) -> Utf8PathBuf {
    let name = target.file_name().unwrap_or("download");
    target.with_file_name(format!("{name}.part"))
}

async fn write_body(url: &str, resp: Response, part: &Utf8Path) -> Result<u64, FetchError> {
    let io_err = |source: std::io::Error| FetchError::Io {
        path: part.to_path_buf(),
        source,
    };
    let mut file = tokio::fs::File::create(part).await.map_err(io_err)?;
    let mut stream = resp.bytes_stream();
    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| FetchError::connection(url, &e))?;
        file.write_all(&chunk).await.map_err(io_err)?;
        written += chunk.len() as u64;
    }
    file.flush().await.map_err(io_err)?;
    Ok(written)
}
