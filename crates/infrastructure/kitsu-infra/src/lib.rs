pub mod archive;
pub mod net;

// Re-exports for convenience
pub use archive::{extract_archive, extract_zip, ArchiveError};
pub use net::{
    build_client, default_http_client, DownloadOutcome, FetchError, Fetcher,
    HttpClientSettings, RateLimit, RemoteLimitState, ResponseCode,
};
