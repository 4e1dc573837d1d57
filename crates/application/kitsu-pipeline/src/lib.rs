pub mod archives;
pub mod catalog;
pub mod ignore;
pub mod sanitize;
pub mod sync;

pub use catalog::{build_catalog, CatalogEntry, CatalogError};
pub use sanitize::{SanitizeError, SanitizeOptions, SanitizeReport, Sanitizer};
pub use sync::{
    default_engine, AccessMode, DefaultSyncEngine, DownloadCounts, DownloadStatus, SyncError,
    SyncRequest, SyncSummary,
};
