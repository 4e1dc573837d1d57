use camino::Utf8PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("destination directory does not exist: {0}")]
    DestinationNotFound(Utf8PathBuf),
    #[error("malformed ignore list {path}: {message}")]
    IgnoreList { path: Utf8PathBuf, message: String },
    #[error("malformed directory metadata {path}: {message}")]
    Corrupt { path: Utf8PathBuf, message: String },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("tsv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("invalid path: {0}")]
    InvalidPath(String),
    #[error("invalid ignore pattern {pattern:?}: {message}")]
    Pattern { pattern: String, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageErrorKind {
    Missing,
    Corrupt,
    InvalidPath,
    Io,
    Codec,
}

impl StorageError {
    pub fn kind(&self) -> StorageErrorKind {
        match self {
            StorageError::DestinationNotFound(_) => StorageErrorKind::Missing,
            StorageError::IgnoreList { .. } | StorageError::Corrupt { .. } => {
                StorageErrorKind::Corrupt
            }
            StorageError::Io(_) => StorageErrorKind::Io,
            StorageError::Serde(_) | StorageError::Csv(_) => StorageErrorKind::Codec,
            StorageError::InvalidPath(_) | StorageError::Pattern { .. } => {
                StorageErrorKind::InvalidPath
            }
        }
    }
}
