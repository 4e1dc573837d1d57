use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use std::io::Write;
use std::path::PathBuf;

use crate::StorageError;

/// Write the whole file or nothing: uniquely named temp file next to the
/// target, then rename. Concurrent writers never share a temp file.
pub fn write_atomic(path: &Utf8Path, bytes: &[u8]) -> Result<(), StorageError> {
    let file_name = path
        .file_name()
        .ok_or_else(|| StorageError::InvalidPath(path.to_string()))?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let prefix = format!(".{file_name}.");
    let mut builder = tempfile::Builder::new();
    builder.prefix(&prefix).suffix(".tmp");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(std::fs::Permissions::from_mode(0o644));
    }
    let mut tmp = builder.tempfile_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// True if the path is a regular file with at least one byte.
pub fn is_non_empty_file(path: &Utf8Path) -> bool {
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}

pub fn file_mtime(meta: &std::fs::Metadata) -> DateTime<Utc> {
    meta.modified()
        .map(DateTime::<Utc>::from)
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

pub fn to_utf8(path: PathBuf) -> Result<Utf8PathBuf, StorageError> {
    Utf8PathBuf::from_path_buf(path)
        .map_err(|p| StorageError::InvalidPath(p.to_string_lossy().into_owned()))
}
