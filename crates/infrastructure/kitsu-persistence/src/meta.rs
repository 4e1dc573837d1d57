use camino::{Utf8Path, Utf8PathBuf};
use kitsu_core::{LocalDirectoryMeta, RemoteDirectoryEntry, INFO_FILENAME};

use crate::io::write_atomic;
use crate::StorageError;

pub fn meta_file_path(dir: &Utf8Path) -> Utf8PathBuf {
    dir.join(INFO_FILENAME)
}

/// Load and store the `.kitsuinfo.json` checkpoint of one show directory.
pub trait DirectoryMetaStore: Send + Sync {
    /// `Ok(None)` when the directory has never been synced.
    fn load(&self, dir: &Utf8Path) -> Result<Option<LocalDirectoryMeta>, StorageError>;
    /// Replaces the whole sidecar; never leaves a partial file behind.
    fn save(&self, dir: &Utf8Path, entry: &RemoteDirectoryEntry) -> Result<(), StorageError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SidecarMetaStore;

impl SidecarMetaStore {
    pub fn new() -> Self {
        Self
    }
}

impl DirectoryMetaStore for SidecarMetaStore {
    fn load(&self, dir: &Utf8Path) -> Result<Option<LocalDirectoryMeta>, StorageError> {
        let path = meta_file_path(dir);
        let data = match std::fs::read_to_string(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let entry: RemoteDirectoryEntry =
            serde_json::from_str(&data).map_err(|e| StorageError::Corrupt {
                path: path.clone(),
                message: e.to_string(),
            })?;
        Ok(Some(LocalDirectoryMeta {
            entry,
            dir_path: dir.to_path_buf(),
        }))
    }

    fn save(&self, dir: &Utf8Path, entry: &RemoteDirectoryEntry) -> Result<(), StorageError> {
        let data = entry.to_json_pretty()?;
        write_atomic(&meta_file_path(dir), data.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::to_utf8;
    use chrono::{TimeZone, Utc};
    use kitsu_core::EntryType;
    use tempfile::tempdir;

    #[test]
    fn missing_sidecar_loads_as_none() {
        let dir = tempdir().unwrap();
        let root = to_utf8(dir.path().to_path_buf()).unwrap();
        assert!(SidecarMetaStore.load(&root).unwrap().is_none());
    }

    #[test]
    fn saved_sidecar_loads_back_with_dir_path() {
        let dir = tempdir().unwrap();
        let root = to_utf8(dir.path().to_path_buf()).unwrap();
        let show = root.join("Sousou no Frieren");
        let entry = RemoteDirectoryEntry {
            entry_id: Some(5),
            japanese_name: Some("葬送のフリーレン".into()),
            ..RemoteDirectoryEntry::new(
                "Sousou no Frieren",
                EntryType::AnimeTv,
                Utc.with_ymd_and_hms(2024, 4, 14, 18, 23, 19).unwrap(),
            )
        };

        SidecarMetaStore.save(&show, &entry).unwrap();
        let raw = std::fs::read_to_string(meta_file_path(&show)).unwrap();
        assert!(raw.contains("葬送のフリーレン"), "non-ascii is written verbatim");
        assert!(raw.contains("\"last_modified\": \"2024-04-14T18:23:19Z\""));

        let loaded = SidecarMetaStore.load(&show).unwrap().unwrap();
        assert_eq!(loaded.entry, entry);
        assert_eq!(loaded.dir_path, show);
    }

    #[test]
    fn garbage_sidecar_is_corrupt() {
        let dir = tempdir().unwrap();
        let root = to_utf8(dir.path().to_path_buf()).unwrap();
        std::fs::write(meta_file_path(&root), "{ not json").unwrap();
        let err = SidecarMetaStore.load(&root).unwrap_err();
        assert_eq!(err.kind(), crate::StorageErrorKind::Corrupt);
    }
}
