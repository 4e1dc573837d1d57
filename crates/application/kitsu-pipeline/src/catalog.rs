//! `_site/catalog.json`: a flat index of the mirror for downstream renderers.

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use kitsu_core::time::{epoch, rfc3339_z};
use kitsu_core::{EntryType, RemoteDirectoryEntry};
use kitsu_persistence::{write_atomic, DirectoryMetaStore, MirrorLayout, StorageError};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("failed to start worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogFile {
    pub name: String,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogEntry {
    pub name: String,
    pub entry_type: EntryType,
    #[serde(with = "rfc3339_z")]
    pub last_modified: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub english_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub japanese_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anilist_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tmdb_id: Option<String>,
    /// Relative to the mirror root, `/`-separated.
    pub path: String,
    pub files: Vec<CatalogFile>,
}

/// One worker less than there are cores, but at least one.
pub fn worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().saturating_sub(1))
        .unwrap_or(1)
        .max(1)
}

fn describe_dir(
    root: &Utf8Path,
    dir: &Utf8Path,
    store: &dyn DirectoryMetaStore,
) -> Result<CatalogEntry, StorageError> {
    let known = store.load(dir).unwrap_or_else(|e| {
        warn!("{e}");
        None
    });
    let entry = match known {
        Some(meta) => meta.entry,
        None => RemoteDirectoryEntry::new(
            dir.file_name().unwrap_or_default(),
            EntryType::Unsorted,
            epoch(),
        ),
    };

    let mut files = Vec::new();
    for file in MirrorLayout::content_files(dir, true)? {
        let size = std::fs::metadata(&file)?.len();
        let name = file.strip_prefix(dir).unwrap_or(&file).as_str().replace('\\', "/");
        files.push(CatalogFile { name, size });
    }

    Ok(CatalogEntry {
        name: entry.name,
        entry_type: entry.entry_type,
        last_modified: entry.last_modified,
        english_name: entry.english_name,
        japanese_name: entry.japanese_name,
        anilist_id: entry.anilist_id,
        tmdb_id: entry.tmdb_id,
        path: dir.strip_prefix(root).unwrap_or(dir).as_str().replace('\\', "/"),
        files,
    })
}

/// Describe every show directory, sorted by type and then name.
pub fn collect_catalog(
    layout: &MirrorLayout,
    store: &dyn DirectoryMetaStore,
    threads: usize,
) -> Result<Vec<CatalogEntry>, CatalogError> {
    let dirs = layout.all_show_dirs()?;
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads.max(1))
        .build()?;
    let root = layout.root();

    let mut entries = pool.install(|| {
        dirs.par_iter()
            .map(|dir| describe_dir(root, dir, store))
            .collect::<Result<Vec<_>, StorageError>>()
    })?;
    entries.sort_by(|a, b| {
        a.entry_type
            .cmp(&b.entry_type)
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| a.path.cmp(&b.path))
    });
    Ok(entries)
}

/// Write `_site/catalog.json` and return its path.
pub fn build_catalog(
    layout: &MirrorLayout,
    store: &dyn DirectoryMetaStore,
) -> Result<Utf8PathBuf, CatalogError> {
    layout.ensure_exists()?;
    let entries = collect_catalog(layout, store, worker_count())?;
    let target = layout.site_dir().join("catalog.json");
    let data = serde_json::to_vec_pretty(&entries).map_err(StorageError::from)?;
    write_atomic(&target, &data)?;
    info!("wrote {} entries to {target}", entries.len());
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use kitsu_persistence::{to_utf8, SidecarMetaStore};
    use tempfile::tempdir;

    #[test]
    fn catalog_lists_shows_by_type_then_name() {
        let tmp = tempdir().unwrap();
        let root = to_utf8(tmp.path().to_path_buf()).unwrap();
        let layout = MirrorLayout::new(root.clone());
        let store = SidecarMetaStore::new();

        for (name, entry_type) in [
            ("Zeta", EntryType::AnimeTv),
            ("Alpha", EntryType::AnimeTv),
            ("Drama", EntryType::DramaTv),
        ] {
            let entry = RemoteDirectoryEntry::new(
                name,
                entry_type,
                Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            );
            let dir = layout.canonical_dir(&entry);
            store.save(&dir, &entry).unwrap();
            std::fs::write(dir.join(format!("{name} - 01.srt")), "subs").unwrap();
        }
        std::fs::create_dir_all(root.join("Loose")).unwrap();

        let entries = collect_catalog(&layout, &store, 2).unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["Alpha", "Zeta", "Drama", "Loose"]);
        assert_eq!(entries[0].path, "anime_tv/Alpha");
        assert_eq!(
            entries[0].files,
            vec![CatalogFile {
                name: "Alpha - 01.srt".into(),
                size: 4
            }]
        );
        assert!(entries[3].files.is_empty());

        let written = build_catalog(&layout, &store).unwrap();
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(written).unwrap()).unwrap();
        assert_eq!(json[0]["last_modified"], "2024-01-01T00:00:00Z");
        assert!(json[0].get("english_name").is_none());
    }
}
