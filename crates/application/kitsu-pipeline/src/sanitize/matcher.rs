use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use kitsu_core::time::epoch;
use kitsu_core::{
    lookup_keys, name_strip_insignificant_chars, EntryId, EntryType, LocalDirectoryMeta,
    RemoteDirectoryEntry,
};
use kitsu_persistence::{DirectoryMetaStore, MirrorLayout, StorageError};
use std::collections::HashMap;
use tracing::{debug, warn};

/// A show directory on disk, with its sidecar if it has one.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalDir {
    pub path: Utf8PathBuf,
    pub meta: Option<LocalDirectoryMeta>,
}

impl LocalDir {
    pub fn name(&self) -> &str {
        self.path.file_name().unwrap_or_default()
    }

    pub fn entry_id(&self) -> Option<EntryId> {
        self.meta.as_ref().and_then(LocalDirectoryMeta::entry_id)
    }

    /// Directories with metadata first, then the most recently modified.
    fn rank(&self) -> (bool, DateTime<Utc>) {
        match &self.meta {
            Some(meta) => (true, meta.entry.last_modified),
            None => (false, epoch()),
        }
    }

    fn keys(&self) -> Vec<String> {
        match &self.meta {
            Some(meta) => lookup_keys(meta, self.name()),
            None => {
                let placeholder = RemoteDirectoryEntry::new(self.name(), EntryType::Unsorted, epoch());
                lookup_keys(&placeholder, self.name())
            }
        }
    }
}

/// Index of local show directories by remote id and by loose name keys.
#[derive(Debug, Default)]
pub struct DirPathMatcher {
    dirs: Vec<LocalDir>,
    by_key: HashMap<String, Vec<usize>>,
    by_id: HashMap<EntryId, Vec<usize>>,
    by_path: HashMap<Utf8PathBuf, usize>,
}

impl DirPathMatcher {
    pub fn scan(layout: &MirrorLayout, store: &dyn DirectoryMetaStore) -> Result<Self, StorageError> {
        debug!("building lookup dict to match directories...");
        let mut dirs = Vec::new();
        for path in layout.all_show_dirs()? {
            let meta = match store.load(&path) {
                Ok(meta) => meta,
                Err(e) => {
                    warn!("{e}; treating {path} as a directory without metadata");
                    None
                }
            };
            dirs.push(LocalDir { path, meta });
        }
        Ok(Self::from_dirs(dirs))
    }

    pub fn from_dirs(dirs: Vec<LocalDir>) -> Self {
        let mut matcher = Self::default();
        for dir in dirs {
            matcher.insert(dir);
        }
        matcher
    }

    pub fn insert(&mut self, dir: LocalDir) {
        let idx = self.dirs.len();
        for key in dir.keys() {
            self.by_key.entry(key).or_default().push(idx);
        }
        if let Some(id) = dir.entry_id() {
            self.by_id.entry(id).or_default().push(idx);
        }
        self.by_path.insert(dir.path.clone(), idx);
        self.dirs.push(dir);
    }

    pub fn dirs(&self) -> &[LocalDir] {
        &self.dirs
    }

    fn best(&self, indices: &[usize], known_only: bool) -> Option<&LocalDir> {
        indices
            .iter()
            .map(|i| &self.dirs[*i])
            .filter(|dir| !known_only || dir.meta.is_some())
            .max_by_key(|dir| dir.rank())
    }

    fn find(&self, name: &str, known_only: bool) -> Option<&LocalDir> {
        [name.to_lowercase(), name_strip_insignificant_chars(name)]
            .iter()
            .filter(|k| !k.is_empty())
            .find_map(|key| self.by_key.get(key).and_then(|idx| self.best(idx, known_only)))
    }

    /// Id recorded in the sidecar of the directory at `path`.
    pub fn entry_id_at(&self, path: &Utf8Path) -> Option<EntryId> {
        self.by_path
            .get(path)
            .and_then(|idx| self.dirs[*idx].entry_id())
    }

    pub fn find_by_id(&self, id: EntryId) -> Option<&LocalDir> {
        self.by_id.get(&id).and_then(|idx| self.best(idx, true))
    }

    /// Most recently modified directory whose keys contain `name`, trying
    /// the lowercased name first and then the loose form.
    pub fn find_best_matching_entry(&self, name: &str) -> Option<&LocalDir> {
        self.find(name, false)
    }

    /// Like `find_best_matching_entry`, restricted to directories with metadata.
    pub fn find_known_entry(&self, name: &str) -> Option<&LocalDir> {
        self.find(name, true)
    }

    /// Where an incoming remote entry already lives locally, if anywhere.
    ///
    /// A name match is rejected when the candidate belongs to a different id.
    pub fn resolve(&self, entry: &RemoteDirectoryEntry) -> Option<&LocalDir> {
        if let Some(id) = entry.entry_id {
            if let Some(dir) = self.find_by_id(id) {
                return Some(dir);
            }
        }
        let candidate = self.find_best_matching_entry(&entry.name)?;
        match (entry.entry_id, candidate.entry_id()) {
            (Some(want), Some(have)) if want != have => None,
            _ => Some(candidate),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn with_meta(path: &str, id: Option<EntryId>, name: &str, year: i32) -> LocalDir {
        let entry = RemoteDirectoryEntry {
            entry_id: id,
            ..RemoteDirectoryEntry::new(
                name,
                EntryType::AnimeTv,
                Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0).unwrap(),
            )
        };
        LocalDir {
            path: path.into(),
            meta: Some(LocalDirectoryMeta {
                entry,
                dir_path: path.into(),
            }),
        }
    }

    fn bare(path: &str) -> LocalDir {
        LocalDir {
            path: path.into(),
            meta: None,
        }
    }

    #[test]
    fn ids_are_looked_up_by_path() {
        let matcher = DirPathMatcher::from_dirs(vec![
            with_meta("m/anime_tv/Kanon", Some(1), "Kanon", 2024),
            bare("m/anime_tv/Air"),
        ]);
        assert_eq!(matcher.entry_id_at(Utf8Path::new("m/anime_tv/Kanon")), Some(1));
        assert_eq!(matcher.entry_id_at(Utf8Path::new("m/anime_tv/Air")), None);
        assert_eq!(matcher.entry_id_at(Utf8Path::new("m/anime_tv/Clannad")), None);
    }

    #[test]
    fn loose_names_find_the_directory() {
        let matcher = DirPathMatcher::from_dirs(vec![
            with_meta("m/anime_tv/Yu-Gi-Oh! ARC-V", Some(1), "Yu-Gi-Oh! ARC-V", 2024),
            bare("m/Something Else"),
        ]);
        let hit = matcher.find_best_matching_entry("Yu☆Gi☆Oh! ARC-V").unwrap();
        assert_eq!(hit.entry_id(), Some(1));
        assert!(matcher.find_best_matching_entry("Unknown Show").is_none());
    }

    #[test]
    fn known_lookup_skips_the_orphan_itself() {
        let mut frieren = with_meta("m/anime_tv/Frieren", Some(2), "Frieren", 2024);
        if let Some(meta) = frieren.meta.as_mut() {
            meta.entry.english_name = Some("Frieren: Beyond Journey's End".into());
        }
        let matcher = DirPathMatcher::from_dirs(vec![
            bare("m/Frieren Beyond Journeys End"),
            frieren,
        ]);
        let orphan = "Frieren Beyond Journeys End";
        assert!(matcher.find_best_matching_entry(orphan).unwrap().meta.is_none());
        assert_eq!(matcher.find_known_entry(orphan).unwrap().entry_id(), Some(2));
    }

    #[test]
    fn metadata_beats_bare_directories() {
        let matcher = DirPathMatcher::from_dirs(vec![
            bare("m/Show"),
            with_meta("m/anime_tv/Show", Some(3), "Show", 2020),
        ]);
        let hit = matcher.find_best_matching_entry("show").unwrap();
        assert_eq!(hit.path, Utf8PathBuf::from("m/anime_tv/Show"));
    }

    #[test]
    fn resolve_prefers_id_and_rejects_foreign_ids() {
        let matcher = DirPathMatcher::from_dirs(vec![
            with_meta("m/anime_tv/Renamed", Some(7), "Renamed", 2024),
            with_meta("m/anime_tv/Show", Some(8), "Show", 2024),
        ]);
        let entry = RemoteDirectoryEntry {
            entry_id: Some(7),
            ..RemoteDirectoryEntry::new("Show", EntryType::AnimeTv, Utc::now())
        };
        assert_eq!(matcher.resolve(&entry).unwrap().name(), "Renamed");

        let stranger = RemoteDirectoryEntry {
            entry_id: Some(99),
            ..RemoteDirectoryEntry::new("Show", EntryType::AnimeTv, Utc::now())
        };
        assert!(matcher.resolve(&stranger).is_none());
    }
}
