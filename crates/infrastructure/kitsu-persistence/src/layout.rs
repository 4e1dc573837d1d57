use camino::{Utf8Path, Utf8PathBuf};
use kitsu_core::{
    is_skipped_name, DirectoryMeta, EntryId, EntryType, SITE_DIRNAME, TRASH_DIRNAME,
};
use walkdir::WalkDir;

use crate::io::to_utf8;
use crate::StorageError;

/// Directory structure of a mirror:
///
/// ```text
/// <root>/<entry_type>/<show>/{.kitsuinfo.json,.kitsuignore,extra/,files...}
/// ```
///
/// Show directories sitting directly under the root ("loose") are left over
/// from older layouts or created by hand; the sanitizer relocates them.
#[derive(Debug, Clone)]
pub struct MirrorLayout {
    root: Utf8PathBuf,
}

impl MirrorLayout {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn ensure_exists(&self) -> Result<(), StorageError> {
        if self.root.is_dir() {
            Ok(())
        } else {
            Err(StorageError::DestinationNotFound(self.root.clone()))
        }
    }

    pub fn type_dir(&self, entry_type: EntryType) -> Utf8PathBuf {
        self.root.join(entry_type.as_str())
    }

    pub fn canonical_dir(&self, meta: &dyn DirectoryMeta) -> Utf8PathBuf {
        self.type_dir(meta.entry_type()).join(meta.fs_name())
    }

    /// Home of an entry whose canonical directory belongs to another id.
    pub fn disambiguated_dir(&self, meta: &dyn DirectoryMeta, id: EntryId) -> Utf8PathBuf {
        self.type_dir(meta.entry_type())
            .join(format!("{} [{id}]", meta.fs_name()))
    }

    pub fn is_type_dir_name(name: &str) -> bool {
        EntryType::ALL.iter().any(|t| t.as_str() == name)
    }

    pub fn site_dir(&self) -> Utf8PathBuf {
        self.root.join(SITE_DIRNAME)
    }

    /// Every show directory inside the type subtrees.
    pub fn show_dirs(&self) -> Result<Vec<Utf8PathBuf>, StorageError> {
        let mut dirs = Vec::new();
        for entry_type in EntryType::ALL {
            let type_dir = self.type_dir(entry_type);
            if type_dir.is_dir() {
                dirs.extend(child_dirs(&type_dir)?);
            }
        }
        Ok(dirs)
    }

    /// Show directories placed directly under the root.
    pub fn loose_dirs(&self) -> Result<Vec<Utf8PathBuf>, StorageError> {
        Ok(child_dirs(&self.root)?
            .into_iter()
            .filter(|d| !d.file_name().is_some_and(Self::is_type_dir_name))
            .collect())
    }

    pub fn all_show_dirs(&self) -> Result<Vec<Utf8PathBuf>, StorageError> {
        let mut dirs = self.show_dirs()?;
        dirs.extend(self.loose_dirs()?);
        Ok(dirs)
    }

    pub fn trash_dir(dir: &Utf8Path) -> Utf8PathBuf {
        dir.join(TRASH_DIRNAME)
    }

    /// Regular files directly inside `dir`, sidecars excluded.
    pub fn top_level_files(dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>, StorageError> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let path = to_utf8(entry.path())?;
            if path.file_name().is_some_and(|n| !is_skipped_name(n)) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// All content files below `dir`, sidecars excluded; the trash
    /// sub-directory only when `include_trash` is set.
    pub fn content_files(
        dir: &Utf8Path,
        include_trash: bool,
    ) -> Result<Vec<Utf8PathBuf>, StorageError> {
        let walker = WalkDir::new(dir)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                let name = e.file_name().to_string_lossy();
                if is_skipped_name(&name) {
                    return false;
                }
                include_trash || !(e.depth() == 1 && e.file_type().is_dir() && name == TRASH_DIRNAME)
            });

        let mut files = Vec::new();
        for entry in walker {
            let entry = entry.map_err(|e| {
                StorageError::Io(
                    e.into_io_error()
                        .unwrap_or_else(|| std::io::Error::other("filesystem loop")),
                )
            })?;
            if entry.file_type().is_file() {
                files.push(to_utf8(entry.into_path())?);
            }
        }
        Ok(files)
    }
}

fn child_dirs(parent: &Utf8Path) -> Result<Vec<Utf8PathBuf>, StorageError> {
    let mut dirs = Vec::new();
    for entry in std::fs::read_dir(parent)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let path = to_utf8(entry.path())?;
        let Some(name) = path.file_name() else {
            continue;
        };
        if name.starts_with('.') || is_skipped_name(name) {
            continue;
        }
        dirs.push(path);
    }
    dirs.sort();
    Ok(dirs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use kitsu_core::{RemoteDirectoryEntry, INFO_FILENAME};
    use tempfile::tempdir;

    fn mirror() -> (tempfile::TempDir, MirrorLayout) {
        let dir = tempdir().unwrap();
        let root = to_utf8(dir.path().to_path_buf()).unwrap();
        (dir, MirrorLayout::new(root))
    }

    #[test]
    fn canonical_dir_uses_type_subtree_and_safe_name() {
        let (_tmp, layout) = mirror();
        let entry = RemoteDirectoryEntry::new("Fate/Zero", EntryType::AnimeTv, Utc::now());
        assert_eq!(
            layout.canonical_dir(&entry),
            layout.root().join("anime_tv").join("Fate／Zero")
        );
        assert_eq!(
            layout.disambiguated_dir(&entry, 42),
            layout.root().join("anime_tv").join("Fate／Zero [42]")
        );
    }

    #[test]
    fn show_dirs_and_loose_dirs_are_separated() {
        let (_tmp, layout) = mirror();
        std::fs::create_dir_all(layout.root().join("anime_tv/A")).unwrap();
        std::fs::create_dir_all(layout.root().join("unsorted/B")).unwrap();
        std::fs::create_dir_all(layout.root().join("Loose Show")).unwrap();
        std::fs::create_dir_all(layout.root().join(".git")).unwrap();
        std::fs::create_dir_all(layout.root().join(SITE_DIRNAME)).unwrap();

        let shows = layout.show_dirs().unwrap();
        assert_eq!(shows.len(), 2);
        let loose = layout.loose_dirs().unwrap();
        assert_eq!(loose, vec![layout.root().join("Loose Show")]);
    }

    #[test]
    fn content_files_skip_sidecars_and_optionally_trash() {
        let (_tmp, layout) = mirror();
        let show = layout.root().join("anime_tv/A");
        std::fs::create_dir_all(show.join(TRASH_DIRNAME)).unwrap();
        std::fs::write(show.join("01.srt"), "x").unwrap();
        std::fs::write(show.join(INFO_FILENAME), "{}").unwrap();
        std::fs::write(show.join(TRASH_DIRNAME).join("old.srt"), "x").unwrap();

        let visible = MirrorLayout::content_files(&show, false).unwrap();
        assert_eq!(visible, vec![show.join("01.srt")]);
        assert_eq!(MirrorLayout::content_files(&show, true).unwrap().len(), 2);
        assert_eq!(
            MirrorLayout::top_level_files(&show).unwrap(),
            vec![show.join("01.srt")]
        );
    }

    #[test]
    fn missing_destination_is_reported() {
        let layout = MirrorLayout::new("/definitely/not/here");
        assert!(matches!(
            layout.ensure_exists(),
            Err(StorageError::DestinationNotFound(_))
        ));
    }
}
