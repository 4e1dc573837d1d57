//! Offline clean-up of a mirror: names, duplicates, orphans and layout.

use camino::{Utf8Path, Utf8PathBuf};
use kitsu_core::{fs_name_strip, EntryType, LocalDirectoryMeta};
use kitsu_persistence::{DirectoryMetaStore, MirrorLayout, SidecarMetaStore, StorageError};
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn};

pub mod duplicates;
pub mod matcher;
pub mod merge;

pub use duplicates::{find_duplicates, DuplicatesGroup};
pub use matcher::{DirPathMatcher, LocalDir};
pub use merge::{merge_dir_into, MergeOutcome};

#[derive(Debug, thiserror::Error)]
pub enum SanitizeError {
    #[error("refusing to replace {destination} with different content from {incoming}")]
    MergeConflict {
        incoming: Utf8PathBuf,
        destination: Utf8PathBuf,
    },
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SanitizeOptions {
    /// Remove show directories without any content files.
    pub remove_empty: bool,
    /// Delete every trash sub-directory.
    pub remove_trash: bool,
}

#[derive(Debug, Default)]
pub struct SanitizeReport {
    pub renamed: usize,
    pub duplicates_merged: usize,
    pub orphans_merged: usize,
    pub relocated: usize,
    pub empty_removed: usize,
    pub trash_removed: usize,
    /// Directories left as they were because a step failed for them.
    pub failures: Vec<(Utf8PathBuf, String)>,
}

impl SanitizeReport {
    fn fail(&mut self, dir: &Utf8Path, err: SanitizeError) {
        error!("{dir}: {err}");
        self.failures.push((dir.to_path_buf(), err.to_string()));
    }
}

impl fmt::Display for SanitizeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "renamed {}, merged {} duplicates and {} orphans, relocated {}, removed {} empty and {} trash directories. {} failed.",
            self.renamed,
            self.duplicates_merged,
            self.orphans_merged,
            self.relocated,
            self.empty_removed,
            self.trash_removed,
            self.failures.len()
        )
    }
}

pub struct Sanitizer {
    layout: MirrorLayout,
    store: Arc<dyn DirectoryMetaStore>,
}

impl Sanitizer {
    pub fn new(destination: impl Into<Utf8PathBuf>) -> Self {
        Self::with_store(MirrorLayout::new(destination), Arc::new(SidecarMetaStore::new()))
    }

    pub fn with_store(layout: MirrorLayout, store: Arc<dyn DirectoryMetaStore>) -> Self {
        Self { layout, store }
    }

    /// Run every step in order. Only listing the mirror itself is fatal;
    /// failures inside one directory are logged and reported.
    pub fn run(&self, opts: SanitizeOptions) -> Result<SanitizeReport, SanitizeError> {
        self.layout.ensure_exists()?;
        let mut report = SanitizeReport::default();
        self.fix_names(&mut report)?;
        self.merge_duplicates(&mut report)?;
        self.merge_orphans(&mut report)?;
        self.relocate(&mut report)?;
        if opts.remove_trash {
            self.remove_trash(&mut report)?;
        }
        if opts.remove_empty {
            self.remove_empty(&mut report)?;
        }
        Ok(report)
    }

    fn load_metas(&self) -> Result<Vec<LocalDirectoryMeta>, StorageError> {
        let mut metas = Vec::new();
        for dir in self.layout.all_show_dirs()? {
            match self.store.load(&dir) {
                Ok(Some(meta)) => metas.push(meta),
                Ok(None) => {}
                Err(e) => warn!("{e}"),
            }
        }
        Ok(metas)
    }

    fn fix_names(&self, report: &mut SanitizeReport) -> Result<(), StorageError> {
        for dir in self.layout.all_show_dirs()? {
            let Some(name) = dir.file_name() else {
                continue;
            };
            let fixed = fs_name_strip(name);
            if fixed == name || fixed.is_empty() {
                continue;
            }
            let target = dir.with_file_name(&fixed);
            match merge_dir_into(&dir, &target) {
                Ok(_) => report.renamed += 1,
                Err(e) => report.fail(&dir, e),
            }
        }
        Ok(())
    }

    fn merge_duplicates(&self, report: &mut SanitizeReport) -> Result<(), StorageError> {
        for group in find_duplicates(self.load_metas()?) {
            let mut entry = group.original.entry.clone();
            let destination = &group.original.dir_path;
            for copy in &group.copies {
                info!(
                    "duplicate of '{}': {}",
                    group.original.dir_name(),
                    copy.dir_path
                );
                match merge_dir_into(&copy.dir_path, destination) {
                    Ok(_) => {
                        entry = entry.merged_with(Some(&copy.entry));
                        report.duplicates_merged += 1;
                    }
                    Err(e) => report.fail(&copy.dir_path, e),
                }
            }
            if let Err(e) = self.store.save(destination, &entry) {
                report.fail(destination, e.into());
            }
        }
        Ok(())
    }

    fn merge_orphans(&self, report: &mut SanitizeReport) -> Result<(), StorageError> {
        let matcher = DirPathMatcher::scan(&self.layout, self.store.as_ref())?;
        let moves: Vec<(Utf8PathBuf, Utf8PathBuf)> = matcher
            .dirs()
            .iter()
            .filter(|dir| dir.meta.is_none())
            .filter_map(|orphan| {
                let best = matcher.find_known_entry(orphan.name())?;
                (best.path != orphan.path).then(|| (orphan.path.clone(), best.path.clone()))
            })
            .collect();

        for (orphan, target) in moves {
            info!("matched orphan {orphan} with {target}");
            match merge_dir_into(&orphan, &target) {
                Ok(_) => report.orphans_merged += 1,
                Err(e) => report.fail(&orphan, e),
            }
        }
        Ok(())
    }

    /// Canonical directory of `meta`, unless another id already lives there.
    fn home_of(&self, meta: &LocalDirectoryMeta) -> Utf8PathBuf {
        let canonical = self.layout.canonical_dir(meta);
        let Some(id) = meta.entry_id() else {
            return canonical;
        };
        match self.store.load(&canonical) {
            Ok(Some(there)) if there.entry_id().is_some_and(|other| other != id) => {
                self.layout.disambiguated_dir(meta, id)
            }
            _ => canonical,
        }
    }

    fn relocate(&self, report: &mut SanitizeReport) -> Result<(), StorageError> {
        let unsorted = self.layout.type_dir(EntryType::Unsorted);
        for dir in self.layout.all_show_dirs()? {
            let target = match self.store.load(&dir) {
                Ok(Some(meta)) => self.home_of(&meta),
                Ok(None) => match dir.file_name() {
                    Some(name) if dir.parent() != Some(unsorted.as_path()) => unsorted.join(name),
                    _ => continue,
                },
                Err(e) => {
                    warn!("{e}");
                    continue;
                }
            };
            if target == dir {
                continue;
            }
            match merge_dir_into(&dir, &target) {
                Ok(_) => report.relocated += 1,
                Err(e) => report.fail(&dir, e),
            }
        }
        Ok(())
    }

    fn remove_trash(&self, report: &mut SanitizeReport) -> Result<(), StorageError> {
        for dir in self.layout.all_show_dirs()? {
            let trash = MirrorLayout::trash_dir(&dir);
            if !trash.is_dir() {
                continue;
            }
            match std::fs::remove_dir_all(&trash) {
                Ok(()) => {
                    info!("removed trash: {trash}");
                    report.trash_removed += 1;
                }
                Err(e) => report.fail(&trash, StorageError::from(e).into()),
            }
        }
        Ok(())
    }

    fn remove_empty(&self, report: &mut SanitizeReport) -> Result<(), StorageError> {
        for dir in self.layout.all_show_dirs()? {
            let empty = match MirrorLayout::content_files(&dir, true) {
                Ok(files) => files.is_empty(),
                Err(e) => {
                    report.fail(&dir, e.into());
                    continue;
                }
            };
            if !empty {
                continue;
            }
            match std::fs::remove_dir_all(&dir) {
                Ok(()) => {
                    info!("removed empty directory: {dir}");
                    report.empty_removed += 1;
                }
                Err(e) => report.fail(&dir, StorageError::from(e).into()),
            }
        }
        Ok(())
    }
}
