use camino::{Utf8Path, Utf8PathBuf};
use kitsu_persistence::{IgnoreLedger, IgnorePatterns, MirrorLayout, StorageError};
use std::collections::BTreeMap;
use tracing::info;

/// Ledger the given files in their own directories. Returns how many rows
/// changed.
pub fn add_paths(paths: &[Utf8PathBuf]) -> Result<usize, StorageError> {
    let mut by_dir: BTreeMap<&Utf8Path, Vec<&Utf8Path>> = BTreeMap::new();
    for path in paths {
        if !path.is_file() {
            return Err(StorageError::InvalidPath(format!("not a file: {path}")));
        }
        let dir = path
            .parent()
            .ok_or_else(|| StorageError::InvalidPath(path.to_string()))?;
        by_dir.entry(dir).or_default().push(path);
    }

    let mut changed = 0;
    for (dir, files) in by_dir {
        let mut ledger = IgnoreLedger::open(dir)?;
        for file in files {
            if ledger.add_file(file)? {
                info!("ignored: {file}");
                changed += 1;
            }
        }
        ledger.commit()?;
    }
    Ok(changed)
}

/// Append a glob to the root pattern list.
pub fn add_pattern(root: &Utf8Path, pattern: &str) -> Result<bool, StorageError> {
    let mut patterns = IgnorePatterns::load(root)?;
    let added = patterns.add(pattern)?;
    if added {
        info!("added pattern {pattern:?} to {}", patterns.file_path());
    }
    Ok(added)
}

/// Ledger every file present in every show directory.
pub fn add_all(layout: &MirrorLayout) -> Result<usize, StorageError> {
    layout.ensure_exists()?;
    let mut changed = 0;
    for dir in layout.all_show_dirs()? {
        let mut ledger = IgnoreLedger::open_or_empty(&dir);
        for file in MirrorLayout::top_level_files(&dir)? {
            if ledger.add_file(&file)? {
                changed += 1;
            }
        }
        ledger.commit()?;
    }
    Ok(changed)
}
