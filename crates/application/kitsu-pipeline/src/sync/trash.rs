use camino::{Utf8Path, Utf8PathBuf};
use kitsu_persistence::{MirrorLayout, StorageError};
use std::collections::HashSet;
use tracing::info;

/// A free name inside `dir`: `name`, else `stem (1).ext`, `stem (2).ext`, ...
pub fn unique_target(dir: &Utf8Path, name: &str) -> Utf8PathBuf {
    let first = dir.join(name);
    if !first.exists() {
        return first;
    }
    let as_path = Utf8Path::new(name);
    let stem = as_path.file_stem().unwrap_or(name);
    let ext = as_path.extension();
    (1..)
        .map(|n| match ext {
            Some(ext) => dir.join(format!("{stem} ({n}).{ext}")),
            None => dir.join(format!("{stem} ({n})")),
        })
        .find(|candidate| !candidate.exists())
        .unwrap_or(first)
}

/// Move top-level files the remote no longer lists into the trash
/// sub-directory. Returns how many files were moved.
pub fn move_unlisted_to_trash(
    dir: &Utf8Path,
    remote_names: &HashSet<&str>,
) -> Result<usize, StorageError> {
    if !dir.is_dir() {
        return Ok(0);
    }
    let trash = MirrorLayout::trash_dir(dir);
    let mut moved = 0;
    for file in MirrorLayout::top_level_files(dir)? {
        let Some(name) = file.file_name() else {
            continue;
        };
        if remote_names.contains(name) {
            continue;
        }
        std::fs::create_dir_all(&trash)?;
        let target = unique_target(&trash, name);
        std::fs::rename(&file, &target)?;
        info!("moved to trash: {file}");
        moved += 1;
    }
    Ok(moved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kitsu_core::{IGNORE_FILENAME, INFO_FILENAME, TRASH_DIRNAME};
    use tempfile::tempdir;

    #[test]
    fn unlisted_files_move_and_sidecars_stay() {
        let tmp = tempdir().unwrap();
        let dir = Utf8Path::from_path(tmp.path()).unwrap();
        for name in ["keep.srt", "old.srt", INFO_FILENAME, IGNORE_FILENAME] {
            std::fs::write(dir.join(name), "x").unwrap();
        }
        std::fs::create_dir_all(dir.join(TRASH_DIRNAME)).unwrap();
        std::fs::write(dir.join(TRASH_DIRNAME).join("old.srt"), "older").unwrap();

        let listed = HashSet::from(["keep.srt"]);
        assert_eq!(move_unlisted_to_trash(dir, &listed).unwrap(), 1);

        assert!(dir.join("keep.srt").is_file());
        assert!(dir.join(INFO_FILENAME).is_file());
        assert!(dir.join(IGNORE_FILENAME).is_file());
        assert!(!dir.join("old.srt").exists());
        assert_eq!(
            std::fs::read_to_string(dir.join(TRASH_DIRNAME).join("old.srt")).unwrap(),
            "older"
        );
        assert!(dir.join(TRASH_DIRNAME).join("old (1).srt").is_file());
    }
}
