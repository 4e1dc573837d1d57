use camino::{Utf8Path, Utf8PathBuf};
use kitsu_persistence::{IgnoreLedger, MirrorLayout, StorageError};
use std::io::Read;
use tracing::{debug, info};

use crate::sanitize::SanitizeError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub moved: usize,
    /// Files already present at the destination with the same content.
    pub deduplicated: usize,
}

fn same_content(a: &Utf8Path, b: &Utf8Path) -> Result<bool, StorageError> {
    let (meta_a, meta_b) = (std::fs::metadata(a)?, std::fs::metadata(b)?);
    if meta_a.len() != meta_b.len() {
        return Ok(false);
    }
    let (mut fa, mut fb) = (std::fs::File::open(a)?, std::fs::File::open(b)?);
    let mut buf_a = [0u8; 8192];
    let mut buf_b = [0u8; 8192];
    loop {
        let n = fa.read(&mut buf_a)?;
        if n == 0 {
            return Ok(true);
        }
        fb.read_exact(&mut buf_b[..n])?;
        if buf_a[..n] != buf_b[..n] {
            return Ok(false);
        }
    }
}

/// Move a directory to a path that does not exist yet.
pub fn move_dir(source: &Utf8Path, destination: &Utf8Path) -> Result<(), StorageError> {
    if let Some(parent) = destination.parent() {
        std::fs::create_dir_all(parent).map_err(StorageError::from)?;
    }
    std::fs::rename(source, destination)?;
    info!("moved: {source} -> {destination}");
    Ok(())
}

/// Fold `source` into `destination` and remove `source`.
///
/// Nothing is touched if any file would replace different content at the
/// destination. Ledgers are unioned; the destination sidecar is kept.
pub fn merge_dir_into(
    source: &Utf8Path,
    destination: &Utf8Path,
) -> Result<MergeOutcome, SanitizeError> {
    if source == destination {
        return Ok(MergeOutcome::default());
    }
    if !destination.exists() {
        let moved = MirrorLayout::content_files(source, true)?.len();
        move_dir(source, destination)?;
        return Ok(MergeOutcome {
            moved,
            deduplicated: 0,
        });
    }

    let mut plan: Vec<(Utf8PathBuf, Utf8PathBuf, bool)> = Vec::new();
    for file in MirrorLayout::content_files(source, true)? {
        let Ok(relative) = file.strip_prefix(source) else {
            continue;
        };
        let target = destination.join(relative);
        let exists = target.exists();
        if exists && !same_content(&file, &target)? {
            return Err(SanitizeError::MergeConflict {
                incoming: file,
                destination: target,
            });
        }
        plan.push((file, target, exists));
    }

    let incoming = IgnoreLedger::open_or_empty(source);
    if !incoming.is_empty() {
        let mut ledger = IgnoreLedger::open_or_empty(destination);
        let changed = ledger.extend_from(&incoming);
        ledger.commit()?;
        debug!("merged {changed} ledger entries into {destination}");
    }

    let mut outcome = MergeOutcome::default();
    for (file, target, exists) in plan {
        if exists {
            std::fs::remove_file(&file).map_err(StorageError::from)?;
            outcome.deduplicated += 1;
            continue;
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(StorageError::from)?;
        }
        std::fs::rename(&file, &target).map_err(StorageError::from)?;
        outcome.moved += 1;
    }
    std::fs::remove_dir_all(source).map_err(StorageError::from)?;
    info!("merged: {source} -> {destination}");
    Ok(outcome)
}
