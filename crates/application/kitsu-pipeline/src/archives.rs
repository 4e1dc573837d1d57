use camino::Utf8PathBuf;
use kitsu_core::{has_extension, ARCHIVE_FILE_TYPES, SUBTITLE_FILE_TYPES};
use kitsu_infra::archive::{extract_archive, ArchiveError};
use kitsu_persistence::{MirrorLayout, StorageError};
use tracing::{info, warn};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExtractReport {
    pub archives: usize,
    pub extracted: usize,
    pub unsupported: usize,
    pub failed: Vec<Utf8PathBuf>,
}

/// Every archive below the show directories, trash included.
pub fn find_archives(layout: &MirrorLayout) -> Result<Vec<Utf8PathBuf>, StorageError> {
    let mut archives = Vec::new();
    for dir in layout.all_show_dirs()? {
        archives.extend(
            MirrorLayout::content_files(&dir, true)?
                .into_iter()
                .filter(|f| f.file_name().is_some_and(|n| has_extension(n, ARCHIVE_FILE_TYPES))),
        );
    }
    Ok(archives)
}

/// Unpack subtitle files out of every archive in the mirror.
pub fn extract_all(layout: &MirrorLayout) -> Result<ExtractReport, StorageError> {
    layout.ensure_exists()?;
    let mut report = ExtractReport::default();
    for archive in find_archives(layout)? {
        info!("found archive: {archive}");
        report.archives += 1;
        match extract_archive(&archive, SUBTITLE_FILE_TYPES) {
            Ok(written) => {
                for file in &written {
                    info!("extracted: {}", file.file_name().unwrap_or_default());
                }
                report.extracted += written.len();
            }
            Err(e @ ArchiveError::Unsupported(_)) => {
                warn!("{e}");
                report.unsupported += 1;
            }
            Err(e) => {
                warn!("{archive}: {e}");
                report.failed.push(archive);
            }
        }
    }
    Ok(report)
}
