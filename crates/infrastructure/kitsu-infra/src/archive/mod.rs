use camino::{Utf8Path, Utf8PathBuf};
use kitsu_core::{fs_name_strip, has_extension};
use std::fs::File;
use std::io::BufWriter;

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("unsupported file type: {0}")]
    Unsupported(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

/// Directory an archive is unpacked into: next to it, named after its stem.
pub fn extraction_dir(archive: &Utf8Path) -> Utf8PathBuf {
    let stem = archive.file_stem().unwrap_or("archive");
    archive.with_file_name(fs_name_strip(stem))
}

/// Unpack an archive next to itself. Only zip files are supported.
pub fn extract_archive(
    archive: &Utf8Path,
    wanted: &[&str],
) -> Result<Vec<Utf8PathBuf>, ArchiveError> {
    match archive.extension().map(str::to_lowercase).as_deref() {
        Some("zip") => extract_zip(archive, &extraction_dir(archive), wanted),
        other => Err(ArchiveError::Unsupported(other.unwrap_or_default().to_string())),
    }
}

/// Write every member whose extension is in `wanted` into `dest`, flattened.
/// macOS resource forks are skipped. Returns the written paths.
pub fn extract_zip(
    archive: &Utf8Path,
    dest: &Utf8Path,
    wanted: &[&str],
) -> Result<Vec<Utf8PathBuf>, ArchiveError> {
    let mut zip = zip::ZipArchive::new(File::open(archive)?)?;
    let mut written = Vec::new();

    for i in 0..zip.len() {
        let mut member = zip.by_index(i)?;
        if member.is_dir() {
            continue;
        }
        let Some(inner) = member.enclosed_name() else {
            continue;
        };
        if inner.components().any(|c| c.as_os_str() == "__MACOSX") {
            continue;
        }
        let Some(name) = inner.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !has_extension(name, wanted) {
            continue;
        }

        std::fs::create_dir_all(dest)?;
        let target = dest.join(fs_name_strip(name));
        let mut out = BufWriter::new(File::create(&target)?);
        std::io::copy(&mut member, &mut out)?;
        written.push(target);
    }
    Ok(written)
}
