pub mod entry;
pub mod names;
pub mod time;

pub use entry::{
    ApiDirectory, ApiFile, ApiFlags, DirectoryMeta, EntryId, EntryType, LocalDirectoryMeta,
    RemoteDirectoryEntry, RemoteFileEntry,
};
pub use names::{fs_name_strip, lookup_keys, name_strip_insignificant_chars};

pub const PROG_NAME: &str = "kitsunekko-tools";
pub const KITSUNEKKO_DOMAIN_URL: &str = "https://kitsunekko.net";

/// Per-directory sidecar with the last known remote state.
pub const INFO_FILENAME: &str = ".kitsuinfo.json";
/// Per-directory ledger of handled files. At the destination root the same
/// name holds a list of glob patterns instead.
pub const IGNORE_FILENAME: &str = ".kitsuignore";
/// Written at the destination root after every completed sync.
pub const UPDATED_FILENAME: &str = ".updated";
/// Trash sub-directory for files the remote stopped listing.
pub const TRASH_DIRNAME: &str = "extra";
/// Output directory of the catalog build.
pub const SITE_DIRNAME: &str = "_site";

/// Names never treated as subtitle content or show directories.
pub const SKIP_FILES: &[&str] = &[
    INFO_FILENAME,
    IGNORE_FILENAME,
    UPDATED_FILENAME,
    SITE_DIRNAME,
    ".git",
    ".gitignore",
    ".directory",
    "Thumbs.db",
    "desktop.ini",
];

pub const SUBTITLE_FILE_TYPES: &[&str] = &["ass", "ssa", "srt"];
pub const ARCHIVE_FILE_TYPES: &[&str] = &["zip", "rar", "7z"];

pub fn is_skipped_name(name: &str) -> bool {
    SKIP_FILES.contains(&name) || name.ends_with(".part")
}

/// Case-insensitive check of a file name against a list of bare extensions.
pub fn has_extension(name: &str, extensions: &[impl AsRef<str>]) -> bool {
    let lower = name.to_lowercase();
    extensions.iter().any(|ext| {
        let ext = ext.as_ref().trim_start_matches('.').to_lowercase();
        !ext.is_empty() && lower.ends_with(&format!(".{ext}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_match_ignores_case_and_dots() {
        assert!(has_extension("Show - 01.ASS", &["ass"]));
        assert!(has_extension("pack.zip", &[".zip"]));
        assert!(!has_extension("notes.txt", &["ass", "srt"]));
        assert!(!has_extension("zip", &["zip"]));
    }

    #[test]
    fn sidecars_and_partials_are_skipped() {
        assert!(is_skipped_name(INFO_FILENAME));
        assert!(is_skipped_name(IGNORE_FILENAME));
        assert!(is_skipped_name("a.srt.part"));
        assert!(!is_skipped_name("a.srt"));
    }
}
