use camino::{Utf8Path, Utf8PathBuf};
use chrono::{TimeZone, Utc};
use kitsu_core::{EntryType, RemoteDirectoryEntry, INFO_FILENAME, TRASH_DIRNAME};
use kitsu_persistence::{DirectoryMetaStore, SidecarMetaStore};
use kitsu_pipeline::{SanitizeOptions, Sanitizer};
use tempfile::TempDir;

fn mirror() -> (TempDir, Utf8PathBuf) {
    let tmp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).unwrap();
    (tmp, root)
}

fn with_meta(dir: &Utf8Path, id: u64, name: &str, year: i32) {
    let entry = RemoteDirectoryEntry {
        entry_id: Some(id),
        english_name: (name == "Frieren").then(|| "Frieren: Beyond Journey's End".to_string()),
        ..RemoteDirectoryEntry::new(
            name,
            EntryType::AnimeTv,
            Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0).unwrap(),
        )
    };
    SidecarMetaStore.save(dir, &entry).unwrap();
}

fn write(path: Utf8PathBuf, body: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, body).unwrap();
}

#[test]
fn duplicates_fold_into_the_newest_directory() {
    let (_tmp, root) = mirror();
    let foo = root.join("anime_tv").join("Foo");
    let foo2 = root.join("anime_tv").join("Foo2");
    with_meta(&foo, 1, "Foo", 2023);
    with_meta(&foo2, 1, "Foo2", 2025);
    write(foo.join("a.srt"), "a");
    write(foo.join("shared.srt"), "same");
    write(foo2.join("shared.srt"), "same");

    let report = Sanitizer::new(root.clone()).run(SanitizeOptions::default()).unwrap();

    assert_eq!(report.duplicates_merged, 1);
    assert!(report.failures.is_empty());
    assert!(!foo.exists());
    assert!(foo2.join("a.srt").is_file());
    assert_eq!(std::fs::read_to_string(foo2.join("shared.srt")).unwrap(), "same");
    let meta = SidecarMetaStore.load(&foo2).unwrap().unwrap();
    assert_eq!(meta.entry.last_modified.format("%Y").to_string(), "2025");
}

#[test]
fn conflicting_duplicate_is_reported_and_left_alone() {
    let (_tmp, root) = mirror();
    let old = root.join("anime_tv").join("Show (old)");
    let new = root.join("anime_tv").join("Show");
    with_meta(&old, 2, "Show (old)", 2020);
    with_meta(&new, 2, "Show", 2024);
    write(old.join("a.srt"), "old text");
    write(new.join("a.srt"), "new text");
    write(root.join("anime_tv").join("Other").join("b.srt"), "b");
    with_meta(&root.join("anime_tv").join("Other"), 3, "Other", 2024);

    let report = Sanitizer::new(root.clone()).run(SanitizeOptions::default()).unwrap();

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].0, old);
    assert_eq!(std::fs::read_to_string(old.join("a.srt")).unwrap(), "old text");
    assert_eq!(std::fs::read_to_string(new.join("a.srt")).unwrap(), "new text");
    assert!(root.join("anime_tv").join("Other").join("b.srt").is_file());
}

#[test]
fn orphans_join_their_show_and_loose_dirs_are_sorted() {
    let (_tmp, root) = mirror();
    let frieren = root.join("anime_tv").join("Frieren");
    with_meta(&frieren, 5, "Frieren", 2024);
    write(frieren.join("01.srt"), "1");
    write(root.join("Frieren Beyond Journeys End").join("02.srt"), "2");
    write(root.join("Mystery Show").join("x.srt"), "x");
    write(root.join("Bad: Name").join("y.srt"), "y");

    let report = Sanitizer::new(root.clone()).run(SanitizeOptions::default()).unwrap();

    assert_eq!(report.orphans_merged, 1);
    assert!(frieren.join("02.srt").is_file());
    assert!(!root.join("Frieren Beyond Journeys End").exists());
    assert!(root.join("unsorted").join("Mystery Show").join("x.srt").is_file());
    assert!(root.join("unsorted").join("Bad. Name").join("y.srt").is_file());
    assert_eq!(report.renamed, 1);
}

#[test]
fn misplaced_directory_moves_to_its_type() {
    let (_tmp, root) = mirror();
    let loose = root.join("Drama Show");
    let entry = RemoteDirectoryEntry {
        entry_id: Some(8),
        ..RemoteDirectoryEntry::new(
            "Drama Show",
            EntryType::DramaMovie,
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        )
    };
    SidecarMetaStore.save(&loose, &entry).unwrap();
    write(loose.join("a.srt"), "a");

    let report = Sanitizer::new(root.clone()).run(SanitizeOptions::default()).unwrap();
    assert_eq!(report.relocated, 1);
    let target = root.join("drama_movie").join("Drama Show");
    assert!(target.join("a.srt").is_file());
    assert!(target.join(INFO_FILENAME).is_file());
}

#[test]
fn empty_and_trash_options_remove_directories() {
    let (_tmp, root) = mirror();
    let keep = root.join("anime_tv").join("Keep");
    let empty = root.join("anime_tv").join("Empty");
    with_meta(&keep, 1, "Keep", 2024);
    with_meta(&empty, 2, "Empty", 2024);
    write(keep.join("a.srt"), "a");
    write(keep.join(TRASH_DIRNAME).join("old.srt"), "old");

    let report = Sanitizer::new(root.clone())
        .run(SanitizeOptions {
            remove_empty: true,
            remove_trash: true,
        })
        .unwrap();

    assert_eq!(report.trash_removed, 1);
    assert_eq!(report.empty_removed, 1);
    assert!(!keep.join(TRASH_DIRNAME).exists());
    assert!(keep.join("a.srt").is_file());
    assert!(!empty.exists());
}

#[test]
fn same_named_shows_keep_separate_directories() {
    let (_tmp, root) = mirror();
    let first = root.join("anime_tv").join("Kanon");
    let second = root.join("anime_tv").join("Kanon [2]");
    let loose = root.join("Kanon");
    with_meta(&first, 1, "Kanon", 2024);
    with_meta(&second, 2, "Kanon", 2024);
    with_meta(&loose, 3, "Kanon", 2024);
    write(first.join("a.srt"), "a");
    write(second.join("b.srt"), "b");
    write(loose.join("c.srt"), "c");

    let report = Sanitizer::new(root.clone()).run(SanitizeOptions::default()).unwrap();

    assert!(report.failures.is_empty());
    assert_eq!(report.relocated, 1);
    assert_eq!(report.duplicates_merged, 0);
    let moved = root.join("anime_tv").join("Kanon [3]");
    for (dir, id, file) in [(&first, 1, "a.srt"), (&second, 2, "b.srt"), (&moved, 3, "c.srt")] {
        assert!(dir.join(file).is_file(), "{dir}");
        let meta = SidecarMetaStore.load(dir).unwrap().unwrap();
        assert_eq!(meta.entry_id(), Some(id));
    }
    assert!(!loose.exists());
}
