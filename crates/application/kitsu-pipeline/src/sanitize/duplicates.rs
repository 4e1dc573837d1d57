use kitsu_core::{EntryId, LocalDirectoryMeta};
use std::collections::BTreeMap;

/// Local directories that carry the same remote id.
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicatesGroup {
    pub original: LocalDirectoryMeta,
    pub copies: Vec<LocalDirectoryMeta>,
}

fn ascii_letters(name: &str) -> usize {
    name.chars().filter(char::is_ascii_alphabetic).count()
}

impl DuplicatesGroup {
    /// Pick the original: newest first, then the name with more ASCII
    /// letters, then the lexicographically greater name.
    ///
    /// Returns `None` for fewer than two directories.
    pub fn from_list(mut metas: Vec<LocalDirectoryMeta>) -> Option<Self> {
        if metas.len() < 2 {
            return None;
        }
        let best = metas
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| {
                a.entry
                    .last_modified
                    .cmp(&b.entry.last_modified)
                    .then_with(|| ascii_letters(a.dir_name()).cmp(&ascii_letters(b.dir_name())))
                    .then_with(|| a.dir_name().cmp(b.dir_name()))
            })
            .map(|(i, _)| i)?;
        let original = metas.swap_remove(best);
        metas.sort_by(|a, b| a.dir_path.cmp(&b.dir_path));
        Some(Self {
            original,
            copies: metas,
        })
    }

    pub fn entry_id(&self) -> Option<EntryId> {
        self.original.entry_id()
    }
}

/// Every id shared by more than one directory, in id order.
pub fn find_duplicates(metas: impl IntoIterator<Item = LocalDirectoryMeta>) -> Vec<DuplicatesGroup> {
    let mut by_id: BTreeMap<EntryId, Vec<LocalDirectoryMeta>> = BTreeMap::new();
    for meta in metas {
        if let Some(id) = meta.entry_id() {
            by_id.entry(id).or_default().push(meta);
        }
    }
    by_id
        .into_values()
        .filter_map(DuplicatesGroup::from_list)
        .collect()
}
