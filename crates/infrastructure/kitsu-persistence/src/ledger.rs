use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use kitsu_core::time::{format_api_time, parse_timestamp_lenient};
use kitsu_core::IGNORE_FILENAME;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::io::{file_mtime, write_atomic};
use crate::StorageError;

pub const LEDGER_FIELDS: [&str; 3] = ["name", "last_modified", "st_size"];

/// A file that must not be fetched again unless the remote copy gets newer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnoreEntry {
    pub name: String,
    pub last_modified: DateTime<Utc>,
    pub size_bytes: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct LedgerRow {
    name: String,
    last_modified: String,
    st_size: u64,
}

/// The `.kitsuignore` TSV of one show directory.
///
/// Merges never move a timestamp backwards. Changes stay in memory until
/// `commit`; with `flush_every` set, `maybe_commit_midway` also writes once
/// that many changes are pending.
#[derive(Debug, Clone)]
pub struct IgnoreLedger {
    path: Utf8PathBuf,
    entries: BTreeMap<String, IgnoreEntry>,
    pending: usize,
    flush_every: Option<usize>,
}

impl IgnoreLedger {
    pub fn empty(dir: &Utf8Path) -> Self {
        Self {
            path: dir.join(IGNORE_FILENAME),
            entries: BTreeMap::new(),
            pending: 0,
            flush_every: None,
        }
    }

    pub fn open(dir: &Utf8Path) -> Result<Self, StorageError> {
        let mut ledger = Self::empty(dir);
        let file = match std::fs::File::open(&ledger.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ledger),
            Err(e) => return Err(e.into()),
        };

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .quoting(false)
            .has_headers(true)
            .flexible(false)
            .from_reader(file);

        for row in reader.deserialize::<LedgerRow>() {
            let row = row.map_err(|e| StorageError::IgnoreList {
                path: ledger.path.clone(),
                message: e.to_string(),
            })?;
            let last_modified =
                parse_timestamp_lenient(&row.last_modified).map_err(|e| {
                    StorageError::IgnoreList {
                        path: ledger.path.clone(),
                        message: format!("bad timestamp {:?}: {e}", row.last_modified),
                    }
                })?;
            ledger.insert_max(IgnoreEntry {
                name: row.name,
                last_modified,
                size_bytes: row.st_size,
            });
        }
        Ok(ledger)
    }

    /// Like `open`, but a malformed file is logged and treated as empty.
    pub fn open_or_empty(dir: &Utf8Path) -> Self {
        match Self::open(dir) {
            Ok(ledger) => ledger,
            Err(e) => {
                warn!("{e}; treating ignore list as empty");
                Self::empty(dir)
            }
        }
    }

    pub fn with_flush_every(mut self, flush_every: Option<usize>) -> Self {
        self.flush_every = flush_every.filter(|n| *n > 0);
        self
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn get(&self, name: &str) -> Option<&IgnoreEntry> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &IgnoreEntry> {
        self.entries.values()
    }

    pub fn is_dirty(&self) -> bool {
        self.pending > 0
    }

    fn insert_max(&mut self, entry: IgnoreEntry) -> bool {
        match self.entries.get_mut(&entry.name) {
            Some(existing) => {
                if entry.last_modified > existing.last_modified {
                    existing.last_modified = entry.last_modified;
                    existing.size_bytes = entry.size_bytes;
                    true
                } else {
                    false
                }
            }
            None => {
                self.entries.insert(entry.name.clone(), entry);
                true
            }
        }
    }

    /// Returns true if the ledger changed.
    pub fn merge(&mut self, entry: IgnoreEntry) -> bool {
        let changed = self.insert_max(entry);
        if changed {
            self.pending += 1;
        }
        changed
    }

    /// Ledger a file that exists on disk, using its size and mtime.
    pub fn add_file(&mut self, file: &Utf8Path) -> Result<bool, StorageError> {
        let name = file
            .file_name()
            .ok_or_else(|| StorageError::InvalidPath(file.to_string()))?;
        let meta = std::fs::metadata(file)?;
        Ok(self.merge(IgnoreEntry {
            name: name.to_string(),
            last_modified: file_mtime(&meta),
            size_bytes: meta.len(),
        }))
    }

    /// Union with another ledger; returns the number of changed rows.
    pub fn extend_from(&mut self, other: &IgnoreLedger) -> usize {
        other
            .iter()
            .filter(|entry| self.merge((*entry).clone()))
            .count()
    }

    /// Point the ledger at another directory. Everything becomes pending.
    pub fn relocate(&mut self, dir: &Utf8Path) {
        self.path = dir.join(IGNORE_FILENAME);
        self.pending = self.entries.len().max(1);
    }

    pub fn maybe_commit_midway(&mut self) -> Result<bool, StorageError> {
        match self.flush_every {
            Some(n) if self.pending >= n => {
                self.commit()?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub fn commit(&mut self) -> Result<(), StorageError> {
        if !self.is_dirty() {
            return Ok(());
        }
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .quote_style(csv::QuoteStyle::Never)
            .terminator(csv::Terminator::Any(b'\n'))
            .has_headers(false)
            .from_writer(Vec::new());
        writer.write_record(LEDGER_FIELDS)?;
        for entry in self.entries.values() {
            writer.serialize(LedgerRow {
                name: entry.name.clone(),
                last_modified: format_api_time(&entry.last_modified),
                st_size: entry.size_bytes,
            })?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| StorageError::Io(e.into_error()))?;
        write_atomic(&self.path, &bytes)?;
        debug!("committed {} ({} entries)", self.path, self.entries.len());
        self.pending = 0;
        Ok(())
    }
}
