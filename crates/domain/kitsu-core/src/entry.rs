use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::names::fs_name_strip;
use crate::time::{max_datetime, parse_api_time};

/// Opaque catalog identifier, only known in API mode.
pub type EntryId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    AnimeTv,
    AnimeMovie,
    DramaTv,
    DramaMovie,
    Unsorted,
}

impl EntryType {
    pub const ALL: [EntryType; 5] = [
        EntryType::AnimeTv,
        EntryType::AnimeMovie,
        EntryType::DramaTv,
        EntryType::DramaMovie,
        EntryType::Unsorted,
    ];

    pub fn from_flags(flags: &ApiFlags) -> Self {
        match (flags.anime, flags.movie) {
            (true, false) => EntryType::AnimeTv,
            (true, true) => EntryType::AnimeMovie,
            (false, false) => EntryType::DramaTv,
            (false, true) => EntryType::DramaMovie,
        }
    }

    /// Name of the subtree holding entries of this type.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::AnimeTv => "anime_tv",
            EntryType::AnimeMovie => "anime_movie",
            EntryType::DramaTv => "drama_tv",
            EntryType::DramaMovie => "drama_movie",
            EntryType::Unsorted => "unsorted",
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            EntryType::AnimeTv => "Anime TV",
            EntryType::AnimeMovie => "Anime movie",
            EntryType::DramaTv => "Drama TV",
            EntryType::DramaMovie => "Drama movie",
            EntryType::Unsorted => "Unsorted",
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntryType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown entry type: {s}"))
    }
}

fn default_entry_type() -> EntryType {
    EntryType::Unsorted
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |s| s.trim().is_empty())
}

fn is_unset_id(value: &Option<u64>) -> bool {
    value.map_or(true, |v| v == 0)
}

/// Read-only view shared by remote entries and on-disk metadata.
pub trait DirectoryMeta {
    fn name(&self) -> &str;
    fn entry_type(&self) -> EntryType;
    fn english_name(&self) -> Option<&str>;
    fn japanese_name(&self) -> Option<&str>;
    fn last_modified(&self) -> DateTime<Utc>;

    fn fs_name(&self) -> String {
        fs_name_strip(self.name())
    }
}

/// A catalog item. This is also the on-disk schema of `.kitsuinfo.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteDirectoryEntry {
    #[serde(default, skip_serializing_if = "is_unset_id")]
    pub entry_id: Option<EntryId>,
    pub name: String,
    #[serde(default = "default_entry_type")]
    pub entry_type: EntryType,
    #[serde(with = "crate::time::rfc3339_z")]
    pub last_modified: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "is_blank")]
    pub english_name: Option<String>,
    #[serde(default, skip_serializing_if = "is_blank")]
    pub japanese_name: Option<String>,
    #[serde(default, skip_serializing_if = "is_unset_id")]
    pub anilist_id: Option<u64>,
    #[serde(default, skip_serializing_if = "is_blank")]
    pub tmdb_id: Option<String>,
}

impl RemoteDirectoryEntry {
    pub fn new(name: &str, entry_type: EntryType, last_modified: DateTime<Utc>) -> Self {
        Self {
            entry_id: None,
            name: fs_name_strip(name),
            entry_type,
            last_modified,
            english_name: None,
            japanese_name: None,
            anilist_id: None,
            tmdb_id: None,
        }
    }

    /// Combine a fresh remote listing with what was recorded locally.
    ///
    /// Optional fields the remote stopped sending are kept, and the timestamp
    /// never goes backwards.
    pub fn merged_with(&self, local: Option<&RemoteDirectoryEntry>) -> RemoteDirectoryEntry {
        let Some(local) = local else {
            return self.clone();
        };
        let keep = |remote: &Option<String>, local: &Option<String>| {
            if is_blank(remote) {
                local.clone()
            } else {
                remote.clone()
            }
        };
        RemoteDirectoryEntry {
            entry_id: self.entry_id.or(local.entry_id),
            name: self.name.clone(),
            entry_type: if self.entry_type == EntryType::Unsorted {
                local.entry_type
            } else {
                self.entry_type
            },
            last_modified: max_datetime(self.last_modified, local.last_modified),
            english_name: keep(&self.english_name, &local.english_name),
            japanese_name: keep(&self.japanese_name, &local.japanese_name),
            anilist_id: self.anilist_id.filter(|v| *v != 0).or(local.anilist_id),
            tmdb_id: keep(&self.tmdb_id, &local.tmdb_id),
        }
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl DirectoryMeta for RemoteDirectoryEntry {
    fn name(&self) -> &str {
        &self.name
    }

    fn entry_type(&self) -> EntryType {
        self.entry_type
    }

    fn english_name(&self) -> Option<&str> {
        self.english_name.as_deref().filter(|s| !s.is_empty())
    }

    fn japanese_name(&self) -> Option<&str> {
        self.japanese_name.as_deref().filter(|s| !s.is_empty())
    }

    fn last_modified(&self) -> DateTime<Utc> {
        self.last_modified
    }
}

/// One downloadable file. Identity is `name` within the parent directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteFileEntry {
    pub url: String,
    pub name: String,
    pub size_bytes: Option<u64>,
    pub last_modified: DateTime<Utc>,
}

/// The sidecar of a local directory together with where it was found.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalDirectoryMeta {
    pub entry: RemoteDirectoryEntry,
    pub dir_path: Utf8PathBuf,
}

impl LocalDirectoryMeta {
    pub fn entry_id(&self) -> Option<EntryId> {
        self.entry.entry_id.filter(|id| *id != 0)
    }

    pub fn dir_name(&self) -> &str {
        self.dir_path.file_name().unwrap_or_default()
    }
}

impl DirectoryMeta for LocalDirectoryMeta {
    fn name(&self) -> &str {
        self.entry.name()
    }

    fn entry_type(&self) -> EntryType {
        self.entry.entry_type
    }

    fn english_name(&self) -> Option<&str> {
        self.entry.english_name()
    }

    fn japanese_name(&self) -> Option<&str> {
        self.entry.japanese_name()
    }

    fn last_modified(&self) -> DateTime<Utc> {
        self.entry.last_modified
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiFlags {
    #[serde(default)]
    pub anime: bool,
    #[serde(default)]
    pub movie: bool,
    #[serde(default)]
    pub adult: bool,
    #[serde(default)]
    pub external: bool,
    #[serde(default)]
    pub low_quality: bool,
}

/// Catalog item as returned by `GET /api/entries/search`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiDirectory {
    pub id: EntryId,
    pub name: String,
    #[serde(default)]
    pub flags: ApiFlags,
    pub last_modified: String,
    #[serde(default)]
    pub english_name: Option<String>,
    #[serde(default)]
    pub japanese_name: Option<String>,
    #[serde(default)]
    pub anilist_id: Option<u64>,
    #[serde(default)]
    pub tmdb_id: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub creator_id: Option<u64>,
}

impl ApiDirectory {
    pub fn into_entry(self) -> Result<RemoteDirectoryEntry, chrono::ParseError> {
        let trimmed = |v: Option<String>| {
            v.map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        };
        Ok(RemoteDirectoryEntry {
            entry_id: Some(self.id),
            name: fs_name_strip(&self.name),
            entry_type: EntryType::from_flags(&self.flags),
            last_modified: parse_api_time(&self.last_modified)?,
            english_name: trimmed(self.english_name),
            japanese_name: trimmed(self.japanese_name),
            anilist_id: self.anilist_id.filter(|v| *v != 0),
            tmdb_id: trimmed(self.tmdb_id),
        })
    }
}

/// File item as returned by `GET /api/entries/{id}/files`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiFile {
    pub url: String,
    pub name: String,
    #[serde(default)]
    pub size: Option<u64>,
    pub last_modified: String,
}

impl ApiFile {
    pub fn into_entry(self) -> Result<RemoteFileEntry, chrono::ParseError> {
        Ok(RemoteFileEntry {
            url: self.url,
            name: fs_name_strip(&self.name),
            size_bytes: self.size,
            last_modified: parse_api_time(&self.last_modified)?,
        })
    }
}
