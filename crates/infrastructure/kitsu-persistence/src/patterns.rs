use camino::{Utf8Path, Utf8PathBuf};
use glob::{MatchOptions, Pattern};
use kitsu_core::IGNORE_FILENAME;

use crate::io::write_atomic;
use crate::StorageError;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// Glob patterns kept in the `.kitsuignore` at the destination root.
///
/// Paths are matched relative to the root, one pattern per line. Blank lines
/// and lines starting with `#` are skipped.
#[derive(Debug, Clone)]
pub struct IgnorePatterns {
    root: Utf8PathBuf,
    patterns: Vec<Pattern>,
}

impl IgnorePatterns {
    pub fn empty(root: &Utf8Path) -> Self {
        Self {
            root: root.to_path_buf(),
            patterns: Vec::new(),
        }
    }

    pub fn load(root: &Utf8Path) -> Result<Self, StorageError> {
        let mut list = Self::empty(root);
        let data = match std::fs::read_to_string(list.file_path()) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(list),
            Err(e) => return Err(e.into()),
        };
        for line in data.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            list.patterns.push(compile(line)?);
        }
        Ok(list)
    }

    pub fn file_path(&self) -> Utf8PathBuf {
        self.root.join(IGNORE_FILENAME)
    }

    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(Pattern::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn is_matching(&self, path: &Utf8Path) -> bool {
        if self.patterns.is_empty() {
            return false;
        }
        let rel = path.strip_prefix(&self.root).unwrap_or(path);
        self.patterns
            .iter()
            .any(|p| p.matches_with(rel.as_str(), MATCH_OPTIONS))
    }

    /// Append a pattern and rewrite the file. Returns false if already listed.
    pub fn add(&mut self, pattern: &str) -> Result<bool, StorageError> {
        let pattern = pattern.trim();
        if self.patterns().any(|p| p == pattern) {
            return Ok(false);
        }
        self.patterns.push(compile(pattern)?);
        let mut data = self.patterns().collect::<Vec<_>>().join("\n");
        data.push('\n');
        write_atomic(&self.file_path(), data.as_bytes())?;
        Ok(true)
    }
}

fn compile(pattern: &str) -> Result<Pattern, StorageError> {
    Pattern::new(pattern).map_err(|e| StorageError::Pattern {
        pattern: pattern.to_string(),
        message: e.msg.to_string(),
    })
}
