mod error;
mod io;
mod layout;
mod ledger;
mod meta;
mod patterns;

pub use error::*;
pub use io::{file_mtime, is_non_empty_file, to_utf8, write_atomic};
pub use layout::MirrorLayout;
pub use ledger::{IgnoreEntry, IgnoreLedger, LEDGER_FIELDS};
pub use meta::{meta_file_path, DirectoryMetaStore, SidecarMetaStore};
pub use patterns::IgnorePatterns;
