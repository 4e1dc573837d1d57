//! Row extraction for the HTML directory listings.

use chrono::{DateTime, Utc};
use kitsu_core::time::parse_listing_time;
use kitsu_core::{fs_name_strip, EntryType, RemoteDirectoryEntry, RemoteFileEntry};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

static RE_SUBTITLE_DIR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r#"(?i)<a href="/?(?P<abs_path>dirlist.php\?dir=[^"']+)"[^<>]*>\s*<strong>\s*(?P<show_name>.+?)\s*</strong>\s*</a>"#,
        r#".*<td class="tdright" title="(?P<mod_timestamp>[^<>"]+)"\s*>"#,
    ))
    .unwrap()
});

static RE_SUBTITLE_FILE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r#"(?i)<a href="/?(?P<abs_path>subtitles/[^"']+\.(?:zip|rar|7z|ass|srt|ssa))"[^<>]*>"#,
        r#".*<td class="tdright" title="(?P<mod_timestamp>[^<>"]+)"\s*>"#,
    ))
    .unwrap()
});

/// Everything except unreserved characters and `/` gets escaped.
const PATH_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'_')
    .remove(b'.')
    .remove(b'-')
    .remove(b'~')
    .remove(b'/');

/// A link to another listing page.
#[derive(Debug, Clone, PartialEq)]
pub struct ListedDir {
    pub url: String,
    pub entry: RemoteDirectoryEntry,
}

/// A subtitle file row, tagged with the show directory it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct ListedFile {
    pub show_name: String,
    pub file: RemoteFileEntry,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageListing {
    pub dirs: Vec<ListedDir>,
    pub files: Vec<ListedFile>,
}

fn html_unescape(text: &str) -> String {
    text.replace("&quot;", "\"")
        .replace("&#039;", "'")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

pub fn sanitize_name(raw: &str) -> String {
    fs_name_strip(&percent_decode_str(&html_unescape(raw)).decode_utf8_lossy())
}

pub fn quote_path(path: &str) -> String {
    let decoded = percent_decode_str(path).decode_utf8_lossy();
    utf8_percent_encode(&decoded, PATH_ESCAPE).to_string()
}

fn parse_time(raw: &str) -> Option<DateTime<Utc>> {
    match parse_listing_time(raw) {
        Ok(t) => Some(t),
        Err(e) => {
            debug!("unparsable listing timestamp {raw:?}: {e}");
            None
        }
    }
}

fn join_url(domain: &str, path: &str) -> String {
    format!("{}/{}", domain.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Parse a listing page. Rows are matched one `<tr>` at a time.
pub fn parse_listing(html: &str, domain: &str) -> PageListing {
    let mut page = PageListing::default();
    for row in html.split("<tr").skip(1) {
        if let Some(caps) = RE_SUBTITLE_DIR.captures(row) {
            let Some(mod_time) = parse_time(&caps["mod_timestamp"]) else {
                continue;
            };
            let abs_path = html_unescape(&caps["abs_path"]);
            page.dirs.push(ListedDir {
                url: join_url(domain, &abs_path),
                entry: RemoteDirectoryEntry::new(
                    &sanitize_name(&caps["show_name"]),
                    EntryType::Unsorted,
                    mod_time,
                ),
            });
        } else if let Some(caps) = RE_SUBTITLE_FILE.captures(row) {
            let Some(mod_time) = parse_time(&caps["mod_timestamp"]) else {
                continue;
            };
            let abs_path = html_unescape(&caps["abs_path"]);
            let mut segments = abs_path.rsplit('/');
            let (Some(file_name), Some(show_name)) = (segments.next(), segments.next()) else {
                continue;
            };
            page.files.push(ListedFile {
                show_name: sanitize_name(show_name),
                file: RemoteFileEntry {
                    url: join_url(domain, &quote_path(&abs_path)),
                    name: sanitize_name(file_name),
                    size_bytes: None,
                    last_modified: mod_time,
                },
            });
        }
    }
    page
}
