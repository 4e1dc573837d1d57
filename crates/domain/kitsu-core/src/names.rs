//! Name handling for show directories and subtitle files.
//!
//! `fs_name_strip` turns any remote name into a portable path component.
//! `name_strip_insignificant_chars` builds the loose keys used to match
//! local directories against remote entries.

use regex::Regex;
use std::sync::LazyLock;

use crate::entry::DirectoryMeta;

/// Characters prohibited on common filesystems and their look-alike replacements.
const PROHIBITED_CHARS: &[(char, char)] = &[
    ('\\', '＼'),
    ('/', '／'),
    (':', '.'),
    ('*', '＊'),
    ('?', '？'),
    ('"', '＂'),
    ('<', '＜'),
    ('>', '＞'),
    ('|', '｜'),
];

static WHITESPACE_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Punctuation, brackets and decorative symbols that carry no meaning when
/// comparing titles, e.g. `Yu☆Gi☆Oh!` and `Yu-Gi-Oh!`.
static INSIGNIFICANT_CHARS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r#"[\- ー,.。、！!@#$%\^&*()_=+＠＃＄％＾△＆＊（）＋＝「」\s\\\[\]{}<>?/'":`|;"#,
        r#"〄〇〈〉〓〔〕〖〗〘〙〚〛〝〞〟〠〡〢〣〥〦〧〨〭〮〯〫〬〶〷〸〹〺〻〼〾〿？…ヽヾゞ"#,
        r#"〱〲〳〵〴［］｛｝｟｠゠‥•◦﹅﹆♪♫♬♩ⓍⓁⓎ仝　・※【】〒◎×〃゜『』《》～〜~〽☆∀∕]+"#,
    ))
    .unwrap()
});

/// Make a name safe to use as a single path component on any platform.
///
/// Idempotent. The result never contains `\ / : * ? " < > |` or control
/// characters, never ends with a dot or a space, and is never empty.
pub fn fs_name_strip(name: &str) -> String {
    let mapped: String = name
        .chars()
        .map(|c| {
            if c.is_control() {
                return ' ';
            }
            PROHIBITED_CHARS
                .iter()
                .find(|(bad, _)| *bad == c)
                .map(|(_, good)| *good)
                .unwrap_or(c)
        })
        .collect();

    let collapsed = WHITESPACE_RUN.replace_all(&mapped, " ");
    let stripped = collapsed
        .trim_start()
        .trim_end_matches(|c: char| c == '.' || c.is_whitespace());

    if stripped.is_empty() {
        "_".to_string()
    } else {
        stripped.to_string()
    }
}

pub fn name_strip_insignificant_chars(name: &str) -> String {
    INSIGNIFICANT_CHARS.replace_all(name, "").to_lowercase()
}

/// All keys under which a directory can be found by the orphan matcher.
pub fn lookup_keys(meta: &dyn DirectoryMeta, dir_name: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if !meta.name().is_empty() {
        keys.push(name_strip_insignificant_chars(meta.name()));
        keys.push(name_strip_insignificant_chars(&meta.fs_name()));
    }
    for alt in [meta.english_name(), meta.japanese_name()].into_iter().flatten() {
        keys.push(name_strip_insignificant_chars(alt));
        keys.push(name_strip_insignificant_chars(&fs_name_strip(alt)));
    }
    keys.push(dir_name.to_lowercase());
    keys.push(fs_name_strip(&dir_name.to_lowercase()));
    keys.push(name_strip_insignificant_chars(dir_name));
    keys.push(name_strip_insignificant_chars(&fs_name_strip(dir_name)));

    keys.retain(|k| !k.is_empty());
    keys.sort();
    keys.dedup();
    keys
}
