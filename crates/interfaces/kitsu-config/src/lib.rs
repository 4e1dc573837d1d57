//! Settings file handling for the `kitsu` tool.

use camino::{Utf8Path, Utf8PathBuf};
use kitsu_infra::net::DEFAULT_HEADERS;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

mod locate;

pub use locate::{config_locations, create_config, load_config, locate_config, CONFIG_FILENAME};

/// Default number of concurrent directory visits and downloads.
pub const DEFAULT_DOWNLOAD_THREADS: usize = 8;

/// Minimum allowed concurrent download threads.
pub const MIN_DOWNLOAD_THREADS: usize = 1;

/// Maximum allowed concurrent download threads.
pub const MAX_DOWNLOAD_THREADS: usize = 32;

pub const ENV_API_KEY: &str = "KITSU_API_KEY";
pub const ENV_API_URL: &str = "KITSU_API_URL";

/// Marker every scrape seed URL must carry.
const DIRLIST_MARKER: &str = "dirlist.php?dir=";

pub fn clamp_threads(v: usize) -> usize {
    v.clamp(MIN_DOWNLOAD_THREADS, MAX_DOWNLOAD_THREADS)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no config file found. searched: {}", display_paths(searched))]
    NotFound { searched: Vec<Utf8PathBuf> },
    #[error("invalid config: {0}")]
    Invalid(String),
    #[error("destination directory does not exist: {0}")]
    DestinationNotFound(Utf8PathBuf),
    #[error("config file already exists: {0}")]
    AlreadyExists(Utf8PathBuf),
    #[error("{path}: {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path}: {source}")]
    Parse {
        path: Utf8PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("could not serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

fn display_paths(paths: &[Utf8PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Mirror root. A leading `~` is expanded to the home directory.
    pub destination: String,
    /// Outbound proxy; empty means a direct connection.
    pub proxy: String,
    /// Scrape-mode seed page.
    pub download_root: String,
    /// Per-request timeout in seconds.
    pub timeout: u64,
    /// Incremental window, e.g. `"30 days"`.
    pub skip_older: String,
    pub api_url: String,
    pub api_key: String,
    pub allowed_file_types: Vec<String>,
    pub download_threads: usize,
    /// Local request pacing; 0 disables it.
    pub requests_per_second: u32,
    pub headers: BTreeMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            destination: "~/kitsunekko".to_string(),
            proxy: "socks5://127.0.0.1:9050".to_string(),
            download_root: format!(
                "{}/dirlist.php?dir=subtitles/japanese/",
                kitsu_core::KITSUNEKKO_DOMAIN_URL
            ),
            timeout: 120,
            skip_older: "30 days".to_string(),
            api_url: kitsu_core::KITSUNEKKO_DOMAIN_URL.to_string(),
            api_key: String::new(),
            allowed_file_types: ["ssa", "ass", "srt", "zip", "rar", "7z"]
                .into_iter()
                .map(String::from)
                .collect(),
            download_threads: DEFAULT_DOWNLOAD_THREADS,
            requests_per_second: 0,
            headers: DEFAULT_HEADERS
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

impl Config {
    /// Parse, apply environment overrides and validate.
    pub fn from_toml_str(raw: &str, origin: &Utf8Path) -> Result<Self, ConfigError> {
        let mut config: Config = toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Utf8Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw, path)
    }

    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup(ENV_API_KEY) {
            self.api_key = key;
        }
        if let Some(url) = lookup(ENV_API_URL).filter(|u| !u.trim().is_empty()) {
            self.api_url = url;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.download_root.contains(DIRLIST_MARKER) {
            return Err(ConfigError::Invalid(format!(
                "download_root must contain '{DIRLIST_MARKER}': {}",
                self.download_root
            )));
        }
        if self.destination.trim().is_empty() {
            return Err(ConfigError::Invalid("destination is empty".into()));
        }
        if self.timeout == 0 {
            return Err(ConfigError::Invalid("timeout must be positive".into()));
        }
        self.skip_older_duration()?;
        Ok(())
    }

    pub fn destination_path(&self) -> Utf8PathBuf {
        expand_tilde(&self.destination)
    }

    /// The destination, which has to exist already.
    pub fn existing_destination(&self) -> Result<Utf8PathBuf, ConfigError> {
        let path = self.destination_path();
        if path.is_dir() {
            Ok(path)
        } else {
            Err(ConfigError::DestinationNotFound(path))
        }
    }

    pub fn skip_older_duration(&self) -> Result<chrono::Duration, ConfigError> {
        parse_skip_older(&self.skip_older)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn proxy_url(&self) -> Option<&str> {
        Some(self.proxy.trim()).filter(|p| !p.is_empty())
    }

    pub fn threads(&self) -> usize {
        clamp_threads(self.download_threads)
    }

    /// Scheme and host of the scrape seed, the base for relative listing links.
    pub fn domain_url(&self) -> String {
        match self.download_root.find("/dirlist.php") {
            Some(idx) => self.download_root[..idx].to_string(),
            None => self.download_root.trim_end_matches('/').to_string(),
        }
    }

    pub fn header_pairs(&self) -> Vec<(String, String)> {
        self.headers
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// Parse `"<n> <unit>"` where unit is seconds, minutes, hours, days or weeks.
pub fn parse_skip_older(raw: &str) -> Result<chrono::Duration, ConfigError> {
    let invalid = || ConfigError::Invalid(format!("bad skip_older value: {raw:?}"));
    let mut parts = raw.split_whitespace();
    let (Some(amount), Some(unit), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(invalid());
    };
    let amount: i64 = amount.parse().map_err(|_| invalid())?;
    if amount < 0 {
        return Err(invalid());
    }
    let unit = unit.to_lowercase();
    let duration = match unit.trim_end_matches('s') {
        "second" | "sec" => chrono::Duration::try_seconds(amount),
        "minute" | "min" => chrono::Duration::try_minutes(amount),
        "hour" => chrono::Duration::try_hours(amount),
        "day" => chrono::Duration::try_days(amount),
        "week" => chrono::Duration::try_weeks(amount),
        _ => None,
    };
    duration.ok_or_else(invalid)
}

fn expand_tilde(raw: &str) -> Utf8PathBuf {
    let home = directories::BaseDirs::new()
        .and_then(|dirs| Utf8PathBuf::from_path_buf(dirs.home_dir().to_path_buf()).ok());
    match (raw.strip_prefix('~'), home) {
        (Some(""), Some(home)) => home,
        (Some(rest), Some(home)) if rest.starts_with('/') => {
            home.join(rest.trim_start_matches('/'))
        }
        _ => Utf8PathBuf::from(raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skip_older_units() {
        assert_eq!(parse_skip_older("30 days").unwrap(), chrono::Duration::days(30));
        assert_eq!(parse_skip_older("1 week").unwrap(), chrono::Duration::weeks(1));
        assert_eq!(parse_skip_older("90 Minutes").unwrap(), chrono::Duration::minutes(90));
        assert_eq!(parse_skip_older("5 seconds").unwrap(), chrono::Duration::seconds(5));
        assert!(parse_skip_older("30").is_err());
        assert!(parse_skip_older("ten days").is_err());
        assert!(parse_skip_older("3 fortnights").is_err());
        assert!(parse_skip_older("-1 days").is_err());
    }

    #[test]
    fn threads_are_clamped() {
        assert_eq!(clamp_threads(0), 1);
        assert_eq!(clamp_threads(8), 8);
        assert_eq!(clamp_threads(500), MAX_DOWNLOAD_THREADS);
    }

    #[test]
    fn domain_is_cut_from_the_seed() {
        let config = Config {
            download_root: "http://127.0.0.1:8080/dirlist.php?dir=subs/".into(),
            ..Config::default()
        };
        assert_eq!(config.domain_url(), "http://127.0.0.1:8080");
        assert_eq!(Config::default().domain_url(), kitsu_core::KITSUNEKKO_DOMAIN_URL);
    }

    #[test]
    fn tilde_is_expanded() {
        let config = Config::default();
        let path = config.destination_path();
        assert!(path.ends_with("kitsunekko"));
        assert!(!path.as_str().starts_with('~'));
        assert_eq!(expand_tilde("/srv/subs"), Utf8PathBuf::from("/srv/subs"));
        assert_eq!(expand_tilde("~user/subs"), Utf8PathBuf::from("~user/subs"));
    }

    #[test]
    fn empty_proxy_means_direct() {
        let config = Config {
            proxy: "  ".into(),
            ..Config::default()
        };
        assert_eq!(config.proxy_url(), None);
        assert_eq!(Config::default().proxy_url(), Some("socks5://127.0.0.1:9050"));
    }
}
