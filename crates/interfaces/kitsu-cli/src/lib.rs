pub mod commands;

use kitsu_config::Config;
use kitsu_pipeline::{AccessMode, SyncRequest};

/// Flags of `kitsu sync` that refine the configured request.
#[derive(Debug, Clone, Default)]
pub struct SyncFlags {
    pub full: bool,
    pub api: bool,
    pub ignore_dir_mod_times: bool,
    /// Overrides `allowed_file_types` when set.
    pub accept_file_types: Option<Vec<String>>,
}

/// Translate settings plus command-line flags into one sync request.
pub fn sync_request(config: &Config, flags: &SyncFlags) -> anyhow::Result<SyncRequest> {
    let mode = if flags.api {
        AccessMode::Api
    } else {
        AccessMode::Scrape
    };
    let mut req = SyncRequest::new(config.existing_destination()?, mode);
    req.full = flags.full;
    req.ignore_dir_mod_times = flags.ignore_dir_mod_times;
    req.allowed_file_types = flags
        .accept_file_types
        .clone()
        .unwrap_or_else(|| config.allowed_file_types.clone())
        .into_iter()
        .map(|t| t.trim().trim_start_matches('.').to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();
    req.skip_older = config.skip_older_duration()?;
    req.api_url = config.api_url.trim_end_matches('/').to_string();
    req.api_key = config.api_key.clone();
    req.download_root = config.download_root.clone();
    req.domain_url = config.domain_url();
    req.concurrency = config.threads();
    Ok(req)
}
