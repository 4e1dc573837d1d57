use crate::{sync_request, SyncFlags};
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use kitsu_config::Config;
use kitsu_infra::{build_client, Fetcher, HttpClientSettings};
use kitsu_persistence::{MirrorLayout, SidecarMetaStore};
use kitsu_pipeline::archives::{extract_all, ExtractReport};
use kitsu_pipeline::{
    build_catalog, ignore, DefaultSyncEngine, SanitizeOptions, SanitizeReport, Sanitizer,
    SyncSummary,
};
use std::sync::Arc;

pub fn engine_for(config: &Config) -> Result<DefaultSyncEngine> {
    let settings = HttpClientSettings {
        proxy: config.proxy_url().map(str::to_string),
        timeout: config.http_timeout(),
        headers: config.header_pairs(),
    };
    let client = build_client(&settings).context("Failed to build HTTP client")?;
    let fetcher = Fetcher::new(client).with_requests_per_second(config.requests_per_second);
    Ok(DefaultSyncEngine::with_components(
        fetcher,
        Arc::new(SidecarMetaStore::new()),
    ))
}

fn layout_for(config: &Config) -> Result<MirrorLayout> {
    Ok(MirrorLayout::new(config.existing_destination()?))
}

pub async fn cmd_sync(config: &Config, flags: &SyncFlags) -> Result<SyncSummary> {
    let req = sync_request(config, flags)?;
    println!(":: Syncing into {}", req.destination);
    if req.full {
        println!("   Full pass, skip_older is ignored");
    }

    let engine = engine_for(config)?;
    let summary = engine.run(&req).await?;

    println!("\n:: Sync Result");
    println!("   Directories found:   {}", summary.directories_found);
    println!("   Directories visited: {}", summary.directories_visited);
    println!("   Directories skipped: {}", summary.directories_skipped);
    println!("   Files saved:         {}", summary.downloads.saved);
    println!("   Files failed:        {}", summary.downloads.download_failed);
    if summary.rate_limit_retries > 0 {
        println!("   Rate limit retries:  {}", summary.rate_limit_retries);
    }
    if summary.files_trashed > 0 {
        println!("   Moved to trash:      {}", summary.files_trashed);
    }
    Ok(summary)
}

pub fn cmd_sanitize(config: &Config, opts: SanitizeOptions) -> Result<SanitizeReport> {
    let destination = config.existing_destination()?;
    println!(":: Sanitizing {destination}");
    let report = Sanitizer::new(destination).run(opts)?;
    println!(":: {report}");
    for (dir, reason) in &report.failures {
        println!("   {dir}: {reason}");
    }
    Ok(report)
}

pub fn cmd_build(config: &Config) -> Result<Utf8PathBuf> {
    let layout = layout_for(config)?;
    let target = build_catalog(&layout, &SidecarMetaStore::new())?;
    println!(":: Saved catalog to {target}");
    Ok(target)
}

pub fn cmd_extract_archives(config: &Config) -> Result<ExtractReport> {
    let layout = layout_for(config)?;
    let report = extract_all(&layout)?;
    println!(
        ":: Extracted {} files from {} archives ({} unsupported, {} failed)",
        report.extracted,
        report.archives,
        report.unsupported,
        report.failed.len()
    );
    Ok(report)
}

pub fn cmd_config_create(explicit: Option<&Utf8Path>) -> Result<Utf8PathBuf> {
    let path = kitsu_config::create_config(explicit)?;
    println!(":: Created {path}");
    Ok(path)
}

pub fn cmd_config_locate(explicit: Option<&Utf8Path>) -> Result<Utf8PathBuf> {
    let path = kitsu_config::locate_config(explicit)?;
    println!("{path}");
    Ok(path)
}

pub fn cmd_config_show(explicit: Option<&Utf8Path>) -> Result<String> {
    let (_, config) = kitsu_config::load_config(explicit)?;
    let shown = config.to_toml()?;
    print!("{shown}");
    Ok(shown)
}

pub fn cmd_ignore_add(
    config: &Config,
    paths: &[Utf8PathBuf],
    pattern: Option<&str>,
) -> Result<usize> {
    let mut added = 0;
    if let Some(pattern) = pattern {
        let root = config.existing_destination()?;
        if ignore::add_pattern(&root, pattern)? {
            println!(":: Added pattern {pattern}");
            added += 1;
        } else {
            println!(":: Pattern already present: {pattern}");
        }
    }
    if !paths.is_empty() {
        let count = ignore::add_paths(paths)?;
        println!(":: Ignored {count} files");
        added += count;
    }
    Ok(added)
}

pub fn cmd_ignore_add_all(config: &Config) -> Result<usize> {
    let layout = layout_for(config)?;
    let count = ignore::add_all(&layout)?;
    println!(":: Ignored {count} files");
    Ok(count)
}
