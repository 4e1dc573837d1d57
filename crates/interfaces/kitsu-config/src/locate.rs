use crate::{Config, ConfigError};
use camino::{Utf8Path, Utf8PathBuf};
use kitsu_core::PROG_NAME;
use tracing::{debug, info};

pub const CONFIG_FILENAME: &str = "kitsunekko-tools.toml";

/// Candidate config files, most specific first.
pub fn config_locations() -> Vec<Utf8PathBuf> {
    let mut locations = Vec::new();

    let xdg = std::env::var("XDG_CONFIG_HOME")
        .ok()
        .filter(|v| !v.is_empty())
        .map(Utf8PathBuf::from);
    let platform = directories::ProjectDirs::from("", "", PROG_NAME)
        .and_then(|dirs| Utf8PathBuf::from_path_buf(dirs.config_dir().to_path_buf()).ok());
    match xdg {
        Some(base) => locations.push(base.join(PROG_NAME).join(CONFIG_FILENAME)),
        None => locations.extend(platform.map(|dir| dir.join(CONFIG_FILENAME))),
    }

    if let Some(home) = directories::BaseDirs::new()
        .and_then(|dirs| Utf8PathBuf::from_path_buf(dirs.home_dir().to_path_buf()).ok())
    {
        locations.push(home.join(CONFIG_FILENAME));
    }
    locations.push(
        Utf8PathBuf::from("/etc")
            .join(PROG_NAME)
            .join(CONFIG_FILENAME),
    );
    locations
}

/// The config file in use. An explicit path must exist; otherwise the first
/// existing candidate wins.
pub fn locate_config(explicit: Option<&Utf8Path>) -> Result<Utf8PathBuf, ConfigError> {
    let searched = match explicit {
        Some(path) => vec![path.to_path_buf()],
        None => config_locations(),
    };
    match searched.iter().find(|p| p.is_file()) {
        Some(found) => {
            debug!("using config file {found}");
            Ok(found.clone())
        }
        None => Err(ConfigError::NotFound { searched }),
    }
}

pub fn load_config(explicit: Option<&Utf8Path>) -> Result<(Utf8PathBuf, Config), ConfigError> {
    let path = locate_config(explicit)?;
    let config = Config::load(&path)?;
    Ok((path, config))
}

/// Write the default settings. Never overwrites an existing file.
pub fn create_config(explicit: Option<&Utf8Path>) -> Result<Utf8PathBuf, ConfigError> {
    let target = match explicit {
        Some(path) => path.to_path_buf(),
        None => config_locations()
            .into_iter()
            .next()
            .ok_or_else(|| ConfigError::Invalid("no config location available".into()))?,
    };
    if target.exists() {
        return Err(ConfigError::AlreadyExists(target));
    }

    let io_err = |source: std::io::Error| ConfigError::Io {
        path: target.clone(),
        source,
    };
    if let Some(parent) = target.parent().filter(|p| !p.as_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    let body = Config::default().to_toml()?;
    std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&target)
        .and_then(|mut file| std::io::Write::write_all(&mut file, body.as_bytes()))
        .map_err(io_err)?;
    info!("created config file {target}");
    Ok(target)
}
