use camino::Utf8PathBuf;
use kitsu_config::{create_config, load_config, locate_config, Config, ConfigError};
use tempfile::tempdir;

fn temp_root() -> (tempfile::TempDir, Utf8PathBuf) {
    let tmp = tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).unwrap();
    (tmp, root)
}

#[test]
fn created_file_loads_back_as_defaults() {
    let (_tmp, root) = temp_root();
    let path = root.join("nested").join("kitsunekko-tools.toml");

    assert_eq!(create_config(Some(&path)).unwrap(), path);
    let (found, mut config) = load_config(Some(&path)).unwrap();
    assert_eq!(found, path);

    // The process environment may carry overrides; compare the rest.
    let defaults = Config::default();
    config.api_key = defaults.api_key.clone();
    config.api_url = defaults.api_url.clone();
    assert_eq!(config, defaults);
    assert_eq!(config.download_threads, 8);
    assert_eq!(config.skip_older_duration().unwrap(), chrono::Duration::days(30));
    assert!(config.headers["User-Agent"].contains("Firefox"));
}

#[test]
fn create_refuses_to_overwrite() {
    let (_tmp, root) = temp_root();
    let path = root.join("kitsunekko-tools.toml");
    std::fs::write(&path, "timeout = 5\n").unwrap();

    let err = create_config(Some(&path)).unwrap_err();
    assert!(matches!(err, ConfigError::AlreadyExists(p) if p == path));
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "timeout = 5\n");
}

#[test]
fn partial_file_keeps_remaining_defaults() {
    let (_tmp, root) = temp_root();
    let path = root.join("kitsunekko-tools.toml");
    std::fs::write(
        &path,
        "destination = \"/srv/subs\"\nproxy = \"\"\ndownload_threads = 99\n\n[headers]\nUser-Agent = \"test\"\n",
    )
    .unwrap();

    let config = Config::load(&path).unwrap();
    assert_eq!(config.destination_path(), Utf8PathBuf::from("/srv/subs"));
    assert_eq!(config.proxy_url(), None);
    assert_eq!(config.threads(), 32);
    assert_eq!(config.timeout, 120);
    assert_eq!(config.headers.len(), 1);
}

#[test]
fn bad_values_are_rejected() {
    let (_tmp, root) = temp_root();
    let path = root.join("kitsunekko-tools.toml");

    std::fs::write(&path, "download_root = \"https://example.org/subs/\"\n").unwrap();
    assert!(matches!(Config::load(&path), Err(ConfigError::Invalid(_))));

    std::fs::write(&path, "skip_older = \"soon\"\n").unwrap();
    assert!(matches!(Config::load(&path), Err(ConfigError::Invalid(_))));

    std::fs::write(&path, "timeout = \"long\"\n").unwrap();
    assert!(matches!(Config::load(&path), Err(ConfigError::Parse { .. })));
}

#[test]
fn environment_overrides_api_settings() {
    let mut config = Config::default();
    config.apply_env_overrides(|key| match key {
        "KITSU_API_KEY" => Some("token".into()),
        "KITSU_API_URL" => Some("http://localhost:9000".into()),
        _ => None,
    });
    assert_eq!(config.api_key, "token");
    assert_eq!(config.api_url, "http://localhost:9000");

    config.apply_env_overrides(|key| (key == "KITSU_API_URL").then(String::new));
    assert_eq!(config.api_url, "http://localhost:9000");
}

#[test]
fn missing_explicit_file_is_not_found() {
    let (_tmp, root) = temp_root();
    let path = root.join("absent.toml");
    match locate_config(Some(&path)) {
        Err(err @ ConfigError::NotFound { .. }) => {
            assert!(err.to_string().ends_with(path.as_str()));
            let ConfigError::NotFound { searched } = err else { unreachable!() };
            assert_eq!(searched, vec![path]);
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn destination_must_exist() {
    let (_tmp, root) = temp_root();
    let config = Config {
        destination: root.join("missing").to_string(),
        ..Config::default()
    };
    assert!(matches!(
        config.existing_destination(),
        Err(ConfigError::DestinationNotFound(_))
    ));

    let config = Config {
        destination: root.to_string(),
        ..Config::default()
    };
    assert_eq!(config.existing_destination().unwrap(), root);
}

#[test]
fn shown_settings_parse_back() {
    let config = Config {
        api_key: "abc".into(),
        ..Config::default()
    };
    let shown = config.to_toml().unwrap();
    let parsed: Config = toml::from_str(&shown).unwrap();
    assert_eq!(parsed, config);
}
