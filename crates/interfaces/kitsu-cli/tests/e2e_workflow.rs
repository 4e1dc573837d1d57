use axum::extract::Path;
use axum::http::{header, Uri};
use axum::response::IntoResponse;
use axum::{routing::get, Router};
use camino::Utf8PathBuf;
use chrono::{Duration, Utc};
use kitsu_cli::{commands, SyncFlags};
use kitsu_config::load_config;
use kitsu_pipeline::SanitizeOptions;
use std::net::SocketAddr;
use tempfile::tempdir;

const FILES: [&str; 3] = ["Mock Show - 01.srt", "Mock Show - 02.ass", "notes.txt"];

async fn start_mock_api() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let modified = (Utc::now() - Duration::days(1))
        .format("%Y-%m-%dT%H:%M:%SZ")
        .to_string();

    let search = {
        let modified = modified.clone();
        move |uri: Uri| {
            let modified = modified.clone();
            async move {
                let body = if uri.query().unwrap_or_default().contains("anime=true") {
                    format!(
                        r#"[{{"id":7,"name":"Mock Show","flags":{{"anime":true,"movie":false}},"last_modified":"{modified}","english_name":"Mock Show"}}]"#
                    )
                } else {
                    "[]".to_string()
                };
                ([(header::CONTENT_TYPE, "application/json")], body)
            }
        }
    };

    let files = move |Path(_id): Path<u64>| {
        let modified = modified.clone();
        async move {
            let items: Vec<String> = FILES
                .iter()
                .map(|name| {
                    format!(
                        r#"{{"url":"http://{addr}/download/{}","name":"{name}","size":8,"last_modified":"{modified}"}}"#,
                        name.replace(' ', "%20")
                    )
                })
                .collect();
            (
                [(header::CONTENT_TYPE, "application/json")],
                format!("[{}]", items.join(",")),
            )
        }
    };

    let app = Router::new()
        .route("/api/entries/search", get(search))
        .route("/api/entries/:id/files", get(files))
        .route(
            "/download/*name",
            get(|Path(name): Path<String>| async move { format!("text of {name}").into_response() }),
        );
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

#[tokio::test]
async fn sync_sanitize_build_and_ignore() {
    let addr = start_mock_api().await;
    let tmp = tempdir().unwrap();
    let base = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).unwrap();
    let root = base.join("mirror");
    std::fs::create_dir_all(&root).unwrap();

    let config_path = base.join("kitsunekko-tools.toml");
    std::fs::write(
        &config_path,
        format!(
            "destination = \"{root}\"\nproxy = \"\"\napi_url = \"http://{addr}\"\napi_key = \"secret\"\ndownload_threads = 4\n"
        ),
    )
    .unwrap();
    let (_, mut config) = load_config(Some(&config_path)).unwrap();
    config.api_url = format!("http://{addr}");

    // 1. First sync downloads the subtitles and blocks the rest.
    let api = SyncFlags {
        api: true,
        ..SyncFlags::default()
    };
    let first = commands::cmd_sync(&config, &api).await.unwrap();
    assert_eq!(first.downloads.saved, 2);
    assert_eq!(first.downloads.blocked_file_type, 1);
    let show = root.join("anime_tv").join("Mock Show");
    assert!(show.join(FILES[0]).is_file());
    assert!(show.join(FILES[1]).is_file());
    assert!(!show.join(FILES[2]).exists());
    assert!(root.join(".updated").is_file());

    // 2. A loose copy made by hand is folded back into the show.
    let loose = root.join("mock-show");
    std::fs::create_dir_all(&loose).unwrap();
    std::fs::write(loose.join("Mock Show - 03.srt"), "extra").unwrap();
    let report = commands::cmd_sanitize(&config, SanitizeOptions::default()).unwrap();
    assert_eq!(report.orphans_merged, 1);
    assert!(report.failures.is_empty());
    assert!(show.join("Mock Show - 03.srt").is_file());
    assert!(!loose.exists());

    // 3. The catalog lists the show with all of its files.
    let catalog_path = commands::cmd_build(&config).unwrap();
    let catalog: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&catalog_path).unwrap()).unwrap();
    let entries = catalog.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["name"], "Mock Show");
    assert_eq!(entries[0]["entry_type"], "anime_tv");
    let names: Vec<&str> = entries[0]["files"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["name"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"Mock Show - 03.srt"));
    assert!(names.contains(&FILES[0]));

    // 4. After ledgering everything a forced sync saves nothing new.
    assert!(commands::cmd_ignore_add_all(&config).unwrap() >= 1);
    let forced = SyncFlags {
        api: true,
        full: true,
        ignore_dir_mod_times: true,
        accept_file_types: Some(vec!["srt".into(), "ass".into()]),
    };
    let second = commands::cmd_sync(&config, &forced).await.unwrap();
    assert_eq!(second.downloads.saved, 0);
    assert_eq!(second.downloads.already_exists, 2);
    assert_eq!(second.downloads.blocked_file_type, 1);
}

#[test]
fn config_commands_work_on_an_explicit_path() {
    let tmp = tempdir().unwrap();
    let path = Utf8PathBuf::from_path_buf(tmp.path().join("kitsunekko-tools.toml")).unwrap();

    assert_eq!(commands::cmd_config_create(Some(&path)).unwrap(), path);
    assert!(commands::cmd_config_create(Some(&path)).is_err());
    assert_eq!(commands::cmd_config_locate(Some(&path)).unwrap(), path);
    let shown = commands::cmd_config_show(Some(&path)).unwrap();
    assert!(shown.contains("download_root"));
    assert!(shown.contains("[headers]"));
}

#[test]
fn commands_refuse_a_missing_destination() {
    let tmp = tempdir().unwrap();
    let config = kitsu_config::Config {
        destination: tmp.path().join("nope").to_str().unwrap().to_string(),
        ..kitsu_config::Config::default()
    };
    assert!(commands::cmd_build(&config).is_err());
    assert!(commands::cmd_ignore_add_all(&config).is_err());
}
