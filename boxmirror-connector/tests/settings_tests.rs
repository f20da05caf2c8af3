use boxmirror_connector::{load_events, parse_folder_ids, Settings};
use boxmirror_sync::config::KeyStyle;
use boxmirror_sync::MessageQueue;
use boxmirror_types::ItemId;
use pretty_assertions::assert_eq;
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;

fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |name| map.get(name).cloned()
}

// ── Settings file ───────────────────────────────────────────────

#[test]
fn missing_config_path_gives_defaults() {
    let settings = Settings::load(None).unwrap();
    assert_eq!(settings, Settings::default());
    assert_eq!(settings.box_api.api_base_url, "https://api.box.com/2.0");
}

#[test]
fn config_file_is_parsed() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{
            "sync": {{
                "root_folder_ids": ["0"],
                "layout": {{"bucket": "mirror", "key_style": "flat"}}
            }},
            "box": {{"access_token": "from-file", "page_limit": 100}},
            "database_path": "/var/lib/boxmirror/mirror.db"
        }}"#
    )
    .unwrap();

    let settings = Settings::load(Some(file.path())).unwrap();
    assert_eq!(settings.sync.root_folder_ids, vec![ItemId::from("0")]);
    assert_eq!(settings.sync.layout.bucket, "mirror");
    assert_eq!(settings.sync.layout.key_style, KeyStyle::Flat);
    assert_eq!(settings.box_api.access_token, "from-file");
    assert_eq!(settings.box_api.page_limit, 100);
    assert_eq!(
        settings.database_path,
        Some(PathBuf::from("/var/lib/boxmirror/mirror.db"))
    );
    assert_eq!(settings.blob_dir, None);
}

#[test]
fn unreadable_config_reports_path() {
    let err = Settings::load(Some(std::path::Path::new("/nonexistent/connector.json")))
        .unwrap_err();
    assert!(err.to_string().contains("/nonexistent/connector.json"));
}

#[test]
fn invalid_config_is_rejected() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{{\"sync\": 3}}").unwrap();
    assert!(Settings::load(Some(file.path())).is_err());
}

// ── Environment overrides ───────────────────────────────────────

#[test]
fn environment_overrides_file_values() {
    let mut settings = Settings::default();
    settings.box_api.access_token = "from-file".into();
    settings
        .apply_env(env(&[
            ("BOX_ACCESS_TOKEN", "from-env"),
            ("BUCKET_NAME", "env-bucket"),
            ("BOX_ROOT_FOLDER_IDS", "0, 123"),
            ("SKIP_EXISTING_ITEMS", "True"),
        ]))
        .unwrap();

    assert_eq!(settings.box_api.access_token, "from-env");
    assert_eq!(settings.sync.layout.bucket, "env-bucket");
    assert_eq!(
        settings.sync.root_folder_ids,
        vec![ItemId::from("0"), ItemId::from("123")]
    );
    assert!(settings.sync.skip_existing_items);
}

#[test]
fn absent_variables_leave_settings_alone() {
    let mut settings = Settings::default();
    settings.sync.layout.bucket = "kept".into();
    settings.apply_env(env(&[])).unwrap();
    assert_eq!(settings.sync.layout.bucket, "kept");
}

#[test]
fn bad_overrides_are_errors() {
    let mut settings = Settings::default();
    assert!(settings
        .apply_env(env(&[("SKIP_EXISTING_ITEMS", "maybe")]))
        .is_err());
    assert!(settings
        .apply_env(env(&[("BOX_ROOT_FOLDER_IDS", "0,abc")]))
        .is_err());
}

#[test]
fn folder_ids_skip_empty_segments() {
    assert_eq!(
        parse_folder_ids("1,,2,").unwrap(),
        vec![ItemId::from("1"), ItemId::from("2")]
    );
    assert!(parse_folder_ids("").unwrap().is_empty());
}

// ── Event files ─────────────────────────────────────────────────

#[tokio::test]
async fn events_file_becomes_queue() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, r#"{{"trigger": "FILE.TRASHED", "source": {{"id": "10"}}}}"#).unwrap();
    writeln!(file).unwrap();
    writeln!(file, "not json").unwrap();

    let queue = load_events(file.path()).await.unwrap();
    assert_eq!(queue.pending_len().await, 2);
    let batch = queue.receive(10).await.unwrap();
    assert_eq!(batch[1].body, "not json");
}

#[tokio::test]
async fn missing_events_file_is_an_error() {
    assert!(load_events(std::path::Path::new("/nonexistent/events.jsonl"))
        .await
        .is_err());
}
