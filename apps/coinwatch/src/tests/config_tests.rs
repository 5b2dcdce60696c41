use std::{
    collections::HashMap,
    env,
    time::{SystemTime, UNIX_EPOCH},
};

use super::*;

fn temp_config(contents: &str) -> std::path::PathBuf {
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    let path = env::temp_dir().join(format!("coinwatch_config_test_{suffix}.toml"));
    fs::write(&path, contents).expect("write config");
    path
}

#[test]
fn normalizes_plain_file_path_to_sqlite_url() {
    assert_eq!(
        normalize_database_url("./data/test.db"),
        "sqlite://./data/test.db"
    );
    assert_eq!(
        normalize_database_url("sqlite:data\\win.db"),
        "sqlite://data/win.db"
    );
    assert_eq!(normalize_database_url("sqlite::memory:"), "sqlite::memory:");
}

#[test]
fn missing_file_and_env_keep_defaults() {
    let (settings, warnings) =
        load_settings_with(Some(Path::new("/definitely/not/here.toml")), |_| None);
    assert_eq!(settings, Settings::default());
    assert!(warnings.is_empty());
    assert_eq!(settings.request_timeout(), Duration::from_secs(15));
}

#[test]
fn file_values_override_defaults_and_env_overrides_file() {
    let path = temp_config(
        r#"
api_base_url = "http://localhost:9000/v1/"
request_timeout_secs = 3
currency = "EUR"
coins_limit = 25
"#,
    );
    let env_vars: HashMap<&str, &str> = [
        ("APP__API_BASE_URL", "http://override.test/"),
        ("APP__REQUEST_TIMEOUT_SECS", "not-a-number"),
        ("APP__DATABASE_URL", "sqlite::memory:"),
    ]
    .into_iter()
    .collect();

    let (settings, warnings) = load_settings_with(Some(&path), |key| {
        env_vars.get(key).map(|v| v.to_string())
    });
    fs::remove_file(&path).expect("cleanup");

    assert_eq!(settings.api_base_url, "http://override.test/");
    assert_eq!(settings.request_timeout_secs, 3);
    assert_eq!(settings.currency, "EUR");
    assert_eq!(settings.coins_limit, 25);
    assert_eq!(settings.news_limit, 50);
    assert_eq!(settings.database_url, "sqlite::memory:");
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("APP__REQUEST_TIMEOUT_SECS"));
}

#[test]
fn malformed_file_is_ignored_and_reported() {
    let path = temp_config("coins_limit = \"many\"");
    let (settings, warnings) = load_settings_with(Some(&path), |_| None);
    fs::remove_file(&path).expect("cleanup");
    assert_eq!(settings, Settings::default());
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].starts_with("ignoring unreadable config file"));
    assert!(warnings[0].contains(&path.display().to_string()));
}
