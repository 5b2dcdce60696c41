use std::{fs, path::Path, time::Duration};

use serde::Deserialize;

pub const DEFAULT_CONFIG_FILE: &str = "coinwatch.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub api_base_url: String,
    pub request_timeout_secs: u64,
    pub database_url: String,
    pub currency: String,
    pub coins_limit: u32,
    pub news_limit: u32,
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.coinstats.app/public/v1/".into(),
            request_timeout_secs: 15,
            database_url: default_database_url(),
            currency: "USD".into(),
            coins_limit: 100,
            news_limit: 50,
            log_filter: "info".into(),
        }
    }
}

impl Settings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileSettings {
    api_base_url: Option<String>,
    request_timeout_secs: Option<u64>,
    database_url: Option<String>,
    currency: Option<String>,
    coins_limit: Option<u32>,
    news_limit: Option<u32>,
    log_filter: Option<String>,
}

/// Defaults, then the config file (`coinwatch.toml` unless `path` is given),
/// then environment overrides.
///
/// Loading runs before logging is set up, so skipped inputs come back as
/// warnings for the caller to report.
pub fn load_settings(path: Option<&Path>) -> (Settings, Vec<String>) {
    load_settings_with(path, |key| std::env::var(key).ok())
}

fn load_settings_with(
    path: Option<&Path>,
    env: impl Fn(&str) -> Option<String>,
) -> (Settings, Vec<String>) {
    let mut settings = Settings::default();
    let mut warnings = Vec::new();

    let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
    if let Ok(raw) = fs::read_to_string(path) {
        match toml::from_str::<FileSettings>(&raw) {
            Ok(file_cfg) => apply_file(&mut settings, file_cfg),
            Err(err) => warnings.push(format!(
                "ignoring unreadable config file '{}': {err}",
                path.display()
            )),
        }
    }

    if let Some(v) = env("COINWATCH_API_URL") {
        settings.api_base_url = v;
    }
    if let Some(v) = env("APP__API_BASE_URL") {
        settings.api_base_url = v;
    }

    if let Some(v) = env("APP__REQUEST_TIMEOUT_SECS") {
        match v.parse::<u64>() {
            Ok(parsed) => settings.request_timeout_secs = parsed,
            Err(_) => warnings.push(format!(
                "ignoring APP__REQUEST_TIMEOUT_SECS={v:?}: not a number"
            )),
        }
    }

    if let Some(v) = env("DATABASE_URL") {
        settings.database_url = v;
    }
    if let Some(v) = env("APP__DATABASE_URL") {
        settings.database_url = v;
    }

    if let Some(v) = env("APP__CURRENCY") {
        settings.currency = v;
    }

    if let Some(v) = env("APP__LOG_FILTER") {
        settings.log_filter = v;
    }

    (settings, warnings)
}

fn apply_file(settings: &mut Settings, file_cfg: FileSettings) {
    if let Some(v) = file_cfg.api_base_url {
        settings.api_base_url = v;
    }
    if let Some(v) = file_cfg.request_timeout_secs {
        settings.request_timeout_secs = v;
    }
    if let Some(v) = file_cfg.database_url {
        settings.database_url = v;
    }
    if let Some(v) = file_cfg.currency {
        settings.currency = v;
    }
    if let Some(v) = file_cfg.coins_limit {
        settings.coins_limit = v;
    }
    if let Some(v) = file_cfg.news_limit {
        settings.news_limit = v;
    }
    if let Some(v) = file_cfg.log_filter {
        settings.log_filter = v;
    }
}

fn default_database_url() -> String {
    match dirs::data_dir() {
        Some(dir) => sqlite_url_for_path(&dir.join("coinwatch").join("coinwatch.db")),
        None => "sqlite://./data/coinwatch.db".into(),
    }
}

fn sqlite_url_for_path(path: &Path) -> String {
    format!("sqlite://{}", path.display().to_string().replace('\\', "/"))
}

pub fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return default_database_url();
    }

    if raw_database_url.starts_with("sqlite::memory:")
        || raw_database_url.starts_with("sqlite://")
        || raw_database_url.contains("://")
    {
        return raw_database_url.to_string();
    }

    if let Some(path) = raw_database_url.strip_prefix("sqlite:") {
        let path = path.replace('\\', "/");
        return format!("sqlite://{path}");
    }

    format!("sqlite://{}", raw_database_url.replace('\\', "/"))
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
