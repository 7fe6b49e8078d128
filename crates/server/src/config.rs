use std::{collections::HashMap, fs};

const SETTINGS_FILE: &str = "server.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub server_bind: String,
    pub database_url: String,
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "127.0.0.1:8000".into(),
            database_url: "sqlite://./data/recipes.db".into(),
            log_filter: "info".into(),
        }
    }
}

/// Defaults, then `server.toml` in the working directory, then environment variables.
pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(SETTINGS_FILE) {
        apply_file_overrides(&mut settings, &raw);
    }
    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());

    settings
}

pub(crate) fn apply_file_overrides(settings: &mut Settings, raw: &str) {
    // Malformed files are ignored; logging is not initialised yet at this point.
    let Ok(file_cfg) = toml::from_str::<HashMap<String, String>>(raw) else {
        return;
    };

    if let Some(v) = file_cfg.get("bind_addr") {
        settings.server_bind = v.clone();
    }
    if let Some(v) = file_cfg.get("database_url") {
        settings.database_url = v.clone();
    }
    if let Some(v) = file_cfg.get("log_filter") {
        settings.log_filter = v.clone();
    }
}

/// Later keys in each list win over earlier ones.
pub(crate) fn apply_env_overrides(
    settings: &mut Settings,
    lookup: impl Fn(&str) -> Option<String>,
) {
    for key in ["SERVER_BIND", "APP__BIND_ADDR"] {
        if let Some(v) = lookup(key) {
            settings.server_bind = v;
        }
    }
    for key in ["DATABASE_URL", "APP__DATABASE_URL"] {
        if let Some(v) = lookup(key) {
            settings.database_url = v;
        }
    }
    for key in ["RUST_LOG", "APP__LOG_FILTER"] {
        if let Some(v) = lookup(key) {
            settings.log_filter = v;
        }
    }
}

/// Bare file paths become `sqlite://` urls; `sqlite:` urls pass through.
pub fn normalize_database_url(raw: &str) -> String {
    match raw.trim() {
        "" => Settings::default().database_url,
        url if url.starts_with("sqlite:") => url.to_string(),
        path => format!("sqlite://{path}"),
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
