use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use serde::Deserialize;

const SETTINGS_FILE: &str = "server.toml";

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Settings {
    pub server_bind: String,
    pub database_url: String,
    pub upload_dir: PathBuf,
    pub recent_chats_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "127.0.0.1:5000".into(),
            database_url: "sqlite://./data/docchat.db".into(),
            upload_dir: PathBuf::from("uploads"),
            recent_chats_dir: PathBuf::from("recent_chats"),
            max_upload_bytes: 32 * 1024 * 1024,
            gemini_api_key: None,
            gemini_model: server_api::generator::DEFAULT_GEMINI_MODEL.into(),
        }
    }
}

impl Settings {
    pub fn recent_chats_path(&self) -> PathBuf {
        self.recent_chats_dir.join("chats.json")
    }
}

pub fn load_settings() -> Settings {
    let file = fs::read_to_string(SETTINGS_FILE).ok();
    load_settings_from(file.as_deref(), |key| std::env::var(key).ok())
}

/// Defaults, then `server.toml` keys, then environment variables.
pub fn load_settings_from(
    file_contents: Option<&str>,
    env: impl Fn(&str) -> Option<String>,
) -> Settings {
    let mut settings = Settings::default();

    if let Some(raw) = file_contents {
        if let Ok(file_cfg) = toml::from_str::<HashMap<String, String>>(raw) {
            if let Some(v) = file_cfg.get("bind_addr") {
                settings.server_bind = v.clone();
            }
            if let Some(v) = file_cfg.get("database_url") {
                settings.database_url = v.clone();
            }
            if let Some(v) = file_cfg.get("upload_dir") {
                settings.upload_dir = PathBuf::from(v);
            }
            if let Some(v) = file_cfg.get("recent_chats_dir") {
                settings.recent_chats_dir = PathBuf::from(v);
            }
            if let Some(v) = file_cfg.get("max_upload_bytes") {
                if let Ok(parsed) = v.parse::<usize>() {
                    settings.max_upload_bytes = parsed;
                }
            }
            if let Some(v) = file_cfg.get("gemini_model") {
                settings.gemini_model = v.clone();
            }
        }
    }

    if let Some(v) = env("SERVER_BIND") {
        settings.server_bind = v;
    }
    if let Some(v) = env("APP__BIND_ADDR") {
        settings.server_bind = v;
    }

    if let Some(v) = env("DATABASE_URL") {
        settings.database_url = v;
    }
    if let Some(v) = env("APP__DATABASE_URL") {
        settings.database_url = v;
    }

    if let Some(v) = env("APP__UPLOAD_DIR") {
        settings.upload_dir = PathBuf::from(v);
    }
    if let Some(v) = env("APP__RECENT_CHATS_DIR") {
        settings.recent_chats_dir = PathBuf::from(v);
    }

    if let Some(v) = env("APP__MAX_UPLOAD_BYTES") {
        if let Ok(parsed) = v.parse::<usize>() {
            settings.max_upload_bytes = parsed;
        }
    }

    if let Some(v) = env("GOOGLE_API_KEY") {
        settings.gemini_api_key = Some(v);
    }
    if let Some(v) = env("APP__GEMINI_API_KEY") {
        settings.gemini_api_key = Some(v);
    }
    settings.gemini_api_key = settings
        .gemini_api_key
        .filter(|key| !key.trim().is_empty());

    if let Some(v) = env("APP__GEMINI_MODEL") {
        settings.gemini_model = v;
    }

    settings
}

pub fn prepare_database_url(raw_database_url: &str) -> anyhow::Result<String> {
    let database_url = normalize_database_url(raw_database_url);
    ensure_parent_dir_exists(&database_url)?;
    Ok(database_url)
}

fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return Settings::default().database_url;
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

fn ensure_parent_dir_exists(database_url: &str) -> anyhow::Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url == "sqlite::memory:" || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
