use std::{fs, path::Path};

use anyhow::Context;
use client_core::DEFAULT_API_BASE_URL;
use serde::Deserialize;

pub const DEFAULT_CONFIG_FILE: &str = "dentefier.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub api_base_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.into(),
            username: None,
            password: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    api_base_url: Option<String>,
    username: Option<String>,
    password: Option<String>,
}

/// Defaults, then the TOML file (if present), then environment overrides.
pub fn load_settings(config_path: &Path) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    if config_path.exists() {
        let raw = fs::read_to_string(config_path)
            .with_context(|| format!("failed to read '{}'", config_path.display()))?;
        apply_file(&mut settings, &raw)
            .with_context(|| format!("invalid settings in '{}'", config_path.display()))?;
    }

    apply_env(&mut settings, |key| std::env::var(key).ok());
    settings.api_base_url = normalize_api_base_url(&settings.api_base_url);
    Ok(settings)
}

fn apply_file(settings: &mut Settings, raw: &str) -> anyhow::Result<()> {
    let file_cfg: FileSettings = toml::from_str(raw)?;
    if let Some(v) = file_cfg.api_base_url {
        settings.api_base_url = v;
    }
    if let Some(v) = file_cfg.username {
        settings.username = Some(v);
    }
    if let Some(v) = file_cfg.password {
        settings.password = Some(v);
    }
    Ok(())
}

fn apply_env(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("DENTEFIER_API_URL") {
        settings.api_base_url = v;
    }
    if let Some(v) = lookup("APP__API_URL") {
        settings.api_base_url = v;
    }

    if let Some(v) = lookup("DENTEFIER_USERNAME") {
        settings.username = Some(v);
    }
    if let Some(v) = lookup("APP__USERNAME") {
        settings.username = Some(v);
    }

    if let Some(v) = lookup("DENTEFIER_PASSWORD") {
        settings.password = Some(v);
    }
    if let Some(v) = lookup("APP__PASSWORD") {
        settings.password = Some(v);
    }
}

fn normalize_api_base_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Settings::default().api_base_url;
    }
    trimmed.to_string()
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
