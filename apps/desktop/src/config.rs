use std::{collections::HashMap, fs, path::Path};

use client_core::{http::DEFAULT_SIGNUP_EMAIL_DOMAIN, runtime::DEFAULT_HISTORY_LIMIT};
use tracing::warn;

pub const DEFAULT_CONFIG_FILE: &str = "desktop.toml";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub server_url: String,
    /// REST root; derived from `server_url` when unset.
    pub api_base: Option<String>,
    pub history_limit: u32,
    pub signup_email_domain: String,
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:3000".into(),
            api_base: None,
            history_limit: DEFAULT_HISTORY_LIMIT,
            signup_email_domain: DEFAULT_SIGNUP_EMAIL_DOMAIN.into(),
            log_filter: "info".into(),
        }
    }
}

impl Settings {
    pub fn api_base(&self) -> String {
        match &self.api_base {
            Some(api_base) => api_base.clone(),
            None => format!("{}/api/v1", self.server_url.trim_end_matches('/')),
        }
    }
}

/// Problem found while loading settings. Loading happens before the log
/// filter is known, so these are reported once tracing is installed.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigWarning {
    UnreadableFile { error: String },
    InvalidValue { key: &'static str, value: String },
}

impl ConfigWarning {
    pub fn log(&self) {
        match self {
            ConfigWarning::UnreadableFile { error } => {
                warn!(%error, "ignoring unreadable desktop config")
            }
            ConfigWarning::InvalidValue { key, value } => {
                warn!(key, %value, "ignoring invalid config value")
            }
        }
    }
}

pub fn load_settings(path: &Path) -> (Settings, Vec<ConfigWarning>) {
    let raw = fs::read_to_string(path).ok();
    load_settings_from(raw.as_deref(), |key| std::env::var(key).ok())
}

/// Defaults, then the flat `key = "value"` file, then `APP__*` variables.
pub fn load_settings_from(
    raw: Option<&str>,
    env: impl Fn(&str) -> Option<String>,
) -> (Settings, Vec<ConfigWarning>) {
    let mut settings = Settings::default();
    let mut warnings = Vec::new();

    if let Some(raw) = raw {
        match toml::from_str::<HashMap<String, String>>(raw) {
            Ok(file_cfg) => apply_layer(&mut settings, &mut warnings, |key| {
                file_cfg.get(key).cloned()
            }),
            Err(err) => warnings.push(ConfigWarning::UnreadableFile {
                error: err.to_string(),
            }),
        }
    }

    apply_layer(&mut settings, &mut warnings, |key| {
        env(&format!("APP__{}", key.to_uppercase()))
    });
    (settings, warnings)
}

fn apply_layer(
    settings: &mut Settings,
    warnings: &mut Vec<ConfigWarning>,
    lookup: impl Fn(&str) -> Option<String>,
) {
    if let Some(v) = lookup("server_url") {
        settings.server_url = v;
    }
    if let Some(v) = lookup("api_base") {
        settings.api_base = Some(v);
    }
    if let Some(v) = lookup("history_limit") {
        match v.parse::<u32>() {
            Ok(parsed) => settings.history_limit = parsed,
            Err(_) => warnings.push(ConfigWarning::InvalidValue {
                key: "history_limit",
                value: v,
            }),
        }
    }
    if let Some(v) = lookup("signup_email_domain") {
        settings.signup_email_domain = v;
    }
    if let Some(v) = lookup("log_filter") {
        settings.log_filter = v;
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
