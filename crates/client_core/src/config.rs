use std::{collections::HashMap, fs, path::Path};

use serde::Deserialize;
use tracing::warn;
use url::Url;

use crate::error::ClientError;

pub const DEFAULT_BASE_URL: &str = "https://heewon.shop";
pub const SETTINGS_FILE: &str = "survey_client.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientSettings {
    pub base_url: String,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
        }
    }
}

impl ClientSettings {
    pub fn with_base_url(base_url: impl AsRef<str>) -> Result<Self, ClientError> {
        Ok(Self {
            base_url: normalize_base_url(base_url.as_ref())?,
        })
    }
}

/// Defaults, then `survey_client.toml` in the working directory, then
/// `SURVEY_BASE_URL`, then `APP__BASE_URL`.
pub fn load_settings() -> ClientSettings {
    load_settings_from(Path::new(SETTINGS_FILE), |key| std::env::var(key).ok())
}

pub(crate) fn load_settings_from(
    file: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> ClientSettings {
    let mut candidate: Option<String> = None;

    if let Ok(raw) = fs::read_to_string(file) {
        match toml::from_str::<HashMap<String, String>>(&raw) {
            Ok(file_cfg) => {
                if let Some(v) = file_cfg.get("base_url") {
                    candidate = Some(v.clone());
                }
            }
            Err(err) => warn!(path = %file.display(), "ignoring unreadable settings file: {err}"),
        }
    }

    if let Some(v) = env("SURVEY_BASE_URL") {
        candidate = Some(v);
    }
    if let Some(v) = env("APP__BASE_URL") {
        candidate = Some(v);
    }

    let mut settings = ClientSettings::default();
    if let Some(raw) = candidate.filter(|v| !v.trim().is_empty()) {
        match normalize_base_url(&raw) {
            Ok(base_url) => settings.base_url = base_url,
            Err(err) => warn!("{err}; falling back to {DEFAULT_BASE_URL}"),
        }
    }
    settings
}

/// Validates the url and strips trailing slashes so paths can be appended
/// with a single `/`.
pub fn normalize_base_url(raw: &str) -> Result<String, ClientError> {
    let trimmed = raw.trim().trim_end_matches('/');
    let parsed = Url::parse(trimmed).map_err(|e| ClientError::InvalidBaseUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ClientError::InvalidBaseUrl {
            url: raw.to_string(),
            reason: format!("unsupported scheme '{}'", parsed.scheme()),
        });
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
