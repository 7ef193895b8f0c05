use crate::compositor::{DEFAULT_MAX_DIMENSION, MAX_CANVAS_DIMENSION};
use crate::drive::client::MAX_PAGE_SIZE;
use crate::genai_client::{DEFAULT_IMAGE_MODEL, DEFAULT_TEXT_MODEL};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const API_KEY_VARS: [&str; 2] = ["GEMINI_API_KEY", "API_KEY"];
pub const CLIENT_ID_VAR: &str = "GOOGLE_CLIENT_ID";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing generative AI API key: set {} in the environment", API_KEY_VARS[0])]
    MissingApiKey,

    #[error("Failed to read settings file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Non-secret settings read from `settings.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FileSettings {
    pub text_model: String,
    pub image_model: String,
    pub max_dimension: u32,
    pub drive_page_size: u32,
    pub drive_max_pages: usize,
    pub consent_timeout_secs: u64,
}

impl Default for FileSettings {
    fn default() -> Self {
        Self {
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            max_dimension: DEFAULT_MAX_DIMENSION,
            drive_page_size: MAX_PAGE_SIZE,
            drive_max_pages: 10,
            consent_timeout_secs: 300,
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub api_key: String,
    /// Drive browsing is disabled without it.
    pub google_client_id: Option<String>,
    pub settings: FileSettings,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &"<redacted>")
            .field("google_client_id", &self.google_client_id)
            .field("settings", &self.settings)
            .finish()
    }
}

impl AppConfig {
    /// Loads settings from the config directory and secrets from the
    /// process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let settings = match default_settings_path() {
            Some(path) => load_settings(&path)?,
            None => FileSettings::default(),
        };
        Self::from_sources(settings, |name| std::env::var(name).ok())
    }

    pub fn from_sources<F>(settings: FileSettings, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| env(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let api_key = API_KEY_VARS
            .iter()
            .find_map(|name| non_empty(*name))
            .ok_or(ConfigError::MissingApiKey)?;
        let google_client_id = non_empty(CLIENT_ID_VAR);
        if google_client_id.is_none() {
            log::warn!("{} is not set; Google Drive browsing is disabled", CLIENT_ID_VAR);
        }

        let mut settings = settings;
        if settings.max_dimension == 0 {
            log::warn!("max_dimension must be positive; using {}", DEFAULT_MAX_DIMENSION);
            settings.max_dimension = DEFAULT_MAX_DIMENSION;
        } else if settings.max_dimension > MAX_CANVAS_DIMENSION {
            log::warn!(
                "max_dimension {} exceeds the {} limit; clamping",
                settings.max_dimension,
                MAX_CANVAS_DIMENSION
            );
            settings.max_dimension = MAX_CANVAS_DIMENSION;
        }
        settings.drive_page_size = settings.drive_page_size.clamp(1, MAX_PAGE_SIZE);

        Ok(Self {
            api_key,
            google_client_id,
            settings,
        })
    }

    pub fn drive_enabled(&self) -> bool {
        self.google_client_id.is_some()
    }

    pub fn consent_timeout(&self) -> Duration {
        Duration::from_secs(self.settings.consent_timeout_secs.max(1))
    }
}

pub fn default_settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("OutpaintStudio").join("settings.json"))
}

/// Reads `path`, falling back to defaults when the file does not exist.
pub fn load_settings(path: &Path) -> Result<FileSettings, ConfigError> {
    if !path.exists() {
        log::debug!("No settings file at {:?}; using defaults", path);
        return Ok(FileSettings::default());
    }

    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let settings = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    log::info!("✅ Loaded settings from {:?}", path);
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn test_missing_api_key_is_fatal() {
        let err = AppConfig::from_sources(FileSettings::default(), env(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingApiKey));

        let err = AppConfig::from_sources(FileSettings::default(), env(&[("GEMINI_API_KEY", "  ")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingApiKey));
    }

    #[test]
    fn test_api_key_fallback_and_client_id() {
        let config =
            AppConfig::from_sources(FileSettings::default(), env(&[("API_KEY", "k2")])).unwrap();
        assert_eq!(config.api_key, "k2");
        assert!(!config.drive_enabled());

        let config = AppConfig::from_sources(
            FileSettings::default(),
            env(&[("GEMINI_API_KEY", "k1"), ("API_KEY", "k2"), ("GOOGLE_CLIENT_ID", "cid")]),
        )
        .unwrap();
        assert_eq!(config.api_key, "k1");
        assert_eq!(config.google_client_id.as_deref(), Some("cid"));
        assert!(!format!("{:?}", config).contains("k1"));
    }

    #[test]
    fn test_settings_are_sanitized() {
        let settings = FileSettings {
            max_dimension: 0,
            drive_page_size: 500,
            ..FileSettings::default()
        };
        let config = AppConfig::from_sources(settings, env(&[("GEMINI_API_KEY", "k")])).unwrap();
        assert_eq!(config.settings.max_dimension, DEFAULT_MAX_DIMENSION);
        assert_eq!(config.settings.drive_page_size, MAX_PAGE_SIZE);

        let settings = FileSettings {
            max_dimension: 400_000,
            ..FileSettings::default()
        };
        let config = AppConfig::from_sources(settings, env(&[("GEMINI_API_KEY", "k")])).unwrap();
        assert_eq!(config.settings.max_dimension, MAX_CANVAS_DIMENSION);
    }

    #[test]
    fn test_load_settings_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        assert_eq!(load_settings(&path).unwrap(), FileSettings::default());

        fs::write(&path, r#"{ "max_dimension": 2048, "image_model": "custom-image" }"#).unwrap();
        let settings = load_settings(&path).unwrap();
        assert_eq!(settings.max_dimension, 2048);
        assert_eq!(settings.image_model, "custom-image");
        assert_eq!(settings.text_model, DEFAULT_TEXT_MODEL);

        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(load_settings(&path), Err(ConfigError::Parse { .. })));
    }
}
