//! Configuration
//!
//! Environment variables win when `ODTU_USERNAME` is set (hosted
//! deployments). Otherwise settings come from `config.json`, which is
//! bootstrapped with placeholders on first start.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::notify::PLACEHOLDER_BOT_TOKEN;
use crate::window::ActiveWindow;

pub const CONFIG_FILE: &str = "config.json";
pub const DEFAULT_BASE_URL: &str = "https://odtuclass2025f.metu.edu.tr";
pub const DEFAULT_GRADES_FILE: &str = "grades_history.json";
pub const DEFAULT_UTC_OFFSET_HOURS: i32 = 3;

pub const PLACEHOLDER_USERNAME: &str = "your_student_id";
pub const PLACEHOLDER_PASSWORD: &str = "your_password";
pub const PLACEHOLDER_CHAT_ID: &str = "YOUR_CHAT_ID";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{} not found - a template was created, fill in your credentials", .0.display())]
    TemplateCreated(PathBuf),

    #[error("default credentials detected in {} - update username and password", .0.display())]
    PlaceholderCredentials(PathBuf),

    #[error("missing required environment variable {0}")]
    MissingEnv(&'static str),

    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: &'static str, reason: String },

    #[error("could not parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("config file I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Where the credentials came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    Environment,
    File(PathBuf),
}

/// Shape of `config.json`.
#[derive(Debug, Default, Deserialize, Serialize)]
struct FileConfig {
    username: String,
    password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    telegram_bot_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    telegram_chat_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    check_interval_minutes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    grades_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    active_hours: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    utc_offset_hours: Option<i32>,
}

impl FileConfig {
    fn template() -> Self {
        Self {
            username: PLACEHOLDER_USERNAME.to_string(),
            password: PLACEHOLDER_PASSWORD.to_string(),
            telegram_bot_token: Some(PLACEHOLDER_BOT_TOKEN.to_string()),
            telegram_chat_id: Some(PLACEHOLDER_CHAT_ID.to_string()),
            ..Self::default()
        }
    }
}

#[derive(Clone)]
pub struct Config {
    pub username: String,
    pub password: String,
    pub telegram_bot_token: String,
    pub telegram_chat_id: String,
    pub base_url: String,
    pub check_interval: Duration,
    pub grades_file: PathBuf,
    pub active_window: Option<ActiveWindow>,
    pub source: ConfigSource,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("telegram_bot_token", &"<redacted>")
            .field("telegram_chat_id", &self.telegram_chat_id)
            .field("base_url", &self.base_url)
            .field("check_interval", &self.check_interval)
            .field("grades_file", &self.grades_file)
            .field("active_window", &self.active_window)
            .field("source", &self.source)
            .finish()
    }
}

impl Config {
    /// Load from the process environment and `config.json` in the working directory.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(|key| std::env::var(key).ok(), Path::new(CONFIG_FILE))
    }

    /// Load using `env` for variable lookups and `config_path` as the local file.
    pub fn load_with<F>(env: F, config_path: &Path) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let (file, source) = match var("ODTU_USERNAME") {
            Some(username) => {
                let password = var("ODTU_PASSWORD").ok_or(ConfigError::MissingEnv("ODTU_PASSWORD"))?;
                let file = FileConfig {
                    username,
                    password,
                    telegram_bot_token: var("TELEGRAM_BOT_TOKEN"),
                    telegram_chat_id: var("TELEGRAM_CHAT_ID"),
                    ..FileConfig::default()
                };
                (file, ConfigSource::Environment)
            }
            None => (read_config_file(config_path)?, ConfigSource::File(config_path.to_path_buf())),
        };

        let telegram_bot_token = file
            .telegram_bot_token
            .unwrap_or_else(|| PLACEHOLDER_BOT_TOKEN.to_string());
        if telegram_bot_token == PLACEHOLDER_BOT_TOKEN {
            warn!("Telegram not configured - messages won't be sent");
        }

        let base_url = var("ODTU_BASE_URL")
            .or(file.base_url)
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let interval_minutes = match var("CHECK_INTERVAL_MINUTES") {
            Some(raw) => raw.trim().parse::<u64>().map_err(|e| ConfigError::InvalidValue {
                key: "CHECK_INTERVAL_MINUTES",
                reason: e.to_string(),
            })?,
            None => file.check_interval_minutes.unwrap_or(1),
        };
        if interval_minutes == 0 {
            return Err(ConfigError::InvalidValue {
                key: "check_interval_minutes",
                reason: "must be at least 1".to_string(),
            });
        }

        let check_interval = interval_minutes
            .checked_mul(60)
            .map(Duration::from_secs)
            .ok_or(ConfigError::InvalidValue {
                key: "check_interval_minutes",
                reason: format!("{} is too large", interval_minutes),
            })?;

        let grades_file = var("GRADES_FILE")
            .or(file.grades_file)
            .unwrap_or_else(|| DEFAULT_GRADES_FILE.to_string());

        let offset_hours = match var("ACTIVE_UTC_OFFSET") {
            Some(raw) => raw.trim().parse::<i32>().map_err(|e| ConfigError::InvalidValue {
                key: "ACTIVE_UTC_OFFSET",
                reason: e.to_string(),
            })?,
            None => file.utc_offset_hours.unwrap_or(DEFAULT_UTC_OFFSET_HOURS),
        };

        let active_window = match var("ACTIVE_HOURS").or(file.active_hours) {
            Some(raw) => {
                let window: ActiveWindow = raw
                    .parse()
                    .map_err(|reason| ConfigError::InvalidValue { key: "active_hours", reason })?;
                let window = window.with_offset_hours(offset_hours).ok_or(ConfigError::InvalidValue {
                    key: "utc_offset_hours",
                    reason: format!("{} is out of range", offset_hours),
                })?;
                Some(window)
            }
            None => None,
        };

        Ok(Config {
            username: file.username,
            password: file.password,
            telegram_bot_token,
            telegram_chat_id: file
                .telegram_chat_id
                .unwrap_or_else(|| PLACEHOLDER_CHAT_ID.to_string()),
            base_url,
            check_interval,
            grades_file: PathBuf::from(grades_file),
            active_window,
            source,
        })
    }
}

fn read_config_file(path: &Path) -> Result<FileConfig, ConfigError> {
    if !path.exists() {
        let template = serde_json::to_string_pretty(&FileConfig::template()).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        fs::write(path, template)?;
        return Err(ConfigError::TemplateCreated(path.to_path_buf()));
    }

    let content = fs::read_to_string(path)?;
    let config: FileConfig = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })?;

    if config.username == PLACEHOLDER_USERNAME || config.password == PLACEHOLDER_PASSWORD {
        return Err(ConfigError::PlaceholderCredentials(path.to_path_buf()));
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_environment_takes_priority() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        let config = Config::load_with(
            env(&[
                ("ODTU_USERNAME", "e2512345"),
                ("ODTU_PASSWORD", "hunter2"),
                ("TELEGRAM_BOT_TOKEN", "123:abc"),
                ("TELEGRAM_CHAT_ID", "42"),
                ("CHECK_INTERVAL_MINUTES", "5"),
            ]),
            &path,
        )
        .unwrap();
        assert_eq!(config.source, ConfigSource::Environment);
        assert_eq!(config.username, "e2512345");
        assert_eq!(config.telegram_chat_id, "42");
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.check_interval, Duration::from_secs(300));
        assert!(config.active_window.is_none());
        assert!(!path.exists());
    }

    #[test]
    fn test_environment_requires_password() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load_with(env(&[("ODTU_USERNAME", "e1")]), &dir.path().join(CONFIG_FILE)).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnv("ODTU_PASSWORD")));
    }

    #[test]
    fn test_missing_file_writes_template() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        let err = Config::load_with(env(&[]), &path).unwrap_err();
        assert!(matches!(err, ConfigError::TemplateCreated(_)));

        let written = fs::read_to_string(&path).unwrap();
        assert!(written.contains(PLACEHOLDER_USERNAME));
        assert!(written.contains(PLACEHOLDER_BOT_TOKEN));

        let err = Config::load_with(env(&[]), &path).unwrap_err();
        assert!(matches!(err, ConfigError::PlaceholderCredentials(_)));
    }

    #[test]
    fn test_file_config_with_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(
            &path,
            r#"{
                "username": "e2512345",
                "password": "pw",
                "telegram_bot_token": "YOUR_BOT_TOKEN_FROM_BOTFATHER",
                "base_url": "https://odtuclass2024s.metu.edu.tr",
                "active_hours": "8-2"
            }"#,
        )
        .unwrap();

        let config = Config::load_with(env(&[("GRADES_FILE", "/data/grades.json")]), &path).unwrap();
        assert_eq!(config.source, ConfigSource::File(path.clone()));
        assert_eq!(config.base_url, "https://odtuclass2024s.metu.edu.tr");
        assert_eq!(config.grades_file, PathBuf::from("/data/grades.json"));
        assert_eq!(config.telegram_bot_token, PLACEHOLDER_BOT_TOKEN);
        let window = config.active_window.unwrap();
        assert_eq!((window.start_hour, window.end_hour), (8, 2));
        assert_eq!(window.offset.local_minus_utc(), 3 * 3600);

        let overridden = Config::load_with(env(&[("ODTU_BASE_URL", "https://other")]), &path).unwrap();
        assert_eq!(overridden.base_url, "https://other");
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, r#"{"username": "u", "password": "p"}"#).unwrap();

        let err = Config::load_with(env(&[("CHECK_INTERVAL_MINUTES", "soon")]), &path).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
        let err = Config::load_with(env(&[("CHECK_INTERVAL_MINUTES", "0")]), &path).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
        let err = Config::load_with(env(&[("ACTIVE_HOURS", "25-3")]), &path).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));

        let huge = u64::MAX.to_string();
        let err = Config::load_with(env(&[("CHECK_INTERVAL_MINUTES", huge.as_str())]), &path).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "check_interval_minutes", .. }));

        let err = Config::load_with(env(&[("ACTIVE_HOURS", "8-2"), ("ACTIVE_UTC_OFFSET", "1000000")]), &path).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "utc_offset_hours", .. }));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_with(
            env(&[("ODTU_USERNAME", "u"), ("ODTU_PASSWORD", "s3cret"), ("TELEGRAM_BOT_TOKEN", "999:tok")]),
            &dir.path().join(CONFIG_FILE),
        )
        .unwrap();
        let shown = format!("{:?}", config);
        assert!(!shown.contains("s3cret"));
        assert!(!shown.contains("999:tok"));
    }
}
