use std::error::Error as StdError;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::core::constants::{
    API_KEY_ENV, DEFAULT_BASE_URL, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_MODEL,
};
use crate::core::session::SessionSettings;

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct OpenAiConfig {
    pub key: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct AiConfig {
    #[serde(default)]
    pub openai: OpenAiConfig,
}

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct Config {
    /// Chat model, e.g. "gpt-4o-mini"
    pub model: Option<String>,
    /// Base URL of an OpenAI-compatible API
    pub base_url: Option<String>,
    pub connect_timeout_secs: Option<u64>,
    /// Longest pause allowed between two reads of a streaming response
    pub read_timeout_secs: Option<u64>,
    #[serde(default)]
    pub ai: AiConfig,
}

/// Errors that can occur when loading or saving the configuration file.
#[derive(Debug)]
pub enum ConfigError {
    /// No home directory could be found for this user.
    NoConfigDir,
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    Serialize(toml::ser::Error),
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::NoConfigDir => write!(f, "Cannot determine the config directory"),
            ConfigError::Read { path, source } => {
                write!(f, "Failed to read config at {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "Config file at {} is corrupted: {}", path.display(), source)
            }
            ConfigError::Serialize(source) => write!(f, "Unable to encode config: {source}"),
            ConfigError::Write { path, source } => {
                write!(f, "Unable to write config to {}: {}", path.display(), source)
            }
        }
    }
}

impl StdError for ConfigError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ConfigError::NoConfigDir => None,
            ConfigError::Read { source, .. } | ConfigError::Write { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::Serialize(source) => Some(source),
        }
    }
}

impl Config {
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        let proj_dirs = ProjectDirs::from("", "", "hai").ok_or(ConfigError::NoConfigDir)?;
        Ok(proj_dirs.config_dir().join("config.toml"))
    }

    pub fn load() -> Result<Config, ConfigError> {
        Self::load_from_path(&Self::config_path()?)
    }

    /// A missing file is not an error; it loads as the default config.
    pub fn load_from_path(config_path: &Path) -> Result<Config, ConfigError> {
        if !config_path.exists() {
            return Ok(Config::default());
        }

        let contents = fs::read_to_string(config_path).map_err(|source| ConfigError::Read {
            path: config_path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: config_path.to_path_buf(),
            source,
        })
    }

    /// Writes through a temp file in the same directory and renames it into
    /// place. The temp file is created owner-only, which keeps the key
    /// private.
    pub fn save_to_path(&self, config_path: &Path) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::Write {
            path: config_path.to_path_buf(),
            source,
        };

        let parent = config_path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty());
        if let Some(dir) = parent {
            fs::create_dir_all(dir).map_err(write_err)?;
        }

        let contents = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        let mut temp_file = match parent {
            Some(dir) => NamedTempFile::new_in(dir),
            None => NamedTempFile::new(),
        }
        .map_err(write_err)?;

        temp_file
            .write_all(contents.as_bytes())
            .map_err(write_err)?;
        temp_file.as_file_mut().sync_all().map_err(write_err)?;
        temp_file
            .persist(config_path)
            .map_err(|err| write_err(err.error))?;
        Ok(())
    }

    /// Loads the file at `config_path`, applies `apply`, and writes it back.
    /// An unreadable or corrupted file is replaced rather than reported.
    pub fn update_at<F>(config_path: &Path, apply: F) -> Result<Config, ConfigError>
    where
        F: FnOnce(&mut Config),
    {
        let mut config = Self::load_from_path(config_path).unwrap_or_default();
        apply(&mut config);
        config.save_to_path(config_path)?;
        Ok(config)
    }

    pub fn set_openai_key(&mut self, key: &str) {
        self.ai.openai.key = Some(key.trim().to_string());
    }

    /// The API key, preferring the `OPENAI_KEY` environment variable.
    pub fn api_key(&self) -> Option<String> {
        self.api_key_with_env(std::env::var(API_KEY_ENV).ok())
    }

    fn api_key_with_env(&self, env_key: Option<String>) -> Option<String> {
        let non_empty = |key: String| {
            let key = key.trim();
            (!key.is_empty()).then(|| key.to_string())
        };
        env_key
            .and_then(non_empty)
            .or_else(|| self.ai.openai.key.clone().and_then(non_empty))
    }

    pub fn session_settings(&self, model_override: Option<&str>) -> SessionSettings {
        SessionSettings {
            model: model_override
                .or(self.model.as_deref())
                .unwrap_or(DEFAULT_MODEL)
                .to_string(),
            base_url: self
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            connect_timeout: Some(Duration::from_secs(
                self.connect_timeout_secs
                    .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
            )),
            read_timeout: self.read_timeout_secs.map(Duration::from_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn load_nonexistent_config_returns_default() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config_path = temp_dir.path().join("missing.toml");

        let config = Config::load_from_path(&config_path).expect("Failed to load config");
        assert_eq!(config, Config::default());
    }

    #[test]
    fn save_and_load_round_trip() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config_path = temp_dir.path().join("nested").join("config.toml");

        let mut config = Config {
            model: Some("gpt-4o-mini".to_string()),
            read_timeout_secs: Some(90),
            ..Config::default()
        };
        config.set_openai_key("  sk-test  ");
        config.save_to_path(&config_path).expect("Failed to save config");

        let loaded = Config::load_from_path(&config_path).expect("Failed to load config");
        assert_eq!(loaded, config);
        assert_eq!(loaded.ai.openai.key.as_deref(), Some("sk-test"));

        let contents = fs::read_to_string(&config_path).unwrap();
        assert!(contents.contains("[ai.openai]"));
    }

    #[test]
    fn corrupted_config_reports_parse_error() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config_path = temp_dir.path().join("config.toml");
        fs::write(&config_path, "[ai.openai\nkey = ").unwrap();

        let err = Config::load_from_path(&config_path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("corrupted"));
    }

    #[test]
    fn update_replaces_corrupted_config() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config_path = temp_dir.path().join("config.toml");
        fs::write(&config_path, "not = [valid").unwrap();

        let updated =
            Config::update_at(&config_path, |c| c.set_openai_key("sk-new")).expect("update");
        assert_eq!(updated.ai.openai.key.as_deref(), Some("sk-new"));

        let reloaded = Config::load_from_path(&config_path).unwrap();
        assert_eq!(reloaded.ai.openai.key.as_deref(), Some("sk-new"));
    }

    #[test]
    fn update_keeps_unrelated_settings() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config_path = temp_dir.path().join("config.toml");
        fs::write(&config_path, "model = \"gpt-4o\"\n").unwrap();

        Config::update_at(&config_path, |c| c.set_openai_key("sk-new")).expect("update");

        let reloaded = Config::load_from_path(&config_path).unwrap();
        assert_eq!(reloaded.model.as_deref(), Some("gpt-4o"));
        assert_eq!(reloaded.ai.openai.key.as_deref(), Some("sk-new"));
    }

    #[test]
    fn environment_key_takes_precedence() {
        let mut config = Config::default();
        assert_eq!(config.api_key_with_env(None), None);

        config.set_openai_key("sk-config");
        assert_eq!(
            config.api_key_with_env(None).as_deref(),
            Some("sk-config")
        );
        assert_eq!(
            config
                .api_key_with_env(Some("sk-env".to_string()))
                .as_deref(),
            Some("sk-env")
        );
        assert_eq!(
            config.api_key_with_env(Some("  ".to_string())).as_deref(),
            Some("sk-config")
        );
    }

    #[test]
    fn session_settings_apply_overrides_in_order() {
        let config = Config {
            model: Some("gpt-4o".to_string()),
            base_url: Some("http://localhost:11434/v1".to_string()),
            connect_timeout_secs: Some(5),
            ..Config::default()
        };

        let settings = config.session_settings(None);
        assert_eq!(settings.model, "gpt-4o");
        assert_eq!(settings.base_url, "http://localhost:11434/v1");
        assert_eq!(settings.connect_timeout, Some(Duration::from_secs(5)));
        assert_eq!(settings.read_timeout, None);

        assert_eq!(config.session_settings(Some("o1")).model, "o1");
        assert_eq!(
            Config::default().session_settings(None).model,
            DEFAULT_MODEL
        );
    }

    #[test]
    fn connect_timeout_is_always_bounded() {
        let settings = Config::default().session_settings(None);
        assert_eq!(
            settings.connect_timeout,
            Some(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS))
        );
        assert_eq!(
            SessionSettings::default().connect_timeout,
            settings.connect_timeout
        );
    }
}
