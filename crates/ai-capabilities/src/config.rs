use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::family::CapabilityFamily;
use crate::host::CreateOptions;
use crate::resolver::StrategyTable;

pub const DEFAULT_MAX_TRANSLATION_CHARS: usize = 5_000;
pub const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 600;

pub const TARGET_LANGUAGE_ENV: &str = "AI_CAPABILITIES_TARGET_LANGUAGE";
pub const DOWNLOAD_TIMEOUT_ENV: &str = "AI_CAPABILITIES_DOWNLOAD_TIMEOUT_SECS";

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("config decoding failed: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid config value: {0}")]
    Invalid(String),
}

/// Caller preferences consumed by the façade.
pub trait SettingsProvider: Send + Sync {
    /// Preferred translation target when a request names none.
    fn target_language(&self) -> Option<String>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Upper bound on translation input, in characters.
    pub max_translation_chars: usize,
    pub default_target_language: Option<String>,
    /// `None` leaves model downloads unbounded (still cancellable).
    pub download_timeout_secs: Option<u64>,
    /// Defaults merged under the per-call create options.
    pub create_options: IndexMap<CapabilityFamily, CreateOptions>,
    /// Replaces the built-in probe strategy table when set.
    pub strategies: Option<StrategyTable>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_translation_chars: DEFAULT_MAX_TRANSLATION_CHARS,
            default_target_language: None,
            download_timeout_secs: Some(DEFAULT_DOWNLOAD_TIMEOUT_SECS),
            create_options: IndexMap::new(),
            strategies: None,
        }
    }
}

impl ClientConfig {
    /// Load from a JSON file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: ClientConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if given, then apply environment overrides.
    pub fn from_env_and_file(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(language) = std::env::var(TARGET_LANGUAGE_ENV) {
            let language = language.trim();
            if !language.is_empty() {
                self.default_target_language = Some(language.to_string());
            }
        }
        if let Ok(raw) = std::env::var(DOWNLOAD_TIMEOUT_ENV) {
            match raw.trim().parse::<u64>() {
                Ok(0) => self.download_timeout_secs = None,
                Ok(secs) => self.download_timeout_secs = Some(secs),
                Err(err) => warn!(
                    target: "ai_capabilities::config",
                    value = %raw,
                    error = %err,
                    "ignoring invalid {DOWNLOAD_TIMEOUT_ENV}"
                ),
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_translation_chars == 0 {
            return Err(ConfigError::Invalid(
                "max_translation_chars must be greater than zero".into(),
            ));
        }
        if self.download_timeout_secs == Some(0) {
            return Err(ConfigError::Invalid(
                "download_timeout_secs must be greater than zero; omit it for no bound".into(),
            ));
        }
        Ok(())
    }

    pub fn download_timeout(&self) -> Option<Duration> {
        self.download_timeout_secs.map(Duration::from_secs)
    }

    pub fn create_options_for(&self, family: CapabilityFamily) -> CreateOptions {
        self.create_options.get(&family).cloned().unwrap_or_default()
    }

    pub fn strategy_table(&self) -> StrategyTable {
        self.strategies.clone().unwrap_or_default()
    }
}

impl SettingsProvider for ClientConfig {
    fn target_language(&self) -> Option<String> {
        self.default_target_language.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::SummaryType;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn defaults_are_bounded() {
        let config = ClientConfig::default();
        assert_eq!(config.max_translation_chars, DEFAULT_MAX_TRANSLATION_CHARS);
        assert_eq!(
            config.download_timeout(),
            Some(Duration::from_secs(DEFAULT_DOWNLOAD_TIMEOUT_SECS))
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn loads_partial_json_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "default_target_language": "de",
                "download_timeout_secs": null,
                "create_options": {{ "summarizer": {{ "summary_type": "key-points" }} }}
            }}"#
        )
        .unwrap();

        let config = ClientConfig::load(file.path()).unwrap();
        assert_eq!(config.target_language().as_deref(), Some("de"));
        assert_eq!(config.download_timeout(), None);
        assert_eq!(config.max_translation_chars, DEFAULT_MAX_TRANSLATION_CHARS);
        assert_eq!(
            config
                .create_options_for(CapabilityFamily::Summarizer)
                .summary_type,
            Some(SummaryType::KeyPoints)
        );
        assert_eq!(
            config.create_options_for(CapabilityFamily::Translator),
            CreateOptions::default()
        );
    }

    #[test]
    fn rejects_zero_limits() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{ "max_translation_chars": 0 }}"#).unwrap();
        assert!(matches!(
            ClientConfig::load(file.path()),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = ClientConfig::load(Path::new("/nonexistent/ai-capabilities.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
