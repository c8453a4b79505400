//! Configuration management for voicegen

use crate::error::{Result, VoicegenError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const DEFAULT_BASE_URL: &str = "https://api.elevenlabs.io/v1";
pub const DEFAULT_MODEL_ID: &str = "eleven_multilingual_v2";
pub const DEFAULT_STABILITY: f32 = 0.5;
pub const DEFAULT_SIMILARITY_BOOST: f32 = 0.75;

const APP_DIR: &str = "voicegen";
const CONFIG_FILE_NAME: &str = "config.json";
const ENV_PREFIX: &str = "VOICEGEN";
const FALLBACK_API_KEY_VAR: &str = "ELEVENLABS_API_KEY";

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_model_id() -> String {
    DEFAULT_MODEL_ID.to_string()
}

fn default_stability() -> f32 {
    DEFAULT_STABILITY
}

fn default_similarity_boost() -> f32 {
    DEFAULT_SIMILARITY_BOOST
}

/// Settings persisted in `config.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// ElevenLabs API key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// API base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Text-to-speech model
    #[serde(default = "default_model_id")]
    pub model_id: String,

    #[serde(default = "default_stability")]
    pub stability: f32,

    #[serde(default = "default_similarity_boost")]
    pub similarity_boost: f32,

    /// Directory holding ffplay/ffmpeg when they are not on PATH
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ffmpeg_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            model_id: default_model_id(),
            stability: DEFAULT_STABILITY,
            similarity_boost: DEFAULT_SIMILARITY_BOOST,
            ffmpeg_dir: None,
        }
    }
}

impl Settings {
    /// Layer the settings file and the given environment over the defaults.
    ///
    /// A missing file is fine; a malformed one is an error. Keys prefixed with
    /// `VOICEGEN_` override the file, and `ELEVENLABS_API_KEY` is consulted
    /// only when no key was found anywhere else.
    pub fn load_layered(path: &Path, env: HashMap<String, String>) -> Result<Self> {
        let fallback_key = env.get(FALLBACK_API_KEY_VAR).cloned();

        let layered = config::Config::builder()
            .add_source(
                config::File::from(path)
                    .format(config::FileFormat::Json)
                    .required(false),
            )
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .source(Some(env)),
            )
            .build()?;

        let mut settings: Settings = layered.try_deserialize()?;

        if settings.api_key.as_deref().map_or(true, str::is_empty) {
            settings.api_key = fallback_key.filter(|key| !key.is_empty());
        }

        Ok(settings)
    }
}

/// Voicegen configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Persisted settings
    pub settings: Settings,

    /// Path of the settings file
    pub config_file: PathBuf,

    /// Cache directory for generated speech
    pub cache_dir: PathBuf,

    /// Reuse cached speech instead of calling the API again
    pub use_cache: bool,

    /// Unattended mode (no prompts)
    pub unattended: bool,
}

impl Config {
    /// Create a new config with default paths and settings
    pub fn new() -> Result<Self> {
        let config_file = Self::default_config_file()?;

        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| VoicegenError::Config("Could not determine cache directory".into()))?
            .join(APP_DIR);

        Ok(Self {
            settings: Settings::default(),
            config_file,
            cache_dir,
            use_cache: true,
            unattended: false,
        })
    }

    /// Default settings file location (`<config dir>/voicegen/config.json`)
    pub fn default_config_file() -> Result<PathBuf> {
        Ok(dirs::config_dir()
            .ok_or_else(|| VoicegenError::Config("Could not determine config directory".into()))?
            .join(APP_DIR)
            .join(CONFIG_FILE_NAME))
    }

    /// Load settings from the default location
    pub fn load() -> Result<Self> {
        let path = Self::default_config_file()?;
        Self::load_from(path)
    }

    /// Load settings from a specific file, layered with the process environment
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut config = Self::new()?;
        config.settings = Settings::load_layered(path, std::env::vars().collect())?;
        config.config_file = path.to_path_buf();
        debug!("Loaded settings from {:?}", path);
        Ok(config)
    }

    /// Write the persisted settings back to the config file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.config_file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&self.settings)?;
        std::fs::write(&self.config_file, content)?;
        info!("Saved settings to {:?}", self.config_file);
        Ok(())
    }

    /// Store a new API key (call `save` to persist it)
    pub fn set_api_key(&mut self, key: &str) -> Result<()> {
        let key = key.trim();
        if key.is_empty() {
            return Err(VoicegenError::Config("API key must not be empty".into()));
        }
        self.settings.api_key = Some(key.to_string());
        Ok(())
    }

    /// Configured API key, or an error telling the user how to set one
    pub fn require_api_key(&self) -> Result<&str> {
        self.settings
            .api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                VoicegenError::Config(
                    "No ElevenLabs API key configured. Run `voicegen config set-key <KEY>` \
                     or set VOICEGEN_API_KEY"
                        .into(),
                )
            })
    }

    /// API key with everything but the last four characters masked
    pub fn masked_api_key(&self) -> Option<String> {
        self.settings.api_key.as_deref().map(|key| {
            let visible: String = key
                .chars()
                .rev()
                .take(4)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            format!("{}{}", "*".repeat(key.chars().count().saturating_sub(4)), visible)
        })
    }

    /// Directory for cached speech files
    pub fn speech_cache_dir(&self) -> PathBuf {
        self.cache_dir.join("speech")
    }

    /// Ensure directories exist
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.cache_dir)?;
        if let Some(parent) = self.config_file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn missing_file_yields_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let settings =
            Settings::load_layered(&tmp.path().join("config.json"), HashMap::new()).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn file_values_override_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(&path, r#"{"api_key": "sk-file", "stability": 0.3}"#).unwrap();

        let settings = Settings::load_layered(&path, HashMap::new()).unwrap();
        assert_eq!(settings.api_key.as_deref(), Some("sk-file"));
        assert!((settings.stability - 0.3).abs() < f32::EPSILON);
        assert_eq!(settings.model_id, DEFAULT_MODEL_ID);
    }

    #[test]
    fn prefixed_env_overrides_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(&path, r#"{"api_key": "sk-file"}"#).unwrap();

        let settings =
            Settings::load_layered(&path, env(&[("VOICEGEN_API_KEY", "sk-env")])).unwrap();
        assert_eq!(settings.api_key.as_deref(), Some("sk-env"));
    }

    #[test]
    fn elevenlabs_key_is_only_a_fallback() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");

        let settings =
            Settings::load_layered(&path, env(&[("ELEVENLABS_API_KEY", "sk-fallback")])).unwrap();
        assert_eq!(settings.api_key.as_deref(), Some("sk-fallback"));

        std::fs::write(&path, r#"{"api_key": "sk-file"}"#).unwrap();
        let settings =
            Settings::load_layered(&path, env(&[("ELEVENLABS_API_KEY", "sk-fallback")])).unwrap();
        assert_eq!(settings.api_key.as_deref(), Some("sk-file"));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(Settings::load_layered(&path, HashMap::new()).is_err());
    }

    #[test]
    fn save_then_reload() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = Config::new().unwrap();
        config.config_file = tmp.path().join("nested").join("config.json");
        config.set_api_key("  sk-saved  ").unwrap();
        config.save().unwrap();

        let reloaded = Settings::load_layered(&config.config_file, HashMap::new()).unwrap();
        assert_eq!(reloaded.api_key.as_deref(), Some("sk-saved"));
    }

    #[test]
    fn settings_file_name_need_not_end_in_json() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = Config::new().unwrap();
        config.config_file = tmp.path().join("voicegen.conf");
        config.set_api_key("sk-saved").unwrap();
        config.save().unwrap();

        let reloaded = Settings::load_layered(&config.config_file, HashMap::new()).unwrap();
        assert_eq!(reloaded.api_key.as_deref(), Some("sk-saved"));
    }

    #[test]
    fn empty_api_key_is_rejected() {
        let mut config = Config::new().unwrap();
        assert!(config.set_api_key("   ").is_err());
        assert!(config.require_api_key().is_err());
    }

    #[test]
    fn masked_key_keeps_last_four() {
        let mut config = Config::new().unwrap();
        config.set_api_key("sk-1234abcd").unwrap();
        assert_eq!(config.masked_api_key().as_deref(), Some("*******abcd"));
    }
}
