use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{DocuchatError, Result};

/// Language codes the answering backend and the speech facilities accept.
pub const SUPPORTED_LANGUAGES: &[&str] = &[
    "en", "zh", "es", "fr", "de", "ar", "hi", "mr", "ru", "ja", "pt",
];

/// Top-level configuration for the docuchat client.
///
/// Loaded from `~/.docuchat/config.toml` by default. Each section corresponds
/// to one component of the session layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocuchatConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub streaming: StreamingConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub voice: VoiceConfig,
}

impl DocuchatConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: DocuchatConfig = toml::from_str(&content)?;
        config.validate()?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or is invalid.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Reject values the session layer cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.streaming.step_chars == 0 {
            return Err(DocuchatError::Config(
                "streaming.step_chars must be greater than 0".to_string(),
            ));
        }
        if self.streaming.interval_ms == 0 {
            return Err(DocuchatError::Config(
                "streaming.interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.upload.tick_ms == 0 {
            return Err(DocuchatError::Config(
                "upload.tick_ms must be greater than 0".to_string(),
            ));
        }
        let max_increment = self.upload.max_increment;
        if !(max_increment.is_finite() && max_increment > 0.0) {
            return Err(DocuchatError::Config(
                "upload.max_increment must be a positive finite number".to_string(),
            ));
        }
        let language = &self.general.language;
        if !language.is_empty() && !SUPPORTED_LANGUAGES.contains(&language.as_str()) {
            return Err(DocuchatError::Config(format!(
                "general.language '{}' is not supported",
                language
            )));
        }
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
    /// Active language code. Empty means detect from the locale.
    pub language: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            language: String::new(),
        }
    }
}

/// Answering backend connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL the `/api/...` paths are appended to.
    pub base_url: String,
    /// Upper bound for one backend call in seconds. 0 disables the bound.
    pub request_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            request_timeout_secs: 60,
        }
    }
}

impl BackendConfig {
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }
}

/// Conversation session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Project whose documents the backend answers from.
    pub project_id: i64,
    /// Display name of the project.
    pub project_name: String,
    /// Seed each session with an assistant greeting.
    pub greeting: bool,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            project_id: 1,
            project_name: "Documents".to_string(),
            greeting: false,
        }
    }
}

/// Incremental answer reveal cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Characters revealed per tick.
    pub step_chars: usize,
    /// Milliseconds between ticks.
    pub interval_ms: u64,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            step_chars: 5,
            interval_ms: 30,
        }
    }
}

impl StreamingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Simulated upload progress settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Milliseconds between progress ticks.
    pub tick_ms: u64,
    /// Exclusive upper bound of the random per-tick increment, in percent.
    pub max_increment: f64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            tick_ms: 200,
            max_increment: 15.0,
        }
    }
}

impl UploadConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

/// Voice input/output settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// When playback is active and a different message is requested, stop
    /// the current one and start the new one in the same call. When false a
    /// second request only stops playback.
    pub switch_target_on_speak: bool,
}
