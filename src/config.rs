//! Configuration management for sleepy-news-rs.
//!
//! Tunables come from a YAML file in one of the standard locations; API keys
//! come from the environment (optionally seeded from a `.env` file).

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::ConfigError;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub queue_capacity: usize,
    pub low_watermark: usize,
    pub batch_produce_count: usize,
    pub fetch_attempts: u32,
    pub retry_backoff_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 50,
            low_watermark: 1,
            batch_produce_count: 1,
            fetch_attempts: 3,
            retry_backoff_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    pub voice_id: String,
    pub model_id: String,
    pub base_url: String,
    pub output_format: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            voice_id: "qWdiyiWdNPlPyVCOLW0h".into(),
            model_id: "eleven_v3".into(),
            base_url: "https://api.elevenlabs.io/v1".into(),
            output_format: "mp3_44100_128".into(),
            timeout_secs: 15,
            max_retries: 2,
            retry_backoff_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    Gemini,
    Ollama,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub model: String,
    /// Base URL; empty means the provider's default.
    pub host: String,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::Gemini,
            model: "gemini-2.0-flash".into(),
            host: String::new(),
            temperature: 0.7,
            timeout_secs: 60,
        }
    }
}

impl LlmConfig {
    pub fn resolved_host(&self) -> &str {
        if !self.host.is_empty() {
            return self.host.trim_end_matches('/');
        }
        match self.provider {
            LlmProvider::Gemini => "https://generativelanguage.googleapis.com/v1beta",
            LlmProvider::Ollama => "http://localhost:11434",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NewsSourceKind {
    Reddit,
    Placeholder,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NewsConfig {
    pub source: NewsSourceKind,
    pub subreddit: String,
    /// One of hour, day, week, month, year, all.
    pub timeframe: String,
    pub limit: usize,
    pub comment_limit: usize,
    pub max_workers: usize,
    pub user_agent: String,
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self {
            source: NewsSourceKind::Reddit,
            subreddit: "worldnews".into(),
            timeframe: "day".into(),
            limit: 10,
            comment_limit: 5,
            max_workers: 5,
            user_agent: concat!("sleepy-news-rs/", env!("CARGO_PKG_VERSION")).into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TranscriptConfig {
    pub max_words: usize,
    pub sleep_guidance: bool,
    pub context_paragraphs: usize,
    pub anchor_name: String,
    pub channel_name: String,
    pub fallback: String,
    pub farewell: String,
}

impl Default for TranscriptConfig {
    fn default() -> Self {
        Self {
            max_words: 50,
            sleep_guidance: true,
            context_paragraphs: 3,
            anchor_name: "Bob".into(),
            channel_name: "Sleepy News Channel".into(),
            fallback: "Let us move on to the next story. May your mind stay calm and peaceful as you rest."
                .into(),
            farewell: "That's all for tonight's news. Thank you for listening. \
                May you have a peaceful and restful sleep. Goodnight."
                .into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    pub background_music: Option<PathBuf>,
    pub music_volume: f32,
    pub ducked_volume: f32,
    /// Length of the music fade when ducking and restoring.
    pub fade_ms: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            background_music: None,
            music_volume: 0.4,
            ducked_volume: 0.1,
            fade_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub enabled: bool,
    pub dir: Option<PathBuf>,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub pipeline: PipelineConfig,
    pub tts: TtsConfig,
    pub llm: LlmConfig,
    pub news: NewsConfig,
    pub transcript: TranscriptConfig,
    pub playback: PlaybackConfig,
    pub history: HistoryConfig,
}

impl Config {
    /// Load configuration from YAML file.
    ///
    /// An explicit `path` must exist and parse. Without one, standard
    /// locations are searched:
    /// 1. ./config.yaml
    /// 2. ~/.config/sleepy-news/config.yaml
    /// 3. /etc/sleepy-news/config.yaml
    ///
    /// A discovered file that fails to load is skipped with a warning.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::from_file(path);
        }

        let candidates = [
            std::env::current_dir().ok().map(|d| d.join("config.yaml")),
            dirs::home_dir().map(|h| h.join(".config/sleepy-news/config.yaml")),
            Some(PathBuf::from("/etc/sleepy-news/config.yaml")),
        ];
        let Some(config_path) = candidates.into_iter().flatten().find(|p| p.exists()) else {
            info!("No config file found, using defaults");
            return Ok(Self::default());
        };

        match Self::from_file(&config_path) {
            Ok(config) => Ok(config),
            Err(e) => {
                warn!("{e}, using defaults");
                Ok(Self::default())
            }
        }
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = serde_yml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Check cross-field invariants. Any failure is fatal at startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let p = &self.pipeline;
        if p.queue_capacity == 0 {
            return Err(invalid("pipeline.queue_capacity", "must be at least 1"));
        }
        if p.low_watermark >= p.queue_capacity {
            return Err(invalid(
                "pipeline.low_watermark",
                format!(
                    "must be below queue_capacity ({} >= {})",
                    p.low_watermark, p.queue_capacity
                ),
            ));
        }
        if p.batch_produce_count == 0 {
            return Err(invalid("pipeline.batch_produce_count", "must be at least 1"));
        }
        if p.fetch_attempts == 0 {
            return Err(invalid("pipeline.fetch_attempts", "must be at least 1"));
        }
        if self.tts.max_retries == 0 {
            return Err(invalid("tts.max_retries", "must be at least 1"));
        }
        if self.transcript.max_words == 0 {
            return Err(invalid("transcript.max_words", "must be at least 1"));
        }
        if self.news.max_workers == 0 {
            return Err(invalid("news.max_workers", "must be at least 1"));
        }
        for (field, volume) in [
            ("playback.music_volume", self.playback.music_volume),
            ("playback.ducked_volume", self.playback.ducked_volume),
        ] {
            if !(0.0..=1.0).contains(&volume) {
                return Err(invalid(field, format!("{volume} is outside 0.0..=1.0")));
            }
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

/// API keys read from the environment.
#[derive(Clone)]
pub struct Credentials {
    pub elevenlabs_api_key: String,
    pub gemini_api_key: Option<String>,
    /// `ELEVENLABS_MODEL_ID` override for `tts.model_id`.
    pub elevenlabs_model_id: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("elevenlabs_api_key", &"<redacted>")
            .field("gemini_api_key", &self.gemini_api_key.as_ref().map(|_| "<redacted>"))
            .field("elevenlabs_model_id", &self.elevenlabs_model_id)
            .finish()
    }
}

impl Credentials {
    /// Read credentials from the process environment.
    pub fn from_env(config: &Config) -> Result<Self, ConfigError> {
        Self::from_lookup(config, |name| std::env::var(name).ok())
    }

    fn from_lookup(
        config: &Config,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let elevenlabs_api_key = non_empty("ELEVENLABS_API_KEY").ok_or(
            ConfigError::MissingCredential {
                name: "ELEVENLABS_API_KEY",
            },
        )?;

        let gemini_api_key = non_empty("GEMINI_API_KEY");
        let needs_gemini = config.news.source == NewsSourceKind::Reddit
            && config.llm.provider == LlmProvider::Gemini;
        if needs_gemini && gemini_api_key.is_none() {
            return Err(ConfigError::MissingCredential {
                name: "GEMINI_API_KEY",
            });
        }

        Ok(Self {
            elevenlabs_api_key,
            gemini_api_key,
            elevenlabs_model_id: non_empty("ELEVENLABS_MODEL_ID"),
        })
    }
}
