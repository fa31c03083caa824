//! Gateway configuration.
//!
//! Sources, highest priority first: YAML file, environment variables
//! (including `.env`, loaded in `main`), defaults.
//!
//! # Example
//! ```rust,no_run
//! use charvoice_gateway::config::GatewayConfig;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = GatewayConfig::from_env()?;
//! let config = GatewayConfig::from_file(Path::new("config.yaml"))?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::time::Duration;

use thiserror::Error;

use crate::core::llm::OpenRouterConfig;
use crate::core::service::CallServiceConfig;
use crate::core::session::SessionSettings;
use crate::core::stt::DeepgramSTTConfig;
use crate::core::stt::deepgram::DEEPGRAM_LISTEN_URL;
use crate::core::tts::{DEEPGRAM_TTS_URL, DeepgramTTSConfig};

mod env;
mod yaml;

pub use yaml::YamlConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Missing required setting: {0}")]
    Missing(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Live transcription options.
#[derive(Debug, Clone, PartialEq)]
pub struct AsrConfig {
    pub base_url: String,
    pub model: String,
    pub language: String,
    pub smart_format: bool,
    pub interim_results: bool,
    pub utterance_end_ms: Option<u32>,
    pub vad_events: bool,
    pub endpointing_ms: Option<u32>,
    pub encoding: Option<String>,
    pub sample_rate: Option<u32>,
    pub connect_timeout_secs: u64,
    /// `0` disables keepalives.
    pub keepalive_secs: u64,
}

impl Default for AsrConfig {
    fn default() -> Self {
        Self {
            base_url: DEEPGRAM_LISTEN_URL.to_string(),
            model: "nova-2".to_string(),
            language: "en-US".to_string(),
            smart_format: true,
            interim_results: true,
            utterance_end_ms: Some(1000),
            vad_events: true,
            endpointing_ms: Some(300),
            encoding: Some("opus".to_string()),
            sample_rate: None,
            connect_timeout_secs: 15,
            keepalive_secs: 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TtsConfig {
    pub base_url: String,
    pub model: String,
    pub encoding: String,
    pub sample_rate: Option<u32>,
    pub container: Option<String>,
    pub request_timeout_secs: u64,
    pub stream_response: bool,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            base_url: DEEPGRAM_TTS_URL.to_string(),
            model: "aura-luna-en".to_string(),
            encoding: "linear16".to_string(),
            sample_rate: Some(16000),
            container: Some("none".to_string()),
            request_timeout_secs: 15,
            stream_response: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,
    pub referer: String,
    pub title: String,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        let defaults = OpenRouterConfig::default();
        Self {
            base_url: defaults.base_url,
            model: defaults.model,
            max_tokens: defaults.max_tokens,
            temperature: defaults.temperature,
            top_p: defaults.top_p,
            frequency_penalty: defaults.frequency_penalty,
            presence_penalty: defaults.presence_penalty,
            referer: defaults.referer,
            title: defaults.title,
            timeout_secs: defaults.timeout.as_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub memory_cap: usize,
    pub dedupe_window_ms: u64,
    pub idle_timeout_secs: u64,
    pub word_budget: u32,
    pub reply_queue: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            memory_cap: 6,
            dedupe_window_ms: 2000,
            idle_timeout_secs: 300,
            word_budget: 20,
            reply_queue: 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BillingConfig {
    pub tick_interval_ms: u64,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GatewayConfig {
    pub deepgram_api_key: Option<String>,
    pub openrouter_api_key: Option<String>,
    pub asr: AsrConfig,
    pub tts: TtsConfig,
    pub llm: LlmConfig,
    pub session: SessionConfig,
    pub billing: BillingConfig,
}

/// Zeroize API keys when the config is dropped.
impl Drop for GatewayConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        if let Some(ref mut key) = self.deepgram_api_key {
            key.zeroize();
        }
        if let Some(ref mut key) = self.openrouter_api_key {
            key.zeroize();
        }
    }
}

impl GatewayConfig {
    /// Defaults overlaid with environment variables.
    pub fn from_env() -> ConfigResult<Self> {
        let mut config = Self::default();
        env::apply_env(&mut config)?;
        config.validate()?;
        Ok(config)
    }

    /// Environment as the base, YAML values on top.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let yaml = YamlConfig::from_file(path)?;
        let mut config = Self::default();
        env::apply_env(&mut config)?;
        yaml.apply(&mut config);
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        fn positive(key: &str, value: u64) -> ConfigResult<()> {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    reason: "must be greater than zero".to_string(),
                });
            }
            Ok(())
        }

        positive("asr.connect_timeout_secs", self.asr.connect_timeout_secs)?;
        positive("tts.request_timeout_secs", self.tts.request_timeout_secs)?;
        positive("llm.timeout_secs", self.llm.timeout_secs)?;
        positive("llm.max_tokens", u64::from(self.llm.max_tokens))?;
        positive("session.idle_timeout_secs", self.session.idle_timeout_secs)?;
        positive("session.word_budget", u64::from(self.session.word_budget))?;
        positive("billing.tick_interval_ms", self.billing.tick_interval_ms)?;

        if self.asr.utterance_end_ms.is_some() && !self.asr.interim_results {
            return Err(ConfigError::InvalidValue {
                key: "asr.utterance_end_ms".to_string(),
                reason: "requires asr.interim_results".to_string(),
            });
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ConfigError::InvalidValue {
                key: "llm.temperature".to_string(),
                reason: format!("{} is outside 0.0..=2.0", self.llm.temperature),
            });
        }
        Ok(())
    }

    /// Fails unless both provider keys are set.
    pub fn require_api_keys(&self) -> ConfigResult<()> {
        if self.deepgram_api_key.as_deref().is_none_or(str::is_empty) {
            return Err(ConfigError::Missing("DEEPGRAM_API_KEY".to_string()));
        }
        if self.openrouter_api_key.as_deref().is_none_or(str::is_empty) {
            return Err(ConfigError::Missing("OPENROUTER_API_KEY".to_string()));
        }
        Ok(())
    }

    pub fn deepgram_stt_config(&self) -> DeepgramSTTConfig {
        DeepgramSTTConfig {
            api_key: self.deepgram_api_key.clone().unwrap_or_default(),
            base_url: self.asr.base_url.clone(),
            model: self.asr.model.clone(),
            language: self.asr.language.clone(),
            smart_format: self.asr.smart_format,
            interim_results: self.asr.interim_results,
            utterance_end_ms: self.asr.utterance_end_ms,
            vad_events: self.asr.vad_events,
            endpointing_ms: self.asr.endpointing_ms,
            encoding: self.asr.encoding.clone(),
            sample_rate: self.asr.sample_rate,
            connect_timeout: Duration::from_secs(self.asr.connect_timeout_secs),
            keepalive_interval: (self.asr.keepalive_secs > 0)
                .then(|| Duration::from_secs(self.asr.keepalive_secs)),
        }
    }

    pub fn deepgram_tts_config(&self) -> DeepgramTTSConfig {
        DeepgramTTSConfig {
            api_key: self.deepgram_api_key.clone().unwrap_or_default(),
            base_url: self.tts.base_url.clone(),
            model: self.tts.model.clone(),
            encoding: self.tts.encoding.clone(),
            sample_rate: self.tts.sample_rate,
            container: self.tts.container.clone(),
            request_timeout: Duration::from_secs(self.tts.request_timeout_secs),
            stream_response: self.tts.stream_response,
        }
    }

    pub fn openrouter_config(&self) -> OpenRouterConfig {
        OpenRouterConfig {
            api_key: self.openrouter_api_key.clone().unwrap_or_default(),
            base_url: self.llm.base_url.clone(),
            model: self.llm.model.clone(),
            max_tokens: self.llm.max_tokens,
            temperature: self.llm.temperature,
            top_p: self.llm.top_p,
            frequency_penalty: self.llm.frequency_penalty,
            presence_penalty: self.llm.presence_penalty,
            referer: self.llm.referer.clone(),
            title: self.llm.title.clone(),
            timeout: Duration::from_secs(self.llm.timeout_secs),
        }
    }

    pub fn call_service_config(&self) -> CallServiceConfig {
        CallServiceConfig {
            session: SessionSettings {
                memory_cap: self.session.memory_cap,
                dedupe_window: Duration::from_millis(self.session.dedupe_window_ms),
                word_budget: self.session.word_budget,
                reply_queue: self.session.reply_queue,
            },
            billing_interval: Duration::from_millis(self.billing.tick_interval_ms),
            idle_timeout: Duration::from_secs(self.session.idle_timeout_secs),
        }
    }
}
