use serde::Deserialize;
use std::path::Path;

use super::{ConfigError, ConfigResult, GatewayConfig};

/// YAML configuration file.
///
/// Every field is optional; whatever is present overrides the environment.
///
/// # Example YAML structure
/// ```yaml
/// providers:
///   deepgram_api_key: "your-deepgram-key"
///   openrouter_api_key: "your-openrouter-key"
///
/// asr:
///   model: "nova-2"
///   language: "en-US"
///   encoding: "opus"
///   utterance_end_ms: 1000
///
/// tts:
///   model: "aura-luna-en"
///   sample_rate: 16000
///
/// llm:
///   model: "x-ai/grok-code-fast-1"
///   max_tokens: 30
///
/// session:
///   memory_cap: 6
///   dedupe_window_ms: 2000
///   idle_timeout_secs: 300
///
/// billing:
///   tick_interval_ms: 1000
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub providers: Option<ProvidersYaml>,
    pub asr: Option<AsrYaml>,
    pub tts: Option<TtsYaml>,
    pub llm: Option<LlmYaml>,
    pub session: Option<SessionYaml>,
    pub billing: Option<BillingYaml>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ProvidersYaml {
    pub deepgram_api_key: Option<String>,
    pub openrouter_api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AsrYaml {
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub language: Option<String>,
    pub smart_format: Option<bool>,
    pub interim_results: Option<bool>,
    pub utterance_end_ms: Option<u32>,
    pub vad_events: Option<bool>,
    pub endpointing_ms: Option<u32>,
    pub encoding: Option<String>,
    pub sample_rate: Option<u32>,
    pub connect_timeout_secs: Option<u64>,
    pub keepalive_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TtsYaml {
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub encoding: Option<String>,
    pub sample_rate: Option<u32>,
    /// Raw output container, e.g. "none" or "wav"
    pub container: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub stream_response: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct LlmYaml {
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub frequency_penalty: Option<f32>,
    pub presence_penalty: Option<f32>,
    pub referer: Option<String>,
    pub title: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SessionYaml {
    pub memory_cap: Option<usize>,
    pub dedupe_window_ms: Option<u64>,
    pub idle_timeout_secs: Option<u64>,
    pub word_budget: Option<u32>,
    pub reply_queue: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct BillingYaml {
    pub tick_interval_ms: Option<u64>,
}

fn overlay<T>(target: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *target = value;
    }
}

fn overlay_opt<T>(target: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *target = value;
    }
}

impl YamlConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> ConfigResult<Self> {
        Ok(serde_yaml::from_str(contents)?)
    }

    /// Writes every present value over `config`.
    pub fn apply(self, config: &mut GatewayConfig) {
        if let Some(providers) = self.providers {
            overlay_opt(&mut config.deepgram_api_key, providers.deepgram_api_key);
            overlay_opt(&mut config.openrouter_api_key, providers.openrouter_api_key);
        }

        if let Some(asr) = self.asr {
            let target = &mut config.asr;
            overlay(&mut target.base_url, asr.base_url);
            overlay(&mut target.model, asr.model);
            overlay(&mut target.language, asr.language);
            overlay(&mut target.smart_format, asr.smart_format);
            overlay(&mut target.interim_results, asr.interim_results);
            overlay_opt(&mut target.utterance_end_ms, asr.utterance_end_ms);
            overlay(&mut target.vad_events, asr.vad_events);
            overlay_opt(&mut target.endpointing_ms, asr.endpointing_ms);
            overlay_opt(&mut target.encoding, asr.encoding);
            overlay_opt(&mut target.sample_rate, asr.sample_rate);
            overlay(&mut target.connect_timeout_secs, asr.connect_timeout_secs);
            overlay(&mut target.keepalive_secs, asr.keepalive_secs);
        }

        if let Some(tts) = self.tts {
            let target = &mut config.tts;
            overlay(&mut target.base_url, tts.base_url);
            overlay(&mut target.model, tts.model);
            overlay(&mut target.encoding, tts.encoding);
            overlay_opt(&mut target.sample_rate, tts.sample_rate);
            overlay_opt(&mut target.container, tts.container);
            overlay(&mut target.request_timeout_secs, tts.request_timeout_secs);
            overlay(&mut target.stream_response, tts.stream_response);
        }

        if let Some(llm) = self.llm {
            let target = &mut config.llm;
            overlay(&mut target.base_url, llm.base_url);
            overlay(&mut target.model, llm.model);
            overlay(&mut target.max_tokens, llm.max_tokens);
            overlay(&mut target.temperature, llm.temperature);
            overlay(&mut target.top_p, llm.top_p);
            overlay(&mut target.frequency_penalty, llm.frequency_penalty);
            overlay(&mut target.presence_penalty, llm.presence_penalty);
            overlay(&mut target.referer, llm.referer);
            overlay(&mut target.title, llm.title);
            overlay(&mut target.timeout_secs, llm.timeout_secs);
        }

        if let Some(session) = self.session {
            let target = &mut config.session;
            overlay(&mut target.memory_cap, session.memory_cap);
            overlay(&mut target.dedupe_window_ms, session.dedupe_window_ms);
            overlay(&mut target.idle_timeout_secs, session.idle_timeout_secs);
            overlay(&mut target.word_budget, session.word_budget);
            overlay(&mut target.reply_queue, session.reply_queue);
        }

        if let Some(billing) = self.billing {
            overlay(&mut config.billing.tick_interval_ms, billing.tick_interval_ms);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_yaml_config_partial() {
        let yaml = r#"
session:
  memory_cap: 10
llm:
  model: "openai/gpt-4o-mini"
"#;
        let config = YamlConfig::parse(yaml).unwrap();
        assert!(config.providers.is_none());
        assert_eq!(config.session.as_ref().unwrap().memory_cap, Some(10));
        assert_eq!(config.session.as_ref().unwrap().dedupe_window_ms, None);
        assert_eq!(
            config.llm.as_ref().unwrap().model.as_deref(),
            Some("openai/gpt-4o-mini")
        );
    }

    #[test]
    fn test_yaml_config_empty() {
        let config = YamlConfig::parse("{}").unwrap();
        assert!(config.asr.is_none());
        assert!(config.billing.is_none());
    }

    #[test]
    fn test_apply_overrides_only_present_values() {
        let yaml = r#"
providers:
  deepgram_api_key: "dg-from-yaml"
asr:
  encoding: "linear16"
  sample_rate: 16000
tts:
  stream_response: false
billing:
  tick_interval_ms: 500
"#;
        let mut config = GatewayConfig::default();
        config.openrouter_api_key = Some("or-from-env".to_string());
        YamlConfig::parse(yaml).unwrap().apply(&mut config);

        assert_eq!(config.deepgram_api_key.as_deref(), Some("dg-from-yaml"));
        assert_eq!(config.openrouter_api_key.as_deref(), Some("or-from-env"));
        assert_eq!(config.asr.encoding.as_deref(), Some("linear16"));
        assert_eq!(config.asr.sample_rate, Some(16000));
        assert_eq!(config.asr.model, "nova-2");
        assert!(!config.tts.stream_response);
        assert_eq!(config.billing.tick_interval_ms, 500);
    }

    #[test]
    fn test_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        fs::write(
            &config_path,
            "session:\n  dedupe_window_ms: 1500\n  idle_timeout_secs: 60\n",
        )
        .unwrap();

        let config = YamlConfig::from_file(&config_path).unwrap();
        let session = config.session.unwrap();
        assert_eq!(session.dedupe_window_ms, Some(1500));
        assert_eq!(session.idle_timeout_secs, Some(60));
    }

    #[test]
    fn test_from_file_not_found() {
        let result = YamlConfig::from_file(Path::new("/nonexistent/config.yaml"));
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to read config file")
        );
    }

    #[test]
    fn test_from_file_invalid_yaml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("invalid.yaml");
        fs::write(&config_path, "invalid: yaml: content:").unwrap();

        let result = YamlConfig::from_file(&config_path);
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to parse YAML")
        );
    }
}
