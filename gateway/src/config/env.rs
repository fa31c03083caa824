//! Environment variable overlay.

use std::str::FromStr;

use super::{ConfigError, ConfigResult, GatewayConfig};

fn read(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse<T: FromStr>(key: &str) -> ConfigResult<Option<T>>
where
    T::Err: std::fmt::Display,
{
    read(key)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                reason: format!("'{raw}': {e}"),
            })
        })
        .transpose()
}

fn set<T: FromStr>(key: &str, target: &mut T) -> ConfigResult<()>
where
    T::Err: std::fmt::Display,
{
    if let Some(value) = parse(key)? {
        *target = value;
    }
    Ok(())
}

fn set_opt<T: FromStr>(key: &str, target: &mut Option<T>) -> ConfigResult<()>
where
    T::Err: std::fmt::Display,
{
    if let Some(value) = parse(key)? {
        *target = Some(value);
    }
    Ok(())
}

pub(super) fn apply_env(config: &mut GatewayConfig) -> ConfigResult<()> {
    if let Some(key) = read("DEEPGRAM_API_KEY") {
        config.deepgram_api_key = Some(key);
    }
    if let Some(key) = read("OPENROUTER_API_KEY") {
        config.openrouter_api_key = Some(key);
    }

    let asr = &mut config.asr;
    set("DEEPGRAM_LISTEN_URL", &mut asr.base_url)?;
    set("ASR_MODEL", &mut asr.model)?;
    set("ASR_LANGUAGE", &mut asr.language)?;
    set("ASR_SMART_FORMAT", &mut asr.smart_format)?;
    set("ASR_INTERIM_RESULTS", &mut asr.interim_results)?;
    set_opt("ASR_UTTERANCE_END_MS", &mut asr.utterance_end_ms)?;
    set("ASR_VAD_EVENTS", &mut asr.vad_events)?;
    set_opt("ASR_ENDPOINTING_MS", &mut asr.endpointing_ms)?;
    set_opt("ASR_ENCODING", &mut asr.encoding)?;
    set_opt("ASR_SAMPLE_RATE", &mut asr.sample_rate)?;
    set("ASR_CONNECT_TIMEOUT_SECS", &mut asr.connect_timeout_secs)?;
    set("ASR_KEEPALIVE_SECS", &mut asr.keepalive_secs)?;

    let tts = &mut config.tts;
    set("DEEPGRAM_SPEAK_URL", &mut tts.base_url)?;
    set("TTS_MODEL", &mut tts.model)?;
    set("TTS_ENCODING", &mut tts.encoding)?;
    set_opt("TTS_SAMPLE_RATE", &mut tts.sample_rate)?;
    set_opt("TTS_CONTAINER", &mut tts.container)?;
    set("TTS_REQUEST_TIMEOUT_SECS", &mut tts.request_timeout_secs)?;
    set("TTS_STREAM_RESPONSE", &mut tts.stream_response)?;

    let llm = &mut config.llm;
    set("OPENROUTER_BASE_URL", &mut llm.base_url)?;
    set("LLM_MODEL", &mut llm.model)?;
    set("LLM_MAX_TOKENS", &mut llm.max_tokens)?;
    set("LLM_TEMPERATURE", &mut llm.temperature)?;
    set("LLM_TIMEOUT_SECS", &mut llm.timeout_secs)?;
    set("FRONTEND_URL", &mut llm.referer)?;
    set("LLM_TITLE", &mut llm.title)?;

    let session = &mut config.session;
    set("SESSION_MEMORY_CAP", &mut session.memory_cap)?;
    set("SESSION_DEDUPE_WINDOW_MS", &mut session.dedupe_window_ms)?;
    set("SESSION_IDLE_TIMEOUT_SECS", &mut session.idle_timeout_secs)?;
    set("SESSION_WORD_BUDGET", &mut session.word_budget)?;

    set("BILLING_TICK_INTERVAL_MS", &mut config.billing.tick_interval_ms)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear(keys: &[&str]) {
        for key in keys {
            // SAFETY: tests touching the environment run serially
            unsafe { std::env::remove_var(key) };
        }
    }

    #[test]
    #[serial]
    fn test_env_overrides_defaults() {
        // SAFETY: serial test
        unsafe {
            std::env::set_var("DEEPGRAM_API_KEY", "dg-key");
            std::env::set_var("SESSION_MEMORY_CAP", "10");
            std::env::set_var("ASR_ENCODING", "linear16");
            std::env::set_var("TTS_STREAM_RESPONSE", "false");
        }

        let mut config = GatewayConfig::default();
        apply_env(&mut config).unwrap();
        assert_eq!(config.deepgram_api_key.as_deref(), Some("dg-key"));
        assert_eq!(config.session.memory_cap, 10);
        assert_eq!(config.asr.encoding.as_deref(), Some("linear16"));
        assert!(!config.tts.stream_response);

        clear(&[
            "DEEPGRAM_API_KEY",
            "SESSION_MEMORY_CAP",
            "ASR_ENCODING",
            "TTS_STREAM_RESPONSE",
        ]);
    }

    #[test]
    #[serial]
    fn test_invalid_number_is_reported() {
        // SAFETY: serial test
        unsafe { std::env::set_var("SESSION_DEDUPE_WINDOW_MS", "soon") };

        let mut config = GatewayConfig::default();
        match apply_env(&mut config) {
            Err(ConfigError::InvalidValue { key, .. }) => {
                assert_eq!(key, "SESSION_DEDUPE_WINDOW_MS")
            }
            other => panic!("Expected InvalidValue, got {other:?}"),
        }

        clear(&["SESSION_DEDUPE_WINDOW_MS"]);
    }
}
