//! Settings for the integration layer
//!
//! Everything comes from the environment (optionally via a `.env` file) plus
//! an optional system prompt file. Each component config is derived from
//! [`Settings`].

use crate::audio::AudioConfig;
use crate::live::{SessionConfig, DEFAULT_LIVE_MODEL};
use crate::llm::{ChatConfig, DEFAULT_CHAT_MODEL};
use crate::speech::{VoiceConfig, DEFAULT_LANGUAGE, DEFAULT_TTS_MODEL};
use crate::{AgentError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const GEMINI_API_KEY_ENV: &str = "GEMINI_API_KEY";
pub const GEMINI_MODEL_ENV: &str = "GEMINI_MODEL";
pub const GEMINI_LIVE_MODEL_ENV: &str = "GEMINI_LIVE_MODEL";
pub const GEMINI_TTS_MODEL_ENV: &str = "GEMINI_TTS_MODEL";
pub const SPEECH_LANGUAGE_ENV: &str = "SPEECH_LANGUAGE";
pub const SYSTEM_PROMPT_PATH_ENV: &str = "SYSTEM_PROMPT_PATH";

/// Resolved application settings
#[derive(Clone, Debug)]
pub struct Settings {
    /// Gemini API credential
    pub api_key: String,

    /// Model for turn-based chat and transcription
    pub model: String,

    /// Model for live sessions
    pub live_model: String,

    /// Model for speech synthesis
    pub tts_model: String,

    /// Recognition language for voice mode
    pub language: String,

    /// Loaded system prompt, if any
    pub system_prompt: Option<String>,
}

impl Settings {
    /// Load settings from the process environment
    pub fn from_env(default_prompt_path: Option<&Path>) -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok(), default_prompt_path)
    }

    /// Load settings through `lookup`, which maps a variable name to its value
    pub fn from_lookup<F>(lookup: F, default_prompt_path: Option<&Path>) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let api_key = non_empty(GEMINI_API_KEY_ENV).ok_or_else(|| {
            AgentError::ConfigError(format!(
                "Environment variable {} must be set for Gemini access.",
                GEMINI_API_KEY_ENV
            ))
        })?;

        let prompt_path = non_empty(SYSTEM_PROMPT_PATH_ENV)
            .map(PathBuf::from)
            .or_else(|| default_prompt_path.map(Path::to_path_buf));
        let system_prompt = load_system_prompt(prompt_path.as_deref())?;

        let settings = Self {
            api_key,
            model: non_empty(GEMINI_MODEL_ENV).unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
            live_model: non_empty(GEMINI_LIVE_MODEL_ENV).unwrap_or_else(|| DEFAULT_LIVE_MODEL.to_string()),
            tts_model: non_empty(GEMINI_TTS_MODEL_ENV).unwrap_or_else(|| DEFAULT_TTS_MODEL.to_string()),
            language: non_empty(SPEECH_LANGUAGE_ENV).unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
            system_prompt,
        };

        info!(
            "Settings loaded (model: {}, system prompt: {})",
            settings.model,
            if settings.system_prompt.is_some() { "yes" } else { "no" }
        );
        Ok(settings)
    }

    /// Configuration for turn-based chat
    pub fn chat_config(&self) -> ChatConfig {
        ChatConfig::new(self.model.clone()).with_system_instruction(self.system_prompt.clone())
    }

    /// Configuration for a live session
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig::default()
            .with_audio(AudioConfig::default())
            .with_system_instruction(self.system_prompt.clone())
    }

    /// Configuration for voice mode
    pub fn voice_config(&self) -> VoiceConfig {
        VoiceConfig::default()
            .with_language(self.language.clone())
            .with_stt_model(self.model.clone())
            .with_tts_model(self.tts_model.clone())
    }
}

/// Read the system prompt.
///
/// A missing path, a missing file and a blank file all mean "no prompt".
pub fn load_system_prompt(path: Option<&Path>) -> Result<Option<String>> {
    let Some(path) = path else {
        return Ok(None);
    };

    match std::fs::read_to_string(path) {
        Ok(text) => {
            let text = text.trim();
            if text.is_empty() {
                Ok(None)
            } else {
                debug!("Loaded system prompt from {}", path.display());
                Ok(Some(text.to_string()))
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("No system prompt at {}", path.display());
            Ok(None)
        }
        Err(e) => Err(AgentError::ConfigError(format!(
            "Failed to read system prompt {}: {}",
            path.display(),
            e
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_missing_api_key() {
        let err = Settings::from_lookup(lookup(&[]), None).unwrap_err();
        assert!(matches!(err, AgentError::ConfigError(_)));
        assert!(err.user_message().contains("GEMINI_API_KEY"));

        let err = Settings::from_lookup(lookup(&[(GEMINI_API_KEY_ENV, "   ")]), None).unwrap_err();
        assert!(matches!(err, AgentError::ConfigError(_)));
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::from_lookup(lookup(&[(GEMINI_API_KEY_ENV, "key")]), None).unwrap();
        assert_eq!(settings.api_key, "key");
        assert_eq!(settings.model, "gemini-2.5-flash");
        assert_eq!(settings.live_model, DEFAULT_LIVE_MODEL);
        assert_eq!(settings.language, "zh-CN");
        assert!(settings.system_prompt.is_none());
    }

    #[test]
    fn test_blank_model_uses_default() {
        let settings = Settings::from_lookup(
            lookup(&[(GEMINI_API_KEY_ENV, "key"), (GEMINI_MODEL_ENV, " ")]),
            None,
        )
        .unwrap();
        assert_eq!(settings.model, DEFAULT_CHAT_MODEL);
    }

    #[test]
    fn test_prompt_from_default_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "  You are helpful.  ").unwrap();

        let settings =
            Settings::from_lookup(lookup(&[(GEMINI_API_KEY_ENV, "key")]), Some(file.path())).unwrap();
        assert_eq!(settings.system_prompt.as_deref(), Some("You are helpful."));
        assert_eq!(
            settings.chat_config().system_instruction.as_deref(),
            Some("You are helpful.")
        );
    }

    #[test]
    fn test_prompt_path_env_overrides_default() {
        let mut env_file = tempfile::NamedTempFile::new().unwrap();
        write!(env_file, "From env").unwrap();
        let mut default_file = tempfile::NamedTempFile::new().unwrap();
        write!(default_file, "From default").unwrap();

        let env_path = env_file.path().to_string_lossy().to_string();
        let settings = Settings::from_lookup(
            lookup(&[(GEMINI_API_KEY_ENV, "key"), (SYSTEM_PROMPT_PATH_ENV, &env_path)]),
            Some(default_file.path()),
        )
        .unwrap();
        assert_eq!(settings.system_prompt.as_deref(), Some("From env"));
    }

    #[test]
    fn test_missing_or_blank_prompt() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(load_system_prompt(Some(&dir.path().join("absent.txt"))).unwrap(), None);

        let blank = dir.path().join("blank.txt");
        std::fs::write(&blank, "\n  \n").unwrap();
        assert_eq!(load_system_prompt(Some(&blank)).unwrap(), None);

        assert_eq!(load_system_prompt(None).unwrap(), None);
    }

    #[test]
    fn test_component_configs() {
        let settings = Settings::from_lookup(
            lookup(&[(GEMINI_API_KEY_ENV, "key"), (SPEECH_LANGUAGE_ENV, "en-US")]),
            None,
        )
        .unwrap();

        assert_eq!(settings.session_config().audio.sample_rate, 16000);
        assert_eq!(settings.voice_config().language, "en-US");
        assert_eq!(settings.voice_config().stt_model, settings.model);
    }
}
