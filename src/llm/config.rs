//! Chat configuration for the hosted model

use super::retry::RetryPolicy;
use std::time::Duration;

/// Model used when `GEMINI_MODEL` is not set
pub const DEFAULT_CHAT_MODEL: &str = "gemini-2.5-flash";

/// Configuration for turn-based chat
#[derive(Clone, Debug)]
pub struct ChatConfig {
    /// Model identifier, e.g. `gemini-2.5-flash`
    pub model: String,

    /// System instruction sent with every request
    pub system_instruction: Option<String>,

    /// Number of user/model exchanges kept in history
    pub max_turns: usize,

    /// Sampling temperature; the model default when unset
    pub temperature: Option<f32>,

    /// Backoff applied to rate-limited requests
    pub retry: RetryPolicy,

    /// Timeout for a single HTTP request
    pub request_timeout: Duration,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_CHAT_MODEL.to_string(),
            system_instruction: None,
            max_turns: 20,
            temperature: None,
            retry: RetryPolicy::default(),
            request_timeout: Duration::from_secs(60),
        }
    }
}

impl ChatConfig {
    /// Create a new chat configuration for the specified model
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }

    /// Set the system instruction
    pub fn with_system_instruction(mut self, instruction: Option<String>) -> Self {
        self.system_instruction = instruction;
        self
    }

    /// Set how many exchanges are kept
    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns;
        self
    }

    /// Set the temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ChatConfig::default();
        assert_eq!(config.model, "gemini-2.5-flash");
        assert_eq!(config.max_turns, 20);
        assert_eq!(config.retry.max_attempts, 10);
        assert!(config.system_instruction.is_none());
    }

    #[test]
    fn test_builder_pattern() {
        let config = ChatConfig::new("gemini-2.0-flash")
            .with_system_instruction(Some("Be brief.".into()))
            .with_max_turns(5)
            .with_temperature(0.5);

        assert_eq!(config.model, "gemini-2.0-flash");
        assert_eq!(config.max_turns, 5);
        assert_eq!(config.temperature, Some(0.5));
        assert_eq!(config.system_instruction.as_deref(), Some("Be brief."));
    }
}
