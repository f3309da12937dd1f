pub mod audio;
pub mod integration;
pub mod live;
pub mod llm;
pub mod speech;

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum AgentError {
    #[error("Audio device error: {0}")]
    AudioDeviceError(String),

    #[error("Audio processing error: {0}")]
    AudioProcessingError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Retries exhausted after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    #[error("Transcription error: {0}")]
    TranscriptionError(String),

    #[error("TTS error: {0}")]
    TTSError(String),

    #[error("Voice IO unavailable: {0}")]
    VoiceUnavailable(String),

    #[error("IO error: {0}")]
    IOError(String),

    #[error("Channel error: {0}")]
    ChannelError(String),
}

impl From<std::io::Error> for AgentError {
    fn from(e: std::io::Error) -> Self {
        AgentError::IOError(e.to_string())
    }
}

impl From<serde_json::Error> for AgentError {
    fn from(e: serde_json::Error) -> Self {
        AgentError::ProtocolError(e.to_string())
    }
}

impl AgentError {
    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            // Hardware/device errors may require user intervention
            AgentError::AudioDeviceError(_) => false,
            AgentError::AudioProcessingError(_) => true,
            AgentError::ConfigError(_) => false,
            // A dropped live connection ends the session; the operator restarts it
            AgentError::ConnectionError(_) => false,
            AgentError::TransportError(_) => false,
            AgentError::ProtocolError(_) => false,
            AgentError::ApiError { .. } => true,
            AgentError::RetriesExhausted { .. } => true,
            AgentError::TranscriptionError(_) => true,
            AgentError::TTSError(_) => true,
            AgentError::VoiceUnavailable(_) => false,
            AgentError::IOError(_) => false,
            AgentError::ChannelError(_) => false,
        }
    }

    /// Rate limiting and overload responses from the hosted API.
    pub fn is_retryable(&self) -> bool {
        match self {
            AgentError::ApiError { status, message } => {
                *status == 429
                    || *status == 503
                    || message.contains("RESOURCE_EXHAUSTED")
                    || message.contains("Too Many Requests")
            }
            _ => false,
        }
    }

    /// Get a user-friendly description
    pub fn user_message(&self) -> String {
        match self {
            AgentError::AudioDeviceError(_) => {
                "Audio device error. Please check your microphone/speakers.".to_string()
            }
            AgentError::AudioProcessingError(_) => {
                "Audio processing failed. Please try again.".to_string()
            }
            AgentError::ConfigError(msg) => msg.clone(),
            AgentError::ConnectionError(_) => {
                "Could not connect to the model. Check your network and API key.".to_string()
            }
            AgentError::TransportError(_) | AgentError::ProtocolError(_) => {
                "The live session was interrupted. Please restart it.".to_string()
            }
            AgentError::ApiError { .. } => {
                "The model API returned an error. Please try again.".to_string()
            }
            AgentError::RetriesExhausted { .. } => {
                "API quota exceeded after retries. Please wait a moment and try again.".to_string()
            }
            AgentError::TranscriptionError(_) => {
                "Speech recognition failed. Please try again.".to_string()
            }
            AgentError::TTSError(_) => {
                "Text-to-speech failed. Response will be shown as text.".to_string()
            }
            AgentError::VoiceUnavailable(msg) => msg.clone(),
            AgentError::IOError(_) => "File system error occurred.".to_string(),
            AgentError::ChannelError(_) => {
                "Internal communication error. Please restart the application.".to_string()
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_is_retryable() {
        let err = AgentError::ApiError {
            status: 429,
            message: "Too Many Requests".into(),
        };
        assert!(err.is_retryable());

        let err = AgentError::ApiError {
            status: 400,
            message: "RESOURCE_EXHAUSTED: quota".into(),
        };
        assert!(err.is_retryable());
    }

    #[test]
    fn test_other_errors_are_not_retryable() {
        let err = AgentError::ApiError {
            status: 400,
            message: "invalid argument".into(),
        };
        assert!(!err.is_retryable());
        assert!(!AgentError::TransportError("reset".into()).is_retryable());
    }

    #[test]
    fn test_config_error_message_is_passed_through() {
        let err = AgentError::ConfigError("GEMINI_API_KEY must be set".into());
        assert_eq!(err.user_message(), "GEMINI_API_KEY must be set");
        assert!(!err.is_recoverable());
    }
}
