//! Live session configuration

use crate::audio::AudioConfig;
use std::fmt;

/// What the model answers with during a live session
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ResponseModality {
    #[default]
    Audio,
    Text,
}

impl ResponseModality {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseModality::Audio => "AUDIO",
            ResponseModality::Text => "TEXT",
        }
    }
}

impl fmt::Display for ResponseModality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settings for one live session. Built once, never mutated while running.
#[derive(Clone, Debug, Default)]
pub struct SessionConfig {
    /// Frame format and queue bounds
    pub audio: AudioConfig,

    /// Instruction sent with the session setup
    pub system_instruction: Option<String>,

    pub response_modality: ResponseModality,
}

impl SessionConfig {
    pub fn with_audio(mut self, audio: AudioConfig) -> Self {
        self.audio = audio;
        self
    }

    /// Set the system instruction; blank text clears it
    pub fn with_system_instruction(mut self, instruction: Option<String>) -> Self {
        self.system_instruction = instruction.filter(|text| !text.trim().is_empty());
        self
    }

    pub fn with_response_modality(mut self, modality: ResponseModality) -> Self {
        self.response_modality = modality;
        self
    }
}
