//! Speech processing for voice mode
//!
//! This module provides:
//! - Utterance detection on the microphone signal
//! - Speech-to-text and text-to-speech through Gemini models
//! - [`VoiceIo`], which combines them with the default audio devices

pub mod detector;
#[cfg(feature = "audio-io")]
pub mod microphone;
pub mod stt;
pub mod tts;
pub mod voice_io;

pub use detector::{DetectorConfig, UtteranceDetector};
#[cfg(feature = "audio-io")]
pub use microphone::Microphone;
pub use stt::{GeminiTranscriber, SpeechRecognizer};
pub use tts::{GeminiSpeaker, SpeechSynthesizer, TTSAudio, TTS_SAMPLE_RATE};
pub use voice_io::{VoiceConfig, VoiceInterface, VoiceIo, DEFAULT_LANGUAGE, DEFAULT_TTS_MODEL};
