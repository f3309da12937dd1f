//! Text-to-speech through a Gemini TTS model
//!
//! The model returns signed 16-bit little-endian PCM, base64 encoded, with
//! the rate in the MIME type (`audio/L16;codec=pcm;rate=24000`).

use crate::audio::AudioFrame;
use crate::llm::wire::{Content, GenerateContentRequest, GenerationConfig, SpeechConfig};
use crate::llm::GeminiClient;
use crate::{AgentError, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::debug;

/// Rate assumed when the response does not state one
pub const TTS_SAMPLE_RATE: u32 = 24000;

/// Synthesized speech
#[derive(Clone, Debug)]
pub struct TTSAudio {
    /// Audio samples (f32, mono)
    pub samples: Vec<f32>,

    /// Sample rate of the audio
    pub sample_rate: u32,
}

impl TTSAudio {
    /// Get the duration of this audio in seconds
    pub fn duration_secs(&self) -> f32 {
        self.samples.len() as f32 / self.sample_rate as f32
    }

    /// Get the duration of this audio in milliseconds
    pub fn duration_ms(&self) -> u64 {
        (self.samples.len() as u64 * 1000) / self.sample_rate.max(1) as u64
    }
}

/// Turns reply text into audio
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<TTSAudio>;
}

pub struct GeminiSpeaker {
    client: GeminiClient,
    model: String,
    voice: String,
}

impl GeminiSpeaker {
    pub fn new(client: GeminiClient, model: impl Into<String>, voice: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            voice: voice.into(),
        }
    }

    fn build_request(&self, text: &str) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![Content::text(Some("user"), text)],
            system_instruction: None,
            generation_config: Some(GenerationConfig {
                response_modalities: Some(vec!["AUDIO".to_string()]),
                speech_config: Some(SpeechConfig::voice(self.voice.clone())),
                ..Default::default()
            }),
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for GeminiSpeaker {
    async fn synthesize(&self, text: &str) -> Result<TTSAudio> {
        let text = prepare_text(text);
        if text.is_empty() {
            return Ok(TTSAudio {
                samples: Vec::new(),
                sample_rate: TTS_SAMPLE_RATE,
            });
        }

        let response = self
            .client
            .generate_content(&self.model, &self.build_request(&text))
            .await
            .map_err(|e| AgentError::TTSError(e.to_string()))?;

        let blob = response
            .inline_data()
            .ok_or_else(|| AgentError::TTSError("Response contained no audio".into()))?;

        let pcm = STANDARD
            .decode(blob.data.as_bytes())
            .map_err(|e| AgentError::TTSError(format!("Invalid audio payload: {}", e)))?;

        let sample_rate = parse_pcm_rate(&blob.mime_type).unwrap_or(TTS_SAMPLE_RATE);
        let samples = AudioFrame::from(pcm).to_f32();
        debug!("Synthesized {} samples at {} Hz", samples.len(), sample_rate);

        Ok(TTSAudio { samples, sample_rate })
    }
}

/// Read the `rate=` parameter of a PCM MIME type
pub fn parse_pcm_rate(mime_type: &str) -> Option<u32> {
    mime_type
        .split(';')
        .filter_map(|param| param.trim().strip_prefix("rate="))
        .find_map(|rate| rate.parse().ok())
}

/// Strip markdown markup that should not be read aloud
pub fn prepare_text(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .filter(|c| !matches!(c, '*' | '#' | '`' | '_'))
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}
