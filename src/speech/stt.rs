use crate::audio::wav::encode_wav;
use crate::llm::wire::{Content, ContentPart, GenerateContentRequest};
use crate::llm::GeminiClient;
use crate::{AgentError, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::debug;

/// Turns recorded speech into text
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    /// Transcribe mono samples; an empty string means nothing intelligible was said
    async fn transcribe(&self, samples: &[f32], sample_rate: u32) -> Result<String>;
}

/// Reply the model gives when it hears nothing
const NO_SPEECH: &str = "[NO_SPEECH]";

/// Transcription through a Gemini model: the utterance is uploaded as WAV
pub struct GeminiTranscriber {
    client: GeminiClient,
    model: String,
    language: String,
}

impl GeminiTranscriber {
    pub fn new(client: GeminiClient, model: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            language: language.into(),
        }
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    fn instruction(&self) -> String {
        format!(
            "Transcribe this recording verbatim. The speaker's language is {}. \
             Reply with the transcript only, or {} if there is no speech.",
            self.language, NO_SPEECH
        )
    }

    fn build_request(&self, wav: &[u8]) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".into()),
                parts: vec![
                    ContentPart::text(self.instruction()),
                    ContentPart::inline("audio/wav", STANDARD.encode(wav)),
                ],
            }],
            ..Default::default()
        }
    }
}

/// Normalize the model's transcript reply
fn clean_transcript(reply: &str) -> String {
    let text = reply.trim();
    if text == NO_SPEECH {
        String::new()
    } else {
        text.to_string()
    }
}

#[async_trait]
impl SpeechRecognizer for GeminiTranscriber {
    async fn transcribe(&self, samples: &[f32], sample_rate: u32) -> Result<String> {
        if samples.is_empty() {
            return Ok(String::new());
        }

        let wav = encode_wav(samples, sample_rate)?;
        debug!("Uploading {} bytes of audio for transcription", wav.len());

        let response = self
            .client
            .generate_content(&self.model, &self.build_request(&wav))
            .await
            .map_err(|e| match e {
                // Keep errors the retry and quota handling understand
                AgentError::ApiError { .. } => e,
                other => AgentError::TranscriptionError(other.to_string()),
            })?;

        Ok(clean_transcript(&response.text().unwrap_or_default()))
    }
}
