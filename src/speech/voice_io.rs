//! Spoken input and output for turn-based voice chat

use super::detector::DetectorConfig;
use super::stt::SpeechRecognizer;
use super::tts::SpeechSynthesizer;
use crate::{AgentError, Result};
use async_trait::async_trait;
use std::time::Duration;

#[cfg(feature = "audio-io")]
use super::microphone::Microphone;
#[cfg(feature = "audio-io")]
use crate::audio::{backend::OutputBackend, input::default_input_device, resampler::resample_audio, AudioFrame, SpeakerOutput};
#[cfg(feature = "audio-io")]
use parking_lot::Mutex;
#[cfg(feature = "audio-io")]
use std::sync::Arc;
#[cfg(feature = "audio-io")]
use tracing::info;

/// Default recognition language
pub const DEFAULT_LANGUAGE: &str = "zh-CN";

/// Default Gemini TTS model
pub const DEFAULT_TTS_MODEL: &str = "gemini-2.5-flash-preview-tts";

/// Configuration for voice mode
#[derive(Clone, Debug)]
pub struct VoiceConfig {
    /// Recording rate sent to recognition
    pub sample_rate: u32,

    /// Rate the speaker is opened at
    pub playback_sample_rate: u32,

    /// Language hint for recognition (BCP-47)
    pub language: String,

    /// How long to wait for speech to begin; unbounded when unset
    pub listen_timeout: Option<Duration>,

    pub detector: DetectorConfig,

    /// Model used for transcription
    pub stt_model: String,

    /// Model used for speech synthesis
    pub tts_model: String,

    /// Prebuilt voice used for synthesis
    pub voice_name: String,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            playback_sample_rate: 24000,
            language: DEFAULT_LANGUAGE.to_string(),
            listen_timeout: None,
            detector: DetectorConfig::default(),
            stt_model: crate::llm::DEFAULT_CHAT_MODEL.to_string(),
            tts_model: DEFAULT_TTS_MODEL.to_string(),
            voice_name: "Kore".to_string(),
        }
    }
}

impl VoiceConfig {
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_listen_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.listen_timeout = timeout;
        self
    }

    pub fn with_stt_model(mut self, model: impl Into<String>) -> Self {
        self.stt_model = model.into();
        self
    }

    pub fn with_tts_model(mut self, model: impl Into<String>) -> Self {
        self.tts_model = model.into();
        self
    }
}

/// Listen for one utterance and speak one reply
#[async_trait]
pub trait VoiceInterface: Send {
    /// Record and transcribe one utterance; empty when nothing was recognised
    async fn listen(&mut self) -> Result<String>;

    /// Say `text` and return once it has been played
    async fn speak(&mut self, text: &str) -> Result<()>;
}

/// Voice IO on the default microphone and speaker
#[cfg(feature = "audio-io")]
pub struct VoiceIo {
    config: VoiceConfig,
    recognizer: Box<dyn SpeechRecognizer>,
    synthesizer: Box<dyn SpeechSynthesizer>,
    microphone: Arc<Microphone>,
    speaker: Arc<Mutex<SpeakerOutput>>,
}

#[cfg(feature = "audio-io")]
impl VoiceIo {
    /// Open the default devices.
    ///
    /// Fails with [`AgentError::VoiceUnavailable`] when either device is missing.
    pub fn new(
        config: VoiceConfig,
        recognizer: Box<dyn SpeechRecognizer>,
        synthesizer: Box<dyn SpeechSynthesizer>,
    ) -> Result<Self> {
        let (name, _) = default_input_device().map_err(|e| {
            AgentError::VoiceUnavailable(format!("Voice mode needs a microphone: {}", e))
        })?;
        info!("Voice input device: {}", name);

        let speaker = SpeakerOutput::new(config.playback_sample_rate).map_err(|e| {
            AgentError::VoiceUnavailable(format!("Voice mode needs a speaker: {}", e))
        })?;

        let microphone = Microphone::new(config.sample_rate, config.detector.clone());

        Ok(Self {
            config,
            recognizer,
            synthesizer,
            microphone: Arc::new(microphone),
            speaker: Arc::new(Mutex::new(speaker)),
        })
    }
}

#[cfg(not(feature = "audio-io"))]
pub struct VoiceIo;

#[cfg(not(feature = "audio-io"))]
impl VoiceIo {
    pub fn new(
        _config: VoiceConfig,
        _recognizer: Box<dyn SpeechRecognizer>,
        _synthesizer: Box<dyn SpeechSynthesizer>,
    ) -> Result<Self> {
        Err(AgentError::VoiceUnavailable(
            "Voice mode is not available: built without the audio-io feature".into(),
        ))
    }
}

#[cfg(not(feature = "audio-io"))]
#[async_trait]
impl VoiceInterface for VoiceIo {
    async fn listen(&mut self) -> Result<String> {
        Ok(String::new())
    }

    async fn speak(&mut self, _text: &str) -> Result<()> {
        Ok(())
    }
}

#[cfg(feature = "audio-io")]
#[async_trait]
impl VoiceInterface for VoiceIo {
    async fn listen(&mut self) -> Result<String> {
        let microphone = Arc::clone(&self.microphone);
        let timeout = self.config.listen_timeout;
        let samples = tokio::task::spawn_blocking(move || microphone.record_utterance(timeout))
            .await
            .map_err(|e| AgentError::ChannelError(format!("Recording task failed: {}", e)))??;

        self.recognizer
            .transcribe(&samples, self.microphone.sample_rate())
            .await
    }

    async fn speak(&mut self, text: &str) -> Result<()> {
        let audio = self.synthesizer.synthesize(text).await?;
        if audio.samples.is_empty() {
            return Ok(());
        }

        let playback_rate = self.config.playback_sample_rate;
        let samples = resample_audio(&audio.samples, audio.sample_rate, playback_rate)?;
        let duration = Duration::from_millis(audio.duration_ms());
        let speaker = Arc::clone(&self.speaker);

        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut speaker = speaker.lock();
            speaker.write(&AudioFrame::from_f32(&samples))?;
            speaker.flush()?;
            speaker.wait_until_drained(duration + Duration::from_secs(2));
            Ok(())
        })
        .await
        .map_err(|e| AgentError::ChannelError(format!("Playback task failed: {}", e)))?
    }
}

#[cfg(feature = "audio-io")]
impl Drop for VoiceIo {
    fn drop(&mut self) {
        // Unblocks a recording still running on the blocking pool
        self.microphone.cancel();
    }
}
