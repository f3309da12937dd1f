use super::detector::{DetectorConfig, UtteranceDetector};
use crate::audio::input::CaptureStream;
use crate::audio::resampler::AudioResampler;
use crate::{AgentError, Result};
use crossbeam_channel::{bounded, RecvTimeoutError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Records single utterances from the default input device.
///
/// Blocking; run it on a blocking thread from async code.
pub struct Microphone {
    sample_rate: u32,
    detector: DetectorConfig,
    cancelled: Arc<AtomicBool>,
}

impl Microphone {
    /// Record at `sample_rate` (the device rate is converted as needed)
    pub fn new(sample_rate: u32, detector: DetectorConfig) -> Self {
        Self {
            sample_rate,
            detector,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Make any running and future recordings return immediately
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Capture until one utterance is complete.
    ///
    /// `timeout` bounds the wait for speech to begin, not the utterance
    /// itself. Returns mono samples at the microphone's sample rate.
    pub fn record_utterance(&self, timeout: Option<Duration>) -> Result<Vec<f32>> {
        let (tx, rx) = bounded::<Vec<f32>>(64);

        let mut stream = CaptureStream::open(move |samples| {
            // Never block the device callback
            let _ = tx.try_send(samples.to_vec());
        })?;

        let mut resampler = if stream.device_rate() != self.sample_rate {
            Some(AudioResampler::new(stream.device_rate(), self.sample_rate)?)
        } else {
            None
        };
        let mut detector = UtteranceDetector::new(self.sample_rate, self.detector.clone());
        let started = Instant::now();

        info!("Listening...");
        let result = loop {
            if self.cancelled.load(Ordering::SeqCst) {
                break Err(AgentError::ChannelError("Recording cancelled".into()));
            }

            if let Some(limit) = timeout {
                if !detector.is_speaking() && started.elapsed() >= limit {
                    break Err(AgentError::TranscriptionError(format!(
                        "No speech detected within {:.1}s",
                        limit.as_secs_f32()
                    )));
                }
            }

            let block = match rx.recv_timeout(POLL_INTERVAL) {
                Ok(block) => block,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    break Err(AgentError::AudioDeviceError("Capture stream ended".into()))
                }
            };

            let block = match resampler.as_mut() {
                Some(resampler) => match resampler.push(&block) {
                    Ok(resampled) => resampled,
                    Err(e) => {
                        warn!("Dropping captured block: {}", e);
                        continue;
                    }
                },
                None => block,
            };

            if let Some(utterance) = detector.push(&block) {
                break Ok(utterance);
            }
        };

        stream.close();
        if let Ok(utterance) = &result {
            debug!(
                "Recorded {:.2}s utterance",
                utterance.len() as f32 / self.sample_rate as f32
            );
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancelled_recording_returns() {
        let microphone = Microphone::new(16000, DetectorConfig::default());
        microphone.cancel();

        // Without a device this fails to open; with one it returns at once
        assert!(microphone.record_utterance(None).is_err());
    }
}
