//! Energy-based utterance detection
//!
//! Waits for the signal level to cross a threshold, then collects audio
//! until it has stayed below the threshold for the configured pause.

use std::collections::VecDeque;
use std::time::Duration;
use tracing::debug;

/// Block length the level is measured over
const BLOCK: Duration = Duration::from_millis(30);

#[derive(Clone, Debug)]
pub struct DetectorConfig {
    /// RMS level at or above which a block counts as speech
    pub energy_threshold: f32,

    /// Trailing silence that ends an utterance
    pub pause: Duration,

    /// Audio kept from before speech starts
    pub pre_roll: Duration,

    /// Utterances are cut off at this length
    pub max_phrase: Duration,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            energy_threshold: 0.01,
            pause: Duration::from_millis(800),
            pre_roll: Duration::from_millis(300),
            max_phrase: Duration::from_secs(30),
        }
    }
}

/// Splits a stream of mono samples into utterances
pub struct UtteranceDetector {
    config: DetectorConfig,
    block_len: usize,
    pause_len: usize,
    pre_roll_len: usize,
    max_len: usize,
    pending: Vec<f32>,
    pre_roll: VecDeque<f32>,
    utterance: Vec<f32>,
    silent_samples: usize,
    speaking: bool,
}

fn samples_for(duration: Duration, sample_rate: u32) -> usize {
    (duration.as_secs_f64() * sample_rate as f64).round() as usize
}

impl UtteranceDetector {
    pub fn new(sample_rate: u32, config: DetectorConfig) -> Self {
        Self {
            block_len: samples_for(BLOCK, sample_rate).max(1),
            pause_len: samples_for(config.pause, sample_rate),
            pre_roll_len: samples_for(config.pre_roll, sample_rate),
            max_len: samples_for(config.max_phrase, sample_rate).max(1),
            config,
            pending: Vec::new(),
            pre_roll: VecDeque::new(),
            utterance: Vec::new(),
            silent_samples: 0,
            speaking: false,
        }
    }

    /// True once speech has started and the utterance is not yet complete
    pub fn is_speaking(&self) -> bool {
        self.speaking
    }

    /// Feed samples; returns the utterance once it is complete
    pub fn push(&mut self, samples: &[f32]) -> Option<Vec<f32>> {
        self.pending.extend_from_slice(samples);

        let mut offset = 0;
        while self.pending.len() - offset >= self.block_len {
            let end = offset + self.block_len;
            let block: Vec<f32> = self.pending[offset..end].to_vec();
            offset = end;

            if let Some(utterance) = self.process_block(&block) {
                self.pending.drain(..offset);
                return Some(utterance);
            }
        }

        self.pending.drain(..offset);
        None
    }

    fn process_block(&mut self, block: &[f32]) -> Option<Vec<f32>> {
        let loud = rms(block) >= self.config.energy_threshold;

        if !self.speaking {
            if loud {
                debug!("Speech started");
                self.speaking = true;
                self.silent_samples = 0;
                self.utterance.clear();
                self.utterance.extend(self.pre_roll.drain(..));
                self.utterance.extend_from_slice(block);
            } else {
                self.pre_roll.extend(block.iter().copied());
                while self.pre_roll.len() > self.pre_roll_len {
                    self.pre_roll.pop_front();
                }
            }
            return None;
        }

        self.utterance.extend_from_slice(block);
        if loud {
            self.silent_samples = 0;
        } else {
            self.silent_samples += block.len();
        }

        if self.silent_samples >= self.pause_len || self.utterance.len() >= self.max_len {
            debug!("Speech ended after {} samples", self.utterance.len());
            self.speaking = false;
            self.silent_samples = 0;
            return Some(std::mem::take(&mut self.utterance));
        }

        None
    }

    /// Forget everything collected so far
    pub fn reset(&mut self) {
        self.pending.clear();
        self.pre_roll.clear();
        self.utterance.clear();
        self.silent_samples = 0;
        self.speaking = false;
    }
}

/// Root mean square level of a block
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 16000;

    fn tone(ms: u64) -> Vec<f32> {
        let n = samples_for(Duration::from_millis(ms), RATE);
        (0..n).map(|i| if i % 2 == 0 { 0.2 } else { -0.2 }).collect()
    }

    fn silence(ms: u64) -> Vec<f32> {
        vec![0.0; samples_for(Duration::from_millis(ms), RATE)]
    }

    #[test]
    fn test_rms() {
        assert_eq!(rms(&[]), 0.0);
        assert!((rms(&[0.5, -0.5]) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_silence_never_completes() {
        let mut detector = UtteranceDetector::new(RATE, DetectorConfig::default());
        assert!(detector.push(&silence(3000)).is_none());
        assert!(!detector.is_speaking());
    }

    #[test]
    fn test_utterance_ends_after_pause() {
        let mut detector = UtteranceDetector::new(RATE, DetectorConfig::default());

        assert!(detector.push(&silence(600)).is_none());
        assert!(detector.push(&tone(900)).is_none());
        assert!(detector.is_speaking());

        // Not enough trailing silence yet
        assert!(detector.push(&silence(500)).is_none());

        let utterance = detector.push(&silence(500)).expect("utterance should complete");
        assert!(!detector.is_speaking());

        // Pre-roll + speech + pause, within one block of rounding
        let expected = samples_for(Duration::from_millis(300 + 900 + 800), RATE);
        let block = samples_for(BLOCK, RATE);
        assert!(utterance.len().abs_diff(expected) <= block, "got {}", utterance.len());
    }

    #[test]
    fn test_long_phrase_is_cut() {
        let config = DetectorConfig {
            max_phrase: Duration::from_secs(1),
            ..Default::default()
        };
        let mut detector = UtteranceDetector::new(RATE, config);

        let utterance = detector.push(&tone(2000)).expect("phrase limit should end the utterance");
        assert!(utterance.len() <= samples_for(Duration::from_secs(1), RATE) + samples_for(BLOCK, RATE));
    }

    #[test]
    fn test_reset() {
        let mut detector = UtteranceDetector::new(RATE, DetectorConfig::default());
        detector.push(&tone(300));
        assert!(detector.is_speaking());

        detector.reset();
        assert!(!detector.is_speaking());
    }
}
