use std::sync::Arc;
use std::time::Duration;

/// Bytes per 16-bit PCM sample
pub const BYTES_PER_SAMPLE: usize = 2;

/// One chunk of mono 16-bit little-endian PCM.
///
/// Frames are immutable and cheap to clone; the payload is shared.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AudioFrame {
    data: Arc<[u8]>,
}

impl AudioFrame {
    /// Wrap raw PCM bytes
    pub fn new(data: impl Into<Arc<[u8]>>) -> Self {
        Self { data: data.into() }
    }

    /// A frame of `samples` zero samples
    pub fn silence(samples: usize) -> Self {
        Self::new(vec![0u8; samples * BYTES_PER_SAMPLE])
    }

    /// Build a frame from normalized f32 samples (-1.0..=1.0)
    pub fn from_f32(samples: &[f32]) -> Self {
        let mut data = Vec::with_capacity(samples.len() * BYTES_PER_SAMPLE);
        for &sample in samples {
            let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16;
            data.extend_from_slice(&value.to_le_bytes());
        }
        Self::new(data)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Payload size in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of complete samples in the frame
    pub fn sample_count(&self) -> usize {
        self.data.len() / BYTES_PER_SAMPLE
    }

    /// Decode to normalized f32 samples; a trailing odd byte is ignored
    pub fn to_f32(&self) -> Vec<f32> {
        self.data
            .chunks_exact(BYTES_PER_SAMPLE)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / i16::MAX as f32)
            .collect()
    }

    /// Playback duration at the given sample rate
    pub fn duration(&self, sample_rate: u32) -> Duration {
        if sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.sample_count() as f64 / sample_rate as f64)
    }
}

impl From<Vec<u8>> for AudioFrame {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

impl From<&[u8]> for AudioFrame {
    fn from(data: &[u8]) -> Self {
        Self::new(data)
    }
}

/// Cuts a continuous stream of samples into fixed-size frames.
///
/// Capture callbacks deliver whatever block size the device chooses; the live
/// session wants frames of exactly `frame_size` samples.
#[derive(Debug)]
pub struct FrameAssembler {
    frame_size: usize,
    pending: Vec<f32>,
}

impl FrameAssembler {
    pub fn new(frame_size: usize) -> Self {
        let frame_size = frame_size.max(1);
        Self {
            frame_size,
            pending: Vec::with_capacity(frame_size * 2),
        }
    }

    /// Append samples and return every frame that is now complete
    pub fn push(&mut self, samples: &[f32]) -> Vec<AudioFrame> {
        self.pending.extend_from_slice(samples);

        let complete = self.pending.len() / self.frame_size;
        if complete == 0 {
            return Vec::new();
        }

        let frames = self
            .pending
            .chunks_exact(self.frame_size)
            .map(AudioFrame::from_f32)
            .collect();
        self.pending.drain(..complete * self.frame_size);
        frames
    }

    /// Samples waiting for the next frame
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn reset(&mut self) {
        self.pending.clear();
    }
}
