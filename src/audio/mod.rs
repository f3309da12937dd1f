pub mod backend;
pub mod buffer;
pub mod channel;
pub mod frame;
#[cfg(feature = "audio-io")]
pub mod input;
#[cfg(feature = "audio-io")]
pub mod output;
pub mod resampler;
pub mod wav;

pub use backend::{
    detect_input, detect_output, DiscardOutput, FrameSink, InputBackend, OutputBackend, PlaybackControl,
    SilenceInput,
};
pub use buffer::FrameQueue;
pub use channel::AudioChannel;
pub use frame::{AudioFrame, FrameAssembler};
#[cfg(feature = "audio-io")]
pub use input::{CaptureStream, MicrophoneInput};
#[cfg(feature = "audio-io")]
pub use output::SpeakerOutput;
pub use resampler::AudioResampler;
pub use wav::encode_wav;

/// Audio parameters shared by the capture and playback sides of a session
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AudioConfig {
    /// Capture rate; also the rate frames are sent upstream at
    pub sample_rate: u32,

    /// Rate of audio returned by the model
    pub playback_sample_rate: u32,

    /// Samples per captured frame
    pub frame_size: usize,

    /// Bound of each frame queue
    pub queue_capacity: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            playback_sample_rate: 24000,
            frame_size: 1024,
            queue_capacity: 256,
        }
    }
}

impl AudioConfig {
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn with_playback_sample_rate(mut self, sample_rate: u32) -> Self {
        self.playback_sample_rate = sample_rate;
        self
    }

    pub fn with_frame_size(mut self, frame_size: usize) -> Self {
        self.frame_size = frame_size;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Bytes in one captured frame
    pub fn frame_bytes(&self) -> usize {
        self.frame_size * frame::BYTES_PER_SAMPLE
    }
}
