//! Audio backend capability
//!
//! The live session only talks to audio hardware through these two traits.
//! Each has a hardware variant (cpal, behind the `audio-io` feature) and a
//! synthetic variant used when no device is present.

use super::buffer::FrameQueue;
use super::frame::AudioFrame;
use super::AudioConfig;
use crate::{AgentError, Result};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Handle given to input backends for delivering captured frames.
///
/// Safe to call from any thread. Frames pushed while the owning channel is not
/// running are discarded.
#[derive(Clone)]
pub struct FrameSink {
    queue: FrameQueue,
    running: Arc<AtomicBool>,
}

impl FrameSink {
    pub fn new(queue: FrameQueue, running: Arc<AtomicBool>) -> Self {
        Self { queue, running }
    }

    /// Deliver a frame; returns `false` if it was discarded
    pub fn push(&self, frame: AudioFrame) -> bool {
        if !self.is_running() {
            return false;
        }
        self.queue.push(frame)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Source of captured audio frames
pub trait InputBackend: Send {
    /// Short name for logging
    fn name(&self) -> &'static str;

    /// Begin delivering frames into `sink`
    fn start(&mut self, sink: FrameSink) -> Result<()>;

    /// Stop capturing and release the device. Must be safe to call repeatedly.
    fn stop(&mut self);
}

/// Lock-free signals to an output backend.
///
/// A backend may be blocked inside `write` while its owner holds the backend
/// lock, so closing and discarding must reach it without that lock. The
/// backend creates the control and polls it; the owner only sets it.
#[derive(Clone, Debug, Default)]
pub struct PlaybackControl {
    closed: Arc<AtomicBool>,
    discards: Arc<AtomicU64>,
}

impl PlaybackControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make any blocked or future write return without playing
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Ask the backend to drop all audio it has buffered but not yet played
    pub fn discard(&self) {
        self.discards.fetch_add(1, Ordering::SeqCst);
    }

    /// Number of discard requests so far
    pub fn discards(&self) -> u64 {
        self.discards.load(Ordering::SeqCst)
    }
}

/// Destination for playback frames
pub trait OutputBackend: Send {
    /// Short name for logging
    fn name(&self) -> &'static str;

    /// Play a frame. May block until the device has room for it.
    fn write(&mut self, frame: &AudioFrame) -> Result<()>;

    /// Release the device. Must be safe to call repeatedly.
    fn close(&mut self);

    /// Control for backends that buffer audio or block in `write`
    fn control(&self) -> Option<PlaybackControl> {
        None
    }
}

/// Synthetic microphone producing silent frames at the real-time cadence
pub struct SilenceInput {
    frame_size: usize,
    period: Duration,
    task: Option<JoinHandle<()>>,
}

impl SilenceInput {
    pub fn new(sample_rate: u32, frame_size: usize) -> Self {
        let period = if sample_rate == 0 {
            Duration::from_millis(100)
        } else {
            Duration::from_micros(frame_size as u64 * 1_000_000 / sample_rate as u64)
        };

        Self {
            frame_size,
            period,
            task: None,
        }
    }

    /// Interval between generated frames
    pub fn period(&self) -> Duration {
        self.period
    }
}

impl InputBackend for SilenceInput {
    fn name(&self) -> &'static str {
        "synthetic-silence"
    }

    fn start(&mut self, sink: FrameSink) -> Result<()> {
        if self.task.is_some() {
            return Ok(());
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            AgentError::AudioDeviceError(format!("Synthetic input needs a tokio runtime: {}", e))
        })?;

        let frame_size = self.frame_size;
        let period = self.period;
        self.task = Some(runtime.spawn(async move {
            while sink.is_running() {
                tokio::time::sleep(period).await;
                sink.push(AudioFrame::silence(frame_size));
            }
            debug!("Synthetic input loop finished");
        }));

        Ok(())
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for SilenceInput {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Synthetic speaker that consumes frames without producing sound
#[derive(Default)]
pub struct DiscardOutput {
    frames: Arc<AtomicU64>,
    bytes: Arc<AtomicU64>,
}

impl DiscardOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames consumed so far
    pub fn frames_written(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    /// Bytes consumed so far
    pub fn bytes_written(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }
}

impl OutputBackend for DiscardOutput {
    fn name(&self) -> &'static str {
        "synthetic-discard"
    }

    fn write(&mut self, frame: &AudioFrame) -> Result<()> {
        self.frames.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(frame.len() as u64, Ordering::Relaxed);
        trace!("Discarded {} bytes of playback audio", frame.len());
        Ok(())
    }

    fn close(&mut self) {}
}

/// Pick the microphone if one can be opened, otherwise the silence generator
pub fn detect_input(config: &AudioConfig) -> Box<dyn InputBackend> {
    #[cfg(feature = "audio-io")]
    {
        match super::input::MicrophoneInput::new(config.sample_rate, config.frame_size) {
            Ok(microphone) => return Box::new(microphone),
            Err(e) => warn!("No usable microphone ({}), using synthetic input", e),
        }
    }
    #[cfg(not(feature = "audio-io"))]
    {
        warn!("Built without audio-io, using synthetic input");
    }

    Box::new(SilenceInput::new(config.sample_rate, config.frame_size))
}

/// Pick the speaker if one can be opened, otherwise the discard sink
pub fn detect_output(config: &AudioConfig) -> Box<dyn OutputBackend> {
    #[cfg(feature = "audio-io")]
    {
        match super::output::SpeakerOutput::new(config.playback_sample_rate) {
            Ok(speaker) => return Box::new(speaker),
            Err(e) => warn!("No usable speaker ({}), using synthetic output", e),
        }
    }
    #[cfg(not(feature = "audio-io"))]
    {
        warn!("Built without audio-io, using synthetic output");
    }

    Box::new(DiscardOutput::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_discards_when_not_running() {
        let queue = FrameQueue::new(4);
        let running = Arc::new(AtomicBool::new(false));
        let sink = FrameSink::new(queue.clone(), Arc::clone(&running));

        assert!(!sink.push(AudioFrame::silence(4)));
        assert!(queue.is_empty());

        running.store(true, Ordering::SeqCst);
        assert!(sink.push(AudioFrame::silence(4)));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_silence_period_matches_frame_duration() {
        let input = SilenceInput::new(16000, 1024);
        assert_eq!(input.period(), Duration::from_millis(64));
    }

    #[tokio::test(start_paused = true)]
    async fn test_silence_input_generates_frames() {
        let queue = FrameQueue::new(16);
        let running = Arc::new(AtomicBool::new(true));
        let mut input = SilenceInput::new(16000, 1024);

        input.start(FrameSink::new(queue.clone(), running)).unwrap();

        let frame = queue.pop().await;
        assert_eq!(frame.len(), 2048);
        assert!(frame.as_bytes().iter().all(|&b| b == 0));

        input.stop();
        input.stop();
    }

    #[test]
    fn test_discard_output_counts() {
        let mut output = DiscardOutput::new();
        output.write(&AudioFrame::silence(10)).unwrap();
        output.write(&AudioFrame::silence(5)).unwrap();

        assert_eq!(output.frames_written(), 2);
        assert_eq!(output.bytes_written(), 30);
        output.close();
        assert!(output.control().is_none());
    }

    #[test]
    fn test_playback_control_is_shared() {
        let control = PlaybackControl::new();
        let owner = control.clone();

        owner.discard();
        owner.discard();
        assert_eq!(control.discards(), 2);

        assert!(!control.is_closed());
        owner.close();
        assert!(control.is_closed());
    }
}
