use super::backend::{
    detect_input, detect_output, DiscardOutput, FrameSink, InputBackend, OutputBackend, PlaybackControl,
    SilenceInput,
};
use super::buffer::FrameQueue;
use super::frame::AudioFrame;
use super::AudioConfig;
use crate::{AgentError, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

type SharedOutput = Arc<Mutex<Option<Box<dyn OutputBackend>>>>;

/// Bridge between an audio backend and the live session.
///
/// Holds the `captured` queue (filled by the input backend, drained by the
/// uplink) and the `to_play` queue (filled by the downlink, drained into the
/// output backend by a background task). Every method takes `&self` so the
/// channel can be shared between the session loops and the controller.
///
/// The output lock is held for the whole of a backend write. Stopping and
/// discarding never wait for it: they go through the backend's
/// [`PlaybackControl`], and a backend still busy when the channel stops is
/// closed by the write that holds it.
pub struct AudioChannel {
    config: AudioConfig,
    captured: FrameQueue,
    to_play: FrameQueue,
    running: Arc<AtomicBool>,
    input: Mutex<Option<Box<dyn InputBackend>>>,
    output: SharedOutput,
    control: PlaybackControl,
    drain: Mutex<Option<JoinHandle<()>>>,
    input_started: AtomicBool,
    output_started: AtomicBool,
    stopped: AtomicBool,
}

impl AudioChannel {
    /// Create a channel on the default devices, falling back to synthetic
    /// backends when a device cannot be opened
    pub fn new(config: AudioConfig) -> Self {
        let input = detect_input(&config);
        let output = detect_output(&config);
        Self::with_backends(config, input, output)
    }

    /// [`AudioChannel::new`] for async callers: device setup blocks while the
    /// device threads start, so it runs on the blocking pool
    pub async fn open_default(config: AudioConfig) -> Result<Self> {
        tokio::task::spawn_blocking(move || Self::new(config))
            .await
            .map_err(|e| AgentError::ChannelError(format!("Audio device setup failed: {}", e)))
    }

    /// Create a channel on explicit backends
    pub fn with_backends(
        config: AudioConfig,
        input: Box<dyn InputBackend>,
        output: Box<dyn OutputBackend>,
    ) -> Self {
        debug!(
            "Audio channel using input '{}' and output '{}'",
            input.name(),
            output.name()
        );

        // Backends without their own control still get one so that writes
        // queued behind a stop are skipped
        let control = output.control().unwrap_or_default();

        Self {
            captured: FrameQueue::new(config.queue_capacity),
            to_play: FrameQueue::new(config.queue_capacity),
            config,
            running: Arc::new(AtomicBool::new(false)),
            input: Mutex::new(Some(input)),
            output: Arc::new(Mutex::new(Some(output))),
            control,
            drain: Mutex::new(None),
            input_started: AtomicBool::new(false),
            output_started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &AudioConfig {
        &self.config
    }

    /// Start capturing into the `captured` queue.
    ///
    /// If the backend fails to start, the synthetic silence generator takes
    /// its place. Never fails.
    pub fn start_input(&self) {
        if self.stopped.load(Ordering::SeqCst) {
            warn!("Audio channel already stopped, not starting input");
            return;
        }
        if self.input_started.swap(true, Ordering::SeqCst) {
            warn!("Audio input already started");
            return;
        }

        self.running.store(true, Ordering::SeqCst);
        let sink = FrameSink::new(self.captured.clone(), Arc::clone(&self.running));

        let mut slot = self.input.lock();
        let Some(mut backend) = slot.take() else {
            return;
        };

        match backend.start(sink.clone()) {
            Ok(()) => {
                info!("Audio input started ({})", backend.name());
                *slot = Some(backend);
            }
            Err(e) => {
                warn!("{} failed to start ({}), using synthetic input", backend.name(), e);
                backend.stop();

                let mut synthetic = SilenceInput::new(self.config.sample_rate, self.config.frame_size);
                if let Err(e) = synthetic.start(sink) {
                    error!("Synthetic input failed to start: {}", e);
                }
                *slot = Some(Box::new(synthetic));
            }
        }
    }

    /// Start the task that moves frames from `to_play` into the output backend.
    ///
    /// Backend writes run on the blocking pool so a slow device never stalls
    /// the session loops. Must be called from within a tokio runtime.
    pub fn start_output(&self) {
        if self.stopped.load(Ordering::SeqCst) {
            warn!("Audio channel already stopped, not starting output");
            return;
        }
        if self.output_started.swap(true, Ordering::SeqCst) {
            warn!("Audio output already started");
            return;
        }

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                error!("Cannot start playback without a tokio runtime: {}", e);
                return;
            }
        };

        self.running.store(true, Ordering::SeqCst);

        let to_play = self.to_play.clone();
        let running = Arc::clone(&self.running);
        let output = Arc::clone(&self.output);
        let control = self.control.clone();

        let task = runtime.spawn(async move {
            loop {
                let frame = to_play.pop().await;
                if !running.load(Ordering::SeqCst) {
                    break;
                }

                let epoch = control.discards();
                let output = Arc::clone(&output);
                let control = control.clone();
                let written =
                    tokio::task::spawn_blocking(move || write_frame(&output, &control, &frame, epoch)).await;
                if let Err(e) = written {
                    error!("Playback write task failed: {}", e);
                    break;
                }
            }
            debug!("Playback drain loop finished");
        });

        *self.drain.lock() = Some(task);
        info!("Audio output started");
    }

    /// Wait for the next captured frame. Cancel-safe.
    pub async fn next_captured_frame(&self) -> AudioFrame {
        self.captured.pop().await
    }

    /// Queue a frame for playback; returns `false` if the queue was full and
    /// the frame was dropped
    pub fn enqueue_for_playback(&self, frame: AudioFrame) -> bool {
        self.to_play.push(frame)
    }

    /// Discard every frame waiting for playback without playing it.
    ///
    /// Returns the number of frames discarded.
    /// The output backend is told to drop whatever it has buffered too, so a
    /// barge-in silences the speaker at once.
    pub fn clear_playback(&self) -> usize {
        let cleared = self.to_play.clear();
        self.control.discard();
        debug!("Cleared {} pending playback frames", cleared);
        cleared
    }

    /// Stop both backends and the drain task. Safe to call any number of times.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }

        self.running.store(false, Ordering::SeqCst);
        self.control.close();

        if let Some(task) = self.drain.lock().take() {
            task.abort();
        }

        if let Some(mut input) = self.input.lock().take() {
            input.stop();
            trace!("Released input backend {}", input.name());
        }

        match self.output.try_lock() {
            Some(mut slot) => {
                if let Some(mut output) = slot.take() {
                    output.close();
                    trace!("Released output backend {}", output.name());
                }
            }
            None => debug!("Output backend busy, releasing it when the current write returns"),
        }

        let unplayed = self.to_play.clear();
        let unsent = self.captured.clear();
        info!(
            "Audio channel stopped ({} unplayed, {} unsent frames discarded)",
            unplayed, unsent
        );
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Frames captured but not yet taken by the uplink
    pub fn captured_len(&self) -> usize {
        self.captured.len()
    }

    /// Frames waiting for playback
    pub fn pending_playback(&self) -> usize {
        self.to_play.len()
    }

    /// Captured frames dropped because the uplink fell behind
    pub fn dropped_captured(&self) -> u64 {
        self.captured.dropped()
    }

    /// Playback frames dropped because the speaker fell behind
    pub fn dropped_playback(&self) -> u64 {
        self.to_play.dropped()
    }
}

impl Drop for AudioChannel {
    fn drop(&mut self) {
        self.stop();
    }
}

fn write_frame(
    output: &Mutex<Option<Box<dyn OutputBackend>>>,
    control: &PlaybackControl,
    frame: &AudioFrame,
    epoch: u64,
) {
    {
        let mut slot = output.lock();

        // Stopped or interrupted while the frame was waiting for the pool
        if control.is_closed() || control.discards() != epoch {
            trace!("Skipping stale playback frame");
        } else {
            let failed = match slot.as_mut() {
                Some(backend) => backend.write(frame).err().map(|e| (backend.name(), e)),
                None => None,
            };

            // A write cut short by `stop` is released below, not replaced
            if let Some((name, e)) = failed.filter(|_| !control.is_closed()) {
                warn!("{} failed to play audio ({}), using synthetic output", name, e);
                if let Some(mut backend) = slot.take() {
                    backend.close();
                }
                *slot = Some(Box::new(DiscardOutput::new()));
            }
        }
    }

    // `stop` could not take the lock while this write held it
    if control.is_closed() {
        if let Some(mut backend) = output.lock().take() {
            backend.close();
            trace!("Released output backend {} after its last write", backend.name());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AgentError, Result};
    use std::sync::atomic::AtomicU64;
    use std::time::{Duration, Instant};

    struct FailingInput;

    impl InputBackend for FailingInput {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn start(&mut self, _sink: FrameSink) -> Result<()> {
            Err(AgentError::AudioDeviceError("device vanished".into()))
        }

        fn stop(&mut self) {}
    }

    #[derive(Clone, Default)]
    struct RecordingOutput {
        written: Arc<Mutex<Vec<AudioFrame>>>,
        closed: Arc<AtomicBool>,
    }

    impl OutputBackend for RecordingOutput {
        fn name(&self) -> &'static str {
            "recording"
        }

        fn write(&mut self, frame: &AudioFrame) -> Result<()> {
            self.written.lock().push(frame.clone());
            Ok(())
        }

        fn close(&mut self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    fn small_config() -> AudioConfig {
        AudioConfig::default().with_frame_size(4).with_queue_capacity(4)
    }

    fn channel_with(output: RecordingOutput) -> AudioChannel {
        AudioChannel::with_backends(
            small_config(),
            Box::new(SilenceInput::new(16000, 4)),
            Box::new(output),
        )
    }

    #[tokio::test]
    async fn test_playback_reaches_backend_in_order() {
        let output = RecordingOutput::default();
        let channel = channel_with(output.clone());
        channel.start_output();

        for tag in 1..=3u8 {
            assert!(channel.enqueue_for_playback(AudioFrame::from(vec![tag, tag])));
        }

        tokio::time::timeout(Duration::from_secs(2), async {
            while output.written.lock().len() < 3 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("frames should be written");

        let tags: Vec<u8> = output.written.lock().iter().map(|f| f.as_bytes()[0]).collect();
        assert_eq!(tags, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_clear_playback_before_drain() {
        let output = RecordingOutput::default();
        let channel = channel_with(output.clone());
        channel.start_output();

        for _ in 0..3 {
            channel.enqueue_for_playback(AudioFrame::silence(2));
        }
        assert_eq!(channel.clear_playback(), 3);
        assert_eq!(channel.pending_playback(), 0);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(output.written.lock().is_empty());
    }

    #[tokio::test]
    async fn test_failed_input_falls_back_to_silence() {
        let channel = AudioChannel::with_backends(
            small_config(),
            Box::new(FailingInput),
            Box::new(RecordingOutput::default()),
        );

        channel.start_input();
        assert!(channel.is_running());

        let frame = tokio::time::timeout(Duration::from_secs(1), channel.next_captured_frame())
            .await
            .expect("synthetic input should deliver frames");
        assert_eq!(frame.len(), 8);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let output = RecordingOutput::default();
        let channel = channel_with(output.clone());
        channel.start_input();
        channel.start_output();
        channel.enqueue_for_playback(AudioFrame::silence(2));

        channel.stop();
        channel.stop();

        assert!(!channel.is_running());
        assert!(output.closed.load(Ordering::SeqCst));
        assert_eq!(channel.pending_playback(), 0);

        // Starting again after stop does nothing
        channel.start_input();
        assert!(!channel.is_running());
    }

    #[test]
    fn test_enqueue_when_full_drops() {
        let channel = channel_with(RecordingOutput::default());
        for _ in 0..4 {
            assert!(channel.enqueue_for_playback(AudioFrame::silence(2)));
        }
        assert!(!channel.enqueue_for_playback(AudioFrame::silence(2)));
        assert_eq!(channel.pending_playback(), 4);
        assert_eq!(channel.dropped_playback(), 1);
    }

    /// Takes `delay` per write and ignores any control
    #[derive(Clone)]
    struct SlowOutput {
        delay: Duration,
        writing: Arc<AtomicBool>,
        closes: Arc<AtomicU64>,
    }

    impl OutputBackend for SlowOutput {
        fn name(&self) -> &'static str {
            "slow"
        }

        fn write(&mut self, _frame: &AudioFrame) -> Result<()> {
            self.writing.store(true, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            Ok(())
        }

        fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Blocks in `write` until its control is closed, like a speaker whose
    /// device stopped pulling samples
    #[derive(Clone, Default)]
    struct StalledOutput {
        control: PlaybackControl,
        writing: Arc<AtomicBool>,
        closes: Arc<AtomicU64>,
    }

    impl OutputBackend for StalledOutput {
        fn name(&self) -> &'static str {
            "stalled"
        }

        fn write(&mut self, _frame: &AudioFrame) -> Result<()> {
            self.writing.store(true, Ordering::SeqCst);
            let deadline = Instant::now() + Duration::from_secs(5);
            while !self.control.is_closed() {
                if Instant::now() >= deadline {
                    return Err(AgentError::AudioDeviceError("never released".into()));
                }
                std::thread::sleep(Duration::from_millis(2));
            }
            Ok(())
        }

        fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }

        fn control(&self) -> Option<PlaybackControl> {
            Some(self.control.clone())
        }
    }

    async fn wait_until(flag: impl Fn() -> bool) {
        tokio::time::timeout(Duration::from_secs(3), async {
            while !flag() {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("condition should be reached");
    }

    #[tokio::test]
    async fn test_stop_does_not_wait_for_slow_write() {
        let output = SlowOutput {
            delay: Duration::from_millis(1500),
            writing: Arc::new(AtomicBool::new(false)),
            closes: Arc::new(AtomicU64::new(0)),
        };
        let channel = AudioChannel::with_backends(
            small_config(),
            Box::new(SilenceInput::new(16000, 4)),
            Box::new(output.clone()),
        );
        channel.start_output();
        channel.enqueue_for_playback(AudioFrame::silence(2));
        wait_until(|| output.writing.load(Ordering::SeqCst)).await;

        let started = Instant::now();
        channel.stop();
        assert!(started.elapsed() < Duration::from_millis(300), "stop took {:?}", started.elapsed());
        assert!(!channel.is_running());

        // Released once the write in progress returns
        wait_until(|| output.closes.load(Ordering::SeqCst) == 1).await;
    }

    #[tokio::test]
    async fn test_stop_releases_stalled_output() {
        let output = StalledOutput::default();
        let channel = AudioChannel::with_backends(
            small_config(),
            Box::new(SilenceInput::new(16000, 4)),
            Box::new(output.clone()),
        );
        channel.start_output();
        channel.enqueue_for_playback(AudioFrame::silence(2));
        wait_until(|| output.writing.load(Ordering::SeqCst)).await;

        let started = Instant::now();
        channel.stop();
        assert!(started.elapsed() < Duration::from_millis(300));

        wait_until(|| output.closes.load(Ordering::SeqCst) == 1).await;
        assert!(output.control.is_closed());
    }

    #[test]
    fn test_clear_playback_discards_backend_buffer() {
        let output = StalledOutput::default();
        let channel = AudioChannel::with_backends(
            small_config(),
            Box::new(SilenceInput::new(16000, 4)),
            Box::new(output.clone()),
        );

        channel.enqueue_for_playback(AudioFrame::silence(2));
        assert_eq!(channel.clear_playback(), 1);
        assert_eq!(output.control.discards(), 1);

        // Nothing queued still reaches the backend
        assert_eq!(channel.clear_playback(), 0);
        assert_eq!(output.control.discards(), 2);
    }

    #[test]
    fn test_stale_frame_is_not_written() {
        let output = RecordingOutput::default();
        let slot: Mutex<Option<Box<dyn OutputBackend>>> = Mutex::new(Some(Box::new(output.clone())));
        let control = PlaybackControl::new();

        let epoch = control.discards();
        control.discard();
        write_frame(&slot, &control, &AudioFrame::silence(2), epoch);
        assert!(output.written.lock().is_empty());

        write_frame(&slot, &control, &AudioFrame::silence(2), control.discards());
        assert_eq!(output.written.lock().len(), 1);

        control.close();
        write_frame(&slot, &control, &AudioFrame::silence(2), control.discards());
        assert_eq!(output.written.lock().len(), 1);
        assert!(output.closed.load(Ordering::SeqCst));
        assert!(slot.lock().is_none());
    }

    #[test]
    fn test_start_output_outside_runtime_is_harmless() {
        let channel = channel_with(RecordingOutput::default());
        channel.start_output();
        assert!(!channel.is_running());
        channel.stop();
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_open_default_keeps_runtime_free() {
        // Device setup on the single runtime thread would stall the ticker
        let ticks = Arc::new(AtomicU64::new(0));
        let ticker = {
            let ticks = Arc::clone(&ticks);
            tokio::spawn(async move {
                loop {
                    ticks.fetch_add(1, Ordering::SeqCst);
                    tokio::task::yield_now().await;
                }
            })
        };

        let channel = AudioChannel::open_default(AudioConfig::default().with_queue_capacity(4))
            .await
            .unwrap();
        ticker.abort();

        assert!(ticks.load(Ordering::SeqCst) > 0);
        assert!(!channel.is_running());
        assert_eq!(channel.pending_playback(), 0);
        channel.stop();
    }
}
