use super::config::SessionConfig;
use super::session::{DuplexSession, SessionEnd};
use super::transport::LiveTransport;
use crate::audio::AudioChannel;
use crate::{AgentError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::watch;
use tracing::{debug, info};

/// Requests that a running session stop. Cheap to clone and usable from any task.
#[derive(Clone)]
pub struct StopHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }

    async fn stopped(&self) {
        let mut rx = self.tx.subscribe();
        // Only fails if the sender is gone, which it cannot be while `self` lives
        let _ = rx.wait_for(|stopped| *stopped).await;
    }
}

/// Stops the audio channel when dropped, whatever path `start` leaves by
struct Teardown<'a>(&'a AudioChannel);

impl Drop for Teardown<'_> {
    fn drop(&mut self) {
        self.0.stop();
    }
}

/// Owns the audio channel and runs one live session over it.
///
/// `start` and `stop` both take `&self`, so `stop` can be called while
/// `start` is in progress, from the same task or any other.
pub struct SessionController<T> {
    transport: T,
    model: String,
    config: SessionConfig,
    audio: AudioChannel,
    stop: StopHandle,
    started: AtomicBool,
    text_output: Option<UnboundedSender<String>>,
}

impl<T: LiveTransport> SessionController<T> {
    /// Create a controller on the default audio devices
    pub async fn new(transport: T, model: impl Into<String>, config: SessionConfig) -> Result<Self> {
        let audio = AudioChannel::open_default(config.audio.clone()).await?;
        Ok(Self::with_audio(transport, model, config, audio))
    }

    /// Create a controller on an existing audio channel
    pub fn with_audio(
        transport: T,
        model: impl Into<String>,
        config: SessionConfig,
        audio: AudioChannel,
    ) -> Self {
        Self {
            transport,
            model: model.into(),
            config,
            audio,
            stop: StopHandle::new(),
            started: AtomicBool::new(false),
            text_output: None,
        }
    }

    /// Send model text from text-modality sessions to `text_output`
    pub fn with_text_output(mut self, text_output: UnboundedSender<String>) -> Self {
        self.text_output = Some(text_output);
        self
    }

    pub fn audio(&self) -> &AudioChannel {
        &self.audio
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Request the running session to stop
    pub fn stop(&self) {
        info!("Stop requested");
        self.stop.stop();
    }

    /// Start audio, open the session and run it until it ends or is stopped.
    ///
    /// The session is closed and the audio channel stopped before this
    /// returns, and also if the returned future is dropped early. A
    /// controller runs at most one session.
    pub async fn start(&self) -> Result<SessionEnd> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(AgentError::ConnectionError(
                "Session controller has already run a session".into(),
            ));
        }

        let _teardown = Teardown(&self.audio);

        if self.stop.is_stopped() {
            info!("Stopped before the session started");
            return Ok(SessionEnd::Cancelled);
        }

        self.audio.start_input();
        self.audio.start_output();

        let mut session = DuplexSession::new(&self.audio);
        if let Some(text_output) = &self.text_output {
            session = session.with_text_output(text_output.clone());
        }

        let opened = tokio::select! {
            biased;
            _ = self.stop.stopped() => None,
            opened = session.open(&self.transport, &self.model, &self.config) => Some(opened),
        };

        let result = match opened {
            None => Ok(SessionEnd::Cancelled),
            Some(Err(e)) => Err(e),
            Some(Ok(())) => {
                info!("Live session {} started, speak now", session.id());
                tokio::select! {
                    biased;
                    _ = self.stop.stopped() => Ok(SessionEnd::Cancelled),
                    end = session.run() => end,
                }
            }
        };

        session.close().await;
        debug!("Live session {} torn down", session.id());
        result
    }
}
