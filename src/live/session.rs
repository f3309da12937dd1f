use super::config::{ResponseModality, SessionConfig};
use super::event::{Part, ServerEvent};
use super::transport::{LiveConnection, LiveReceiver, LiveSender, LiveTransport};
use crate::audio::AudioChannel;
use crate::{AgentError, Result};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

/// Lifecycle of a duplex session. There is no way back out of `Closed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Active,
    Closed,
}

/// Why a session stopped running
#[derive(Clone, Debug)]
pub enum SessionEnd {
    /// Stopped from outside
    Cancelled,
    /// The remote closed the connection
    RemoteClosed,
    /// Sending audio failed
    UplinkFailed(AgentError),
    /// Receiving events failed
    DownlinkFailed(AgentError),
}

impl SessionEnd {
    pub fn is_failure(&self) -> bool {
        matches!(self, SessionEnd::UplinkFailed(_) | SessionEnd::DownlinkFailed(_))
    }
}

/// One live connection moving audio between the endpoint and an [`AudioChannel`].
///
/// The uplink sends every captured frame as it arrives; the downlink queues
/// model audio for playback and clears the playback queue on interruption.
/// Neither loop ever waits on the other.
///
/// Model text in a text-modality session goes to the sender given to
/// [`DuplexSession::with_text_output`]; without one it is only logged.
pub struct DuplexSession<'a> {
    id: Uuid,
    state: SessionState,
    audio: &'a AudioChannel,
    connection: Option<LiveConnection>,
    modality: ResponseModality,
    text_output: Option<UnboundedSender<String>>,
}

impl<'a> DuplexSession<'a> {
    pub fn new(audio: &'a AudioChannel) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: SessionState::Idle,
            audio,
            connection: None,
            modality: ResponseModality::default(),
            text_output: None,
        }
    }

    pub fn with_text_output(mut self, text_output: UnboundedSender<String>) -> Self {
        self.text_output = Some(text_output);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Connect and perform the handshake. Only valid once, from `Idle`.
    pub async fn open(
        &mut self,
        transport: &dyn LiveTransport,
        model: &str,
        config: &SessionConfig,
    ) -> Result<()> {
        if self.state != SessionState::Idle {
            return Err(AgentError::ConnectionError(format!(
                "Session {} cannot be opened from state {:?}",
                self.id, self.state
            )));
        }

        self.state = SessionState::Connecting;
        self.modality = config.response_modality;
        info!("Session {}: connecting to {}", self.id, model);

        match transport.connect(model, config).await {
            Ok(connection) => {
                self.connection = Some(connection);
                self.state = SessionState::Active;
                info!("Session {}: connected", self.id);
                Ok(())
            }
            Err(e) => {
                self.state = SessionState::Closed;
                error!("Session {}: connection failed: {}", self.id, e);
                Err(e)
            }
        }
    }

    /// Run the uplink and downlink loops until one of them ends.
    ///
    /// The other loop is dropped, and with it cancelled, before this returns.
    pub async fn run(&mut self) -> Result<SessionEnd> {
        let connection = match (self.state, self.connection.as_mut()) {
            (SessionState::Active, Some(connection)) => connection,
            _ => {
                return Err(AgentError::ConnectionError(format!(
                    "Session {} is not active ({:?})",
                    self.id, self.state
                )))
            }
        };

        let targets = EventTargets {
            audio: self.audio,
            text_output: self.text_output.as_ref(),
            modality: self.modality,
        };

        let end = tokio::select! {
            end = uplink(self.audio, connection.sender.as_mut()) => end,
            end = downlink(&targets, connection.receiver.as_mut()) => end,
        };

        self.state = SessionState::Closed;
        match &end {
            SessionEnd::UplinkFailed(e) | SessionEnd::DownlinkFailed(e) => {
                warn!("Session {} ended: {}", self.id, e)
            }
            other => info!("Session {} ended: {:?}", self.id, other),
        }
        Ok(end)
    }

    /// Apply one server event to the audio channel
    pub fn handle_server_event(&self, event: ServerEvent) {
        let targets = EventTargets {
            audio: self.audio,
            text_output: self.text_output.as_ref(),
            modality: self.modality,
        };
        targets.dispatch(event);
    }

    /// Release the connection. Safe to call repeatedly; errors are logged.
    pub async fn close(&mut self) {
        self.state = SessionState::Closed;

        if let Some(mut connection) = self.connection.take() {
            if let Err(e) = connection.sender.close().await {
                debug!("Session {}: error while closing connection: {}", self.id, e);
            }
            info!("Session {}: connection released", self.id);
        }
    }
}

async fn uplink(audio: &AudioChannel, sender: &mut dyn LiveSender) -> SessionEnd {
    let mut sent: u64 = 0;
    loop {
        let frame = audio.next_captured_frame().await;

        if let Err(e) = sender.send_audio(&frame, false).await {
            error!("Error sending audio: {}", e);
            return SessionEnd::UplinkFailed(e);
        }

        sent += 1;
        trace!("Sent frame {} ({} bytes)", sent, frame.len());
    }
}

async fn downlink(targets: &EventTargets<'_>, receiver: &mut dyn LiveReceiver) -> SessionEnd {
    loop {
        match receiver.next_event().await {
            Some(Ok(event)) => targets.dispatch(event),
            Some(Err(e)) => {
                error!("Error receiving events: {}", e);
                return SessionEnd::DownlinkFailed(e);
            }
            None => {
                info!("Live connection closed by remote");
                return SessionEnd::RemoteClosed;
            }
        }
    }
}

/// Where the downlink delivers what the server sends
struct EventTargets<'a> {
    audio: &'a AudioChannel,
    text_output: Option<&'a UnboundedSender<String>>,
    modality: ResponseModality,
}

impl EventTargets<'_> {
    fn dispatch(&self, event: ServerEvent) {
        match event {
            ServerEvent::Heartbeat => trace!("Heartbeat"),
            ServerEvent::Interrupted => {
                let cleared = self.audio.clear_playback();
                info!("Interrupted by user input, discarded {} frames", cleared);
            }
            ServerEvent::ModelTurn(parts) => {
                for part in parts {
                    match part {
                        Part::InlineAudio(frame) => {
                            if !self.audio.enqueue_for_playback(frame) {
                                trace!("Playback queue full, dropped model audio");
                            }
                        }
                        Part::Text(text) => self.deliver_text(text),
                    }
                }
            }
            ServerEvent::TurnComplete => debug!("Model turn complete"),
            ServerEvent::Unrecognized(kind) => debug!("Ignoring server event '{}'", kind),
        }
    }

    fn deliver_text(&self, text: String) {
        match self.text_output {
            Some(output) if self.modality == ResponseModality::Text => {
                if let Err(e) = output.send(text) {
                    debug!("Text output closed, dropped model text: {}", e.0);
                }
            }
            _ => debug!("Model text: {}", text),
        }
    }
}
