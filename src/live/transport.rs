//! Transport capability for live sessions
//!
//! A transport opens one bidirectional connection and hands back its two
//! halves, so the uplink can send while the downlink is waiting to receive.

use super::config::SessionConfig;
use super::event::ServerEvent;
use crate::audio::AudioFrame;
use crate::Result;
use async_trait::async_trait;

/// Opens live connections to a model endpoint
#[async_trait]
pub trait LiveTransport: Send + Sync {
    /// Connect and complete the session handshake
    async fn connect(&self, model: &str, config: &SessionConfig) -> Result<LiveConnection>;
}

/// Sending half of a live connection
#[async_trait]
pub trait LiveSender: Send {
    /// Send one audio frame. `end_of_turn` tells the endpoint the user stopped talking.
    async fn send_audio(&mut self, frame: &AudioFrame, end_of_turn: bool) -> Result<()>;

    /// Close the connection. Must be safe to call repeatedly.
    async fn close(&mut self) -> Result<()>;
}

/// Receiving half of a live connection
#[async_trait]
pub trait LiveReceiver: Send {
    /// Wait for the next event; `None` once the remote has closed the connection
    async fn next_event(&mut self) -> Option<Result<ServerEvent>>;
}

/// An open connection, split into its halves
pub struct LiveConnection {
    pub sender: Box<dyn LiveSender>,
    pub receiver: Box<dyn LiveReceiver>,
}

impl LiveConnection {
    pub fn new(sender: impl LiveSender + 'static, receiver: impl LiveReceiver + 'static) -> Self {
        Self {
            sender: Box::new(sender),
            receiver: Box::new(receiver),
        }
    }
}
