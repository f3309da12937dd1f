//! Live duplex audio sessions
//!
//! [`SessionController`] owns an [`AudioChannel`](crate::audio::AudioChannel)
//! and drives one [`DuplexSession`] over a [`LiveTransport`]: captured frames
//! go up, model audio comes down into the playback queue, and an
//! interruption from the server clears whatever has not been played yet.

pub mod config;
pub mod controller;
pub mod event;
pub mod gemini;
pub mod session;
pub mod transport;

pub use config::{ResponseModality, SessionConfig};
pub use controller::{SessionController, StopHandle};
pub use event::{Part, ServerEvent};
pub use gemini::GeminiLiveTransport;
pub use session::{DuplexSession, SessionEnd, SessionState};
pub use transport::{LiveConnection, LiveReceiver, LiveSender, LiveTransport};

/// Live model used when `GEMINI_LIVE_MODEL` is not set
pub const DEFAULT_LIVE_MODEL: &str = "gemini-2.0-flash-live-001";
