//! Integration layer: settings and the three interaction modes
//!
//! - **text**: prompt loop on the terminal
//! - **voice**: spoken turns through recognition and synthesis
//! - **live**: a duplex audio session with the live model

pub mod config;
pub mod live;
pub mod text_chat;
pub mod voice_chat;

pub use config::{load_system_prompt, Settings};
pub use live::{live_controller, run_live_session};
pub use text_chat::{run_text_chat, TURN_PAUSE};
pub use voice_chat::run_voice_chat;
