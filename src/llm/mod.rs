//! Turn-based chat with a hosted Gemini model
//!
//! - **config**: model selection and request settings
//! - **context**: bounded conversation history
//! - **retry**: exponential backoff for rate-limited calls
//! - **wire**: `generateContent` request/response bodies
//! - **client**: REST client and the [`ChatBackend`] capability
//! - **session**: [`ChatSession`], which ties history, backend and retry together

pub mod client;
pub mod config;
pub mod context;
pub mod retry;
pub mod session;
pub mod wire;

pub use client::{ChatBackend, GeminiChatClient, GeminiClient};
pub use config::{ChatConfig, DEFAULT_CHAT_MODEL};
pub use context::{ConversationContext, ConversationMessage, MessageRole};
pub use retry::RetryPolicy;
pub use session::ChatSession;
