use super::client::ChatBackend;
use super::config::ChatConfig;
use super::context::{ConversationContext, ConversationMessage};
use super::retry::RetryPolicy;
use crate::Result;
use tracing::{debug, warn};

/// A turn-based conversation with a chat backend.
///
/// Each call to [`send_message`](Self::send_message) adds the user message,
/// asks the backend for a reply under the retry policy and records the reply.
/// A request that finally fails leaves the history as it was before the call.
pub struct ChatSession<B> {
    backend: B,
    context: ConversationContext,
    retry: RetryPolicy,
}

impl<B: ChatBackend> ChatSession<B> {
    pub fn new(backend: B, config: &ChatConfig) -> Self {
        Self {
            backend,
            context: ConversationContext::new(config.max_turns)
                .with_system_instruction(config.system_instruction.clone()),
            retry: config.retry.clone(),
        }
    }

    /// Send a user message and return the model's reply (empty if it had no text)
    pub async fn send_message(&mut self, text: &str) -> Result<String> {
        self.context.add_user_message(text);

        let context = &self.context;
        let backend = &self.backend;
        let result = self
            .retry
            .run(|| backend.generate(context.system_instruction(), context.history()))
            .await;

        match result {
            Ok(reply) => {
                debug!("Received reply of {} chars", reply.chars().count());
                self.context.add_model_message(reply.clone());
                Ok(reply)
            }
            Err(e) => {
                warn!("Chat request failed: {}", e);
                self.context.pop_user_message();
                Err(e)
            }
        }
    }

    pub fn history(&self) -> &[ConversationMessage] {
        self.context.history()
    }

    pub fn context(&self) -> &ConversationContext {
        &self.context
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}
