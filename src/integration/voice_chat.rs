//! Turn-based voice chat: listen, ask the model, speak the reply

use crate::llm::{ChatBackend, ChatSession};
use crate::speech::VoiceInterface;
use crate::{AgentError, Result};
use tracing::{error, info, warn};

/// Run voice turns until recognition fails in a way retrying cannot fix.
///
/// Recoverable errors (no speech, API trouble) skip to the next turn.
pub async fn run_voice_chat<B, V>(chat: &mut ChatSession<B>, voice: &mut V) -> Result<()>
where
    B: ChatBackend,
    V: VoiceInterface + ?Sized,
{
    info!("Voice chat started. Speak after the prompt.");

    loop {
        info!("Listening...");
        let text = match voice.listen().await {
            Ok(text) => text,
            Err(e) if e.is_recoverable() => {
                warn!("Voice recognition error: {}", e);
                continue;
            }
            Err(e) => {
                error!("Voice input stopped: {}", e);
                return Err(e);
            }
        };

        let text = text.trim();
        if text.is_empty() {
            continue;
        }
        println!("You: {}", text);

        let reply = match chat.send_message(text).await {
            Ok(reply) => reply,
            Err(e @ AgentError::RetriesExhausted { .. }) => {
                error!("{} ({})", e.user_message(), e);
                continue;
            }
            Err(e) => {
                error!("Error while calling Gemini API: {}", e);
                continue;
            }
        };
        println!("AI: {}", reply);

        if let Err(e) = voice.speak(&reply).await {
            warn!("Could not play reply: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ChatConfig, ConversationMessage, RetryPolicy};
    use async_trait::async_trait;
    use std::collections::VecDeque;

    /// Plays back scripted listen results and records what it was asked to say
    struct ScriptedVoice {
        heard: VecDeque<Result<String>>,
        spoken: Vec<String>,
        fail_speak: bool,
    }

    impl ScriptedVoice {
        fn new(heard: Vec<Result<String>>) -> Self {
            Self {
                heard: heard.into(),
                spoken: Vec::new(),
                fail_speak: false,
            }
        }
    }

    #[async_trait]
    impl VoiceInterface for ScriptedVoice {
        async fn listen(&mut self) -> Result<String> {
            self.heard
                .pop_front()
                .unwrap_or_else(|| Err(AgentError::ChannelError("microphone closed".into())))
        }

        async fn speak(&mut self, text: &str) -> Result<()> {
            self.spoken.push(text.to_string());
            if self.fail_speak {
                Err(AgentError::TTSError("no audio".into()))
            } else {
                Ok(())
            }
        }
    }

    struct Upper;

    #[async_trait]
    impl ChatBackend for Upper {
        async fn generate(
            &self,
            _system: Option<&str>,
            history: &[ConversationMessage],
        ) -> Result<String> {
            Ok(history.last().map(|m| m.content.to_uppercase()).unwrap_or_default())
        }
    }

    fn chat() -> ChatSession<Upper> {
        ChatSession::new(Upper, &ChatConfig::default().with_retry(RetryPolicy::none()))
    }

    #[tokio::test]
    async fn test_turns_until_fatal_error() {
        let mut chat = chat();
        let mut voice = ScriptedVoice::new(vec![
            Ok("hello".into()),
            Err(AgentError::TranscriptionError("No speech detected".into())),
            Ok("   ".into()),
            Ok("again".into()),
        ]);

        let err = run_voice_chat(&mut chat, &mut voice).await.unwrap_err();
        assert!(matches!(err, AgentError::ChannelError(_)));

        assert_eq!(voice.spoken, vec!["HELLO", "AGAIN"]);
        assert_eq!(chat.history().len(), 4);
    }

    #[tokio::test]
    async fn test_speak_failure_is_not_fatal() {
        let mut chat = chat();
        let mut voice = ScriptedVoice::new(vec![Ok("one".into()), Ok("two".into())]);
        voice.fail_speak = true;

        assert!(run_voice_chat(&mut chat, &mut voice).await.is_err());
        assert_eq!(voice.spoken.len(), 2);
    }

    #[tokio::test]
    async fn test_device_error_ends_loop() {
        let mut chat = chat();
        let mut voice = ScriptedVoice::new(vec![Err(AgentError::AudioDeviceError("unplugged".into()))]);

        let err = run_voice_chat(&mut chat, &mut voice).await.unwrap_err();
        assert!(matches!(err, AgentError::AudioDeviceError(_)));
        assert!(chat.history().is_empty());
    }
}
