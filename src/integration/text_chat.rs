//! Interactive text chat on a terminal

use crate::llm::{ChatBackend, ChatSession};
use crate::{AgentError, Result};
use std::io::Write;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{error, info};

/// Pause after each reply before prompting again
pub const TURN_PAUSE: Duration = Duration::from_secs(2);

fn is_exit_command(text: &str) -> bool {
    text.eq_ignore_ascii_case("exit") || text.eq_ignore_ascii_case("quit")
}

/// Run the prompt loop until `exit`/`quit` or end of input.
///
/// API failures are reported and the loop keeps going; only IO errors on
/// `input` or `output` end it early.
pub async fn run_text_chat<B, R, W>(
    chat: &mut ChatSession<B>,
    mut input: R,
    output: &mut W,
    turn_pause: Duration,
) -> Result<()>
where
    B: ChatBackend,
    R: AsyncBufRead + Unpin,
    W: Write,
{
    info!("Text chat started. Type 'exit' or 'quit' to leave.");

    loop {
        write!(output, "You: ")?;
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line).await? == 0 {
            info!("Session terminated by user.");
            break;
        }

        let text = line.trim();
        if is_exit_command(text) {
            info!("Exiting chat session.");
            break;
        }
        if text.is_empty() {
            continue;
        }

        match chat.send_message(text).await {
            Ok(reply) => {
                writeln!(output, "AI: {}", reply)?;
                output.flush()?;
                tokio::time::sleep(turn_pause).await;
            }
            Err(e @ AgentError::RetriesExhausted { .. }) => {
                error!("{} ({})", e.user_message(), e);
            }
            Err(e) => {
                error!("Error while calling Gemini API: {}", e);
            }
        }
    }

    Ok(())
}
