//! Live mode: one duplex session on the default audio devices

use super::config::Settings;
use crate::live::{GeminiLiveTransport, LiveTransport, SessionController, SessionEnd};
use crate::Result;
use std::io::Write;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{error, info, warn};

/// Build a controller for a Gemini live session from `settings`.
///
/// Model text from text-modality sessions is printed to stdout.
pub async fn live_controller(settings: &Settings) -> Result<SessionController<GeminiLiveTransport>> {
    let (text_tx, text_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        if let Err(e) = print_model_text(text_rx, std::io::stdout()).await {
            warn!("Could not print model text: {}", e);
        }
    });

    let controller = SessionController::new(
        GeminiLiveTransport::new(settings.api_key.clone()),
        settings.live_model.clone(),
        settings.session_config(),
    )
    .await?;
    Ok(controller.with_text_output(text_tx))
}

/// Write each model reply to `output` until every sender is dropped
async fn print_model_text<W: Write>(mut text: UnboundedReceiver<String>, mut output: W) -> Result<W> {
    while let Some(reply) = text.recv().await {
        writeln!(output, "AI: {}", reply)?;
        output.flush()?;
    }
    Ok(output)
}

/// Run `controller` until the session ends or Ctrl-C is pressed
pub async fn run_live_session<T: LiveTransport>(controller: &SessionController<T>) -> Result<SessionEnd> {
    let stop = controller.stop_handle();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, stopping live session");
            stop.stop();
        }
    });

    info!("Live session starting. Press Ctrl-C to stop.");
    let result = controller.start().await;
    ctrl_c.abort();

    match &result {
        Ok(SessionEnd::Cancelled) => info!("Live session stopped"),
        Ok(SessionEnd::RemoteClosed) => info!("Live session closed by server"),
        Ok(end) => warn!("Live session ended: {:?}", end),
        Err(e) => error!("Live session failed: {}", e),
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_model_text_is_printed_per_reply() {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send("hello".to_string()).unwrap();
        tx.send("how can I help?".to_string()).unwrap();
        drop(tx);

        let output = print_model_text(rx, Vec::new()).await.unwrap();
        assert_eq!(String::from_utf8(output).unwrap(), "AI: hello\nAI: how can I help?\n");
    }
}
