//! Gemini Live transport
//!
//! Speaks the BidiGenerateContent protocol over a WebSocket: one `setup`
//! message, a `setupComplete` acknowledgement, then `realtimeInput` audio
//! chunks upstream and `serverContent` messages downstream.

use super::config::SessionConfig;
use super::event::{Part, ServerEvent};
use super::transport::{LiveConnection, LiveReceiver, LiveSender, LiveTransport};
use crate::audio::AudioFrame;
use crate::{AgentError, Result};
use async_stream::try_stream;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures::stream::{BoxStream, SplitSink, SplitStream};
use futures::Stream;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace, warn};

pub const DEFAULT_LIVE_ENDPOINT: &str =
    "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

// Client messages

#[derive(Serialize)]
struct SetupMessage {
    setup: Setup,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Setup {
    model: String,
    generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Instruction>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_modalities: Vec<&'static str>,
}

#[derive(Serialize)]
struct Instruction {
    parts: Vec<TextPart>,
}

#[derive(Serialize)]
struct TextPart {
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RealtimeInputMessage {
    realtime_input: RealtimeInput,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RealtimeInput {
    media_chunks: Vec<MediaChunk>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MediaChunk {
    mime_type: String,
    data: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ClientContentMessage {
    client_content: ClientContent,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ClientContent {
    turn_complete: bool,
}

// Server messages

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ServerMessage {
    setup_complete: Option<Value>,
    server_content: Option<ServerContent>,
    #[serde(flatten)]
    other: serde_json::Map<String, Value>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ServerContent {
    #[serde(default)]
    interrupted: bool,
    model_turn: Option<ModelTurn>,
    #[serde(default)]
    turn_complete: bool,
}

#[derive(Deserialize)]
struct ModelTurn {
    #[serde(default)]
    parts: Vec<WirePart>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePart {
    text: Option<String>,
    inline_data: Option<InlineData>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    #[allow(dead_code)]
    mime_type: Option<String>,
    data: String,
}

/// Decode one server message into an event.
///
/// Interruption wins over content in the same message so stale audio is
/// never queued after a barge-in.
pub fn parse_server_message(raw: &str) -> Result<ServerEvent> {
    let message: ServerMessage = serde_json::from_str(raw)?;

    if let Some(content) = message.server_content {
        if content.interrupted {
            return Ok(ServerEvent::Interrupted);
        }

        if let Some(turn) = content.model_turn {
            let mut parts = Vec::with_capacity(turn.parts.len());
            for part in turn.parts {
                if let Some(inline) = part.inline_data {
                    let bytes = STANDARD.decode(inline.data.as_bytes()).map_err(|e| {
                        AgentError::ProtocolError(format!("Invalid inline audio: {}", e))
                    })?;
                    parts.push(Part::InlineAudio(AudioFrame::from(bytes)));
                } else if let Some(text) = part.text {
                    parts.push(Part::Text(text));
                }
            }
            return Ok(ServerEvent::ModelTurn(parts));
        }

        if content.turn_complete {
            return Ok(ServerEvent::TurnComplete);
        }

        return Ok(ServerEvent::Heartbeat);
    }

    if message.setup_complete.is_some() {
        return Ok(ServerEvent::Heartbeat);
    }

    match message.other.keys().find(|key| key.as_str() != "usageMetadata") {
        Some(kind) => Ok(ServerEvent::Unrecognized(kind.clone())),
        None => Ok(ServerEvent::Heartbeat),
    }
}

fn message_text(message: Message) -> Result<Option<String>> {
    match message {
        Message::Text(text) => Ok(Some(text)),
        Message::Binary(bytes) => String::from_utf8(bytes)
            .map(Some)
            .map_err(|e| AgentError::ProtocolError(format!("Binary message is not UTF-8: {}", e))),
        _ => Ok(None),
    }
}

/// Downstream events until the server closes the socket
fn server_events(mut stream: SplitStream<Socket>) -> impl Stream<Item = Result<ServerEvent>> {
    try_stream! {
        while let Some(message) = stream.next().await {
            let message = message.map_err(|e| AgentError::TransportError(e.to_string()))?;

            if let Message::Close(frame) = &message {
                info!("Server closed the live connection: {:?}", frame);
                break;
            }

            if let Some(raw) = message_text(message)? {
                let event = parse_server_message(&raw)?;
                trace!("Received {}", event.kind());
                yield event;
            }
        }
    }
}

/// Live transport for the Gemini API
pub struct GeminiLiveTransport {
    api_key: String,
    endpoint: String,
}

impl GeminiLiveTransport {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            endpoint: DEFAULT_LIVE_ENDPOINT.to_string(),
        }
    }

    /// Use a different WebSocket endpoint
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn setup_message(model: &str, config: &SessionConfig) -> SetupMessage {
        let model = if model.starts_with("models/") {
            model.to_string()
        } else {
            format!("models/{}", model)
        };

        SetupMessage {
            setup: Setup {
                model,
                generation_config: GenerationConfig {
                    response_modalities: vec![config.response_modality.as_str()],
                },
                system_instruction: config.system_instruction.as_ref().map(|text| Instruction {
                    parts: vec![TextPart { text: text.clone() }],
                }),
            },
        }
    }
}

#[async_trait]
impl LiveTransport for GeminiLiveTransport {
    async fn connect(&self, model: &str, config: &SessionConfig) -> Result<LiveConnection> {
        let url = format!("{}?key={}", self.endpoint, self.api_key);

        let (socket, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| AgentError::ConnectionError(format!("WebSocket connect failed: {}", e)))?;
        let (mut sink, mut stream) = socket.split();

        let setup = serde_json::to_string(&Self::setup_message(model, config))?;
        sink.send(Message::Text(setup))
            .await
            .map_err(|e| AgentError::ConnectionError(format!("Failed to send setup: {}", e)))?;

        loop {
            let message = match stream.next().await {
                Some(Ok(message)) => message,
                Some(Err(e)) => {
                    return Err(AgentError::ConnectionError(format!("Handshake failed: {}", e)))
                }
                None => {
                    return Err(AgentError::ConnectionError(
                        "Connection closed during handshake".into(),
                    ))
                }
            };

            if let Message::Close(frame) = &message {
                let reason = frame
                    .as_ref()
                    .map(|f| f.reason.to_string())
                    .unwrap_or_default();
                return Err(AgentError::ConnectionError(format!(
                    "Server rejected setup: {}",
                    reason
                )));
            }

            if let Some(raw) = message_text(message)? {
                let reply: ServerMessage = serde_json::from_str(&raw)?;
                if reply.setup_complete.is_some() {
                    break;
                }
                debug!("Ignoring message before setupComplete");
            }
        }

        info!("Gemini Live setup complete ({})", config.response_modality);

        let events: BoxStream<'static, Result<ServerEvent>> = Box::pin(server_events(stream));

        Ok(LiveConnection::new(
            GeminiLiveSender {
                sink,
                sample_rate: config.audio.sample_rate,
                closed: false,
            },
            GeminiLiveReceiver { events },
        ))
    }
}

struct GeminiLiveSender {
    sink: SplitSink<Socket, Message>,
    sample_rate: u32,
    closed: bool,
}

impl GeminiLiveSender {
    async fn send_json<M: Serialize>(&mut self, message: &M) -> Result<()> {
        let payload = serde_json::to_string(message)?;
        self.sink
            .send(Message::Text(payload))
            .await
            .map_err(|e| AgentError::TransportError(e.to_string()))
    }
}

#[async_trait]
impl LiveSender for GeminiLiveSender {
    async fn send_audio(&mut self, frame: &AudioFrame, end_of_turn: bool) -> Result<()> {
        if self.closed {
            return Err(AgentError::TransportError("Connection is closed".into()));
        }

        let message = RealtimeInputMessage {
            realtime_input: RealtimeInput {
                media_chunks: vec![MediaChunk {
                    mime_type: format!("audio/pcm;rate={}", self.sample_rate),
                    data: STANDARD.encode(frame.as_bytes()),
                }],
            },
        };
        self.send_json(&message).await?;

        if end_of_turn {
            self.send_json(&ClientContentMessage {
                client_content: ClientContent { turn_complete: true },
            })
            .await?;
        }

        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        if let Err(e) = self.sink.close().await {
            warn!("Error closing live connection: {}", e);
            return Err(AgentError::TransportError(e.to_string()));
        }
        Ok(())
    }
}

struct GeminiLiveReceiver {
    events: BoxStream<'static, Result<ServerEvent>>,
}

#[async_trait]
impl LiveReceiver for GeminiLiveReceiver {
    async fn next_event(&mut self) -> Option<Result<ServerEvent>> {
        self.events.next().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_interrupted() {
        let event = parse_server_message(r#"{"serverContent":{"interrupted":true}}"#).unwrap();
        assert_eq!(event, ServerEvent::Interrupted);
    }

    #[test]
    fn test_parse_model_turn_audio() {
        let raw = r#"{"serverContent":{"modelTurn":{"parts":[
            {"inlineData":{"mimeType":"audio/pcm;rate=24000","data":"AQI="}},
            {"text":"hi"}
        ]}}}"#;

        let event = parse_server_message(raw).unwrap();
        assert_eq!(
            event,
            ServerEvent::ModelTurn(vec![
                Part::InlineAudio(AudioFrame::from(vec![1u8, 2])),
                Part::Text("hi".into()),
            ])
        );
    }

    #[test]
    fn test_parse_turn_complete_and_setup() {
        assert_eq!(
            parse_server_message(r#"{"serverContent":{"turnComplete":true}}"#).unwrap(),
            ServerEvent::TurnComplete
        );
        assert_eq!(
            parse_server_message(r#"{"setupComplete":{}}"#).unwrap(),
            ServerEvent::Heartbeat
        );
        assert_eq!(parse_server_message("{}").unwrap(), ServerEvent::Heartbeat);
    }

    #[test]
    fn test_parse_unknown_kind() {
        let event = parse_server_message(r#"{"goAway":{"timeLeft":"10s"}}"#).unwrap();
        assert_eq!(event, ServerEvent::Unrecognized("goAway".into()));
    }

    #[test]
    fn test_parse_bad_audio() {
        let raw = r#"{"serverContent":{"modelTurn":{"parts":[{"inlineData":{"data":"!!"}}]}}}"#;
        assert!(matches!(
            parse_server_message(raw),
            Err(AgentError::ProtocolError(_))
        ));
        assert!(parse_server_message("not json").is_err());
    }

    #[test]
    fn test_setup_message_shape() {
        let config = SessionConfig::default().with_system_instruction(Some("Be brief.".into()));
        let json = serde_json::to_value(GeminiLiveTransport::setup_message("gemini-live", &config)).unwrap();

        assert_eq!(json["setup"]["model"], "models/gemini-live");
        assert_eq!(json["setup"]["generationConfig"]["responseModalities"][0], "AUDIO");
        assert_eq!(json["setup"]["systemInstruction"]["parts"][0]["text"], "Be brief.");

        let bare = serde_json::to_value(GeminiLiveTransport::setup_message(
            "models/x",
            &SessionConfig::default(),
        ))
        .unwrap();
        assert_eq!(bare["setup"]["model"], "models/x");
        assert!(bare["setup"].get("systemInstruction").is_none());
    }
}
