use crate::audio::AudioFrame;

/// One piece of a model turn
#[derive(Clone, Debug, PartialEq)]
pub enum Part {
    /// Raw PCM audio at the playback rate
    InlineAudio(AudioFrame),
    Text(String),
}

/// Events received from the live endpoint
#[derive(Clone, Debug, PartialEq)]
pub enum ServerEvent {
    /// Keep-alive or content-free message
    Heartbeat,

    /// The user started talking over the model; pending playback must be discarded
    Interrupted,

    /// Model output for the current turn
    ModelTurn(Vec<Part>),

    /// The model finished its turn
    TurnComplete,

    /// A message kind this client does not handle, named by its key
    Unrecognized(String),
}

impl ServerEvent {
    /// Short label for logging
    pub fn kind(&self) -> &str {
        match self {
            ServerEvent::Heartbeat => "heartbeat",
            ServerEvent::Interrupted => "interrupted",
            ServerEvent::ModelTurn(_) => "modelTurn",
            ServerEvent::TurnComplete => "turnComplete",
            ServerEvent::Unrecognized(kind) => kind,
        }
    }
}
