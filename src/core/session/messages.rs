//! Live relay WebSocket message types.
//!
//! Every frame is a JSON envelope. Client frames carry a `type` tag and an
//! optional `data` payload; server frames are either the readiness handshake
//! or a tagged envelope.
//!
//! # Message Flow
//!
//! ```text
//! Client → Server:
//!   - setup (response modality, transcription flags)
//!   - audio / image (base64 payloads)
//!   - text
//!   - end
//!
//! Server → Client:
//!   - {"ready": true} (session is usable)
//!   - audio (base64 PCM 24kHz)
//!   - text
//!   - interrupted / turn_complete
//!   - function_call / function_response
//!   - input_transcription / output_transcription
//!   - error
//! ```

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

// =============================================================================
// Client Messages
// =============================================================================

/// Envelope sent from the client to the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Base64-encoded PCM audio captured from the user
    Audio(String),
    /// Base64-encoded image (a camera or screen frame)
    Image(String),
    /// End of the user's input stream
    End,
    /// Plain text input
    Text(String),
    /// Session configuration, sent once after readiness
    Setup(SetupConfig),
}

impl ClientMessage {
    /// Create an audio envelope from raw PCM bytes.
    pub fn audio_from_pcm(pcm: &[u8]) -> Self {
        ClientMessage::Audio(BASE64.encode(pcm))
    }

    /// Create an image envelope from encoded image bytes (JPEG, PNG).
    pub fn image_from_bytes(image: &[u8]) -> Self {
        ClientMessage::Image(BASE64.encode(image))
    }

    /// Wire tag of this envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Audio(_) => "audio",
            ClientMessage::Image(_) => "image",
            ClientMessage::End => "end",
            ClientMessage::Text(_) => "text",
            ClientMessage::Setup(_) => "setup",
        }
    }
}

/// How the model should answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResponseModality {
    /// Spoken answers, streamed as `audio` envelopes
    #[default]
    Audio,
    /// Written answers, streamed as `text` envelopes
    Text,
}

impl ResponseModality {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseModality::Audio => "AUDIO",
            ResponseModality::Text => "TEXT",
        }
    }

    /// Parse a modality name, ignoring case.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "AUDIO" => Some(ResponseModality::Audio),
            "TEXT" => Some(ResponseModality::Text),
            _ => None,
        }
    }
}

impl fmt::Display for ResponseModality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of the `setup` envelope.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SetupConfig {
    /// Response modality of the model
    #[serde(default)]
    pub modality: ResponseModality,
    /// Ask the relay to transcribe the user's audio
    #[serde(default, skip_serializing_if = "is_false")]
    pub input_audio_transcription: bool,
    /// Ask the relay to transcribe the model's audio
    #[serde(default, skip_serializing_if = "is_false")]
    pub output_audio_transcription: bool,
}

impl SetupConfig {
    pub fn new(modality: ResponseModality) -> Self {
        Self {
            modality,
            ..Default::default()
        }
    }

    pub fn with_input_transcription(mut self, enabled: bool) -> Self {
        self.input_audio_transcription = enabled;
        self
    }

    pub fn with_output_transcription(mut self, enabled: bool) -> Self {
        self.output_audio_transcription = enabled;
        self
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

// =============================================================================
// Server Messages
// =============================================================================

/// Envelope received from the relay.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// Readiness handshake (`{"ready": <truthy>}`)
    Ready,
    /// Error reported by the relay
    Error(ServerError),
    /// The model's output was interrupted by user input
    Interrupted(Value),
    /// Chunk of model audio
    Audio(AudioChunk),
    /// Chunk of model text
    Text(String),
    /// The model finished its turn
    TurnComplete,
    /// The model requested a tool invocation
    FunctionCall(Value),
    /// Result of a tool invocation executed by the relay
    FunctionResponse(Value),
    /// Transcript of the user's speech
    InputTranscription(String),
    /// Transcript of the model's speech
    OutputTranscription(String),
    /// Envelope with an unrecognized (or missing) tag
    Unknown(Option<String>),
}

impl ServerMessage {
    /// Short name used in logs.
    pub fn kind(&self) -> &str {
        match self {
            ServerMessage::Ready => "ready",
            ServerMessage::Error(_) => "error",
            ServerMessage::Interrupted(_) => "interrupted",
            ServerMessage::Audio(_) => "audio",
            ServerMessage::Text(_) => "text",
            ServerMessage::TurnComplete => "turn_complete",
            ServerMessage::FunctionCall(_) => "function_call",
            ServerMessage::FunctionResponse(_) => "function_response",
            ServerMessage::InputTranscription(_) => "input_transcription",
            ServerMessage::OutputTranscription(_) => "output_transcription",
            ServerMessage::Unknown(Some(tag)) => tag,
            ServerMessage::Unknown(None) => "untagged",
        }
    }
}

/// Base64 audio payload exactly as the relay sent it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    /// Base64-encoded PCM16 mono at 24kHz
    pub data: String,
}

impl AudioChunk {
    pub fn new(data: impl Into<String>) -> Self {
        Self { data: data.into() }
    }

    /// Decode the payload into raw PCM bytes.
    pub fn decode(&self) -> Result<Bytes, base64::DecodeError> {
        BASE64.decode(&self.data).map(Bytes::from)
    }
}

/// Error payload sent by the relay.
///
/// The payload is kept verbatim. The relay conventionally sends an object with
/// `message`, `action` and `error_type` fields, which the accessors read.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerError(Value);

impl ServerError {
    pub fn new(payload: Value) -> Self {
        Self(payload)
    }

    /// The raw payload.
    pub fn payload(&self) -> &Value {
        &self.0
    }

    pub fn message(&self) -> Option<&str> {
        self.0
            .get("message")
            .and_then(Value::as_str)
            .or_else(|| self.0.as_str())
    }

    pub fn action(&self) -> Option<&str> {
        self.0.get("action").and_then(Value::as_str)
    }

    /// Relay error category (`quota_exceeded`, `setup_error`, `timeout`,
    /// `general`, `connection_closed`).
    pub fn error_type(&self) -> Option<&str> {
        self.0.get("error_type").and_then(Value::as_str)
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.message() {
            Some(message) => f.write_str(message),
            None => write!(f, "{}", self.0),
        }
    }
}

/// Reasons an inbound frame could not be decoded.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("invalid UTF-8 in binary frame: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("invalid JSON envelope: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid `{kind}` payload: {source}")]
    Payload {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Deserialize)]
struct RawEnvelope {
    /// Any JSON value; only strings name a known message.
    #[serde(rename = "type", default)]
    kind: Value,
    #[serde(default)]
    ready: Value,
    #[serde(default)]
    data: Option<Value>,
}

/// JavaScript-style truthiness, which is how the relay's `ready` flag is read.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn text_payload(kind: &'static str, data: Option<Value>) -> Result<String, FrameError> {
    match data {
        None => Ok(String::new()),
        Some(value) => {
            serde_json::from_value(value).map_err(|source| FrameError::Payload { kind, source })
        }
    }
}

/// Serialize a client message to JSON.
pub fn serialize_client_message(msg: &ClientMessage) -> Result<String, serde_json::Error> {
    serde_json::to_string(msg)
}

/// Decode and classify a server frame.
///
/// An `error` tag takes precedence over the readiness flag, which takes
/// precedence over every other tag.
pub fn deserialize_server_message(json: &str) -> Result<ServerMessage, FrameError> {
    let object: serde_json::Map<String, Value> = serde_json::from_str(json)?;
    let envelope = RawEnvelope::deserialize(Value::Object(object))?;

    let tag = envelope.kind.as_str();
    if tag == Some("error") {
        return Ok(ServerMessage::Error(ServerError::new(
            envelope.data.unwrap_or(Value::Null),
        )));
    }

    if is_truthy(&envelope.ready) {
        return Ok(ServerMessage::Ready);
    }

    let data = envelope.data;
    let message = match tag {
        Some("interrupted") => ServerMessage::Interrupted(data.unwrap_or(Value::Null)),
        Some("audio") => ServerMessage::Audio(AudioChunk::new(text_payload("audio", data)?)),
        Some("text") => ServerMessage::Text(text_payload("text", data)?),
        Some("turn_complete") => ServerMessage::TurnComplete,
        Some("function_call") => ServerMessage::FunctionCall(data.unwrap_or(Value::Null)),
        Some("function_response") => ServerMessage::FunctionResponse(data.unwrap_or(Value::Null)),
        Some("input_transcription") => {
            ServerMessage::InputTranscription(text_payload("input_transcription", data)?)
        }
        Some("output_transcription") => {
            ServerMessage::OutputTranscription(text_payload("output_transcription", data)?)
        }
        Some(other) => ServerMessage::Unknown(Some(other.to_string())),
        None if envelope.kind.is_null() => ServerMessage::Unknown(None),
        None => ServerMessage::Unknown(Some(envelope.kind.to_string())),
    };
    Ok(message)
}

/// Decode a binary frame by interpreting its bytes as UTF-8 text.
///
/// Bytes that are not valid UTF-8 are rejected rather than replaced.
pub fn deserialize_binary_message(bytes: &[u8]) -> Result<ServerMessage, FrameError> {
    deserialize_server_message(std::str::from_utf8(bytes)?)
}
